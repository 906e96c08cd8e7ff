//! Internationalization module
//!
//! This module handles localized texts of events and job offers: language
//! negotiation from `Accept-Language` and replacing stored texts with their
//! translations.

pub mod localizer;

// Re-export commonly used i18n components
pub use localizer::{assign_localization_ids, is_localized, localization_ids, I18n, LOCALIZED_FIELDS};
