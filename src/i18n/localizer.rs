//! Localized titles and descriptions
//!
//! Events and job offers store their texts in one language and point to
//! further translations through localization ids (`title_id`,
//! `description_id`). When a single item is fetched the texts are replaced
//! with the translation best matching the request's `Accept-Language`.

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::I18nConfig;
use crate::models::Translation;

/// Text fields with their localization id field
pub const LOCALIZED_FIELDS: &[(&str, &str)] = &[("title", "title_id"), ("description", "description_id")];

/// Resources whose texts are localized
pub const LOCALIZED_RESOURCES: &[&str] = &["events", "joboffers"];

pub fn is_localized(resource: &str) -> bool {
    LOCALIZED_RESOURCES.contains(&resource)
}

/// Main internationalization manager
#[derive(Debug, Clone)]
pub struct I18n {
    /// Default language code
    default_language: String,
    /// Supported language codes
    supported_languages: Vec<String>,
}

impl I18n {
    /// Create a new I18n instance
    pub fn new(config: &I18nConfig) -> Self {
        Self {
            default_language: config.default_language.clone(),
            supported_languages: config.supported_languages.clone(),
        }
    }

    /// Check if a language is supported
    pub fn is_language_supported(&self, lang: &str) -> bool {
        self.supported_languages.iter().any(|l| l == lang)
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn supported_languages(&self) -> &[String] {
        &self.supported_languages
    }

    /// Supported languages of an `Accept-Language` header, best first, ending
    /// with the default language
    pub fn negotiate(&self, accept_language: Option<&str>) -> Vec<String> {
        let mut ranked: Vec<(String, f32)> = accept_language
            .unwrap_or_default()
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.trim().split(';');
                let tag = parts.next()?.trim();
                if tag.is_empty() {
                    return None;
                }
                let quality = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                // "de-CH" -> "de"
                let lang = tag.split('-').next().unwrap_or(tag).to_ascii_lowercase();
                Some((lang, quality))
            })
            .filter(|(lang, quality)| *quality > 0.0 && self.is_language_supported(lang))
            .collect();

        // stable: equal weights keep header order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut languages: Vec<String> = Vec::new();
        for (lang, _) in ranked {
            if !languages.contains(&lang) {
                languages.push(lang);
            }
        }
        if !languages.contains(&self.default_language) {
            languages.push(self.default_language.clone());
        }
        languages
    }

    /// Replace localized texts of a document with the best translation.
    ///
    /// Texts without a matching translation keep their stored value.
    pub fn localize(&self, document: &mut Value, translations: &[Translation], languages: &[String]) {
        let Some(map) = document.as_object_mut() else {
            return;
        };

        for (text_field, id_field) in LOCALIZED_FIELDS {
            let Some(localization_id) = map
                .get(*id_field)
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };

            let best = languages.iter().find_map(|lang| {
                translations
                    .iter()
                    .find(|t| t.localization_id == localization_id && &t.language == lang)
            });

            if let Some(translation) = best {
                debug!(field = text_field, language = %translation.language, "Text localized");
                map.insert(text_field.to_string(), Value::String(translation.content.clone()));
            }
        }
    }
}

/// Localization ids referenced by a document
pub fn localization_ids(document: &Value) -> Vec<Uuid> {
    LOCALIZED_FIELDS
        .iter()
        .filter_map(|(_, id_field)| document.get(*id_field).and_then(Value::as_str))
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect()
}

/// Give a new document fresh localization ids
pub fn assign_localization_ids(payload: &mut Map<String, Value>) {
    for (_, id_field) in LOCALIZED_FIELDS {
        payload.insert(id_field.to_string(), Value::String(Uuid::new_v4().to_string()));
    }
}
