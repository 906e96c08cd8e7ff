//! State management module
//!
//! This module holds the state shared by request handlers

pub mod context;

pub use context::AppState;
