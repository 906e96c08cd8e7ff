//! Test helpers module
//!
//! This module provides utilities and helpers for testing MemberHub:
//! a PostgreSQL test database, fixture builders and a request context
//! around the full router.

#![allow(dead_code)]

pub mod database_helper;
pub mod test_context;
pub mod test_data;

pub use database_helper::*;
pub use test_context::*;
pub use test_data::*;
