//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the application.

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length of session and confirmation tokens
pub const TOKEN_LENGTH: usize = 64;

/// Generate a random alphanumeric string
pub fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generate a session or confirmation token
pub fn generate_token() -> String {
    generate_random_string(TOKEN_LENGTH)
}

/// Validate email format
pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}

/// Local part of an email address, used to name forward files
pub fn email_local_part(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

/// Sanitize filename for safe storage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Calculate pagination offset
pub fn calculate_offset(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1) * page_size
}

/// Etag of a serializable document: sha256 over its JSON form
pub fn compute_etag<T: Serialize>(item: &T) -> String {
    let bytes = serde_json::to_vec(item).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("kim@example.org"));
        assert!(is_valid_email("a@b"));
        assert!(!is_valid_email("@example.org"));
        assert!(!is_valid_email("kim@"));
        assert!(!is_valid_email("kim"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("exam 2015/hs.pdf"), "exam_2015_hs.pdf");
    }

    #[test]
    fn test_email_local_part() {
        assert_eq!(email_local_part("kultur@org.example"), "kultur");
        assert_eq!(email_local_part("plain"), "plain");
    }

    #[test]
    fn test_etag_is_stable() {
        let a = serde_json::json!({"id": 1, "title": "Party"});
        let b = serde_json::json!({"id": 1, "title": "Party"});
        let c = serde_json::json!({"id": 1, "title": "Other"});
        assert_eq!(compute_etag(&a), compute_etag(&b));
        assert_ne!(compute_etag(&a), compute_etag(&c));
    }

    #[test]
    fn test_calculate_offset() {
        assert_eq!(calculate_offset(1, 25), 0);
        assert_eq!(calculate_offset(3, 25), 50);
        assert_eq!(calculate_offset(0, 25), 0);
    }
}
