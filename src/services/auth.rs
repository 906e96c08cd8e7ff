//! Authentication service implementation
//!
//! This service hashes and verifies passwords, opens login sessions and
//! turns the token of a request into an [`AuthContext`] carrying the
//! caller's identity and the verbs their active role grants allow.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::settings::Settings;
use crate::database::repositories::{PermissionRepository, SessionRepository, UserRepository};
use crate::models::{LoginRequest, Session, User};
use crate::schema::Method;
use crate::services::authorization::{permission_map, PermissionMap};
use crate::utils::errors::{MemberHubError, Result};
use crate::utils::helpers::generate_token;

/// Identity of a logged-in caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Authentication context of a request
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user: Option<Caller>,
    /// Configured admin with access to everything
    pub is_root: bool,
    /// Resource name -> verbs granted by active role grants
    pub permissions: PermissionMap,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    /// Whether the caller administers `resource` for `method`
    pub fn has_admin_access(&self, resource: &str, method: Method) -> bool {
        self.is_root
            || self
                .permissions
                .get(resource)
                .map_or(false, |verbs| verbs.contains(&method))
    }
}

/// Authentication service for sessions and credentials
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    sessions: SessionRepository,
    permissions: PermissionRepository,
    settings: Settings,
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(
        users: UserRepository,
        sessions: SessionRepository,
        permissions: PermissionRepository,
        settings: Settings,
    ) -> Self {
        Self {
            users,
            sessions,
            permissions,
            settings,
        }
    }

    /// Check if user is a configured admin
    pub fn is_root(&self, user_id: i64) -> bool {
        self.settings.auth.admin_user_ids.contains(&user_id)
    }

    /// Hash a password for storage
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| MemberHubError::PasswordHash(e.to_string()))
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!(error = %e, "Stored password hash cannot be parsed");
                false
            }
        }
    }

    /// Check credentials and open a new session
    pub async fn login(&self, request: &LoginRequest) -> Result<Session> {
        let user = self.check_credentials(request).await?;
        let session = self.sessions.create(user.id, &generate_token()).await?;

        info!(user_id = user.id, session_id = session.id, "User logged in");
        Ok(session)
    }

    async fn check_credentials(&self, request: &LoginRequest) -> Result<User> {
        let rejected = || MemberHubError::Authentication("Username or password wrong".to_string());

        let user = match self.users.find_by_login(request.username.trim()).await? {
            Some(user) => user,
            None => {
                debug!(login = %request.username, "Login for unknown user");
                return Err(rejected());
            }
        };

        match user.password.as_deref() {
            Some(hash) if Self::verify_password(&request.password, hash) => Ok(user),
            _ => {
                warn!(user_id = user.id, "Login with wrong password");
                Err(rejected())
            }
        }
    }

    /// Resolve the token of a request.
    ///
    /// Requests without a token are anonymous. Unknown or timed out tokens
    /// are rejected.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<AuthContext> {
        let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return Ok(AuthContext::anonymous()),
        };

        let session = self
            .sessions
            .find_by_token(token)
            .await?
            .ok_or_else(|| MemberHubError::Authentication("Invalid token".to_string()))?;

        let now = Utc::now();
        if session.is_expired(self.settings.auth.session_timeout_days, now) {
            debug!(session_id = session.id, "Session timed out");
            return Err(MemberHubError::Authentication("Session timed out".to_string()));
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| MemberHubError::Authentication("Invalid token".to_string()))?;

        let grants = self.permissions.for_user(user.id).await?;
        let permissions = permission_map(&grants, &self.settings.roles, now);

        Ok(AuthContext {
            is_root: self.is_root(user.id),
            permissions,
            user: Some(Caller {
                id: user.id,
                username: user.username,
                email: user.email,
            }),
        })
    }
}

/// Extract the session token from an `Authorization` header value.
///
/// Both `Bearer <token>` and the bare token are accepted.
pub fn parse_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        Some(_) => return None,
        None => header,
    };
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_password_roundtrip() {
        let hash = AuthService::hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(AuthService::verify_password("correct horse", &hash));
        assert!(!AuthService::verify_password("battery staple", &hash));
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!AuthService::verify_password("x", "plaintext"));
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("Bearer abc"), Some("abc"));
        assert_eq!(parse_token("bearer  abc "), Some("abc"));
        assert_eq!(parse_token("abc"), Some("abc"));
        assert_eq!(parse_token("Basic dXNlcg=="), None);
        assert_eq!(parse_token("   "), None);
    }

    #[test]
    fn test_admin_access() {
        let mut ctx = AuthContext::anonymous();
        assert!(!ctx.has_admin_access("events", Method::Get));
        assert!(!ctx.is_logged_in());

        ctx.permissions
            .insert("events".to_string(), BTreeSet::from([Method::Get, Method::Post]));
        assert!(ctx.has_admin_access("events", Method::Post));
        assert!(!ctx.has_admin_access("events", Method::Delete));
        assert!(!ctx.has_admin_access("users", Method::Get));

        ctx.is_root = true;
        assert!(ctx.has_admin_access("users", Method::Delete));
    }
}
