//! Resource-level authorization
//!
//! Every request is resolved to an [`Access`] level before it touches the
//! database. Admin access comes from the configured admins or from active
//! role grants. Registered and owner access are declared per resource in
//! the schema registry. Owner access narrows list queries and item writes to
//! the caller's own rows.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::settings::RoleTable;
use crate::database::OwnerFilter;
use crate::models::Permission;
use crate::schema::{Method, ResourceSchema, Scope};
use crate::services::auth::AuthContext;
use crate::utils::errors::{MemberHubError, Result};

/// Resource name -> permitted verbs
pub type PermissionMap = BTreeMap<String, BTreeSet<Method>>;

/// Merge the verbs of every grant that has not expired yet
pub fn permission_map(grants: &[Permission], roles: &RoleTable, now: DateTime<Utc>) -> PermissionMap {
    let mut map = PermissionMap::new();

    for grant in grants.iter().filter(|g| g.is_active(now)) {
        let Some(role) = roles.get(&grant.role) else {
            warn!(role = %grant.role, permission_id = grant.id, "Grant for unknown role ignored");
            continue;
        };
        for (resource, verbs) in role {
            map.entry(resource.clone())
                .or_default()
                .extend(verbs.iter().filter_map(|v| Method::parse(v)));
        }
    }

    map.retain(|_, verbs| !verbs.is_empty());
    map
}

/// Level of access a request was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Unrestricted access to the resource
    Admin,
    /// Any logged-in user; writes still must name the caller as owner
    Registered(i64),
    /// Restricted to items owned by the user
    Owner(i64),
    /// Anonymous access to a public verb
    Public,
}

impl Access {
    pub fn is_admin(&self) -> bool {
        matches!(self, Access::Admin)
    }

    /// User id the results must be restricted to
    pub fn owner_id(&self) -> Option<i64> {
        match self {
            Access::Owner(id) => Some(*id),
            _ => None,
        }
    }
}

/// Decide whether `method` on `schema` is allowed for the caller.
///
/// Unsupported verbs answer 405, anonymous callers 401 and logged-in callers
/// without a matching grant 403.
pub fn resolve(ctx: &AuthContext, schema: &ResourceSchema, method: Method, scope: Scope) -> Result<Access> {
    schema.ensure_supported(method, scope)?;

    if ctx.has_admin_access(schema.name, method) {
        return Ok(Access::Admin);
    }

    if let Some(user_id) = ctx.user_id() {
        if schema.registered_methods.contains(&method) {
            return Ok(Access::Registered(user_id));
        }
        if schema.owner_methods.contains(&method) && !schema.owner_fields.is_empty() {
            return Ok(Access::Owner(user_id));
        }
    }

    if schema.is_public(method, scope) {
        return Ok(Access::Public);
    }

    if ctx.is_logged_in() {
        Err(MemberHubError::PermissionDenied(format!(
            "You are not allowed to {} {}",
            method, schema.name
        )))
    } else {
        Err(MemberHubError::Authentication(
            "Please provide a valid token".to_string(),
        ))
    }
}

/// Field names under which the owner columns appear in documents
pub fn owner_field_names(schema: &ResourceSchema) -> Vec<&'static str> {
    schema
        .owner_fields
        .iter()
        .filter_map(|column| {
            if *column == "id" {
                Some("id")
            } else {
                schema.schema.iter().find(|f| f.column == *column).map(|f| f.name)
            }
        })
        .collect()
}

/// List filter for owner access
pub fn owner_filter(schema: &ResourceSchema, access: Access) -> Option<OwnerFilter> {
    access.owner_id().map(|user_id| OwnerFilter {
        columns: schema.owner_fields.clone(),
        user_id,
    })
}

/// Whether `user_id` owns the stored document
pub fn is_owner(schema: &ResourceSchema, document: &Value, user_id: i64) -> bool {
    owner_field_names(schema)
        .iter()
        .any(|field| document.get(*field).and_then(Value::as_i64) == Some(user_id))
}

/// Reject item access on documents the caller does not own
pub fn check_item_access(schema: &ResourceSchema, access: Access, document: &Value) -> Result<()> {
    match access.owner_id() {
        Some(user_id) if !is_owner(schema, document, user_id) => Err(MemberHubError::PermissionDenied(format!(
            "You can only access your own {}",
            schema.name
        ))),
        _ => Ok(()),
    }
}

/// Make sure a payload written with registered or owner access names the
/// caller in its owner fields.
///
/// Writable owner fields missing from an insert are filled with the caller's
/// id. Owner fields pointing at anybody else are rejected.
pub fn claim_ownership(
    schema: &ResourceSchema,
    access: Access,
    payload: &mut Map<String, Value>,
    inserting: bool,
) -> Result<()> {
    let user_id = match access {
        Access::Registered(id) | Access::Owner(id) => id,
        Access::Admin | Access::Public => return Ok(()),
    };

    let writable: Vec<&str> = owner_field_names(schema)
        .into_iter()
        .filter(|name| schema.field_schema(name).map_or(false, |f| !f.readonly))
        .collect();

    for field in &writable {
        match payload.get(*field) {
            Some(value) if value.as_i64() != Some(user_id) => {
                return Err(MemberHubError::PermissionDenied(format!(
                    "'{}' must be your own user id",
                    field
                )));
            }
            Some(_) => {}
            None if inserting => {
                payload.insert(field.to_string(), Value::from(user_id));
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::default_roles;
    use crate::schema::lookup;
    use crate::services::auth::Caller;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use serde_json::json;

    fn grant(role: &str, expiry: DateTime<Utc>) -> Permission {
        Permission {
            id: 1,
            user_id: 5,
            role: role.to_string(),
            expiry_date: expiry,
            expiry_warned: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user(id: i64) -> AuthContext {
        AuthContext {
            user: Some(Caller {
                id,
                username: format!("user{}", id),
                email: format!("user{}@example.org", id),
            }),
            ..AuthContext::default()
        }
    }

    #[test]
    fn test_expired_grants_are_ignored() {
        let now = Utc::now();
        let grants = vec![
            grant("event-admin", now - Duration::days(1)),
            grant("job-admin", now + Duration::days(1)),
        ];
        let map = permission_map(&grants, &default_roles(), now);
        assert!(!map.contains_key("events"));
        assert_eq!(map["joboffers"].len(), 5);
    }

    #[test]
    fn test_grants_merge() {
        let now = Utc::now();
        let grants = vec![
            grant("read-everything", now + Duration::days(1)),
            grant("mail-admin", now + Duration::days(1)),
            grant("no-such-role", now + Duration::days(1)),
        ];
        let map = permission_map(&grants, &default_roles(), now);
        assert_eq!(map["users"], BTreeSet::from([Method::Get]));
        assert!(map["forwards"].contains(&Method::Delete));
    }

    #[test]
    fn test_anonymous_access() {
        let ctx = AuthContext::anonymous();
        let events = lookup("events").unwrap();
        assert_eq!(resolve(&ctx, events, Method::Get, Scope::Resource).unwrap(), Access::Public);
        assert_matches!(
            resolve(&ctx, events, Method::Post, Scope::Resource),
            Err(MemberHubError::Authentication(_))
        );
        assert_matches!(
            resolve(&ctx, events, Method::Put, Scope::Resource),
            Err(MemberHubError::MethodNotAllowed { .. })
        );
    }

    #[test]
    fn test_logged_in_access() {
        let ctx = user(7);
        let users = lookup("users").unwrap();
        assert_eq!(resolve(&ctx, users, Method::Get, Scope::Resource).unwrap(), Access::Owner(7));
        assert_matches!(
            resolve(&ctx, users, Method::Delete, Scope::Item),
            Err(MemberHubError::PermissionDenied(_))
        );

        let docs = lookup("studydocuments").unwrap();
        assert_eq!(resolve(&ctx, docs, Method::Post, Scope::Resource).unwrap(), Access::Registered(7));
        assert_eq!(resolve(&ctx, docs, Method::Patch, Scope::Item).unwrap(), Access::Owner(7));
    }

    #[test]
    fn test_admin_access() {
        let mut ctx = user(7);
        ctx.permissions
            .insert("users".to_string(), BTreeSet::from([Method::Get]));
        let users = lookup("users").unwrap();
        assert_eq!(resolve(&ctx, users, Method::Get, Scope::Resource).unwrap(), Access::Admin);
        assert_eq!(resolve(&ctx, users, Method::Patch, Scope::Item).unwrap(), Access::Owner(7));

        let root = AuthContext { is_root: true, ..user(1) };
        assert_eq!(resolve(&root, users, Method::Delete, Scope::Item).unwrap(), Access::Admin);
    }

    #[test]
    fn test_owner_field_names() {
        assert_eq!(owner_field_names(lookup("users").unwrap()), vec!["id"]);
        assert_eq!(owner_field_names(lookup("studydocuments").unwrap()), vec!["_author"]);
        assert_eq!(owner_field_names(lookup("eventsignups").unwrap()), vec!["user_id"]);
    }

    #[test]
    fn test_item_access() {
        let signups = lookup("eventsignups").unwrap();
        let own = json!({"id": 3, "user_id": 7});
        let other = json!({"id": 4, "user_id": 8});
        assert!(check_item_access(signups, Access::Owner(7), &own).is_ok());
        assert!(check_item_access(signups, Access::Owner(7), &other).is_err());
        assert!(check_item_access(signups, Access::Admin, &other).is_ok());

        let filter = owner_filter(signups, Access::Owner(7)).unwrap();
        assert_eq!(filter.columns, vec!["user_id"]);
        assert!(owner_filter(signups, Access::Admin).is_none());
    }

    #[test]
    fn test_claim_ownership() {
        let signups = lookup("eventsignups").unwrap();

        let mut payload = json!({"event_id": 1}).as_object().cloned().unwrap();
        claim_ownership(signups, Access::Registered(7), &mut payload, true).unwrap();
        assert_eq!(payload["user_id"], 7);

        let mut payload = json!({"event_id": 1, "user_id": 8}).as_object().cloned().unwrap();
        assert_matches!(
            claim_ownership(signups, Access::Registered(7), &mut payload, true),
            Err(MemberHubError::PermissionDenied(_))
        );
        assert!(claim_ownership(signups, Access::Admin, &mut payload, true).is_ok());
    }
}
