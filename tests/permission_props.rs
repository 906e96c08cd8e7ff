//! Property tests for merging role grants

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use memberhub::config::default_roles;
use memberhub::models::Permission;
use memberhub::schema::Method;
use memberhub::services::authorization::permission_map;

const ROLES: &[&str] = &["vorstand", "read-everything", "event-admin", "job-admin", "mail-admin", "unknown"];

fn grant(role: &str, expires_in_days: i64) -> Permission {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Permission {
        id: 1,
        user_id: 1,
        role: role.to_string(),
        expiry_date: now + Duration::days(expires_in_days),
        expiry_warned: false,
        created_at: now,
        updated_at: now,
    }
}

fn arb_grants() -> impl Strategy<Value = Vec<(usize, i64)>> {
    prop::collection::vec((0..ROLES.len(), -30i64..30), 0..8)
}

proptest! {
    #[test]
    fn expired_grants_never_count(grants in arb_grants()) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let roles = default_roles();
        let all: Vec<Permission> = grants.iter().map(|(r, d)| grant(ROLES[*r], *d)).collect();
        let active: Vec<Permission> = all.iter().filter(|g| g.expiry_date > now).cloned().collect();

        prop_assert_eq!(permission_map(&all, &roles, now), permission_map(&active, &roles, now));
    }

    #[test]
    fn merged_map_covers_each_grant(grants in arb_grants()) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let roles = default_roles();
        let all: Vec<Permission> = grants.iter().map(|(r, d)| grant(ROLES[*r], *d)).collect();
        let merged = permission_map(&all, &roles, now);

        for single in &all {
            let map = permission_map(std::slice::from_ref(single), &roles, now);
            for (resource, verbs) in map {
                let covered = merged.get(&resource).map_or(false, |m| verbs.is_subset(m));
                prop_assert!(covered, "{} not covered for {}", resource, single.role);
            }
        }
    }
}

#[test]
fn unknown_role_grants_nothing() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let map = permission_map(&[grant("unknown", 5)], &default_roles(), now);
    assert!(map.is_empty());
    let map = permission_map(&[grant("event-admin", 5)], &default_roles(), now);
    assert!(map["events"].contains(&Method::Delete));
}
