//! Resource service
//!
//! Runs every REST request on a registry resource through the same steps:
//! authorization, validation, the rules specific to the resource, the write
//! inside a transaction and the follow-up work (forward files, stored
//! bytes). Anonymous writes that need confirmation are handed to the
//! confirmation workflow instead of being applied.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::settings::Settings;
use crate::database::query::document_id;
use crate::database::{DatabaseService, ListParams, ListQuery, Projection, ResourceRepository};
use crate::i18n::{assign_localization_ids, is_localized, localization_ids, I18n};
use crate::models::{ConfirmAction, Forward, NewSignup, ADMIN_ONLY_USER_FIELDS};
use crate::schema::{lookup, registry, validate, Method, Mode, ResourceSchema, Scope};
use crate::services::auth::{AuthContext, AuthService};
use crate::services::authorization::{
    check_item_access, claim_ownership, owner_filter, permission_map, resolve, Access,
};
use crate::services::confirm::{ConfirmService, DeferredChange, Outcome};
use crate::services::forwards::ForwardService;
use crate::services::media::MediaService;
use crate::services::signup::{check_event, check_extra_data, merged_rules, SignupService};
use crate::utils::errors::{MemberHubError, Result};
use crate::utils::logging::{log_admin_action, log_user_action};

/// One page of a collection
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Value>,
    pub page: i64,
    pub max_results: i64,
    pub total: i64,
}

impl Page {
    pub fn to_json(&self) -> Value {
        json!({
            "_items": self.items,
            "_meta": {
                "page": self.page,
                "max_results": self.max_results,
                "total": self.total,
            }
        })
    }
}

/// Reject writes whose `If-Match` does not match the stored document
pub fn check_etag(if_match: Option<&str>, document: &Value) -> Result<()> {
    let Some(expected) = if_match else {
        return Ok(());
    };
    let expected = expected.trim().trim_start_matches("W/").trim_matches('"');
    if expected == "*" {
        return Ok(());
    }
    match document.get("_etag").and_then(Value::as_str) {
        Some(etag) if etag == expected => Ok(()),
        _ => Err(MemberHubError::PreconditionFailed),
    }
}

fn into_object(payload: Value) -> Result<Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(MemberHubError::issue("payload", "must be a JSON object")),
    }
}

fn reject_password_projection(schema: &ResourceSchema, projection: &Projection) -> Result<()> {
    if schema.name == "users" && projection.requests("password") {
        return Err(MemberHubError::PermissionDenied(
            "Bad projection field: password".to_string(),
        ));
    }
    Ok(())
}

fn id_field(document: &Value, field: &str) -> Option<i64> {
    document.get(field).and_then(Value::as_i64)
}

#[derive(Clone)]
pub struct ResourceService {
    db: DatabaseService,
    signups: SignupService,
    confirm: ConfirmService,
    forwards: ForwardService,
    media: MediaService,
    i18n: I18n,
    settings: Settings,
}

impl ResourceService {
    pub fn new(
        db: DatabaseService,
        confirm: ConfirmService,
        forwards: ForwardService,
        media: MediaService,
        i18n: I18n,
        settings: Settings,
    ) -> Self {
        Self {
            signups: SignupService::new(db.clone()),
            db,
            confirm,
            forwards,
            media,
            i18n,
            settings,
        }
    }

    /// `GET /{resource}`
    pub async fn list(&self, ctx: &AuthContext, resource: &str, params: &ListParams) -> Result<Page> {
        let schema = lookup(resource)?;
        let access = resolve(ctx, schema, Method::Get, Scope::Resource)?;

        let query = ListQuery::parse(schema, params)?;
        reject_password_projection(schema, &query.projection)?;

        let owner = owner_filter(schema, access);
        let (mut items, total) = self.db.resources.list(schema, &query, owner.as_ref()).await?;
        for item in &mut items {
            query.projection.apply(item);
        }

        Ok(Page {
            items,
            page: query.page,
            max_results: query.max_results,
            total,
        })
    }

    /// `GET /{resource}/{id}`
    pub async fn get(
        &self,
        ctx: &AuthContext,
        resource: &str,
        key: &str,
        projection: Option<&str>,
        accept_language: Option<&str>,
    ) -> Result<Value> {
        let schema = lookup(resource)?;
        let access = resolve(ctx, schema, Method::Get, Scope::Item)?;

        let projection = Projection::parse(projection)?;
        reject_password_projection(schema, &projection)?;

        let mut document = self.fetch(schema, key).await?;
        check_item_access(schema, access, &document)?;

        if is_localized(schema.name) {
            let ids = localization_ids(&document);
            if !ids.is_empty() {
                let translations = self.db.translations.for_ids(&ids).await?;
                let languages = self.i18n.negotiate(accept_language);
                self.i18n.localize(&mut document, &translations, &languages);
            }
        }

        projection.apply(&mut document);
        Ok(document)
    }

    /// Item by id, or by the resource's lookup field for non-numeric keys
    async fn fetch(&self, schema: &ResourceSchema, key: &str) -> Result<Value> {
        let found = match key.parse::<i64>() {
            Ok(id) => match self.db.resources.find(schema, id).await? {
                Some(document) => Some(document),
                None => self.db.resources.find_by_lookup(schema, key).await?,
            },
            Err(_) => self.db.resources.find_by_lookup(schema, key).await?,
        };
        found.ok_or_else(|| MemberHubError::not_found(schema.name, key))
    }

    /// `POST /{resource}`
    pub async fn create(&self, ctx: &AuthContext, resource: &str, payload: Value) -> Result<Outcome> {
        let schema = lookup(resource)?;
        let access = resolve(ctx, schema, Method::Post, Scope::Resource)?;

        validate(schema, &payload, Mode::Insert, None)?;
        let mut payload = into_object(payload)?;

        match schema.name {
            "eventsignups" => return self.create_signup(ctx, access, payload).await,
            "forwardaddresses" if access == Access::Public => {
                return self.defer_subscription(payload).await;
            }
            "forwardusers" => {
                if !self.check_enrollment(ctx, access, &payload).await? {
                    claim_ownership(schema, access, &mut payload, true)?;
                }
            }
            _ => claim_ownership(schema, access, &mut payload, true)?,
        }

        self.before_write(access, schema, &mut payload, None, false).await?;
        if is_localized(schema.name) {
            assign_localization_ids(&mut payload);
        }
        if schema.field_schema("_author").is_some() {
            if let Some(user_id) = ctx.user_id() {
                payload.insert("_author".to_string(), Value::from(user_id));
            }
        }

        let mut tx = self.db.begin().await?;
        let document = ResourceRepository::insert(&mut tx, schema, &payload).await?;
        tx.commit().await?;

        self.log_write(ctx, access, "create", schema, &document);
        self.after_write(schema, None, Some(&document)).await;
        Ok(Outcome::Applied(Some(document)))
    }

    /// `PATCH` (or `PUT` with `replace`) `/{resource}/{id}`
    pub async fn update(
        &self,
        ctx: &AuthContext,
        resource: &str,
        key: &str,
        payload: Value,
        if_match: Option<&str>,
        replace: bool,
    ) -> Result<Outcome> {
        let schema = lookup(resource)?;
        let method = if replace { Method::Put } else { Method::Patch };
        let access = resolve(ctx, schema, method, Scope::Item)?;

        let original = self.fetch(schema, key).await?;
        check_item_access(schema, access, &original)?;
        check_etag(if_match, &original)?;

        if schema.name == "eventsignups" {
            if let Some(field) = payload.as_object().and_then(|p| p.keys().find(|k| *k != "extra_data")) {
                debug!(field = %field, "Signup patch touches more than extra_data");
                return Err(MemberHubError::PermissionDenied("You only can change extra_data".to_string()));
            }
        }

        let mode = if replace { Mode::Replace } else { Mode::Patch };
        validate(schema, &payload, mode, Some(&original))?;
        let mut payload = into_object(payload)?;
        claim_ownership(schema, access, &mut payload, replace)?;

        self.before_write(access, schema, &mut payload, Some(&original), replace).await?;

        let id = document_id(&original).ok_or_else(|| MemberHubError::not_found(schema.name, key))?;
        if access == Access::Public {
            return self.defer_update(schema, id, original, payload, replace).await;
        }

        let mut tx = self.db.begin().await?;
        let current = ResourceRepository::lock(&mut tx, schema, id)
            .await?
            .ok_or_else(|| MemberHubError::not_found(schema.name, key))?;
        check_etag(if_match, &current)?;
        let document = ResourceRepository::update(&mut tx, schema, id, &payload, replace).await?;
        tx.commit().await?;

        self.log_write(ctx, access, if replace { "replace" } else { "update" }, schema, &document);
        self.after_write(schema, Some(&current), Some(&document)).await;
        Ok(Outcome::Applied(Some(document)))
    }

    /// `DELETE /{resource}/{id}`
    pub async fn delete(&self, ctx: &AuthContext, resource: &str, key: &str, if_match: Option<&str>) -> Result<Outcome> {
        let schema = lookup(resource)?;
        let access = resolve(ctx, schema, Method::Delete, Scope::Item)?;

        let original = self.fetch(schema, key).await?;
        check_item_access(schema, access, &original)?;
        check_etag(if_match, &original)?;
        let id = document_id(&original).ok_or_else(|| MemberHubError::not_found(schema.name, key))?;

        if access == Access::Public {
            return self.defer_delete(schema, id, original).await;
        }

        let stored_file = match schema.name {
            "files" => self.media.find(id).await?,
            _ => None,
        };

        let mut tx = self.db.begin().await?;
        let current = ResourceRepository::lock(&mut tx, schema, id)
            .await?
            .ok_or_else(|| MemberHubError::not_found(schema.name, key))?;
        check_etag(if_match, &current)?;
        // forwards of the user cascade with the delete
        let user_forwards = match schema.name {
            "users" => Some(self.forwards.user_forwards(id).await?),
            _ => None,
        };
        ResourceRepository::delete(&mut tx, schema, id).await?;
        tx.commit().await?;

        if let Some(file) = stored_file {
            self.media.remove(&file.storage_name).await?;
        }

        self.log_write(ctx, access, "delete", schema, &current);
        if let Some(forwards) = user_forwards {
            self.forwards.apply_user_removal(forwards).await;
        }
        self.after_write(schema, Some(&current), None).await;
        Ok(Outcome::Applied(None))
    }

    /// `POST /files`
    pub async fn upload(
        &self,
        ctx: &AuthContext,
        name: Option<String>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Value> {
        let schema = lookup("files")?;
        resolve(ctx, schema, Method::Post, Scope::Resource)?;

        let file = self.media.upload(name, content_type, bytes, ctx.user_id()).await?;
        log_user_action(ctx.user_id(), "upload", Some(&format!("file {}", file.id)));

        self.db
            .resources
            .find(schema, file.id)
            .await?
            .ok_or_else(|| MemberHubError::not_found("files", file.id))
    }

    /// `GET /users/{id}/permissions`
    pub async fn user_permissions(&self, ctx: &AuthContext, key: &str) -> Result<Value> {
        let schema = lookup("users")?;
        let access = resolve(ctx, schema, Method::Get, Scope::Item)?;
        let user = self.fetch(schema, key).await?;
        check_item_access(schema, access, &user)?;

        let id = document_id(&user).ok_or_else(|| MemberHubError::not_found("users", key))?;
        let grants = self.db.permissions.for_user(id).await?;
        let map = permission_map(&grants, &self.settings.roles, Utc::now());
        Ok(json!(map))
    }

    /// `GET /docs`
    pub fn docs(&self) -> Value {
        json!({ "resources": registry() })
    }

    /// `GET /roles`
    pub fn roles(&self) -> Value {
        json!(self.settings.roles)
    }

    /// `POST /confirms`
    pub async fn confirm(&self, token: &str) -> Result<Value> {
        self.confirm.redeem(token).await
    }

    async fn create_signup(&self, ctx: &AuthContext, access: Access, mut payload: Map<String, Value>) -> Result<Outcome> {
        let schema = lookup("eventsignups")?;

        if access == Access::Public {
            if payload.contains_key("user_id") {
                return Err(MemberHubError::Authentication(
                    "Please log in to sign up with a user_id".to_string(),
                ));
            }
            let mut signup: NewSignup = serde_json::from_value(Value::Object(payload))?;
            let event = self.signups.precheck(&mut signup, None).await?;
            let email = signup.email.clone().unwrap_or_default();

            return self
                .confirm
                .defer(DeferredChange {
                    resource: schema.name.to_string(),
                    action: ConfirmAction::Insert,
                    payload: serde_json::to_value(&signup)?,
                    target_id: None,
                    email,
                    subject: event.display_title(),
                })
                .await;
        }

        claim_ownership(schema, access, &mut payload, true)?;
        let signup: NewSignup = serde_json::from_value(Value::Object(payload))?;
        let user_email = match signup.user_id {
            Some(user_id) if Some(user_id) == ctx.user_id() => ctx.user.as_ref().map(|u| u.email.clone()),
            Some(user_id) => Some(
                self.db
                    .users
                    .find_by_id(user_id)
                    .await?
                    .ok_or_else(|| {
                        MemberHubError::issue("user_id", format!("value '{}' must exist in resource 'users'", user_id))
                    })?
                    .email,
            ),
            None => None,
        };

        let mut tx = self.db.begin().await?;
        let document = SignupService::create(&mut tx, signup, user_email.as_deref()).await?;
        tx.commit().await?;

        self.log_write(ctx, access, "create", schema, &document);
        Ok(Outcome::Applied(Some(document)))
    }

    /// Forward guests may subscribe to
    async fn public_forward(&self, forward_id: i64) -> Result<Forward> {
        let forward = self.db.forwards.find_by_id(forward_id).await?.ok_or_else(|| {
            MemberHubError::issue("forward_id", format!("value '{}' must exist in resource 'forwards'", forward_id))
        })?;
        if !forward.is_public {
            return Err(MemberHubError::PermissionDenied(
                "You are not allowed to subscribe to this forward".to_string(),
            ));
        }
        Ok(forward)
    }

    async fn defer_subscription(&self, payload: Map<String, Value>) -> Result<Outcome> {
        let forward_id = payload.get("forward_id").and_then(Value::as_i64).unwrap_or_default();
        let forward = self.public_forward(forward_id).await?;

        let email = payload
            .get("address")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.confirm
            .defer(DeferredChange {
                resource: "forwardaddresses".to_string(),
                action: ConfirmAction::Insert,
                payload: Value::Object(payload),
                target_id: None,
                email,
                subject: forward.address,
            })
            .await
    }

    /// Guest changes to a signup or subscription: the new values wait for
    /// confirmation by mail
    async fn defer_update(
        &self,
        schema: &ResourceSchema,
        id: i64,
        original: Value,
        payload: Map<String, Value>,
        replace: bool,
    ) -> Result<Outcome> {
        let action = if replace { ConfirmAction::Replace } else { ConfirmAction::Update };
        let (mut email, subject) = self.confirmation_target(schema, &original, action).await?;

        if schema.name == "forwardaddresses" {
            let forward_id = payload.get("forward_id").and_then(Value::as_i64);
            if let Some(forward_id) = forward_id.filter(|f| Some(*f) != id_field(&original, "forward_id")) {
                self.public_forward(forward_id).await?;
            }
            // a new address confirms it can be reached
            if let Some(address) = payload.get("address").and_then(Value::as_str) {
                email = address.to_string();
            }
        }

        self.confirm
            .defer(DeferredChange {
                resource: schema.name.to_string(),
                action,
                payload: Value::Object(payload),
                target_id: Some(id),
                email,
                subject,
            })
            .await
    }

    async fn defer_delete(&self, schema: &ResourceSchema, id: i64, original: Value) -> Result<Outcome> {
        let (email, subject) = self.confirmation_target(schema, &original, ConfirmAction::Delete).await?;

        self.confirm
            .defer(DeferredChange {
                resource: schema.name.to_string(),
                action: ConfirmAction::Delete,
                payload: original,
                target_id: Some(id),
                email,
                subject,
            })
            .await
    }

    /// Address a guest change to a stored document is confirmed by, and
    /// what the mail is about
    async fn confirmation_target(
        &self,
        schema: &ResourceSchema,
        original: &Value,
        action: ConfirmAction,
    ) -> Result<(String, String)> {
        let target = match schema.name {
            "eventsignups" => {
                if original.get("user_id").map_or(false, |v| !v.is_null()) {
                    let verb = if action == ConfirmAction::Delete { "remove" } else { "change" };
                    return Err(MemberHubError::Authentication(format!(
                        "Please log in to {} this signup",
                        verb
                    )));
                }
                let event_id = id_field(original, "event_id").unwrap_or_default();
                let subject = match self.db.events.find_by_id(event_id).await? {
                    Some(event) => event.display_title(),
                    None => format!("event {}", event_id),
                };
                (original.get("email").and_then(Value::as_str).unwrap_or_default().to_string(), subject)
            }
            "forwardaddresses" => {
                let forward_id = id_field(original, "forward_id").unwrap_or_default();
                let subject = match self.db.forwards.find_by_id(forward_id).await? {
                    Some(forward) => forward.address,
                    None => format!("forward {}", forward_id),
                };
                (original.get("address").and_then(Value::as_str).unwrap_or_default().to_string(), subject)
            }
            other => {
                let method = match action {
                    ConfirmAction::Delete => Method::Delete,
                    ConfirmAction::Replace => Method::Put,
                    ConfirmAction::Insert => Method::Post,
                    ConfirmAction::Update => Method::Patch,
                };
                return Err(MemberHubError::MethodNotAllowed {
                    method: method.to_string(),
                    resource: other.to_string(),
                });
            }
        };
        Ok(target)
    }

    /// Whether the caller may enroll users on the forward without being
    /// one of them. Errors if they may not enroll at all.
    async fn check_enrollment(&self, ctx: &AuthContext, access: Access, payload: &Map<String, Value>) -> Result<bool> {
        let forward_id = payload.get("forward_id").and_then(Value::as_i64).unwrap_or_default();
        let forward = self.db.forwards.find_by_id(forward_id).await?.ok_or_else(|| {
            MemberHubError::issue("forward_id", format!("value '{}' must exist in resource 'forwards'", forward_id))
        })?;

        let owns_forward = ctx.user_id() == Some(forward.owner_id);
        if !forward.is_public && !access.is_admin() && !owns_forward {
            return Err(MemberHubError::PermissionDenied(
                "You are not allowed to self enroll for this forward".to_string(),
            ));
        }
        Ok(owns_forward)
    }

    /// Rules specific to a resource, checked before inserts and updates.
    /// `original` is the stored document for updates.
    async fn before_write(
        &self,
        access: Access,
        schema: &ResourceSchema,
        payload: &mut Map<String, Value>,
        original: Option<&Value>,
        replace: bool,
    ) -> Result<()> {
        match schema.name {
            "users" => {
                if original.is_some() && !access.is_admin() {
                    if let Some(field) = ADMIN_ONLY_USER_FIELDS.iter().find(|f| payload.contains_key(**f)) {
                        return Err(MemberHubError::PermissionDenied(format!(
                            "You are not allowed to change your {}",
                            field
                        )));
                    }
                }
                if let Some(password) = payload.get("password").and_then(Value::as_str) {
                    let hash = AuthService::hash_password(password)?;
                    payload.insert("password".to_string(), Value::String(hash));
                }
            }
            "forwards" => {
                if let Some(address) = payload.get("address").and_then(Value::as_str) {
                    let exclude = original.and_then(document_id);
                    if let Some(other) = self.db.forwards.find_by_local_part(address, exclude).await? {
                        return Err(MemberHubError::issue(
                            "address",
                            format!("local part is already used by forward '{}'", other.address),
                        ));
                    }
                }
            }
            "events" => {
                // a PUT starts from scratch
                let base = if replace { None } else { original };
                check_event(&merged_rules(base, payload)?)?;
            }
            "eventsignups" => {
                if let (Some(original), Some(extra_data)) = (original, payload.get("extra_data")) {
                    let event_id = id_field(original, "event_id").unwrap_or_default();
                    if let Some(event) = self.db.events.find_by_id(event_id).await? {
                        check_extra_data(&event, Some(extra_data))?;
                    }
                }
            }
            "joboffers" => {
                self.check_file_reference(payload, "logo_id", |f| f.is_image(), "file must be a png or jpeg image")
                    .await?;
                self.check_file_reference(payload, "pdf_id", |f| f.is_pdf(), "file must be a pdf")
                    .await?;
            }
            "permissions" => {
                if let Some(role) = payload.get("role").and_then(Value::as_str) {
                    if !self.settings.roles.contains_key(role) {
                        return Err(MemberHubError::issue("role", format!("unallowed value {}", role)));
                    }
                }
                if let Some(expiry) = payload.get("expiry_date").and_then(Value::as_str) {
                    let expiry = chrono::DateTime::parse_from_rfc3339(expiry)
                        .map_err(|_| MemberHubError::issue("expiry_date", "must be a datetime"))?;
                    if expiry < Utc::now() {
                        return Err(MemberHubError::Unprocessable(
                            "expiry_date needs to be in the future".to_string(),
                        ));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    async fn check_file_reference(
        &self,
        payload: &Map<String, Value>,
        field: &str,
        accepts: impl Fn(&crate::models::StoredFile) -> bool,
        message: &str,
    ) -> Result<()> {
        let Some(file_id) = payload.get(field).and_then(Value::as_i64) else {
            return Ok(());
        };
        let file = self.media.find(file_id).await?.ok_or_else(|| {
            MemberHubError::issue(field, format!("value '{}' must exist in resource 'files'", file_id))
        })?;
        if !accepts(&file) {
            return Err(MemberHubError::issue(field, message));
        }
        Ok(())
    }

    /// Keep forward files current after a committed write
    async fn after_write(&self, schema: &ResourceSchema, before: Option<&Value>, after: Option<&Value>) {
        match schema.name {
            "forwards" => {
                let old_address = before.and_then(|d| d.get("address")).and_then(Value::as_str);
                let new_address = after.and_then(|d| d.get("address")).and_then(Value::as_str);
                if let Some(old) = old_address.filter(|old| Some(*old) != new_address) {
                    if let Err(e) = self.forwards.remove(old).await {
                        tracing::error!(address = old, error = %e, "Failed to remove forward file");
                    }
                }
                if let Some(id) = after.and_then(document_id) {
                    self.forwards.resync_logged(id).await;
                }
            }
            "forwardusers" | "forwardaddresses" => {
                let mut forward_ids: Vec<i64> = [before, after]
                    .into_iter()
                    .flatten()
                    .filter_map(|d| id_field(d, "forward_id"))
                    .collect();
                forward_ids.dedup();
                for forward_id in forward_ids {
                    self.forwards.resync_logged(forward_id).await;
                }
            }
            "users" => {
                let old_email = before.and_then(|d| d.get("email"));
                let new_email = after.and_then(|d| d.get("email"));
                if let (Some(user), true) = (after.and_then(document_id), old_email != new_email) {
                    if let Err(e) = self.forwards.resync_user(user).await {
                        tracing::error!(user_id = user, error = %e, "Failed to sync forwards of user");
                    }
                }
            }
            _ => {}
        }
    }

    fn log_write(&self, ctx: &AuthContext, access: Access, action: &str, schema: &ResourceSchema, document: &Value) {
        let target = format!("{} {}", schema.name, document_id(document).unwrap_or_default());
        match (access, ctx.user_id()) {
            (Access::Admin, Some(admin_id)) => log_admin_action(admin_id, action, Some(&target), None),
            (_, user_id) => log_user_action(user_id, action, Some(&target)),
        }
    }
}
