//! Resource and field declarations

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::utils::errors::{MemberHubError, Result};

/// Verbs of the REST interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    pub const ALL: [Method; 5] = [Method::Get, Method::Post, Method::Patch, Method::Put, Method::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    pub fn parse(verb: &str) -> Option<Method> {
        Method::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(verb))
    }

    /// Whether the verb writes data
    pub fn is_write(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection endpoint (`/events`) or item endpoint (`/events/{id}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Resource,
    Item,
}

/// Value types a field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Email,
    Integer,
    Boolean,
    Datetime,
    Date,
    Decimal,
    Json,
    Uuid,
    IntegerList,
}

/// Validation rules of a single field
#[derive(Debug, Clone, Serialize)]
pub struct FieldSchema {
    pub name: &'static str,
    #[serde(skip)]
    pub column: &'static str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub required: bool,
    pub unique: bool,
    pub readonly: bool,
    #[serde(skip)]
    pub hidden: bool,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    pub not_patchable: bool,
    /// Not stored in a column of the resource table (e.g. join tables)
    #[serde(skip)]
    pub virtual_field: bool,
}

impl FieldSchema {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column: name,
            kind,
            required: false,
            unique: false,
            readonly: false,
            hidden: false,
            nullable: true,
            max_length: None,
            regex: None,
            allowed: None,
            dependencies: Vec::new(),
            min: None,
            not_patchable: false,
            virtual_field: false,
        }
    }

    pub fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn regex(mut self, pattern: &'static str) -> Self {
        self.regex = Some(pattern);
        self
    }

    pub fn allowed(mut self, values: &[&'static str]) -> Self {
        self.allowed = Some(values.to_vec());
        self
    }

    pub fn depends_on(mut self, fields: &[&'static str]) -> Self {
        self.dependencies = fields.to_vec();
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn not_patchable(mut self) -> Self {
        self.not_patchable = true;
        self
    }

    pub fn virtual_field(mut self) -> Self {
        self.virtual_field = true;
        self
    }

    /// Whether list queries may filter and sort on this field
    pub fn is_queryable(&self) -> bool {
        !self.hidden && !self.virtual_field && !matches!(self.kind, FieldKind::Json | FieldKind::IntegerList)
    }
}

/// Declaration of a REST resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSchema {
    pub name: &'static str,
    #[serde(skip)]
    pub table: &'static str,
    pub description: &'static str,
    pub resource_methods: Vec<Method>,
    pub item_methods: Vec<Method>,
    pub public_methods: Vec<Method>,
    pub public_item_methods: Vec<Method>,
    /// Verbs any logged-in user may use
    pub registered_methods: Vec<Method>,
    /// Columns holding the id of the user owning an item
    pub owner_fields: Vec<&'static str>,
    /// Verbs owners may use on their own items
    pub owner_methods: Vec<Method>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_lookup: Option<&'static str>,
    pub schema: Vec<FieldSchema>,
}

impl ResourceSchema {
    fn new(name: &'static str, table: &'static str, description: &'static str) -> Self {
        Self {
            name,
            table,
            description,
            resource_methods: vec![Method::Get, Method::Post],
            item_methods: vec![Method::Get, Method::Patch, Method::Delete],
            public_methods: Vec::new(),
            public_item_methods: Vec::new(),
            registered_methods: Vec::new(),
            owner_fields: Vec::new(),
            owner_methods: Vec::new(),
            additional_lookup: None,
            schema: Vec::new(),
        }
    }

    fn item_methods(mut self, methods: &[Method]) -> Self {
        self.item_methods = methods.to_vec();
        self
    }

    fn public(mut self, resource: &[Method], item: &[Method]) -> Self {
        self.public_methods = resource.to_vec();
        self.public_item_methods = item.to_vec();
        self
    }

    fn registered(mut self, methods: &[Method]) -> Self {
        self.registered_methods = methods.to_vec();
        self
    }

    fn owned_by(mut self, fields: &[&'static str], methods: &[Method]) -> Self {
        self.owner_fields = fields.to_vec();
        self.owner_methods = methods.to_vec();
        self
    }

    fn lookup_by(mut self, field: &'static str) -> Self {
        self.additional_lookup = Some(field);
        self
    }

    fn field(mut self, field: FieldSchema) -> Self {
        self.schema.push(field);
        self
    }

    pub fn supports(&self, method: Method, scope: Scope) -> bool {
        match scope {
            Scope::Resource => self.resource_methods.contains(&method),
            Scope::Item => self.item_methods.contains(&method),
        }
    }

    pub fn is_public(&self, method: Method, scope: Scope) -> bool {
        match scope {
            Scope::Resource => self.public_methods.contains(&method),
            Scope::Item => self.public_item_methods.contains(&method),
        }
    }

    pub fn field_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.schema.iter().find(|f| f.name == name)
    }

    /// Column behind a queryable field
    pub fn queryable_column(&self, name: &str) -> Option<&'static str> {
        if name == "id" {
            return Some("id");
        }
        if name == "_created" {
            return Some("created_at");
        }
        if name == "_updated" {
            return Some("updated_at");
        }
        self.field_schema(name).filter(|f| f.is_queryable()).map(|f| f.column)
    }

    /// Reject verbs the resource does not offer
    pub fn ensure_supported(&self, method: Method, scope: Scope) -> Result<()> {
        if self.supports(method, scope) {
            Ok(())
        } else {
            Err(MemberHubError::MethodNotAllowed {
                method: method.to_string(),
                resource: self.name.to_string(),
            })
        }
    }
}

const EMAIL_REGEX: &str = r"^.+@.+$";
const DEPARTMENTS: &[&str] = &["itet", "mavt"];

use FieldKind as K;
use Method::{Delete, Get, Patch, Post, Put};

fn build_registry() -> Vec<ResourceSchema> {
    vec![
        ResourceSchema::new("users", "users", "Members and other people known to the organization.")
            .item_methods(&[Get, Patch, Put, Delete])
            .owned_by(&["id"], &[Get, Patch])
            .lookup_by("username")
            .field(FieldSchema::new("username", K::String).required().unique().max_length(50))
            .field(FieldSchema::new("password", K::String).hidden().max_length(100))
            .field(FieldSchema::new("firstname", K::String).required().max_length(50))
            .field(FieldSchema::new("lastname", K::String).required().max_length(50))
            .field(FieldSchema::new("birthday", K::Date))
            .field(FieldSchema::new("legi", K::String).max_length(8).regex(r"^\d{8}$"))
            .field(FieldSchema::new("rfid", K::String).max_length(6).regex(r"^\d{6}$"))
            .field(FieldSchema::new("nethz", K::String).max_length(30))
            .field(FieldSchema::new("department", K::String).allowed(DEPARTMENTS))
            .field(FieldSchema::new("phone", K::String).max_length(20))
            .field(FieldSchema::new("ldap_address", K::String).max_length(200))
            .field(FieldSchema::new("gender", K::String).required().allowed(&["male", "female"]))
            .field(FieldSchema::new("email", K::Email).required().unique().max_length(100).regex(EMAIL_REGEX))
            .field(
                FieldSchema::new("membership", K::String)
                    .allowed(&["none", "regular", "extraordinary", "honorary"]),
            ),
        ResourceSchema::new("groups", "groups", "Groups of members, e.g. commissions.")
            .registered(&[Get])
            .field(FieldSchema::new("name", K::String).required().max_length(30)),
        ResourceSchema::new("groupmemberships", "group_memberships", "Membership of a user in a group.")
            .owned_by(&["user_id"], &[Get, Delete])
            .field(FieldSchema::new("user_id", K::Integer).required().not_patchable())
            .field(FieldSchema::new("group_id", K::Integer).required().not_patchable())
            .field(FieldSchema::new("expiry_date", K::Datetime)),
        ResourceSchema::new("forwards", "forwards", "Mailing list aliases.")
            .registered(&[Get])
            .owned_by(&["owner_id"], &[Get, Patch, Delete])
            .field(FieldSchema::new("address", K::Email).required().unique().max_length(100).regex(EMAIL_REGEX))
            .field(FieldSchema::new("owner_id", K::Integer).required())
            .field(FieldSchema::new("is_public", K::Boolean)),
        ResourceSchema::new("forwardusers", "forward_users", "Users subscribed to a forward.")
            .item_methods(&[Get, Delete])
            .registered(&[Post])
            .owned_by(&["user_id"], &[Get, Delete])
            .field(FieldSchema::new("forward_id", K::Integer).required())
            .field(FieldSchema::new("user_id", K::Integer).required()),
        ResourceSchema::new("forwardaddresses", "forward_addresses", "External addresses subscribed to a forward. Anonymous changes need email confirmation.")
            .item_methods(&[Get, Put, Delete])
            .public(&[Post], &[Put, Delete])
            .field(FieldSchema::new("forward_id", K::Integer).required())
            .field(FieldSchema::new("address", K::Email).required().max_length(100).regex(EMAIL_REGEX)),
        ResourceSchema::new("sessions", "sessions", "Login sessions. POST username and password to obtain a token.")
            .item_methods(&[Get, Delete])
            .public(&[Post], &[])
            .owned_by(&["user_id"], &[Get, Delete])
            .field(FieldSchema::new("user_id", K::Integer).readonly())
            .field(FieldSchema::new("token", K::String).readonly()),
        ResourceSchema::new("events", "events", "Events members and guests can sign up for.")
            .item_methods(&[Get, Patch, Put, Delete])
            .public(&[Get], &[Get])
            .field(FieldSchema::new("title", K::String).max_length(50))
            .field(FieldSchema::new("time_start", K::Datetime))
            .field(FieldSchema::new("time_end", K::Datetime).depends_on(&["time_start"]))
            .field(FieldSchema::new("location", K::String).max_length(50))
            .field(FieldSchema::new("description", K::String))
            .field(FieldSchema::new("is_public", K::Boolean))
            .field(FieldSchema::new("price", K::Decimal).min(0.0))
            .field(FieldSchema::new("spots", K::Integer).min(-1.0))
            .field(FieldSchema::new("time_register_start", K::Datetime))
            .field(FieldSchema::new("time_register_end", K::Datetime))
            .field(FieldSchema::new("additional_fields", K::Json))
            .field(FieldSchema::new("title_id", K::Uuid).readonly())
            .field(FieldSchema::new("description_id", K::Uuid).readonly()),
        ResourceSchema::new("eventsignups", "event_signups", "Signups for events. Guests sign up with an email address and confirm by token.")
            .public(&[Post], &[Patch, Delete])
            .registered(&[Post])
            .owned_by(&["user_id"], &[Get, Patch, Delete])
            .field(FieldSchema::new("event_id", K::Integer).required().not_patchable())
            .field(FieldSchema::new("user_id", K::Integer).depends_on(&["event_id"]).not_patchable())
            .field(
                FieldSchema::new("email", K::Email)
                    .max_length(100)
                    .regex(EMAIL_REGEX)
                    .not_patchable(),
            )
            .field(FieldSchema::new("extra_data", K::Json)),
        ResourceSchema::new("files", "files", "Uploaded files. Upload as multipart form with a `data` part.")
            .item_methods(&[Get, Delete])
            .public(&[Get], &[Get])
            .registered(&[Post])
            .owned_by(&["author_id"], &[Delete])
            .field(FieldSchema::new("name", K::String).max_length(100))
            .field(FieldSchema::new("content_type", K::String).readonly())
            .field(FieldSchema::new("size", K::Integer).readonly())
            .field(FieldSchema::new("content_url", K::String).readonly())
            .field(FieldSchema::new("_author", K::Integer).column("author_id").readonly()),
        ResourceSchema::new("studydocuments", "study_documents", "Old exams and summaries shared by students.")
            .item_methods(&[Get, Patch, Put, Delete])
            .registered(&[Get, Post])
            .owned_by(&["author_id"], &[Patch, Put, Delete])
            .field(FieldSchema::new("name", K::String).required().max_length(100))
            .field(FieldSchema::new("type", K::String).column("doc_type").max_length(30))
            .field(FieldSchema::new("exam_session", K::String).max_length(10))
            .field(FieldSchema::new("department", K::String).allowed(DEPARTMENTS))
            .field(FieldSchema::new("lecture", K::String).max_length(100))
            .field(FieldSchema::new("professor", K::String).max_length(100))
            .field(FieldSchema::new("semester", K::Integer).min(1.0))
            .field(FieldSchema::new("author_name", K::String).max_length(100))
            .field(FieldSchema::new("files", K::IntegerList).virtual_field())
            .field(FieldSchema::new("_author", K::Integer).column("author_id").readonly()),
        ResourceSchema::new("joboffers", "job_offers", "Job offers of partner companies.")
            .item_methods(&[Get, Patch, Put, Delete])
            .public(&[Get], &[Get])
            .field(FieldSchema::new("company", K::String).required().max_length(30))
            .field(FieldSchema::new("title", K::String).max_length(100))
            .field(FieldSchema::new("description", K::String))
            .field(FieldSchema::new("logo_id", K::Integer))
            .field(FieldSchema::new("pdf_id", K::Integer))
            .field(FieldSchema::new("time_end", K::Datetime))
            .field(FieldSchema::new("title_id", K::Uuid).readonly())
            .field(FieldSchema::new("description_id", K::Uuid).readonly()),
        ResourceSchema::new("permissions", "permissions", "Time-bounded role grants.")
            .owned_by(&["user_id"], &[Get])
            .field(FieldSchema::new("user_id", K::Integer).required().not_patchable())
            .field(FieldSchema::new("role", K::String).required().max_length(50))
            .field(FieldSchema::new("expiry_date", K::Datetime).required()),
        ResourceSchema::new("translations", "translations", "Translated titles and descriptions of events and job offers.")
            .public(&[Get], &[Get])
            .field(FieldSchema::new("localization_id", K::Uuid).required().not_patchable())
            .field(FieldSchema::new("language", K::String).required().max_length(10).not_patchable())
            .field(FieldSchema::new("content", K::String).required()),
    ]
}

static REGISTRY: OnceLock<Vec<ResourceSchema>> = OnceLock::new();

/// All declared resources
pub fn registry() -> &'static [ResourceSchema] {
    REGISTRY.get_or_init(build_registry)
}

/// Look up a resource declaration by name
pub fn lookup(name: &str) -> Result<&'static ResourceSchema> {
    registry()
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| MemberHubError::not_found("resource", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_resource_is_unique() {
        let mut names: Vec<_> = registry().iter().map(|r| r.name).collect();
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
        assert_eq!(count, 13);
    }

    #[test]
    fn test_owner_fields_are_columns() {
        for resource in registry() {
            for owner in &resource.owner_fields {
                assert!(
                    *owner == "id" || resource.schema.iter().any(|f| f.column == *owner),
                    "{} owner field {} is not a column",
                    resource.name,
                    owner
                );
            }
        }
    }

    #[test]
    fn test_password_is_not_queryable() {
        let users = lookup("users").unwrap();
        assert_eq!(users.queryable_column("password"), None);
        assert_eq!(users.queryable_column("username"), Some("username"));
        assert_eq!(users.queryable_column("_created"), Some("created_at"));
    }

    #[test]
    fn test_renamed_columns() {
        let docs = lookup("studydocuments").unwrap();
        assert_eq!(docs.queryable_column("type"), Some("doc_type"));
        assert_eq!(docs.queryable_column("_author"), Some("author_id"));
        assert_eq!(docs.queryable_column("files"), None);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("patch"), Some(Method::Patch));
        assert_eq!(Method::parse("OPTIONS"), None);
        assert!(Method::Delete.is_write());
        assert!(!Method::Get.is_write());
    }

    #[test]
    fn test_signup_methods() {
        let signups = lookup("eventsignups").unwrap();
        assert!(signups.is_public(Method::Post, Scope::Resource));
        assert!(!signups.is_public(Method::Get, Scope::Resource));
        assert!(signups.supports(Method::Patch, Scope::Item));
        assert!(!signups.supports(Method::Put, Scope::Item));
        assert!(signups.is_public(Method::Patch, Scope::Item));
        assert!(lookup("forwardaddresses").unwrap().is_public(Method::Put, Scope::Item));
        assert!(lookup("nothing").is_err());
    }
}
