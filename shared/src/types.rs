use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ========== ATTRIBUTE DEFINITIONS ==========

/// Closed set of field types an attribute can declare. Governs the expected
/// value shape and how the frontend renders the field; dynamic record values
/// are not validated against it unless strict mode is enabled.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Boolean,
    Array,
    Select,
    Url,
    Mixed,
    ImageArray,
}

impl FieldType {
    pub const ALL: &'static [&'static str] = &[
        "text",
        "number",
        "date",
        "boolean",
        "array",
        "select",
        "url",
        "mixed",
        "image_array",
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "select" => Some(Self::Select),
            "url" => Some(Self::Url),
            "mixed" => Some(Self::Mixed),
            "image_array" => Some(Self::ImageArray),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Select => "select",
            Self::Url => "url",
            Self::Mixed => "mixed",
            Self::ImageArray => "image_array",
        }
    }
}

/// One entry of an attribute's `default_options` list. Accepts either a bare
/// string or an option object with value/label and optional grouping. A bare
/// string starting with `$` (e.g. `$countries`) is a sentinel resolved from
/// the static reference lists at read time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum AttributeOption {
    Plain(String),
    Detailed {
        value: String,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        group: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttributeDefinition {
    pub slug: String,
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub default_options: Vec<AttributeOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttributeRequest {
    pub slug: String,
    pub name: String,
    pub field_type: String,
    pub default_options: Option<serde_json::Value>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAttributeRequest {
    pub name: String,
    pub field_type: String,
    pub default_options: Option<serde_json::Value>,
    pub description: Option<String>,
}

// ========== USER TYPE CONFIGS ==========

/// Which discriminated record kind a user-type template applies to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ParentType {
    Collaborator,
    Agency,
}

impl ParentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Collaborator" => Some(Self::Collaborator),
            "Agency" => Some(Self::Agency),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collaborator => "Collaborator",
            Self::Agency => "Agency",
        }
    }
}

/// A field slot inside a user-type template. `field_type`, `default_options`
/// and `description` are a snapshot copied from the referenced attribute at
/// the time the template was written, not a live reference.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FieldBinding {
    pub attribute_slug: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub field_type: FieldType,
    #[serde(default)]
    pub default_options: Vec<AttributeOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Caller-supplied field entry. Snapshot keys sent by the caller are ignored;
/// they are always re-copied from the attribute catalog.
#[derive(Debug, Deserialize, Clone)]
pub struct FieldBindingInput {
    pub attribute_slug: String,
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub section: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserTypeConfig {
    pub slug: String,
    pub name: String,
    pub parent_type: ParentType,
    pub fields: Vec<FieldBinding>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserTypeRequest {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub parent_type: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldBindingInput>,
}

/// A template field joined against the current attribute catalog.
#[derive(Debug, Serialize, Clone)]
pub struct EnrichedField {
    #[serde(flatten)]
    pub binding: FieldBinding,
    pub attribute_details: AttributeDefinition,
}

#[derive(Debug, Serialize, Clone)]
pub struct EnrichedUserType {
    pub slug: String,
    pub name: String,
    pub parent_type: ParentType,
    pub fields: Vec<EnrichedField>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A template field whose attribute no longer resolves. Never surfaced to the
/// client; logged so out-of-band deletions remain debuggable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedField {
    pub user_type_slug: String,
    pub attribute_slug: String,
}

// ========== USER RECORDS ==========

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Collaborator,
    Agency,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Admin" => Some(Self::Admin),
            "Collaborator" => Some(Self::Collaborator),
            "Agency" => Some(Self::Agency),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Collaborator => "Collaborator",
            Self::Agency => "Agency",
        }
    }
}

/// Descriptor for an uploaded file stored under an `image_array` attribute.
/// The record store treats these as opaque array elements; S3 holds the
/// actual bytes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FileDescriptor {
    pub path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

/// Value slot of the dynamic attribute bag. Untagged, so any JSON shape a
/// caller sends round-trips; the named variants exist so filter matching and
/// the array helpers can work on typed data instead of raw JSON.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Files(Vec<FileDescriptor>),
    Items(Vec<serde_json::Value>),
    Other(serde_json::Value),
}

impl AttrValue {
    pub fn from_json(value: serde_json::Value) -> Self {
        // Untagged deserialization from an owned Value cannot fail: the
        // Other variant accepts anything.
        serde_json::from_value(value.clone()).unwrap_or(AttrValue::Other(value))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// View this value as a list of JSON items, defaulting to empty for
    /// non-array values. Used by the array-attribute helpers.
    pub fn as_items(&self) -> Vec<serde_json::Value> {
        match self {
            AttrValue::Files(files) => files
                .iter()
                .filter_map(|f| serde_json::to_value(f).ok())
                .collect(),
            AttrValue::Items(items) => items.clone(),
            AttrValue::Other(serde_json::Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Rebuild a bag value from a list of JSON items, re-detecting file
    /// descriptor arrays so they stay typed.
    pub fn from_items(items: Vec<serde_json::Value>) -> Self {
        AttrValue::from_json(serde_json::Value::Array(items))
    }
}

/// The dynamic per-record attribute mapping, keyed by attribute slug.
/// BTreeMap keeps serialization order stable.
pub type AttributeBag = BTreeMap<String, AttrValue>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
    /// Discriminant slug into the Collaborator user-type templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborator_type: Option<String>,
    /// Discriminant slug into the Agency user-type templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Admin permission set; empty for other roles.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub group_specific_attributes: AttributeBag,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub role: String,
    pub collaborator_type: Option<String>,
    pub agency_type: Option<String>,
    /// Everything else: static profile fields and dynamic attributes, split
    /// by the record store's allow-list.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct UserQueryResponse {
    pub users: Vec<UserRecord>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

#[derive(Debug, Deserialize)]
pub struct AppendItemsRequest {
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveItemRequest {
    pub path: String,
}

// ========== JOBS ==========

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Job {
    pub job_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub posted_by: String,
    /// Optional user-type slug the poster is looking for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_user_type: Option<String>,
    pub status: String, // open | closed | filled
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub description: Option<String>,
    pub required_user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobApplication {
    pub job_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub applied_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplyToJobRequest {
    pub message: Option<String>,
}
