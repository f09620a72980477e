use crate::error::RegistryError;
use crate::types::{
    AppendItemsRequest, AttrValue, AttributeBag, CreateUserRequest, RemoveItemRequest, Role,
    UserQueryResponse, UserRecord, UserTypeConfig,
};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::{BTreeMap, HashMap};

/// Static profile fields a caller may set through the open field map. Keys
/// outside this list (and outside the reserved set) land in the dynamic bag.
const STATIC_PROFILE_FIELDS: &[&str] = &[
    "name",
    "phone",
    "city",
    "country",
    "bio",
    "collaborator_type",
    "agency_type",
    "permissions",
];

/// Control fields that are never routed into the bag and never overwritten
/// through the open field map.
const RESERVED_FIELDS: &[&str] = &[
    "user_id",
    "email",
    "password",
    "role",
    "created_at",
    "updated_at",
    "PK",
    "SK",
];

#[derive(Debug, Default, PartialEq)]
pub struct PartitionedFields {
    pub statics: serde_json::Map<String, serde_json::Value>,
    pub dynamic: AttributeBag,
}

/// Split an open field map into static profile fields and dynamic bag
/// entries. Unknown slugs are accepted verbatim; reserved control keys are
/// silently dropped.
pub fn partition_profile_fields(
    fields: serde_json::Map<String, serde_json::Value>,
) -> PartitionedFields {
    let mut parts = PartitionedFields::default();
    for (key, value) in fields {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if STATIC_PROFILE_FIELDS.contains(&key.as_str()) {
            parts.statics.insert(key, value);
        } else {
            parts.dynamic.insert(key, AttrValue::from_json(value));
        }
    }
    parts
}

/// Merge a dynamic patch into an existing bag: patch wins on key collision,
/// untouched keys survive. Load-bearing — a partial form submission must not
/// wipe previously stored values such as uploaded file lists.
pub fn merge_attribute_bag(existing: &mut AttributeBag, patch: AttributeBag) {
    for (key, value) in patch {
        existing.insert(key, value);
    }
}

/// Concatenate new items onto an array-valued bag slot, defaulting to empty
/// when the slot is absent or not an array.
pub fn append_to_array(existing: Option<&AttrValue>, new_items: Vec<serde_json::Value>) -> AttrValue {
    let mut items = existing.map(AttrValue::as_items).unwrap_or_default();
    items.extend(new_items);
    AttrValue::from_items(items)
}

/// Keep only the items the predicate rejects, writing back the remainder.
pub fn remove_from_array<F>(existing: Option<&AttrValue>, matches: F) -> AttrValue
where
    F: Fn(&serde_json::Value) -> bool,
{
    let items = existing.map(AttrValue::as_items).unwrap_or_default();
    AttrValue::from_items(items.into_iter().filter(|item| !matches(item)).collect())
}

/// Predicate for removing a file descriptor (or bare path string) by path.
pub fn item_has_path(item: &serde_json::Value, path: &str) -> bool {
    match item {
        serde_json::Value::String(s) => s == path,
        serde_json::Value::Object(obj) => {
            obj.get("path").and_then(|p| p.as_str()) == Some(path)
        }
        _ => false,
    }
}

/// Dynamic-attribute filter matching with the asymmetric boolean rule:
/// "true" only matches strict boolean true, while "false" also matches the
/// string "false", null and an absent field, so legacy records that stored
/// booleans as strings or omitted the field count as false.
pub fn matches_attribute_filter(value: Option<&AttrValue>, wanted: &str) -> bool {
    match wanted {
        "true" => matches!(value, Some(AttrValue::Bool(true))),
        "false" => match value {
            None => true,
            Some(AttrValue::Bool(false)) => true,
            Some(AttrValue::Text(s)) => s == "false",
            Some(AttrValue::Other(serde_json::Value::Null)) => true,
            _ => false,
        },
        _ => match value {
            Some(AttrValue::Text(s)) => s == wanted,
            Some(AttrValue::Number(n)) => n.to_string() == wanted,
            // Array values match when any element equals the filter term.
            Some(AttrValue::Items(items)) => items
                .iter()
                .any(|item| item.as_str() == Some(wanted)),
            _ => false,
        },
    }
}

/// Parsed query over the record store.
#[derive(Debug, Default)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub email: Option<String>,
    pub collaborator_type: Option<String>,
    pub agency_type: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub search: Option<String>,
    pub attribute_filters: BTreeMap<String, String>,
    pub page: usize,
    pub per_page: usize,
}

impl UserQuery {
    /// Split raw query parameters: fixed static filter fields, the `search`
    /// term, pagination controls, and everything else as a dynamic-attribute
    /// filter.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut query = UserQuery {
            page: 1,
            per_page: 20,
            ..UserQuery::default()
        };
        for (key, value) in params {
            match key.as_str() {
                "role" => query.role = Role::parse(value),
                "email" => query.email = Some(value.clone()),
                "collaborator_type" => query.collaborator_type = Some(value.clone()),
                "agency_type" => query.agency_type = Some(value.clone()),
                "city" => query.city = Some(value.clone()),
                "country" => query.country = Some(value.clone()),
                "search" => query.search = Some(value.clone()),
                "page" => query.page = value.parse().unwrap_or(1).max(1),
                "per_page" => query.per_page = value.parse().unwrap_or(20).clamp(1, 100),
                _ => {
                    query
                        .attribute_filters
                        .insert(key.clone(), value.clone());
                }
            }
        }
        query
    }
}

fn contains_insensitive(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle))
        .unwrap_or(false)
}

pub fn matches_query(record: &UserRecord, query: &UserQuery) -> bool {
    if let Some(role) = query.role {
        if record.role != role {
            return false;
        }
    }
    if let Some(email) = &query.email {
        if &record.email != email {
            return false;
        }
    }
    if let Some(ct) = &query.collaborator_type {
        if record.collaborator_type.as_deref() != Some(ct.as_str()) {
            return false;
        }
    }
    if let Some(at) = &query.agency_type {
        if record.agency_type.as_deref() != Some(at.as_str()) {
            return false;
        }
    }
    if let Some(city) = &query.city {
        if record.city.as_deref() != Some(city.as_str()) {
            return false;
        }
    }
    if let Some(country) = &query.country {
        if record.country.as_deref() != Some(country.as_str()) {
            return false;
        }
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let hit = contains_insensitive(record.name.as_deref(), &needle)
            || contains_insensitive(Some(&record.email), &needle)
            || contains_insensitive(record.bio.as_deref(), &needle);
        if !hit {
            return false;
        }
    }
    for (slug, wanted) in &query.attribute_filters {
        if !matches_attribute_filter(record.group_specific_attributes.get(slug), wanted) {
            return false;
        }
    }
    true
}

/// Strictness of the dynamic-bag check against the active user-type
/// template. Permissive matches the historical behavior: anything the
/// operator sends is stored verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Permissive,
    Strict,
}

impl ValidationMode {
    pub fn from_env() -> Self {
        match std::env::var("PROFILE_VALIDATION").as_deref() {
            Ok("strict") => Self::Strict,
            _ => Self::Permissive,
        }
    }
}

/// Strict-mode check of a bag against a template: every required field must
/// be present and every bag key must be declared. Both offender lists are
/// reported at once.
pub fn validate_against_template(
    bag: &AttributeBag,
    template: &UserTypeConfig,
) -> Result<(), RegistryError> {
    let declared: Vec<&str> = template
        .fields
        .iter()
        .map(|f| f.attribute_slug.as_str())
        .collect();

    let unknown: Vec<&String> = bag
        .keys()
        .filter(|key| !declared.contains(&key.as_str()))
        .collect();
    let missing: Vec<&str> = template
        .fields
        .iter()
        .filter(|f| f.required && !bag.contains_key(&f.attribute_slug))
        .map(|f| f.attribute_slug.as_str())
        .collect();

    if unknown.is_empty() && missing.is_empty() {
        return Ok(());
    }

    let mut problems = Vec::new();
    if !missing.is_empty() {
        problems.push(format!("missing required attributes: {}", missing.join(", ")));
    }
    if !unknown.is_empty() {
        let unknown: Vec<&str> = unknown.iter().map(|s| s.as_str()).collect();
        problems.push(format!("attributes not in template: {}", unknown.join(", ")));
    }
    Err(RegistryError::Validation(problems.join("; ")))
}

fn apply_static_fields(
    record: &mut UserRecord,
    statics: &serde_json::Map<String, serde_json::Value>,
) {
    let as_string =
        |v: &serde_json::Value| v.as_str().map(str::to_string);
    for (key, value) in statics {
        match key.as_str() {
            "name" => record.name = as_string(value),
            "phone" => record.phone = as_string(value),
            "city" => record.city = as_string(value),
            "country" => record.country = as_string(value),
            "bio" => record.bio = as_string(value),
            "collaborator_type" => record.collaborator_type = as_string(value),
            "agency_type" => record.agency_type = as_string(value),
            "permissions" => {
                record.permissions = value
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|i| i.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
            }
            _ => {}
        }
    }
}

// ---- DynamoDB item mapping ----

fn user_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

pub(crate) fn user_to_item(record: &UserRecord) -> HashMap<String, AttributeValue> {
    let pk = user_pk(&record.user_id);
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(pk.clone()));
    item.insert("SK".to_string(), AttributeValue::S(pk));
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(record.user_id.clone()),
    );
    item.insert("email".to_string(), AttributeValue::S(record.email.clone()));
    item.insert(
        "role".to_string(),
        AttributeValue::S(record.role.as_str().to_string()),
    );
    let mut put_opt = |key: &str, value: &Option<String>| {
        if let Some(value) = value {
            item.insert(key.to_string(), AttributeValue::S(value.clone()));
        }
    };
    put_opt("name", &record.name);
    put_opt("collaborator_type", &record.collaborator_type);
    put_opt("agency_type", &record.agency_type);
    put_opt("phone", &record.phone);
    put_opt("city", &record.city);
    put_opt("country", &record.country);
    put_opt("bio", &record.bio);
    put_opt("updated_at", &record.updated_at);
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(record.created_at.clone()),
    );
    if !record.permissions.is_empty() {
        item.insert(
            "permissions".to_string(),
            AttributeValue::S(serde_json::to_string(&record.permissions).unwrap_or_default()),
        );
    }
    item.insert(
        "group_specific_attributes".to_string(),
        AttributeValue::S(
            serde_json::to_string(&record.group_specific_attributes).unwrap_or_default(),
        ),
    );
    item
}

pub(crate) fn item_to_user(item: &HashMap<String, AttributeValue>) -> Option<UserRecord> {
    let get_s = |key: &str| {
        item.get(key)
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
    };
    let user_id = get_s("user_id")?;
    let role = item
        .get("role")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| Role::parse(s))?;
    Some(UserRecord {
        user_id,
        email: get_s("email").unwrap_or_default(),
        name: get_s("name"),
        role,
        collaborator_type: get_s("collaborator_type"),
        agency_type: get_s("agency_type"),
        phone: get_s("phone"),
        city: get_s("city"),
        country: get_s("country"),
        bio: get_s("bio"),
        permissions: get_s("permissions")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        group_specific_attributes: get_s("group_specific_attributes")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        created_at: get_s("created_at").unwrap_or_default(),
        updated_at: get_s("updated_at"),
    })
}

pub async fn fetch_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<UserRecord>, Error> {
    let pk = user_pk(user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;
    Ok(result.item().and_then(item_to_user))
}

async fn scan_users(client: &DynamoClient, table_name: &str) -> Result<Vec<UserRecord>, Error> {
    let mut users = Vec::new();
    let mut last_key = None;
    loop {
        let mut scan = client
            .scan()
            .table_name(table_name)
            .filter_expression("begins_with(PK, :prefix) AND PK = SK")
            .expression_attribute_values(":prefix", AttributeValue::S("USER#".to_string()));
        if let Some(key) = last_key {
            scan = scan.set_exclusive_start_key(Some(key));
        }
        let result = scan.send().await?;
        for item in result.items() {
            if let Some(record) = item_to_user(item) {
                users.push(record);
            }
        }
        match result.last_evaluated_key() {
            Some(key) if !key.is_empty() => last_key = Some(key.clone()),
            _ => break,
        }
    }
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(users)
}

/// Best-effort email uniqueness lookup. There is no unique index backing
/// this; the scan-then-write window is an accepted limitation.
async fn find_user_by_email(
    client: &DynamoClient,
    table_name: &str,
    email: &str,
) -> Result<Option<UserRecord>, Error> {
    let result = client
        .scan()
        .table_name(table_name)
        .filter_expression("begins_with(PK, :prefix) AND email = :email")
        .expression_attribute_values(":prefix", AttributeValue::S("USER#".to_string()))
        .expression_attribute_values(":email", AttributeValue::S(email.to_string()))
        .send()
        .await?;
    Ok(result.items().iter().find_map(item_to_user))
}

/// Fetch the template applicable to this record's discriminant, if any.
async fn fetch_active_template(
    client: &DynamoClient,
    table_name: &str,
    record: &UserRecord,
) -> Result<Option<UserTypeConfig>, Error> {
    let slug = match record.role {
        Role::Collaborator => record.collaborator_type.as_deref(),
        Role::Agency => record.agency_type.as_deref(),
        Role::Admin => None,
    };
    match slug {
        Some(slug) => crate::user_types::fetch_user_type(client, table_name, slug).await,
        None => Ok(None),
    }
}

// ---- HTTP handlers ----

/// Create a user record. The open part of the payload is partitioned by the
/// static allow-list; everything else goes into the dynamic bag verbatim.
/// Unless strict mode is enabled there is no cross-check against the
/// user-type template.
pub async fn create_user(
    client: &DynamoClient,
    table_name: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateUserRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    if req.email.trim().is_empty() || !req.email.contains('@') {
        return RegistryError::Validation("a valid email is required".to_string())
            .into_response();
    }
    let role = match Role::parse(&req.role) {
        Some(role) => role,
        None => {
            return RegistryError::Validation(
                "role must be one of Admin | Collaborator | Agency".to_string(),
            )
            .into_response()
        }
    };

    if find_user_by_email(client, table_name, &req.email)
        .await?
        .is_some()
    {
        return RegistryError::DuplicateKey(req.email).into_response();
    }

    let parts = partition_profile_fields(req.extra);
    let mut record = UserRecord {
        user_id: uuid::Uuid::new_v4().to_string(),
        email: req.email,
        name: None,
        role,
        collaborator_type: req.collaborator_type,
        agency_type: req.agency_type,
        phone: None,
        city: None,
        country: None,
        bio: None,
        permissions: Vec::new(),
        group_specific_attributes: parts.dynamic,
        created_at: chrono::Utc::now().to_rfc3339(),
        updated_at: None,
    };
    apply_static_fields(&mut record, &parts.statics);

    if ValidationMode::from_env() == ValidationMode::Strict {
        if let Some(template) = fetch_active_template(client, table_name, &record).await? {
            if let Err(e) = validate_against_template(&record.group_specific_attributes, &template)
            {
                return e.into_response();
            }
        }
    }

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(user_to_item(&record)))
        .send()
        .await?;

    tracing::info!("Created {} user {}", record.role.as_str(), record.user_id);

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&record)?.into())
        .map_err(Box::new)?)
}

/// Get a user record
pub async fn get_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    match fetch_user(client, table_name, user_id).await? {
        Some(record) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&record)?.into())
            .map_err(Box::new)?),
        None => RegistryError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        }
        .into_response(),
    }
}

/// Update a user record. Static allow-listed keys overwrite; dynamic keys
/// merge into the existing bag so a partial form submission cannot wipe
/// values it did not resend. Full-document save, last-writer-wins.
pub async fn update_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let fields: serde_json::Map<String, serde_json::Value> = match serde_json::from_slice(body) {
        Ok(fields) => fields,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let mut record = match fetch_user(client, table_name, user_id).await? {
        Some(record) => record,
        None => {
            return RegistryError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            }
            .into_response()
        }
    };

    let parts = partition_profile_fields(fields);
    apply_static_fields(&mut record, &parts.statics);
    merge_attribute_bag(&mut record.group_specific_attributes, parts.dynamic);
    record.updated_at = Some(chrono::Utc::now().to_rfc3339());

    if ValidationMode::from_env() == ValidationMode::Strict {
        if let Some(template) = fetch_active_template(client, table_name, &record).await? {
            if let Err(e) = validate_against_template(&record.group_specific_attributes, &template)
            {
                return e.into_response();
            }
        }
    }

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(user_to_item(&record)))
        .send()
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&record)?.into())
        .map_err(Box::new)?)
}

/// Delete a user record. No cascade into the attribute or user-type
/// registries.
pub async fn delete_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    if fetch_user(client, table_name, user_id).await?.is_none() {
        return RegistryError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        }
        .into_response();
    }

    let pk = user_pk(user_id);
    client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    tracing::info!("Deleted user {}", user_id);

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

/// Query user records with static, search and dynamic-attribute filters.
/// Filtering and pagination happen in memory over a table scan.
pub async fn query_users(
    client: &DynamoClient,
    table_name: &str,
    params: &HashMap<String, String>,
) -> Result<Response<Body>, Error> {
    let query = UserQuery::from_params(params);
    let matched: Vec<UserRecord> = scan_users(client, table_name)
        .await?
        .into_iter()
        .filter(|record| matches_query(record, &query))
        .collect();

    let total = matched.len();
    let users: Vec<UserRecord> = matched
        .into_iter()
        .skip((query.page - 1) * query.per_page)
        .take(query.per_page)
        .collect();

    let response = UserQueryResponse {
        users,
        total,
        page: query.page,
        per_page: query.per_page,
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&response)?.into())
        .map_err(Box::new)?)
}

/// Append items to an array-valued attribute (used by the media upload
/// flow). Returns the new full item list.
pub async fn append_attribute_items(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    slug: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: AppendItemsRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let mut record = match fetch_user(client, table_name, user_id).await? {
        Some(record) => record,
        None => {
            return RegistryError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            }
            .into_response()
        }
    };

    let appended = append_to_array(
        record.group_specific_attributes.get(slug),
        req.items,
    );
    let items = appended.as_items();
    record
        .group_specific_attributes
        .insert(slug.to_string(), appended);
    record.updated_at = Some(chrono::Utc::now().to_rfc3339());

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(user_to_item(&record)))
        .send()
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&items)?.into())
        .map_err(Box::new)?)
}

/// Remove items matching a file path from an array-valued attribute.
/// Returns the remaining item list.
pub async fn remove_attribute_item(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    slug: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: RemoveItemRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let mut record = match fetch_user(client, table_name, user_id).await? {
        Some(record) => record,
        None => {
            return RegistryError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            }
            .into_response()
        }
    };

    let remaining = remove_from_array(record.group_specific_attributes.get(slug), |item| {
        item_has_path(item, &req.path)
    });
    let items = remaining.as_items();
    record
        .group_specific_attributes
        .insert(slug.to_string(), remaining);
    record.updated_at = Some(chrono::Utc::now().to_rfc3339());

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(user_to_item(&record)))
        .send()
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&items)?.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldBinding, FieldType, ParentType};
    use serde_json::json;

    fn bag(pairs: &[(&str, serde_json::Value)]) -> AttributeBag {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AttrValue::from_json(v.clone())))
            .collect()
    }

    fn record_with_bag(bag: AttributeBag) -> UserRecord {
        UserRecord {
            user_id: "u1".to_string(),
            email: "ana@example.com".to_string(),
            name: Some("Ana".to_string()),
            role: Role::Collaborator,
            collaborator_type: Some("actor".to_string()),
            agency_type: None,
            phone: None,
            city: Some("Lisbon".to_string()),
            country: Some("Portugal".to_string()),
            bio: Some("Stage and screen".to_string()),
            permissions: Vec::new(),
            group_specific_attributes: bag,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
        }
    }

    #[test]
    fn partition_routes_unknown_keys_into_bag() {
        let fields = json!({
            "name": "Ana",
            "city": "Lisbon",
            "tiktok": "@ana",
            "height": 172,
            "email": "smuggled@example.com",
            "role": "Admin"
        })
        .as_object()
        .unwrap()
        .clone();
        let parts = partition_profile_fields(fields);

        assert_eq!(parts.statics.get("name"), Some(&json!("Ana")));
        assert_eq!(parts.statics.get("city"), Some(&json!("Lisbon")));
        // Unknown slugs are accepted verbatim, no template cross-check.
        assert!(parts.dynamic.contains_key("tiktok"));
        assert!(parts.dynamic.contains_key("height"));
        // Reserved control fields never reach the bag or the statics.
        assert!(!parts.dynamic.contains_key("email"));
        assert!(!parts.statics.contains_key("email"));
        assert!(!parts.dynamic.contains_key("role"));
    }

    #[test]
    fn bag_merge_keeps_unsent_keys() {
        let mut existing = bag(&[("instagram", json!("@old")), ("tiktok", json!("@old"))]);
        let patch = bag(&[("tiktok", json!("@new"))]);
        merge_attribute_bag(&mut existing, patch);

        assert_eq!(existing["instagram"], AttrValue::Text("@old".into()));
        assert_eq!(existing["tiktok"], AttrValue::Text("@new".into()));
    }

    #[test]
    fn boolean_filter_true_is_strict() {
        let yes = AttrValue::Bool(true);
        let text_true = AttrValue::Text("true".into());
        assert!(matches_attribute_filter(Some(&yes), "true"));
        assert!(!matches_attribute_filter(Some(&text_true), "true"));
        assert!(!matches_attribute_filter(None, "true"));
    }

    #[test]
    fn boolean_filter_false_is_permissive() {
        assert!(matches_attribute_filter(Some(&AttrValue::Bool(false)), "false"));
        assert!(matches_attribute_filter(
            Some(&AttrValue::Text("false".into())),
            "false"
        ));
        assert!(matches_attribute_filter(
            Some(&AttrValue::from_json(serde_json::Value::Null)),
            "false"
        ));
        assert!(matches_attribute_filter(None, "false"));
        assert!(!matches_attribute_filter(Some(&AttrValue::Bool(true)), "false"));
        assert!(!matches_attribute_filter(
            Some(&AttrValue::Text("yes".into())),
            "false"
        ));
    }

    #[test]
    fn query_combines_static_search_and_dynamic_filters() {
        let record = record_with_bag(bag(&[
            ("vehicle", json!(true)),
            ("languages", json!(["Portuguese", "English"])),
        ]));

        let mut params = HashMap::new();
        params.insert("role".to_string(), "Collaborator".to_string());
        params.insert("search".to_string(), "stage".to_string());
        params.insert("vehicle".to_string(), "true".to_string());
        params.insert("languages".to_string(), "English".to_string());
        let query = UserQuery::from_params(&params);
        assert!(matches_query(&record, &query));

        params.insert("vehicle".to_string(), "false".to_string());
        let query = UserQuery::from_params(&params);
        assert!(!matches_query(&record, &query));
    }

    #[test]
    fn append_then_remove_restores_original() {
        let original = AttrValue::from_json(json!([
            {"path": "profiles/u1/gallery/a.jpg", "name": "a.jpg"}
        ]));
        let new_item = json!({"path": "profiles/u1/gallery/b.jpg", "name": "b.jpg"});

        let appended = append_to_array(Some(&original), vec![new_item.clone()]);
        assert_eq!(appended.as_items().len(), 2);

        let restored = remove_from_array(Some(&appended), |item| {
            item_has_path(item, "profiles/u1/gallery/b.jpg")
        });
        assert_eq!(restored, original);
    }

    #[test]
    fn append_defaults_to_empty_for_absent_slot() {
        let appended = append_to_array(None, vec![json!({"path": "p", "name": "n"})]);
        assert_eq!(appended.as_items().len(), 1);
    }

    #[test]
    fn strict_validation_reports_all_offenders() {
        let template = UserTypeConfig {
            slug: "actor".to_string(),
            name: "Actor".to_string(),
            parent_type: ParentType::Collaborator,
            fields: vec![FieldBinding {
                attribute_slug: "height".to_string(),
                label: "Height".to_string(),
                required: true,
                section: None,
                field_type: FieldType::Number,
                default_options: Vec::new(),
                description: None,
            }],
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
        };

        let err = validate_against_template(&bag(&[("tiktok", json!("@ana"))]), &template)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing required attributes: height"));
        assert!(message.contains("attributes not in template: tiktok"));

        assert!(validate_against_template(&bag(&[("height", json!(172))]), &template).is_ok());
    }

    #[test]
    fn user_item_round_trips() {
        let record = record_with_bag(bag(&[
            ("vehicle", json!(false)),
            ("portfolio_gallery", json!([{"path": "p.jpg", "name": "p.jpg"}])),
        ]));
        let item = user_to_item(&record);
        assert_eq!(item_to_user(&item), Some(record));
    }
}
