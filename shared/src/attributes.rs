use crate::error::RegistryError;
use crate::reference_data;
use crate::types::{
    AttributeDefinition, AttributeOption, CreateAttributeRequest, FieldType,
    UpdateAttributeRequest,
};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

/// Normalize a caller-supplied slug: lowercase, whitespace runs collapsed to
/// single hyphens.
pub fn normalize_slug(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Coerce the caller's `default_options` payload. Anything that is not an
/// array becomes the empty list (options are never stored as null); array
/// entries must parse as plain strings or option objects.
pub fn coerce_options(
    payload: Option<serde_json::Value>,
) -> Result<Vec<AttributeOption>, RegistryError> {
    match payload {
        Some(serde_json::Value::Array(entries)) => entries
            .into_iter()
            .map(|entry| {
                serde_json::from_value::<AttributeOption>(entry.clone()).map_err(|_| {
                    RegistryError::Validation(format!(
                        "default_options entry is neither a string nor an option object: {entry}"
                    ))
                })
            })
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// Shared validation for create and update payloads.
pub fn validate_payload(
    name: &str,
    field_type_raw: &str,
    default_options: Option<serde_json::Value>,
) -> Result<(FieldType, Vec<AttributeOption>), RegistryError> {
    if name.trim().is_empty() {
        return Err(RegistryError::Validation("name is required".to_string()));
    }
    let field_type = FieldType::parse(field_type_raw).ok_or_else(|| {
        RegistryError::Validation(format!(
            "invalid field_type '{}', expected one of: {}",
            field_type_raw,
            FieldType::ALL.join(", ")
        ))
    })?;
    let options = coerce_options(default_options)?;
    Ok((field_type, options))
}

// ---- DynamoDB item mapping ----

fn attribute_pk(slug: &str) -> String {
    format!("ATTR#{}", slug)
}

pub(crate) fn attribute_to_item(attr: &AttributeDefinition) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(attribute_pk(&attr.slug)));
    item.insert("SK".to_string(), AttributeValue::S("METADATA".to_string()));
    item.insert("slug".to_string(), AttributeValue::S(attr.slug.clone()));
    item.insert("name".to_string(), AttributeValue::S(attr.name.clone()));
    item.insert(
        "field_type".to_string(),
        AttributeValue::S(attr.field_type.as_str().to_string()),
    );
    item.insert(
        "default_options".to_string(),
        AttributeValue::S(serde_json::to_string(&attr.default_options).unwrap_or_default()),
    );
    if let Some(description) = &attr.description {
        item.insert(
            "description".to_string(),
            AttributeValue::S(description.clone()),
        );
    }
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(attr.created_at.clone()),
    );
    if let Some(updated_at) = &attr.updated_at {
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(updated_at.clone()),
        );
    }
    item
}

pub(crate) fn item_to_attribute(
    item: &HashMap<String, AttributeValue>,
) -> Option<AttributeDefinition> {
    let slug = item.get("slug").and_then(|v| v.as_s().ok())?.to_string();
    let field_type = item
        .get("field_type")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| FieldType::parse(s))?;
    let default_options = item
        .get("default_options")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    Some(AttributeDefinition {
        slug,
        name: item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        field_type,
        default_options,
        description: item
            .get("description")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()),
        created_at: item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        updated_at: item
            .get("updated_at")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()),
    })
}

/// Fetch a single attribute definition by slug.
pub async fn fetch_attribute(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
) -> Result<Option<AttributeDefinition>, Error> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(attribute_pk(slug)))
        .key("SK", AttributeValue::S("METADATA".to_string()))
        .send()
        .await?;
    Ok(result.item().and_then(item_to_attribute))
}

/// Load the full attribute catalog keyed by slug. Used by the user-type
/// registry for reference validation and snapshot embedding.
pub async fn load_catalog(
    client: &DynamoClient,
    table_name: &str,
) -> Result<HashMap<String, AttributeDefinition>, Error> {
    let mut catalog = HashMap::new();
    let mut last_key = None;
    loop {
        let mut scan = client
            .scan()
            .table_name(table_name)
            .filter_expression("begins_with(PK, :prefix) AND SK = :meta")
            .expression_attribute_values(":prefix", AttributeValue::S("ATTR#".to_string()))
            .expression_attribute_values(":meta", AttributeValue::S("METADATA".to_string()));
        if let Some(key) = last_key {
            scan = scan.set_exclusive_start_key(Some(key));
        }
        let result = scan.send().await?;
        for item in result.items() {
            if let Some(attr) = item_to_attribute(item) {
                catalog.insert(attr.slug.clone(), attr);
            }
        }
        match result.last_evaluated_key() {
            Some(key) if !key.is_empty() => last_key = Some(key.clone()),
            _ => break,
        }
    }
    Ok(catalog)
}

// ---- HTTP handlers ----

/// Create a new attribute definition
pub async fn create_attribute(
    client: &DynamoClient,
    table_name: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateAttributeRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let slug = normalize_slug(&req.slug);
    if slug.is_empty() {
        return RegistryError::Validation("slug is required".to_string()).into_response();
    }
    let (field_type, default_options) =
        match validate_payload(&req.name, &req.field_type, req.default_options) {
            Ok(v) => v,
            Err(e) => return e.into_response(),
        };

    // Read-then-write uniqueness check; the race window is accepted, the
    // catalog is operated by a single admin at a time.
    if fetch_attribute(client, table_name, &slug).await?.is_some() {
        return RegistryError::DuplicateSlug {
            entity: "attribute",
            slug,
        }
        .into_response();
    }

    let attr = AttributeDefinition {
        slug,
        name: req.name,
        field_type,
        default_options,
        description: req.description,
        created_at: chrono::Utc::now().to_rfc3339(),
        updated_at: None,
    };

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(attribute_to_item(&attr)))
        .send()
        .await?;

    tracing::info!("Created attribute '{}'", attr.slug);

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&attr)?.into())
        .map_err(Box::new)?)
}

/// List all attribute definitions, sorted by slug. `resolve=true` expands
/// reference-list sentinels in `default_options`.
pub async fn list_attributes(
    client: &DynamoClient,
    table_name: &str,
    resolve: bool,
) -> Result<Response<Body>, Error> {
    let catalog = load_catalog(client, table_name).await?;
    let mut attributes: Vec<AttributeDefinition> = catalog.into_values().collect();
    attributes.sort_by(|a, b| a.slug.cmp(&b.slug));

    if resolve {
        for attr in &mut attributes {
            attr.default_options = reference_data::resolve_options(&attr.default_options);
        }
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&attributes)?.into())
        .map_err(Box::new)?)
}

/// Update an attribute definition. Does NOT propagate into user-type
/// snapshots that embedded the old values; templates keep the copy they were
/// written with until they are re-saved.
pub async fn update_attribute(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateAttributeRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let existing = match fetch_attribute(client, table_name, slug).await? {
        Some(attr) => attr,
        None => {
            return RegistryError::NotFound {
                entity: "attribute",
                id: slug.to_string(),
            }
            .into_response()
        }
    };

    let (field_type, default_options) =
        match validate_payload(&req.name, &req.field_type, req.default_options) {
            Ok(v) => v,
            Err(e) => return e.into_response(),
        };

    let attr = AttributeDefinition {
        slug: existing.slug,
        name: req.name,
        field_type,
        default_options,
        description: req.description,
        created_at: existing.created_at,
        updated_at: Some(chrono::Utc::now().to_rfc3339()),
    };

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(attribute_to_item(&attr)))
        .send()
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&attr)?.into())
        .map_err(Box::new)?)
}

/// Delete an attribute definition. Refused while any user-type template
/// still references the slug.
pub async fn delete_attribute(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
) -> Result<Response<Body>, Error> {
    if fetch_attribute(client, table_name, slug).await?.is_none() {
        return RegistryError::NotFound {
            entity: "attribute",
            id: slug.to_string(),
        }
        .into_response();
    }

    if let Some(user_type_slug) =
        crate::integrity::attribute_in_use(client, table_name, slug).await?
    {
        return RegistryError::InUse {
            entity: "attribute",
            slug: slug.to_string(),
            referenced_by: format!("user type '{}'", user_type_slug),
        }
        .into_response();
    }

    client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(attribute_pk(slug)))
        .key("SK", AttributeValue::S("METADATA".to_string()))
        .send()
        .await?;

    tracing::info!("Deleted attribute '{}'", slug);

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_lowercased_and_hyphenated() {
        assert_eq!(normalize_slug("Eye Color"), "eye-color");
        assert_eq!(normalize_slug("  Height   In CM "), "height-in-cm");
        assert_eq!(normalize_slug("tiktok"), "tiktok");
    }

    #[test]
    fn non_array_options_coerce_to_empty() {
        assert_eq!(coerce_options(None).unwrap(), Vec::new());
        assert_eq!(
            coerce_options(Some(serde_json::json!("not-a-list"))).unwrap(),
            Vec::new()
        );
        assert_eq!(
            coerce_options(Some(serde_json::Value::Null)).unwrap(),
            Vec::new()
        );
    }

    #[test]
    fn option_objects_and_strings_both_parse() {
        let options = coerce_options(Some(serde_json::json!([
            "Blue",
            {"value": "green", "label": "Green", "group": "common"}
        ])))
        .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0], AttributeOption::Plain("Blue".into()));
        match &options[1] {
            AttributeOption::Detailed { value, group, .. } => {
                assert_eq!(value, "green");
                assert_eq!(group.as_deref(), Some("common"));
            }
            other => panic!("expected detailed option, got {:?}", other),
        }
    }

    #[test]
    fn unknown_field_type_is_rejected() {
        let err = validate_payload("Height", "integer", None).unwrap_err();
        assert!(err.to_string().contains("invalid field_type 'integer'"));
    }

    #[test]
    fn attribute_item_round_trips() {
        let attr = AttributeDefinition {
            slug: "eye-color".into(),
            name: "Eye Color".into(),
            field_type: FieldType::Select,
            default_options: vec![
                AttributeOption::Plain("Blue".into()),
                AttributeOption::Plain("Brown".into()),
            ],
            description: Some("Dominant eye color".into()),
            created_at: "2024-01-01T00:00:00+00:00".into(),
            updated_at: None,
        };
        let item = attribute_to_item(&attr);
        assert_eq!(item_to_attribute(&item), Some(attr));
    }
}
