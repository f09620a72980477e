use crate::attributes;
use crate::error::RegistryError;
use crate::reference_data;
use crate::types::{
    AttributeDefinition, CreateUserTypeRequest, DroppedField, EnrichedField, EnrichedUserType,
    FieldBinding, FieldBindingInput, ParentType, UserTypeConfig,
};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

/// Resolve every field input against the attribute catalog and embed a
/// snapshot of the attribute's type, options and description into the stored
/// binding. Fails listing ALL unresolved slugs, not just the first.
pub fn snapshot_fields(
    inputs: &[FieldBindingInput],
    catalog: &HashMap<String, AttributeDefinition>,
) -> Result<Vec<FieldBinding>, RegistryError> {
    let missing: Vec<String> = inputs
        .iter()
        .filter(|input| !catalog.contains_key(&input.attribute_slug))
        .map(|input| input.attribute_slug.clone())
        .collect();
    if !missing.is_empty() {
        return Err(RegistryError::UnknownAttributes(missing));
    }

    Ok(inputs
        .iter()
        .map(|input| {
            let attr = &catalog[&input.attribute_slug];
            FieldBinding {
                attribute_slug: input.attribute_slug.clone(),
                label: input.label.clone().unwrap_or_else(|| attr.name.clone()),
                required: input.required,
                section: input.section.clone(),
                field_type: attr.field_type,
                default_options: attr.default_options.clone(),
                description: attr.description.clone(),
            }
        })
        .collect())
}

/// Join each config's fields against the CURRENT attribute catalog. Fields
/// whose attribute no longer resolves are dropped from the output and
/// reported on the side list; the read itself never fails over them.
pub fn enrich(
    configs: Vec<UserTypeConfig>,
    catalog: &HashMap<String, AttributeDefinition>,
) -> (Vec<EnrichedUserType>, Vec<DroppedField>) {
    let mut dropped = Vec::new();
    let enriched = configs
        .into_iter()
        .map(|config| {
            let mut fields = Vec::with_capacity(config.fields.len());
            for binding in config.fields {
                match catalog.get(&binding.attribute_slug) {
                    Some(attr) => {
                        let mut details = attr.clone();
                        details.default_options =
                            reference_data::resolve_options(&details.default_options);
                        fields.push(EnrichedField {
                            binding,
                            attribute_details: details,
                        });
                    }
                    None => dropped.push(DroppedField {
                        user_type_slug: config.slug.clone(),
                        attribute_slug: binding.attribute_slug,
                    }),
                }
            }
            EnrichedUserType {
                slug: config.slug,
                name: config.name,
                parent_type: config.parent_type,
                fields,
                created_at: config.created_at,
                updated_at: config.updated_at,
            }
        })
        .collect();
    (enriched, dropped)
}

fn validate_request(
    req: &CreateUserTypeRequest,
) -> Result<(String, String, ParentType), RegistryError> {
    let slug = req
        .slug
        .as_deref()
        .map(attributes::normalize_slug)
        .filter(|s| !s.is_empty());
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let parent_type = req.parent_type.as_deref().and_then(ParentType::parse);

    match (slug, name, parent_type) {
        _ if req.fields.is_empty() => Err(RegistryError::Validation(
            "fields must contain at least one entry".to_string(),
        )),
        (Some(slug), Some(name), Some(parent_type)) => {
            Ok((slug, name.to_string(), parent_type))
        }
        _ => Err(RegistryError::Validation(
            "slug, name and parent_type (Collaborator | Agency) are required".to_string(),
        )),
    }
}

// ---- DynamoDB item mapping ----

fn user_type_pk(slug: &str) -> String {
    format!("USERTYPE#{}", slug)
}

pub(crate) fn user_type_to_item(config: &UserTypeConfig) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(
        "PK".to_string(),
        AttributeValue::S(user_type_pk(&config.slug)),
    );
    item.insert("SK".to_string(), AttributeValue::S("METADATA".to_string()));
    item.insert("slug".to_string(), AttributeValue::S(config.slug.clone()));
    item.insert("name".to_string(), AttributeValue::S(config.name.clone()));
    item.insert(
        "parent_type".to_string(),
        AttributeValue::S(config.parent_type.as_str().to_string()),
    );
    item.insert(
        "fields".to_string(),
        AttributeValue::S(serde_json::to_string(&config.fields).unwrap_or_default()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(config.created_at.clone()),
    );
    if let Some(updated_at) = &config.updated_at {
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(updated_at.clone()),
        );
    }
    item
}

pub(crate) fn item_to_user_type(
    item: &HashMap<String, AttributeValue>,
) -> Option<UserTypeConfig> {
    let slug = item.get("slug").and_then(|v| v.as_s().ok())?.to_string();
    let parent_type = item
        .get("parent_type")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| ParentType::parse(s))?;
    let fields = item
        .get("fields")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    Some(UserTypeConfig {
        slug,
        name: item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        parent_type,
        fields,
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

pub async fn fetch_user_type(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
) -> Result<Option<UserTypeConfig>, Error> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(user_type_pk(slug)))
        .key("SK", AttributeValue::S("METADATA".to_string()))
        .send()
        .await?;
    Ok(result.item().and_then(item_to_user_type))
}

/// Load every user-type config, sorted by slug.
pub async fn load_all(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Vec<UserTypeConfig>, Error> {
    let mut configs = Vec::new();
    let mut last_key = None;
    loop {
        let mut scan = client
            .scan()
            .table_name(table_name)
            .filter_expression("begins_with(PK, :prefix) AND SK = :meta")
            .expression_attribute_values(":prefix", AttributeValue::S("USERTYPE#".to_string()))
            .expression_attribute_values(":meta", AttributeValue::S("METADATA".to_string()));
        if let Some(key) = last_key {
            scan = scan.set_exclusive_start_key(Some(key));
        }
        let result = scan.send().await?;
        for item in result.items() {
            if let Some(config) = item_to_user_type(item) {
                configs.push(config);
            }
        }
        match result.last_evaluated_key() {
            Some(key) if !key.is_empty() => last_key = Some(key.clone()),
            _ => break,
        }
    }
    configs.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(configs)
}

// ---- HTTP handlers ----

/// Create a user-type template. Every referenced attribute must exist; its
/// type/options/description are copied into the stored fields.
pub async fn create_user_type(
    client: &DynamoClient,
    table_name: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateUserTypeRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let (slug, name, parent_type) = match validate_request(&req) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    if fetch_user_type(client, table_name, &slug).await?.is_some() {
        return RegistryError::DuplicateSlug {
            entity: "user type",
            slug,
        }
        .into_response();
    }

    let catalog = attributes::load_catalog(client, table_name).await?;
    let fields = match snapshot_fields(&req.fields, &catalog) {
        Ok(fields) => fields,
        Err(e) => return e.into_response(),
    };

    let config = UserTypeConfig {
        slug,
        name,
        parent_type,
        fields,
        created_at: chrono::Utc::now().to_rfc3339(),
        updated_at: None,
    };

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(user_type_to_item(&config)))
        .send()
        .await?;

    tracing::info!(
        "Created user type '{}' with {} fields",
        config.slug,
        config.fields.len()
    );

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&config)?.into())
        .map_err(Box::new)?)
}

/// Update a user-type template. Same validation as create; snapshots are
/// re-copied from the current catalog, which is also the only way a stale
/// snapshot catches up with an edited attribute.
pub async fn update_user_type(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateUserTypeRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let existing = match fetch_user_type(client, table_name, slug).await? {
        Some(config) => config,
        None => {
            return RegistryError::NotFound {
                entity: "user type",
                id: slug.to_string(),
            }
            .into_response()
        }
    };

    if req.fields.is_empty() {
        return RegistryError::Validation("fields must contain at least one entry".to_string())
            .into_response();
    }
    let name = match req.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            return RegistryError::Validation("name is required".to_string()).into_response()
        }
    };
    let parent_type = match req.parent_type.as_deref().and_then(ParentType::parse) {
        Some(parent_type) => parent_type,
        None => {
            return RegistryError::Validation(
                "parent_type (Collaborator | Agency) is required".to_string(),
            )
            .into_response()
        }
    };

    let catalog = attributes::load_catalog(client, table_name).await?;
    let fields = match snapshot_fields(&req.fields, &catalog) {
        Ok(fields) => fields,
        Err(e) => return e.into_response(),
    };

    let config = UserTypeConfig {
        slug: existing.slug,
        name,
        parent_type,
        fields,
        created_at: existing.created_at,
        updated_at: Some(chrono::Utc::now().to_rfc3339()),
    };

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(user_type_to_item(&config)))
        .send()
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&config)?.into())
        .map_err(Box::new)?)
}

/// Delete a user-type template. Refused while any user record still carries
/// the slug as its collaborator/agency discriminant.
pub async fn delete_user_type(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
) -> Result<Response<Body>, Error> {
    let existing = match fetch_user_type(client, table_name, slug).await? {
        Some(config) => config,
        None => {
            return RegistryError::NotFound {
                entity: "user type",
                id: slug.to_string(),
            }
            .into_response()
        }
    };

    if let Some(user_id) =
        crate::integrity::user_type_in_use(client, table_name, slug, existing.parent_type).await?
    {
        return RegistryError::InUse {
            entity: "user type",
            slug: slug.to_string(),
            referenced_by: format!("user '{}'", user_id),
        }
        .into_response();
    }

    client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(user_type_pk(slug)))
        .key("SK", AttributeValue::S("METADATA".to_string()))
        .send()
        .await?;

    tracing::info!("Deleted user type '{}'", slug);

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

/// List all user types with each field joined against the current attribute
/// catalog. Unresolvable fields are omitted from the payload; the drop is
/// logged but the response stays a plain success.
pub async fn list_user_types(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Response<Body>, Error> {
    let configs = load_all(client, table_name).await?;
    let catalog = attributes::load_catalog(client, table_name).await?;

    let (enriched, dropped) = enrich(configs, &catalog);
    for drop in &dropped {
        tracing::warn!(
            "User type '{}' references missing attribute '{}'; field omitted",
            drop.user_type_slug,
            drop.attribute_slug
        );
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&enriched)?.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn attr(slug: &str, field_type: FieldType) -> AttributeDefinition {
        AttributeDefinition {
            slug: slug.to_string(),
            name: slug.to_string(),
            field_type,
            default_options: Vec::new(),
            description: None,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
        }
    }

    fn input(slug: &str) -> FieldBindingInput {
        FieldBindingInput {
            attribute_slug: slug.to_string(),
            label: None,
            required: false,
            section: None,
        }
    }

    fn config(slug: &str, fields: Vec<FieldBinding>) -> UserTypeConfig {
        UserTypeConfig {
            slug: slug.to_string(),
            name: slug.to_string(),
            parent_type: ParentType::Collaborator,
            fields,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
        }
    }

    #[test]
    fn missing_attributes_are_all_enumerated() {
        let mut catalog = HashMap::new();
        catalog.insert("height".to_string(), attr("height", FieldType::Number));

        let err = snapshot_fields(
            &[input("nonexistent"), input("height"), input("also-missing")],
            &catalog,
        )
        .unwrap_err();
        match err {
            RegistryError::UnknownAttributes(missing) => {
                assert_eq!(missing, vec!["nonexistent", "also-missing"]);
            }
            other => panic!("expected UnknownAttributes, got {:?}", other),
        }
    }

    #[test]
    fn snapshot_copies_field_type_from_catalog() {
        let mut catalog = HashMap::new();
        catalog.insert("height".to_string(), attr("height", FieldType::Number));

        let fields = snapshot_fields(&[input("height")], &catalog).unwrap();
        assert_eq!(fields[0].field_type, FieldType::Number);
        assert_eq!(fields[0].label, "height"); // falls back to attribute name
    }

    #[test]
    fn snapshot_is_isolated_from_later_attribute_edits() {
        let mut catalog = HashMap::new();
        catalog.insert("height".to_string(), attr("height", FieldType::Number));
        let fields = snapshot_fields(&[input("height")], &catalog).unwrap();

        // Edit the attribute after the template was written.
        catalog.insert("height".to_string(), attr("height", FieldType::Text));

        // The stored binding keeps the embedded copy.
        assert_eq!(fields[0].field_type, FieldType::Number);
    }

    #[test]
    fn enrich_drops_fields_for_deleted_attributes() {
        let mut catalog = HashMap::new();
        catalog.insert("height".to_string(), attr("height", FieldType::Number));

        let bindings = snapshot_fields(&[input("height")], &catalog).unwrap();
        let mut stale = bindings.clone();
        stale.push(FieldBinding {
            attribute_slug: "deleted-attr".to_string(),
            label: "Gone".to_string(),
            required: false,
            section: None,
            field_type: FieldType::Text,
            default_options: Vec::new(),
            description: None,
        });

        let (enriched, dropped) = enrich(vec![config("actor", stale)], &catalog);
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].fields.len(), 1);
        assert_eq!(enriched[0].fields[0].binding.attribute_slug, "height");
        assert_eq!(
            dropped,
            vec![DroppedField {
                user_type_slug: "actor".to_string(),
                attribute_slug: "deleted-attr".to_string(),
            }]
        );
    }

    #[test]
    fn empty_fields_fail_validation() {
        let req = CreateUserTypeRequest {
            slug: Some("actor".to_string()),
            name: Some("Actor".to_string()),
            parent_type: Some("Collaborator".to_string()),
            fields: Vec::new(),
        };
        assert!(matches!(
            validate_request(&req),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn user_type_item_round_trips() {
        let mut catalog = HashMap::new();
        catalog.insert("height".to_string(), attr("height", FieldType::Number));
        let fields = snapshot_fields(&[input("height")], &catalog).unwrap();
        let original = config("actor", fields);

        let item = user_type_to_item(&original);
        assert_eq!(item_to_user_type(&item), Some(original));
    }
}
