use crate::records;
use crate::types::{ParentType, UserRecord, UserTypeConfig};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::Error;

/// True if the template binds the attribute slug in any field slot.
pub fn config_references_attribute(config: &UserTypeConfig, slug: &str) -> bool {
    config
        .fields
        .iter()
        .any(|field| field.attribute_slug == slug)
}

/// True if the record carries the slug as the discriminant matching the
/// template's parent type.
pub fn record_uses_user_type(record: &UserRecord, slug: &str, parent_type: ParentType) -> bool {
    match parent_type {
        ParentType::Collaborator => record.collaborator_type.as_deref() == Some(slug),
        ParentType::Agency => record.agency_type.as_deref() == Some(slug),
    }
}

/// Find a user-type config still referencing the attribute, if any. Returns
/// the referencing config's slug so delete refusals can name it.
///
/// Read-then-decide: there is no storage-level constraint backing this, and
/// a template created concurrently with the delete can slip past the check.
pub async fn attribute_in_use(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
) -> Result<Option<String>, Error> {
    let configs = crate::user_types::load_all(client, table_name).await?;
    Ok(configs
        .into_iter()
        .find(|config| config_references_attribute(config, slug))
        .map(|config| config.slug))
}

/// Find a user record still carrying the user-type slug as its discriminant,
/// if any. Returns the user id for the delete-refusal message.
pub async fn user_type_in_use(
    client: &DynamoClient,
    table_name: &str,
    slug: &str,
    parent_type: ParentType,
) -> Result<Option<String>, Error> {
    let discriminant = match parent_type {
        ParentType::Collaborator => "collaborator_type",
        ParentType::Agency => "agency_type",
    };

    let mut last_key = None;
    loop {
        let mut scan = client
            .scan()
            .table_name(table_name)
            .filter_expression(format!(
                "begins_with(PK, :prefix) AND {} = :slug",
                discriminant
            ))
            .expression_attribute_values(":prefix", AttributeValue::S("USER#".to_string()))
            .expression_attribute_values(":slug", AttributeValue::S(slug.to_string()));
        if let Some(key) = last_key {
            scan = scan.set_exclusive_start_key(Some(key));
        }
        let result = scan.send().await?;
        if let Some(record) = result.items().iter().find_map(records::item_to_user) {
            return Ok(Some(record.user_id));
        }
        match result.last_evaluated_key() {
            Some(key) if !key.is_empty() => last_key = Some(key.clone()),
            _ => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldBinding, FieldType, Role};
    use std::collections::BTreeMap;

    fn binding(slug: &str) -> FieldBinding {
        FieldBinding {
            attribute_slug: slug.to_string(),
            label: slug.to_string(),
            required: false,
            section: None,
            field_type: FieldType::Text,
            default_options: Vec::new(),
            description: None,
        }
    }

    fn user(role: Role, collaborator_type: Option<&str>, agency_type: Option<&str>) -> UserRecord {
        UserRecord {
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            name: None,
            role,
            collaborator_type: collaborator_type.map(str::to_string),
            agency_type: agency_type.map(str::to_string),
            phone: None,
            city: None,
            country: None,
            bio: None,
            permissions: Vec::new(),
            group_specific_attributes: BTreeMap::new(),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
        }
    }

    #[test]
    fn attribute_reference_is_detected() {
        let config = UserTypeConfig {
            slug: "actor".to_string(),
            name: "Actor".to_string(),
            parent_type: ParentType::Collaborator,
            fields: vec![binding("height"), binding("eye-color")],
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: None,
        };
        assert!(config_references_attribute(&config, "height"));
        assert!(!config_references_attribute(&config, "tiktok"));
    }

    #[test]
    fn discriminant_check_respects_parent_type() {
        let collaborator = user(Role::Collaborator, Some("actor"), None);
        assert!(record_uses_user_type(
            &collaborator,
            "actor",
            ParentType::Collaborator
        ));
        // Same slug under the other parent type does not count as a use.
        assert!(!record_uses_user_type(
            &collaborator,
            "actor",
            ParentType::Agency
        ));

        let agency = user(Role::Agency, None, Some("casting-agency"));
        assert!(record_uses_user_type(
            &agency,
            "casting-agency",
            ParentType::Agency
        ));
        assert!(!record_uses_user_type(
            &agency,
            "talent-agency",
            ParentType::Agency
        ));
    }
}
