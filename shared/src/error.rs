use lambda_http::{http::StatusCode, Body, Error, Response};
use thiserror::Error;

/// Error taxonomy for the attribute/user-type/record engine. Every variant
/// maps onto the JSON envelope `{"error": code, "message": text}` the
/// frontend already consumes.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} with slug '{slug}' already exists")]
    DuplicateSlug { entity: &'static str, slug: String },

    #[error("a user with email '{0}' already exists")]
    DuplicateKey(String),

    /// Enumerates every unresolved slug so the caller can fix all of them in
    /// one round trip.
    #[error("unknown attributes: {}", .0.join(", "))]
    UnknownAttributes(Vec<String>),

    #[error("{entity} '{slug}' is still referenced by {referenced_by}")]
    InUse {
        entity: &'static str,
        slug: String,
        referenced_by: String,
    },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::DuplicateSlug { .. } => "DuplicateSlug",
            Self::DuplicateKey(_) => "DuplicateKey",
            Self::UnknownAttributes(_) => "UnknownAttributes",
            Self::InUse { .. } => "InUse",
            Self::NotFound { .. } => "NotFound",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnknownAttributes(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateSlug { .. } | Self::DuplicateKey(_) | Self::InUse { .. } => {
                StatusCode::CONFLICT
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    /// Render the standard error response.
    pub fn into_response(self) -> Result<Response<Body>, Error> {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let Self::UnknownAttributes(missing) = &self {
            body["missing"] = serde_json::json!(missing);
        }
        Ok(Response::builder()
            .status(self.status())
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(body.to_string().into())
            .map_err(Box::new)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_attributes_lists_every_slug() {
        let err = RegistryError::UnknownAttributes(vec!["height".into(), "eye-color".into()]);
        assert_eq!(err.to_string(), "unknown attributes: height, eye-color");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn status_codes_match_taxonomy() {
        let in_use = RegistryError::InUse {
            entity: "attribute",
            slug: "height".into(),
            referenced_by: "user type 'actor'".into(),
        };
        assert_eq!(in_use.status(), StatusCode::CONFLICT);
        assert_eq!(in_use.code(), "InUse");

        let missing = RegistryError::NotFound {
            entity: "user type",
            id: "actor".into(),
        };
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
