use castlink_shared::{attributes, jobs, records, uploads, user_types, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

/// Main Lambda handler - routes requests to the attribute, user-type, user,
/// upload and job endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header(
                "Access-Control-Allow-Methods",
                "GET,POST,PUT,PATCH,DELETE,OPTIONS",
            )
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type,Authorization,X-User-Id",
            )
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "castlink-platform".to_string());

    // Caller identity from the JWT authorizer (validated by API Gateway).
    // X-User-Id header override for local development.
    let user_id = event
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| {
            event
                .request_context()
                .authorizer()
                .and_then(|auth| auth.jwt.as_ref())
                .and_then(|jwt| jwt.claims.get("sub"))
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| {
            tracing::warn!("Could not extract user ID from JWT or header, using fallback");
            "anonymous".to_string()
        });

    let query_params: HashMap<String, String> = event
        .query_string_parameters_ref()
        .map(|params| {
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let dynamo = &state.dynamo_client;

    // --- ATTRIBUTE CATALOG ---
    if path.starts_with("/attributes") {
        return match (method, parts.as_slice()) {
            // POST /attributes - define a new attribute
            (&Method::POST, ["attributes"]) => {
                attributes::create_attribute(dynamo, &table_name, body).await
            }
            // GET /attributes - list attributes (?resolve=true expands reference lists)
            (&Method::GET, ["attributes"]) => {
                let resolve = query_params.get("resolve").map(String::as_str) == Some("true");
                attributes::list_attributes(dynamo, &table_name, resolve).await
            }
            // PATCH /attributes/{slug} - update an attribute
            (&Method::PATCH, ["attributes", slug]) => {
                attributes::update_attribute(dynamo, &table_name, slug, body).await
            }
            // DELETE /attributes/{slug} - delete an attribute (refused while referenced)
            (&Method::DELETE, ["attributes", slug]) => {
                attributes::delete_attribute(dynamo, &table_name, slug).await
            }
            _ => not_found(),
        };
    }

    // --- USER TYPE TEMPLATES ---
    if path.starts_with("/user-types") {
        return match (method, parts.as_slice()) {
            // POST /user-types - compose a template from attributes
            (&Method::POST, ["user-types"]) => {
                user_types::create_user_type(dynamo, &table_name, body).await
            }
            // GET /user-types - list templates enriched with current attribute details
            (&Method::GET, ["user-types"]) => {
                user_types::list_user_types(dynamo, &table_name).await
            }
            // PATCH /user-types/{slug} - update a template (re-snapshots attributes)
            (&Method::PATCH, ["user-types", slug]) => {
                user_types::update_user_type(dynamo, &table_name, slug, body).await
            }
            // DELETE /user-types/{slug} - delete a template (refused while in use)
            (&Method::DELETE, ["user-types", slug]) => {
                user_types::delete_user_type(dynamo, &table_name, slug).await
            }
            _ => not_found(),
        };
    }

    // --- USER RECORDS ---
    if path.starts_with("/users") {
        return match (method, parts.as_slice()) {
            // POST /users - create a user record
            (&Method::POST, ["users"]) => {
                records::create_user(dynamo, &table_name, body).await
            }
            // GET /users - query records (static, search and attribute filters)
            (&Method::GET, ["users"]) => {
                records::query_users(dynamo, &table_name, &query_params).await
            }
            // GET /users/me - current caller's record
            (&Method::GET, ["users", "me"]) => {
                records::get_user(dynamo, &table_name, &user_id).await
            }
            // GET /users/{id}
            (&Method::GET, ["users", id]) => records::get_user(dynamo, &table_name, id).await,
            // PATCH /users/{id} - static overwrite + dynamic bag merge
            (&Method::PATCH, ["users", id]) => {
                records::update_user(dynamo, &table_name, id, body).await
            }
            // DELETE /users/{id}
            (&Method::DELETE, ["users", id]) => {
                records::delete_user(dynamo, &table_name, id).await
            }
            // POST /users/{id}/attributes/{slug}/items - append to an array attribute
            (&Method::POST, ["users", id, "attributes", slug, "items"]) => {
                records::append_attribute_items(dynamo, &table_name, id, slug, body).await
            }
            // DELETE /users/{id}/attributes/{slug}/items - remove items by file path
            (&Method::DELETE, ["users", id, "attributes", slug, "items"]) => {
                records::remove_attribute_item(dynamo, &table_name, id, slug, body).await
            }
            _ => not_found(),
        };
    }

    // --- MEDIA UPLOADS (S3) ---
    if path.starts_with("/uploads") {
        return match (method, parts.as_slice()) {
            // POST /uploads/presign - presigned PUT for a profile media file
            (&Method::POST, ["uploads", "presign"]) => {
                let request: uploads::PresignUploadRequest = serde_json::from_slice(body)?;
                uploads::presign_upload(&state.s3_client, request).await
            }
            // DELETE /uploads/media - delete a media object by path
            (&Method::DELETE, ["uploads", "media"]) => {
                let request: uploads::DeleteMediaRequest = serde_json::from_slice(body)?;
                uploads::delete_media(&state.s3_client, request).await
            }
            _ => not_found(),
        };
    }

    // --- JOBS ---
    if path.starts_with("/jobs") {
        return match (method, parts.as_slice()) {
            // POST /jobs - post a job
            (&Method::POST, ["jobs"]) => {
                jobs::create_job(dynamo, &table_name, &user_id, body).await
            }
            // GET /jobs - list jobs
            (&Method::GET, ["jobs"]) => jobs::list_jobs(dynamo, &table_name).await,
            // GET /jobs/{id}
            (&Method::GET, ["jobs", job_id]) => {
                jobs::get_job(dynamo, &table_name, job_id).await
            }
            // PATCH /jobs/{id} - update title/description/status
            (&Method::PATCH, ["jobs", job_id]) => {
                jobs::update_job(dynamo, &table_name, job_id, body).await
            }
            // DELETE /jobs/{id} - delete job and its applications
            (&Method::DELETE, ["jobs", job_id]) => {
                jobs::delete_job(dynamo, &table_name, job_id).await
            }
            // POST /jobs/{id}/applications - apply as the current user
            (&Method::POST, ["jobs", job_id, "applications"]) => {
                jobs::apply_to_job(dynamo, &table_name, job_id, &user_id, body).await
            }
            // GET /jobs/{id}/applications - list applicants
            (&Method::GET, ["jobs", job_id, "applications"]) => {
                jobs::list_applicants(dynamo, &table_name, job_id).await
            }
            _ => not_found(),
        };
    }

    // No matching route
    tracing::warn!("No route matched - Method: {} Path: {}", method, path);
    not_found()
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": "Not found"}).to_string().into())
        .map_err(Box::new)?)
}
