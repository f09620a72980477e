use aws_sdk_s3::Client as S3Client;
use lambda_http::{http::StatusCode, Body, Error, Response};

const BUCKET_NAME: &str = "castlink-media";
const PRESIGN_EXPIRY_SECS: u64 = 3600;

#[derive(serde::Deserialize)]
pub struct PresignUploadRequest {
    pub user_id: String,
    /// Attribute slug the file will be appended under (an `image_array`
    /// field such as `portfolio_gallery`).
    pub attribute_slug: String,
    pub file_name: String,
    pub content_type: String,
}

#[derive(serde::Deserialize)]
pub struct DeleteMediaRequest {
    pub path: String,
}

/// Issue a presigned PUT for a profile media file. The response carries the
/// `{path, name}` descriptor the frontend appends to the record's attribute
/// once the upload succeeds; the record store treats it as opaque.
pub async fn presign_upload(
    s3_client: &S3Client,
    request: PresignUploadRequest,
) -> Result<Response<Body>, Error> {
    let file_id = uuid::Uuid::new_v4().to_string();
    let extension = request.file_name.split('.').next_back().unwrap_or("jpg");

    let s3_key = format!(
        "profiles/{}/{}/{}.{}",
        request.user_id, request.attribute_slug, file_id, extension
    );

    let presigned_request = s3_client
        .put_object()
        .bucket(BUCKET_NAME)
        .key(&s3_key)
        .content_type(&request.content_type)
        .presigned(aws_sdk_s3::presigning::PresigningConfig::expires_in(
            std::time::Duration::from_secs(PRESIGN_EXPIRY_SECS),
        )?)
        .await
        .map_err(|e| format!("Failed to generate presigned URL: {}", e))?;

    let response = serde_json::json!({
        "upload_url": presigned_request.uri(),
        "method": "PUT",
        "headers": {
            "Content-Type": request.content_type
        },
        "descriptor": {
            "path": s3_key,
            "name": request.file_name,
            "uploaded_at": chrono::Utc::now().to_rfc3339(),
        }
    });

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(response.to_string().into())
        .map_err(Box::new)?)
}

/// Delete a media object by path. Best-effort; the caller separately removes
/// the descriptor from the record's attribute list.
pub async fn delete_media(
    s3_client: &S3Client,
    request: DeleteMediaRequest,
) -> Result<Response<Body>, Error> {
    if let Err(e) = s3_client
        .delete_object()
        .bucket(BUCKET_NAME)
        .key(&request.path)
        .send()
        .await
    {
        tracing::error!("Failed to delete media object {}: {:?}", request.path, e);
    }

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}
