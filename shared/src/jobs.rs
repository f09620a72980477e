use crate::error::RegistryError;
use crate::types::{ApplyToJobRequest, CreateJobRequest, Job, JobApplication, UpdateJobRequest};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

const JOB_STATUSES: &[&str] = &["open", "closed", "filled"];

fn job_pk(job_id: &str) -> String {
    format!("JOB#{}", job_id)
}

fn job_to_item(job: &Job) -> HashMap<String, AttributeValue> {
    let pk = job_pk(&job.job_id);
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(pk.clone()));
    item.insert("SK".to_string(), AttributeValue::S(pk));
    item.insert("job_id".to_string(), AttributeValue::S(job.job_id.clone()));
    item.insert("title".to_string(), AttributeValue::S(job.title.clone()));
    if let Some(description) = &job.description {
        item.insert(
            "description".to_string(),
            AttributeValue::S(description.clone()),
        );
    }
    item.insert(
        "posted_by".to_string(),
        AttributeValue::S(job.posted_by.clone()),
    );
    if let Some(required) = &job.required_user_type {
        item.insert(
            "required_user_type".to_string(),
            AttributeValue::S(required.clone()),
        );
    }
    item.insert(
        "status".to_string(),
        AttributeValue::S(job.status.clone()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(job.created_at.clone()),
    );
    item
}

fn item_to_job(item: &HashMap<String, AttributeValue>) -> Option<Job> {
    let get_s = |key: &str| {
        item.get(key)
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
    };
    Some(Job {
        job_id: get_s("job_id")?,
        title: get_s("title").unwrap_or_default(),
        description: get_s("description"),
        posted_by: get_s("posted_by").unwrap_or_default(),
        required_user_type: get_s("required_user_type"),
        status: get_s("status").unwrap_or_else(|| "open".to_string()),
        created_at: get_s("created_at").unwrap_or_default(),
    })
}

async fn fetch_job(
    client: &DynamoClient,
    table_name: &str,
    job_id: &str,
) -> Result<Option<Job>, Error> {
    let pk = job_pk(job_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;
    Ok(result.item().and_then(item_to_job))
}

/// Create a job posting
pub async fn create_job(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateJobRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    if req.title.trim().is_empty() {
        return RegistryError::Validation("title is required".to_string()).into_response();
    }

    let job = Job {
        job_id: uuid::Uuid::new_v4().to_string(),
        title: req.title,
        description: req.description,
        posted_by: user_id.to_string(),
        required_user_type: req.required_user_type,
        status: "open".to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(job_to_item(&job)))
        .send()
        .await?;

    tracing::info!("Created job {} by {}", job.job_id, user_id);

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&job)?.into())
        .map_err(Box::new)?)
}

/// List all jobs, newest first
pub async fn list_jobs(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Response<Body>, Error> {
    let mut jobs = Vec::new();
    let mut last_key = None;
    loop {
        let mut scan = client
            .scan()
            .table_name(table_name)
            .filter_expression("begins_with(PK, :prefix) AND PK = SK")
            .expression_attribute_values(":prefix", AttributeValue::S("JOB#".to_string()));
        if let Some(key) = last_key {
            scan = scan.set_exclusive_start_key(Some(key));
        }
        let result = scan.send().await?;
        for item in result.items() {
            if let Some(job) = item_to_job(item) {
                jobs.push(job);
            }
        }
        match result.last_evaluated_key() {
            Some(key) if !key.is_empty() => last_key = Some(key.clone()),
            _ => break,
        }
    }
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&jobs)?.into())
        .map_err(Box::new)?)
}

/// Get a job posting
pub async fn get_job(
    client: &DynamoClient,
    table_name: &str,
    job_id: &str,
) -> Result<Response<Body>, Error> {
    match fetch_job(client, table_name, job_id).await? {
        Some(job) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&job)?.into())
            .map_err(Box::new)?),
        None => RegistryError::NotFound {
            entity: "job",
            id: job_id.to_string(),
        }
        .into_response(),
    }
}

/// Update a job posting (title, description, status)
pub async fn update_job(
    client: &DynamoClient,
    table_name: &str,
    job_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateJobRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return RegistryError::Validation(format!("invalid request body: {}", e))
                .into_response()
        }
    };

    let mut job = match fetch_job(client, table_name, job_id).await? {
        Some(job) => job,
        None => {
            return RegistryError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            }
            .into_response()
        }
    };

    if let Some(status) = &req.status {
        if !JOB_STATUSES.contains(&status.as_str()) {
            return RegistryError::Validation(format!(
                "status must be one of: {}",
                JOB_STATUSES.join(", ")
            ))
            .into_response();
        }
    }

    if let Some(title) = req.title {
        job.title = title;
    }
    if let Some(description) = req.description {
        job.description = Some(description);
    }
    if let Some(status) = req.status {
        job.status = status;
    }

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(job_to_item(&job)))
        .send()
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&job)?.into())
        .map_err(Box::new)?)
}

/// Delete a job posting and its application links
pub async fn delete_job(
    client: &DynamoClient,
    table_name: &str,
    job_id: &str,
) -> Result<Response<Body>, Error> {
    if fetch_job(client, table_name, job_id).await?.is_none() {
        return RegistryError::NotFound {
            entity: "job",
            id: job_id.to_string(),
        }
        .into_response();
    }

    // Applications share the job's partition key.
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk")
        .expression_attribute_values(":pk", AttributeValue::S(job_pk(job_id)))
        .send()
        .await?;
    for item in result.items() {
        if let (Some(pk), Some(sk)) = (
            item.get("PK").and_then(|v| v.as_s().ok()),
            item.get("SK").and_then(|v| v.as_s().ok()),
        ) {
            client
                .delete_item()
                .table_name(table_name)
                .key("PK", AttributeValue::S(pk.to_string()))
                .key("SK", AttributeValue::S(sk.to_string()))
                .send()
                .await?;
        }
    }

    tracing::info!("Deleted job {}", job_id);

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

/// Apply to a job. One application per user per job.
pub async fn apply_to_job(
    client: &DynamoClient,
    table_name: &str,
    job_id: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: ApplyToJobRequest = if body.is_empty() {
        ApplyToJobRequest { message: None }
    } else {
        match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(e) => {
                return RegistryError::Validation(format!("invalid request body: {}", e))
                    .into_response()
            }
        }
    };

    let job = match fetch_job(client, table_name, job_id).await? {
        Some(job) => job,
        None => {
            return RegistryError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            }
            .into_response()
        }
    };
    if job.status != "open" {
        return RegistryError::Validation(format!("job '{}' is not open", job_id))
            .into_response();
    }

    let sk = format!("APP#{}", user_id);
    let existing = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(job_pk(job_id)))
        .key("SK", AttributeValue::S(sk.clone()))
        .send()
        .await?;
    if existing.item().is_some() {
        return RegistryError::DuplicateKey(format!("application for job '{}'", job_id))
            .into_response();
    }

    let application = JobApplication {
        job_id: job_id.to_string(),
        user_id: user_id.to_string(),
        message: req.message,
        applied_at: chrono::Utc::now().to_rfc3339(),
    };

    let mut put = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(job_pk(job_id)))
        .item("SK", AttributeValue::S(sk))
        .item("user_id", AttributeValue::S(application.user_id.clone()))
        .item(
            "applied_at",
            AttributeValue::S(application.applied_at.clone()),
        );
    if let Some(message) = &application.message {
        put = put.item("message", AttributeValue::S(message.clone()));
    }
    put.send().await?;

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&application)?.into())
        .map_err(Box::new)?)
}

/// List applications for a job
pub async fn list_applicants(
    client: &DynamoClient,
    table_name: &str,
    job_id: &str,
) -> Result<Response<Body>, Error> {
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", AttributeValue::S(job_pk(job_id)))
        .expression_attribute_values(":sk_prefix", AttributeValue::S("APP#".to_string()))
        .send()
        .await?;

    let mut applications = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(user_id) = sk.strip_prefix("APP#") {
                applications.push(JobApplication {
                    job_id: job_id.to_string(),
                    user_id: user_id.to_string(),
                    message: item
                        .get("message")
                        .and_then(|v| v.as_s().ok())
                        .map(|s| s.to_string()),
                    applied_at: item
                        .get("applied_at")
                        .and_then(|v| v.as_s().ok())
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                });
            }
        }
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(&applications)?.into())
        .map_err(Box::new)?)
}
