use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::{AnalysisResult, AuthToken, ErrorBody, LoginResponse, ResumeFile};

pub const LOGIN_ENDPOINT: &str = "/api/login/";
pub const UPLOAD_ENDPOINT: &str = "/api/upload/";
pub const LAST_ENDPOINT: &str = "/api/last/";

/// Multipart field the service reads the resume from.
pub const UPLOAD_FIELD: &str = "resume";

const DEFAULT_LOGIN_ERROR: &str = "Something went wrong";

// --- Transport seam ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart {
        field: &'static str,
        file: ResumeFile,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: &'static str,
    pub bearer: Option<AuthToken>,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request to the analysis service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

// --- reqwest transport ---

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder
                .header("Content-Type", "application/json")
                .json(&value),
            RequestBody::Multipart { field, file } => {
                let part = Part::bytes(file.bytes)
                    .file_name(file.file_name)
                    .mime_str(file.mime)
                    .map_err(|e| ApiError::NetworkFailure(format!("invalid multipart: {}", e)))?;
                builder.multipart(Form::new().part(field, part))
            }
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::NetworkFailure(format!("request to {} timed out", url))
            } else {
                ApiError::NetworkFailure(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::NetworkFailure(format!("failed to read response: {}", e)))?;

        Ok(ApiResponse { status, body })
    }
}

// --- Gateway ---

/// Typed access to the three service endpoints.
pub struct ApiGateway {
    transport: Box<dyn Transport>,
}

impl ApiGateway {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn http(config: &Config) -> anyhow::Result<Self> {
        let transport =
            HttpTransport::new(&config.api_url, Duration::from_secs(config.timeout_secs))?;
        Ok(Self::new(Box::new(transport)))
    }

    pub async fn login(&self, email: &str) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest {
            method: Method::Post,
            path: LOGIN_ENDPOINT,
            bearer: None,
            body: RequestBody::Json(json!({ "email": email })),
        };

        let response = self.transport.send(request).await?;
        info!(path = LOGIN_ENDPOINT, status = response.status, "login response");

        if !response.is_success() {
            let body = parse_error_body(&response.body);
            return Err(ApiError::AuthenticationRejected(
                body.error.unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_string()),
            ));
        }

        let value = parse_json(&response.body)?;
        match serde_json::from_value::<LoginResponse>(value.clone()) {
            Ok(login) => Ok(login),
            Err(e) => {
                warn!("login response without access token: {}", e);
                let body: ErrorBody = serde_json::from_value(value).unwrap_or_default();
                Err(ApiError::AuthenticationRejected(
                    body.error
                        .or(body.message)
                        .unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_string()),
                ))
            }
        }
    }

    pub async fn upload(
        &self,
        file: ResumeFile,
        token: Option<&AuthToken>,
    ) -> Result<AnalysisResult, ApiError> {
        let token = token.ok_or(ApiError::AuthenticationRequired)?;
        debug!(file = %file.file_name, bytes = file.bytes.len(), "uploading resume");

        let request = ApiRequest {
            method: Method::Post,
            path: UPLOAD_ENDPOINT,
            bearer: Some(token.clone()),
            body: RequestBody::Multipart {
                field: UPLOAD_FIELD,
                file,
            },
        };

        let response = self.transport.send(request).await?;
        info!(path = UPLOAD_ENDPOINT, status = response.status, "upload response");
        decode_result(response)
    }

    pub async fn fetch_last(&self, token: Option<&AuthToken>) -> Result<AnalysisResult, ApiError> {
        let token = token.ok_or(ApiError::AuthenticationRequired)?;

        let request = ApiRequest {
            method: Method::Get,
            path: LAST_ENDPOINT,
            bearer: Some(token.clone()),
            body: RequestBody::Empty,
        };

        let response = self.transport.send(request).await?;
        info!(path = LAST_ENDPOINT, status = response.status, "fetch-last response");
        decode_result(response)
    }
}

fn parse_json(body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::NetworkFailure(format!("invalid JSON in response: {}", e)))
}

fn parse_error_body(body: &str) -> ErrorBody {
    serde_json::from_str(body).unwrap_or_default()
}

fn decode_result(response: ApiResponse) -> Result<AnalysisResult, ApiError> {
    if !response.is_success() {
        if matches!(response.status, 401 | 403) {
            return Err(ApiError::AuthenticationRequired);
        }
        return Err(ApiError::ServerError {
            status: response.status,
            message: error_message(&response),
        });
    }

    let value = parse_json(&response.body)?;
    if !value.is_object() {
        return Err(ApiError::NetworkFailure(
            "expected a JSON object in response".to_string(),
        ));
    }

    let envelope: ErrorBody = serde_json::from_value(value.clone()).unwrap_or_default();
    let result: AnalysisResult = serde_json::from_value(value)
        .map_err(|e| ApiError::NetworkFailure(format!("undecodable result: {}", e)))?;

    // A body with no analysis fields is a status message, not a result
    if result.is_blank() {
        if let Some(error) = envelope.error {
            return Err(ApiError::ServerError {
                status: response.status,
                message: error,
            });
        }
        if let Some(message) = envelope.message {
            return Err(ApiError::NoAnalysis(message));
        }
    }

    Ok(result)
}

fn error_message(response: &ApiResponse) -> String {
    let body = parse_error_body(&response.body);
    if let Some(msg) = body.error.or(body.message) {
        return msg;
    }

    let raw = response.body.trim();
    if !raw.is_empty() {
        return raw.chars().take(200).collect();
    }

    reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Transport that records requests and replays canned responses.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        pub requests: Arc<Mutex<Vec<ApiRequest>>>,
        responses: Arc<Mutex<VecDeque<Result<ApiResponse, ApiError>>>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, status: u16, body: &str) -> Self {
            self.responses.lock().unwrap().push_back(Ok(ApiResponse {
                status,
                body: body.to_string(),
            }));
            self
        }

        pub fn fail(self, error: ApiError) -> Self {
            self.responses.lock().unwrap().push_back(Err(error));
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, index: usize) -> ApiRequest {
            self.requests.lock().unwrap()[index].clone()
        }

        pub fn gateway(&self) -> ApiGateway {
            ApiGateway::new(Box::new(self.clone()))
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::NetworkFailure("no canned response".into())))
        }
    }
}
