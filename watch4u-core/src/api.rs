//! HTTP client for the exam service REST API.
//!
//! All endpoints live under the versioned base URL from [`Config`]. Every
//! call except `login` carries the session token as a bearer credential.
//! Errors are classified into [`ApiError`] so callers can tell an expired
//! session apart from a flaky network.

use std::fmt;

use reqwest::multipart;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::session::{Role, Session};

/// Error from a REST call, classified for the caller.
#[derive(Debug)]
pub enum ApiError {
    /// The server rejected the session token (HTTP 401).
    Unauthorized,
    /// The server rejected the sign-in credentials.
    Credentials(String),
    /// The server answered with a non-success status.
    Status { code: u16, message: String },
    /// The request never completed.
    Network(String),
    /// The response body did not have the expected shape.
    Decode(String),
    /// The request hit the client-side deadline.
    Timeout,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "the server rejected the saved session token"),
            ApiError::Credentials(message) => write!(f, "sign-in rejected: {}", message),
            ApiError::Status { code, message } => {
                write!(f, "server answered {}: {}", code, message)
            }
            ApiError::Network(detail) => write!(f, "request failed: {}", detail),
            ApiError::Decode(detail) => write!(f, "unexpected response shape: {}", detail),
            ApiError::Timeout => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Body of a `login` response. The server reports bad credentials through
/// the `error` field on an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<i64>,
}

/// One exam sitting, as listed by `GET exam`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    pub title: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    /// Minutes.
    pub duration: i64,
    pub room: Vec<Room>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub location: String,
}

/// One candidate row from `GET exam/{id}/user_list`.
///
/// `tag_serial_number` is absent until a tag has been bound to the
/// candidate, and `check_in_time` is absent until they have checked in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub email: String,
    pub seat: Option<String>,
    pub tag_serial_number: Option<String>,
    pub check_in_time: Option<String>,
}

#[derive(Debug, Serialize)]
struct TagBinding<'a> {
    user_id: &'a str,
    tag_serial_number: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadImageResponse {
    pub image_url: String,
}

/// Async client for the exam service.
pub struct ExamApiClient {
    client: reqwest::Client,
    config: Config,
    auth_token: Option<String>,
}

impl ExamApiClient {
    /// Build a client with no credentials, for signing in.
    pub fn new(config: Config) -> Result<Self, ApiError> {
        Self::build(config, None)
    }

    /// Build a client that sends `token` as a bearer credential.
    pub fn with_token(config: Config, token: impl Into<String>) -> Result<Self, ApiError> {
        Self::build(config, Some(token.into()))
    }

    fn build(config: Config, auth_token: Option<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("watch4u/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            auth_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, self.config.api_endpoint(path));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Sign in with email and password. Returns the session to persist.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let response = self
            .request(Method::POST, "login")
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: LoginResponse = response.json().await?;

        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(ApiError::Credentials(error));
        }
        match (body.token, body.user_id) {
            (Some(token), Some(user_id)) => Ok(Session {
                token,
                user_id,
                role: Role(body.role.unwrap_or(0)),
            }),
            _ => Err(ApiError::Decode(
                "login response missing token or user_id".to_string(),
            )),
        }
    }

    /// List the exams the signed-in user can run check-ins for.
    pub async fn list_exams(&self) -> Result<Vec<Exam>, ApiError> {
        let response = self.request(Method::GET, "exam").send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Fetch the roster snapshot for one exam.
    pub async fn fetch_roster(&self, exam_id: &str) -> Result<Vec<RosterEntry>, ApiError> {
        debug!("Fetching user list for exam {}", exam_id);
        let path = format!("exam/{}/user_list", exam_id);
        let response = self.request(Method::GET, &path).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Bind a tag serial to a candidate for this exam.
    pub async fn set_tag(
        &self,
        exam_id: &str,
        user_id: &str,
        tag_serial_number: &str,
    ) -> Result<(), ApiError> {
        let path = format!("exam/{}/set_tag", exam_id);
        let response = self
            .request(Method::POST, &path)
            .json(&TagBinding {
                user_id,
                tag_serial_number,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Record proof that the candidate's tag was scanned at the desk.
    ///
    /// The server treats repeated submissions for the same candidate as
    /// one check-in, so retrying after a lost response is safe.
    pub async fn confirm_nfc(
        &self,
        exam_id: &str,
        user_id: &str,
        tag_serial_number: &str,
    ) -> Result<(), ApiError> {
        let path = format!("exam/{}/nfc", exam_id);
        let response = self
            .request(Method::POST, &path)
            .json(&TagBinding {
                user_id,
                tag_serial_number,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Upload the candidate's desk photo. Returns the stored image URL.
    pub async fn upload_image(
        &self,
        exam_id: &str,
        user_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ApiError> {
        info!(
            "Uploading {} ({} bytes) for user {} in exam {}",
            file_name,
            bytes.len(),
            user_id,
            exam_id
        );
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for_file_name(file_name))?;
        let form = multipart::Form::new()
            .text("user_id", user_id.to_string())
            .part("photo", part);

        let path = format!("exam/{}/upload_image", exam_id);
        let response = self
            .request(Method::POST, &path)
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: UploadImageResponse = response.json().await?;
        Ok(body.image_url)
    }
}

/// Turn a non-success response into an [`ApiError`], reading the body for
/// the server's message where there is one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        warn!("Exam API rejected the session token");
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        error!("Exam API error: {} - {}", status, message);
        return Err(ApiError::Status {
            code: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

/// Sort roster entries by seat label, entries without a seat last.
pub fn sort_by_seat(entries: &mut [RosterEntry]) {
    entries.sort_by(|a, b| match (&a.seat, &b.seat) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

fn mime_for_file_name(file_name: &str) -> &'static str {
    let extension = file_name.rsplit('.').next().unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}
