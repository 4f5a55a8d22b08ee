use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::upload::{upload_layer, UploadResponse};
use crate::{EventSink, UploadId};

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Uploads can be hundreds of megabytes, so they get their own ceiling.
    pub upload_timeout: Duration,
}

impl ApiSettings {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("{}", http_status_message(.status, .detail))]
    HttpStatus { status: u16, detail: Option<String> },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("cannot read file: {0}")]
    Io(String),
}

fn http_status_message(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("http status {status}"),
    }
}

/// Server path relative to the configured base url, e.g. `/api/maps/M1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiPath {
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl ApiPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends the segments to `base`, percent-encoding each one.
    pub fn to_url(&self, base: &Url) -> Result<Url, ApiError> {
        let mut url = base.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{base} cannot be a base url")))?
            .pop_if_empty()
            .extend(&self.segments);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))?;
        for (index, (key, value)) in self.query.iter().enumerate() {
            let sep = if index == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait Api: Send + Sync {
    async fn get_json(&self, path: &ApiPath) -> Result<Value, ApiError>;

    async fn post_json(&self, path: &ApiPath, body: &Value) -> Result<Value, ApiError>;

    /// Multipart upload of one file under the `file` field, reporting progress to `sink`.
    async fn upload(
        &self,
        upload_id: UploadId,
        path: &ApiPath,
        file: &Path,
        sink: Arc<dyn EventSink>,
    ) -> Result<UploadResponse, ApiError>;

    fn set_token(&self, token: Option<String>);
}

pub struct ReqwestApi {
    settings: ApiSettings,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl ReqwestApi {
    pub fn new(settings: ApiSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok(Self {
            settings,
            client,
            token: RwLock::new(None),
        })
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl Api for ReqwestApi {
    async fn get_json(&self, path: &ApiPath) -> Result<Value, ApiError> {
        let url = path.to_url(&self.settings.base_url)?;
        let response = self
            .authorize(self.client.get(url))
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(check_status(response).await?).await
    }

    async fn post_json(&self, path: &ApiPath, body: &Value) -> Result<Value, ApiError> {
        let url = path.to_url(&self.settings.base_url)?;
        let response = self
            .authorize(self.client.post(url))
            .timeout(self.settings.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(check_status(response).await?).await
    }

    async fn upload(
        &self,
        upload_id: UploadId,
        path: &ApiPath,
        file: &Path,
        sink: Arc<dyn EventSink>,
    ) -> Result<UploadResponse, ApiError> {
        let url = path.to_url(&self.settings.base_url)?;
        let request = self
            .authorize(self.client.post(url))
            .timeout(self.settings.upload_timeout);
        upload_layer(request, upload_id, file, sink).await
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }
}

/// Turns non-2xx responses into [`ApiError::HttpStatus`], keeping the server's `detail`.
pub(crate) async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::HttpStatus {
        status: status.as_u16(),
        detail: extract_detail(&body),
    })
}

async fn read_json(response: Response) -> Result<Value, ApiError> {
    let text = response.text().await.map_err(map_reqwest_error)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
}

fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout(err.to_string());
    }
    if err.is_decode() {
        return ApiError::Decode(err.to_string());
    }
    ApiError::Network(err.to_string())
}
