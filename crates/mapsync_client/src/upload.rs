use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use mapsync_logging::sync_debug;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::api::{check_status, map_reqwest_error};
use crate::{ApiError, EngineEvent, EventSink, UploadId};

/// Server answer to a successful layer upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    /// Name the server gave the new layer.
    pub name: String,
    /// Set when the upload produced a new map version.
    #[serde(default)]
    pub dag_child_map_id: Option<String>,
}

/// Sends `file` as the `file` field of a multipart POST built on `request`.
///
/// Progress is reported per chunk read from disk, so `sent` reaches `total`
/// shortly before the server has answered.
pub async fn upload_layer(
    request: RequestBuilder,
    upload_id: UploadId,
    file: &Path,
    sink: Arc<dyn EventSink>,
) -> Result<UploadResponse, ApiError> {
    let handle = tokio::fs::File::open(file)
        .await
        .map_err(|err| ApiError::Io(format!("{}: {err}", file.display())))?;
    let total = handle
        .metadata()
        .await
        .map_err(|err| ApiError::Io(format!("{}: {err}", file.display())))?
        .len();
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let mut sent = 0u64;
    let progress_sink = sink.clone();
    let body = ReaderStream::new(handle).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as u64;
            progress_sink.emit(EngineEvent::UploadProgress {
                upload_id,
                sent,
                total,
            });
        }
        chunk
    });

    let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
        .file_name(file_name)
        .mime_str("application/octet-stream")
        .map_err(map_reqwest_error)?;
    let form = Form::new().part("file", part);

    sync_debug!("upload {upload_id}: sending {} ({total} bytes)", file.display());
    let response = request
        .multipart(form)
        .send()
        .await
        .map_err(map_reqwest_error)?;
    let response = check_status(response).await?;
    response
        .json::<UploadResponse>()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))
}
