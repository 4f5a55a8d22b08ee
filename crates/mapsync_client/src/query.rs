use std::sync::Arc;
use std::time::Duration;

use mapsync_logging::{sync_debug, sync_warn};
use serde_json::Value;
use tokio::sync::Notify;

use crate::{Api, ApiError, ApiPath, EngineEvent, EventSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPolicy {
    /// Retries after the first failed attempt.
    pub retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
    /// Refetch interval while watched. `None` fetches only on watch and invalidation.
    pub poll_interval: Option<Duration>,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_secs(1),
            poll_interval: None,
        }
    }
}

impl QueryPolicy {
    pub fn polling(interval: Duration) -> Self {
        Self {
            poll_interval: Some(interval),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub path: ApiPath,
    pub policy: QueryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub message: String,
    pub attempts: u32,
}

/// Fetches `path`, retrying with linear backoff.
pub async fn fetch_with_retry(
    api: &dyn Api,
    path: &ApiPath,
    policy: &QueryPolicy,
) -> Result<Value, QueryFailure> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match api.get_json(path).await {
            Ok(body) => return Ok(body),
            Err(err) if attempt <= policy.retries && is_retryable(&err) => {
                let delay = policy.retry_delay * attempt;
                sync_debug!("Query {path} attempt {attempt} failed ({err}); retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Err(QueryFailure {
                    message: err.to_string(),
                    attempts: attempt,
                })
            }
        }
    }
}

fn is_retryable(err: &ApiError) -> bool {
    match err {
        ApiError::HttpStatus { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        ApiError::Timeout(_) | ApiError::Network(_) => true,
        ApiError::InvalidUrl(_) | ApiError::Decode(_) | ApiError::Io(_) => false,
    }
}

/// Serves one watched query until the task is aborted.
///
/// Each round fetches once and reports the outcome under `key`, then waits for
/// either the poll interval or a refresh signal.
pub async fn run_watch(
    api: Arc<dyn Api>,
    key: String,
    spec: QuerySpec,
    refresh: Arc<Notify>,
    sink: Arc<dyn EventSink>,
) {
    loop {
        match fetch_with_retry(api.as_ref(), &spec.path, &spec.policy).await {
            Ok(body) => sink.emit(EngineEvent::QueryLoaded {
                key: key.clone(),
                body,
            }),
            Err(failure) => {
                sync_warn!(
                    "Query {key} failed after {} attempts: {}",
                    failure.attempts,
                    failure.message
                );
                sink.emit(EngineEvent::QueryFailed {
                    key: key.clone(),
                    message: failure.message,
                    attempts: failure.attempts,
                });
            }
        }
        match spec.policy.poll_interval {
            Some(interval) => {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = refresh.notified() => {}
                }
            }
            None => refresh.notified().await,
        }
    }
}
