//! Transport seam and the retrying sync adapter.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{QuillError, Result};
use crate::sync::protocol::{validate_request, validate_response, SyncRequest, SyncResponse};

/// Status codes worth retrying: timeouts, throttling, and server-side
/// failures that may clear on their own.
const TRANSIENT_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Raw reply from a transport, before any protocol interpretation.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

/// One-shot delivery of a sync request.
///
/// Implementations return `Ok` for any reply that arrived, whatever its
/// status code, and [`QuillError::SyncUnreachable`] when no reply
/// arrived at all. Retry decisions belong to the adapter.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn post(&self, request: &SyncRequest) -> Result<TransportReply>;
}

/// HTTP transport backed by a shared [`reqwest::Client`].
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self> {
        if !crate::config::is_valid_endpoint(endpoint) {
            return Err(QuillError::InvalidInput(format!(
                "Invalid sync endpoint: {}",
                endpoint
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn post(&self, request: &SyncRequest) -> Result<TransportReply> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| QuillError::SyncUnreachable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| QuillError::SyncUnreachable(e.to_string()))?;
        Ok(TransportReply { status, body })
    }
}

/// Retry behavior for a sync exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first (0 = single attempt)
    #[serde(rename = "maxRetries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    #[serde(rename = "baseDelayMs")]
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each retry
    #[serde(rename = "backoffFactor")]
    pub backoff_factor: u32,
    /// Whether network-level failures (no reply at all) are retried
    #[serde(rename = "retryOnNetworkError")]
    pub retry_on_network_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 500,
            backoff_factor: 2,
            retry_on_network_error: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt `attempt` (1-based).
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor.max(1));
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor.saturating_pow(attempt.saturating_sub(1))),
        )
    }
}

/// Where the adapter currently is in its attempt cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Sending,
    Retrying,
    Succeeded,
    Failed,
}

/// Sync adapter with bounded exponential-backoff retries.
///
/// Only transient failures are retried: a transient HTTP status, or a
/// network-level failure when the policy allows it. Protocol rejections
/// and malformed responses fail immediately. When the budget runs out
/// the last error is surfaced unchanged.
pub struct RestAdapter {
    transport: Box<dyn SyncTransport>,
    policy: RetryPolicy,
    state: Mutex<AttemptState>,
}

impl RestAdapter {
    pub fn new(transport: Box<dyn SyncTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            state: Mutex::new(AttemptState::Idle),
        }
    }

    pub fn state(&self) -> AttemptState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: AttemptState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Send `request`, retrying transient failures per the policy.
    pub async fn exchange(&self, request: &SyncRequest) -> Result<SyncResponse> {
        validate_request(request)?;

        let attempts = self.policy.max_retries + 1;
        let mut attempt = 1;
        loop {
            self.set_state(AttemptState::Sending);
            debug!(attempt, attempts, "sending sync request");

            let error = match self.transport.post(request).await {
                Ok(reply) if (200..300).contains(&reply.status) => {
                    return match validate_response(&reply.body) {
                        Ok(response) => {
                            self.set_state(AttemptState::Succeeded);
                            Ok(response)
                        }
                        Err(err) => {
                            self.set_state(AttemptState::Failed);
                            Err(err)
                        }
                    };
                }
                Ok(reply) => {
                    let err = QuillError::SyncRejected {
                        status: reply.status,
                    };
                    if !TRANSIENT_STATUSES.contains(&reply.status) {
                        self.set_state(AttemptState::Failed);
                        return Err(err);
                    }
                    err
                }
                Err(err @ QuillError::SyncUnreachable(_)) if self.policy.retry_on_network_error => {
                    err
                }
                Err(err) => {
                    self.set_state(AttemptState::Failed);
                    return Err(err);
                }
            };

            if attempt >= attempts {
                self.set_state(AttemptState::Failed);
                return Err(error);
            }

            let delay = self.policy.delay_after(attempt);
            warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "sync attempt failed, retrying");
            self.set_state(AttemptState::Retrying);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::protocol::test_fixtures::{sample_request, sample_response_json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Transport that plays back a fixed script of replies.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportReply>>>,
        attempts: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<TransportReply>>) -> (Self, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            let transport = Self {
                script: Mutex::new(script.into()),
                attempts: Arc::clone(&attempts),
            };
            (transport, attempts)
        }

        fn ok(status: u16, body: &str) -> Result<TransportReply> {
            Ok(TransportReply {
                status,
                body: body.to_string(),
            })
        }
    }

    #[async_trait]
    impl SyncTransport for ScriptedTransport {
        async fn post(&self, _request: &SyncRequest) -> Result<TransportReply> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport script exhausted")
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 100,
            backoff_factor: 2,
            retry_on_network_error: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_statuses_are_retried_with_backoff() {
        let (transport, attempts) = ScriptedTransport::new(vec![
            ScriptedTransport::ok(503, ""),
            ScriptedTransport::ok(503, ""),
            ScriptedTransport::ok(200, &sample_response_json("rev-2")),
        ]);
        let adapter = RestAdapter::new(Box::new(transport), policy(2));

        let started = tokio::time::Instant::now();
        let response = adapter.exchange(&sample_request()).await.unwrap();

        assert_eq!(response.server_revision.as_deref(), Some("rev-2"));
        assert_eq!(adapter.state(), AttemptState::Succeeded);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Delays are base, then base * factor.
        assert_eq!(started.elapsed(), Duration::from_millis(100 + 200));
    }

    #[tokio::test]
    async fn test_non_transient_status_fails_on_first_attempt() {
        let (transport, attempts) = ScriptedTransport::new(vec![
            ScriptedTransport::ok(400, ""),
            ScriptedTransport::ok(200, &sample_response_json("rev-2")),
        ]);
        let adapter = RestAdapter::new(Box::new(transport), policy(3));

        let err = adapter.exchange(&sample_request()).await.unwrap_err();
        assert!(matches!(err, QuillError::SyncRejected { status: 400 }));
        assert_eq!(adapter.state(), AttemptState::Failed);
        // The scripted 200 reply was never consumed.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_retried_when_policy_allows() {
        let (transport, attempts) = ScriptedTransport::new(vec![
            Err(QuillError::SyncUnreachable("connection refused".to_string())),
            ScriptedTransport::ok(200, &sample_response_json("rev-3")),
        ]);
        let adapter = RestAdapter::new(Box::new(transport), policy(1));

        let response = adapter.exchange(&sample_request()).await.unwrap();
        assert_eq!(response.server_revision.as_deref(), Some("rev-3"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_network_errors_fail_fast_when_disabled() {
        let mut policy = policy(3);
        policy.retry_on_network_error = false;
        let (transport, attempts) = ScriptedTransport::new(vec![Err(
            QuillError::SyncUnreachable("connection refused".to_string()),
        )]);
        let adapter = RestAdapter::new(Box::new(transport), policy);

        let err = adapter.exchange(&sample_request()).await.unwrap_err();
        assert!(matches!(err, QuillError::SyncUnreachable(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_surfaces_last_error() {
        let (transport, attempts) = ScriptedTransport::new(vec![
            ScriptedTransport::ok(503, ""),
            ScriptedTransport::ok(502, ""),
        ]);
        let adapter = RestAdapter::new(Box::new(transport), policy(1));

        let err = adapter.exchange(&sample_request()).await.unwrap_err();
        assert!(matches!(err, QuillError::SyncRejected { status: 502 }));
        assert_eq!(adapter.state(), AttemptState::Failed);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_not_retried() {
        let (transport, attempts) = ScriptedTransport::new(vec![
            ScriptedTransport::ok(200, "{\"surprise\":true}"),
            ScriptedTransport::ok(200, &sample_response_json("rev-2")),
        ]);
        let adapter = RestAdapter::new(Box::new(transport), policy(3));

        let err = adapter.exchange(&sample_request()).await.unwrap_err();
        assert!(matches!(err, QuillError::MalformedMessage(_)));
        assert_eq!(adapter.state(), AttemptState::Failed);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_request_before_sending() {
        let (transport, attempts) = ScriptedTransport::new(vec![]);
        let adapter = RestAdapter::new(Box::new(transport), policy(0));

        let mut request = sample_request();
        request.client.device_id.clear();
        let err = adapter.exchange(&request).await.unwrap_err();
        assert!(matches!(err, QuillError::MalformedMessage(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
