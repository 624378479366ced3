use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{build_payload, BackendRoute, Engine, SynthesisParams};
use crate::error::AppError;

/// Retry settings for backend calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^(attempt-1), capped at max_delay.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let delay = base
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16))
            .min(cap);
        Duration::from_millis(delay)
    }
}

#[derive(Debug)]
pub struct TransportReply {
    pub status: u16,
    pub body: Value,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport failure: {0}")]
    Other(String),
}

/// Seam between the forwarder and the wire, so retry behavior can be tested
/// against a scripted stub without a live backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<TransportReply, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<TransportReply, TransportError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_reqwest_error)?;
        // Backends occasionally return plain-text error bodies on failure.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(TransportReply { status, body })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Injected sleep so retry backoff is deterministic under test.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Relays a validated job to the selected backend with bounded, strictly
/// sequential retries. One backend call per job; no fan-out, no caching.
pub struct Forwarder {
    routes: HashMap<Engine, BackendRoute>,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl Forwarder {
    pub fn new(
        routes: HashMap<Engine, BackendRoute>,
        policy: RetryPolicy,
    ) -> Result<Self, AppError> {
        Ok(Self::with_parts(
            routes,
            policy,
            Arc::new(ReqwestTransport::new()?),
            Arc::new(TokioSleeper),
        ))
    }

    pub fn with_parts(
        routes: HashMap<Engine, BackendRoute>,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            routes,
            policy,
            transport,
            sleeper,
        }
    }

    /// Resolve the engine, build its payload and post it. The engine name is
    /// rejected before any network traffic if it is unknown or unrouted.
    pub async fn forward(
        &self,
        engine_name: &str,
        params: &SynthesisParams,
    ) -> Result<Value, AppError> {
        let engine = Engine::parse(engine_name).ok_or_else(|| {
            AppError::Validation(format!(
                "Unknown engine '{engine_name}', available: kokkoro, chatterbox"
            ))
        })?;
        let route = self.routes.get(&engine).ok_or_else(|| {
            AppError::Validation(format!(
                "Engine '{}' has no configured endpoint",
                engine.name()
            ))
        })?;

        let payload = build_payload(engine, params);
        tracing::info!("Forwarding job to '{}' at {}", engine.name(), route.base_url);

        self.post_with_retry(route, &payload).await
    }

    async fn post_with_retry(
        &self,
        route: &BackendRoute,
        payload: &Value,
    ) -> Result<Value, AppError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match self
                .transport
                .post_json(&route.base_url, payload, route.timeout)
                .await
            {
                Ok(reply) if (200..300).contains(&reply.status) => {
                    tracing::info!("Backend responded OK on attempt {attempt}");
                    return Ok(reply.body);
                }
                Ok(reply) => {
                    tracing::warn!(
                        "Backend returned HTTP {} on attempt {attempt}",
                        reply.status
                    );
                    AppError::BackendStatus {
                        status: reply.status,
                        attempts: attempt,
                    }
                }
                Err(TransportError::Timeout) => {
                    tracing::warn!("Backend timed out on attempt {attempt}");
                    AppError::BackendTimeout { attempts: attempt }
                }
                Err(TransportError::Connect(detail)) | Err(TransportError::Other(detail)) => {
                    tracing::warn!("Backend unreachable on attempt {attempt}: {detail}");
                    AppError::BackendConnect {
                        attempts: attempt,
                        detail,
                    }
                }
            };

            if attempt >= self.policy.max_attempts {
                return Err(failure);
            }

            let delay = self.policy.backoff(attempt);
            tracing::debug!("Retrying in {}ms", delay.as_millis());
            self.sleeper.sleep(delay).await;
        }
    }
}
