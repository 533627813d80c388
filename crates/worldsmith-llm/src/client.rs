use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use worldsmith_types::{Result, TokenUsage, WorldsmithError};

use crate::{DynProvider, ProviderAdapter, Request, Response};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        tracing::debug!(
            model = %request.model,
            max_tokens = ?request.max_tokens,
            prompt_chars,
            "model request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "model response"
        );
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: UsageTrackingMiddleware
// ---------------------------------------------------------------------------

/// Accumulates token usage across every call made through the client.
///
/// Clones share the same counters, so keep one clone as a handle and hand
/// the other to [`LlmClient::with_middleware`].
#[derive(Clone, Default)]
pub struct UsageTrackingMiddleware {
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
}

impl UsageTrackingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.total_input_tokens(),
            output_tokens: self.total_output_tokens(),
        }
    }
}

impl Middleware for UsageTrackingMiddleware {
    fn after(&self, _request: &Request, response: &mut Response) {
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

/// A single text provider behind a middleware chain and an optional
/// per-call timeout.
pub struct LlmClient {
    provider: DynProvider,
    middleware: Vec<Box<dyn Middleware>>,
    call_timeout: Option<Duration>,
}

impl LlmClient {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self {
            provider: DynProvider::new(provider),
            middleware: Vec::new(),
            call_timeout: None,
        }
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn default_model(&self) -> &str {
        self.provider.default_model()
    }

    /// Run `request` through the middleware chain and the provider.
    ///
    /// A call exceeding the configured timeout fails with `RequestTimeout`,
    /// which is retryable like any other transport failure.
    pub async fn complete(&self, request: &Request) -> Result<Response> {
        let mut req = request.clone();

        for m in &self.middleware {
            m.before(&mut req);
        }

        let call = self.provider.complete(&req);
        let mut resp = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                WorldsmithError::RequestTimeout {
                    provider: self.provider.name().to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
            })??,
            None => call.await?,
        };

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    /// Create a client backed by the Anthropic adapter (`ANTHROPIC_API_KEY`).
    pub fn from_env() -> Result<Self> {
        let adapter = crate::AnthropicAdapter::from_env()?;
        Ok(Self::new(adapter).with_middleware(LoggingMiddleware))
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider.name())
            .field("middleware", &self.middleware.len())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
