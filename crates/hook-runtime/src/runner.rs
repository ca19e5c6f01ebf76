use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use exchange_model::contract::{validate_request, validate_response};
use exchange_model::{codec, ExchangeContext, Request, Response, UrlError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::hook::{HookError, RequestHook, ResponseHook};
use crate::state::SharedState;

const COMPONENT: &str = "hook-runner";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the client gets when the response hook fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFailurePolicy {
    /// Deliver the upstream response exactly as it arrived.
    #[default]
    DeliverOriginal,
    /// Deliver nothing; the exchange fails.
    Abort,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Upper bound on a single hook invocation.
    pub timeout: Duration,
    pub response_failure: ResponseFailurePolicy,
    pub request_enabled: bool,
    pub response_enabled: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            response_failure: ResponseFailurePolicy::default(),
            request_enabled: true,
            response_enabled: true,
        }
    }
}

/// How the delivered response came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    /// No response hook ran.
    Passthrough,
    /// The response hook's result was delivered.
    Transformed,
    /// The response hook failed and the original response was delivered.
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct ResponseOutcome {
    pub response: Response,
    pub disposition: Disposition,
}

/// A request as forwarded and the response as delivered.
#[derive(Debug, Clone)]
pub struct CompletedExchange {
    pub request: Request,
    pub response: ResponseOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("request hook '{hook}' failed, nothing was forwarded: {source}")]
    RequestAborted {
        hook: String,
        #[source]
        source: HookError,
    },

    #[error("response hook '{hook}' failed, response withheld: {source}")]
    ResponseAborted {
        hook: String,
        #[source]
        source: HookError,
    },

    #[error("request URL cannot be resolved: {0}")]
    Url(#[from] UrlError),

    #[error("upstream failed: {0}")]
    Upstream(String),
}

/// Runs the configured hooks around one exchange at a time.
///
/// The runner is shared by every exchange of a session: its methods take
/// `&self` and may be called concurrently. Hooks see the same
/// [`SharedState`] on every call.
pub struct HookRunner {
    request_hook: Option<Arc<dyn RequestHook>>,
    response_hook: Option<Arc<dyn ResponseHook>>,
    state: SharedState,
    config: RunnerConfig,
    audit: Option<AuditSink>,
}

impl std::fmt::Debug for HookRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRunner")
            .field("request_hook", &self.request_hook.as_ref().map(|h| h.name().to_string()))
            .field("response_hook", &self.response_hook.as_ref().map(|h| h.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

impl HookRunner {
    pub fn new(state: SharedState, config: RunnerConfig) -> Self {
        Self {
            request_hook: None,
            response_hook: None,
            state,
            config,
            audit: None,
        }
    }

    pub fn with_request_hook(mut self, hook: Arc<dyn RequestHook>) -> Self {
        self.request_hook = Some(hook);
        self
    }

    pub fn with_response_hook(mut self, hook: Arc<dyn ResponseHook>) -> Self {
        self.response_hook = Some(hook);
        self
    }

    pub fn with_audit(mut self, audit: AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn active_request_hook(&self) -> Option<&Arc<dyn RequestHook>> {
        self.request_hook
            .as_ref()
            .filter(|_| self.config.request_enabled)
    }

    fn active_response_hook(&self) -> Option<&Arc<dyn ResponseHook>> {
        self.response_hook
            .as_ref()
            .filter(|_| self.config.response_enabled)
    }

    /// Run the request hook and return the request to forward.
    ///
    /// Any failure aborts the exchange: the caller must not forward
    /// anything when this returns `Err`.
    pub async fn run_request(
        &self,
        ctx: &ExchangeContext,
        request: Request,
    ) -> Result<Request, ExchangeError> {
        let Some(hook) = self.active_request_hook() else {
            return Ok(request);
        };
        let url = request.url()?;
        let before = request.body.tag();
        let started = Instant::now();

        let result =
            match tokio::time::timeout(self.config.timeout, hook.on_request(ctx, &self.state, &url, request))
                .await
            {
                Ok(Ok(mut request)) => {
                    codec::sync_content_type(&mut request.headers, before, &request.body);
                    validate_request(&request)
                        .map(|()| request)
                        .map_err(HookError::from)
                }
                Ok(Err(err)) => Err(err),
                Err(_elapsed) => Err(HookError::Timeout {
                    timeout: self.config.timeout,
                }),
            };
        let elapsed = started.elapsed();

        match result {
            Ok(request) => {
                tracing::debug!(
                    exchange_id = ctx.exchange_id,
                    hook = hook.name(),
                    %url,
                    ?elapsed,
                    "request hook completed"
                );
                self.record(
                    ctx,
                    hook.name(),
                    AuditEventType::RequestHookCompleted,
                    json!({ "url": url.as_str(), "method": request.method }),
                    elapsed,
                )
                .await;
                Ok(request)
            }
            Err(err) => {
                tracing::warn!(
                    exchange_id = ctx.exchange_id,
                    hook = hook.name(),
                    %url,
                    %err,
                    "request hook failed, aborting exchange"
                );
                self.record(
                    ctx,
                    hook.name(),
                    AuditEventType::RequestHookFailed,
                    json!({ "url": url.as_str(), "error": err.to_string() }),
                    elapsed,
                )
                .await;
                self.record(
                    ctx,
                    hook.name(),
                    AuditEventType::ExchangeAborted,
                    json!({ "url": url.as_str(), "stage": "request" }),
                    elapsed,
                )
                .await;
                Err(ExchangeError::RequestAborted {
                    hook: hook.name().to_string(),
                    source: err,
                })
            }
        }
    }

    /// Run the response hook against the upstream `response`.
    ///
    /// `request` is the request that was forwarded. On hook failure the
    /// configured [`ResponseFailurePolicy`] decides between delivering the
    /// untouched original and aborting; a partially edited response is
    /// never delivered.
    pub async fn run_response(
        &self,
        ctx: &ExchangeContext,
        request: &Request,
        response: Response,
    ) -> Result<ResponseOutcome, ExchangeError> {
        let Some(hook) = self.active_response_hook() else {
            return Ok(ResponseOutcome {
                response,
                disposition: Disposition::Passthrough,
            });
        };
        let original = match self.config.response_failure {
            ResponseFailurePolicy::DeliverOriginal => Some(response.clone()),
            ResponseFailurePolicy::Abort => None,
        };
        let before = response.body.tag();
        let started = Instant::now();

        let result = match request.url() {
            Ok(url) => {
                let invoked = tokio::time::timeout(
                    self.config.timeout,
                    hook.on_response(ctx, &self.state, &url, request, response),
                )
                .await;
                match invoked {
                    Ok(Ok(mut response)) => {
                        codec::sync_content_type(&mut response.headers, before, &response.body);
                        validate_response(&response)
                            .map(|()| response)
                            .map_err(HookError::from)
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_elapsed) => Err(HookError::Timeout {
                        timeout: self.config.timeout,
                    }),
                }
            }
            Err(err) => Err(HookError::failed(format!("request URL cannot be resolved: {err}"))),
        };
        let elapsed = started.elapsed();

        let err = match result {
            Ok(response) => {
                tracing::debug!(
                    exchange_id = ctx.exchange_id,
                    hook = hook.name(),
                    status = response.status_code,
                    ?elapsed,
                    "response hook completed"
                );
                self.record(
                    ctx,
                    hook.name(),
                    AuditEventType::ResponseHookCompleted,
                    json!({ "status": response.status_code }),
                    elapsed,
                )
                .await;
                return Ok(ResponseOutcome {
                    response,
                    disposition: Disposition::Transformed,
                });
            }
            Err(err) => err,
        };

        tracing::warn!(
            exchange_id = ctx.exchange_id,
            hook = hook.name(),
            %err,
            policy = ?self.config.response_failure,
            "response hook failed"
        );
        self.record(
            ctx,
            hook.name(),
            AuditEventType::ResponseHookFailed,
            json!({ "error": err.to_string() }),
            elapsed,
        )
        .await;

        match original {
            Some(response) => {
                self.record(
                    ctx,
                    hook.name(),
                    AuditEventType::ResponseFallback,
                    json!({ "status": response.status_code }),
                    elapsed,
                )
                .await;
                Ok(ResponseOutcome {
                    response,
                    disposition: Disposition::Fallback {
                        reason: err.to_string(),
                    },
                })
            }
            None => {
                self.record(
                    ctx,
                    hook.name(),
                    AuditEventType::ExchangeAborted,
                    json!({ "stage": "response" }),
                    elapsed,
                )
                .await;
                Err(ExchangeError::ResponseAborted {
                    hook: hook.name().to_string(),
                    source: err,
                })
            }
        }
    }

    /// Run a whole exchange: request hook, `upstream`, response hook.
    ///
    /// `upstream` is called at most once, and only with the request the
    /// request hook approved. When it fails the response hook does not run.
    pub async fn drive<F, Fut, E>(
        &self,
        ctx: &mut ExchangeContext,
        request: Request,
        upstream: F,
    ) -> Result<CompletedExchange, ExchangeError>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Result<Response, E>>,
        E: Display,
    {
        let forwarded = self.run_request(ctx, request).await?;
        let response = upstream(forwarded.clone())
            .await
            .map_err(|err| ExchangeError::Upstream(err.to_string()))?;
        ctx.response_received();
        let response = self.run_response(ctx, &forwarded, response).await?;
        Ok(CompletedExchange {
            request: forwarded,
            response,
        })
    }

    async fn record(
        &self,
        ctx: &ExchangeContext,
        hook: &str,
        event_type: AuditEventType,
        details: Value,
        elapsed: Duration,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let source = AuditSource::new(COMPONENT)
            .exchange(ctx.session_id, ctx.exchange_id)
            .hook(hook);
        audit
            .log(AuditEntry::new(event_type, source, details).with_duration(elapsed))
            .await;
    }
}
