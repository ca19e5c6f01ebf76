use std::time::Duration;

use async_trait::async_trait;
use exchange_model::{BodyError, ContractViolation, ExchangeContext, Request, Response};
use url::Url;

use crate::state::SharedState;

/// Why a hook invocation produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook itself reported an error.
    #[error("hook failed: {reason}")]
    Failed { reason: String },

    #[error("hook timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The hook returned a value the host cannot use.
    #[error("hook broke its contract: {0}")]
    Contract(#[from] ContractViolation),

    /// The hook wrote a body value that does not fit the body's tag.
    #[error("body tag mismatch: {0}")]
    Body(#[from] BodyError),
}

impl HookError {
    pub fn failed(reason: impl Into<String>) -> Self {
        HookError::Failed {
            reason: reason.into(),
        }
    }
}

/// Runs before an intercepted request is forwarded upstream.
///
/// The hook owns `request` for the duration of the call and returns the
/// request that will actually be sent. It may edit headers, queries and
/// body, or rewrite scheme, host, port and path to send the exchange
/// elsewhere. `url` is the resolved URL of the request as it arrived.
#[async_trait]
pub trait RequestHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_request(
        &self,
        ctx: &ExchangeContext,
        state: &SharedState,
        url: &Url,
        request: Request,
    ) -> Result<Request, HookError>;
}

/// Runs before an upstream response is delivered to the client.
///
/// `request` is the request that was forwarded, after any request hook
/// edits; it is context only. The returned response replaces the real one.
#[async_trait]
pub trait ResponseHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_response(
        &self,
        ctx: &ExchangeContext,
        state: &SharedState,
        url: &Url,
        request: &Request,
        response: Response,
    ) -> Result<Response, HookError>;
}
