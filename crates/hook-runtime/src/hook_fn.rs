//! Adapters that turn async closures into hooks.
//!
//! Each closure receives owned copies of its arguments so it can hold them
//! across `.await` points.
//!
//! ```rust
//! use hook_runtime::hook_fn::request_fn;
//!
//! let hook = request_fn("tag-requests", |_ctx, state, url, mut request| async move {
//!     state.set("last-url", url.as_str());
//!     request.headers.insert("X-New-Header", "My-Value");
//!     Ok(request)
//! });
//! # let _ = hook;
//! ```

use std::future::Future;

use async_trait::async_trait;
use exchange_model::{ExchangeContext, Request, Response};
use url::Url;

use crate::hook::{HookError, RequestHook, ResponseHook};
use crate::state::SharedState;

pub struct RequestFn<F> {
    name: String,
    f: F,
}

pub fn request_fn<F, Fut>(name: impl Into<String>, f: F) -> RequestFn<F>
where
    F: Fn(ExchangeContext, SharedState, Url, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Request, HookError>> + Send + 'static,
{
    RequestFn {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> RequestHook for RequestFn<F>
where
    F: Fn(ExchangeContext, SharedState, Url, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Request, HookError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_request(
        &self,
        ctx: &ExchangeContext,
        state: &SharedState,
        url: &Url,
        request: Request,
    ) -> Result<Request, HookError> {
        (self.f)(ctx.clone(), state.clone(), url.clone(), request).await
    }
}

pub struct ResponseFn<F> {
    name: String,
    f: F,
}

pub fn response_fn<F, Fut>(name: impl Into<String>, f: F) -> ResponseFn<F>
where
    F: Fn(ExchangeContext, SharedState, Url, Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HookError>> + Send + 'static,
{
    ResponseFn {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> ResponseHook for ResponseFn<F>
where
    F: Fn(ExchangeContext, SharedState, Url, Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HookError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_response(
        &self,
        ctx: &ExchangeContext,
        state: &SharedState,
        url: &Url,
        request: &Request,
        response: Response,
    ) -> Result<Response, HookError> {
        (self.f)(ctx.clone(), state.clone(), url.clone(), request.clone(), response).await
    }
}
