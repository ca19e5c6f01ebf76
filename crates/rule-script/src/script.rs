use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use exchange_model::contract::is_token;
use exchange_model::{BodyError, ExchangeContext, Request, Response};
use hook_runtime::date_shift::shift_array_dates;
use hook_runtime::{DateShift, HookError, RequestHook, ResponseHook, SharedState};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::matcher::CompiledMatch;
use crate::schema::{
    RequestActions, ResponseActions, ScriptConfig, ScriptRule, StateSource,
};

const EXCHANGE_ID_PLACEHOLDER: &str = "{exchange_id}";

struct CompiledRule {
    rule: ScriptRule,
    matcher: CompiledMatch,
    shift: Option<DateShift>,
}

/// A loaded rule script, usable as both the request and the response hook.
///
/// Rules are matched against the request as it arrived, so a redirect made
/// by one rule does not change which later rules apply. The response side
/// matches against the request that was forwarded.
pub struct RuleScript {
    name: String,
    /// Sorted by ascending priority; ties keep file order.
    rules: Vec<CompiledRule>,
}

impl std::fmt::Debug for RuleScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleScript")
            .field("name", &self.name)
            .field("num_rules", &self.rules.len())
            .finish()
    }
}

impl RuleScript {
    /// Compile a validated [`ScriptConfig`].
    ///
    /// Globs, header names, ports, statuses and zone offsets are all checked
    /// here, so a script that compiles can only fail at run time on
    /// exchange-dependent input such as a non-JSON body.
    pub fn new(config: ScriptConfig) -> Result<Self> {
        let mut rules = config.rules;
        rules.sort_by_key(|r| r.priority);

        let rules = rules
            .into_iter()
            .map(|rule| {
                let name = rule.name.clone();
                compile_rule(rule).with_context(|| format!("invalid rule '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: config.name,
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rule names in application order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule.name.as_str()).collect()
    }

    pub fn has_request_actions(&self) -> bool {
        self.rules.iter().any(|r| r.rule.request.is_some())
    }

    pub fn has_response_actions(&self) -> bool {
        self.rules.iter().any(|r| r.rule.response.is_some())
    }

    /// Apply every matching rule's request actions.
    pub fn apply_request(
        &self,
        ctx: &ExchangeContext,
        state: &SharedState,
        url: &Url,
        mut request: Request,
    ) -> Result<Request, HookError> {
        let arrived = request.clone();
        for compiled in &self.rules {
            let Some(actions) = &compiled.rule.request else {
                continue;
            };
            if !compiled.matcher.matches(&arrived) {
                continue;
            }
            trace!(rule = compiled.rule.name, exchange_id = ctx.exchange_id, "rule matched request");
            if let Err(err) = apply_request_actions(actions, ctx, state, url, &arrived, &mut request) {
                debug!(rule = compiled.rule.name, %err, "rule could not be applied");
                return Err(err);
            }
        }
        Ok(request)
    }

    /// Apply every matching rule's response actions.
    pub fn apply_response(
        &self,
        ctx: &ExchangeContext,
        state: &SharedState,
        request: &Request,
        mut response: Response,
    ) -> Result<Response, HookError> {
        for compiled in &self.rules {
            let Some(actions) = &compiled.rule.response else {
                continue;
            };
            if !compiled.matcher.matches(request) {
                continue;
            }
            trace!(rule = compiled.rule.name, exchange_id = ctx.exchange_id, "rule matched response");
            apply_response_actions(actions, compiled.shift.as_ref(), ctx, state, &mut response);
        }
        Ok(response)
    }
}

#[async_trait]
impl RequestHook for RuleScript {
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
        self.apply_request(ctx, state, url, request)
    }
}

#[async_trait]
impl ResponseHook for RuleScript {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_response(
        &self,
        ctx: &ExchangeContext,
        state: &SharedState,
        _url: &Url,
        request: &Request,
        response: Response,
    ) -> Result<Response, HookError> {
        self.apply_response(ctx, state, request, response)
    }
}

fn expand_key(key: &str, ctx: &ExchangeContext) -> String {
    key.replace(EXCHANGE_ID_PLACEHOLDER, &ctx.exchange_id.to_string())
}

// Order within one rule: removals before sets, then target, body,
// annotations and finally state.
fn apply_request_actions(
    actions: &RequestActions,
    ctx: &ExchangeContext,
    state: &SharedState,
    url: &Url,
    arrived: &Request,
    request: &mut Request,
) -> Result<(), HookError> {
    for name in &actions.remove_headers {
        request.headers.remove(name);
    }
    for (name, value) in actions.set_headers.iter() {
        request.headers.insert(name, value);
    }
    for name in &actions.remove_queries {
        request.queries.remove(name);
    }
    for (name, value) in actions.set_queries.iter() {
        request.queries.insert(name, value);
    }

    if let Some(redirect) = &actions.redirect {
        if let Some(scheme) = redirect.scheme {
            // Keep an implicit port implicit across a scheme change.
            if redirect.port.is_none() && request.port == request.scheme.default_port() {
                request.port = scheme.default_port();
            }
            request.scheme = scheme;
        }
        if let Some(host) = &redirect.host {
            request.host = host.clone();
        }
        if let Some(port) = redirect.port {
            request.port = port;
        }
        if let Some(path) = &redirect.path {
            request.path = path.clone();
        }
        debug!(exchange_id = ctx.exchange_id, from = %url, to = %request.host, "redirecting request");
    }

    if let Some(body) = &actions.replace_body {
        request.body = body.clone();
    }
    if let Some(Value::Object(patch)) = &actions.merge_json {
        let tag = request.body.tag();
        match request.body.as_json_mut() {
            Some(Value::Object(target)) => {
                for (key, value) in patch {
                    target.insert(key.clone(), value.clone());
                }
            }
            Some(_) => {
                return Err(HookError::failed(
                    "merge_json needs a JSON object body",
                ))
            }
            None => return Err(BodyError::TagMismatch { tag, found: "an object" }.into()),
        }
    }

    if let Some(comment) = &actions.comment {
        request.comment = comment.clone();
    }
    if let Some(color) = &actions.color {
        request.color = color.clone();
    }

    if let Some(store) = &actions.store_state {
        let value = match store.from {
            StateSource::Url => url.as_str().to_string(),
            StateSource::Host => arrived.host.clone(),
            StateSource::Path => arrived.path.clone(),
            StateSource::Method => arrived.method.clone(),
        };
        state.set(expand_key(&store.key, ctx), value);
    }
    Ok(())
}

fn apply_response_actions(
    actions: &ResponseActions,
    shift: Option<&DateShift>,
    ctx: &ExchangeContext,
    state: &SharedState,
    response: &mut Response,
) {
    if let Some(status) = actions.status {
        response.status_code = status;
    }
    for name in &actions.remove_headers {
        response.headers.remove(name);
    }
    for (name, value) in actions.set_headers.iter() {
        response.headers.insert(name, value);
    }
    if let Some(comment) = &actions.comment {
        response.comment = comment.clone();
    }
    if let Some(color) = &actions.color {
        response.color = color.clone();
    }

    if let Some(copy) = &actions.header_from_state {
        let key = expand_key(&copy.key, ctx);
        match state.get(&key) {
            Some(Value::String(text)) => {
                response.headers.insert(&copy.header, text);
            }
            Some(other) => {
                response.headers.insert(&copy.header, other.to_string());
            }
            None => debug!(key, "no shared state for header"),
        }
    }

    if let (Some(dates), Some(shift)) = (&actions.shift_dates, shift) {
        let count = shift_array_dates(&mut response.body, &dates.array_field, &dates.date_field, shift);
        debug!(exchange_id = ctx.exchange_id, count, "shifted response dates");
    }
}

fn compile_rule(rule: ScriptRule) -> Result<CompiledRule> {
    let matcher = CompiledMatch::compile(&rule.when)?;

    if let Some(request) = &rule.request {
        check_header_names(request.set_headers.names().chain(request.remove_headers.iter().map(String::as_str)))?;
        if let Some(redirect) = &request.redirect {
            if redirect.port == Some(0) {
                bail!("redirect port must not be 0");
            }
            if redirect.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
                bail!("redirect host must not be empty");
            }
            if redirect.path.as_deref().is_some_and(|p| !p.starts_with('/')) {
                bail!("redirect path must start with '/'");
            }
        }
        if let Some(patch) = &request.merge_json {
            if !patch.is_object() {
                bail!("merge_json must be a mapping");
            }
        }
        if let Some(body) = &request.replace_body {
            body.to_bytes().context("replace_body does not fit its type")?;
        }
    }

    let mut shift = None;
    if let Some(response) = &rule.response {
        check_header_names(response.set_headers.names().chain(response.remove_headers.iter().map(String::as_str)))?;
        if let Some(status) = response.status {
            if !(100..=599).contains(&status) {
                bail!("status {status} is outside 100..=599");
            }
        }
        if let Some(copy) = &response.header_from_state {
            check_header_names(std::iter::once(copy.header.as_str()))?;
        }
        if let Some(dates) = &response.shift_dates {
            let zone = DateShift::parse_offset(&dates.offset)?;
            shift = Some(DateShift::new(dates.years, zone));
        }
    }

    Ok(CompiledRule {
        rule,
        matcher,
        shift,
    })
}

fn check_header_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    for name in names {
        if !is_token(name) {
            bail!("'{name}' is not a valid header name");
        }
    }
    Ok(())
}
