//! Checks applied to every value a hook hands back before the host uses it.

use serde_json::Value;
use url::Host;

use crate::body::Body;
use crate::exchange::{Request, Response};
use crate::fields::Headers;

/// A hook returned something the host cannot forward.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("hook result has the wrong shape: {0}")]
    Shape(String),

    #[error("host '{0}' is not a bare host name or IP address")]
    InvalidHost(String),

    #[error("port 0 is not a valid destination")]
    InvalidPort,

    #[error("path '{0}' does not start with '/'")]
    InvalidPath(String),

    #[error("'{0}' is not a valid header name")]
    InvalidHeaderName(String),

    #[error("value of header '{0}' contains CR, LF or NUL")]
    InvalidHeaderValue(String),

    #[error("status code {0} is outside 100-599")]
    InvalidStatus(u16),

    #[error("base64 body does not decode: {0}")]
    InvalidBody(String),
}

/// Validate a request a hook wants forwarded upstream.
pub fn validate_request(request: &Request) -> Result<(), ContractViolation> {
    if request.host.is_empty()
        || request
            .host
            .chars()
            .any(|c| c.is_whitespace() || c == '/')
    {
        return Err(ContractViolation::InvalidHost(request.host.clone()));
    }
    if request.port == 0 {
        return Err(ContractViolation::InvalidPort);
    }
    if !request.path.starts_with('/') {
        return Err(ContractViolation::InvalidPath(request.path.clone()));
    }
    validate_destination(request)?;
    if !is_token(&request.method) {
        return Err(ContractViolation::Shape(format!(
            "method '{}' is not an HTTP token",
            request.method
        )));
    }
    validate_headers(&request.headers)?;
    validate_body(&request.body)
}

/// Validate a response a hook wants delivered to the client.
pub fn validate_response(response: &Response) -> Result<(), ContractViolation> {
    if !(100..=599).contains(&response.status_code) {
        return Err(ContractViolation::InvalidStatus(response.status_code));
    }
    validate_headers(&response.headers)?;
    validate_body(&response.body)
}

/// Convert a loosely-typed hook result into a validated [`Request`].
pub fn request_from_value(value: Value) -> Result<Request, ContractViolation> {
    let request: Request =
        serde_json::from_value(value).map_err(|e| ContractViolation::Shape(e.to_string()))?;
    validate_request(&request)?;
    Ok(request)
}

/// Convert a loosely-typed hook result into a validated [`Response`].
pub fn response_from_value(value: Value) -> Result<Response, ContractViolation> {
    let response: Response =
        serde_json::from_value(value).map_err(|e| ContractViolation::Shape(e.to_string()))?;
    validate_response(&response)?;
    Ok(response)
}

/// Whether `name` is an RFC 9110 token, the grammar of header names and methods.
pub fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

/// The resolved URL must point at exactly `request.host`. A port or user
/// info smuggled into the host would otherwise fail to resolve or send the
/// exchange somewhere other than the field says.
fn validate_destination(request: &Request) -> Result<(), ContractViolation> {
    let invalid = || ContractViolation::InvalidHost(request.host.clone());

    let expected = if request.host.contains(':') {
        Host::parse(&format!("[{}]", request.host))
    } else {
        Host::parse(&request.host)
    }
    .map_err(|_| invalid())?;

    let url = request.url().map_err(|_| invalid())?;
    match url.host() {
        Some(resolved) if resolved.to_owned() == expected => Ok(()),
        _ => Err(invalid()),
    }
}

fn validate_headers(headers: &Headers) -> Result<(), ContractViolation> {
    for (name, value) in headers.iter() {
        if !is_token(name) {
            return Err(ContractViolation::InvalidHeaderName(name.to_string()));
        }
        if value.contains(['\r', '\n', '\0']) {
            return Err(ContractViolation::InvalidHeaderValue(name.to_string()));
        }
    }
    Ok(())
}

fn validate_body(body: &Body) -> Result<(), ContractViolation> {
    if let Body::Base64(_) = body {
        body.to_bytes()
            .map_err(|e| ContractViolation::InvalidBody(e.to_string()))?;
    }
    Ok(())
}
