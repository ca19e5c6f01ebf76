//! # exchange-model
//!
//! The data a proxy scripting hook operates on: one intercepted
//! [`Request`], the [`Response`] it produced, the read-only
//! [`ExchangeContext`] describing the exchange, and the tagged [`Body`]
//! union shared by both.
//!
//! The host proxy converts wire bytes into this model with [`codec::decode`]
//! before invoking a hook, and back with [`codec::encode`] afterwards. Values
//! returned by a hook are checked with the [`contract`] validators before the
//! host forwards anything.
//!
//! ## Quick start
//!
//! ```rust
//! use exchange_model::{codec, Body, Request, Scheme};
//!
//! let mut request = Request::new(Scheme::Https, "api.example.com", "/users");
//! request.headers.insert("X-New-Header", "My-Value");
//! request.queries.insert("name", "Proxyman");
//! request.body = codec::decode(Some("application/json"), br#"{"id":1}"#);
//!
//! assert!(matches!(request.body, Body::Json(_)));
//! assert_eq!(
//!     request.url().unwrap().as_str(),
//!     "https://api.example.com/users?name=Proxyman"
//! );
//! ```

mod body;
pub mod codec;
pub mod contract;
mod exchange;
mod fields;

pub use body::{Body, BodyError, BodyTag, FormBody};
pub use contract::ContractViolation;
pub use exchange::{ExchangeContext, Request, Response, Scheme, UrlError};
pub use fields::{CaseInsensitive, CaseSensitive, Fields, Headers, KeyPolicy, Queries};
