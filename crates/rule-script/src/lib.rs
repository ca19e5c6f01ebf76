//! # rule-script
//!
//! Declarative proxy scripts. A YAML file lists rules; each rule says which
//! exchanges it applies to and how to edit the request before it is sent
//! and the response before it is delivered. A compiled [`RuleScript`] is
//! both a request hook and a response hook for `hook-runtime`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hook_runtime::{HookRunner, RunnerConfig, SharedState};
//! use rule_script::{loader, RuleScript};
//!
//! let config = loader::load_script("script.yaml").unwrap();
//! let script = Arc::new(RuleScript::new(config).unwrap());
//! let runner = HookRunner::new(SharedState::new(), RunnerConfig::default())
//!     .with_request_hook(script.clone())
//!     .with_response_hook(script);
//! # let _ = runner;
//! ```
//!
//! ## Script format
//!
//! ```yaml
//! version: "1.0"
//! rules:
//!   - name: add-header
//!     when: { host: "*.example.com", path: "/api/**" }
//!     request:
//!       set_headers: { X-New-Header: My-Value }
//!     response:
//!       shift_dates: { array_field: data, date_field: createdDate, years: 2 }
//! ```

pub mod loader;
pub mod matcher;
mod schema;
mod script;

pub use schema::{
    HeaderFromState, Redirect, RequestActions, ResponseActions, RuleMatch, ScriptConfig,
    ScriptRule, ShiftDates, StateSource, StoreState,
};
pub use script::RuleScript;
