//! Execution contract for proxy scripting hooks.
//!
//! A host proxy intercepts an exchange and runs two user-supplied hooks
//! around it:
//!
//! ```text
//! client --request--> [RequestHook] --request'--> upstream
//! client <-response'- [ResponseHook] <-response-- upstream
//! ```
//!
//! [`HookRunner`] owns the hooks and enforces the rules a host relies on:
//! every invocation runs under a timeout, a failing request hook aborts the
//! exchange before anything is sent, and a failing response hook never
//! delivers a half-edited response. Hooks share data across exchanges
//! through the [`SharedState`] handle the runner passes them.

pub mod date_shift;
mod hook;
pub mod hook_fn;
mod runner;
mod state;

pub use date_shift::{DateShift, DateShiftError, DateShiftHook};
pub use hook::{HookError, RequestHook, ResponseHook};
pub use runner::{
    CompletedExchange, Disposition, ExchangeError, HookRunner, ResponseFailurePolicy,
    ResponseOutcome, RunnerConfig,
};
pub use state::SharedState;
