//! Append-only structured JSON-lines journal of hook activity.
//!
//! Every hook invocation the runtime performs (completed, failed, timed
//! out, fallen back) is recorded as one newline-terminated JSON object, so
//! an operator can reconstruct why an exchange was aborted or why a client
//! received the original response instead of the scripted one.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, handle) = AuditSink::start("logs/audit.jsonl").await?;
//!
//! sink.log(AuditEntry::new(
//!     AuditEventType::SessionStarted,
//!     AuditSource::new("proxy-scripts"),
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//!
//! drop(sink);
//! handle.await?;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

pub use entry::{AuditEntry, AuditEventType, AuditSource};
pub use sink::AuditSink;
pub use writer::{AuditWriteError, AuditWriter};
