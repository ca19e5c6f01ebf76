//! Offline replay of captured exchanges.
//!
//! A fixture is a JSON file holding the intercepted request and, optionally,
//! the response upstream sent back:
//!
//! ```json
//! {
//!   "request":  { "scheme": "https", "host": "api.example.com", "port": 443, "path": "/users" },
//!   "response": { "statusCode": 200, "body": { "type": "json", "value": { "data": [] } } }
//! }
//! ```
//!
//! The fixture response stands in for upstream, so replay exercises exactly
//! the hook path a live exchange takes.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use exchange_model::contract::{request_from_value, response_from_value};
use exchange_model::{ExchangeContext, Request, Response};
use hook_runtime::{Disposition, HookRunner};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct Fixture {
    request: Value,
    #[serde(default)]
    response: Option<Value>,
}

/// One line of replay output.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReplayReport {
    Completed {
        file: PathBuf,
        request: Request,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<Response>,
        #[serde(skip_serializing_if = "Option::is_none")]
        disposition: Option<Disposition>,
    },
    Failed {
        file: PathBuf,
        error: String,
    },
}

impl ReplayReport {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReplayReport::Failed { .. })
    }
}

async fn load_fixture(path: &Path) -> Result<(Request, Option<Response>)> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read fixture: {}", path.display()))?;
    let fixture: Fixture = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse fixture: {}", path.display()))?;

    let request = request_from_value(fixture.request).context("invalid fixture request")?;
    let response = fixture
        .response
        .map(response_from_value)
        .transpose()
        .context("invalid fixture response")?;
    Ok((request, response))
}

/// Replay one fixture through `runner`.
pub async fn replay_one(
    runner: &HookRunner,
    session_id: Uuid,
    exchange_id: u64,
    path: &Path,
) -> ReplayReport {
    let failed = |err: String| ReplayReport::Failed {
        file: path.to_path_buf(),
        error: err,
    };

    let (request, response) = match load_fixture(path).await {
        Ok(loaded) => loaded,
        Err(err) => return failed(format!("{err:#}")),
    };
    let mut ctx = ExchangeContext::new(session_id, exchange_id);

    let Some(response) = response else {
        return match runner.run_request(&ctx, request).await {
            Ok(request) => ReplayReport::Completed {
                file: path.to_path_buf(),
                request,
                response: None,
                disposition: None,
            },
            Err(err) => failed(err.to_string()),
        };
    };

    match runner
        .drive(&mut ctx, request, |_forwarded| async move {
            Ok::<_, Infallible>(response)
        })
        .await
    {
        Ok(done) => ReplayReport::Completed {
            file: path.to_path_buf(),
            request: done.request,
            response: Some(done.response.response),
            disposition: Some(done.response.disposition),
        },
        Err(err) => failed(err.to_string()),
    }
}

/// Replay every fixture concurrently, sharing the runner and its state.
///
/// Reports come back in the order of `paths`; exchange ids are assigned
/// from 1 in that order.
pub async fn replay_all(runner: &HookRunner, session_id: Uuid, paths: &[PathBuf]) -> Vec<ReplayReport> {
    let runs = paths
        .iter()
        .zip(1u64..)
        .map(|(path, exchange_id)| replay_one(runner, session_id, exchange_id, path));
    futures_util::future::join_all(runs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hook_runtime::hook_fn::{request_fn, response_fn};
    use hook_runtime::{HookError, RunnerConfig, SharedState};
    use serde_json::json;
    use std::sync::Arc;

    struct FixtureDir(PathBuf);

    impl FixtureDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("replay-{}", Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, value: &Value) -> PathBuf {
            let path = self.0.join(name);
            std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
            path
        }
    }

    impl Drop for FixtureDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn users_fixture() -> Value {
        json!({
            "request": {"scheme": "https", "host": "api.example.com", "port": 443, "path": "/users"},
            "response": {
                "statusCode": 200,
                "body": {"type": "json", "value": {"data": [{"createdDate": "2020-01-15T10:00:00Z"}]}}
            }
        })
    }

    #[tokio::test]
    async fn completed_exchange_reports_delivered_response() {
        let dir = FixtureDir::new();
        let path = dir.write("users.json", &users_fixture());
        let hook = response_fn("mark", |_, _, _, _, mut response| async move {
            response.headers.insert("X-Replayed", "1");
            Ok(response)
        });
        let runner = HookRunner::new(SharedState::new(), RunnerConfig::default())
            .with_response_hook(Arc::new(hook));

        let report = replay_one(&runner, Uuid::nil(), 1, &path).await;
        let line = serde_json::to_value(&report).unwrap();
        assert_eq!(line["response"]["headers"]["X-Replayed"], "1");
        assert_eq!(line["disposition"]["kind"], "transformed");
        assert_eq!(line["request"]["host"], "api.example.com");
        assert!(!report.is_failure());
    }

    #[tokio::test]
    async fn request_only_fixture_skips_response_side() {
        let dir = FixtureDir::new();
        let path = dir.write(
            "req.json",
            &json!({"request": {"scheme": "http", "host": "localhost", "port": 8080}}),
        );
        let runner = HookRunner::new(SharedState::new(), RunnerConfig::default());

        let line = serde_json::to_value(replay_one(&runner, Uuid::nil(), 1, &path).await).unwrap();
        assert_eq!(line["request"]["path"], "/");
        assert!(line.get("response").is_none());
        assert!(line.get("disposition").is_none());
    }

    #[tokio::test]
    async fn bad_fixtures_and_aborts_are_failures() {
        let dir = FixtureDir::new();
        let shape = dir.write("shape.json", &json!({"request": {"host": 5}}));
        let good = dir.write("good.json", &users_fixture());
        let missing = dir.0.join("missing.json");

        let hook = request_fn("deny-users", |_, _, _, request| async move {
            if request.path == "/users" {
                return Err(HookError::failed("users are off limits"));
            }
            Ok(request)
        });
        let runner = HookRunner::new(SharedState::new(), RunnerConfig::default())
            .with_request_hook(Arc::new(hook));

        let reports = replay_all(&runner, Uuid::nil(), &[shape, good, missing]).await;
        assert!(reports.iter().all(ReplayReport::is_failure));
        match &reports[0] {
            ReplayReport::Failed { error, .. } => assert!(error.contains("invalid fixture request"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
        match &reports[1] {
            ReplayReport::Failed { error, .. } => assert!(error.contains("users are off limits"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
        match &reports[2] {
            ReplayReport::Failed { error, .. } => assert!(error.contains("failed to read fixture"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn demo_script_against_demo_fixtures() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        let config = rule_script::loader::load_script(demos.join("script.yaml")).unwrap();
        let script = Arc::new(rule_script::RuleScript::new(config).unwrap());
        let runner = HookRunner::new(SharedState::new(), RunnerConfig::default())
            .with_request_hook(script.clone())
            .with_response_hook(script);

        let paths = [
            demos.join("exchanges/users.json"),
            demos.join("exchanges/login.json"),
        ];
        let reports = replay_all(&runner, Uuid::nil(), &paths).await;
        let users = serde_json::to_value(&reports[0]).unwrap();
        let login = serde_json::to_value(&reports[1]).unwrap();

        assert_eq!(users["request"]["headers"]["X-New-Header"], "My-Value");
        assert_eq!(users["request"]["queries"]["name"], "Proxyman");
        assert_eq!(
            users["response"]["headers"]["X-Original-Url"],
            "https://api.example.com/users"
        );
        let data = &users["response"]["body"]["value"]["data"];
        assert_eq!(data[0]["createdDate"], "2022-01-15T10:00:00+08:00");
        assert_eq!(data[1]["createdDate"], "2022-02-28T23:30:00+08:00");
        assert_eq!(users["response"]["color"], "yellow");

        assert_eq!(login["request"]["headers"]["X-New-Header"], "My-Value");
        assert!(login.get("response").is_none());
        assert_eq!(runner.state().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_replays_share_state() {
        let dir = FixtureDir::new();
        let paths: Vec<_> = (0..8)
            .map(|i| dir.write(&format!("{i}.json"), &users_fixture()))
            .collect();
        let hook = request_fn("count", |_, state, _, request| async move {
            state.update("seen", |v| Some(json!(v.and_then(Value::as_i64).unwrap_or(0) + 1)));
            Ok(request)
        });
        let runner = HookRunner::new(SharedState::new(), RunnerConfig::default())
            .with_request_hook(Arc::new(hook));

        let reports = replay_all(&runner, Uuid::nil(), &paths).await;
        assert_eq!(reports.len(), 8);
        assert!(reports.iter().all(|r| !r.is_failure()));
        assert_eq!(runner.state().get("seen"), Some(json!(8)));
    }
}
