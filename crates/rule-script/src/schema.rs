use exchange_model::{Body, Headers, Queries, Scheme};
use serde::{Deserialize, Serialize};

/// Top-level rule script loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Schema version; currently must be "1.0".
    pub version: String,
    /// Name the hooks report in logs and the audit journal.
    #[serde(default = "default_script_name")]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<ScriptRule>,
}

fn default_script_name() -> String {
    "rule-script".to_string()
}

/// One rule: a match condition plus the edits to make on a match.
///
/// Every matching rule applies, lowest `priority` first, so later rules see
/// the edits of earlier ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Absent fields match anything; an absent `when` matches every exchange.
    #[serde(default)]
    pub when: RuleMatch,
    #[serde(default)]
    pub request: Option<RequestActions>,
    #[serde(default)]
    pub response: Option<ResponseActions>,
}

fn default_priority() -> i32 {
    100
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleMatch {
    /// `*` wildcards, `|` alternatives, case-insensitive.
    #[serde(default)]
    pub host: Option<String>,
    /// Glob over the request path, e.g. `/api/**`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub scheme: Option<Scheme>,
    /// Case-insensitive; empty matches every method.
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestActions {
    #[serde(default)]
    pub set_headers: Headers,
    #[serde(default)]
    pub remove_headers: Vec<String>,
    #[serde(default)]
    pub set_queries: Queries,
    #[serde(default)]
    pub remove_queries: Vec<String>,
    #[serde(default)]
    pub redirect: Option<Redirect>,
    /// Object whose keys are written into a JSON object body.
    #[serde(default)]
    pub merge_json: Option<serde_json::Value>,
    /// Replacement body, e.g. `{type: plain-text, value: "hi"}`.
    #[serde(default)]
    pub replace_body: Option<Body>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub store_state: Option<StoreState>,
}

/// Fields of the forwarded request's target to overwrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Redirect {
    #[serde(default)]
    pub scheme: Option<Scheme>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Record part of the request in the shared state.
///
/// `{exchange_id}` in `key` is replaced by the current exchange id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreState {
    pub key: String,
    pub from: StateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Url,
    Host,
    Path,
    Method,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseActions {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub set_headers: Headers,
    #[serde(default)]
    pub remove_headers: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub header_from_state: Option<HeaderFromState>,
    #[serde(default)]
    pub shift_dates: Option<ShiftDates>,
}

/// Copy a shared-state value into a response header.
///
/// `{exchange_id}` in `key` is replaced as for [`StoreState`]. Nothing is
/// written when the key is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderFromState {
    pub header: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftDates {
    #[serde(default = "default_array_field")]
    pub array_field: String,
    #[serde(default = "default_date_field")]
    pub date_field: String,
    #[serde(default = "default_years")]
    pub years: i32,
    #[serde(default = "default_offset")]
    pub offset: String,
}

fn default_array_field() -> String {
    "data".to_string()
}
fn default_date_field() -> String {
    "createdDate".to_string()
}
fn default_years() -> i32 {
    2
}
fn default_offset() -> String {
    "+08:00".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_model::BodyTag;

    #[test]
    fn deserialize_minimal_config() {
        let yaml = r#"
version: "1.0"
"#;
        let config: ScriptConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.name, "rule-script");
        assert!(config.rules.is_empty());
    }

    #[test]
    fn deserialize_full_config() {
        let yaml = r#"
version: "1.0"
name: "demo"
rules:
  - name: "tag-api"
    description: "Mark API traffic"
    priority: 10
    when:
      host: "*.example.com"
      path: "/api/**"
      scheme: https
      methods: [GET, post]
    request:
      set_headers:
        X-New-Header: "My-Value"
      remove_headers: [Cookie]
      set_queries:
        debug: "1"
      redirect:
        scheme: http
        host: localhost
        port: 8080
      replace_body:
        type: plain-text
        value: "hello"
      comment: "api call"
      color: red
      store_state:
        key: "url:{exchange_id}"
        from: url
  - name: "shift"
    response:
      status: 201
      set_headers:
        X-Shifted: "yes"
      header_from_state:
        header: X-Original-Url
        key: "url:{exchange_id}"
      shift_dates: {}
"#;
        let config: ScriptConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.rules.len(), 2);

        let rule0 = &config.rules[0];
        assert_eq!(rule0.priority, 10);
        assert_eq!(rule0.when.scheme, Some(Scheme::Https));
        assert_eq!(rule0.when.methods, vec!["GET", "post"]);
        let request = rule0.request.as_ref().unwrap();
        assert_eq!(request.set_headers.get("x-new-header"), Some("My-Value"));
        assert_eq!(request.redirect.as_ref().unwrap().port, Some(8080));
        assert_eq!(
            request.replace_body.as_ref().map(Body::tag),
            Some(BodyTag::PlainText)
        );
        assert_eq!(
            request.store_state.as_ref().unwrap().from,
            StateSource::Url
        );

        let rule1 = &config.rules[1];
        assert_eq!(rule1.priority, 100);
        assert!(rule1.request.is_none());
        let shift = rule1
            .response
            .as_ref()
            .and_then(|r| r.shift_dates.as_ref())
            .unwrap();
        assert_eq!(shift.array_field, "data");
        assert_eq!(shift.date_field, "createdDate");
        assert_eq!(shift.years, 2);
        assert_eq!(shift.offset, "+08:00");
    }

    #[test]
    fn unknown_state_source_is_rejected() {
        let yaml = r#"
version: "1.0"
rules:
  - name: "bad"
    request:
      store_state:
        key: k
        from: cookie
"#;
        assert!(serde_yml::from_str::<ScriptConfig>(yaml).is_err());
    }
}
