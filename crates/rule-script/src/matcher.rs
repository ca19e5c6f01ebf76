use anyhow::{Context, Result};
use exchange_model::{Request, Scheme};
use globset::{Glob, GlobMatcher};
use regex::{Regex, RegexBuilder};

use crate::schema::RuleMatch;

/// A pre-compiled [`RuleMatch`].
#[derive(Debug, Clone)]
pub struct CompiledMatch {
    host: Option<Regex>,
    path: Option<GlobMatcher>,
    scheme: Option<Scheme>,
    methods: Vec<String>,
}

impl CompiledMatch {
    pub fn compile(when: &RuleMatch) -> Result<Self> {
        let host = when
            .host
            .as_deref()
            .map(host_pattern)
            .transpose()?;
        let path = when
            .path
            .as_deref()
            .map(|pattern| {
                Glob::new(pattern)
                    .map(|glob| glob.compile_matcher())
                    .with_context(|| format!("invalid path glob '{pattern}'"))
            })
            .transpose()?;
        let methods = when
            .methods
            .iter()
            .map(|m| m.trim().to_ascii_uppercase())
            .collect();

        Ok(Self {
            host,
            path,
            scheme: when.scheme,
            methods,
        })
    }

    /// All present conditions must hold.
    pub fn matches(&self, request: &Request) -> bool {
        self.scheme.map_or(true, |scheme| scheme == request.scheme)
            && self
                .host
                .as_ref()
                .map_or(true, |re| re.is_match(&request.host))
            && self
                .path
                .as_ref()
                .map_or(true, |glob| glob.is_match(&request.path))
            && (self.methods.is_empty()
                || self
                    .methods
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(&request.method)))
    }
}

/// Compile a host pattern: `*` matches any run of characters, `|` separates
/// alternatives, and the whole host must match, ignoring case.
pub fn host_pattern(pattern: &str) -> Result<Regex> {
    let alternatives: Vec<String> = pattern
        .split('|')
        .map(|alt| {
            alt.trim()
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*")
        })
        .collect();
    let anchored = format!("^(?:{})$", alternatives.join("|"));
    RegexBuilder::new(&anchored)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid host pattern '{pattern}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scheme: Scheme, host: &str, path: &str, method: &str) -> Request {
        let mut request = Request::new(scheme, host, path);
        request.method = method.to_string();
        request
    }

    fn compile(yaml: &str) -> CompiledMatch {
        let when: RuleMatch = serde_yml::from_str(yaml).unwrap();
        CompiledMatch::compile(&when).unwrap()
    }

    // ---- host patterns ----

    #[test]
    fn host_exact_and_case_insensitive() {
        let re = host_pattern("api.example.com").unwrap();
        assert!(re.is_match("api.example.com"));
        assert!(re.is_match("API.Example.COM"));
        assert!(!re.is_match("xapi.example.com"));
        assert!(!re.is_match("api.example.com.evil"));
    }

    #[test]
    fn host_wildcard() {
        let re = host_pattern("*.example.com").unwrap();
        assert!(re.is_match("api.example.com"));
        assert!(re.is_match("a.b.example.com"));
        assert!(!re.is_match("example.com"));
    }

    #[test]
    fn host_alternatives() {
        let re = host_pattern("localhost | 127.0.0.1").unwrap();
        assert!(re.is_match("localhost"));
        assert!(re.is_match("127.0.0.1"));
        // Dots are literal.
        assert!(!re.is_match("127x0x0x1"));
    }

    // ---- whole conditions ----

    #[test]
    fn empty_condition_matches_everything() {
        let m = compile("{}");
        assert!(m.matches(&request(Scheme::Http, "anything", "/", "DELETE")));
    }

    #[test]
    fn all_conditions_must_hold() {
        let m = compile(
            r#"
host: "*.example.com"
path: "/api/**"
scheme: https
methods: [get, POST]
"#,
        );
        assert!(m.matches(&request(Scheme::Https, "api.example.com", "/api/users", "GET")));
        assert!(m.matches(&request(Scheme::Https, "api.example.com", "/api/a/b", "post")));
        assert!(!m.matches(&request(Scheme::Http, "api.example.com", "/api/users", "GET")));
        assert!(!m.matches(&request(Scheme::Https, "example.org", "/api/users", "GET")));
        assert!(!m.matches(&request(Scheme::Https, "api.example.com", "/users", "GET")));
        assert!(!m.matches(&request(Scheme::Https, "api.example.com", "/api/users", "PUT")));
    }

    #[test]
    fn invalid_path_glob_is_an_error() {
        let when = RuleMatch {
            path: Some("[invalid".to_string()),
            ..RuleMatch::default()
        };
        let err = CompiledMatch::compile(&when).unwrap_err();
        assert!(err.to_string().contains("invalid path glob"), "{err}");
    }
}
