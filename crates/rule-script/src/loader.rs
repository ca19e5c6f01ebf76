use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::schema::{ScriptConfig, ScriptRule};

const SUPPORTED_VERSION: &str = "1.0";

/// Read a rule script from disk; see [`load_script_from_str`].
pub fn load_script(path: impl AsRef<Path>) -> Result<ScriptConfig> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script file: {}", path.display()))?;
    load_script_from_str(&yaml).with_context(|| format!("in script file {}", path.display()))
}

/// Parse a rule script and check it as a whole.
///
/// Per-rule checks that need compilation (globs, header tokens, offsets)
/// happen in [`RuleScript::new`](crate::RuleScript::new). Every problem
/// found here is reported at once, one per line.
pub fn load_script_from_str(yaml: &str) -> Result<ScriptConfig> {
    let config: ScriptConfig = serde_yml::from_str(yaml).context("script is not valid YAML")?;

    let problems = problems(&config);
    if !problems.is_empty() {
        bail!("script '{}' is invalid:\n  {}", config.name, problems.join("\n  "));
    }

    warn_on_unset_state(&config);
    Ok(config)
}

fn problems(config: &ScriptConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.version != SUPPORTED_VERSION {
        problems.push(format!(
            "version '{}' is not supported (expected '{SUPPORTED_VERSION}')",
            config.version
        ));
    }
    if config.name.trim().is_empty() {
        problems.push("script name is blank".to_string());
    }

    // Rule names identify hooks in logs, so they must differ ignoring case.
    let mut first_seen: HashMap<String, &str> = HashMap::new();
    for (index, rule) in config.rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            problems.push(format!("rule #{} has a blank name", index + 1));
            continue;
        }
        if let Some(earlier) = first_seen.insert(rule.name.to_lowercase(), &rule.name) {
            problems.push(format!(
                "rule '{}' has the same name as rule '{earlier}'",
                rule.name
            ));
        }
        if rule.request.is_none() && rule.response.is_none() {
            problems.push(format!(
                "rule '{}' has neither request nor response actions",
                rule.name
            ));
        }
    }

    problems
}

/// A `header_from_state` key that no rule ever stores is almost always a
/// typo, but state may also be seeded by other hooks, so only warn.
fn warn_on_unset_state(config: &ScriptConfig) {
    let stored: HashSet<&str> = config
        .rules
        .iter()
        .filter_map(|rule| rule.request.as_ref()?.store_state.as_ref())
        .map(|store| store.key.as_str())
        .collect();

    for rule in &config.rules {
        if let Some(key) = read_key(rule) {
            if !stored.contains(key) {
                warn!(rule = %rule.name, key, "header_from_state reads a key no rule stores");
            }
        }
    }
}

fn read_key(rule: &ScriptRule) -> Option<&str> {
    rule.response
        .as_ref()?
        .header_from_state
        .as_ref()
        .map(|h| h.key.as_str())
}
