use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "proxy-scripts",
    version,
    about = "Replay captured HTTP exchanges through request/response scripting hooks"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Path to the rule script (overrides config file setting)
    #[arg(short, long)]
    pub script: Option<PathBuf>,

    /// Per-hook timeout in milliseconds (overrides config file setting)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Log level or filter directive (overrides config file setting)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Exchange fixtures: JSON files holding a `request` and optional `response`
    #[arg(required = true)]
    pub exchanges: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides_and_fixtures() {
        let cli = Cli::try_parse_from([
            "proxy-scripts",
            "--script",
            "rules.yaml",
            "--timeout-ms",
            "250",
            "a.json",
            "b.json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.script, Some(PathBuf::from("rules.yaml")));
        assert_eq!(cli.timeout_ms, Some(250));
        assert_eq!(cli.exchanges.len(), 2);
    }

    #[test]
    fn requires_at_least_one_fixture() {
        assert!(Cli::try_parse_from(["proxy-scripts"]).is_err());
    }
}
