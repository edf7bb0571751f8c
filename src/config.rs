//! Service configuration.
//!
//! Everything has a default. A JSON document in `SCRATCHPAD_CONFIG` can
//! override any field, and a few plain environment variables (`PORT`,
//! `SCRATCHPAD_WORK_DIR`, `PISTON_URL`) override that.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::language::{Language, RunnerSpec, SpecOverride};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP service listens on.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Directory under which per-request workspaces are created.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Base URL of the hosted (Piston-compatible) execution API.
    #[serde(default = "default_hosted_url")]
    pub hosted_url: String,

    /// Local JavaScript evaluation settings.
    #[serde(default)]
    pub local: LocalConfig,

    /// Per-language overrides of the built-in runner specs.
    #[serde(default)]
    pub languages: HashMap<Language, SpecOverride>,
}

/// Settings for the local evaluation worker.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Program used as the disposable JavaScript worker.
    #[serde(default = "default_node_program")]
    pub node_program: String,

    /// Wall-clock limit for one evaluation.
    #[serde(default = "default_local_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            node_program: default_node_program(),
            timeout_ms: default_local_timeout_ms(),
        }
    }
}

impl LocalConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            work_root: default_work_root(),
            hosted_url: default_hosted_url(),
            local: LocalConfig::default(),
            languages: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from `SCRATCHPAD_CONFIG` plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("SCRATCHPAD_CONFIG") {
            Ok(json) => Self::from_json(&json).context("Failed to parse SCRATCHPAD_CONFIG")?,
            Err(_) => {
                debug!("SCRATCHPAD_CONFIG not set, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        for language in config.languages.keys() {
            if language.default_spec().is_none() {
                warn!(%language, "Ignoring runner override for a client-only language");
            }
        }
        Ok(config)
    }

    /// Apply `PORT`, `SCRATCHPAD_WORK_DIR` and `PISTON_URL` from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
            self.bind.set_port(port);
        }
        if let Some(dir) = lookup("SCRATCHPAD_WORK_DIR") {
            self.work_root = PathBuf::from(dir);
        }
        if let Some(url) = lookup("PISTON_URL") {
            self.hosted_url = url;
        }
        Ok(())
    }

    /// Apply the configured overrides for `language` to `spec`.
    pub fn resolve_spec(&self, language: Language, spec: RunnerSpec) -> RunnerSpec {
        match self.languages.get(&language) {
            Some(overrides) => spec.with_overrides(overrides),
            None => spec,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("scratchpad-runner")
}

fn default_hosted_url() -> String {
    "https://emkc.org/api/v2/piston".into()
}

fn default_node_program() -> String {
    "node".into()
}

const fn default_local_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.bind, SocketAddr::from(([0, 0, 0, 0], 3001)));
        assert!(config.work_root.ends_with("scratchpad-runner"));
        assert_eq!(config.hosted_url, "https://emkc.org/api/v2/piston");
        assert_eq!(config.local.node_program, "node");
        assert_eq!(config.local.timeout(), Duration::from_secs(5));
        assert!(config.languages.is_empty());
    }

    #[test]
    fn parse_language_overrides() {
        let json = r#"{
            "bind": "127.0.0.1:8080",
            "work_root": "/var/tmp/scratch",
            "languages": {
                "python": {
                    "run": ["/usr/local/bin/python3.12", "{source}"],
                    "run_timeout_ms": 2000
                },
                "cpp": {
                    "build_timeout_ms": 20000,
                    "max_output_bytes": 65536
                }
            }
        }"#;

        let config = Config::from_json(json).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.work_root, PathBuf::from("/var/tmp/scratch"));

        let python = config.resolve_spec(Language::Python, RunnerSpec::python());
        assert_eq!(python.run.0[0], "/usr/local/bin/python3.12");
        assert_eq!(python.run_timeout, Duration::from_millis(2000));

        let cpp = config.resolve_spec(Language::Cpp, RunnerSpec::cpp());
        assert_eq!(cpp.build_timeout, Duration::from_millis(20_000));
        assert_eq!(cpp.run_timeout, Duration::from_millis(5_000));
        assert_eq!(cpp.max_output, 65_536);

        // No override: built-in spec.
        let java = config.resolve_spec(Language::Java, RunnerSpec::java());
        assert_eq!(java.run.0[0], "java");
        assert_eq!(java.max_output, 1024 * 1024);
    }

    #[test]
    fn client_only_override_is_accepted_but_unused() {
        let json = r#"{"languages": {"javascript": {"run_timeout_ms": 1}}}"#;
        let config = Config::from_json(json).unwrap();
        assert!(config.languages.contains_key(&Language::JavaScript));
        assert!(Language::JavaScript.default_spec().is_none());
    }

    #[test]
    fn unknown_language_key_is_rejected() {
        let json = r#"{"languages": {"cobol": {}}}"#;
        assert!(Config::from_json(json).is_err());
    }

    #[test]
    fn env_overrides_win() {
        let mut config = Config::default();
        let vars = HashMap::from([
            ("PORT", "4000"),
            ("SCRATCHPAD_WORK_DIR", "/srv/scratch"),
            ("PISTON_URL", "http://localhost:2000/api/v2"),
        ]);
        config
            .apply_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.bind.port(), 4000);
        assert_eq!(config.work_root, PathBuf::from("/srv/scratch"));
        assert_eq!(config.hosted_url, "http://localhost:2000/api/v2");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == "PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));
    }
}
