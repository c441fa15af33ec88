//! `assetflow.toml` loading.
//!
//! ```toml
//! [store]
//! path = "assets.json"
//!
//! [capabilities]
//! authorize = ["AssetDirector", "Admin"]
//!
//! [qr]
//! default_size = "industrial"
//!
//! [verification]
//! review_threshold_percent = 25
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use assetflow_engine::{Action, QrSize, RoleGate, VerificationPolicy};

/// Looked up in the working directory when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "assetflow.toml";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid [capabilities] entry: {0}")]
    Capability(String),

    #[error("invalid [qr] default_size: {0}")]
    QrSize(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StoreSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct QrSection {
    pub default_size: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct VerificationSection {
    /// `0` turns the review marker off.
    pub review_threshold_percent: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default)]
    pub store: StoreSection,
    /// Action name → roles; replaces the default roles of that action.
    #[serde(default)]
    pub capabilities: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub qr: QrSection,
    #[serde(default)]
    pub verification: VerificationSection,
}

impl Config {
    /// Load `path`, or `assetflow.toml` if present. A missing default file
    /// yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Config::parse(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn gate(&self) -> Result<RoleGate, ConfigError> {
        let overrides = self
            .capabilities
            .iter()
            .map(|(name, roles)| {
                name.parse::<Action>()
                    .map(|action| (action, roles.clone()))
                    .map_err(|_| ConfigError::Capability(format!("unknown action '{name}'")))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(RoleGate::default().with_overrides(&overrides))
    }

    pub fn qr_size(&self) -> Result<QrSize, ConfigError> {
        match &self.qr.default_size {
            Some(name) => name
                .parse()
                .map_err(|_| ConfigError::QrSize(format!("unknown size '{name}'"))),
            None => Ok(QrSize::default()),
        }
    }

    pub fn policy(&self) -> VerificationPolicy {
        match self.verification.review_threshold_percent {
            Some(0) => VerificationPolicy {
                review_threshold_percent: None,
            },
            Some(p) => VerificationPolicy {
                review_threshold_percent: Some(p),
            },
            None => VerificationPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.store.path.is_none());
        assert_eq!(config.qr_size().unwrap(), QrSize::Standard);
        assert_eq!(config.policy(), VerificationPolicy::default());
        assert_eq!(config.gate().unwrap(), RoleGate::default());
    }

    #[test]
    fn full_config_is_applied() {
        let config = Config::parse(
            r#"
            [store]
            path = "data/assets.json"

            [capabilities]
            authorize = ["Auditor"]

            [qr]
            default_size = "large"

            [verification]
            review_threshold_percent = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.store.path, Some(PathBuf::from("data/assets.json")));
        let gate = config.gate().unwrap();
        assert!(gate.allows(Action::Authorize, "Auditor"));
        assert!(!gate.allows(Action::Authorize, "AssetDirector"));
        assert_eq!(config.qr_size().unwrap(), QrSize::Industrial);
        assert_eq!(config.policy().review_threshold_percent, None);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let config = Config::parse("[capabilities]\ndeploy = [\"Admin\"]\n").unwrap();
        assert!(matches!(config.gate(), Err(ConfigError::Capability(_))));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        assert!(Config::parse("[store]\nurl = \"x\"\n").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/assetflow.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
