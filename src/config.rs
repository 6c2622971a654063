//! Typed run configuration consumed by the transaction layer.
//!
//! Pipeline run configurations are large nested YAML documents; the
//! transaction layer only cares about one value, the preferred location for
//! transaction temp directories. That slice of the document is modeled
//! explicitly here with every level optional, so a missing key at any depth
//! reads as "no override" rather than an error. The value may appear at the
//! top level (`resources.tmp.dir`) or nested under a `config` scope
//! (`config.resources.tmp.dir`); the scoped value wins when both are set.

use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// `tmp:` block under `resources:`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmpSettings {
    /// Preferred base location for transaction temp directories.
    ///
    /// May contain environment-variable references and may be relative to
    /// the working directory; resolution happens at transaction time.
    #[serde(default)]
    pub dir: Option<String>,
}

/// `resources:` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub tmp: TmpSettings,
}

/// Sub-document found under a `config:` scope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopedConfig {
    #[serde(default)]
    pub resources: Resources,
}

/// Run configuration handed to transactions by the orchestration layer.
///
/// Unknown keys elsewhere in the document are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Per-run scope; its `resources` take precedence over the top level.
    #[serde(default)]
    pub config: Option<ScopedConfig>,

    #[serde(default)]
    pub resources: Resources,
}

impl RunConfig {
    /// Resolves the configured temp-directory override, if any.
    pub fn tmp_dir(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|scoped| scoped.resources.tmp.dir.as_deref())
            .or(self.resources.tmp.dir.as_deref())
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Loads a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}
