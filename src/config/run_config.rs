//! Represents the configuration of one test run.
///
/// Deserialized from TOML with `utils::read_toml_from_file`.
///
/// # Fields
///
/// - `report_dir`: Root directory of the reports; defaults to `reports/<timestamp>`.
/// - `should_prepare`: Whether environments are fully prepared before the first script.
/// - `should_clean`: Whether environments are cleaned and destroyed by the run.
/// - `environment`: See [`EnvironmentConfig`].
/// - `preparator`: Artifacts installed into, and outputs collected from, every environment.
/// - `app`: Command starting one application instance per environment.
/// - `scripts`: Test scripts, run in the given order.
///
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use crate::config::environment_config::EnvironmentConfig;
use crate::utils;

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PreparatorConfig {
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    #[serde(default)]
    pub output_files: Vec<String>,
    /// Environment `i` gets property `port = base_port + i`
    pub base_port: Option<u16>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AppConfig {
    /// `sh -c` command line; `{id}`, `{hostname}`, `{name}` and `{<property>}` are expanded
    pub command: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ScriptConfig {
    pub name: String,
    /// Check run in every environment; the script fails if any run exits non-zero
    pub command: Option<String>,
    #[serde(default = "default_true")]
    pub start_apps: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RunConfig {
    pub report_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub should_prepare: bool,
    #[serde(default = "default_true")]
    pub should_clean: bool,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub preparator: PreparatorConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,
}

impl RunConfig {
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn Error + Send + Sync>> {
        utils::read_toml_from_file(path)
    }

    /// Keeps only the scripts named in `names`; an empty filter keeps everything.
    pub fn retain_scripts(&mut self, names: &[String]) {
        if !names.is_empty() {
            self.scripts.retain(|script| names.contains(&script.name));
        }
    }
}
