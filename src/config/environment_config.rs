//! Represents the configuration of the environment batch.
///
/// This struct selects the kind of environments a run uses and carries the parameters of
/// either kind. Local fields are ignored for SSH environments and vice versa.
///
/// # Fields
///
/// - `environment_type`: `"local"`/`"locally"` or `"ssh"`/`"remote"`.
/// - `count`: Number of local environments, must be positive.
/// - `dir_prefix`: Name prefix of the local temporary directories.
/// - `hosts`: SSH hosts, one environment per host.
/// - `port`: SSH port shared by all hosts.
/// - `username`: SSH user name.
/// - `private_key_path`: Path of the private key used for public-key authentication.
/// - `remote_dir`: Home directory of every SSH environment, relative to the login directory.
/// - `known_hosts`: Optional known_hosts file used to verify host keys.
/// - `connect_timeout`: Optional timeout for connecting and authenticating, e.g. `"10s"`.
///
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_environment_type() -> String {
    "local".to_string()
}

fn default_dir_prefix() -> String {
    "distestor".to_string()
}

fn default_port() -> u16 {
    22
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EnvironmentConfig {
    #[serde(default = "default_environment_type")]
    pub environment_type: String,
    pub count: Option<usize>,
    #[serde(default = "default_dir_prefix")]
    pub dir_prefix: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub remote_dir: String,
    pub known_hosts: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment_type: default_environment_type(),
            count: Some(1),
            dir_prefix: default_dir_prefix(),
            hosts: Vec::new(),
            port: default_port(),
            username: None,
            private_key_path: None,
            remote_dir: String::new(),
            known_hosts: None,
            connect_timeout: None,
        }
    }
}

/// Expands a leading `~/` to the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
