//! Installation, refresh and removal of test artifacts on environments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::run_config::PreparatorConfig;
use crate::error::PreparationError;
use crate::test_environment::Environment;

pub const PORT_PROPERTY: &str = "port";
pub const SERVER_HOSTNAME_PROPERTY: &str = "server-hostname";
pub const SERVER_PORT_PROPERTY: &str = "server-port";

/// Prepares environments for tests and cleans them afterwards.
///
/// `restore` does a subset of `prepare`; `clean_output` removes a subset of what
/// `clean_all` removes. Cleaning and collection are best-effort and only log failures.
pub trait EnvironmentPreparator<E: ?Sized> {
    /// Fully installs artifacts. On failure everything touched by this call is cleaned
    /// before the error is returned.
    fn prepare(&self, envs: &[Arc<E>]) -> Result<(), PreparationError>;

    /// Refreshes per-run configuration of already prepared environments.
    fn restore(&self, envs: &[Arc<E>]) -> Result<(), PreparationError>;

    fn clean_all(&self, envs: &[Arc<E>]);

    fn clean_output(&self, envs: &[Arc<E>]);

    /// Copies output files of every environment into `dest_path/<env id>`.
    fn collect_output(&self, envs: &[Arc<E>], dest_path: &Path);
}

/// Copies artifacts into each environment's home and collects named output files.
#[derive(Debug, Clone, Default)]
pub struct FilePreparator {
    artifacts: Vec<PathBuf>,
    output_files: Vec<String>,
    base_port: Option<u16>,
    properties: BTreeMap<String, String>,
}

impl FilePreparator {
    pub fn new(artifacts: Vec<PathBuf>, output_files: Vec<String>) -> Self {
        Self {
            artifacts,
            output_files,
            ..Self::default()
        }
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = Some(base_port);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn from_config(config: &PreparatorConfig) -> Self {
        Self {
            artifacts: config.artifacts.clone(),
            output_files: config.output_files.clone(),
            base_port: config.base_port,
            properties: config.properties.clone(),
        }
    }

    /// Names the artifacts have once copied into an environment.
    fn installed_names(&self) -> impl Iterator<Item = String> + '_ {
        self.artifacts
            .iter()
            .filter_map(|artifact| artifact.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }

    fn apply_properties<E: Environment + ?Sized>(
        &self,
        env: &E,
        server_hostname: &str,
    ) -> Result<(), PreparationError> {
        let properties = env.properties();
        for (key, value) in &self.properties {
            properties.set(key.clone(), value.clone());
        }
        if let Some(base_port) = self.base_port {
            let port = u16::try_from(env.id())
                .ok()
                .and_then(|skew| base_port.checked_add(skew))
                .ok_or_else(|| {
                    PreparationError::Configuration(format!(
                        "port {base_port} + {} does not fit in 16 bits",
                        env.id()
                    ))
                })?;
            properties.set(PORT_PROPERTY, port);
            properties.set(SERVER_PORT_PROPERTY, base_port);
            properties.set(SERVER_HOSTNAME_PROPERTY, server_hostname.to_string());
        }
        Ok(())
    }

    fn install<E: Environment + ?Sized>(&self, env: &E) -> Result<(), PreparationError> {
        for artifact in &self.artifacts {
            debug!("Copying {} to environment {}", artifact.display(), env.id());
            env.copy_files_from_local_disk(artifact, ".")
                .map_err(|source| PreparationError::Environment {
                    env_id: env.id(),
                    source,
                })?;
        }
        Ok(())
    }

    fn remove_all<E: Environment + ?Sized>(&self, envs: &[Arc<E>], names: &[String]) {
        for env in envs {
            for name in names {
                if let Err(e) = env.remove_file(name) {
                    warn!("Could not remove {name} from environment {}: {e}", env.id());
                }
            }
        }
    }
}

fn server_hostname<E: Environment + ?Sized>(envs: &[Arc<E>]) -> String {
    envs.first().map(|env| env.hostname()).unwrap_or_default()
}

impl<E: Environment + ?Sized> EnvironmentPreparator<E> for FilePreparator {
    fn prepare(&self, envs: &[Arc<E>]) -> Result<(), PreparationError> {
        info!("prepare()");
        let server = server_hostname(envs);
        for (touched, env) in envs.iter().enumerate() {
            let prepared = self
                .apply_properties(env.as_ref(), &server)
                .and_then(|()| self.install(env.as_ref()));
            if let Err(e) = prepared {
                warn!("Could not prepare environment {}: {e}", env.id());
                self.clean_all(&envs[..=touched]);
                return Err(e);
            }
        }
        Ok(())
    }

    fn restore(&self, envs: &[Arc<E>]) -> Result<(), PreparationError> {
        info!("restore()");
        let server = server_hostname(envs);
        envs.iter()
            .try_for_each(|env| self.apply_properties(env.as_ref(), &server))
    }

    fn clean_all(&self, envs: &[Arc<E>]) {
        info!("clean_all()");
        let names: Vec<String> = self
            .installed_names()
            .chain(self.output_files.iter().cloned())
            .collect();
        self.remove_all(envs, &names);
    }

    fn clean_output(&self, envs: &[Arc<E>]) {
        info!("clean_output()");
        self.remove_all(envs, &self.output_files);
    }

    fn collect_output(&self, envs: &[Arc<E>], dest_path: &Path) {
        info!("collect_output({})", dest_path.display());
        for env in envs {
            let env_dest = dest_path.join(env.id().to_string());
            for file in &self.output_files {
                if let Err(e) = env.copy_files_to_local_disk(file, &env_dest) {
                    warn!("Could not collect {file} from environment {}: {e}", env.id());
                }
            }
        }
    }
}
