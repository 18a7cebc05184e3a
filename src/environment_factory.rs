//! Creation and destruction of environment batches.
//!
//! A factory assigns ids `0..N` to the environments it creates and is the only component that
//! destroys them.

use std::fs;
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{debug, error, info};

use crate::config::environment_config::{EnvironmentConfig, expand_tilde};
use crate::connection::ssh::{DefaultSshConnector, SshConnector, SshTarget};
use crate::error::FactoryError;
use crate::test_environment::{Environment, LocalEnvironment, SshEnvironment};

/// Property under which local environments record their directory
pub const ROOT_DIR_PROPERTY: &str = "root-dir";

/// Creates a batch of environments and cleans up everything the batch created.
pub trait EnvironmentFactory<E: ?Sized> {
    fn create(&self) -> Result<Vec<Arc<E>>, FactoryError>;

    /// Destroys environments returned by [`create`](Self::create). Failures are logged.
    fn destroy(&self, envs: &[Arc<E>]);
}

/// Environments in fresh directories under the system temp root.
#[derive(Debug, Clone)]
pub struct LocalEnvironmentFactory {
    count: usize,
    dir_prefix: String,
}

impl LocalEnvironmentFactory {
    pub fn new(count: usize, dir_prefix: impl Into<String>) -> Result<Self, FactoryError> {
        if count == 0 {
            return Err(FactoryError::InvalidConfig(
                "number of environments must be positive".to_string(),
            ));
        }
        Ok(Self {
            count,
            dir_prefix: dir_prefix.into(),
        })
    }

    fn remove_dirs(dirs: &[PathBuf]) {
        for dir in dirs {
            if let Err(e) = fs::remove_dir_all(dir) {
                error!("Could not remove {}: {e}", dir.display());
            }
        }
    }
}

impl EnvironmentFactory<dyn Environment> for LocalEnvironmentFactory {
    fn create(&self) -> Result<Vec<Arc<dyn Environment>>, FactoryError> {
        info!("Creating {} local environments", self.count);
        let mut dirs = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            match tempfile::Builder::new().prefix(&self.dir_prefix).tempdir() {
                Ok(dir) => dirs.push(dir.keep()),
                Err(e) => {
                    Self::remove_dirs(&dirs);
                    return Err(e.into());
                }
            }
        }

        Ok(dirs
            .into_iter()
            .enumerate()
            .map(|(id, dir)| {
                debug!("Local environment {id} lives in {}", dir.display());
                let env = LocalEnvironment::new(id, &dir);
                env.properties().set(ROOT_DIR_PROPERTY, dir);
                Arc::new(env) as Arc<dyn Environment>
            })
            .collect())
    }

    fn destroy(&self, envs: &[Arc<dyn Environment>]) {
        info!("Destroying {} local environments", envs.len());
        for env in envs {
            match env.properties().get::<PathBuf>(ROOT_DIR_PROPERTY) {
                Ok(dir) => Self::remove_dirs(&[dir]),
                Err(e) => error!("Could not destroy environment {}: {e}", env.id()),
            }
        }
    }
}

/// One environment per SSH host.
pub struct SshEnvironmentFactory {
    hosts: Vec<String>,
    /// Connection parameters shared by every host; `host` is replaced per environment
    template: SshTarget,
    remote_dir: String,
    connector: Arc<dyn SshConnector>,
}

impl SshEnvironmentFactory {
    pub fn new(
        hosts: Vec<String>,
        template: SshTarget,
        remote_dir: impl Into<String>,
        connector: Arc<dyn SshConnector>,
    ) -> Self {
        Self {
            hosts,
            template,
            remote_dir: remote_dir.into(),
            connector,
        }
    }
}

impl EnvironmentFactory<dyn Environment> for SshEnvironmentFactory {
    fn create(&self) -> Result<Vec<Arc<dyn Environment>>, FactoryError> {
        info!("Creating {} SSH environments", self.hosts.len());
        if self.hosts.is_empty() {
            return Err(FactoryError::InvalidConfig(
                "hosts field is missing or empty".to_string(),
            ));
        }

        let mut envs: Vec<Arc<dyn Environment>> = Vec::with_capacity(self.hosts.len());
        for (id, host) in self.hosts.iter().enumerate() {
            (host.as_str(), self.template.port)
                .to_socket_addrs()
                .map_err(|source| FactoryError::UnresolvableHost {
                    host: host.clone(),
                    source,
                })?;
            debug!("SSH environment {id} is {host}");
            let target = SshTarget {
                host: host.clone(),
                ..self.template.clone()
            };
            envs.push(Arc::new(SshEnvironment::new(
                id,
                target,
                self.remote_dir.clone(),
                Arc::clone(&self.connector),
            )));
        }
        Ok(envs)
    }

    fn destroy(&self, envs: &[Arc<dyn Environment>]) {
        info!("Leaving {} SSH environments in place", envs.len());
    }
}

/// Builds the factory selected by `config.environment_type`.
pub fn factory_from_config(
    config: &EnvironmentConfig,
) -> Result<Box<dyn EnvironmentFactory<dyn Environment>>> {
    match config.environment_type.as_str() {
        "local" | "locally" => {
            let count = config
                .count
                .context("`count` is required for local environments")?;
            Ok(Box::new(LocalEnvironmentFactory::new(
                count,
                config.dir_prefix.clone(),
            )?))
        }
        "ssh" | "remote" => {
            let username = config
                .username
                .clone()
                .context("`username` is required for SSH environments")?;
            let private_key_path = config
                .private_key_path
                .as_deref()
                .context("`private_key_path` is required for SSH environments")?;
            let template = SshTarget {
                host: String::new(),
                port: config.port,
                username,
                private_key_path: expand_tilde(private_key_path),
                known_hosts: config.known_hosts.as_deref().map(expand_tilde),
                connect_timeout: config.connect_timeout,
            };
            Ok(Box::new(SshEnvironmentFactory::new(
                config.hosts.clone(),
                template,
                config.remote_dir.clone(),
                Arc::new(DefaultSshConnector),
            )))
        }
        other => bail!("Unsupported environment type: {other}"),
    }
}
