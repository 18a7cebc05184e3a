//! 远程 SSH 测试环境的实现
//!
//! 每个操作都通过注入的 [`SshConnector`] 打开一条新连接。远程路径相对于配置的远程主目录，
//! 每条命令前都加上 `cd <主目录>; `。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, trace};

use crate::connection::RemoteProcess;
use crate::connection::ssh::{RemoteKind, SshConnector, SshSession, SshTarget};
use crate::error::{CommandError, EnvironmentError};
use crate::test_environment::{Environment, Properties};
use crate::utils::{ensure_local_directory, join_command, resolve_in_home, shell_quote};

/// 远程 SSH 测试环境
pub struct SshEnvironment {
    id: usize,
    target: SshTarget,
    /// 远程主目录，空字符串表示登录目录
    remote_home: String,
    connector: Arc<dyn SshConnector>,
    properties: Properties,
}

impl SshEnvironment {
    pub fn new(
        id: usize,
        target: SshTarget,
        remote_home: impl Into<String>,
        connector: Arc<dyn SshConnector>,
    ) -> Self {
        Self {
            id,
            target,
            remote_home: remote_home.into(),
            connector,
            properties: Properties::new(),
        }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    pub fn remote_home(&self) -> &str {
        &self.remote_home
    }

    fn connect(&self) -> Result<Box<dyn SshSession>, CommandError> {
        self.connector.connect(&self.target)
    }

    fn resolve(&self, rel_path: &str) -> Result<String, EnvironmentError> {
        resolve_in_home(&self.remote_home, rel_path)
    }

    /// 生成在远程主目录中执行 `command` 的命令行
    fn command_line(&self, command: &[&str]) -> Result<String, EnvironmentError> {
        if command.is_empty() {
            return Err(EnvironmentError::EmptyCommand);
        }
        let cd = if self.remote_home.is_empty() {
            "cd; ".to_string()
        } else {
            format!("cd {}; ", shell_quote(&self.remote_home))
        };
        Ok(cd + &join_command(command))
    }
}

impl Environment for SshEnvironment {
    fn id(&self) -> usize {
        self.id
    }

    fn hostname(&self) -> String {
        self.target.host.clone()
    }

    fn name(&self) -> String {
        self.target.host.clone()
    }

    fn copy_files_from_local_disk(
        &self,
        src_path: &Path,
        dest_rel_path: &str,
    ) -> Result<(), EnvironmentError> {
        let dest = self.resolve(dest_rel_path)?;
        trace!(
            "[{}] copy_files_from_local_disk({}, {dest})",
            self.target.host,
            src_path.display()
        );
        let connection = self.connect()?;
        match connection.path_kind(&dest)? {
            RemoteKind::Directory => {}
            RemoteKind::File => return Err(EnvironmentError::NotADirectory(PathBuf::from(dest))),
            RemoteKind::Missing => connection.make_dirs(&dest)?,
        }
        connection.upload(src_path, &dest)
    }

    fn copy_files_to_local_disk(
        &self,
        src_rel_path: &str,
        dest_path: &Path,
    ) -> Result<(), EnvironmentError> {
        let src = self.resolve(src_rel_path)?;
        trace!(
            "[{}] copy_files_to_local_disk({src}, {})",
            self.target.host,
            dest_path.display()
        );
        ensure_local_directory(dest_path)?;
        self.connect()?.download(&src, dest_path)
    }

    fn mkdirs(&self, rel_path: &str) -> Result<(), EnvironmentError> {
        let dir = self.resolve(rel_path)?;
        trace!("[{}] mkdirs({dir})", self.target.host);
        Ok(self.connect()?.make_dirs(&dir)?)
    }

    fn remove_file(&self, rel_path: &str) -> Result<(), EnvironmentError> {
        let path = self.resolve(rel_path)?;
        debug!("[{}] 删除 {path}", self.target.host);
        Ok(self
            .connect()?
            .exec_checked(&format!("rm -rf {}", shell_quote(&path)))?)
    }

    fn run_command(&self, command: &[&str]) -> Result<Box<dyn RemoteProcess>, EnvironmentError> {
        let line = self.command_line(command)?;
        Ok(self.connect()?.run_process(&line)?)
    }

    fn run_command_asynchronously(
        &self,
        command: &[&str],
    ) -> Result<Box<dyn RemoteProcess>, EnvironmentError> {
        let line = self.command_line(command)?;
        Ok(self.connect()?.spawn_process(&line)?)
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}
