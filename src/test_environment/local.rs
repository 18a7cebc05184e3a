//! 本地测试环境的实现
//!
//! 每个本地环境是一个本地目录，命令以该目录为工作目录直接执行（不经过 shell）。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::connection::RemoteProcess;
use crate::connection::local::spawn_local;
use crate::error::EnvironmentError;
use crate::test_environment::{Environment, Properties};
use crate::utils::{copy_into_directory, ensure_local_directory, resolve_in_home};

/// 以本地目录为主目录的环境
pub struct LocalEnvironment {
    id: usize,
    dir: PathBuf,
    properties: Properties,
}

impl LocalEnvironment {
    pub fn new(id: usize, dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            dir: dir.into(),
            properties: Properties::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn resolve(&self, rel_path: &str) -> Result<PathBuf, EnvironmentError> {
        Ok(self.dir.join(resolve_in_home("", rel_path)?))
    }
}

impl Environment for LocalEnvironment {
    fn id(&self) -> usize {
        self.id
    }

    fn hostname(&self) -> String {
        "localhost".to_string()
    }

    fn name(&self) -> String {
        std::path::absolute(&self.dir)
            .unwrap_or_else(|_| self.dir.clone())
            .display()
            .to_string()
    }

    fn copy_files_from_local_disk(
        &self,
        src_path: &Path,
        dest_rel_path: &str,
    ) -> Result<(), EnvironmentError> {
        let dest = self.resolve(dest_rel_path)?;
        trace!("[{}] 复制 {} -> {}", self.id, src_path.display(), dest.display());
        ensure_local_directory(&dest)?;
        copy_into_directory(src_path, &dest)
    }

    fn copy_files_to_local_disk(
        &self,
        src_rel_path: &str,
        dest_path: &Path,
    ) -> Result<(), EnvironmentError> {
        let src = self.resolve(src_rel_path)?;
        trace!("[{}] 复制 {} -> {}", self.id, src.display(), dest_path.display());
        ensure_local_directory(dest_path)?;
        copy_into_directory(&src, dest_path)
    }

    fn mkdirs(&self, rel_path: &str) -> Result<(), EnvironmentError> {
        let dir = self.resolve(rel_path)?;
        ensure_local_directory(&dir)
    }

    fn remove_file(&self, rel_path: &str) -> Result<(), EnvironmentError> {
        let path = self.resolve(rel_path)?;
        debug!("[{}] 删除 {}", self.id, path.display());
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn run_command(&self, command: &[&str]) -> Result<Box<dyn RemoteProcess>, EnvironmentError> {
        let process = spawn_local(command, &self.dir)?;
        process.wait_for()?;
        Ok(Box::new(process))
    }

    fn run_command_asynchronously(
        &self,
        command: &[&str],
    ) -> Result<Box<dyn RemoteProcess>, EnvironmentError> {
        Ok(Box::new(spawn_local(command, &self.dir)?))
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn run_command_captures_output_and_exit_code() {
        let dir = tempdir().unwrap();
        let env = LocalEnvironment::new(0, dir.path());

        let process = env.run_command(&["sh", "-c", "pwd; exit 4"]).unwrap();

        assert_eq!(process.wait_for().unwrap(), 4);
        let mut out = String::new();
        process.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(
            out.trim_end(),
            fs::canonicalize(dir.path()).unwrap().display().to_string()
        );
    }

    #[test]
    fn destroy_kills_running_process() {
        let dir = tempdir().unwrap();
        let env = LocalEnvironment::new(0, dir.path());

        let process = env.run_command_asynchronously(&["sleep", "30"]).unwrap();
        process.destroy();

        assert_eq!(process.wait_for().unwrap(), 128 + 9);
    }

    #[test]
    fn run_command_survives_output_larger_than_a_pipe() {
        let dir = tempdir().unwrap();
        let env = LocalEnvironment::new(0, dir.path());

        let process = env
            .run_command(&["sh", "-c", "head -c 200000 /dev/zero"])
            .unwrap();

        assert_eq!(process.wait_for().unwrap(), 0);
        let mut out = Vec::new();
        process.take_stdout().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 200_000);
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = tempdir().unwrap();
        let env = LocalEnvironment::new(0, dir.path());
        assert!(matches!(
            env.run_command(&[]),
            Err(EnvironmentError::EmptyCommand)
        ));
    }

    #[test]
    fn paths_outside_home_are_rejected_without_side_effects() {
        let root = tempdir().unwrap();
        let home = root.path().join("home");
        fs::create_dir(&home).unwrap();
        let env = LocalEnvironment::new(0, &home);

        assert!(matches!(
            env.mkdirs("../escaped"),
            Err(EnvironmentError::PathOutsideHome { .. })
        ));
        assert!(!root.path().join("escaped").exists());

        let src = root.path().join("payload.txt");
        fs::write(&src, "x").unwrap();
        assert!(matches!(
            env.copy_files_from_local_disk(&src, "/tmp"),
            Err(EnvironmentError::PathOutsideHome { .. })
        ));
    }

    #[test]
    fn copy_into_existing_file_fails() {
        let dir = tempdir().unwrap();
        let env = LocalEnvironment::new(0, dir.path());
        fs::write(dir.path().join("occupied"), "x").unwrap();
        let src = tempdir().unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();

        assert!(matches!(
            env.copy_files_from_local_disk(&src.path().join("a.txt"), "occupied"),
            Err(EnvironmentError::NotADirectory(_))
        ));
    }

    #[test]
    fn remove_file_ignores_missing_paths() {
        let dir = tempdir().unwrap();
        let env = LocalEnvironment::new(0, dir.path());
        env.mkdirs("out/nested").unwrap();

        env.remove_file("out").unwrap();
        env.remove_file("out").unwrap();
        assert!(!dir.path().join("out").exists());
    }
}
