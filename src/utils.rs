//! Utility functions for the distestor project.
//!
//! This module provides helpers used across the crate, including home-relative path
//! resolution, shell quoting, local tree copies and TOML file loading.

use log::error;
use serde::de::DeserializeOwned;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::error::EnvironmentError;

/// Resolves `rel_path` against an environment's `home`.
///
/// Resolution is purely lexical: `.` segments are dropped and `..` segments pop the previous
/// segment. The result always stays inside `home`.
///
/// # Parameters
///
/// - `home`: The environment's home directory. An empty string stands for the login
///   directory of a remote account.
/// - `rel_path`: The path relative to `home`.
///
/// # Returns
///
/// The joined path. When `home` is empty the path is returned relative (`"."` for the home
/// itself).
///
/// # Errors
///
/// Returns [`EnvironmentError::PathOutsideHome`] if `rel_path` is absolute or climbs above
/// `home`.
pub fn resolve_in_home(home: &str, rel_path: &str) -> Result<String, EnvironmentError> {
    let outside = || EnvironmentError::PathOutsideHome {
        path: rel_path.to_string(),
    };
    if rel_path.starts_with('/') {
        return Err(outside());
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in rel_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop().ok_or_else(outside)?;
            }
            other => segments.push(other),
        }
    }

    let home = home.trim_end_matches('/');
    let joined = segments.join("/");
    Ok(match (home.is_empty(), joined.is_empty()) {
        (true, true) => ".".to_string(),
        (true, false) => joined,
        (false, true) => home.to_string(),
        (false, false) => format!("{home}/{joined}"),
    })
}

/// Joins two relative path fragments, treating `"."` and `""` as the empty prefix.
pub fn join_relative(prefix: &str, name: &str) -> String {
    match prefix.trim_end_matches('/') {
        "" | "." => name.to_string(),
        prefix => format!("{prefix}/{name}"),
    }
}

/// Quotes a word for a POSIX shell. Words made only of safe characters are left untouched.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./=:,@%+-~".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Joins an argv-style command into one shell command line.
pub fn join_command(command: &[&str]) -> String {
    command
        .iter()
        .map(|word| shell_quote(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Creates `dir` if it is missing.
///
/// # Errors
///
/// Returns [`EnvironmentError::NotADirectory`] if `dir` exists and is not a directory.
pub fn ensure_local_directory(dir: &Path) -> Result<(), EnvironmentError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    } else if !dir.is_dir() {
        return Err(EnvironmentError::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

/// Copies a file or a whole directory into `dest_dir`, keeping the source's name and shape.
///
/// A file `a/b.txt` lands at `dest_dir/b.txt`; a directory `a/dir` lands at `dest_dir/dir`
/// together with everything below it.
pub fn copy_into_directory(src: &Path, dest_dir: &Path) -> Result<(), EnvironmentError> {
    let name = src.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("source `{}` has no file name", src.display()),
        )
    })?;
    let target = dest_dir.join(name);

    if !src.is_dir() {
        fs::copy(src, &target)?;
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let out_path = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        fs::copy(entry.path(), out_path)?;
    }

    Ok(())
}

/// Reads a TOML file into an arbitrary struct.
///
/// # Parameters
///
/// - `path`: The path of the TOML file.
///
/// # Returns
///
/// Returns a struct of the specified type containing deserialized data.
///
/// # Errors
///
/// Returns an error if the file cannot be read or data parsing fails.
pub fn read_toml_from_file<T>(path: &PathBuf) -> Result<T, Box<dyn Error + Send + Sync>>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)?;
    let config: T = match toml::de::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to parse TOML file: {e}");
            return Err(Box::new(e));
        }
    };
    Ok(config)
}
