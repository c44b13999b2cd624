// File: ./src/context.rs
//! Where pubcal keeps its files.
//!
//! Everything that reads or writes disk (config, cache snapshot) receives a
//! `&dyn AppContext` instead of looking paths up itself. `StandardContext`
//! follows the platform conventions of `directories`, or a single root passed
//! with `--root`. `TestContext` lives in a throwaway temp directory.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// The two directories the application writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDir {
    Config,
    Cache,
}

impl AppDir {
    fn subdir(self) -> &'static str {
        match self {
            AppDir::Config => "config",
            AppDir::Cache => "cache",
        }
    }

    fn under_project(self, proj: &ProjectDirs) -> PathBuf {
        match self {
            AppDir::Config => proj.config_dir().to_path_buf(),
            AppDir::Cache => proj.cache_dir().to_path_buf(),
        }
    }
}

pub trait AppContext: Send + Sync + std::fmt::Debug {
    /// Resolves `dir`, creating it when missing.
    fn dir(&self, dir: AppDir) -> Result<PathBuf>;

    fn get_config_dir(&self) -> Result<PathBuf> {
        self.dir(AppDir::Config)
    }

    fn get_cache_dir(&self) -> Result<PathBuf> {
        self.dir(AppDir::Cache)
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_config_dir()?.join("config.toml"))
    }

    fn get_cache_snapshot_path(&self) -> Result<PathBuf> {
        Ok(self.get_cache_dir()?.join("calendars.json"))
    }
}

fn create_all(path: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory {}", path.display()))?;
    Ok(path)
}

#[derive(Clone, Debug, Default)]
pub struct StandardContext {
    override_root: Option<PathBuf>,
}

impl StandardContext {
    /// With `Some(root)`, config and cache live in `root/config` and `root/cache`.
    pub fn new(override_root: Option<PathBuf>) -> Self {
        Self { override_root }
    }

    pub fn root(&self) -> Option<&Path> {
        self.override_root.as_deref()
    }
}

impl AppContext for StandardContext {
    fn dir(&self, dir: AppDir) -> Result<PathBuf> {
        let path = match &self.override_root {
            Some(root) => root.join(dir.subdir()),
            None => {
                let proj = ProjectDirs::from("org", "pubcal", "pubcal")
                    .ok_or_else(|| anyhow::anyhow!("No home directory"))?;
                dir.under_project(&proj)
            }
        };
        create_all(path)
    }
}

/// Isolated directory tree for tests, removed on drop.
#[derive(Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let root = std::env::temp_dir().join(format!("pubcal_test_{}", uuid::Uuid::new_v4()));
        // Only used from tests.
        fs::create_dir_all(&root).expect("failed to create TestContext temp dir");
        Self { root }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn dir(&self, dir: AppDir) -> Result<PathBuf> {
        create_all(self.root.join(dir.subdir()))
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}
