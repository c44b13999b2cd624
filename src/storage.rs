// Locked, atomic file helpers used by the config and the cache snapshot.
use anyhow::{Context, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub struct LocalStorage;

impl LocalStorage {
    /// `calendars.json` -> `calendars.json.lock`, next to the guarded file.
    fn sibling(file_path: &Path, suffix: &str) -> PathBuf {
        let mut name = file_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("pubcal"));
        name.push(suffix);
        file_path.with_file_name(name)
    }

    /// Runs `f` while holding an exclusive lock on the sibling `.lock` file.
    pub fn with_lock<F, T>(file_path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock_path = Self::sibling(file_path, ".lock");
        let lock = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        lock.lock_exclusive()?;
        let result = f();
        FileExt::unlock(&lock)?;
        result
    }

    /// Writes to a temporary sibling, then renames over `path`.
    pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = Self::sibling(path, &format!(".{}.tmp", std::process::id()));
        fs::write(&tmp_path, contents)?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }
        Ok(())
    }
}
