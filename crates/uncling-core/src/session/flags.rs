//! Durable client flags.
//!
//! Flags live in `<base>/flags.json` as a flat string map with restricted
//! permissions (0600), mirroring what a browser keeps in local storage.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};

/// Keys of the durable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKey {
    SplashSeen,
    OnboardingComplete,
    AttachmentStyle,
}

impl FlagKey {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagKey::SplashSeen => "hasSeenSplash",
            FlagKey::OnboardingComplete => "onboardingComplete",
            FlagKey::AttachmentStyle => "attachmentStyle",
        }
    }
}

/// Durable key/value storage for client flags.
pub trait FlagStore: Send + Sync {
    /// Reads a flag.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: FlagKey) -> Result<Option<String>>;

    /// Writes a flag.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written.
    fn set(&self, key: FlagKey, value: &str) -> Result<()>;

    /// Removes a flag.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written.
    fn remove(&self, key: FlagKey) -> Result<()>;

    /// Removes every flag.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written.
    fn clear(&self) -> Result<()>;

    /// Boolean flags are stored as `"true"` or absent.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn is_set(&self, key: FlagKey) -> Result<bool> {
        Ok(self.get(key)?.as_deref() == Some("true"))
    }
}

/// In-memory flags (tests, ephemeral sessions).
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with the given flags.
    pub fn with(entries: &[(FlagKey, &str)]) -> Self {
        let store = Self::default();
        {
            let mut values = store.lock();
            for (key, value) in entries {
                values.insert(key.as_str().to_string(), (*value).to_string());
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: FlagKey) -> Result<Option<String>> {
        Ok(self.lock().get(key.as_str()).cloned())
    }

    fn set(&self, key: FlagKey, value: &str) -> Result<()> {
        self.lock()
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: FlagKey) -> Result<()> {
        self.lock().remove(key.as_str());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}

/// File-backed flags at `<base>/flags.json`.
///
/// Every call re-reads the file so two processes sharing a home directory
/// observe each other's writes.
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read flags from {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse flags from {}", self.path.display()))
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(values).context("Failed to serialize flags")?;
        write_private(&self.path, &contents)
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.load()?;
        f(&mut values);
        self.save(&values)
    }
}

impl FlagStore for FileFlagStore {
    fn get(&self, key: FlagKey) -> Result<Option<String>> {
        Ok(self.load()?.remove(key.as_str()))
    }

    fn set(&self, key: FlagKey, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.as_str().to_string(), value.to_string());
        })
    }

    fn remove(&self, key: FlagKey) -> Result<()> {
        self.update(|values| {
            values.remove(key.as_str());
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(BTreeMap::clear)
    }
}

/// Writes a file readable only by the current user.
pub(crate) fn write_private(path: &Path, contents: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    Ok(())
}
