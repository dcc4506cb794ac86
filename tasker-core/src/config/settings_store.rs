//! Notification settings store with change notification.
//!
//! `SettingsStore` keeps the process-wide [`NotificationSettings`] behind a
//! `watch` channel so readers (the router, on every event) get a synchronous,
//! lock-free snapshot. Every mutation is persisted through a
//! [`SettingsStorage`] before it becomes visible.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tasker_sdk::config::NotificationSettings;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Errors raised while loading or persisting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Durable backing for notification settings.
pub trait SettingsStorage: Send + Sync {
    /// Load previously saved settings, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<NotificationSettings>, SettingsError>;

    fn save(&self, settings: &NotificationSettings) -> Result<(), SettingsError>;
}

impl<T: SettingsStorage + ?Sized> SettingsStorage for Arc<T> {
    fn load(&self) -> Result<Option<NotificationSettings>, SettingsError> {
        (**self).load()
    }

    fn save(&self, settings: &NotificationSettings) -> Result<(), SettingsError> {
        (**self).save(settings)
    }
}

/// Settings persisted as a TOML file.
#[derive(Debug, Clone)]
pub struct TomlSettingsFile {
    path: PathBuf,
}

impl TomlSettingsFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SettingsStorage for TomlSettingsFile {
    fn load(&self) -> Result<Option<NotificationSettings>, SettingsError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(toml::from_str(&content)?))
    }

    fn save(&self, settings: &NotificationSettings) -> Result<(), SettingsError> {
        let toml_string = toml::to_string_pretty(settings)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

/// Storage that keeps the last saved value in memory.
#[derive(Debug, Default)]
pub struct MemorySettingsStorage {
    saved: Mutex<Option<NotificationSettings>>,
}

impl MemorySettingsStorage {
    pub fn new(initial: Option<NotificationSettings>) -> Self {
        Self {
            saved: Mutex::new(initial),
        }
    }

    /// The value most recently passed to `save`.
    pub fn saved(&self) -> Option<NotificationSettings> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStorage for MemorySettingsStorage {
    fn load(&self) -> Result<Option<NotificationSettings>, SettingsError> {
        Ok(self.saved())
    }

    fn save(&self, settings: &NotificationSettings) -> Result<(), SettingsError> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(*settings);
        Ok(())
    }
}

/// Shared, versioned notification settings.
pub struct SettingsStore {
    inner: Arc<SettingsStoreInner>,
}

struct SettingsStoreInner {
    storage: Box<dyn SettingsStorage>,
    value_tx: watch::Sender<NotificationSettings>,
    version: AtomicU64,
    // Serializes load-modify-persist so two updates cannot interleave.
    write_lock: Mutex<()>,
}

/// Read handle onto a [`SettingsStore`].
#[derive(Debug, Clone)]
pub struct SettingsWatcher {
    value_rx: watch::Receiver<NotificationSettings>,
}

// -- SettingsStore -------------------------------------------------------

impl SettingsStore {
    /// Load settings from `storage`, falling back to defaults when nothing
    /// has been saved yet.
    pub fn load(storage: impl SettingsStorage + 'static) -> Result<Self, SettingsError> {
        let initial = match storage.load()? {
            Some(settings) => {
                debug!(?settings, "Loaded notification settings");
                settings
            }
            None => {
                info!("No saved notification settings, using defaults");
                NotificationSettings::default()
            }
        };
        let (value_tx, _) = watch::channel(initial);
        Ok(Self {
            inner: Arc::new(SettingsStoreInner {
                storage: Box::new(storage),
                value_tx,
                version: AtomicU64::new(0),
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Current settings snapshot.
    pub fn current(&self) -> NotificationSettings {
        *self.inner.value_tx.borrow()
    }

    /// Number of mutations applied since the store was loaded.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    /// Apply a user change, persist it, then publish it to watchers.
    ///
    /// If persisting fails the in-memory value is left untouched. A mutation
    /// that changes nothing is neither persisted nor published.
    pub fn update(
        &self,
        mutate: impl FnOnce(&mut NotificationSettings),
    ) -> Result<NotificationSettings, SettingsError> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.current();
        let mut next = current;
        mutate(&mut next);
        if next == current {
            return Ok(current);
        }

        self.inner.storage.save(&next)?;
        self.inner.value_tx.send_replace(next);
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(version, settings = ?next, "Notification settings updated");
        Ok(next)
    }

    /// Subscribe to settings changes.
    pub fn subscribe(&self) -> SettingsWatcher {
        SettingsWatcher {
            value_rx: self.inner.value_tx.subscribe(),
        }
    }
}

impl Clone for SettingsStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// -- SettingsWatcher -----------------------------------------------------

impl SettingsWatcher {
    /// Current settings snapshot.
    pub fn current(&self) -> NotificationSettings {
        *self.value_rx.borrow()
    }

    /// Wait until the settings are updated.
    pub async fn changed(&mut self) -> Result<NotificationSettings, watch::error::RecvError> {
        self.value_rx.changed().await?;
        Ok(*self.value_rx.borrow_and_update())
    }
}
