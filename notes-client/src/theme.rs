//! Light/dark theme, persisted under a single settings key.
//!
//! The theme is process-wide state owned by one [`ThemeSettings`] value and
//! written through an injected [`SettingsStore`]. It has no interaction with
//! the notes list.

use crate::error::SettingsError;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings key holding the theme value
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// String key/value persistence for client settings.
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when the key has never been set.
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;

    fn remove(&self, key: &str) -> Result<(), SettingsError>;
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Settings kept as one flat JSON object on disk.
pub struct JsonFileSettings {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock();
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock();
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

pub struct ThemeSettings {
    store: Arc<dyn SettingsStore>,
    current: RwLock<Theme>,
}

impl ThemeSettings {
    /// Read the persisted theme. Missing, unknown or unreadable values
    /// start as [`Theme::Light`].
    pub fn load(store: Arc<dyn SettingsStore>) -> Self {
        let theme = match store.get(THEME_KEY) {
            Ok(Some(value)) => Theme::parse(&value).unwrap_or_else(|| {
                log::warn!("[THEME] Unknown stored theme {:?}, using light", value);
                Theme::Light
            }),
            Ok(None) => Theme::Light,
            Err(e) => {
                log::warn!("[THEME] Failed to read theme setting: {}", e);
                Theme::Light
            }
        };

        Self {
            store,
            current: RwLock::new(theme),
        }
    }

    pub fn get(&self) -> Theme {
        *self.current.read()
    }

    /// Change the theme and persist it. A persist failure is logged; the
    /// in-process value changes regardless.
    pub fn set(&self, theme: Theme) {
        let mut current = self.current.write();
        *current = theme;
        self.persist(theme);
    }

    /// Flip the theme. Read, flip and persist happen under one guard.
    pub fn toggle(&self) -> Theme {
        let mut current = self.current.write();
        *current = current.toggled();
        self.persist(*current);
        *current
    }

    /// Called with `current` held so the stored value follows the same order.
    fn persist(&self, theme: Theme) {
        if let Err(e) = self.store.set(THEME_KEY, theme.as_str()) {
            log::warn!("[THEME] Failed to persist theme: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_to_light() {
        let settings = ThemeSettings::load(Arc::new(MemorySettings::new()));
        assert_eq!(settings.get(), Theme::Light);
    }

    #[test]
    fn test_toggle_persists_across_instances() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
        let settings = ThemeSettings::load(store.clone());
        assert_eq!(settings.toggle(), Theme::Dark);
        assert_eq!(store.get(THEME_KEY).unwrap().as_deref(), Some("dark"));

        let reloaded = ThemeSettings::load(store);
        assert_eq!(reloaded.get(), Theme::Dark);
        assert_eq!(reloaded.toggle(), Theme::Light);
    }

    #[test]
    fn test_concurrent_toggles_all_count() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
        let settings = Arc::new(ThemeSettings::load(store.clone()));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let settings = settings.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        settings.toggle();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        // 100 flips from light land back on light, in memory and on disk
        assert_eq!(settings.get(), Theme::Light);
        assert_eq!(store.get(THEME_KEY).unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn test_unknown_value_falls_back() {
        let store = Arc::new(MemorySettings::new());
        store.set(THEME_KEY, "solarized").unwrap();
        assert_eq!(ThemeSettings::load(store).get(), Theme::Light);
        assert_eq!(Theme::parse(" DARK "), Some(Theme::Dark));
    }

    #[test]
    fn test_json_file_settings_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = JsonFileSettings::new(&path);

        assert_eq!(store.get(THEME_KEY).unwrap(), None);
        store.set(THEME_KEY, "dark").unwrap();
        store.set("other", "kept").unwrap();
        store.remove(THEME_KEY).unwrap();

        let reopened = JsonFileSettings::new(&path);
        assert_eq!(reopened.get(THEME_KEY).unwrap(), None);
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn test_corrupt_file_reads_as_light() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = Arc::new(JsonFileSettings::new(&path));
        assert!(matches!(store.get(THEME_KEY), Err(SettingsError::Json(_))));

        let settings = ThemeSettings::load(store);
        assert_eq!(settings.get(), Theme::Light);
        // Persisting fails on the corrupt file but the value still changes
        settings.set(Theme::Dark);
        assert_eq!(settings.get(), Theme::Dark);
    }
}
