//! Persisted theme preference.

use crate::lock_recover;
use crate::persistence::{load_json, save_json, KeyValueStorage};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    Light,
    Dark,
    /// Follow the host environment.
    #[default]
    Auto,
}

/// Concrete theme after resolving [`ThemeMode::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

/// Host environment queries the core cannot answer itself.
pub trait Environment: Send + Sync {
    /// `None` when the host exposes no color-scheme preference.
    fn prefers_dark(&self) -> Option<bool>;
}

/// Environment with a fixed answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedEnvironment(pub Option<bool>);

impl Environment for FixedEnvironment {
    fn prefers_dark(&self) -> Option<bool> {
        self.0
    }
}

pub fn resolve_theme(mode: ThemeMode, environment: &dyn Environment) -> Theme {
    match mode {
        ThemeMode::Light => Theme::Light,
        ThemeMode::Dark => Theme::Dark,
        ThemeMode::Auto => match environment.prefers_dark() {
            Some(true) => Theme::Dark,
            Some(false) | None => Theme::Light,
        },
    }
}

/// Theme mode kept in memory and mirrored to storage when one is wired.
pub struct ThemeSettings {
    mode: Mutex<ThemeMode>,
    storage: Option<(Arc<dyn KeyValueStorage>, String)>,
    environment: Arc<dyn Environment>,
}

impl ThemeSettings {
    /// Loads the stored mode, falling back to `Auto` on absence or corruption.
    pub fn new(
        storage: Option<(Arc<dyn KeyValueStorage>, String)>,
        environment: Arc<dyn Environment>,
    ) -> Self {
        let mode = match &storage {
            Some((storage, key)) => match load_json(storage.as_ref(), key) {
                Ok(mode) => mode.unwrap_or_default(),
                Err(err) => {
                    warn!(
                        "event=settings_load module=settings status=error key={} error={}",
                        key, err
                    );
                    ThemeMode::default()
                }
            },
            None => ThemeMode::default(),
        };
        Self {
            mode: Mutex::new(mode),
            storage,
            environment,
        }
    }

    pub fn mode(&self) -> ThemeMode {
        *lock_recover(&self.mode)
    }

    pub fn theme(&self) -> Theme {
        resolve_theme(self.mode(), self.environment.as_ref())
    }

    pub fn set_mode(&self, mode: ThemeMode) {
        *lock_recover(&self.mode) = mode;
        if let Some((storage, key)) = &self.storage {
            if let Err(err) = save_json(storage.as_ref(), key, &mode) {
                warn!(
                    "event=settings_save module=settings status=error key={} error={}",
                    key, err
                );
            }
        }
    }

    /// Returns to `Auto` and forgets the stored value.
    pub fn reset(&self) {
        *lock_recover(&self.mode) = ThemeMode::default();
        if let Some((storage, key)) = &self.storage {
            if let Err(err) = storage.remove_item(key) {
                warn!(
                    "event=settings_reset module=settings status=error key={} error={}",
                    key, err
                );
            }
        }
    }
}
