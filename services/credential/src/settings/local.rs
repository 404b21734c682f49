//! Local settings sources.

use crate::error::{CredentialError, CredentialResult};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Settings available without any network access.
#[derive(Clone, Default)]
pub struct LocalSettings {
    values: HashMap<String, String>,
}

impl LocalSettings {
    /// Settings from an explicit map.
    #[must_use]
    pub fn from_map<K, V, I>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Settings from the process environment, after loading `.env` if present.
    #[must_use]
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_map(std::env::vars())
    }

    /// Settings from a dotenv-format file. Keys may contain dots.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::ConfigInvalid`] when the file cannot be read
    /// or a line does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> CredentialResult<Self> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let iter = dotenvy::from_path_iter(path)
            .map_err(|e| CredentialError::invalid_config(&source, e))?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| CredentialError::invalid_config(&source, e))?;
            values.insert(key, value);
        }
        debug!(path = %source, count = values.len(), "Loaded settings file");
        Ok(Self { values })
    }

    /// Overlay `other` on top of these settings.
    #[must_use]
    pub fn merged_with(mut self, other: Self) -> Self {
        self.values.extend(other.values);
        self
    }

    /// Value of a non-blank setting.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Owned copy of every setting.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.values.clone()
    }

    /// Number of settings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no settings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for LocalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("LocalSettings").field("keys", &keys).finish()
    }
}
