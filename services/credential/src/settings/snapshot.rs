//! Immutable configuration snapshot with typed lookups.

use crate::error::{CredentialError, CredentialResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

/// Where the snapshot's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Local settings only; the vault was not configured or could not be read.
    LocalOnly,
    /// Local settings overlaid with vault secrets.
    Merged {
        /// Number of secrets read from the vault.
        vault_secrets: usize,
    },
}

/// Resolved settings. Never mutated after construction.
#[derive(Clone)]
pub struct ConfigurationSnapshot {
    values: HashMap<String, String>,
    source: SnapshotSource,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

impl ConfigurationSnapshot {
    /// Build a snapshot.
    #[must_use]
    pub const fn new(values: HashMap<String, String>, source: SnapshotSource) -> Self {
        Self { values, source }
    }

    /// Snapshot over explicit values, marked local-only.
    #[must_use]
    pub fn from_pairs<K, V, I>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            SnapshotSource::LocalOnly,
        )
    }

    /// Provenance.
    #[must_use]
    pub const fn source(&self) -> SnapshotSource {
        self.source
    }

    /// Number of settings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the snapshot holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the key holds a non-blank value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Raw value of a non-blank setting.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Required string setting.
    ///
    /// # Errors
    ///
    /// [`CredentialError::ConfigMissing`] when absent or blank.
    pub fn string(&self, key: &str) -> CredentialResult<&str> {
        self.get(key).ok_or_else(|| CredentialError::missing(key))
    }

    /// Required base64 setting, decoded.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when absent, `ConfigInvalid` when not base64.
    pub fn base64_bytes(&self, key: &str) -> CredentialResult<Vec<u8>> {
        let value = self.string(key)?;
        STANDARD
            .decode(value.trim())
            .map_err(|e| CredentialError::invalid_config(key, format!("not valid base64: {e}")))
    }

    /// Optional boolean setting (`true`/`false`, any case).
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` when present but not a boolean.
    pub fn boolean(&self, key: &str) -> CredentialResult<Option<bool>> {
        self.get(key)
            .map(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(CredentialError::invalid_config(
                    key,
                    format!("'{other}' is not a boolean"),
                )),
            })
            .transpose()
    }

    /// Optional timestamp setting.
    ///
    /// Accepts RFC 3339, ISO-like and US date-time layouts without an offset
    /// (read as UTC), and bare dates (midnight UTC).
    ///
    /// # Errors
    ///
    /// `ConfigInvalid` when present but unparsable.
    pub fn datetime(&self, key: &str) -> CredentialResult<Option<DateTime<Utc>>> {
        self.get(key)
            .map(|v| {
                parse_datetime(v.trim()).ok_or_else(|| {
                    CredentialError::invalid_config(key, format!("'{v}' is not a timestamp"))
                })
            })
            .transpose()
    }

    /// Required integer setting.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when absent, `ConfigInvalid` when not an integer.
    pub fn integer(&self, key: &str) -> CredentialResult<i64> {
        let value = self.string(key)?;
        value
            .trim()
            .parse()
            .map_err(|e| CredentialError::invalid_config(key, format!("'{value}': {e}")))
    }

    /// Required absolute URL setting.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when absent, `ConfigInvalid` when not a URL.
    pub fn url(&self, key: &str) -> CredentialResult<Url> {
        let value = self.string(key)?;
        Url::parse(value.trim()).map_err(|e| CredentialError::invalid_config(key, e))
    }

    /// Required GUID setting.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` when absent, `ConfigInvalid` when not a GUID.
    pub fn guid(&self, key: &str) -> CredentialResult<Uuid> {
        let value = self.string(key)?;
        Uuid::parse_str(value.trim()).map_err(|e| CredentialError::invalid_config(key, e))
    }
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
    {
        return Some(dt.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl std::fmt::Debug for ConfigurationSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ConfigurationSnapshot")
            .field("source", &self.source)
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(pairs: &[(&str, &str)]) -> ConfigurationSnapshot {
        ConfigurationSnapshot::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_string_missing_and_blank() {
        let s = snapshot(&[("Blank", " ")]);
        assert_eq!(
            s.string("Blank").unwrap_err(),
            CredentialError::missing("Blank")
        );
        assert_eq!(s.string("Nope").unwrap_err(), CredentialError::missing("Nope"));
    }

    #[test]
    fn test_base64() {
        let s = snapshot(&[("Good", "aGVsbG8="), ("Bad", "***")]);
        assert_eq!(s.base64_bytes("Good").unwrap(), b"hello");
        assert!(matches!(
            s.base64_bytes("Bad"),
            Err(CredentialError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_boolean() {
        let s = snapshot(&[("T", "True"), ("F", "false"), ("X", "yes")]);
        assert_eq!(s.boolean("T").unwrap(), Some(true));
        assert_eq!(s.boolean("F").unwrap(), Some(false));
        assert_eq!(s.boolean("Missing").unwrap(), None);
        assert!(s.boolean("X").is_err());
    }

    #[test]
    fn test_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        for value in [
            "2024-03-01T08:30:00Z",
            "2024-03-01T10:30:00+02:00",
            "2024-03-01T08:30:00",
            "2024-03-01 08:30:00",
            "03/01/2024 08:30:00",
            "03/01/2024 8:30:00 AM",
        ] {
            let s = snapshot(&[("When", value)]);
            assert_eq!(s.datetime("When").unwrap(), Some(expected), "{value}");
        }

        let s = snapshot(&[("Day", "2024-03-01"), ("Bad", "soon")]);
        assert_eq!(
            s.datetime("Day").unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert!(matches!(
            s.datetime("Bad"),
            Err(CredentialError::ConfigInvalid { .. })
        ));
        assert_eq!(s.datetime("Missing").unwrap(), None);
    }

    #[test]
    fn test_integer_url_guid() {
        let s = snapshot(&[
            ("Size", "256"),
            ("NotInt", "big"),
            ("Url", "https://example.test/api"),
            ("Rel", "/api"),
            ("Id", "11111111-1111-1111-1111-111111111111"),
        ]);
        assert_eq!(s.integer("Size").unwrap(), 256);
        assert!(s.integer("NotInt").is_err());
        assert_eq!(s.url("Url").unwrap().as_str(), "https://example.test/api");
        assert!(matches!(s.url("Rel"), Err(CredentialError::ConfigInvalid { .. })));
        assert_eq!(
            s.guid("Id").unwrap().to_string(),
            "11111111-1111-1111-1111-111111111111"
        );
        assert!(matches!(s.guid("Missing"), Err(CredentialError::ConfigMissing { .. })));
    }

    #[test]
    fn test_debug_redacts_values() {
        let s = snapshot(&[("EastFive.Security.Token.Key", "c2VjcmV0")]);
        let debug = format!("{s:?}");
        assert!(debug.contains("EastFive.Security.Token.Key"));
        assert!(!debug.contains("c2VjcmV0"));
    }
}
