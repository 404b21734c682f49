//! Components wired from one configuration snapshot.

use crate::clock::{SystemTimeService, TimeService};
use crate::config::{KeyFamily, token, vault, voucher};
use crate::error::CredentialResult;
use crate::jwt::{TokenIssuer, TokenValidator};
use crate::keys::KeyMaterialProvider;
use crate::settings::{ConfigurationSnapshot, SecretStore};
use crate::voucher::VoucherCodec;
use std::fmt;
use std::sync::Arc;

/// Readiness of one credential feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureStatus {
    /// Feature name
    pub name: &'static str,
    /// `None` when ready, else why not
    pub problem: Option<String>,
}

impl FeatureStatus {
    fn from_result(name: &'static str, result: CredentialResult<()>) -> Self {
        Self {
            name,
            problem: result.err().map(|e| e.to_string()),
        }
    }

    /// True when the feature can be used.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.problem.is_none()
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            None => write!(f, "{}: ready", self.name),
            Some(problem) => write!(f, "{}: {problem}", self.name),
        }
    }
}

/// Issuer, validator and voucher codec sharing one snapshot and clock.
#[derive(Clone)]
pub struct CredentialContext {
    settings: Arc<ConfigurationSnapshot>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    vouchers: VoucherCodec,
}

impl CredentialContext {
    /// Context over `settings` using the system clock.
    #[must_use]
    pub fn new(settings: Arc<ConfigurationSnapshot>) -> Self {
        Self::with_clock(settings, Arc::new(SystemTimeService))
    }

    /// Context over `settings` using `clock` for expiry checks.
    #[must_use]
    pub fn with_clock(settings: Arc<ConfigurationSnapshot>, clock: Arc<dyn TimeService>) -> Self {
        Self {
            issuer: TokenIssuer::new(Arc::clone(&settings)),
            validator: TokenValidator::new(Arc::clone(&settings)).with_clock(Arc::clone(&clock)),
            vouchers: VoucherCodec::new(Arc::clone(&settings)).with_clock(clock),
            settings,
        }
    }

    /// Context over the store's current snapshot.
    pub async fn from_store(store: &SecretStore) -> Self {
        Self::new(store.resolve().await)
    }

    /// Snapshot shared by every component.
    #[must_use]
    pub fn settings(&self) -> &Arc<ConfigurationSnapshot> {
        &self.settings
    }

    /// Token issuer.
    #[must_use]
    pub const fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Token validator.
    #[must_use]
    pub const fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Voucher codec.
    #[must_use]
    pub const fn vouchers(&self) -> &VoucherCodec {
        &self.vouchers
    }

    /// Readiness of each feature against the current snapshot.
    #[must_use]
    pub fn features(&self) -> Vec<FeatureStatus> {
        let settings = &self.settings;
        let keys = KeyMaterialProvider::new(Arc::clone(settings));

        let signing = || -> CredentialResult<()> {
            let algorithm = crate::jwt::configured_algorithm(settings)?;
            keys.signing_key(token::KEY, algorithm)?;
            settings.string(token::ISSUER)?;
            Ok(())
        };
        let verification = || -> CredentialResult<()> {
            signing()?;
            settings.boolean(token::ALL_VALID)?;
            settings.datetime(token::FORCE_REFRESH_TIME)?;
            Ok(())
        };
        let vouchers = || -> CredentialResult<()> {
            keys.resolve(voucher::KEY, KeyFamily::Rsa)?;
            Ok(())
        };
        let remote = || -> CredentialResult<()> {
            settings.url(vault::URL)?;
            settings.string(vault::CLIENT_ID)?;
            settings.string(vault::CLIENT_SECRET)?;
            Ok(())
        };

        vec![
            FeatureStatus::from_result("key vault", remote()),
            FeatureStatus::from_result("token issuance", signing()),
            FeatureStatus::from_result("token validation", verification()),
            FeatureStatus::from_result("token scope", settings.url(token::SCOPE).map(drop)),
            FeatureStatus::from_result("vouchers", vouchers()),
            FeatureStatus::from_result(
                "voucher provider",
                self.vouchers.provider_id().map(drop),
            ),
        ]
    }
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::RsaKey;
    use crate::settings::LocalSettings;
    use base64::{Engine, engine::general_purpose::STANDARD};
    use chrono::{Duration, Utc};
    use url::Url;
    use uuid::Uuid;

    fn ready(features: &[FeatureStatus], name: &str) -> bool {
        features
            .iter()
            .find(|f| f.name == name)
            .is_some_and(FeatureStatus::is_ready)
    }

    #[test]
    fn test_empty_settings_report_everything_missing() {
        let context = CredentialContext::new(Arc::new(ConfigurationSnapshot::from_pairs(
            Vec::<(String, String)>::new(),
        )));
        let features = context.features();
        assert_eq!(features.len(), 6);
        assert!(features.iter().all(|f| !f.is_ready()));
        assert!(features[1].to_string().contains(token::KEY));
    }

    #[tokio::test]
    async fn test_configured_context_round_trips() {
        let key = STANDARD.encode(RsaKey::generate(2048).unwrap().to_pkcs1_der().unwrap());
        let store = SecretStore::local_only(LocalSettings::from_map([
            (token::KEY, key.as_str()),
            (token::ISSUER, "https://example.test"),
            (token::SCOPE, "https://example.test/api"),
            (voucher::KEY, key.as_str()),
        ]));
        let context = CredentialContext::from_store(&store).await;

        let features = context.features();
        assert!(ready(&features, "token issuance"));
        assert!(ready(&features, "token validation"));
        assert!(ready(&features, "vouchers"));
        assert!(!ready(&features, "key vault"));
        assert!(!ready(&features, "voucher provider"));

        let scope: Url = context.issuer().default_scope().unwrap();
        let token = context
            .issuer()
            .issue(&scope, Utc::now(), Duration::minutes(5), &crate::jwt::ClaimSet::new())
            .unwrap();
        assert!(context.validator().validate(&token).unwrap().verified);

        let subject = Uuid::new_v4();
        let voucher = context
            .vouchers()
            .generate(subject, Utc::now() + Duration::minutes(5))
            .unwrap();
        assert_eq!(context.vouchers().validate(&voucher).unwrap().subject_id, subject);
    }
}
