//! Credential trust layer.
//!
//! Resolves settings from local configuration and a remote key vault,
//! builds key material from them, and issues and validates signed tokens and
//! compact vouchers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod metrics;
pub mod settings;
pub mod telemetry;
pub mod voucher;

// Re-exports for convenience
pub use clock::{FixedTimeService, SystemTimeService, TimeService};
pub use config::{KeyFamily, SigningAlgorithm};
pub use context::{CredentialContext, FeatureStatus};
pub use error::{CredentialError, CredentialResult};
pub use jwt::{ClaimSet, TokenIssuer, TokenValidator, ValidatedToken};
pub use keys::{KeyMaterial, KeyMaterialProvider};
pub use settings::{ConfigurationSnapshot, LocalSettings, SecretStore, SnapshotSource};
pub use voucher::{Voucher, VoucherCodec};
