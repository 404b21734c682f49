//! Prometheus metrics for the credential service.

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, register_int_counter_vec};

/// Signed tokens issued, by algorithm.
pub static TOKENS_ISSUED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credential_tokens_issued_total",
        "Total number of signed tokens issued",
        &["algorithm"]
    )
    .expect("Failed to register tokens_issued metric")
});

/// Signed token validations, by outcome.
pub static TOKEN_VALIDATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credential_token_validations_total",
        "Total number of signed token validations",
        &["outcome"]
    )
    .expect("Failed to register token_validations metric")
});

/// Voucher operations, by operation and outcome.
pub static VOUCHER_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credential_voucher_operations_total",
        "Total number of voucher operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register voucher_operations metric")
});

/// Vault fetches, by outcome.
pub static VAULT_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "credential_vault_fetches_total",
        "Total number of key vault fetch attempts",
        &["outcome"]
    )
    .expect("Failed to register vault_fetches metric")
});

/// Record a token issuance.
pub fn record_token_issued(algorithm: &str) {
    TOKENS_ISSUED.with_label_values(&[algorithm]).inc();
}

/// Record a token validation outcome (`valid`, `unverified`, or an error kind).
pub fn record_token_validation(outcome: &str) {
    TOKEN_VALIDATIONS.with_label_values(&[outcome]).inc();
}

/// Record a voucher operation.
pub fn record_voucher_operation(operation: &str, outcome: &str) {
    VOUCHER_OPERATIONS
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a vault fetch outcome (`success` or `fallback`).
pub fn record_vault_fetch(outcome: &str) {
    VAULT_FETCHES.with_label_values(&[outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_token_issued() {
        record_token_issued("RS384");
        assert!(TOKENS_ISSUED.with_label_values(&["RS384"]).get() > 0);
    }

    #[test]
    fn test_record_voucher_operation() {
        record_voucher_operation("validate", "token_expired");
        assert!(
            VOUCHER_OPERATIONS
                .with_label_values(&["validate", "token_expired"])
                .get()
                > 0
        );
    }
}
