use std::time::Duration;

use swap_coordinator::config::{
    validate_nonzero, InitiatorConfig, PricingConfig, ResponderConfig,
};

#[test]
fn nonzero_validation() {
    assert!(validate_nonzero("timelock offset", 1).is_ok());
    assert!(validate_nonzero("timelock offset", 0).is_err());
}

#[test]
fn defaults_are_valid() {
    assert!(ResponderConfig::default().validate().is_ok());
    assert!(InitiatorConfig::default().validate().is_ok());
    assert!(PricingConfig::default().validate().is_ok());
}

#[test]
fn initiator_tolerates_two_blocks_of_drift() {
    let responder = ResponderConfig::default();
    let initiator = InitiatorConfig::default();
    assert_eq!(responder.timelock_offset, 24);
    assert_eq!(initiator.min_timelock_offset + 2, responder.timelock_offset);
}

#[test]
fn binding_offer_must_expire_before_session() {
    let config = ResponderConfig {
        binding_offer_lifetime: Duration::from_secs(7 * 60 * 60),
        ..ResponderConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn zero_rate_is_rejected() {
    let config = PricingConfig {
        rate_denominator: 0,
        ..PricingConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn env_overrides_defaults() {
    std::env::set_var("SWAP_TIMELOCK_OFFSET", "40");
    std::env::set_var("SWAP_BINDING_OFFER_LIFETIME_SECS", "not a number");
    let config = ResponderConfig::from_env();
    std::env::remove_var("SWAP_TIMELOCK_OFFSET");
    std::env::remove_var("SWAP_BINDING_OFFER_LIFETIME_SECS");
    assert_eq!(config.timelock_offset, 40);
    assert_eq!(config.binding_offer_lifetime, Duration::from_secs(60));
}

#[test]
fn oversized_similarity_percent_falls_back_to_default() {
    std::env::set_var("SWAP_SIMILARITY_PERCENT", (u64::from(u32::MAX) + 6).to_string());
    let config = InitiatorConfig::from_env();
    std::env::remove_var("SWAP_SIMILARITY_PERCENT");
    assert_eq!(
        config.similarity_percent,
        InitiatorConfig::default().similarity_percent
    );
}
