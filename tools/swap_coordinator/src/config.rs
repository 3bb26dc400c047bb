//! Tunables for both sides of the protocol.
//!
//! Every struct has a `Default` carrying production values, `from_env()`
//! overrides read from `SWAP_*` variables, and `validate()`.

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::utxo::{BlockHeight, Currency};

/// Base units per whole Ledger-A coin: 10^24.
pub const BASE_UNIT: Currency = 1_000_000_000_000_000_000_000_000;

pub fn validate_nonzero(label: &str, value: u64) -> Result<()> {
    if value == 0 {
        Err(anyhow!("{label} must be greater than zero"))
    } else {
        Ok(())
    }
}

pub(crate) fn read_env_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

pub(crate) fn read_env_u128(key: &str, fallback: u128) -> u128 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

fn read_env_secs(key: &str, fallback: Duration) -> Duration {
    Duration::from_secs(read_env_u64(key, fallback.as_secs()))
}

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub session_lifetime: Duration,
    pub binding_offer_lifetime: Duration,
    pub timelock_offset: BlockHeight,
    pub anti_spam_confirmations: u64,
    pub deposit_confirmations: u64,
    pub miner_fee: Currency,
    pub anti_spam_ttl: Duration,
    pub anti_spam_sweep_interval: Duration,
    pub check_interval: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            session_lifetime: Duration::from_secs(6 * 60 * 60),
            binding_offer_lifetime: Duration::from_secs(60),
            timelock_offset: 24,
            anti_spam_confirmations: 8,
            deposit_confirmations: 8,
            miner_fee: BASE_UNIT,
            anti_spam_ttl: Duration::from_secs(6 * 60 * 60),
            anti_spam_sweep_interval: Duration::from_secs(60 * 60),
            check_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl ResponderConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            session_lifetime: read_env_secs("SWAP_SESSION_LIFETIME_SECS", default.session_lifetime),
            binding_offer_lifetime: read_env_secs(
                "SWAP_BINDING_OFFER_LIFETIME_SECS",
                default.binding_offer_lifetime,
            ),
            timelock_offset: read_env_u64("SWAP_TIMELOCK_OFFSET", default.timelock_offset),
            anti_spam_confirmations: read_env_u64(
                "SWAP_ANTI_SPAM_CONFIRMATIONS",
                default.anti_spam_confirmations,
            ),
            deposit_confirmations: read_env_u64(
                "SWAP_DEPOSIT_CONFIRMATIONS",
                default.deposit_confirmations,
            ),
            miner_fee: read_env_u128("SWAP_MINER_FEE", default.miner_fee),
            anti_spam_ttl: read_env_secs("SWAP_ANTI_SPAM_TTL_SECS", default.anti_spam_ttl),
            anti_spam_sweep_interval: read_env_secs(
                "SWAP_ANTI_SPAM_SWEEP_SECS",
                default.anti_spam_sweep_interval,
            ),
            check_interval: read_env_secs("SWAP_CHECK_INTERVAL_SECS", default.check_interval),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_nonzero("session lifetime", self.session_lifetime.as_secs())?;
        validate_nonzero("binding offer lifetime", self.binding_offer_lifetime.as_secs())?;
        validate_nonzero("timelock offset", self.timelock_offset)?;
        validate_nonzero("anti-spam ttl", self.anti_spam_ttl.as_secs())?;
        validate_nonzero("anti-spam sweep interval", self.anti_spam_sweep_interval.as_secs())?;
        validate_nonzero("check interval", self.check_interval.as_secs())?;
        if self.binding_offer_lifetime >= self.session_lifetime {
            return Err(anyhow!(
                "binding offer lifetime must be shorter than the session lifetime"
            ));
        }
        Ok(())
    }

    pub fn session_lifetime_secs(&self) -> i64 {
        self.session_lifetime.as_secs() as i64
    }

    pub fn binding_offer_lifetime_secs(&self) -> i64 {
        self.binding_offer_lifetime.as_secs() as i64
    }
}

#[derive(Debug, Clone)]
pub struct InitiatorConfig {
    pub anti_spam_confirmations: u64,
    pub deposit_confirmations: u64,
    pub funding_confirmations: u64,
    pub min_timelock_offset: BlockHeight,
    pub poll_interval: Duration,
    pub max_anti_spam_fee: Currency,
    pub similarity_percent: u32,
    pub miner_fee: Currency,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            anti_spam_confirmations: 10,
            deposit_confirmations: 10,
            funding_confirmations: 1,
            min_timelock_offset: 24 - 2,
            poll_interval: Duration::from_secs(10),
            // 0.001 ETH in wei.
            max_anti_spam_fee: 1_000_000_000_000_000,
            similarity_percent: 1,
            miner_fee: BASE_UNIT,
        }
    }
}

impl InitiatorConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            anti_spam_confirmations: read_env_u64(
                "SWAP_ANTI_SPAM_CONFIRMATIONS",
                default.anti_spam_confirmations,
            ),
            deposit_confirmations: read_env_u64(
                "SWAP_DEPOSIT_CONFIRMATIONS",
                default.deposit_confirmations,
            ),
            funding_confirmations: read_env_u64(
                "SWAP_FUNDING_CONFIRMATIONS",
                default.funding_confirmations,
            ),
            min_timelock_offset: read_env_u64(
                "SWAP_MIN_TIMELOCK_OFFSET",
                default.min_timelock_offset,
            ),
            poll_interval: Duration::from_millis(read_env_u64(
                "SWAP_POLL_INTERVAL_MS",
                default.poll_interval.as_millis() as u64,
            )),
            max_anti_spam_fee: read_env_u128("SWAP_MAX_ANTI_SPAM_FEE", default.max_anti_spam_fee),
            similarity_percent: u32::try_from(read_env_u64(
                "SWAP_SIMILARITY_PERCENT",
                u64::from(default.similarity_percent),
            ))
            .unwrap_or(default.similarity_percent),
            miner_fee: read_env_u128("SWAP_MINER_FEE", default.miner_fee),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_nonzero("anti-spam confirmations", self.anti_spam_confirmations)?;
        validate_nonzero("deposit confirmations", self.deposit_confirmations)?;
        validate_nonzero("funding confirmations", self.funding_confirmations)?;
        validate_nonzero("minimum timelock offset", self.min_timelock_offset)?;
        validate_nonzero("poll interval", self.poll_interval.as_millis() as u64)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Counter units paid per `rate_denominator` base units.
    pub rate_numerator: Currency,
    pub rate_denominator: Currency,
    pub premium: Currency,
    pub min_amount: Currency,
    /// Gas the responder spends claiming the escrow deposit.
    pub gas_estimate: u64,
    pub anti_spam_fee: Currency,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate_numerator: 1,
            rate_denominator: 100_000_000,
            premium: 0,
            min_amount: 100 * BASE_UNIT,
            gas_estimate: 500_000,
            anti_spam_fee: 100_000_000_000_000,
        }
    }
}

impl PricingConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            rate_numerator: read_env_u128("SWAP_RATE_NUMERATOR", default.rate_numerator),
            rate_denominator: read_env_u128("SWAP_RATE_DENOMINATOR", default.rate_denominator),
            premium: read_env_u128("SWAP_PREMIUM", default.premium),
            min_amount: read_env_u128("SWAP_MIN_AMOUNT", default.min_amount),
            gas_estimate: read_env_u64("SWAP_GAS_ESTIMATE", default.gas_estimate),
            anti_spam_fee: read_env_u128("SWAP_ANTI_SPAM_FEE", default.anti_spam_fee),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_denominator == 0 {
            return Err(anyhow!("rate denominator must be greater than zero"));
        }
        if self.rate_numerator == 0 {
            return Err(anyhow!("rate numerator must be greater than zero"));
        }
        validate_nonzero("gas estimate", self.gas_estimate)
    }
}
