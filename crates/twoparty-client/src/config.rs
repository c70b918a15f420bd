//! Engine configuration

use std::time::Duration;
use twoparty_core::{config::MIN_PAILLIER_MODULUS_BITS, Error, ProtocolConfig, Result};

pub const OPERATION_TIMEOUT_ENV: &str = "TWOPARTY_OPERATION_TIMEOUT_SECS";
pub const ROUND_TIMEOUT_ENV: &str = "TWOPARTY_ROUND_TIMEOUT_SECS";
pub const CONNECT_TIMEOUT_ENV: &str = "TWOPARTY_CONNECT_TIMEOUT_SECS";
pub const PAILLIER_BITS_ENV: &str = "TWOPARTY_PAILLIER_BITS";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a whole operation, connect included
    pub operation_timeout: Duration,
    /// How long to wait for each peer response
    pub round_timeout: Duration,
    pub connect_timeout: Duration,
    pub protocol: ProtocolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(60),
            round_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    /// Defaults overridden by `TWOPARTY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = parse_var(&lookup, OPERATION_TIMEOUT_ENV)? {
            config.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, ROUND_TIMEOUT_ENV)? {
            config.round_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, CONNECT_TIMEOUT_ENV)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(bits) = parse_var(&lookup, PAILLIER_BITS_ENV)? {
            let bits = usize::try_from(bits).unwrap_or(usize::MAX);
            if bits < MIN_PAILLIER_MODULUS_BITS {
                return Err(Error::InvalidInput(format!(
                    "{PAILLIER_BITS_ENV} must be at least {MIN_PAILLIER_MODULUS_BITS}, got {bits}"
                )));
            }
            config.protocol = config.protocol.with_paillier_modulus_bits(bits);
        }
        Ok(config)
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::InvalidInput(format!("{name} must be a whole number, got {raw:?}"))),
    }
}
