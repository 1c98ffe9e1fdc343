use serde::{Deserialize, Serialize};

use crate::address::Network;
use crate::amount::Arrrtoshi;
use crate::error::{Result, SendFlowError, TaxonomyCode};
use crate::fee::{FeeInfo, FeePolicy, PER_OUTPUT_SURCHARGE};
use crate::memo::{MAX_MEMO_BYTES, MEMO_WARNING_BYTES};

pub const DEFAULT_MAX_RECIPIENTS: usize = 50;

/// Settings for one composer/flow instance. Passed in explicitly; nothing
/// reads configuration from globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    pub network: Network,
    pub max_recipients: usize,
    pub per_output_surcharge: Arrrtoshi,
    /// Used until the engine reports real fee bounds.
    pub fallback_fee_info: FeeInfo,
    pub memo_warning_bytes: usize,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            max_recipients: DEFAULT_MAX_RECIPIENTS,
            per_output_surcharge: Arrrtoshi::new(PER_OUTPUT_SURCHARGE).unwrap_or(Arrrtoshi::ZERO),
            fallback_fee_info: FeeInfo::default(),
            memo_warning_bytes: MEMO_WARNING_BYTES,
        }
    }
}

impl SendConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn fee_policy(&self, info: FeeInfo) -> FeePolicy {
        FeePolicy::new(info, self.per_output_surcharge)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_recipients == 0 {
            return Err(SendFlowError::taxonomy(
                TaxonomyCode::Cli2005,
                "max_recipients must be at least 1",
            ));
        }
        if self.memo_warning_bytes > MAX_MEMO_BYTES {
            return Err(SendFlowError::taxonomy(
                TaxonomyCode::Cli2005,
                format!("memo_warning_bytes must not exceed {MAX_MEMO_BYTES}"),
            ));
        }
        if self.fallback_fee_info.min_fee > self.fallback_fee_info.max_fee {
            return Err(SendFlowError::taxonomy(
                TaxonomyCode::Cli2005,
                "fallback min fee is above the max fee",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SendConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_recipients, 50);
        assert_eq!(config.network, Network::Mainnet);
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = SendConfig {
            max_recipients: 0,
            ..SendConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), 2005);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SendConfig =
            serde_json::from_str(r#"{"network":"testnet","max_recipients":5}"#).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.max_recipients, 5);
        assert_eq!(config.memo_warning_bytes, MEMO_WARNING_BYTES);
    }
}
