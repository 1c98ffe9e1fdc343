use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const MIN_DATA_LEN: usize = 67;
const MAX_DATA_LEN: usize = 82;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Testnet, Network::Regtest];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    /// Human-readable part of Sapling payment addresses on this network.
    pub const fn hrp(self) -> &'static str {
        match self {
            Self::Mainnet => "zs",
            Self::Testnet => "ztestsapling",
            Self::Regtest => "zregtestsapling",
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(format!("unknown network '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address contains invalid characters")]
    InvalidCharacters,
    #[error("not a shielded Sapling address")]
    InvalidPrefix,
    #[error("address belongs to a different network (expected {expected})")]
    NetworkMismatch { expected: Network },
    #[error("address is {length} characters, expected {min} to {max}")]
    InvalidLength {
        length: usize,
        min: usize,
        max: usize,
    },
}

fn network_of(address: &str) -> Option<Network> {
    [Network::Regtest, Network::Testnet, Network::Mainnet]
        .into_iter()
        .find(|network| {
            address
                .strip_prefix(network.hrp())
                .is_some_and(|rest| rest.starts_with('1'))
        })
}

/// Check `address` against the Sapling address grammar for `network`.
///
/// This is a format check: prefix, charset and length. It does not verify
/// the bech32 checksum, which the engine does when it builds outputs.
pub fn validate_address(address: &str, network: Network) -> Result<(), AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }
    if !address
        .bytes()
        .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit())
    {
        return Err(AddressError::InvalidCharacters);
    }

    let detected = network_of(address).ok_or(AddressError::InvalidPrefix)?;
    if detected != network {
        return Err(AddressError::NetworkMismatch { expected: network });
    }

    let data = &address[network.hrp().len() + 1..];
    if !data.chars().all(|c| BECH32_CHARSET.contains(c)) {
        return Err(AddressError::InvalidCharacters);
    }
    if !(MIN_DATA_LEN..=MAX_DATA_LEN).contains(&data.len()) {
        let prefix = address.len() - data.len();
        return Err(AddressError::InvalidLength {
            length: address.len(),
            min: prefix + MIN_DATA_LEN,
            max: prefix + MAX_DATA_LEN,
        });
    }
    Ok(())
}

pub fn is_valid_address(address: &str, network: Network) -> bool {
    validate_address(address, network).is_ok()
}
