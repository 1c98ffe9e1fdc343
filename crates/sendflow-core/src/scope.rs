use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::Arrrtoshi;

pub type KeyId = i64;
pub type AddressId = i64;

/// Which funds a payment may spend from.
///
/// A single enum value, so a key selection and an address selection can
/// never coexist. `ByAddresses` always holds at least one id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum SpendScope {
    #[default]
    Auto,
    ByKey(KeyId),
    ByAddresses(BTreeSet<AddressId>),
}

/// One spendable address known to the wallet, with its balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSource {
    pub key_id: KeyId,
    pub address_id: AddressId,
    pub address: String,
    pub spendable: Arrrtoshi,
    #[serde(default)]
    pub pending: Arrrtoshi,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub spendable: Arrrtoshi,
    pub pending: Arrrtoshi,
}

/// Outcome of resolving a scope against the current sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub scope: SpendScope,
    pub balance: BalanceSnapshot,
    /// The requested scope referred to a key or address that no longer
    /// exists and was replaced by `Auto`.
    pub demoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("an address selection must contain at least one address")]
    EmptySelection,
    #[error("invalid scope '{0}': expected auto, key:<id> or addresses:<id,...>")]
    Parse(String),
}

impl SpendScope {
    pub fn select_key(key_id: KeyId) -> Self {
        Self::ByKey(key_id)
    }

    pub fn select_addresses<I>(ids: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = AddressId>,
    {
        let set: BTreeSet<AddressId> = ids.into_iter().collect();
        if set.is_empty() {
            return Err(ScopeError::EmptySelection);
        }
        Ok(Self::ByAddresses(set))
    }

    /// Flip one address in or out of the selection. Any non-address scope
    /// becomes a single-address selection; removing the last address falls
    /// back to `Auto`.
    pub fn toggle_address(&self, address_id: AddressId) -> Self {
        match self {
            Self::ByAddresses(set) => {
                let mut next = set.clone();
                if !next.remove(&address_id) {
                    next.insert(address_id);
                }
                if next.is_empty() {
                    Self::Auto
                } else {
                    Self::ByAddresses(next)
                }
            }
            Self::Auto | Self::ByKey(_) => Self::ByAddresses(BTreeSet::from([address_id])),
        }
    }

    /// Whether `source` may fund a payment under this scope.
    pub fn includes(&self, source: &FundingSource) -> bool {
        match self {
            Self::Auto => true,
            Self::ByKey(key_id) => source.key_id == *key_id,
            Self::ByAddresses(set) => set.contains(&source.address_id),
        }
    }

    fn still_exists(&self, sources: &[FundingSource]) -> bool {
        match self {
            Self::Auto => true,
            Self::ByKey(key_id) => sources.iter().any(|s| s.key_id == *key_id),
            Self::ByAddresses(set) => {
                !set.is_empty()
                    && set
                        .iter()
                        .all(|id| sources.iter().any(|s| s.address_id == *id))
            }
        }
    }

    /// Sum balances of the sources this scope covers. A scope that points at
    /// a vanished key or address is demoted to `Auto`.
    pub fn resolve(&self, sources: &[FundingSource]) -> Resolved {
        let (scope, demoted) = if self.still_exists(sources) {
            (self.clone(), false)
        } else {
            (Self::Auto, true)
        };
        let balance = sources
            .iter()
            .filter(|source| scope.includes(source))
            .fold(BalanceSnapshot::default(), |acc, source| BalanceSnapshot {
                spendable: acc.spendable.saturating_add(source.spendable),
                pending: acc.pending.saturating_add(source.pending),
            });
        Resolved {
            scope,
            balance,
            demoted,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl Display for SpendScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::ByKey(key_id) => write!(f, "key:{key_id}"),
            Self::ByAddresses(set) => {
                let ids: Vec<String> = set.iter().map(ToString::to_string).collect();
                write!(f, "addresses:{}", ids.join(","))
            }
        }
    }
}

impl FromStr for SpendScope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        if let Some(id) = trimmed.strip_prefix("key:") {
            return id
                .trim()
                .parse()
                .map(Self::ByKey)
                .map_err(|_| ScopeError::Parse(trimmed.to_string()));
        }
        if let Some(list) = trimmed.strip_prefix("addresses:") {
            let ids = list
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| part.trim().parse::<AddressId>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ScopeError::Parse(trimmed.to_string()))?;
            return Self::select_addresses(ids);
        }
        Err(ScopeError::Parse(trimmed.to_string()))
    }
}
