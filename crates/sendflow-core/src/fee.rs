use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::{Arrrtoshi, Ratio};

pub const DEFAULT_FEE: u64 = 10_000;
pub const MIN_FEE: u64 = 10_000;
pub const MAX_FEE: u64 = 1_000_000;
pub const PER_OUTPUT_SURCHARGE: u64 = 10_000;

/// Network fee bounds as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeInfo {
    pub min_fee: Arrrtoshi,
    pub default_fee: Arrrtoshi,
    pub max_fee: Arrrtoshi,
}

impl Default for FeeInfo {
    fn default() -> Self {
        Self {
            min_fee: Arrrtoshi::new(MIN_FEE).unwrap_or(Arrrtoshi::ZERO),
            default_fee: Arrrtoshi::new(DEFAULT_FEE).unwrap_or(Arrrtoshi::ZERO),
            max_fee: Arrrtoshi::new(MAX_FEE).unwrap_or(Arrrtoshi::ZERO),
        }
    }
}

impl FeeInfo {
    /// Repair bounds that arrive out of order: `max` is raised to `min` and
    /// `default` is pulled into `[min, max]`.
    pub fn sanitized(self) -> Self {
        let max_fee = self.max_fee.max(self.min_fee);
        let default_fee = self.default_fee.max(self.min_fee).min(max_fee);
        Self {
            min_fee: self.min_fee,
            default_fee,
            max_fee,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeePreset {
    Low,
    #[default]
    Standard,
    High,
    Custom,
}

impl FeePreset {
    pub const fn ratio(self) -> Ratio {
        match self {
            Self::Low => Ratio::HALF,
            Self::Standard | Self::Custom => Ratio::ONE,
            Self::High => Ratio::DOUBLE,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Standard => "standard",
            Self::High => "high",
            Self::Custom => "custom",
        }
    }
}

impl Display for FeePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "standard" | "normal" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown fee preset '{other}'")),
        }
    }
}

/// Fee bounds as a function of recipient count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    pub info: FeeInfo,
    pub per_output_surcharge: Arrrtoshi,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::new(
            FeeInfo::default(),
            Arrrtoshi::new(PER_OUTPUT_SURCHARGE).unwrap_or(Arrrtoshi::ZERO),
        )
    }
}

impl FeePolicy {
    pub fn new(info: FeeInfo, per_output_surcharge: Arrrtoshi) -> Self {
        Self {
            info: info.sanitized(),
            per_output_surcharge,
        }
    }

    fn surcharge(&self, recipient_count: usize) -> Arrrtoshi {
        let extra = u64::try_from(recipient_count.saturating_sub(1)).unwrap_or(u64::MAX);
        self.per_output_surcharge.saturating_mul(extra)
    }

    pub fn max_fee(&self) -> Arrrtoshi {
        self.info.max_fee
    }

    pub fn min_fee(&self, recipient_count: usize) -> Arrrtoshi {
        self.info
            .min_fee
            .saturating_add(self.surcharge(recipient_count))
            .min(self.max_fee())
    }

    pub fn default_fee(&self, recipient_count: usize) -> Arrrtoshi {
        self.info
            .default_fee
            .saturating_add(self.surcharge(recipient_count))
            .min(self.max_fee())
    }

    pub fn clamp(&self, fee: Arrrtoshi, recipient_count: usize) -> Arrrtoshi {
        fee.max(self.min_fee(recipient_count)).min(self.max_fee())
    }

    /// Fee for a preset applied to `base`, always inside
    /// `[min_fee(n), max_fee]`. `Custom` uses the user's value and falls back
    /// to `base` when none has been entered.
    pub fn fee_for_preset(
        &self,
        preset: FeePreset,
        base: Arrrtoshi,
        custom: Option<Arrrtoshi>,
        recipient_count: usize,
    ) -> Arrrtoshi {
        let raw = match preset {
            FeePreset::Custom => custom.unwrap_or(base),
            other => base.scale_round(other.ratio()).unwrap_or(Arrrtoshi::MAX),
        };
        self.clamp(raw, recipient_count)
    }
}

/// Resolved fee state for the current composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSelection {
    pub preset: FeePreset,
    pub min_fee: Arrrtoshi,
    pub default_fee: Arrrtoshi,
    pub max_fee: Arrrtoshi,
    pub selected_fee: Arrrtoshi,
    pub custom_fee: Option<Arrrtoshi>,
}

impl FeeSelection {
    pub fn compute(
        policy: &FeePolicy,
        preset: FeePreset,
        custom_fee: Option<Arrrtoshi>,
        recipient_count: usize,
    ) -> Self {
        let default_fee = policy.default_fee(recipient_count);
        Self {
            preset,
            min_fee: policy.min_fee(recipient_count),
            default_fee,
            max_fee: policy.max_fee(),
            selected_fee: policy.fee_for_preset(preset, default_fee, custom_fee, recipient_count),
            custom_fee,
        }
    }

    /// True when a custom fee had to be moved into bounds. The user's value
    /// is kept so it comes back if the bounds relax again.
    pub fn custom_adjusted(&self) -> bool {
        self.preset == FeePreset::Custom
            && self
                .custom_fee
                .is_some_and(|custom| custom != self.selected_fee)
    }
}
