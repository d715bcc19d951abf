//! Risk policy: maps a score onto a risk label and a collection strategy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scorer::Score;

pub mod enrich;

/// Scores strictly above this are high risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.5;
/// Scores strictly above this warrant legal action.
pub const LEGAL_ACTION_THRESHOLD: f64 = 0.75;

/// Three-tier partition of the score range. Both the label and the strategy
/// are read off the tier, so they cannot disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// `(0.75, 1.0]`
    Severe,
    /// `(0.5, 0.75]`
    Elevated,
    /// `[0.0, 0.5]`
    Baseline,
}

impl RiskTier {
    pub fn from_score(score: Score) -> Self {
        let value = score.value();
        if value > LEGAL_ACTION_THRESHOLD {
            Self::Severe
        } else if value > HIGH_RISK_THRESHOLD {
            Self::Elevated
        } else {
            Self::Baseline
        }
    }

    pub fn label(self) -> RiskLabel {
        match self {
            Self::Severe | Self::Elevated => RiskLabel::HighRisk,
            Self::Baseline => RiskLabel::LowRisk,
        }
    }

    pub fn strategy(self) -> Strategy {
        match self {
            Self::Severe => Strategy::LegalAction,
            Self::Elevated => Strategy::SettlementPlan,
            Self::Baseline => Strategy::Reminder,
        }
    }
}

/// Binary risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "High Risk")]
    HighRisk,
    #[serde(rename = "Low Risk")]
    LowRisk,
}

impl RiskLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighRisk => "High Risk",
            Self::LowRisk => "Low Risk",
        }
    }

    /// `1` for high risk, `0` otherwise.
    pub fn as_flag(self) -> u8 {
        match self {
            Self::HighRisk => 1,
            Self::LowRisk => 0,
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended collection action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    #[serde(rename = "Legal Action")]
    LegalAction,
    #[serde(rename = "Settlement Plan")]
    SettlementPlan,
    #[serde(rename = "Reminder")]
    Reminder,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Self::LegalAction, Self::SettlementPlan, Self::Reminder];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LegalAction => "Legal Action",
            Self::SettlementPlan => "Settlement Plan",
            Self::Reminder => "Reminder",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `High Risk` iff `score > 0.5`.
pub fn classify(score: Score) -> RiskLabel {
    RiskTier::from_score(score).label()
}

/// `Legal Action` above 0.75, `Settlement Plan` above 0.5, otherwise `Reminder`.
pub fn recommend(score: Score) -> Strategy {
    RiskTier::from_score(score).strategy()
}

/// Score together with everything the policy derives from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Assessment {
    pub score: Score,
    pub label: RiskLabel,
    pub strategy: Strategy,
}

impl Assessment {
    pub fn from_score(score: Score) -> Self {
        let tier = RiskTier::from_score(score);
        Self {
            score,
            label: tier.label(),
            strategy: tier.strategy(),
        }
    }
}
