//! Versioned text encoding for recommendations stored on the ledger.
//!
//! The contract stores recommendations as an opaque string. Every string
//! this agent writes is a JSON envelope carrying a `version` and a `kind`:
//!
//! ```json
//! {"version":1,"kind":"trades","trades":{"NEAR":{"action":"buy","amount":97}}}
//! {"version":1,"kind":"no_assets"}
//! {"version":1,"kind":"stake","pair":"NEAR-USDT","apy":12.5}
//! {"version":1,"kind":"no_safe_stake"}
//! ```
//!
//! Decoding anything else (other versions, unknown kinds, bare legacy
//! maps, zero amounts) fails with `InvalidRecommendation`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{
    AgentError, AnalysisOutcome, Recommendation, RecommendationSet, StakeRecommendation,
    TradeAction,
};

pub const ENVELOPE_VERSION: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TradeEntry {
    action: TradeAction,
    amount: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Kind {
    Trades,
    NoAssets,
    Stake,
    NoSafeStake,
}

/// Flat envelope. Kept free of tagged or flattened serde enums so amounts
/// are parsed straight from the text as u128.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    version: u64,
    kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trades: Option<BTreeMap<String, TradeEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    apy: Option<f64>,
}

impl Envelope {
    fn new(kind: Kind) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            kind,
            trades: None,
            pair: None,
            apy: None,
        }
    }
}

/// Just enough of an envelope to check its version.
#[derive(Deserialize)]
struct Header {
    #[serde(default)]
    version: Option<u64>,
}

/// A decoded recommendation as read back from the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistedRecommendation {
    Trades(RecommendationSet),
    NoAssets,
    Stake(StakeRecommendation),
}

impl PersistedRecommendation {
    /// The trade set, if this is a trade recommendation.
    pub fn into_trades(self) -> Option<RecommendationSet> {
        match self {
            PersistedRecommendation::Trades(set) => Some(set),
            _ => None,
        }
    }
}

fn to_text(envelope: &Envelope) -> Result<String, AgentError> {
    serde_json::to_string(envelope)
        .map_err(|e| AgentError::InvalidRecommendation(format!("encode failed: {e}")))
}

/// Encode the analysis stage's result.
pub fn encode_analysis(outcome: &AnalysisOutcome) -> Result<String, AgentError> {
    let envelope = match outcome {
        AnalysisOutcome::NoAssets => Envelope::new(Kind::NoAssets),
        AnalysisOutcome::Analyzed(set) => Envelope {
            trades: Some(
                set.iter()
                    .map(|(asset, rec)| {
                        (
                            asset.clone(),
                            TradeEntry {
                                action: rec.action,
                                amount: rec.amount,
                            },
                        )
                    })
                    .collect(),
            ),
            ..Envelope::new(Kind::Trades)
        },
    };
    to_text(&envelope)
}

/// Encode the liquidity stage's result.
pub fn encode_stake(stake: &StakeRecommendation) -> Result<String, AgentError> {
    let envelope = match stake {
        StakeRecommendation::Stake { pair, apy } => Envelope {
            pair: Some(pair.clone()),
            apy: Some(*apy),
            ..Envelope::new(Kind::Stake)
        },
        StakeRecommendation::NoSafeOption => Envelope::new(Kind::NoSafeStake),
    };
    to_text(&envelope)
}

/// Decode a stored recommendation string.
pub fn decode(text: &str) -> Result<PersistedRecommendation, AgentError> {
    let invalid = |msg: String| AgentError::InvalidRecommendation(msg);

    let header: Header =
        serde_json::from_str(text).map_err(|e| invalid(format!("not a JSON object: {e}")))?;
    match header.version {
        Some(ENVELOPE_VERSION) => {}
        Some(other) => return Err(invalid(format!("unsupported version {other}"))),
        None => return Err(invalid("missing envelope version".into())),
    }

    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| invalid(format!("malformed envelope: {e}")))?;

    match envelope {
        Envelope { kind: Kind::NoAssets, trades: None, pair: None, apy: None, .. } => {
            Ok(PersistedRecommendation::NoAssets)
        }
        Envelope { kind: Kind::NoSafeStake, trades: None, pair: None, apy: None, .. } => {
            Ok(PersistedRecommendation::Stake(StakeRecommendation::NoSafeOption))
        }
        Envelope { kind: Kind::Stake, trades: None, pair: Some(pair), apy: Some(apy), .. } => {
            Ok(PersistedRecommendation::Stake(StakeRecommendation::Stake { pair, apy }))
        }
        Envelope { kind: Kind::Trades, trades: Some(trades), pair: None, apy: None, .. } => {
            let mut set = RecommendationSet::new();
            for (asset, entry) in trades {
                if entry.amount == 0 {
                    return Err(invalid(format!("zero amount for {asset}")));
                }
                if asset.is_empty() {
                    return Err(invalid("empty asset name".into()));
                }
                set.insert(
                    asset.clone(),
                    Recommendation {
                        asset,
                        action: entry.action,
                        amount: entry.amount,
                    },
                );
            }
            Ok(PersistedRecommendation::Trades(set))
        }
        Envelope { kind, .. } => Err(invalid(format!("fields do not match kind {kind:?}"))),
    }
}
