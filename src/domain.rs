// ===============================
// src/domain.rs
// ===============================
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of one outcome in a market (team, horse, ...).
pub type Selection = String;

/// Net position per selection, in the order the selections were supplied.
pub type PositionMap = IndexMap<Selection, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetType { Back, Lay }

impl BetType {
    /// Wire tags only, exact case: anything else is not a bet type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BACK" => Some(BetType::Back),
            "LAY" => Some(BetType::Lay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { BetType::Back => "BACK", BetType::Lay => "LAY" }
    }
}

/// Validated bet, ready for the calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub selection_id: Selection,
    pub bet_type: BetType,
    pub odds: f64,
    pub stake: f64,
}

impl Bet {
    pub fn new(selection_id: impl Into<Selection>, bet_type: BetType, odds: f64, stake: f64) -> Self {
        Self { selection_id: selection_id.into(), bet_type, odds, stake }
    }
}

#[cfg(test)]
impl Bet {
    pub fn back(selection_id: impl Into<Selection>, odds: f64, stake: f64) -> Self {
        Self::new(selection_id, BetType::Back, odds, stake)
    }
    pub fn lay(selection_id: impl Into<Selection>, odds: f64, stake: f64) -> Self {
        Self::new(selection_id, BetType::Lay, odds, stake)
    }
}

/// Bet as it arrives from a data source: bet type is still a free string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bet_id: Option<String>,
    pub selection_id: Selection,
    pub bet_type: String,
    pub odds: f64,
    pub stake: f64,
}

impl From<&Bet> for RawBet {
    fn from(b: &Bet) -> Self {
        Self {
            bet_id: None,
            selection_id: b.selection_id.clone(),
            bet_type: b.bet_type.as_str().to_string(),
            odds: b.odds,
            stake: b.stake,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub ts_ns: i128,
    pub market_id: String,
    pub positions: PositionMap,
    pub bet_count: usize,
    pub rejected: usize,
    pub worst_case: Option<f64>,
    pub best_case: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection { pub ts_ns: i128, pub market_id: String, pub bet: RawBet, pub kind: String, pub reason: String }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Snapshot(PositionSnapshot), Rejected(Rejection), Note(String) }

pub fn now_ns() -> i128 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}
