// ===============================
// src/risk.rs (bet validation sebelum kalkulasi)
// ===============================
use ahash::AHashSet;
use thiserror::Error;
use tracing::warn;

use crate::domain::{Bet, BetType, RawBet, Selection};

/// Strict: semua error menolak bet.
/// Lenient: hanya bet type tak dikenal & angka non-finite yang ditolak,
/// sisanya lolos dengan warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    Strict,
    #[default]
    Lenient,
}

impl ValidationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(ValidationMode::Strict),
            "lenient" | "compat" => Some(ValidationMode::Lenient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BetError {
    #[error("unknown bet type {0:?}")]
    UnknownBetType(String),
    #[error("odds/stake not finite")]
    NonFinite,
    #[error("stake {0} is not positive")]
    NonPositiveStake(f64),
    #[error("odds {0} not above 1")]
    OddsNotAboveOne(f64),
    #[error("selection {0:?} not in market")]
    UnknownSelection(String),
}

impl BetError {
    /// Label metrics
    pub fn reason(&self) -> &'static str {
        match self {
            BetError::UnknownBetType(_) => "unknown_bet_type",
            BetError::NonFinite => "non_finite",
            BetError::NonPositiveStake(_) => "non_positive_stake",
            BetError::OddsNotAboveOne(_) => "odds_not_above_one",
            BetError::UnknownSelection(_) => "unknown_selection",
        }
    }

    fn is_hard(&self) -> bool {
        matches!(self, BetError::UnknownBetType(_) | BetError::NonFinite)
    }
}

fn check(raw: &RawBet, known: &AHashSet<&str>) -> (Option<BetType>, Vec<BetError>) {
    let mut errs = Vec::new();

    // 1) bet type harus BACK / LAY
    let bet_type = BetType::parse(&raw.bet_type);
    if bet_type.is_none() {
        errs.push(BetError::UnknownBetType(raw.bet_type.clone()));
    }

    // 2) angka
    if !raw.odds.is_finite() || !raw.stake.is_finite() {
        errs.push(BetError::NonFinite);
    } else {
        if raw.stake <= 0.0 {
            errs.push(BetError::NonPositiveStake(raw.stake));
        }
        if raw.odds <= 1.0 {
            errs.push(BetError::OddsNotAboveOne(raw.odds));
        }
    }

    // 3) selection ada di market
    if !known.contains(raw.selection_id.as_str()) {
        errs.push(BetError::UnknownSelection(raw.selection_id.clone()));
    }

    (bet_type, errs)
}

/// Convert one raw bet, returning the first blocking error for `mode`.
pub fn validate(raw: &RawBet, known: &AHashSet<&str>, mode: ValidationMode) -> Result<Bet, BetError> {
    let (bet_type, errs) = check(raw, known);

    let mut soft = Vec::new();
    for e in errs {
        if e.is_hard() || mode == ValidationMode::Strict {
            return Err(e);
        }
        soft.push(e);
    }
    for e in &soft {
        warn!(bet_id = ?raw.bet_id, selection = %raw.selection_id, reason = e.reason(), "degenerate bet passed through: {e}");
    }

    match bet_type {
        Some(bet_type) => Ok(Bet::new(raw.selection_id.clone(), bet_type, raw.odds, raw.stake)),
        None => Err(BetError::UnknownBetType(raw.bet_type.clone())),
    }
}

#[derive(Debug, Default)]
pub struct Screened {
    pub accepted: Vec<Bet>,
    pub rejected: Vec<(RawBet, BetError)>,
}

pub fn screen(raws: &[RawBet], selections: &[Selection], mode: ValidationMode) -> Screened {
    let known: AHashSet<&str> = selections.iter().map(|s| s.as_str()).collect();
    let mut out = Screened::default();
    for raw in raws {
        match validate(raw, &known, mode) {
            Ok(bet) => out.accepted.push(bet),
            Err(e) => out.rejected.push((raw.clone(), e)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn raw(sel: &str, ty: &str, odds: f64, stake: f64) -> RawBet {
        RawBet { bet_id: None, selection_id: sel.into(), bet_type: ty.into(), odds, stake }
    }

    fn known() -> AHashSet<&'static str> {
        ["A", "B"].into_iter().collect()
    }

    #[rstest]
    #[case(ValidationMode::Strict)]
    #[case(ValidationMode::Lenient)]
    fn test_valid_bet_accepted(#[case] mode: ValidationMode) {
        let bet = validate(&raw("A", "BACK", 2.0, 10.0), &known(), mode).unwrap();
        assert_eq!(bet, Bet::back("A", 2.0, 10.0));
    }

    #[rstest]
    #[case(ValidationMode::Strict)]
    #[case(ValidationMode::Lenient)]
    fn test_unknown_bet_type_always_rejected(#[case] mode: ValidationMode) {
        let err = validate(&raw("A", "EACH_WAY", 2.0, 10.0), &known(), mode).unwrap_err();
        assert_eq!(err, BetError::UnknownBetType("EACH_WAY".into()));
        assert_eq!(err.reason(), "unknown_bet_type");
    }

    #[rstest]
    #[case(ValidationMode::Strict, "back")]
    #[case(ValidationMode::Lenient, "back")]
    #[case(ValidationMode::Strict, " BACK ")]
    #[case(ValidationMode::Lenient, "Lay")]
    fn test_bet_type_case_and_spacing_rejected(#[case] mode: ValidationMode, #[case] tag: &str) {
        let err = validate(&raw("A", tag, 2.0, 10.0), &known(), mode).unwrap_err();
        assert_eq!(err, BetError::UnknownBetType(tag.to_string()));
    }

    #[rstest]
    #[case(ValidationMode::Strict)]
    #[case(ValidationMode::Lenient)]
    fn test_non_finite_always_rejected(#[case] mode: ValidationMode) {
        let err = validate(&raw("A", "LAY", f64::NAN, 10.0), &known(), mode).unwrap_err();
        assert_eq!(err, BetError::NonFinite);
    }

    #[rstest]
    #[case(raw("A", "BACK", 1.0, 10.0), BetError::OddsNotAboveOne(1.0))]
    #[case(raw("A", "BACK", 2.0, 0.0), BetError::NonPositiveStake(0.0))]
    #[case(raw("A", "LAY", 2.0, -5.0), BetError::NonPositiveStake(-5.0))]
    #[case(raw("Z", "LAY", 2.0, 5.0), BetError::UnknownSelection("Z".into()))]
    fn test_strict_rejects_degenerate(#[case] input: RawBet, #[case] expected: BetError) {
        assert_eq!(validate(&input, &known(), ValidationMode::Strict).unwrap_err(), expected);
    }

    #[rstest]
    #[case(raw("A", "BACK", 1.0, 10.0))]
    #[case(raw("A", "BACK", 2.0, 0.0))]
    #[case(raw("Z", "LAY", 2.0, 5.0))]
    fn test_lenient_passes_degenerate(#[case] input: RawBet) {
        let bet = validate(&input, &known(), ValidationMode::Lenient).unwrap();
        assert_eq!(bet.selection_id, input.selection_id);
        assert_eq!(bet.odds, input.odds);
        assert_eq!(bet.stake, input.stake);
    }

    #[rstest]
    fn test_screen_splits_batch() {
        let sels = vec!["A".to_string(), "B".to_string()];
        let raws = vec![raw("A", "BACK", 2.0, 10.0), raw("B", "???", 2.0, 10.0), raw("B", "LAY", 3.0, 1.0)];
        let out = screen(&raws, &sels, ValidationMode::Lenient);
        assert_eq!(out.accepted.len(), 2);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].0.bet_type, "???");
    }

    #[rstest]
    #[case("STRICT", Some(ValidationMode::Strict))]
    #[case("lenient", Some(ValidationMode::Lenient))]
    #[case("compat", Some(ValidationMode::Lenient))]
    #[case("loose", None)]
    fn test_mode_parse(#[case] input: &str, #[case] expected: Option<ValidationMode>) {
        assert_eq!(ValidationMode::parse(input), expected);
    }
}
