// ===============================
// src/positions.rs (exposure per selection)
// ===============================
//
// Posisi = net P/L kalau selection tersebut yang menang, dijumlah dari semua bet.
//   BACK on X: +(odds-1)*stake for X, -stake for every other selection
//   LAY  on X: -(odds-1)*stake for X, +stake for every other selection
//
// Setiap batch dihitung ulang dari nol (full replace), tidak ada state inkremental.
//

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{now_ns, Bet, BetType, Event, PositionMap, PositionSnapshot, RawBet, Rejection, Selection};
use crate::metrics::Metrics;
use crate::risk::{self, ValidationMode};

/// Every distinct selection mapped to 0, first-seen order. Duplicates collapse.
pub fn initialize_positions<S: AsRef<str>>(selections: &[S]) -> PositionMap {
    let mut out = PositionMap::with_capacity(selections.len());
    for s in selections {
        out.entry(s.as_ref().to_string()).or_insert(0.0);
    }
    out
}

/// Contribution of one bet to the position of `selection_id`, assuming that
/// selection wins.
pub fn position_for_bet(bet: &Bet, selection_id: &str) -> f64 {
    let on_bet = selection_id == bet.selection_id;
    match bet.bet_type {
        BetType::Back if on_bet => (bet.odds - 1.0) * bet.stake,
        BetType::Back => -bet.stake,
        BetType::Lay if on_bet => -(bet.odds - 1.0) * bet.stake,
        BetType::Lay => bet.stake,
    }
}

/// Net position for every selection across all bets. Bets on selections that
/// are not in `selections` still move every listed selection by their
/// "loses" leg; no validation happens here.
pub fn calculate_positions<S: AsRef<str>>(selections: &[S], bets: &[Bet]) -> PositionMap {
    let mut positions = initialize_positions(selections);
    for bet in bets {
        for (selection, pos) in positions.iter_mut() {
            *pos += position_for_bet(bet, selection);
        }
    }
    positions
}

/// Largest loss across outcomes (market liability).
pub fn worst_case(positions: &PositionMap) -> Option<f64> {
    positions.values().copied().reduce(f64::min)
}

pub fn best_case(positions: &PositionMap) -> Option<f64> {
    positions.values().copied().reduce(f64::max)
}

pub struct PositionsTask {
    market_id: String,
    selections: Vec<Selection>,
    mode: ValidationMode,
}

impl PositionsTask {
    pub fn new(market_id: String, selections: Vec<Selection>, mode: ValidationMode) -> Self {
        Self { market_id, selections, mode }
    }

    /// Screen a full batch and compute a fresh snapshot from it.
    pub fn on_batch(&self, raws: &[RawBet], ts_ns: i128) -> (PositionSnapshot, Vec<Rejection>) {
        let screened = risk::screen(raws, &self.selections, self.mode);
        let positions = calculate_positions(&self.selections, &screened.accepted);

        let rejections: Vec<Rejection> = screened
            .rejected
            .into_iter()
            .map(|(bet, err)| Rejection {
                ts_ns,
                market_id: self.market_id.clone(),
                bet,
                kind: err.reason().to_string(),
                reason: err.to_string(),
            })
            .collect();

        let snap = PositionSnapshot {
            ts_ns,
            market_id: self.market_id.clone(),
            worst_case: worst_case(&positions),
            best_case: best_case(&positions),
            positions,
            bet_count: screened.accepted.len(),
            rejected: rejections.len(),
        };
        (snap, rejections)
    }
}

pub async fn run(
    task: PositionsTask,
    mut batch_rx: watch::Receiver<Vec<RawBet>>,
    snap_tx: watch::Sender<PositionSnapshot>,
    rec_tx: Option<mpsc::Sender<Event>>,
    metrics: Arc<Metrics>,
) {
    info!(market = %task.market_id, selections = ?task.selections, mode = ?task.mode, "positions: started");

    while batch_rx.changed().await.is_ok() {
        let batch = batch_rx.borrow_and_update().clone();
        metrics.bets_received.inc_by(batch.len() as u64);

        let (snap, rejections) = metrics.perf.time("calculate_positions", || task.on_batch(&batch, now_ns()));

        for r in &rejections {
            metrics.reject(&r.kind);
            warn!(market = %r.market_id, bet_id = ?r.bet.bet_id, selection = %r.bet.selection_id, reason = %r.reason, "bet rejected");
        }
        metrics.observe_snapshot(&snap);
        debug!(market = %snap.market_id, bets = snap.bet_count, rejected = snap.rejected, worst = ?snap.worst_case, "positions recalculated");

        if let Some(tx) = &rec_tx {
            for r in rejections {
                let _ = tx.try_send(Event::Rejected(r));
            }
            let _ = tx.try_send(Event::Snapshot(snap.clone()));
        }
        if snap_tx.send(snap).is_err() {
            // semua receiver sudah drop
            break;
        }
    }
    info!(market = %task.market_id, "positions: feed closed, stopped");
}
