// ===============================
// src/feed.rs
// ===============================
//
// Bet sources:
// - run_file : poll file JSON berisi daftar bet (full list tiap kali)
// - run_mock : generator bet random, list bertambah satu bet per interval,
//              dibatasi `max_bets` terakhir
//
// Setiap publish = batch lengkap (full replace), bukan delta.
//
// Bentuk response yang dikenal (lihat `BetsEnvelope`):
//   [ {...}, ... ]
//   { "data": [ ... ] }
//   { "data": { "bets": [ ... ] } }
//   { "bets": [ ... ] }
//
// Satu bet yang rusak (field hilang / tipe salah) menggagalkan seluruh payload:
// error dicatat beserta bentuk payload-nya, dan batch sebelumnya tetap berlaku.
//

use rand::Rng;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use crate::domain::{BetType, RawBet, Selection};
use crate::metrics::Metrics;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("read {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("unrecognized bets payload ({shape}): {source}")]
    Parse { shape: String, source: serde_json::Error },
}

#[derive(Debug, Deserialize)]
pub struct BetList {
    pub bets: Vec<RawBet>,
}

/// Every response shape the bet API is known to return. Variant order
/// matters for the untagged match: `data` as array before `data` as object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BetsEnvelope {
    Bare(Vec<RawBet>),
    Data { data: Vec<RawBet> },
    NestedData { data: BetList },
    Bets { bets: Vec<RawBet> },
}

impl BetsEnvelope {
    pub fn normalize(self) -> Vec<RawBet> {
        match self {
            BetsEnvelope::Bare(bets)
            | BetsEnvelope::Data { data: bets }
            | BetsEnvelope::NestedData { data: BetList { bets } }
            | BetsEnvelope::Bets { bets } => bets,
        }
    }
}

/// Short description of a payload's top level, for error logs.
pub fn payload_shape(text: &str) -> String {
    use serde_json::Value;
    match serde_json::from_str::<Value>(text) {
        Err(_) => "not json".to_string(),
        Ok(Value::Array(items)) => format!("array[{}]", items.len()),
        Ok(Value::Object(map)) => {
            let keys: Vec<String> = map
                .iter()
                .map(|(k, v)| match v {
                    Value::Array(a) => format!("{k}:array[{}]", a.len()),
                    Value::Object(_) => format!("{k}:object"),
                    _ => k.clone(),
                })
                .collect();
            format!("object{{{}}}", keys.join(","))
        }
        Ok(other) => format!("scalar {other}"),
    }
}

pub fn parse_bets(text: &str) -> Result<Vec<RawBet>, FeedError> {
    let env: BetsEnvelope = serde_json::from_str(text)
        .map_err(|source| FeedError::Parse { shape: payload_shape(text), source })?;
    Ok(env.normalize())
}

pub async fn load_file(path: &Path) -> Result<Vec<RawBet>, FeedError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FeedError::Io { path: path.to_path_buf(), source })?;
    parse_bets(&text)
}

/// Exponential backoff + jitter: 0.5s, 1s, 2s, ... capped at 32s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.min(6);                  // 0..=6
    let factor = 1u64 << shift;                  // 1,2,4,...,64
    let base_ms = 500u64.saturating_mul(factor); // 0.5s..32s
    let jitter = rand::thread_rng().gen_range(0..=250);
    Duration::from_millis(base_ms + jitter)
}

/// Poll `path` and publish the whole bet list each time it parses.
/// On failure the last good batch stays in effect.
pub async fn run_file(
    tx: watch::Sender<Vec<RawBet>>,
    path: PathBuf,
    every: Duration,
    metrics: Arc<Metrics>,
) {
    info!(path = %path.display(), every_ms = every.as_millis() as u64, "file feed: started");
    let mut attempt: u32 = 0;
    loop {
        match load_file(&path).await {
            Ok(batch) => {
                attempt = 0;
                if tx.send(batch).is_err() {
                    info!("file feed: no consumers left, stopped");
                    return;
                }
                sleep(every).await;
            }
            Err(e) => {
                metrics.feed_errors.inc();
                let delay = backoff_delay(attempt);
                error!(error = %e, retry_ms = delay.as_millis() as u64, "file feed: load failed");
                attempt = attempt.saturating_add(1);
                sleep(delay).await;
            }
        }
    }
}

pub fn mock_bet<R: Rng>(rng: &mut R, selections: &[Selection], seq: u64) -> RawBet {
    let selection_id = if selections.is_empty() {
        "?".to_string()
    } else {
        selections[rng.gen_range(0..selections.len())].clone()
    };
    let bet_type = if rng.gen_bool(0.5) { BetType::Back } else { BetType::Lay };
    // 2 desimal, seperti harga exchange
    let odds = (rng.gen_range(1.2..10.0_f64) * 100.0).round() / 100.0;
    let stake = rng.gen_range(1..=100) as f64;
    RawBet {
        bet_id: Some(format!("MOCK-{seq}")),
        selection_id,
        bet_type: bet_type.as_str().to_string(),
        odds,
        stake,
    }
}

pub fn mock_batch(selections: &[Selection], n: usize) -> Vec<RawBet> {
    let mut rng = rand::thread_rng();
    (0..n as u64).map(|i| mock_bet(&mut rng, selections, i)).collect()
}

/// Append `bet`, dropping the oldest entries beyond `max`.
pub fn push_window(bets: &mut VecDeque<RawBet>, bet: RawBet, max: usize) {
    bets.push_back(bet);
    while bets.len() > max {
        bets.pop_front();
    }
}

/// Generator bet mock: satu bet baru per interval, publish window terakhir.
pub async fn run_mock(
    tx: watch::Sender<Vec<RawBet>>,
    selections: Vec<Selection>,
    every: Duration,
    max_bets: usize,
) {
    info!(selections = ?selections, max_bets, "mock feed: started");
    let mut bets: VecDeque<RawBet> = VecDeque::with_capacity(max_bets);
    let mut seq: u64 = 0;
    loop {
        // jangan simpan ThreadRng melewati .await
        let bet = mock_bet(&mut rand::thread_rng(), &selections, seq);
        seq += 1;
        push_window(&mut bets, bet, max_bets);
        if tx.send(bets.iter().cloned().collect()).is_err() {
            info!("mock feed: no consumers left, stopped");
            return;
        }
        sleep(every).await;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use std::io::Write;

    use super::*;

    const ONE: &str = r#"{"selectionId":"A","betType":"BACK","odds":2.0,"stake":100}"#;

    #[rstest]
    #[case(format!("[{ONE}]"))]
    #[case(format!(r#"{{"data":[{ONE}]}}"#))]
    #[case(format!(r#"{{"success":true,"data":{{"bets":[{ONE}]}}}}"#))]
    #[case(format!(r#"{{"bets":[{ONE}],"total":1}}"#))]
    fn test_known_envelopes_normalize(#[case] payload: String) {
        let bets = parse_bets(&payload).unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].selection_id, "A");
        assert_eq!(bets[0].bet_type, "BACK");
    }

    #[rstest]
    #[case("[]", 0)]
    #[case(r#"{"data":[]}"#, 0)]
    fn test_empty_lists(#[case] payload: &str, #[case] expected: usize) {
        assert_eq!(parse_bets(payload).unwrap().len(), expected);
    }

    #[rstest]
    #[case(r#"{"items":[]}"#)]
    #[case(r#"{"data":"nope"}"#)]
    #[case("not json")]
    fn test_unknown_shape_is_error(#[case] payload: &str) {
        assert!(matches!(parse_bets(payload), Err(FeedError::Parse { .. })));
    }

    #[rstest]
    #[case("not json", "not json")]
    #[case(r#"{"data":"nope"}"#, "object{data}")]
    #[case(r#"[{"selectionId":"A"}]"#, "array[1]")]
    fn test_parse_error_reports_shape(#[case] payload: &str, #[case] shape: &str) {
        let err = parse_bets(payload).unwrap_err();
        assert!(err.to_string().contains(shape), "{err}");
    }

    #[rstest]
    fn test_one_bad_bet_fails_whole_payload() {
        let payload = format!(r#"{{"data":{{"bets":[{ONE},{{"selectionId":"B","betType":"LAY"}}]}}}}"#);
        let err = parse_bets(&payload).unwrap_err();
        assert!(err.to_string().contains("object{data:object}"), "{err}");
    }

    #[rstest]
    fn test_backoff_is_capped() {
        assert!(backoff_delay(0) >= Duration::from_millis(500));
        assert!(backoff_delay(0) <= Duration::from_millis(750));
        let capped = backoff_delay(100);
        assert!(capped >= Duration::from_millis(32_000));
        assert!(capped <= Duration::from_millis(32_250));
    }

    #[rstest]
    fn test_mock_batch_uses_known_selections() {
        let sels = vec!["home".to_string(), "away".to_string()];
        let batch = mock_batch(&sels, 50);
        assert_eq!(batch.len(), 50);
        for b in &batch {
            assert!(sels.contains(&b.selection_id));
            assert!(BetType::parse(&b.bet_type).is_some());
            assert!(b.odds >= 1.2 && b.odds <= 10.0);
            assert!(b.stake >= 1.0 && b.stake <= 100.0);
        }
        assert_eq!(batch[49].bet_id.as_deref(), Some("MOCK-49"));
    }

    #[tokio::test]
    async fn test_load_file_missing_is_io_error() {
        let err = load_file(Path::new("/definitely/not/here.json")).await.unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
    }

    #[tokio::test]
    async fn test_run_file_publishes_full_batch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"data":[{ONE},{ONE}]}}"#).unwrap();

        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, mut rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(run_file(tx, file.path().to_path_buf(), Duration::from_millis(10), metrics.clone()));

        tokio::time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();
        assert_eq!(rx.borrow_and_update().len(), 2);
        assert_eq!(metrics.feed_errors.get(), 0);
        handle.abort();
    }

    #[rstest]
    fn test_push_window_drops_oldest() {
        let sels = vec!["A".to_string()];
        let mut rng = rand::thread_rng();
        let mut bets = VecDeque::new();
        for seq in 0..10 {
            push_window(&mut bets, mock_bet(&mut rng, &sels, seq), 3);
        }
        let ids: Vec<_> = bets.iter().filter_map(|b| b.bet_id.clone()).collect();
        assert_eq!(ids, vec!["MOCK-7", "MOCK-8", "MOCK-9"]);
    }

    #[tokio::test]
    async fn test_run_mock_stays_within_window() {
        let (tx, mut rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(run_mock(tx, vec!["A".into()], Duration::from_millis(1), 2));
        for _ in 0..5 {
            tokio::time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();
            assert!(rx.borrow_and_update().len() <= 2);
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_run_mock_grows_list() {
        let (tx, mut rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(run_mock(tx, vec!["A".into()], Duration::from_millis(5), 100));

        tokio::time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();
        let first = rx.borrow_and_update().len();
        tokio::time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();
        let second = rx.borrow_and_update().len();
        assert!(second > first);
        handle.abort();
    }
}
