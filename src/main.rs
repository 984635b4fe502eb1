// ===============================
// src/main.rs
// ===============================
/*
 # satu snapshot dari file, print JSON
 SELECTIONS=home,draw,away cargo run -- --once --bets-file bets.json

 # mode service (mock feed) + cek metrics
 SELECTIONS=home,draw,away cargo run
 curl -s localhost:9898/metrics | grep '^position'
*/
/*
=============================================================================
Project : exposure_desk — back/lay exposure calculator & dashboard feed
Module  : <module_name>.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Reads back/lay bets for one market (mock generator or polled JSON
          file), validates them, recomputes the net position per selection
          on every batch, exposes Prometheus metrics, and records JSONL
          snapshots.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
mod domain;
mod config;
mod metrics;
mod recorder;
mod feed;
mod risk;
mod positions;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::{
    select,
    sync::{mpsc, watch},
    time::Duration,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, FeedMode};
use crate::domain::{now_ns, Event, PositionSnapshot, RawBet};
use crate::metrics::Metrics;
use crate::positions::PositionsTask;

const ONCE_MOCK_BETS: usize = 20;

async fn run_once(args: &Args) -> Result<(), String> {
    let batch: Vec<RawBet> = match args.feed_mode {
        FeedMode::Mock => feed::mock_batch(&args.selections, ONCE_MOCK_BETS),
        FeedMode::File => {
            let path = args.bets_file.as_deref().ok_or("no bets file configured")?;
            feed::load_file(path).await.map_err(|e| e.to_string())?
        }
    };
    let task = PositionsTask::new(args.market_id.clone(), args.selections.clone(), args.validation);
    let (snap, rejections) = task.on_batch(&batch, now_ns());
    for r in &rejections {
        info!(bet_id = ?r.bet.bet_id, selection = %r.bet.selection_id, reason = %r.reason, "bet rejected");
    }
    let json = serde_json::to_string_pretty(&snap).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // ---- Load config ----
    let cli = config::Cli::parse();
    let args = match config::load(&cli) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        market = %args.market_id,
        selections = ?args.selections,
        feed_mode = args.feed_mode.as_str(),
        bets_file = ?args.bets_file,
        validation = ?args.validation,
        poll_ms = args.poll_interval.as_millis() as u64,
        mock_max_bets = args.mock_max_bets,
        once = args.once,
        "startup config"
    );

    if args.once {
        return match run_once(&args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "one-shot calculation failed");
                ExitCode::FAILURE
            }
        };
    }

    // ---- Metrics ----
    let metrics = match Metrics::new() {
        Ok(m) => Arc::new(m),
        Err(e) => {
            error!(?e, "metrics registry init failed");
            return ExitCode::FAILURE;
        }
    };
    metrics::serve_metrics(metrics.clone(), args.metrics_port);

    // ---- Recorder (optional) ----
    let rec_tx = args.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel::<Event>(8192);
        tokio::spawn(recorder::run(rx, path));
        let _ = tx.try_send(Event::Note(format!(
            "started market={} selections={} validation={:?}",
            args.market_id,
            args.selections.join(","),
            args.validation
        )));
        tx
    });

    // ---- Buses ----
    let (batch_tx, batch_rx) = watch::channel::<Vec<RawBet>>(Vec::new());
    let (snap_tx, mut snap_rx) = watch::channel::<PositionSnapshot>(PositionSnapshot {
        market_id: args.market_id.clone(),
        positions: positions::initialize_positions(&args.selections),
        ..Default::default()
    });

    // ---- FEED (bets) ----
    match (&args.feed_mode, args.bets_file.clone()) {
        (FeedMode::File, Some(path)) => {
            tokio::spawn(feed::run_file(batch_tx, path, args.poll_interval, metrics.clone()));
        }
        _ => {
            tokio::spawn(feed::run_mock(
                batch_tx,
                args.selections.clone(),
                args.poll_interval,
                args.mock_max_bets,
            ));
        }
    }

    // ---- Positions ----
    let task = PositionsTask::new(args.market_id.clone(), args.selections.clone(), args.validation);
    let positions_handle = tokio::spawn(positions::run(task, batch_rx, snap_tx, rec_tx, metrics.clone()));

    // ---- Heartbeat ----
    let mut beat = tokio::time::interval(Duration::from_secs(5));
    let mut recalcs: u64 = 0;
    loop {
        select! {
            changed = snap_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                recalcs += 1;
            },
            _ = beat.tick() => {
                let snap = snap_rx.borrow().clone();
                info!(
                    recalcs,
                    recalcs_total = metrics.perf.count("calculate_positions"),
                    bets = snap.bet_count,
                    rejected = snap.rejected,
                    worst = ?snap.worst_case,
                    best = ?snap.best_case,
                    positions = ?snap.positions,
                    "heartbeat"
                );
                recalcs = 0;
            }
        }
    }

    let _ = positions_handle.await;
    info!("positions task ended, shutting down");
    ExitCode::SUCCESS
}
