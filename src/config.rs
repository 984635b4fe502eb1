// ===============================
// src/config.rs
// ===============================
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
use clap::Parser;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::domain::Selection;
use crate::risk::ValidationMode;

#[derive(Debug, Parser)]
#[command(name = "exposure_desk", version, about = "Net back/lay position per selection")]
pub struct Cli {
    /// Compute one snapshot, print it as JSON, exit
    #[arg(long)]
    pub once: bool,

    /// Read bets from this JSON file (overrides BETS_FILE, forces file mode)
    #[arg(long, value_name = "PATH")]
    pub bets_file: Option<PathBuf>,
}

/// Sumber bet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMode {
    Mock,
    File,
}

impl FeedMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(FeedMode::Mock),
            "file" => Some(FeedMode::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { FeedMode::Mock => "mock", FeedMode::File => "file" }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("SELECTIONS is empty")]
    NoSelections,
    #[error("FEED_MODE={0:?} not recognized (mock|file)")]
    FeedMode(String),
    #[error("VALIDATION={0:?} not recognized (strict|lenient)")]
    Validation(String),
    #[error("file feed needs BETS_FILE or --bets-file")]
    MissingBetsFile,
    #[error("POLL_INTERVAL_MS must be > 0")]
    ZeroPollInterval,
    #[error("MOCK_MAX_BETS must be > 0")]
    ZeroMockMaxBets,
}

#[derive(Clone, Debug)]
pub struct Args {
    pub market_id: String,
    pub selections: Vec<Selection>,
    pub feed_mode: FeedMode,
    pub bets_file: Option<PathBuf>,
    pub poll_interval: Duration,
    pub mock_max_bets: usize,
    pub validation: ValidationMode,
    pub record_file: Option<String>,
    pub metrics_port: u16,
    pub once: bool,
}

/// SELECTIONS=home,draw,away -> trimmed, non-empty, order kept
fn parse_list(s: &str) -> Vec<Selection> {
    s.split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

pub fn load(cli: &Cli) -> Result<Args, ConfigError> {
    // Pastikan .env dibaca (agar SELECTIONS, BETS_FILE, dll ter-load)
    let _ = dotenv();
    from_lookup(cli, |k| env::var(k).ok())
}

/// Build `Args` from any key lookup; `load` passes the process environment.
pub fn from_lookup(cli: &Cli, get: impl Fn(&str) -> Option<String>) -> Result<Args, ConfigError> {
    let market_id = get("MARKET_ID").unwrap_or_else(|| "market".to_string());

    let selections = get("SELECTIONS").map(|s| parse_list(&s)).unwrap_or_default();
    if selections.is_empty() {
        return Err(ConfigError::NoSelections);
    }

    let bets_file = cli.bets_file.clone().or_else(|| get("BETS_FILE").map(PathBuf::from));

    let feed_mode = if cli.bets_file.is_some() {
        FeedMode::File
    } else {
        match get("FEED_MODE") {
            Some(m) => FeedMode::parse(&m).ok_or(ConfigError::FeedMode(m))?,
            None => FeedMode::Mock,
        }
    };
    if feed_mode == FeedMode::File && bets_file.is_none() {
        return Err(ConfigError::MissingBetsFile);
    }

    let validation = match get("VALIDATION") {
        Some(v) => ValidationMode::parse(&v).ok_or(ConfigError::Validation(v))?,
        None => ValidationMode::default(),
    };

    let poll_interval = get("POLL_INTERVAL_MS")
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(1000));
    if poll_interval.is_zero() {
        return Err(ConfigError::ZeroPollInterval);
    }

    // window mock feed, bet terlama dibuang
    let mock_max_bets = get("MOCK_MAX_BETS").and_then(|s| s.parse().ok()).unwrap_or(500);
    if mock_max_bets == 0 {
        return Err(ConfigError::ZeroMockMaxBets);
    }

    let record_file = get("RECORD_FILE").filter(|s| !s.trim().is_empty());
    let metrics_port = get("METRICS_PORT").and_then(|s| s.parse().ok()).unwrap_or(9898);

    Ok(Args {
        market_id,
        selections,
        feed_mode,
        bets_file,
        poll_interval,
        mock_max_bets,
        validation,
        record_file,
        metrics_port,
        once: cli.once,
    })
}
