//! Per-project rule hits emitted while scoring, for explaining a month's score.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex};

use serde::{Deserialize, Serialize};

use super::rules::RuleKind;
use crate::month::MonthKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub month: MonthKey,
    pub kam: String,
    pub project_id: String,
    pub rule: RuleKind,
    /// Amount fed into the tally: a count, tons, or penalty points depending on `rule`.
    pub quantity: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
    #[error("trace buffer poisoned")]
    Poisoned,
}

pub trait ScoreTraceSink: Send + Sync {
    fn record(&self, event: ScoreEvent) -> Result<(), TraceError>;
}

/// Streams events to a JSONL file from a background thread.
#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<ScoreEvent>,
}

/// Owns the writer thread behind a [`JsonlTraceSink`].
pub struct TraceWorker {
    writer: std::thread::JoinHandle<Result<usize, TraceError>>,
}

impl TraceWorker {
    /// Lines written. Drop every sink clone first.
    pub fn join(self) -> Result<usize, TraceError> {
        self.writer
            .join()
            .map_err(|_| TraceError::Join("trace writer panicked".to_string()))?
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let out = BufWriter::new(std::fs::File::create(path)?);
        let (sender, events) = mpsc::channel::<ScoreEvent>();
        let writer = std::thread::spawn(move || write_events(out, events));
        Ok((Self { sender }, TraceWorker { writer }))
    }
}

impl ScoreTraceSink for JsonlTraceSink {
    fn record(&self, event: ScoreEvent) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_events(
    mut out: BufWriter<std::fs::File>,
    events: mpsc::Receiver<ScoreEvent>,
) -> Result<usize, TraceError> {
    let mut lines = 0usize;
    for event in events {
        serde_json::to_writer(&mut out, &event).map_err(|e| TraceError::Serde(e.to_string()))?;
        out.write_all(b"\n")?;
        lines += 1;
    }
    out.flush()?;
    Ok(lines)
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<ScoreEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScoreEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ScoreTraceSink for MemoryTraceSink {
    fn record(&self, event: ScoreEvent) -> Result<(), TraceError> {
        self.events
            .lock()
            .map_err(|_| TraceError::Poisoned)?
            .push(event);
        Ok(())
    }
}
