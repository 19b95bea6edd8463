use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::models::position::{TradeEvent, TradeEventKind};

/// Receives trade events as they happen. Delivery is best-effort: the
/// Account logs and swallows publish failures so alerting/persistence
/// hiccups never touch committed state.
pub trait TradeEventSink: Send {
    fn publish(&mut self, event: &TradeEvent) -> Result<()>;
}

/// Logs each event through tracing, in place of a live alert channel.
pub struct LogSink;

impl TradeEventSink for LogSink {
    fn publish(&mut self, event: &TradeEvent) -> Result<()> {
        let pos = &event.position;
        match event.kind {
            TradeEventKind::Open => info!(
                "📈 OPEN {} [{}] size {:.2} @ {:.8}",
                pos.symbol, pos.strategy, pos.initial_size, pos.entry_value
            ),
            TradeEventKind::PartialClose => info!(
                "💰 PARTIAL {} [{}] sold {:.1}% @ {:.8} - realized {:.2}",
                pos.symbol,
                pos.strategy,
                event.fraction_sold.unwrap_or(0.0) * 100.0,
                pos.last_value,
                pos.realized_pnl
            ),
            TradeEventKind::Close => info!(
                "🏁 CLOSE {} [{}] {} - realized {:.2}",
                pos.symbol,
                pos.strategy,
                event.reason.as_deref().unwrap_or("?"),
                pos.realized_pnl
            ),
        }
        Ok(())
    }
}

/// Appends each event as one JSON line, the audit-trail counterpart of the
/// alerting sink.
pub struct JsonlEventLog {
    path: PathBuf,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TradeEventSink for JsonlEventLog {
    fn publish(&mut self, event: &TradeEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating event log directory {:?}", parent))?;
            }
        }
        let line = serde_json::to_string(event).context("serializing trade event")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening event log {:?}", self.path))?;
        writeln!(file, "{}", line).context("writing trade event")?;
        Ok(())
    }
}

/// Fan events out to every registered sink, logging failures.
pub fn publish_all(sinks: &mut [Box<dyn TradeEventSink>], event: &TradeEvent) {
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.publish(event) {
            warn!("Trade event sink failed (ignored): {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::position::Position;
    use crate::models::signal::{Signal, TokenId};
    use chrono::{TimeZone, Utc};

    fn sample_event() -> TradeEvent {
        let signal = Signal {
            token_id: TokenId::new("solana", "MemeMint1111"),
            symbol: "MEME".to_string(),
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            composite_score: 90.0,
            reference_value: 0.004,
        };
        let pos = Position::open(&signal, "test", 10.0, 0.15);
        TradeEvent {
            kind: TradeEventKind::Open,
            timestamp: signal.observed_at,
            position: pos,
            fraction_sold: None,
            reason: None,
        }
    }

    #[test]
    fn test_jsonl_log_appends_parseable_lines() {
        let dir = std::env::temp_dir().join(format!("degen-sim-test-{}", std::process::id()));
        let path = dir.join("events.jsonl");
        let mut sink = JsonlEventLog::new(&path);

        sink.publish(&sample_event()).unwrap();
        sink.publish(&sample_event()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: TradeEvent = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.kind, TradeEventKind::Open);
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_publish_all_swallows_failures() {
        struct FailingSink;
        impl TradeEventSink for FailingSink {
            fn publish(&mut self, _event: &TradeEvent) -> Result<()> {
                anyhow::bail!("sink down")
            }
        }
        let mut sinks: Vec<Box<dyn TradeEventSink>> = vec![Box::new(FailingSink), Box::new(LogSink)];
        // Must not panic or propagate
        publish_all(&mut sinks, &sample_event());
    }
}
