//! Indexing progress reporting for the CLI.
//!
//! `catsync index` drives the tick loop and shows how far it got. Progress
//! goes to **stderr** so the final JSON summary on stdout stays parseable
//! for scripts.

use std::io::Write;

/// A single progress event of an indexing run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// Run started; `total` items are eligible.
    Started { collection: String, total: u64 },
    /// A tick finished. Counts are cumulative for the run.
    Batch {
        collection: String,
        indexed: u64,
        total: u64,
        failed: u64,
    },
}

pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index products_production  1,234 / 5,000 items".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = human_line(&event);
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

fn human_line(event: &IndexProgressEvent) -> String {
    match event {
        IndexProgressEvent::Started { collection, total } => {
            format!("index {}  {} items pending\n", collection, format_number(*total))
        }
        IndexProgressEvent::Batch {
            collection,
            indexed,
            total,
            failed,
        } => {
            let mut line = format!(
                "index {}  {} / {} items",
                collection,
                format_number(*indexed),
                format_number(*total)
            );
            if *failed > 0 {
                line.push_str(&format!("  ({} failed)", format_number(*failed)));
            }
            line.push('\n');
            line
        }
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        if let Ok(line) = serde_json::to_string(&json_event(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn json_event(event: &IndexProgressEvent) -> serde_json::Value {
    match event {
        IndexProgressEvent::Started { collection, total } => serde_json::json!({
            "event": "progress",
            "collection": collection,
            "phase": "started",
            "total": total
        }),
        IndexProgressEvent::Batch {
            collection,
            indexed,
            total,
            failed,
        } => serde_json::json!({
            "event": "progress",
            "collection": collection,
            "phase": "indexing",
            "n": indexed,
            "total": total,
            "failed": failed
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn human_line_shows_failures_only_when_present() {
        let clean = IndexProgressEvent::Batch {
            collection: "products_production".to_string(),
            indexed: 1234,
            total: 5000,
            failed: 0,
        };
        assert_eq!(
            human_line(&clean),
            "index products_production  1,234 / 5,000 items\n"
        );

        let failing = IndexProgressEvent::Batch {
            collection: "p".to_string(),
            indexed: 10,
            total: 12,
            failed: 2,
        };
        assert!(human_line(&failing).contains("(2 failed)"));
    }

    #[test]
    fn json_event_shape() {
        let value = json_event(&IndexProgressEvent::Started {
            collection: "p".to_string(),
            total: 7,
        });
        assert_eq!(value["phase"], "started");
        assert_eq!(value["total"], 7);
    }

    #[test]
    fn progress_mode_parse() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("verbose"), None);
    }
}
