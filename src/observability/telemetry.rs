use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use super::tracing::TraceEvent;

/// Sink for structured trace events. Grounded in the teacher's pluggable
/// `TelemetryExporter` (`src/observability/telemetry.rs`), trimmed to the
/// two sinks this crate actually ships: stdout (for local/dev runs) and a
/// JSON-lines file (for anything downstream that wants to tail it). The
/// teacher's Jaeger/Prometheus/OpenTelemetry exporters are out of scope --
/// this crate has no wire protocol or HTTP surface of its own (spec.md
/// section 6).
pub trait TelemetryExporter: Send + Sync {
    fn export(&self, event: &TraceEvent);
}

/// Discards every event. Useful in tests that only care about the
/// counters in [`super::metrics::MetricsCollector`], not log output.
pub struct NullExporter;

impl TelemetryExporter for NullExporter {
    fn export(&self, _event: &TraceEvent) {}
}

/// Writes one JSON object per line to stdout.
pub struct ConsoleExporter;

impl TelemetryExporter for ConsoleExporter {
    fn export(&self, event: &TraceEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("telemetry: failed to serialize trace event: {e}"),
        }
    }
}

/// Appends one JSON object per line to a file, guarded by a mutex since
/// multiple agents may export concurrently.
pub struct JsonLinesFileExporter {
    file: Mutex<std::fs::File>,
}

impl JsonLinesFileExporter {
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TelemetryExporter for JsonLinesFileExporter {
    fn export(&self, event: &TraceEvent) {
        let Ok(mut line) = serde_json::to_string(event) else {
            return;
        };
        line.push('\n');
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tracing::TraceStatus;
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn sample_event() -> TraceEvent {
        TraceEvent {
            operation: "execute_prompt".to_string(),
            agent_kind: "summarizer".to_string(),
            status: TraceStatus::Ok,
            started_at: chrono::Utc::now(),
            duration: Duration::from_millis(42),
            fields: HashMap::new(),
        }
    }

    #[test]
    fn null_exporter_does_not_panic() {
        NullExporter.export(&sample_event());
    }

    #[test]
    fn file_exporter_appends_one_json_line_per_event() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("agent_substrate_telemetry_test_{}.jsonl", std::process::id()));
        let exporter = JsonLinesFileExporter::open(&path).unwrap();
        exporter.export(&sample_event());
        exporter.export(&sample_event());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("execute_prompt"));

        let _ = std::fs::remove_file(&path);
    }
}
