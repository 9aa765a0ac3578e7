use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Run event log.
///
/// Every event carries `type`, `run_id` and `ts`; the caller payload is merged
/// last and may override them. File sinks append one compact JSON object per
/// line (`events.jsonl`), memory sinks keep the events for the web view.
/// Each emission is mirrored to `tracing` at debug level.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    sink: EventSink,
    run_id: String,
    lock: Mutex<Vec<Value>>,
}

#[derive(Debug, Clone)]
enum EventSink {
    File(PathBuf),
    Memory,
}

impl EventWriter {
    pub fn to_file(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::File(path.into()), run_id.into())
    }

    pub fn in_memory(run_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::Memory, run_id.into())
    }

    fn with_sink(sink: EventSink, run_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                sink,
                run_id,
                lock: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.inner.sink {
            EventSink::File(path) => Some(path.as_path()),
            EventSink::Memory => None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "run_id".to_string(),
            Value::String(self.inner.run_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let line = serde_json::to_string(&event)?;
        tracing::debug!(run_id = %self.inner.run_id, event = %line, "run event");

        let mut retained = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        match &self.inner.sink {
            EventSink::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            EventSink::Memory => retained.push(Value::Object(event.clone())),
        }

        Ok(Value::Object(event))
    }

    /// Events held by a memory sink, oldest first. File sinks return nothing.
    pub fn retained(&self) -> Vec<Value> {
        self.inner
            .lock
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
