use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// JSON-lines run journal. Clones share one file.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger").finish_non_exhaustive()
    }
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    fn state(&self) -> MutexGuard<'_, DebugState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes one event; `event` is stored under `"type"`.
    pub fn log_event(&self, event: &str, fields: Value) {
        let mut line = json!({ "type": event });
        if let (Some(line), Value::Object(fields)) = (line.as_object_mut(), fields) {
            line.extend(fields);
        }
        let mut state = self.state();
        let _ = writeln!(state.writer, "{line}");
    }

    pub fn increment(&self, key: &str, amount: u64) {
        let mut state = self.state();
        let entry = state.counters.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Writes the accumulated counters as a `debug.summary` line and resets them.
    pub fn emit_summary(&self, context: &str) {
        let mut state = self.state();
        let counts = std::mem::take(&mut state.counters);
        let line = json!({
            "type": "debug.summary",
            "context": context,
            "counts": counts,
        });
        let _ = writeln!(state.writer, "{line}");
    }

    pub fn flush(&self) {
        let _ = self.state().writer.flush();
    }
}
