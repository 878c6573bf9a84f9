use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// JSONL trace of analysis requests, one compact object per line.
///
/// Every event starts with `type`, `request_id` and `ts`; the caller payload
/// is merged on top and may replace them. The file is opened on the first
/// emit and kept open. Clones share the handle, so tile workers can emit
/// from several threads.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<Sink>,
}

#[derive(Debug)]
struct Sink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Sink {
                path: path.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn emit(&self, event_type: &str, request_id: &str, payload: EventPayload) -> Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(event_type));
        event.insert("request_id".to_string(), Value::from(request_id));
        event.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        event.extend(payload);

        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let mut slot = self
            .inner
            .file
            .lock()
            .map_err(|_| anyhow!("event sink lock poisoned"))?;
        let file = match slot.take() {
            Some(file) => file,
            None => open_append(&self.inner.path)?,
        };
        let file = slot.insert(file);
        file.write_all(&line)
            .with_context(|| format!("failed writing {}", self.inner.path.display()))?;

        Ok(Value::Object(event))
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed opening {}", path.display()))
}
