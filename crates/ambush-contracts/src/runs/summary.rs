use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub compartments: u64,
    pub scan_fallbacks: u64,
    pub plan_generated: bool,
    pub visuals_rendered: u64,
}

pub fn write_summary(
    path: &Path,
    summary: &RunSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}
