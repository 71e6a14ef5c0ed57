use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metrics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Directory receiving the daily `metrics_<YYYY-MM-DD>.jsonl` files.
    /// Created at startup if missing.
    #[serde(default = "d_log_dir")]
    pub log_dir: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_dir: d_log_dir(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_log_dir() -> String {
    "logs".into()
}
