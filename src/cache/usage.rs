//! Storage usage reporting
//!
//! Informational only: there is no size-based eviction. Activation-time
//! deletion of stale generations is the only thing that ever frees space.

use serde::Serialize;

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Convert MB to bytes
pub fn mb_to_bytes(mb: u32) -> u64 {
    u64::from(mb) * 1024 * 1024
}

/// Usage status relative to a configured quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    /// Under 80% of quota, or no quota configured
    Ok,
    /// Between 80% and 100% of quota
    Warning,
    /// At or over quota
    Exceeded,
}

impl UsageStatus {
    /// Determine status based on current usage and quota
    pub fn from_usage(current_bytes: u64, quota_bytes: u64) -> Self {
        let percent = Self::percentage(current_bytes, quota_bytes);
        if quota_bytes == 0 {
            Self::Ok
        } else if percent >= 100.0 {
            Self::Exceeded
        } else if percent >= 80.0 {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    /// Get percentage of quota used
    pub fn percentage(current_bytes: u64, quota_bytes: u64) -> f64 {
        if quota_bytes == 0 {
            return 0.0;
        }
        (current_bytes as f64 / quota_bytes as f64) * 100.0
    }
}

/// Entry count and body size of one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationUsage {
    pub name: String,
    pub entries: usize,
    pub bytes: u64,
}

/// Usage across every generation in the store
#[derive(Debug, Clone, Serialize)]
pub struct StorageEstimate {
    pub generations: Vec<GenerationUsage>,
    pub usage_bytes: u64,
    pub quota_bytes: Option<u64>,
    pub status: UsageStatus,
}

impl StorageEstimate {
    pub fn new(generations: Vec<GenerationUsage>, quota_bytes: Option<u64>) -> Self {
        let usage_bytes = generations.iter().map(|g| g.bytes).sum();
        let status = quota_bytes
            .map(|quota| UsageStatus::from_usage(usage_bytes, quota))
            .unwrap_or(UsageStatus::Ok);

        Self {
            generations,
            usage_bytes,
            quota_bytes,
            status,
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        match self.quota_bytes {
            Some(quota) => format!(
                "{} of {} ({:.0}%)",
                format_bytes(self.usage_bytes),
                format_bytes(quota),
                UsageStatus::percentage(self.usage_bytes, quota)
            ),
            None => format_bytes(self.usage_bytes),
        }
    }
}
