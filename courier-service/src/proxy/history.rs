//! History recording
//!
//! Write-only and append-only. A failed write is logged and dropped; it must
//! never fail the caller's foreground execution.

use std::sync::Arc;
use uuid::Uuid;

use crate::config::HistoryConfig;
use crate::model::RequestHistory;
use crate::repository::HistoryRepository;

/// Marker appended to stored bodies cut at the cap
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Persists one history entry per executed request
#[derive(Clone)]
pub struct HistoryRecorder {
    repo: Arc<dyn HistoryRepository>,
    max_body_bytes: usize,
}

impl HistoryRecorder {
    pub fn new(repo: Arc<dyn HistoryRepository>, config: &HistoryConfig) -> Self {
        Self {
            repo,
            max_body_bytes: config.max_stored_body_bytes,
        }
    }

    /// Cut a body at the storage cap, appending the truncation marker
    ///
    /// Deterministic and idempotent: re-truncating an already truncated body
    /// returns it unchanged.
    pub fn truncate_body(&self, body: &str) -> (String, bool) {
        if body.len() <= self.max_body_bytes || body.ends_with(TRUNCATION_MARKER) {
            return (body.to_string(), false);
        }
        let mut cut = self.max_body_bytes;
        while cut > 0 && !body.is_char_boundary(cut) {
            cut -= 1;
        }
        (format!("{}{}", &body[..cut], TRUNCATION_MARKER), true)
    }

    /// Append an entry, returning its id; errors are swallowed
    pub async fn record(&self, entry: RequestHistory) -> Option<Uuid> {
        match self.repo.append(entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("dropping history entry: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::repository::InMemoryStore;

    fn recorder(cap: usize) -> HistoryRecorder {
        HistoryRecorder::new(
            Arc::new(InMemoryStore::new()),
            &HistoryConfig {
                max_stored_body_bytes: cap,
            },
        )
    }

    #[test]
    fn test_short_body_untouched() {
        let (body, truncated) = recorder(16).truncate_body("short");
        assert_eq!(body, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_long_body_cut_with_marker() {
        let (body, truncated) = recorder(8).truncate_body("0123456789abcdef");
        assert_eq!(body, format!("01234567{TRUNCATION_MARKER}"));
        assert!(truncated);
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let rec = recorder(8);
        let (once, _) = rec.truncate_body("0123456789abcdef");
        let (twice, truncated_again) = rec.truncate_body(&once);
        assert_eq!(once, twice);
        assert!(!truncated_again);
    }

    #[test]
    fn test_cut_respects_char_boundaries() {
        // 'é' is two bytes; a cap landing mid-char must back off
        let rec = recorder(3);
        let (body, truncated) = rec.truncate_body("ééé");
        assert!(truncated);
        assert!(body.starts_with('é'));
        assert!(body.ends_with(TRUNCATION_MARKER));
    }
}
