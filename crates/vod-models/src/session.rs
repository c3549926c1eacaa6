//! Chunked upload session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tracks an in-progress chunked upload.
///
/// Chunks may arrive in any order and may be retransmitted; the received
/// set records distinct indices only. The expected total is fixed by the
/// first accepted chunk and every later chunk must agree with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Total chunk count, fixed by the first accepted chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_total_chunks: Option<u32>,

    /// Distinct chunk indices received so far.
    #[serde(default)]
    pub received: BTreeSet<u32>,

    /// Declared size of the assembled file in bytes.
    pub total_bytes_expected: u64,

    /// Session creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Point after which the session is expired and eligible for cleanup.
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(total_bytes_expected: u64, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            expected_total_chunks: None,
            received: BTreeSet::new(),
            total_bytes_expected,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// True once every index `0..expected_total_chunks` has been received.
    ///
    /// Indices are validated against the total before insertion, so set
    /// cardinality is sufficient.
    pub fn is_complete(&self) -> bool {
        match self.expected_total_chunks {
            Some(total) => self.received.len() as u32 == total,
            None => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Upload progress in percent.
    pub fn progress(&self) -> f64 {
        match self.expected_total_chunks {
            Some(total) if total > 0 => (self.received.len() as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UploadSession {
        UploadSession::new(1024, chrono::Duration::hours(1))
    }

    #[test]
    fn test_completion_requires_all_indices() {
        let mut s = session();
        s.expected_total_chunks = Some(3);
        s.received.insert(2);
        s.received.insert(0);
        assert!(!s.is_complete());
        s.received.insert(1);
        assert!(s.is_complete());
    }

    #[test]
    fn test_duplicate_indices_do_not_complete() {
        let mut s = session();
        s.expected_total_chunks = Some(3);
        s.received.insert(0);
        s.received.insert(0);
        s.received.insert(1);
        assert!(!s.is_complete());
        assert_eq!(s.received.len(), 2);
    }

    #[test]
    fn test_progress() {
        let mut s = session();
        assert_eq!(s.progress(), 0.0);
        s.expected_total_chunks = Some(4);
        s.received.insert(0);
        assert!((s.progress() - 25.0).abs() < f64::EPSILON);
    }
}
