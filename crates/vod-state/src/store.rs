//! Store trait and the CAS retry helper.

use async_trait::async_trait;
use vod_models::{VideoId, VideoRecord};

use crate::error::{StateError, StateResult};

/// A record together with the store version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

/// Versioned store of video records.
///
/// `compare_and_swap` succeeds only if the stored version still equals the
/// version the caller read; otherwise it fails with `Conflict` and the
/// caller re-reads and retries. `update` wraps that loop.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a record with its current version.
    async fn load(&self, video_id: &VideoId) -> StateResult<Versioned<VideoRecord>>;

    /// Create a record at version 1. Fails with `AlreadyExists` if present.
    async fn insert(&self, record: VideoRecord) -> StateResult<()>;

    /// Replace the record iff the stored version equals `expected_version`.
    /// Returns the new version on success.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: VideoRecord,
    ) -> StateResult<u64>;

    /// All known video ids. Used by the cleanup sweep; not a hot path.
    async fn list(&self) -> StateResult<Vec<VideoId>>;

    /// Delete a record. Idempotent.
    async fn remove(&self, video_id: &VideoId) -> StateResult<()>;
}

/// Read-modify-write with CAS retry.
///
/// `mutate` is applied to a fresh copy of the record on every attempt, so it
/// must be idempotent against re-reads. Returning `Ok(None)` means the
/// mutation no longer applies (someone else got there first); the current
/// record is returned unchanged. Returning `Ok(Some(out))` commits the
/// mutated record and yields `out` to the caller alongside it.
///
/// The error type is the caller's; it only has to absorb `StateError` for
/// the load/swap failures.
pub async fn update<S, F, T, E>(
    store: &S,
    video_id: &VideoId,
    mut mutate: F,
) -> Result<(VideoRecord, Option<T>), E>
where
    S: StateStore + ?Sized,
    F: FnMut(&mut VideoRecord) -> Result<Option<T>, E>,
    E: From<StateError>,
{
    loop {
        let Versioned {
            version,
            mut record,
        } = store.load(video_id).await?;

        let out = match mutate(&mut record)? {
            Some(out) => out,
            None => return Ok((record, None)),
        };

        match store.compare_and_swap(version, record.clone()).await {
            Ok(_) => return Ok((record, Some(out))),
            Err(StateError::Conflict(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
