//! In-memory state store for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use vod_models::{VideoId, VideoRecord};

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, Versioned};

#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, Versioned<VideoRecord>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, video_id: &VideoId) -> StateResult<Versioned<VideoRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .get(video_id.as_str())
            .cloned()
            .ok_or_else(|| StateError::not_found(video_id.as_str()))
    }

    async fn insert(&self, record: VideoRecord) -> StateResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let id = record.video_id.as_str().to_string();
        if records.contains_key(&id) {
            return Err(StateError::already_exists(id));
        }
        records.insert(id, Versioned { version: 1, record });
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: VideoRecord,
    ) -> StateResult<u64> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let id = record.video_id.as_str().to_string();
        let entry = records
            .get_mut(&id)
            .ok_or_else(|| StateError::not_found(&id))?;
        if entry.version != expected_version {
            return Err(StateError::conflict(&id));
        }
        entry.version += 1;
        entry.record = record;
        Ok(entry.version)
    }

    async fn list(&self) -> StateResult<Vec<VideoId>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.keys().map(|k| VideoId::from(k.as_str())).collect())
    }

    async fn remove(&self, video_id: &VideoId) -> StateResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.remove(video_id.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::update;
    use std::sync::Arc;
    use vod_models::{VideoId, VideoRecord, VideoStatus};

    fn record(id: &str) -> VideoRecord {
        VideoRecord::new(
            VideoId::from(id),
            "clip.mp4",
            "video/mp4",
            1024,
            chrono::Duration::hours(1),
            chrono::Duration::days(30),
        )
    }

    #[tokio::test]
    async fn test_insert_then_load() {
        let store = MemoryStateStore::new();
        store.insert(record("v1")).await.unwrap();

        let loaded = store.load(&VideoId::from("v1")).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.record.filename, "clip.mp4");
    }

    #[tokio::test]
    async fn test_double_insert_rejected() {
        let store = MemoryStateStore::new();
        store.insert(record("v1")).await.unwrap();
        let err = store.insert(record("v1")).await.unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_cas_detects_stale_version() {
        let store = MemoryStateStore::new();
        store.insert(record("v1")).await.unwrap();

        let read = store.load(&VideoId::from("v1")).await.unwrap();
        // A concurrent writer commits first.
        store
            .compare_and_swap(read.version, read.record.clone())
            .await
            .unwrap();

        let err = store
            .compare_and_swap(read.version, read.record)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_retries_through_conflicts() {
        let store = Arc::new(MemoryStateStore::new());
        store.insert(record("v1")).await.unwrap();
        let id = VideoId::from("v1");

        // Many concurrent single-step mutations; CAS retry must not lose any.
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                update(store.as_ref(), &id, |rec| {
                    rec.size_bytes += 1;
                    Ok::<_, StateError>(Some(()))
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.record.size_bytes, 1024 + 16);
        assert_eq!(loaded.version, 17);
    }

    #[tokio::test]
    async fn test_update_none_leaves_record_untouched() {
        let store = MemoryStateStore::new();
        store.insert(record("v1")).await.unwrap();
        let id = VideoId::from("v1");

        let (rec, out) = update(&store, &id, |rec| {
            if rec.status == VideoStatus::Ready {
                rec.size_bytes = 0;
                Ok::<_, StateError>(Some(()))
            } else {
                Ok(None)
            }
        })
        .await
        .unwrap();

        assert!(out.is_none());
        assert_eq!(rec.size_bytes, 1024);
        assert_eq!(store.load(&id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryStateStore::new();
        store.insert(record("v1")).await.unwrap();
        let id = VideoId::from("v1");
        store.remove(&id).await.unwrap();
        store.remove(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap_err().is_not_found());
    }
}
