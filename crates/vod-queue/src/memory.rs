//! In-memory queue for tests and single-process development.
//!
//! Mirrors the delivery contract of the Redis implementation: exclusive
//! claims, visibility-timeout redelivery, delayed jobs, at-least-once.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;
use vod_models::Stage;

use crate::error::QueueResult;
use crate::job::{ClaimedJob, Job};
use crate::queue::JobQueue;

/// Poll interval while blocking on an empty queue.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct StageState {
    ready: VecDeque<Job>,
    /// (due, job) pairs, unordered; scanned on claim.
    delayed: Vec<(Instant, Job)>,
    /// receipt -> (redelivery deadline, job)
    inflight: HashMap<String, (Instant, Job)>,
}

pub struct MemoryQueue {
    visibility: Duration,
    stages: Mutex<HashMap<Stage, StageState>>,
}

impl MemoryQueue {
    pub fn new(visibility: Duration) -> Self {
        Self {
            visibility,
            stages: Mutex::new(HashMap::new()),
        }
    }

    /// Jobs currently deliverable for a stage (delayed and in-flight excluded).
    pub fn ready_len(&self, stage: Stage) -> usize {
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        stages.entry(stage).or_default().ready.len()
    }

    /// One non-blocking delivery pass: promote due delayed jobs, reclaim
    /// expired in-flight jobs, then hand out the head of the ready queue.
    fn try_claim(&self, stage: Stage) -> Option<ClaimedJob> {
        let now = Instant::now();
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        let state = stages.entry(stage).or_default();

        let mut still_delayed = Vec::new();
        for (due, job) in state.delayed.drain(..) {
            if due <= now {
                state.ready.push_back(job);
            } else {
                still_delayed.push((due, job));
            }
        }
        state.delayed = still_delayed;

        let expired: Vec<String> = state
            .inflight
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some((_, job)) = state.inflight.remove(&receipt) {
                state.ready.push_front(job);
            }
        }

        let job = state.ready.pop_front()?;
        let receipt = Uuid::new_v4().to_string();
        state
            .inflight
            .insert(receipt.clone(), (now + self.visibility, job.clone()));
        Some(ClaimedJob { receipt, job })
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<()> {
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        stages.entry(job.stage()).or_default().ready.push_back(job);
        Ok(())
    }

    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> QueueResult<()> {
        let due = Instant::now() + delay;
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        stages
            .entry(job.stage())
            .or_default()
            .delayed
            .push((due, job));
        Ok(())
    }

    async fn claim(&self, stage: Stage, wait: Duration) -> QueueResult<Option<ClaimedJob>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(claimed) = self.try_claim(stage) {
                return Ok(Some(claimed));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn ack(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        // A receipt invalidated by redelivery acks to nothing.
        stages
            .entry(claimed.job.stage())
            .or_default()
            .inflight
            .remove(&claimed.receipt);
        Ok(())
    }

    async fn nack(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        let state = stages.entry(claimed.job.stage()).or_default();
        if let Some((_, job)) = state.inflight.remove(&claimed.receipt) {
            state.ready.push_back(job);
        }
        Ok(())
    }

    async fn extend_visibility(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let mut stages = self.stages.lock().unwrap_or_else(|e| e.into_inner());
        let state = stages.entry(claimed.job.stage()).or_default();
        if let Some(entry) = state.inflight.get_mut(&claimed.receipt) {
            entry.0 = Instant::now() + self.visibility;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vod_models::VideoId;

    fn queue(visibility_ms: u64) -> MemoryQueue {
        MemoryQueue::new(Duration::from_millis(visibility_ms))
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let q = queue(1000);
        q.enqueue(Job::transcode(VideoId::from("v1"))).await.unwrap();
        q.enqueue(Job::transcode(VideoId::from("v2"))).await.unwrap();

        let first = q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.job.video_id().as_str(), "v1");

        // v1 is in flight, so the next claim gets v2.
        let second = q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(second.job.video_id().as_str(), "v2");

        assert!(q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stages_are_partitioned() {
        let q = queue(1000);
        q.enqueue(Job::manifest(VideoId::from("v1"))).await.unwrap();

        assert!(q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().is_none());
        assert!(q.claim(Stage::Manifest, Duration::ZERO).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ack_prevents_redelivery() {
        let q = queue(20);
        q.enqueue(Job::transcode(VideoId::from("v1"))).await.unwrap();

        let claimed = q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().unwrap();
        q.ack(&claimed).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unacked_job_redelivers_after_visibility_timeout() {
        let q = queue(20);
        q.enqueue(Job::transcode(VideoId::from("v1"))).await.unwrap();

        let first = q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().unwrap();
        assert!(q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let redelivered = q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(redelivered.job.job_id(), first.job.job_id());
        assert_ne!(redelivered.receipt, first.receipt);

        // The stale receipt is dead; acking it does not drop the redelivery.
        q.ack(&first).await.unwrap();
        q.nack(&redelivered).await.unwrap();
        assert!(q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_extend_visibility_defers_redelivery() {
        let q = queue(30);
        q.enqueue(Job::transcode(VideoId::from("v1"))).await.unwrap();

        let claimed = q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().unwrap();
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            q.extend_visibility(&claimed).await.unwrap();
        }
        // Well past the original deadline, still invisible.
        assert!(q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nack_redelivers_immediately() {
        let q = queue(1000);
        q.enqueue(Job::chunk(VideoId::from("v1"), "720p")).await.unwrap();

        let claimed = q.claim(Stage::Chunk, Duration::ZERO).await.unwrap().unwrap();
        q.nack(&claimed).await.unwrap();

        let again = q.claim(Stage::Chunk, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(again.job.job_id(), claimed.job.job_id());
    }

    #[tokio::test]
    async fn test_delayed_job_invisible_until_due() {
        let q = queue(1000);
        let job = Job::transcode(VideoId::from("v1")).next_attempt();
        q.enqueue_delayed(job, Duration::from_millis(30)).await.unwrap();

        assert!(q.claim(Stage::Transcode, Duration::ZERO).await.unwrap().is_none());

        let claimed = q
            .claim(Stage::Transcode, Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.job.attempt(), 2);
    }
}
