//! Redis Streams queue implementation.
//!
//! Each stage gets its own stream (`{prefix}:jobs:{stage}`) consumed through
//! a consumer group, so claims are exclusive and unacked entries survive
//! worker crashes. Delayed jobs sit in a sorted set (`{prefix}:delayed:{stage}`)
//! scored by their due time and are promoted into the stream on claim.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use vod_models::Stage;

use crate::error::{QueueError, QueueResult};
use crate::job::{ClaimedJob, Job};
use crate::queue::{JobQueue, QueueConfig};

const JOB_FIELD: &str = "job";
/// How many due delayed jobs to promote per claim call.
const PROMOTE_BATCH: usize = 16;

pub struct RedisQueue {
    conn: ConnectionManager,
    cfg: QueueConfig,
    /// Unique per-process consumer name within the group.
    consumer: String,
}

impl RedisQueue {
    /// Connect and ensure the consumer group exists for every queued stage.
    pub async fn connect(cfg: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(cfg.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        for stage in Stage::QUEUED {
            let key = format!("{}:jobs:{}", cfg.key_prefix, stage);
            let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&key)
                .arg(&cfg.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;
            if let Err(e) = created {
                // BUSYGROUP means another worker already created it.
                if !e.to_string().contains("BUSYGROUP") {
                    return Err(e.into());
                }
            }
        }

        let consumer = format!("worker-{}", Uuid::new_v4());
        debug!(consumer = %consumer, "Connected to Redis queue");
        Ok(Self {
            conn,
            cfg,
            consumer,
        })
    }

    fn stream_key(&self, stage: Stage) -> String {
        format!("{}:jobs:{}", self.cfg.key_prefix, stage)
    }

    fn delayed_key(&self, stage: Stage) -> String {
        format!("{}:delayed:{}", self.cfg.key_prefix, stage)
    }

    /// Move due entries from the delayed set into the stage stream.
    ///
    /// ZREM decides the winner when several workers promote concurrently;
    /// only the caller that actually removed the member appends it.
    async fn promote_due(&self, stage: Stage) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let delayed = self.delayed_key(stage);
        let now_ms = chrono::Utc::now().timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore_limit(&delayed, 0, now_ms, 0, PROMOTE_BATCH as isize)
            .await?;
        for payload in due {
            let removed: u32 = conn.zrem(&delayed, &payload).await?;
            if removed == 1 {
                let _: String = conn
                    .xadd(self.stream_key(stage), "*", &[(JOB_FIELD, payload.as_str())])
                    .await?;
            }
        }
        Ok(())
    }

    /// Reclaim an entry idle longer than the visibility timeout, if any.
    async fn reclaim_expired(&self, stage: Stage) -> QueueResult<Option<ClaimedJob>> {
        let mut conn = self.conn.clone();
        let key = self.stream_key(stage);
        let min_idle_ms = self.cfg.visibility_timeout.as_millis() as usize;

        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &key,
                &self.cfg.consumer_group,
                &self.consumer,
                min_idle_ms,
                "0-0",
                StreamAutoClaimOptions::default().count(1),
            )
            .await?;

        for entry in reply.claimed {
            match self.parse_entry(&entry.id, &entry.map) {
                Some(claimed) => {
                    warn!(
                        job_id = %claimed.job.job_id(),
                        stage = %stage,
                        "Reclaimed job after visibility timeout"
                    );
                    return Ok(Some(claimed));
                }
                // Unparseable entries are dropped so they cannot wedge the
                // consumer group.
                None => self.drop_entry(&key, &entry.id).await?,
            }
        }
        Ok(None)
    }

    fn parse_entry(
        &self,
        id: &str,
        map: &std::collections::HashMap<String, redis::Value>,
    ) -> Option<ClaimedJob> {
        let raw = map
            .get(JOB_FIELD)
            .and_then(|v| redis::from_redis_value::<String>(v).ok())?;
        match serde_json::from_str(&raw) {
            Ok(job) => Some(ClaimedJob {
                receipt: id.to_string(),
                job,
            }),
            Err(e) => {
                warn!(entry = %id, error = %e, "Dropping malformed queue entry");
                None
            }
        }
    }

    async fn drop_entry(&self, key: &str, id: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: u32 = conn.xack(key, &self.cfg.consumer_group, &[id]).await?;
        let _: u32 = conn.xdel(key, &[id]).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&job)?;
        let entry: String = conn
            .xadd(
                self.stream_key(job.stage()),
                "*",
                &[(JOB_FIELD, payload.as_str())],
            )
            .await?;
        debug!(
            job_id = %job.job_id(),
            stage = %job.stage(),
            entry = %entry,
            "Enqueued job"
        );
        Ok(())
    }

    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&job)?;
        let due_ms = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let _: u32 = conn
            .zadd(self.delayed_key(job.stage()), payload, due_ms)
            .await?;
        debug!(
            job_id = %job.job_id(),
            stage = %job.stage(),
            delay_ms = delay.as_millis() as u64,
            "Scheduled delayed job"
        );
        Ok(())
    }

    async fn claim(&self, stage: Stage, wait: Duration) -> QueueResult<Option<ClaimedJob>> {
        self.promote_due(stage).await?;

        if let Some(claimed) = self.reclaim_expired(stage).await? {
            return Ok(Some(claimed));
        }

        let mut conn = self.conn.clone();
        let key = self.stream_key(stage);
        let opts = StreamReadOptions::default()
            .group(&self.cfg.consumer_group, &self.consumer)
            .count(1)
            .block(wait.as_millis() as usize);
        let reply: StreamReadReply = conn.xread_options(&[&key], &[">"], &opts).await?;

        for stream in reply.keys {
            for entry in stream.ids {
                match self.parse_entry(&entry.id, &entry.map) {
                    Some(claimed) => return Ok(Some(claimed)),
                    None => self.drop_entry(&key, &entry.id).await?,
                }
            }
        }
        Ok(None)
    }

    async fn ack(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let key = self.stream_key(claimed.job.stage());
        self.drop_entry(&key, &claimed.receipt).await?;
        debug!(job_id = %claimed.job.job_id(), "Acked job");
        Ok(())
    }

    async fn nack(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        // Re-append first so the job is never lost between the two steps;
        // at-least-once delivery tolerates the duplicate if ack fails.
        self.enqueue(claimed.job.clone()).await?;
        let key = self.stream_key(claimed.job.stage());
        self.drop_entry(&key, &claimed.receipt).await?;
        Ok(())
    }

    async fn extend_visibility(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let key = self.stream_key(claimed.job.stage());
        // XCLAIM with zero idle resets the entry's idle clock.
        let _: redis::Value = redis::cmd("XCLAIM")
            .arg(&key)
            .arg(&self.cfg.consumer_group)
            .arg(&self.consumer)
            .arg(0)
            .arg(&claimed.receipt)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
