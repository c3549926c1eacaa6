//! Redis-backed state store.
//!
//! Each video is a hash `{prefix}:video:{id}` with two fields: `version`
//! (monotonic counter) and `data` (the JSON record). Version checks and
//! writes happen atomically in a Lua script.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;
use vod_models::{VideoId, VideoRecord};

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, Versioned};

const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'version', 1, 'data', ARGV[1])
return 1
"#;

const CAS_SCRIPT: &str = r#"
local v = redis.call('HGET', KEYS[1], 'version')
if not v then
  return -1
end
if v ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'data', ARGV[3])
return tonumber(ARGV[2])
"#;

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub redis_url: String,
    pub key_prefix: String,
}

impl StateConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STATE_KEY_PREFIX").unwrap_or_else(|_| "vod".to_string()),
        }
    }
}

pub struct RedisStateStore {
    conn: ConnectionManager,
    key_prefix: String,
    insert_script: Script,
    cas_script: Script,
}

impl RedisStateStore {
    pub async fn connect(cfg: StateConfig) -> StateResult<Self> {
        let client = redis::Client::open(cfg.redis_url.as_str())
            .map_err(|e| StateError::ConnectionFailed(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StateError::ConnectionFailed(e.to_string()))?;
        debug!("Connected to Redis state store");
        Ok(Self {
            conn,
            key_prefix: cfg.key_prefix,
            insert_script: Script::new(INSERT_SCRIPT),
            cas_script: Script::new(CAS_SCRIPT),
        })
    }

    fn key(&self, video_id: &VideoId) -> String {
        format!("{}:video:{}", self.key_prefix, video_id)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load(&self, video_id: &VideoId) -> StateResult<Versioned<VideoRecord>> {
        let mut conn = self.conn.clone();
        let (version, data): (Option<u64>, Option<String>) = redis::pipe()
            .hget(self.key(video_id), "version")
            .hget(self.key(video_id), "data")
            .query_async(&mut conn)
            .await?;
        match (version, data) {
            (Some(version), Some(data)) => Ok(Versioned {
                version,
                record: serde_json::from_str(&data)?,
            }),
            _ => Err(StateError::not_found(video_id.as_str())),
        }
    }

    async fn insert(&self, record: VideoRecord) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let key = self.key(&record.video_id);
        let data = serde_json::to_string(&record)?;
        let created: i64 = self
            .insert_script
            .key(&key)
            .arg(&data)
            .invoke_async(&mut conn)
            .await?;
        if created == 1 {
            Ok(())
        } else {
            Err(StateError::already_exists(record.video_id.as_str()))
        }
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: VideoRecord,
    ) -> StateResult<u64> {
        let mut conn = self.conn.clone();
        let key = self.key(&record.video_id);
        let data = serde_json::to_string(&record)?;
        let result: i64 = self
            .cas_script
            .key(&key)
            .arg(expected_version.to_string())
            .arg(expected_version + 1)
            .arg(&data)
            .invoke_async(&mut conn)
            .await?;
        match result {
            -1 => Err(StateError::not_found(record.video_id.as_str())),
            0 => Err(StateError::conflict(record.video_id.as_str())),
            v => Ok(v as u64),
        }
    }

    async fn list(&self) -> StateResult<Vec<VideoId>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:video:*", self.key_prefix);
        let strip = format!("{}:video:", self.key_prefix);
        let mut ids = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            for key in keys {
                if let Some(id) = key.strip_prefix(&strip) {
                    ids.push(VideoId::from(id));
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(ids)
    }

    async fn remove(&self, video_id: &VideoId) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let _: u32 = conn.del(self.key(video_id)).await?;
        Ok(())
    }
}
