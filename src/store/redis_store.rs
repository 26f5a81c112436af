//! Redis-backed [`super::SharedStore`].
//!
//! Every primitive is a single `redis::Script` invocation — the scripted-
//! transaction approach spec.md §4.B/§4.C call for ("server-side scripted
//! transactions", "shared-store scripted transaction") and the pattern the
//! `script` feature of the `redis` crate exists for. Keys follow spec.md
//! §6's persisted-state layout exactly: `writeLock:<chatID>`,
//! `readLock:<chatID>`, `processing:<chatID>`, `pending:<chatID>`,
//! `pendingDedup:<chatID>`, `chainSkip:<chatID>:<userID>`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{EnqueueOutcome, QueueDetails, SharedStore, StoreError};
use crate::command::PendingMessage;

fn write_lock_key(chat_id: &str) -> String {
    format!("writeLock:{chat_id}")
}
fn read_lock_key(chat_id: &str) -> String {
    format!("readLock:{chat_id}")
}
fn processing_key(chat_id: &str) -> String {
    format!("processing:{chat_id}")
}
fn pending_key(chat_id: &str) -> String {
    format!("pending:{chat_id}")
}
fn pending_dedup_key(chat_id: &str) -> String {
    format!("pendingDedup:{chat_id}")
}
fn chain_skip_key(chat_id: &str, user_id: &str) -> String {
    format!("chainSkip:{chat_id}:{user_id}")
}

fn to_store_err(e: redis::RedisError) -> StoreError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

/// `SET key token NX PX ttl`, rejecting if the read-lock set is non-empty.
const TRY_ACQUIRE_WRITE_LOCK: &str = r#"
if redis.call("SCARD", KEYS[2]) > 0 then
  return 0
end
local ok = redis.call("SET", KEYS[1], ARGV[1], "NX", "PX", ARGV[2])
if ok then return 1 else return 0 end
"#;

const RELEASE_WRITE_LOCK: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  redis.call("DEL", KEYS[1])
  return 1
end
return 0
"#;

const RENEW_WRITE_LOCK: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  redis.call("PEXPIRE", KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

const TRY_ACQUIRE_READ_LOCK: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 1 then
  return 0
end
redis.call("SADD", KEYS[2], ARGV[1])
redis.call("PEXPIRE", KEYS[2], ARGV[2])
return 1
"#;

const CHECK_AND_CLEAR_CHAIN_SKIP: &str = r#"
if redis.call("GET", KEYS[1]) == "1" then
  redis.call("DEL", KEYS[1])
  return 1
end
return 0
"#;

/// Enqueue script: KEYS = [pending list, dedup set]. ARGV = [json, dedup_key
/// ("" if chain batch), replace ("1"/"0"), queue_max, pending_ttl_ms].
/// Returns 1=Success, 2=QueueFull, 3=Duplicate.
const ENQUEUE: &str = r#"
local dedup_key = ARGV[2]
local replace = ARGV[3] == "1"
local queue_max = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

if dedup_key ~= "" and redis.call("SISMEMBER", KEYS[2], dedup_key) == 1 then
  if not replace then
    return 3
  end
  local items = redis.call("LRANGE", KEYS[1], 0, -1)
  for i, raw in ipairs(items) do
    if string.find(raw, "\"dedup_marker\":\"" .. dedup_key .. "\"", 1, true) then
      redis.call("LREM", KEYS[1], 1, raw)
      break
    end
  end
  redis.call("RPUSH", KEYS[1], ARGV[1])
  redis.call("PEXPIRE", KEYS[1], ttl)
  return 1
end

local len = redis.call("LLEN", KEYS[1])
if len >= queue_max then
  return 2
end

if dedup_key ~= "" then
  redis.call("SADD", KEYS[2], dedup_key)
  redis.call("PEXPIRE", KEYS[2], ttl)
end
redis.call("RPUSH", KEYS[1], ARGV[1])
redis.call("PEXPIRE", KEYS[1], ttl)
return 1
"#;

/// Dequeue-batch script: KEYS = [pending list, dedup set]. ARGV = [n].
/// Returns a list of JSON strings (raw payloads, without the dedup marker
/// wrapper the enqueue script looks for).
const DEQUEUE_BATCH: &str = r#"
local n = tonumber(ARGV[1])
local out = {}
for i = 1, n do
  local raw = redis.call("LPOP", KEYS[1])
  if not raw then
    break
  end
  local marker_start, marker_end = string.find(raw, "\"dedup_marker\":\"[^\"]*\",")
  if marker_start then
    local key = string.match(raw, "\"dedup_marker\":\"([^\"]*)\",")
    if key and key ~= "" then
      redis.call("SREM", KEYS[2], key)
    end
    raw = string.sub(raw, 1, marker_start - 1) .. string.sub(raw, marker_end + 1)
  end
  table.insert(out, raw)
end
return out
"#;

/// The envelope we actually store: the serialized [`PendingMessage`] plus a
/// `dedup_marker` field the Lua scripts use to locate/strip the entry
/// without deserializing JSON in Lua. Stripped back out on dequeue.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredEnvelope {
    dedup_marker: String,
    #[serde(flatten)]
    msg: PendingMessage,
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(to_store_err)?;
        let conn = client.get_connection_manager().await.map_err(to_store_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn try_acquire_write_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let v: i64 = Script::new(TRY_ACQUIRE_WRITE_LOCK)
            .key(write_lock_key(chat_id))
            .key(read_lock_key(chat_id))
            .arg(token)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_err)?;
        Ok(v == 1)
    }

    async fn release_write_lock(&self, chat_id: &str, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let v: i64 = Script::new(RELEASE_WRITE_LOCK)
            .key(write_lock_key(chat_id))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_err)?;
        Ok(v == 1)
    }

    async fn renew_write_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let v: i64 = Script::new(RENEW_WRITE_LOCK)
            .key(write_lock_key(chat_id))
            .arg(token)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_err)?;
        Ok(v == 1)
    }

    async fn try_acquire_read_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let v: i64 = Script::new(TRY_ACQUIRE_READ_LOCK)
            .key(write_lock_key(chat_id))
            .key(read_lock_key(chat_id))
            .arg(token)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_err)?;
        Ok(v == 1)
    }

    async fn release_read_lock(&self, chat_id: &str, token: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.srem(read_lock_key(chat_id), token).await.map_err(to_store_err)?;
        Ok(())
    }

    async fn is_processing(&self, chat_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(processing_key(chat_id)).await.map_err(to_store_err)?;
        Ok(exists)
    }

    async fn start_processing(&self, chat_id: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(processing_key(chat_id), "1", (ttl_ms.max(1)) / 1000 + 1)
            .await
            .map_err(to_store_err)?;
        Ok(())
    }

    async fn finish_processing(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(processing_key(chat_id)).await.map_err(to_store_err)?;
        Ok(())
    }

    async fn enqueue(
        &self,
        chat_id: &str,
        msg: PendingMessage,
        replace_duplicate: bool,
        queue_max: usize,
        pending_ttl_ms: u64,
    ) -> Result<EnqueueOutcome, StoreError> {
        let dedup_key = msg.dedup_key().unwrap_or_default();
        let envelope = StoredEnvelope { dedup_marker: dedup_key.clone(), msg };
        let payload = serde_json::to_string(&envelope).map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut conn = self.conn.clone();
        let v: i64 = Script::new(ENQUEUE)
            .key(pending_key(chat_id))
            .key(pending_dedup_key(chat_id))
            .arg(payload)
            .arg(dedup_key)
            .arg(if replace_duplicate { "1" } else { "0" })
            .arg(queue_max)
            .arg(pending_ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_err)?;

        match v {
            1 => Ok(EnqueueOutcome::Success),
            2 => Ok(EnqueueOutcome::QueueFull),
            _ => Ok(EnqueueOutcome::Duplicate),
        }
    }

    async fn dequeue_batch(&self, chat_id: &str, n: usize) -> Result<Vec<PendingMessage>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = Script::new(DEQUEUE_BATCH)
            .key(pending_key(chat_id))
            .key(pending_dedup_key(chat_id))
            .arg(n)
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_err)?;

        raw.into_iter()
            .map(|s| serde_json::from_str::<PendingMessage>(&s).map_err(|e| StoreError::Backend(e.to_string())))
            .collect()
    }

    async fn has_pending(&self, chat_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(pending_key(chat_id)).await.map_err(to_store_err)?;
        Ok(len > 0)
    }

    async fn queue_details(&self, chat_id: &str, queue_max: usize) -> Result<QueueDetails, StoreError> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(pending_key(chat_id)).await.map_err(to_store_err)?;
        Ok(QueueDetails { size: len.max(0) as usize, queue_max })
    }

    async fn clear(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(pending_key(chat_id)).await.map_err(to_store_err)?;
        let _: i64 = conn.del(pending_dedup_key(chat_id)).await.map_err(to_store_err)?;
        Ok(())
    }

    async fn set_chain_skip_flag(&self, chat_id: &str, user_id: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(chain_skip_key(chat_id, user_id), "1", (ttl_ms.max(1)) / 1000 + 1)
            .await
            .map_err(to_store_err)?;
        Ok(())
    }

    async fn check_and_clear_chain_skip_flag(&self, chat_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let v: i64 = Script::new(CHECK_AND_CLEAR_CHAIN_SKIP)
            .key(chain_skip_key(chat_id, user_id))
            .invoke_async(&mut conn)
            .await
            .map_err(to_store_err)?;
        Ok(v == 1)
    }
}
