use super::{Store, StoreError, StoreResult};
use crate::models::{
    BatchSettlement, BuybackBatch, BuybackContribution, CanonicalState, ContributionStatus,
    GenerationTask, PaymentRecord, PaymentTracking, RefundRecord, RefundRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use serde::{de::DeserializeOwned, Serialize};

const CONTRIBUTION_PREFIX: &str = "buyback:contribution:";
const PENDING_SET: &str = "buyback:pending";
const PROCESSED_SET: &str = "buyback:processed";
const FAILED_SET: &str = "buyback:failed";
const BUYBACK_LEDGER: &str = "buybacks";
const GENERATION_LEDGER: &str = "generations";
const TRACKING_EXPIRY: &str = "tracking:expiry";
const REFUND_OUTBOX: &str = "refund:outbox";
const DISPATCH_CLAIM_TTL_SECS: u64 = 900;

// KEYS: pending set, claim set. ARGV: contribution key prefix.
const CLAIM_SCRIPT: &str = r#"
local ids = redis.call('SMEMBERS', KEYS[1])
if #ids == 0 then return {} end
redis.call('DEL', KEYS[1])
local rows = {}
for _, id in ipairs(ids) do
  local key = ARGV[1] .. id
  local raw = redis.call('GET', key)
  if raw then
    local row = cjson.decode(raw)
    row['status'] = 'claimed'
    raw = cjson.encode(row)
    redis.call('SET', key, raw)
    redis.call('SADD', KEYS[2], id)
    table.insert(rows, raw)
  end
end
return rows
"#;

// KEYS: claim set, pending set. ARGV: contribution key prefix.
const RELEASE_SCRIPT: &str = r#"
local ids = redis.call('SMEMBERS', KEYS[1])
for _, id in ipairs(ids) do
  local key = ARGV[1] .. id
  local raw = redis.call('GET', key)
  if raw then
    local row = cjson.decode(raw)
    row['status'] = 'pending'
    redis.call('SET', key, cjson.encode(row))
    redis.call('SADD', KEYS[2], id)
  end
end
redis.call('DEL', KEYS[1])
return #ids
"#;

// KEYS: claim set, processed set, failed set.
// ARGV: contribution key prefix, batch signature, processed_at, processed ids (json), failed ids (json).
const SETTLE_SCRIPT: &str = r#"
local processed = cjson.decode(ARGV[4])
local failed = cjson.decode(ARGV[5])
for _, group in ipairs({processed, failed}) do
  for _, id in ipairs(group) do
    if redis.call('SISMEMBER', KEYS[1], id) == 0 then
      return redis.error_reply('contribution ' .. id .. ' is not held by this claim')
    end
  end
end
local function mark(id, status, set)
  local key = ARGV[1] .. id
  local raw = redis.call('GET', key)
  if raw then
    local row = cjson.decode(raw)
    row['status'] = status
    row['processed_at'] = ARGV[3]
    if status == 'processed' then row['batch_signature'] = ARGV[2] end
    redis.call('SET', key, cjson.encode(row))
    redis.call('SADD', set, id)
  end
end
for _, id in ipairs(processed) do mark(id, 'processed', KEYS[2]) end
for _, id in ipairs(failed) do mark(id, 'failed', KEYS[3]) end
redis.call('DEL', KEYS[1])
return 1
"#;

// KEYS: refund key. ARGV: record json.
const BEGIN_REFUND_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if raw then
  local existing = cjson.decode(raw)
  if existing['status'] ~= 'failed' then return 0 end
end
redis.call('SET', KEYS[1], ARGV[1])
return 1
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    claim: Script,
    release: Script,
    settle: Script,
    begin_refund: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("Redis connected successfully");

        Ok(Self {
            conn,
            claim: Script::new(CLAIM_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
            settle: Script::new(SETTLE_SCRIPT),
            begin_refund: Script::new(BEGIN_REFUND_SCRIPT),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|raw| decode(key, &raw)).transpose()
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, serde_json::to_string(value)?).await?;
        Ok(())
    }

    async fn set_json_nx<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.set_nx(key, serde_json::to_string(value)?).await?)
    }

    async fn contributions_in(&self, set: &str) -> StoreResult<Vec<BuybackContribution>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(set).await?;
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = self.get_json(&contribution_key(&id)).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn payment_key(signature: &str) -> String {
    format!("payment:{}", signature)
}

fn tracking_key(external_task_id: &str) -> String {
    format!("tracking:{}", external_task_id)
}

fn generation_key(external_task_id: &str) -> String {
    format!("generation:{}", external_task_id)
}

fn contribution_key(id: &str) -> String {
    format!("{}{}", CONTRIBUTION_PREFIX, id)
}

fn claim_key(claim_id: &str) -> String {
    format!("buyback:claim:{}", claim_id)
}

fn refund_key(original_signature: &str) -> String {
    format!("refund:{}", original_signature)
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }

    async fn insert_payment(&self, record: &PaymentRecord) -> StoreResult<bool> {
        self.set_json_nx(&payment_key(&record.signature), record).await
    }

    async fn get_payment(&self, signature: &str) -> StoreResult<Option<PaymentRecord>> {
        self.get_json(&payment_key(signature)).await
    }

    async fn claim_dispatch(&self, signature: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        // Expiring claim so a crashed dispatcher does not hold the slot forever.
        let reply: Option<String> = redis::cmd("SET")
            .arg(format!("dispatch:{}", signature))
            .arg(Utc::now().to_rfc3339())
            .arg("NX")
            .arg("EX")
            .arg(DISPATCH_CLAIM_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release_dispatch(&self, signature: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(format!("dispatch:{}", signature)).await?;
        Ok(())
    }

    async fn bind_task(&self, signature: &str, task_id: &str) -> StoreResult<()> {
        let key = payment_key(signature);
        let mut record: PaymentRecord = self
            .get_json(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        record.task_id = Some(task_id.to_string());
        self.set_json(&key, &record).await
    }

    async fn track_payment(&self, entry: &PaymentTracking) -> StoreResult<()> {
        self.set_json(&tracking_key(&entry.external_task_id), entry).await?;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(
            TRACKING_EXPIRY,
            &entry.external_task_id,
            entry.expires_at.timestamp(),
        )
        .await?;
        Ok(())
    }

    async fn get_tracking(&self, external_task_id: &str) -> StoreResult<Option<PaymentTracking>> {
        let entry: Option<PaymentTracking> = self.get_json(&tracking_key(external_task_id)).await?;
        let now = Utc::now();
        Ok(entry.filter(|e| !e.is_expired(now)))
    }

    async fn sweep_expired_tracking(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut conn = self.conn.clone();
        let expired: Vec<String> = conn
            .zrangebyscore(TRACKING_EXPIRY, "-inf", now.timestamp())
            .await?;
        if expired.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = expired.iter().map(|id| tracking_key(id)).collect();
        conn.del::<_, ()>(keys).await?;
        conn.zrem::<_, _, ()>(TRACKING_EXPIRY, &expired).await?;
        Ok(expired.len())
    }

    async fn record_generation(&self, task: &GenerationTask) -> StoreResult<()> {
        self.set_json(&generation_key(&task.external_task_id), task).await?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(GENERATION_LEDGER, serde_json::to_string(task)?)
            .await?;
        Ok(())
    }

    async fn get_generation(&self, external_task_id: &str) -> StoreResult<Option<GenerationTask>> {
        self.get_json(&generation_key(external_task_id)).await
    }

    async fn annotate_terminal(&self, external_task_id: &str, state: CanonicalState) -> StoreResult<bool> {
        let key = generation_key(external_task_id);
        let Some(mut task) = self.get_json::<GenerationTask>(&key).await? else {
            return Ok(false);
        };

        let mut conn = self.conn.clone();
        let first: bool = conn
            .set_nx(format!("{}:terminal", key), serde_json::to_string(&state)?)
            .await?;
        if !first {
            return Ok(false);
        }

        task.terminal_state = Some(state);
        task.terminal_at = Some(Utc::now());
        self.set_json(&key, &task).await?;
        Ok(true)
    }

    async fn enqueue_contribution(&self, contribution: &BuybackContribution) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let first: bool = conn
            .set_nx(
                format!("buyback:by_signature:{}", contribution.payment_signature),
                &contribution.id,
            )
            .await?;
        if !first {
            return Ok(false);
        }
        self.set_json(&contribution_key(&contribution.id), contribution).await?;
        conn.sadd::<_, _, ()>(PENDING_SET, &contribution.id).await?;
        Ok(true)
    }

    async fn contributions(&self, status: ContributionStatus) -> StoreResult<Vec<BuybackContribution>> {
        let mut rows = match status {
            ContributionStatus::Pending => self.contributions_in(PENDING_SET).await?,
            ContributionStatus::Processed => self.contributions_in(PROCESSED_SET).await?,
            ContributionStatus::Failed => self.contributions_in(FAILED_SET).await?,
            ContributionStatus::Claimed => {
                let mut conn = self.conn.clone();
                let claims: Vec<String> = conn.keys("buyback:claim:*").await?;
                let mut rows = Vec::new();
                for claim in claims {
                    rows.extend(self.contributions_in(&claim).await?);
                }
                rows
            }
        };
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn claim_pending(&self, claim_id: &str) -> StoreResult<Vec<BuybackContribution>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = self
            .claim
            .key(PENDING_SET)
            .key(claim_key(claim_id))
            .arg(CONTRIBUTION_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        let mut rows = raw
            .iter()
            .map(|row| decode::<BuybackContribution>(&claim_key(claim_id), row))
            .collect::<StoreResult<Vec<_>>>()?;
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn release_claim(&self, claim_id: &str) -> StoreResult<usize> {
        let mut conn = self.conn.clone();
        let released: usize = self
            .release
            .key(claim_key(claim_id))
            .key(PENDING_SET)
            .arg(CONTRIBUTION_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        Ok(released)
    }

    async fn settle_claim(&self, claim_id: &str, settlement: &BatchSettlement) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.settle
            .key(claim_key(claim_id))
            .key(PROCESSED_SET)
            .key(FAILED_SET)
            .arg(CONTRIBUTION_PREFIX)
            .arg(&settlement.batch_signature)
            .arg(settlement.processed_at.to_rfc3339())
            .arg(serde_json::to_string(&settlement.processed_ids)?)
            .arg(serde_json::to_string(&settlement.failed_ids)?)
            .invoke_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn record_buyback(&self, batch: &BuybackBatch) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(BUYBACK_LEDGER, serde_json::to_string(batch)?)
            .await?;
        Ok(())
    }

    async fn buybacks(&self) -> StoreResult<Vec<BuybackBatch>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(BUYBACK_LEDGER, 0, -1).await?;
        raw.iter().map(|row| decode(BUYBACK_LEDGER, row)).collect()
    }

    async fn enqueue_refund_request(&self, request: &RefundRequest) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn
            .hset_nx(
                REFUND_OUTBOX,
                &request.order.original_signature,
                serde_json::to_string(request)?,
            )
            .await?)
    }

    async fn refund_requests(&self) -> StoreResult<Vec<RefundRequest>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.hvals(REFUND_OUTBOX).await?;
        let mut requests = raw
            .iter()
            .map(|row| decode::<RefundRequest>(REFUND_OUTBOX, row))
            .collect::<StoreResult<Vec<_>>>()?;
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requests)
    }

    async fn remove_refund_request(&self, original_signature: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(REFUND_OUTBOX, original_signature).await?;
        Ok(())
    }

    async fn begin_refund(&self, record: &RefundRecord) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let written: i64 = self
            .begin_refund
            .key(refund_key(&record.original_signature))
            .arg(serde_json::to_string(record)?)
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn finish_refund(&self, record: &RefundRecord) -> StoreResult<()> {
        self.set_json(&refund_key(&record.original_signature), record).await
    }

    async fn get_refund(&self, original_signature: &str) -> StoreResult<Option<RefundRecord>> {
        self.get_json(&refund_key(original_signature)).await
    }
}
