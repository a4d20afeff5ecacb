//! Redis stream helpers: at-least-once consumption through consumer groups,
//! retry/dead-letter parking, and TTL dedupe sets.

use std::collections::HashMap;

use anyhow::{Context, Result};
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

use crate::RedisConn;

pub const STREAM_RAW_EVENTS: &str = "titan:raw_events";
pub const STREAM_DECODED_TRADES: &str = "titan:decoded_trades";
pub const STREAM_RISK_JOBS: &str = "titan:risk_jobs";
pub const STREAM_PROFILE_JOBS: &str = "titan:profile_jobs";
pub const STREAM_ALERT_JOBS: &str = "titan:alert_jobs";

pub const RAW_EVENTS_DEDUPE_KEY: &str = "titan:raw_events:dedupe";
pub const RISK_JOBS_DEDUPE_KEY: &str = "titan:risk_jobs:dedupe";

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub fn dead_letter_stream(stream: &str) -> String {
    format!("{stream}:dead")
}

#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
}

pub async fn publish_to_stream(
    conn: &mut RedisConn,
    stream: &str,
    fields: &[(String, String)],
) -> Result<String> {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(stream).arg("*");
    for (key, value) in fields {
        cmd.arg(key).arg(value);
    }
    let id: String = cmd
        .query_async(conn)
        .await
        .with_context(|| format!("XADD {stream}"))?;
    Ok(id)
}

/// Creates the consumer group if it does not exist yet; BUSYGROUP from a
/// concurrent creator is fine.
pub async fn ensure_consumer_group(conn: &mut RedisConn, stream: &str, group: &str) -> Result<()> {
    let result: redis::RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream)
        .arg(group)
        .arg("0")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
        Err(err) => Err(err).with_context(|| format!("XGROUP CREATE {stream} {group}")),
    }
}

pub async fn consume_from_stream(
    conn: &mut RedisConn,
    stream: &str,
    group: &str,
    consumer: &str,
    count: usize,
    block_ms: usize,
) -> Result<Vec<StreamMessage>> {
    let options = StreamReadOptions::default()
        .group(group, consumer)
        .count(count)
        .block(block_ms);
    let reply: Option<StreamReadReply> = conn
        .xread_options(&[stream], &[">"], &options)
        .await
        .with_context(|| format!("XREADGROUP {stream} {group}"))?;

    let mut messages = Vec::new();
    let Some(reply) = reply else {
        return Ok(messages);
    };
    for key in reply.keys {
        for entry in key.ids {
            let mut fields = HashMap::with_capacity(entry.map.len());
            for (name, value) in entry.map {
                if let Ok(text) = redis::from_redis_value::<String>(&value) {
                    fields.insert(name, text);
                }
            }
            messages.push(StreamMessage {
                id: entry.id,
                fields,
            });
        }
    }
    Ok(messages)
}

pub async fn acknowledge_message(
    conn: &mut RedisConn,
    stream: &str,
    group: &str,
    message_id: &str,
) -> Result<()> {
    let _: i64 = conn
        .xack(stream, group, &[message_id])
        .await
        .with_context(|| format!("XACK {stream} {message_id}"))?;
    Ok(())
}

/// Failure path for a consumed message: bump `retry_count` and requeue on the
/// source stream, or park on the dead-letter stream once retries are spent.
/// The original message is acked either way so the group does not redeliver
/// the stale id.
pub async fn retry_or_dead_letter(
    conn: &mut RedisConn,
    stream: &str,
    group: &str,
    message_id: &str,
    fields: &HashMap<String, String>,
    max_retries: u32,
) -> Result<()> {
    let retry_count = fields
        .get("retry_count")
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(0)
        + 1;

    let mut updated: Vec<(String, String)> = fields
        .iter()
        .filter(|(key, _)| key.as_str() != "retry_count")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    updated.push(("retry_count".into(), retry_count.to_string()));

    let target = if retry_count > max_retries {
        dead_letter_stream(stream)
    } else {
        stream.to_string()
    };
    publish_to_stream(conn, &target, &updated).await?;
    acknowledge_message(conn, stream, group, message_id).await
}

/// SADD-based dedupe. Returns true when the value was already present; the
/// TTL is armed on first insertion so the whole set ages out together.
pub async fn dedupe_with_ttl(
    conn: &mut RedisConn,
    key: &str,
    value: &str,
    ttl_seconds: i64,
) -> Result<bool> {
    let added: i64 = conn.sadd(key, value).await?;
    if added == 1 {
        let _: bool = conn.expire(key, ttl_seconds).await?;
        return Ok(false);
    }
    Ok(true)
}

/// Summary pending-entry count for a consumer group, for ops health.
pub async fn pending_count(conn: &mut RedisConn, stream: &str, group: &str) -> Result<i64> {
    let reply: redis::Value = redis::cmd("XPENDING")
        .arg(stream)
        .arg(group)
        .query_async(conn)
        .await
        .with_context(|| format!("XPENDING {stream} {group}"))?;
    if let redis::Value::Bulk(items) = reply {
        if let Some(redis::Value::Int(count)) = items.first() {
            return Ok(*count);
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_naming() {
        assert_eq!(dead_letter_stream(STREAM_RAW_EVENTS), "titan:raw_events:dead");
    }
}
