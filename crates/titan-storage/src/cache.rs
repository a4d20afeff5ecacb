//! Small JSON cache over Redis with TTL, used for the watch-pair snapshot
//! and the decoder's token lookups.

use anyhow::Result;
use redis::AsyncCommands;

use crate::RedisConn;

pub async fn get_json(conn: &mut RedisConn, key: &str) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn.get(key).await?;
    match raw {
        Some(text) => Ok(serde_json::from_str(&text).ok()),
        None => Ok(None),
    }
}

pub async fn set_json(
    conn: &mut RedisConn,
    key: &str,
    value: &serde_json::Value,
    ttl_seconds: u64,
) -> Result<()> {
    let text = serde_json::to_string(value)?;
    let _: () = conn.set_ex(key, text, ttl_seconds).await?;
    Ok(())
}

pub async fn get_string(conn: &mut RedisConn, key: &str) -> Result<Option<String>> {
    Ok(conn.get(key).await?)
}

pub async fn set_string(
    conn: &mut RedisConn,
    key: &str,
    value: &str,
    ttl_seconds: u64,
) -> Result<()> {
    let _: () = conn.set_ex(key, value, ttl_seconds).await?;
    Ok(())
}
