//! Worker heartbeats. Each worker writes a unix timestamp under
//! `titan:hb:{name}` every 15 s with a 60 s TTL; the ops API reads the keys
//! directly to report liveness.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::debug;

use crate::RedisConn;

pub const HEARTBEAT_PREFIX: &str = "titan:hb";
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const HEARTBEAT_TTL_SECONDS: u64 = 60;

pub fn heartbeat_key(worker_name: &str) -> String {
    format!("{HEARTBEAT_PREFIX}:{worker_name}")
}

pub async fn write_heartbeat(conn: &mut RedisConn, worker_name: &str) -> Result<()> {
    let key = heartbeat_key(worker_name);
    let _: () = conn
        .set_ex(key, Utc::now().timestamp(), HEARTBEAT_TTL_SECONDS)
        .await?;
    Ok(())
}

/// Spawns the heartbeat loop on its own connection; aborts with the returned
/// handle on shutdown.
pub fn spawn_heartbeat(mut conn: RedisConn, worker_name: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = write_heartbeat(&mut conn, &worker_name).await {
                debug!(worker = %worker_name, error = %err, "heartbeat write failed");
            }
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(heartbeat_key("decoder"), "titan:hb:decoder");
    }
}
