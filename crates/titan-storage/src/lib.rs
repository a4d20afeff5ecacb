//! Durable state and the stream fabric.
//!
//! Postgres is the system of record (pooled sqlx, embedded forward-only
//! migrations); Redis carries the streams, dedupe sets, heartbeats and the
//! watch-pair snapshot. Each worker owns one multiplexed Redis connection
//! and draws short-lived Postgres sessions from the shared pool.

pub mod cache;
pub mod heartbeat;
pub mod models;
pub mod repos;
pub mod streams;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub type RedisConn = redis::aio::MultiplexedConnection;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn connect_pg(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

pub async fn connect_redis(redis_url: &str) -> Result<RedisConn> {
    let client = redis::Client::open(redis_url)?;
    let conn = client.get_multiplexed_async_connection().await?;
    Ok(conn)
}
