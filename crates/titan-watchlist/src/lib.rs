//! Watchlist maintenance: the autopilot's market-data refresh with capped
//! churn, the Redis snapshot the listener reads, and the seed-pack import.

pub mod autopilot;
pub mod seed;
pub mod snapshot;
pub mod worker;
