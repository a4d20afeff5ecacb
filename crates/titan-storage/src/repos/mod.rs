//! Table-local query modules. Writes are idempotent (PK/unique upserts) so
//! at-least-once delivery and concurrent worker instances stay safe.

pub mod alerts;
pub mod gas;
pub mod outcomes;
pub mod positions;
pub mod settings;
pub mod token_risk;
pub mod tokens;
pub mod trades;
pub mod wallet_metrics;
pub mod wallets;
pub mod watch_pairs;
