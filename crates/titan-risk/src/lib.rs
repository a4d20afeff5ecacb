//! Token risk: DexScreener + GoPlus composition into flags and a Token
//! Security Score, plus the worker that keeps `token_risk` fresh.

pub mod sources;
pub mod tss;
pub mod worker;
