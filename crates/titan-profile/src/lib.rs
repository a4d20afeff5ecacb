//! Profiler: trades folded into positions, wallet value and tier, with the
//! merit update riding the same transaction.

pub mod accounting;
pub mod worker;
