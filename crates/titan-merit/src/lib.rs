//! Per-wallet merit: outcome contributions weighted by earliness, crowding
//! and copycat pressure, folded into a decayed score with tier transitions.

pub mod contribution;
pub mod engine;
