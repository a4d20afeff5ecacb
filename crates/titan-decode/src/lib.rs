//! Protocol-aware DEX decoding: event topics, the pool registry, swap
//! payload reconstruction and the stream consumer that persists trades.

pub mod registry;
pub mod swap;
pub mod topics;
pub mod worker;
