//! Chain RPC plumbing: HTTP JSON-RPC for `eth_call` and receipt lookups,
//! and the websocket subscription frame types the listener parses.

pub mod rpc;
pub mod ws;
