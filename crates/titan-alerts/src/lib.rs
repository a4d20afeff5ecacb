//! Alert emission: the gas cost model, the NetEV gate, conviction scoring,
//! the narrator, and the scanning worker that ties them together.

pub mod conviction;
pub mod cost;
pub mod narrator;
pub mod netev;
pub mod worker;
