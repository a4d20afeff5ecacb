//! Outcome evaluation: risk-windowed sellability, slippage bounds, price
//! series, raw and exit-feasible peaks, and the net tradeable return.

pub mod peaks;
pub mod prices;
pub mod risk_window;
pub mod slippage;
pub mod worker;
