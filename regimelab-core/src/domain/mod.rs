//! Domain types for RegimeLab

pub mod bar;
pub mod equity;
pub mod regime;
pub mod trade;

pub use bar::{validate_series, Bar, BarError};
pub use equity::EquityPoint;
pub use regime::RegimeLabel;
pub use trade::{ExitReason, Trade};
