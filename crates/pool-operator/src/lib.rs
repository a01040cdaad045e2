//! Operator tooling for the Cocoon pool settlement engine: configuration, the on-disk pool
//! snapshot, payout runs with retry, and payout reports.

pub mod export;
pub mod payout;
pub mod session;
pub mod settings;
pub mod snapshot;
