//! State tracked while a run is in progress
//!
//! # Components
//!
//! - `TargetState`: lifecycle of a single crawl target
//! - `HostState`: per-host request slots and politeness delay
//! - `BulkBudget` / `CrawlBudget`: item and byte ceilings

mod budget;
mod host_state;
mod target_state;

pub use budget::{BudgetRejection, BulkBudget, CrawlBudget};
pub use host_state::HostState;
pub use target_state::TargetState;
