//! Multi-source discovery: pacing, merge planning, per-artist orchestration.

pub mod coordinator;
pub mod dedup;
pub mod gate;

pub use coordinator::DiscoveryCoordinator;
pub use dedup::{normalize_title, plan_merge, MergePlan};
pub use gate::{GateConfig, SourceGate};
