//! Projection of reconciliation outcomes onto `MCPServer` status.

pub mod projector;
pub mod reducer;


pub use projector::{
    ApplyFailure, ApplyReport, MissingRef, ObjectKind, Observation, RefKind,
    ReplicaCounts, Stage, project,
};
pub use reducer::{is_stale_write, reduce, should_patch};
