//! Repository traits for registry operations.

pub mod selectors;
pub mod targets;

pub use selectors::SelectorRepo;
pub use targets::TargetRepo;
