//! Dependency graph stages.
//!
//! `resolver` turns raw dependency specs into validated paths, `cycle`
//! rejects circular graphs, and `timestamp` propagates effective commits
//! through the validated acyclic graph.

pub mod cycle;
pub mod resolver;
pub mod timestamp;

pub use cycle::detect_cycles;
pub use resolver::{
    anchor_path, normalize_path, DependencyMap, DependencyResolver, ResolvedDependency,
};
pub use timestamp::EffectiveTimestampCalculator;
