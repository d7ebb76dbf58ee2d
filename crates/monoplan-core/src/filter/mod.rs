//! Job selection stages.
//!
//! Both filters are pure: they split a job list into kept and dropped jobs
//! and never touch the state store.

pub mod change_impact;
pub mod event;

pub use change_impact::ChangeImpactFilter;
pub use event::EventFilter;
