//! Reactive plumbing: who depends on whom, and what runs on the next flush.
//!
//! - [`DependencyGraph`]: declared subject → reaction edges with batching.
//! - [`Scheduler`]: coalescing job queue drained by `Form::flush`.

pub mod graph;
pub mod scheduler;

pub use graph::{DependencyGraph, Reaction};
pub use scheduler::{Drained, LanguageScope, PendingChange, Scheduler, ValidationRequest};
