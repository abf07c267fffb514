//! Resource Monitoring Module
//!
//! Tracks running task processes and samples their CPU and memory.
//!
//! # Components
//!
//! - [`TaskRegistry`]: the shared set of tracked tasks
//! - [`ProcessProbe`]: per-process CPU and memory readings
//! - [`Sampler`]: the periodic loop reporting every tracked task

pub mod process;
pub mod registry;
pub mod sampler;

pub use process::{ProcessProbe, ProcessSample, SysinfoProbe};
pub use registry::{TaskRegistry, TrackedTask};
pub use sampler::{CycleSummary, Sampler, SamplerHandle};
