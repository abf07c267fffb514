//! Task Lifecycle Module
//!
//! Task identity values and the listener that turns orchestrator
//! state changes into registry updates.
//!
//! # Components
//!
//! - [`TaskIdentity`] / [`TaskState`]: what the orchestrator reports
//! - [`TaskMonitorListener`]: registers running tasks, zeroes stopped ones

pub mod listener;
pub mod task;

pub use listener::{TaskMonitorListener, TaskStateListener};
pub use task::{TaskEvent, TaskIdentity, TaskState};
