// src/exec/mod.rs

//! Task execution layer.
//!
//! This module runs dispatched tasks against their handlers and reports back
//! to the driver via `DriverEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `HandlerExecutor` used in production, which tests can replace with a
//!   fake implementation.
//! - [`task_runner`] runs an individual task: handle, wait, report.

pub mod backend;
pub mod task_runner;

pub use backend::{ExecutorBackend, HandlerExecutor};
pub use task_runner::run_task;
