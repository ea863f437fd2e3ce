//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TaskStore`: loads the task file and persists every task's checkpoint
//! - `ProgressTracker`: derives a task's checkpoint from the IDs in flight

mod progress;
mod task_store;

pub use progress::ProgressTracker;
pub use task_store::TaskStore;

use thiserror::Error;

/// Errors that can occur while loading or persisting task state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed task file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No task at index {0}")]
    NoSuchTask(usize),
}
