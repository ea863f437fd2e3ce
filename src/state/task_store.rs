use crate::model::Task;
use crate::state::StateError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// On-disk shape of the task file
#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskFile {
    tasks: Vec<Task>,
}

/// Durable record of every task's progress
///
/// Holds the tasks in memory and rewrites the whole file on each change.
/// All writes go through one lock, so concurrent task loops never interleave
/// them.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    tasks: Mutex<Vec<Task>>,
}

impl TaskStore {
    /// Loads the task file at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(TaskStore)` - The store, holding the tasks in file order
    /// * `Err(StateError)` - The file is missing, unreadable, or malformed
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let content = std::fs::read_to_string(path)?;
        let file: TaskFile = serde_json::from_str(&content)?;

        tracing::info!("Loaded {} tasks from {}", file.tasks.len(), path.display());

        Ok(Self::with_tasks(path, file.tasks))
    }

    /// Creates a store over tasks already in memory
    pub fn with_tasks(path: impl Into<PathBuf>, tasks: Vec<Task>) -> Self {
        Self {
            path: path.into(),
            tasks: Mutex::new(tasks),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a snapshot of all tasks
    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }

    /// Advances task `index` to `begin_id` and writes the full task set
    ///
    /// A value lower than the current checkpoint is ignored.
    pub async fn checkpoint(&self, index: usize, begin_id: u64) -> Result<(), StateError> {
        let mut tasks = self.tasks.lock().await;

        let task = tasks.get_mut(index).ok_or(StateError::NoSuchTask(index))?;
        let range = task.range_mut();
        if begin_id < range.begin_id {
            tracing::debug!(
                "Ignoring checkpoint {} for task {} (already at {})",
                begin_id,
                index,
                range.begin_id
            );
            return Ok(());
        }
        range.begin_id = begin_id;

        write_tasks(&self.path, &tasks).await
    }

    /// Writes the current task set
    pub async fn persist(&self) -> Result<(), StateError> {
        let tasks = self.tasks.lock().await;
        write_tasks(&self.path, &tasks).await?;
        tracing::info!("Tasks saved to {}", self.path.display());
        Ok(())
    }
}

/// Writes to a sibling temp file and renames it over the target
async fn write_tasks(path: &Path, tasks: &[Task]) -> Result<(), StateError> {
    let file = TaskFile {
        tasks: tasks.to_vec(),
    };
    let bytes = serde_json::to_vec_pretty(&file)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
