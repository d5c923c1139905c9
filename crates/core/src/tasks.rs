use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "error")]
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
}

/// Background task bookkeeping shared across workers; explicitly
/// constructed and passed around, cheap to clone.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<Uuid, TaskState>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Uuid {
        let task_id = Uuid::new_v4();
        self.lock().insert(
            task_id,
            TaskState {
                status: TaskStatus::Created,
                progress: 0,
                message: "Task created".to_string(),
                error: None,
            },
        );
        task_id
    }

    pub fn mark_running(&self, task_id: Uuid, progress: u8, message: &str) {
        let mut tasks = self.lock();
        if let Some(state) = tasks.get_mut(&task_id) {
            state.status = TaskStatus::Running;
            state.progress = progress;
            state.message = message.to_string();
        }
    }

    pub fn mark_done(&self, task_id: Uuid, message: &str) {
        let mut tasks = self.lock();
        if let Some(state) = tasks.get_mut(&task_id) {
            state.status = TaskStatus::Done;
            state.progress = 100;
            state.message = message.to_string();
        }
    }

    pub fn mark_error(&self, task_id: Uuid, message: &str, error: &str) {
        let mut tasks = self.lock();
        if let Some(state) = tasks.get_mut(&task_id) {
            state.status = TaskStatus::Error;
            state.progress = 100;
            state.message = message.to_string();
            state.error = Some(error.to_string());
        }
    }

    pub fn get(&self, task_id: Uuid) -> Option<TaskState> {
        self.lock().get(&task_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TaskState>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
