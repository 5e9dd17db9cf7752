// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delayed-task results for the 202 protocol.
//!
//! A worker answering `202 {task_id, result_url_path}` parks the work
//! here; the dispatcher polls `/unit_api/task_results/<id>` until the
//! task completes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    Done(serde_json::Value),
}

#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<TaskStoreInner>,
}

#[derive(Default)]
struct TaskStoreInner {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<String, TaskStatus>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending task; returns its id.
    pub fn create(&self) -> String {
        let id = format!("task-{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.tasks.lock().insert(id.clone(), TaskStatus::Pending);
        id
    }

    pub fn result_url_path(&self, task_id: &str) -> String {
        format!("/unit_api/task_results/{task_id}")
    }

    pub fn complete(&self, task_id: &str, result: serde_json::Value) {
        self.inner.tasks.lock().insert(task_id.to_string(), TaskStatus::Done(result));
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.inner.tasks.lock().get(task_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let store = TaskStore::new();
        let id = store.create();
        assert_eq!(store.status(&id), Some(TaskStatus::Pending));
        assert_eq!(store.result_url_path(&id), format!("/unit_api/task_results/{id}"));

        store.complete(&id, serde_json::json!({"ok": true}));
        assert_eq!(store.status(&id), Some(TaskStatus::Done(serde_json::json!({"ok": true}))));
        assert_eq!(store.status("task-unknown"), None);
    }

    #[test]
    fn ids_are_unique() {
        let store = TaskStore::new();
        let a = store.create();
        let b = store.create();
        assert_ne!(a, b);
    }
}
