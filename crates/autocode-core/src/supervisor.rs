//! Background task registry keyed by work context.
//!
//! Tasks are cancelled cooperatively: each receives a [`CancellationToken`]
//! and must check it at its own step boundaries.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// What kind of background work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    WorkLoop,
    OneShotMessage,
}

struct SupervisedTask {
    generation: u64,
    kind: TaskKind,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one background task per context.
#[derive(Clone, Default)]
pub struct TaskSupervisor {
    tasks: Arc<DashMap<Uuid, SupervisedTask>>,
    generation: Arc<AtomicU64>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task for `context_id`, cancelling any task it already has.
    /// The task removes its own entry when it finishes.
    pub fn spawn<F, Fut>(&self, context_id: Uuid, kind: TaskKind, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(context_id);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let work = make(token.clone());
        let tasks = self.tasks.clone();

        // Holding the entry while spawning keeps a fast-finishing task from
        // trying to remove itself before it is registered.
        let entry = self.tasks.entry(context_id);
        let handle = tokio::spawn(async move {
            work.await;
            tasks.remove_if(&context_id, |_, task| task.generation == generation);
            debug!(target: "autocode::supervisor", "Task for {} finished", context_id);
        });
        entry.insert(SupervisedTask {
            generation,
            kind,
            token,
            handle,
        });
        debug!(target: "autocode::supervisor", "Spawned {:?} task for {}", kind, context_id);
    }

    /// Signal cancellation and forget the task. Returns whether one existed.
    pub fn cancel(&self, context_id: Uuid) -> bool {
        match self.tasks.remove(&context_id) {
            Some((_, task)) => {
                task.token.cancel();
                info!(
                    target: "autocode::supervisor",
                    "Cancelled {:?} task for {}",
                    task.kind, context_id
                );
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, context_id: Uuid) -> bool {
        self.tasks
            .get(&context_id)
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub fn active_kind(&self, context_id: Uuid) -> Option<TaskKind> {
        self.tasks.get(&context_id).map(|task| task.kind)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every task and wait for all of them to finish.
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.tasks.iter().map(|entry| *entry.key()).collect();
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                task.token.cancel();
                handles.push(task.handle);
            }
        }
        let count = handles.len();
        for handle in handles {
            let _ = handle.await;
        }
        if count > 0 {
            info!(target: "autocode::supervisor", "Shut down {} background tasks", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_signals_token() {
        let supervisor = TaskSupervisor::new();
        let id = Uuid::new_v4();
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();

        supervisor.spawn(id, TaskKind::WorkLoop, |token| async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert!(supervisor.is_active(id));
        assert_eq!(supervisor.active_kind(id), Some(TaskKind::WorkLoop));

        assert!(supervisor.cancel(id));
        assert!(!supervisor.cancel(id));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observed.load(Ordering::SeqCst));
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_finished_task_removes_itself() {
        let supervisor = TaskSupervisor::new();
        let id = Uuid::new_v4();
        supervisor.spawn(id, TaskKind::OneShotMessage, |_| async {});
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!supervisor.is_active(id));
        assert_eq!(supervisor.len(), 0);
    }

    #[tokio::test]
    async fn test_respawn_replaces_previous() {
        let supervisor = TaskSupervisor::new();
        let id = Uuid::new_v4();
        let first_cancelled = Arc::new(AtomicBool::new(false));
        let flag = first_cancelled.clone();

        supervisor.spawn(id, TaskKind::WorkLoop, |token| async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        supervisor.spawn(id, TaskKind::WorkLoop, |token| async move {
            token.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(first_cancelled.load(Ordering::SeqCst));
        // The replaced task must not have removed the new entry.
        assert!(supervisor.is_active(id));
        supervisor.shutdown().await;
        assert!(supervisor.is_empty());
    }
}
