//! Task queues and the batch context handed to the scheduler.
//!
//! Three queues track the task lifecycle: Initial (request not yet
//! sent), Downloading (on the wire), Finished (done, clean or failed).
//! A task lives in exactly one queue; moving it between queues moves the
//! value, so the owning queue always controls the task's lifetime. The
//! whole bundle is explicit context, created at startup and passed down
//! to the scheduler, rather than process-wide state.

use std::collections::VecDeque;

use crate::task::Task;

/// Ordered collection of tasks with a display name for reports.
#[derive(Debug)]
pub struct TaskQueue {
    name: &'static str,
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Remove the task at `idx`, shifting later tasks forward.
    pub fn remove(&mut self, idx: usize) -> Option<Task> {
        self.tasks.remove(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Task> {
        self.tasks.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// The three lifecycle queues, owned together and passed to the
/// scheduler as one context.
#[derive(Debug)]
pub struct Batch {
    pub initial: TaskQueue,
    pub downloading: TaskQueue,
    pub finished: TaskQueue,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            initial: TaskQueue::new("Initial"),
            downloading: TaskQueue::new("Downloading"),
            finished: TaskQueue::new("Finished"),
        }
    }

    /// Enqueue a freshly created task.
    pub fn add(&mut self, task: Task) {
        self.initial.push(task);
    }

    /// Total tasks across all three queues.
    pub fn total(&self) -> usize {
        self.initial.len() + self.downloading.len() + self.finished.len()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::test_util::test_task;

    #[test]
    fn tasks_move_between_queues_without_loss() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = Batch::new();
        batch.add(test_task(dir.path(), "a.bin"));
        batch.add(test_task(dir.path(), "b.bin"));
        assert_eq!(batch.initial.len(), 2);
        assert_eq!(batch.total(), 2);

        let t = batch.initial.pop().unwrap();
        assert_eq!(t.parts.local, "a.bin");
        batch.downloading.push(t);
        assert_eq!(batch.initial.len(), 1);
        assert_eq!(batch.downloading.len(), 1);
        assert_eq!(batch.total(), 2);

        let t = batch.downloading.remove(0).unwrap();
        batch.finished.push(t);
        assert!(batch.downloading.is_empty());
        assert_eq!(batch.finished.len(), 1);
        assert_eq!(batch.total(), 2);
    }

    #[test]
    fn queue_names_for_reports() {
        let b = Batch::new();
        assert_eq!(b.initial.name(), "Initial");
        assert_eq!(b.downloading.name(), "Downloading");
        assert_eq!(b.finished.name(), "Finished");
    }
}
