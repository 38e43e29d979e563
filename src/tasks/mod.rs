//! Scheduled Task Queue
//!
//! Deferred work is a plain record (due time, target entity, operation)
//! rather than a stored closure:
//! - Cancelling is dropping the record by handle
//! - Destroying an entity cancels everything aimed at it (`cancel_target`)
//! - A task whose target is gone when it fires is skipped by the consumer
//!
//! Ordering: by due time, then by scheduling order.

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskHandle(u64);

/// What to do when a task comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskOp {
    SpawnTerrain,
    InitializeTerrain,
    AssignWeapons,
    RecheckWeapons,
    SpawnWeapon,
    FinishReload,
    StartNextTurn,
    TurnTimeout,
    AutoEndTurn,
    ArmProjectileCollision,
    DetonateProjectile,
    CheckStuckProjectile,
    ExpireProjectile,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub handle: TaskHandle,
    pub due: f64,
    pub target: EntityId,
    pub op: TaskOp,
}

#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    now: f64,
    next_handle: u64,
    /// Kept sorted by (due, handle)
    tasks: Vec<ScheduledTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run `op` on `target` after `delay` seconds (negative delays run next poll)
    pub fn schedule(&mut self, delay: f32, target: EntityId, op: TaskOp) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        let task = ScheduledTask {
            handle,
            due: self.now + delay.max(0.0) as f64,
            target,
            op,
        };
        let at = self
            .tasks
            .partition_point(|t| (t.due, t.handle) <= (task.due, task.handle));
        self.tasks.insert(at, task);
        tracing::trace!(?op, %target, delay, "task scheduled");
        handle
    }

    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.tasks.iter().position(|t| t.handle == handle) {
            Some(i) => {
                self.tasks.remove(i);
                true
            }
            None => false,
        }
    }

    /// Drop every pending task aimed at `target`
    pub fn cancel_target(&mut self, target: EntityId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.target != target);
        before - self.tasks.len()
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.tasks.iter().any(|t| t.handle == handle)
    }

    /// Seconds until `handle` fires, if still pending
    pub fn remaining(&self, handle: TaskHandle) -> Option<f32> {
        self.tasks
            .iter()
            .find(|t| t.handle == handle)
            .map(|t| (t.due - self.now).max(0.0) as f32)
    }

    pub fn pending_for(&self, target: EntityId, op: TaskOp) -> Option<TaskHandle> {
        self.tasks
            .iter()
            .find(|t| t.target == target && t.op == op)
            .map(|t| t.handle)
    }

    pub fn advance(&mut self, delta_seconds: f32) {
        self.now += delta_seconds.max(0.0) as f64;
    }

    /// Next due task, earliest first. Tasks scheduled while draining with
    /// no delay are returned in the same drain.
    pub fn pop_due(&mut self) -> Option<ScheduledTask> {
        if self.tasks.first().is_some_and(|t| t.due <= self.now) {
            Some(self.tasks.remove(0))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: EntityId = EntityId(1);
    const B: EntityId = EntityId(2);

    #[test]
    fn test_tasks_fire_in_due_order() {
        let mut q = TaskQueue::new();
        q.schedule(2.0, A, TaskOp::StartNextTurn);
        q.schedule(0.5, B, TaskOp::InitializeTerrain);
        q.schedule(1.0, A, TaskOp::AssignWeapons);

        q.advance(1.0);
        assert_eq!(q.pop_due().map(|t| t.op), Some(TaskOp::InitializeTerrain));
        assert_eq!(q.pop_due().map(|t| t.op), Some(TaskOp::AssignWeapons));
        assert!(q.pop_due().is_none());

        q.advance(1.0);
        assert_eq!(q.pop_due().map(|t| t.op), Some(TaskOp::StartNextTurn));
    }

    #[test]
    fn test_same_due_keeps_schedule_order() {
        let mut q = TaskQueue::new();
        q.schedule(1.0, A, TaskOp::TurnTimeout);
        q.schedule(1.0, B, TaskOp::AutoEndTurn);
        q.advance(1.0);
        assert_eq!(q.pop_due().map(|t| t.target), Some(A));
        assert_eq!(q.pop_due().map(|t| t.target), Some(B));
    }

    #[test]
    fn test_cancel_by_handle() {
        let mut q = TaskQueue::new();
        let h = q.schedule(1.0, A, TaskOp::TurnTimeout);
        assert!(q.is_pending(h));
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        q.advance(5.0);
        assert!(q.pop_due().is_none());
    }

    #[test]
    fn test_cancel_target_drops_all_its_tasks() {
        let mut q = TaskQueue::new();
        q.schedule(1.0, A, TaskOp::DetonateProjectile);
        q.schedule(0.5, A, TaskOp::CheckStuckProjectile);
        q.schedule(1.0, B, TaskOp::TurnTimeout);
        assert_eq!(q.cancel_target(A), 2);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut q = TaskQueue::new();
        let h = q.schedule(30.0, A, TaskOp::TurnTimeout);
        q.advance(10.0);
        let left = q.remaining(h).unwrap();
        assert!((left - 20.0).abs() < 1e-4);
        assert_eq!(q.pending_for(A, TaskOp::TurnTimeout), Some(h));
    }

    #[test]
    fn test_zero_delay_runs_in_same_drain() {
        let mut q = TaskQueue::new();
        q.schedule(0.0, A, TaskOp::SpawnWeapon);
        let first = q.pop_due().unwrap();
        assert_eq!(first.op, TaskOp::SpawnWeapon);
        q.schedule(0.0, B, TaskOp::SpawnWeapon);
        assert_eq!(q.pop_due().map(|t| t.target), Some(B));
    }
}
