//! Task completion reconciliation.
//!
//! Joins a task's server-side item catalog with the surveyor's per-item
//! record counts. The catalog ([`Task`]) and the overlay
//! ([`CompletionSnapshot`]) stay separate; [`merge`] builds a fresh
//! [`ReconciledTask`] every time, so counts from an earlier pass can never
//! leak into a later one.
//!
//! # Failure policy
//!
//! A failed completion fetch is not an error for the caller: the task is
//! returned with every item at zero and the failure attached as
//! [`ReconciledTask::warning`]. When a list of tasks is reconciled the
//! fetches run concurrently and each task's outcome is independent.

use std::collections::HashMap;

use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;

use crate::error::ReconciliationError;
use crate::models::{
    CompletionSnapshot, ItemId, SurveyorId, Task, TaskId, TaskItem, TaskStatus,
};
use crate::traits::TaskSource;

/// A catalog item with its derived progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledItem {
    #[serde(flatten)]
    pub item: TaskItem,
    pub record_count: u32,
    pub is_completed: bool,
}

/// Progress view of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledTask {
    pub id: TaskId,
    pub title: String,
    pub date: NaiveDate,
    pub status: TaskStatus,
    pub description: Option<String>,
    pub items: Vec<ReconciledItem>,
    pub completed_item_count: usize,
    pub total_record_count: u32,
    pub completion_percent: u8,
    #[serde(skip)]
    pub warning: Option<ReconciliationError>,
}

impl ReconciledTask {
    pub fn item(&self, id: ItemId) -> Option<&ReconciledItem> {
        self.items.iter().find(|i| i.item.id == id)
    }
}

/// `round(100 * completed / total)`, 0 for an empty task.
pub fn completion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((completed as f64 * 100.0 / total as f64).round()) as u8
}

/// Pure merge of catalog and counts. Every catalog item gets a count:
/// the snapshot's value, or zero when the snapshot does not mention it.
/// Snapshot entries for unknown items are ignored.
pub fn merge(task: &Task, snapshot: Option<&CompletionSnapshot>) -> ReconciledTask {
    let empty = HashMap::new();
    let counts = snapshot.map(|s| &s.per_item_counts).unwrap_or(&empty);

    let items: Vec<ReconciledItem> = task
        .items
        .iter()
        .map(|item| {
            let record_count = counts.get(&item.id).copied().unwrap_or(0);
            ReconciledItem {
                item: item.clone(),
                record_count,
                is_completed: record_count > 0,
            }
        })
        .collect();

    let completed_item_count = items.iter().filter(|i| i.is_completed).count();
    let total_record_count = items.iter().map(|i| i.record_count).sum();

    ReconciledTask {
        id: task.id,
        title: task.title.clone(),
        date: task.date,
        status: task.status,
        description: task.description.clone(),
        completion_percent: completion_percent(completed_item_count, items.len()),
        items,
        completed_item_count,
        total_record_count,
        warning: None,
    }
}

/// Fetches the surveyor's counts for `task` and merges them. Never fails.
pub async fn reconcile(
    task: &Task,
    source: &dyn TaskSource,
    surveyor_id: SurveyorId,
) -> ReconciledTask {
    match source.fetch_completion(task.id, surveyor_id).await {
        Ok(snapshot) if snapshot.task_id != task.id => {
            let warning = ReconciliationError::Mismatch {
                expected: task.id,
                actual: snapshot.task_id,
            };
            tracing::warn!(task_id = task.id, error = %warning, "ignoring completion snapshot");
            with_warning(merge(task, None), warning)
        }
        Ok(snapshot) => merge(task, Some(&snapshot)),
        Err(err) => {
            let warning = ReconciliationError::Fetch {
                task_id: task.id,
                source: err,
            };
            tracing::warn!(task_id = task.id, error = %warning, "showing task without progress");
            with_warning(merge(task, None), warning)
        }
    }
}

/// Reconciles every task concurrently, preserving input order.
pub async fn reconcile_all(
    tasks: &[Task],
    source: &dyn TaskSource,
    surveyor_id: SurveyorId,
) -> Vec<ReconciledTask> {
    join_all(tasks.iter().map(|t| reconcile(t, source, surveyor_id))).await
}

fn with_warning(mut task: ReconciledTask, warning: ReconciliationError) -> ReconciledTask {
    task.warning = Some(warning);
    task
}

/// Summary over a day's task list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskDashboard {
    pub total_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub total_items: usize,
    pub completed_items: usize,
    pub total_records: u32,
    pub completion_percent: u8,
    /// Tasks whose progress could not be fetched.
    pub degraded_tasks: usize,
}

impl TaskDashboard {
    pub fn summarize(tasks: &[ReconciledTask]) -> Self {
        let mut board = TaskDashboard {
            total_tasks: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Active => board.active_tasks += 1,
                TaskStatus::Completed => board.completed_tasks += 1,
                TaskStatus::Cancelled => {}
            }
            board.total_items += task.items.len();
            board.completed_items += task.completed_item_count;
            board.total_records += task.total_record_count;
            if task.warning.is_some() {
                board.degraded_tasks += 1;
            }
        }
        board.completion_percent = completion_percent(board.completed_items, board.total_items);
        board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn item(id: ItemId, name: &str) -> TaskItem {
        TaskItem {
            id,
            product_name: name.to_string(),
            category: "grocery".to_string(),
            spec: None,
            barcode: None,
        }
    }

    fn task(id: TaskId, items: Vec<TaskItem>) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            date: NaiveDate::from_ymd_opt(2024, 2, 5).unwrap(),
            status: TaskStatus::Active,
            description: None,
            items,
        }
    }

    fn snapshot(task_id: TaskId, counts: &[(ItemId, u32)]) -> CompletionSnapshot {
        CompletionSnapshot {
            task_id,
            surveyor_id: 7,
            per_item_counts: counts.iter().copied().collect(),
            completed_item_count: counts.iter().filter(|(_, c)| *c > 0).count(),
            total_record_count: counts.iter().map(|(_, c)| c).sum(),
        }
    }

    #[test]
    fn tomato_and_milk() {
        let t = task(1, vec![item(10, "Tomato"), item(11, "Milk")]);
        let r = merge(&t, Some(&snapshot(1, &[(10, 2)])));

        assert_eq!(r.items.len(), 2);
        assert_eq!((r.items[0].item.id, r.items[0].record_count, r.items[0].is_completed), (10, 2, true));
        assert_eq!((r.items[1].item.id, r.items[1].record_count, r.items[1].is_completed), (11, 0, false));
        assert_eq!(r.completed_item_count, 1);
        assert_eq!(r.total_record_count, 2);
        assert_eq!(r.completion_percent, 50);
    }

    #[test]
    fn repeat_surveys_count_toward_records_not_items() {
        let t = task(1, vec![item(10, "Tomato"), item(11, "Milk"), item(12, "Rice")]);
        let r = merge(&t, Some(&snapshot(1, &[(10, 3), (12, 1), (99, 5)])));
        assert_eq!(r.completed_item_count, 2);
        assert_eq!(r.total_record_count, 4);
        assert_eq!(r.completion_percent, 67);
    }

    #[test]
    fn empty_task_is_zero_percent() {
        let r = merge(&task(1, Vec::new()), Some(&snapshot(1, &[(10, 1)])));
        assert_eq!(r.completion_percent, 0);
        assert!(r.items.is_empty());
        assert_eq!(completion_percent(0, 0), 0);
        assert_eq!(completion_percent(3, 3), 100);
        assert_eq!(completion_percent(5, 3), 100);
    }

    #[test]
    fn second_pass_does_not_inherit_counts() {
        let t = task(1, vec![item(10, "Tomato"), item(11, "Milk")]);
        let first = merge(&t, Some(&snapshot(1, &[(10, 1), (11, 4)])));
        assert_eq!(first.completed_item_count, 2);

        let second = merge(&t, Some(&snapshot(1, &[(10, 1)])));
        assert_eq!(second.item(11).unwrap().record_count, 0);
        assert!(!second.item(11).unwrap().is_completed);
    }

    struct FakeSource {
        snapshots: HashMap<TaskId, Result<CompletionSnapshot, TransportError>>,
        calls: Mutex<Vec<TaskId>>,
    }

    #[async_trait]
    impl TaskSource for FakeSource {
        async fn fetch_tasks_for_date(&self, _d: NaiveDate) -> Result<Vec<Task>, TransportError> {
            Ok(Vec::new())
        }

        async fn fetch_completion(
            &self,
            task_id: TaskId,
            _surveyor_id: SurveyorId,
        ) -> Result<CompletionSnapshot, TransportError> {
            self.calls.lock().unwrap().push(task_id);
            // Yield so sibling fetches interleave.
            tokio::task::yield_now().await;
            self.snapshots
                .get(&task_id)
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Network("unreachable".into())))
        }
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_zero() {
        let source = FakeSource {
            snapshots: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        };
        let t = task(1, vec![item(10, "Tomato")]);
        let r = reconcile(&t, &source, 7).await;
        assert_eq!(r.items[0].record_count, 0);
        assert!(!r.items[0].is_completed);
        assert!(matches!(r.warning, Some(ReconciliationError::Fetch { task_id: 1, .. })));
    }

    #[tokio::test]
    async fn snapshot_for_wrong_task_is_ignored() {
        let source = FakeSource {
            snapshots: HashMap::from([(1, Ok(snapshot(2, &[(10, 9)])))]),
            calls: Mutex::new(Vec::new()),
        };
        let r = reconcile(&task(1, vec![item(10, "Tomato")]), &source, 7).await;
        assert_eq!(r.total_record_count, 0);
        assert!(matches!(
            r.warning,
            Some(ReconciliationError::Mismatch { expected: 1, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn one_failing_task_does_not_affect_siblings() {
        let source = FakeSource {
            snapshots: HashMap::from([
                (1, Ok(snapshot(1, &[(10, 1)]))),
                (2, Err(TransportError::Status { status: 500, message: "db".into() })),
                (3, Ok(snapshot(3, &[(30, 2)]))),
            ]),
            calls: Mutex::new(Vec::new()),
        };
        let tasks = vec![
            task(1, vec![item(10, "Tomato")]),
            task(2, vec![item(20, "Milk")]),
            task(3, vec![item(30, "Rice"), item(31, "Oil")]),
        ];

        let out = reconcile_all(&tasks, &source, 7).await;
        assert_eq!(out.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(out[0].completion_percent, 100);
        assert!(out[1].warning.is_some());
        assert_eq!(out[1].completion_percent, 0);
        assert_eq!(out[2].completion_percent, 50);
        assert_eq!(source.calls.lock().unwrap().len(), 3);

        let board = TaskDashboard::summarize(&out);
        assert_eq!(board.total_tasks, 3);
        assert_eq!(board.active_tasks, 3);
        assert_eq!(board.total_items, 4);
        assert_eq!(board.completed_items, 2);
        assert_eq!(board.total_records, 3);
        assert_eq!(board.completion_percent, 50);
        assert_eq!(board.degraded_tasks, 1);
    }
}
