//! Bulk actions over a table selection.
//!
//! Items are processed strictly one after another, each awaited before the
//! next starts, so every failure is attributed to exactly one record and a
//! failure never stops the rest of the batch.

use std::collections::VecDeque;
use std::future::Future;
use uuid::Uuid;

use crate::error::{CrmError, Result};
use crate::models::Entity;
use crate::notify::{Toast, ToastLevel};
use crate::repo::Repository;
use crate::selection::Selection;

#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub id: Uuid,
    pub error: CrmError,
}

/// Per-item outcome of a bulk action, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn failed_ids(&self) -> Vec<Uuid> {
        self.failed.iter().map(|f| f.id).collect()
    }

    /// Summary toast, e.g. "Deleted 2 of 3 contacts".
    pub fn toast(&self, verb: &str, noun: &str) -> Toast {
        let plural = if self.total() == 1 { "" } else { "s" };
        if self.failed.is_empty() {
            return Toast::success(format!(
                "{} {} {}{}",
                verb,
                self.success_count(),
                noun,
                plural
            ));
        }

        let level = if self.succeeded.is_empty() {
            ToastLevel::Error
        } else {
            ToastLevel::Warning
        };
        let first = &self.failed[0].error;
        Toast {
            level,
            title: format!(
                "{} {} of {} {}{}",
                verb,
                self.success_count(),
                self.total(),
                noun,
                plural
            ),
            description: Some(format!(
                "{} failed. First error: {}",
                self.failure_count(),
                first.user_message()
            )),
        }
    }
}

/// Runs one async action per id, in order, never more than one at a time.
#[derive(Debug, Clone, Default)]
pub struct SequentialQueue {
    pending: VecDeque<Uuid>,
}

impl SequentialQueue {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            pending: ids.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub async fn run<F, Fut>(mut self, mut action: F) -> BulkReport
    where
        F: FnMut(Uuid) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut report = BulkReport::default();
        let total = self.pending.len();

        while let Some(id) = self.pending.pop_front() {
            match action(id).await {
                Ok(()) => report.succeeded.push(id),
                Err(error) => {
                    log::warn!("bulk item {} failed: {}", id, error);
                    report.failed.push(BulkFailure { id, error });
                }
            }
        }

        log::info!(
            "bulk run finished: {}/{} succeeded",
            report.success_count(),
            total
        );
        report
    }
}

/// Soft-deletes every selected record. Deleted ids leave the selection;
/// failed ones stay selected so the user can retry them.
pub async fn bulk_delete<E: Entity>(repo: &Repository<E>, selection: &mut Selection) -> BulkReport {
    let report = SequentialQueue::new(selection.ids())
        .run(move |id| repo.soft_delete(id))
        .await;

    for id in &report.succeeded {
        selection.deselect(*id);
    }
    repo.context()
        .notifier()
        .notify(report.toast("Deleted", E::NAME));
    report
}
