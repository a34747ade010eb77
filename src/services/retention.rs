//! Storage/table reconciliation.
//!
//! Two independent policies share one paginated listing stage:
//!
//! - [`Cleanup::enforce_retention`] keeps the `cap` most recent tracked
//!   objects, deletes the rest, then drops every table row whose object is
//!   not among the survivors.
//! - [`Cleanup::purge_orphans`] deletes every object that no table row
//!   references, regardless of age.
//!
//! Listing failures abort a pass. Delete batches are best-effort: a failed
//! batch is recorded in the report and the remaining batches still run.

use crate::{
    models::{
        object_key::{ObjectNaming, PublicUrls, is_placeholder},
        storage_object::StorageObject,
    },
    services::backend::{BackendError, BackendResult, ImageTable, ObjectStore},
};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_CAP: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Largest bulk remove the storage API accepts in one call.
pub const DEFAULT_DELETE_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct RetentionOptions {
    /// Most recent tracked objects to keep; `0` deletes all of them.
    pub cap: usize,
    pub page_size: usize,
    pub delete_batch_size: usize,
    /// Only objects following the naming convention are candidates.
    pub tracked_only: bool,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        Self {
            cap: DEFAULT_CAP,
            page_size: DEFAULT_PAGE_SIZE,
            delete_batch_size: DEFAULT_DELETE_BATCH,
            tracked_only: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("failed to list storage objects: {0}")]
    List(#[source] BackendError),
    #[error("failed to read image records: {0}")]
    Table(#[source] BackendError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub index: usize,
    pub paths: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub objects_seen: usize,
    pub objects_retained: usize,
    pub objects_deleted: usize,
    pub failed_batches: Vec<BatchFailure>,
    pub records_deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
    pub valid_files: usize,
    pub total_files: usize,
    pub deleted_files: usize,
    pub deleted_paths: Vec<String>,
    pub failed_batches: Vec<BatchFailure>,
}

/// Result of ranking a listing against the cap.
#[derive(Debug, Default, PartialEq)]
pub struct RetentionPlan {
    /// Newest `cap` tracked objects.
    pub retained: Vec<StorageObject>,
    pub to_delete: Vec<StorageObject>,
    /// Placeholder and untracked objects; never deleted by this policy.
    pub untouched: Vec<StorageObject>,
}

/// Whether the object at `name` is subject to the cap. The placeholder never
/// is; with `tracked_only` the name must also follow the naming convention.
pub fn is_retention_candidate(
    name: &str,
    naming: &ObjectNaming,
    options: &RetentionOptions,
) -> bool {
    name.starts_with(&naming.folder_prefix())
        && !is_placeholder(name)
        && (!options.tracked_only || naming.is_tracked(name))
}

/// Split a full listing into retained / to-delete / untouched sets.
pub fn plan_retention(
    listed: Vec<StorageObject>,
    naming: &ObjectNaming,
    options: &RetentionOptions,
) -> RetentionPlan {
    let mut plan = RetentionPlan::default();
    let mut candidates = Vec::with_capacity(listed.len());
    for object in listed {
        if is_retention_candidate(&object.name, naming, options) {
            candidates.push(object);
        } else {
            plan.untouched.push(object);
        }
    }

    // The store is asked for newest-first; the stable sort keeps its order on ties.
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let keep = options.cap.min(candidates.len());
    plan.to_delete = candidates.split_off(keep);
    plan.retained = candidates;
    plan
}

/// One cleanup invocation over an explicit store/table pair.
pub struct Cleanup<'a> {
    pub store: &'a dyn ObjectStore,
    pub table: &'a dyn ImageTable,
    pub naming: &'a ObjectNaming,
    pub urls: &'a PublicUrls,
    pub options: &'a RetentionOptions,
}

impl Cleanup<'_> {
    /// Page through the tracked folder until a short page comes back.
    ///
    /// Page length and offset count every entry the store returned, so
    /// folder entries filtered out of a page do not end the listing early.
    pub async fn list_all(&self) -> BackendResult<Vec<StorageObject>> {
        let page_size = self.options.page_size.max(1);
        let prefix = self.naming.folder_prefix();
        let mut objects = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.store.list_page(&prefix, page_size, offset).await?;
            objects.extend(page.objects);
            if page.fetched < page_size {
                break;
            }
            offset += page.fetched;
        }
        Ok(objects)
    }

    /// Remove `paths` in batches; failures are logged and reported, never fatal.
    async fn delete_in_batches(&self, paths: &[String]) -> (Vec<String>, Vec<BatchFailure>) {
        let mut deleted = Vec::with_capacity(paths.len());
        let mut failures = Vec::new();
        for (index, batch) in paths
            .chunks(self.options.delete_batch_size.max(1))
            .enumerate()
        {
            match self.store.remove(batch).await {
                Ok(removed) => {
                    info!("delete batch {}: removed {} of {}", index, removed.len(), batch.len());
                    deleted.extend(removed);
                }
                Err(err) => {
                    warn!("delete batch {} ({} objects) failed: {}", index, batch.len(), err);
                    failures.push(BatchFailure {
                        index,
                        paths: batch.to_vec(),
                        error: err.to_string(),
                    });
                }
            }
        }
        (deleted, failures)
    }

    /// Delete rows pointing at a retention candidate that is not in `retained`.
    ///
    /// Rows are matched on the bucket's URL marker, whatever host wrote them.
    /// Rows for objects outside the candidate set are left alone.
    async fn reconcile(&self, retained: &HashSet<&str>) -> BackendResult<u64> {
        let records = self.table.select_by_url_marker(&self.urls.marker()).await?;
        let stale: Vec<Uuid> = records
            .iter()
            .filter(|record| {
                self.urls.path_of(&record.image_url).is_some_and(|path| {
                    is_retention_candidate(path, self.naming, self.options)
                        && !retained.contains(path)
                })
            })
            .map(|record| record.id)
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }
        self.table.delete_by_ids(&stale).await
    }

    /// Keep the newest `cap` tracked objects and the rows that point at them.
    pub async fn enforce_retention(&self) -> Result<RetentionReport, RetentionError> {
        let listed = self.list_all().await.map_err(RetentionError::List)?;
        let objects_seen = listed.len();
        let plan = plan_retention(listed, self.naming, self.options);
        info!(
            "retention: {} objects listed, {} retained, {} to delete (cap {})",
            objects_seen,
            plan.retained.len(),
            plan.to_delete.len(),
            self.options.cap
        );

        let doomed: Vec<String> = plan.to_delete.iter().map(|o| o.name.clone()).collect();
        let (deleted, failed_batches) = self.delete_in_batches(&doomed).await;

        let retained: HashSet<&str> = plan.retained.iter().map(|o| o.name.as_str()).collect();
        let (records_deleted, reconcile_error) = match self.reconcile(&retained).await {
            Ok(count) => (count, None),
            Err(err) => {
                warn!("retention: table reconciliation failed: {}", err);
                (0, Some(err.to_string()))
            }
        };

        info!(
            "retention: deleted {} objects and {} records ({} failed batches)",
            deleted.len(),
            records_deleted,
            failed_batches.len()
        );

        Ok(RetentionReport {
            objects_seen,
            objects_retained: plan.retained.len(),
            objects_deleted: deleted.len(),
            failed_batches,
            records_deleted,
            reconcile_error,
        })
    }

    /// Delete every object in the tracked folder that no record references.
    pub async fn purge_orphans(&self) -> Result<OrphanReport, RetentionError> {
        let records = self.table.select_all().await.map_err(RetentionError::Table)?;
        let valid: HashSet<&str> = records
            .iter()
            .filter_map(|record| self.urls.path_of(&record.image_url))
            .collect();
        info!("orphans: {} referenced paths", valid.len());

        let listed = self.list_all().await.map_err(RetentionError::List)?;
        let total_files = listed.len();
        let orphans: Vec<String> = listed
            .into_iter()
            .filter(|o| !is_placeholder(&o.name) && !valid.contains(o.name.as_str()))
            .map(|o| o.name)
            .collect();
        info!("orphans: {} of {} objects unreferenced", orphans.len(), total_files);

        let (deleted, failed_batches) = self.delete_in_batches(&orphans).await;

        Ok(OrphanReport {
            valid_files: valid.len(),
            total_files,
            deleted_files: deleted.len(),
            deleted_paths: deleted,
            failed_batches,
        })
    }
}
