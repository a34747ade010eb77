//! Maintenance endpoints, one per cleanup policy.
//!
//! - `POST /api/cleanup-storage`  - delete objects no record references
//! - `POST /api/enforce-retention` - keep only the newest `cap` images
//!
//! Neither takes a body. Partial batch failures still answer 200 and are
//! listed under `failedBatches`.

use crate::{
    errors::AppError,
    services::retention::{BatchFailure, OrphanReport, RetentionReport},
    state::AppState,
};
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_files: Option<usize>,
    pub deleted_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_records: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_paths: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_batches: Vec<BatchFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile_error: Option<String>,
}

fn summary_message(deleted: usize, partial: bool) -> String {
    if partial {
        "Storage cleanup partially completed".to_string()
    } else if deleted == 0 {
        "Nothing to clean up".to_string()
    } else {
        "Storage cleanup completed".to_string()
    }
}

impl From<OrphanReport> for CleanupResponse {
    fn from(report: OrphanReport) -> Self {
        Self {
            message: summary_message(report.deleted_files, !report.failed_batches.is_empty()),
            valid_files: Some(report.valid_files),
            deleted_files: report.deleted_files,
            total_files: Some(report.total_files),
            remaining_files: Some(report.total_files - report.deleted_files),
            deleted_records: None,
            deleted_paths: report.deleted_paths,
            failed_batches: report.failed_batches,
            reconcile_error: None,
        }
    }
}

impl From<RetentionReport> for CleanupResponse {
    fn from(report: RetentionReport) -> Self {
        let partial = !report.failed_batches.is_empty() || report.reconcile_error.is_some();
        Self {
            message: summary_message(report.objects_deleted, partial),
            valid_files: Some(report.objects_retained),
            deleted_files: report.objects_deleted,
            total_files: Some(report.objects_seen),
            remaining_files: Some(report.objects_seen - report.objects_deleted),
            deleted_records: Some(report.records_deleted),
            deleted_paths: Vec::new(),
            failed_batches: report.failed_batches,
            reconcile_error: report.reconcile_error,
        }
    }
}

pub async fn cleanup_storage(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, AppError> {
    let report = state.cleanup().purge_orphans().await?;
    Ok(Json(report.into()))
}

pub async fn enforce_retention(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, AppError> {
    let report = state.cleanup().enforce_retention().await?;
    Ok(Json(report.into()))
}
