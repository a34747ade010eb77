//! Shared handler state: the backend handles built once at startup.

use crate::{
    models::object_key::{ObjectNaming, PublicUrls},
    services::{
        backend::{ImageTable, ObjectStore},
        generation::Generation,
        image_generator::ImageGenerator,
        local_store::LocalObjectStore,
        retention::{Cleanup, RetentionOptions},
    },
};
use reqwest::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub table: Arc<dyn ImageTable>,
    /// `None` when no image API key is configured.
    pub generator: Option<Arc<dyn ImageGenerator>>,
    pub http: Client,
    pub naming: Arc<ObjectNaming>,
    pub urls: Arc<PublicUrls>,
    pub retention: Arc<RetentionOptions>,
    /// Set for the local backend, which serves its own public URLs.
    pub local: Option<LocalObjectStore>,
}

impl AppState {
    pub fn cleanup(&self) -> Cleanup<'_> {
        Cleanup {
            store: self.store.as_ref(),
            table: self.table.as_ref(),
            naming: &self.naming,
            urls: &self.urls,
            options: &self.retention,
        }
    }

    pub fn generation(&self) -> Generation<'_> {
        Generation {
            generator: self.generator.as_deref(),
            http: &self.http,
            store: self.store.as_ref(),
            table: self.table.as_ref(),
            naming: &self.naming,
            urls: &self.urls,
            retention: &self.retention,
        }
    }
}
