//! Storage wiring shared by every handler.

use std::sync::Arc;

use epro_infra::{
    AttachmentService, FileStore, InMemoryFileStore, InMemoryProcurementStore, ProcurementStore,
    SharedStore,
};

#[derive(Clone)]
pub struct AppServices {
    store: SharedStore,
    attachments: AttachmentService,
}

impl AppServices {
    pub fn new(store: SharedStore, files: Arc<dyn FileStore>) -> Self {
        let attachments = AttachmentService::new(store.clone(), files);
        Self { store, attachments }
    }

    /// Everything in process memory; used by tests and when no database is configured.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryProcurementStore::new()),
            Arc::new(InMemoryFileStore::new()),
        )
    }

    pub fn store(&self) -> &dyn ProcurementStore {
        self.store.as_ref()
    }

    pub fn attachments(&self) -> &AttachmentService {
        &self.attachments
    }
}
