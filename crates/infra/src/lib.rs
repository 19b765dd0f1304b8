//! Infrastructure layer: storage backends, attachment files, configuration.

pub mod attachments;
pub mod config;
pub mod files;
pub mod sequence;
pub mod store;

pub use attachments::AttachmentService;
pub use config::{AppConfig, ConfigError};
pub use files::{FileStore, InMemoryFileStore, LocalFileStore};
pub use store::{
    InMemoryProcurementStore, PostgresProcurementStore, ProcurementStore, SharedStore, StoreError,
    StoreResult,
};
