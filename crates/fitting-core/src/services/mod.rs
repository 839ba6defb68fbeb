pub mod backend;
pub mod catalog_sync;
pub mod file_validator;
pub mod progress_stream;
pub mod upload_control;
pub mod viewer_handoff;

#[cfg(test)]
pub(crate) mod mock_backend;

pub use backend::{BodyUploadResponse, ByteStream, FittingBackend, HttpBackend};
pub use catalog_sync::{CatalogStore, CatalogSync, RefreshPolicy};
pub use progress_stream::{ProgressEventStream, SseDecoder, progress_events};
pub use upload_control::{ControlEvent, UploadControl};
pub use viewer_handoff::{AdjustmentEntry, AdjustmentSession, Handoff, HandoffReference};
