pub mod asset;
pub mod notification_store;
pub mod progress;
pub mod rotation;
pub mod selected_file;
pub mod session;

pub use asset::{Asset, AssetFormat, Collection};
pub use notification_store::{Notification, NotificationLevel, NotificationStore};
pub use progress::{ProgressEvent, ProgressStage};
pub use rotation::{Axis, RotationEdit, RotationRequest};
pub use selected_file::SelectedFile;
pub use session::{GenerationSession, SessionEffect, SessionInput, SessionStage};
