pub mod file_header;
pub mod save_error;
pub mod save_metadata;
pub mod saveable_ext;
pub mod snapshot;
pub mod stand_blob;

pub use save_error::SaveError;
pub use save_metadata::SnapshotMetadata;
pub use saveable_ext::SaveableAppExt;
pub use snapshot::{LandscapeSnapshot, RuSnapshot};
pub use stand_blob::{StandBlob, StandUnitBlob, STAND_BLOB_MAGIC};
