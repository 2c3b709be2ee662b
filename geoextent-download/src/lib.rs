pub mod model;
pub mod ops;

pub use model::{DownloadOptions, FileDescriptor, SelectionMethod};
pub use ops::engine::{download_batch, DownloadOutcome};
