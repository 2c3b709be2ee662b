pub mod app;
pub mod ops;

pub use geoextent_core::error::{ExtentError, Result};
pub use geoextent_core::model::{Extent, ExtractOptions, WalkOptions};
pub use geoextent_handlers::{from_directory, from_file};
pub use geoextent_providers::{from_remote, from_remote_many, RemoteOptions};
