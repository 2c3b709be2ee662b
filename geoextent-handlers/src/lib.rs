pub mod handler;
pub mod ops;

pub use ops::extract::from_file;
pub use ops::walk::from_directory;
