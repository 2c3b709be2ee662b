pub mod ops;
pub mod provider;

pub use ops::dispatch::{find_provider, registry};
pub use ops::remote::{from_remote, from_remote_many, RemoteOptions};
