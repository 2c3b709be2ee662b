pub mod dispatch;
pub mod follow;
pub mod remote;
