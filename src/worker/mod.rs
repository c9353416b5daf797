#[allow(clippy::module_inception)]
pub mod worker;

pub use worker::SyncWorker;
