mod host;
mod host_api;
mod leadership;
mod pending;
mod reader;
mod revision_table;
mod sync_wait;

pub use host_api::AppliedRevisionError;
pub use host_api::CommandError;
pub use host_api::LocalRevisionError;
pub use host_api::QueryError;
pub use host_api::ReadKind;
pub use host_api::SyncError;
pub use host_api::SyncRevisionError;
pub use revision_table::RevisionTable;

pub(crate) use host::RsmHost;
pub(crate) use host::RsmHostConfig;
pub(crate) use host_api::LogReadOutput;
pub(crate) use host_api::SyncRevisionInput;
pub(crate) use sync_wait::SyncWaitKey;
