//! Contracts for the collaborators this core consumes but does not own:
//! the user directory, the object storage service, and the push gateway.
//!
//! All of them are injected into services by constructor as `Arc<dyn ...>`
//! so embedding applications (and tests) decide the concrete backend; no
//! module-level switch selects an implementation at runtime.

pub mod directory;
pub mod push;
pub mod storage;

pub use directory::{DirectoryUser, InMemoryUserDirectory, UserDirectory};
pub use push::{
    InMemoryPushGateway, PushDelivery, PushGateway, PushMessage, PushOutcome, MULTICAST_BATCH_LIMIT,
};
pub use storage::{InMemoryObjectStorage, ObjectStorage};
