//! Offline mutation queue: capture writes that fail while offline, replay them in order
//! once connectivity returns.

mod connectivity;
mod model;
mod mutation;
mod repository;
mod service;


pub use connectivity::ConnectivityMonitor;
pub use model::{
    cache_key, DrainReport, EnqueueOutcome, NewQueuedMutation, QueuedMutation,
    QueuedMutationStatus, SubmitOutcome,
};
pub use mutation::{
    MutationError, MutationHandler, MutationInterface, MutationRegistry, MutationRequest,
    MutationResult,
};
pub use repository::OfflineQueueRepositoryTrait;
pub use service::OfflineMutationService;
