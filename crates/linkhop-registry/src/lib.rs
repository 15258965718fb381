//! The linkhop registry: the façade every caller talks to, the session
//! identity resolver and the asynchronous deletion pipeline.

pub mod deletion;
pub mod error;
pub mod identity;
pub mod registry;

pub use deletion::{DeletionPipeline, DeletionQueue, DeletionRequest, DeletionWorker};
pub use error::{RegistryError, Result};
pub use identity::{IdentityResolver, Session, SessionSigner};
pub use registry::{
    normalize_url, AddOutcome, AddStatus, BatchEntry, BatchItem, Registry, RegistryConfig,
};
