//! Cache-aside weather lookups: the orchestrator that decides between cache
//! and upstream, and the service facade the request boundary calls.

mod error;
mod orchestrator;
mod service;

pub use error::{ErrorBody, FailureClass};
pub use orchestrator::CacheOrchestrator;
pub use service::LookupService;
