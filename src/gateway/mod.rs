//! Gateway assembly: the orchestrator, job tracking and the builder

mod builder;
mod engine;
mod orchestrator;

pub use builder::{Huginn, HuginnBuilder};
pub use engine::Gateway;
pub use orchestrator::{DEFAULT_CALL_TIMEOUT, Orchestrator};
