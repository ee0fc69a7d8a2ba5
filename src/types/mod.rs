//! Public types for the Huginn API.

mod descriptor;
mod generation;
mod job;
mod outcome;
mod request;

pub use descriptor::{CostModel, ProviderDescriptor};
pub use generation::{
    GatewayStats, GenerateResponse, Generation, GenerationStatus, JobStatus, LatencySnapshot,
};
pub use job::{AsyncJob, JobId, JobState, PollVerdict};
pub use outcome::{AsyncHandle, Content, FailureKind, Outcome, ProviderFailure, ProviderResult};
pub use request::{Capability, GLOBAL_CALLER, GenerationRequest, Payload};
