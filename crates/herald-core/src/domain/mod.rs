//! Domain model (ids, request, artifacts, stages, job record, outcomes, errors).

pub mod artifact;
pub mod errors;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod request;
pub mod state;

pub use artifact::{ArtifactContent, ArtifactOrigin, ArtifactSetError, ENTRY_PAGE, GeneratedArtifactSet};
pub use errors::{
    DeliveryFailure, DispatchError, GenerationFailure, PublicationFailure, PublicationStep,
    PublisherError, TransitionError, ValidationError,
};
pub use ids::{DeliveryId, JobId};
pub use job::FulfillmentJob;
pub use outcome::{DeliveryOutcome, OutcomeReport, PublicationResult, ReportStatus};
pub use request::{Assignment, Attachment, FulfillmentRequest, JobKey};
pub use state::JobStage;
