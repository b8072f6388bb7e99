//! Community engagement engine.
//!
//! Three responsibilities live here: keeping the bidirectional
//! Community↔Event link consistent as events come and go
//! ([`integrity`]), governing the applicant lifecycle on each event
//! ([`applications`]), and serving the filtered/paginated/ranked read
//! side ([`query`], [`ranking`]). Collaborator seams ([`repository`],
//! [`similarity`], [`media`]) keep the engine free of storage, scoring,
//! and image concerns.

pub mod applications;
pub mod domain;
pub mod integrity;
pub mod media;
pub mod query;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod similarity;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use applications::ApplicationService;
use domain::ValidationFailure;
use integrity::IntegrityManager;
use media::{MediaError, MediaStore};
use query::EventQueryService;
use ranking::RankingGateway;
use repository::{CommunityRepository, EventRepository, RepositoryError, UserRepository};
use similarity::{SimilarityClient, SimilarityError};

pub use domain::{
    Applicant, ApplicantId, ApplicationStatus, Community, CommunityDraft, CommunityId, Event,
    EventDraft, EventId, Schedule, User, UserId, UserRole,
};
pub use integrity::ReconciliationReport;
pub use query::{
    AppliedEventView, ApplicantView, CommunityImageView, CommunityView, EventDetailView,
    OwnerEventView, UpcomingEventView, UserProfileView, UPCOMING_PAGE_SIZE,
};
pub use ranking::DEFAULT_QUERY_THRESHOLD;
pub use router::engagement_router;

/// Failure taxonomy shared by every engagement operation.
#[derive(Debug, thiserror::Error)]
pub enum EngagementError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("actor is not authorized for this {0}")]
    Unauthorized(&'static str),
    #[error("referential link out of sync: {0}")]
    Integrity(String),
    #[error("upstream collaborator unavailable: {0}")]
    Upstream(String),
}

impl From<ValidationFailure> for EngagementError {
    fn from(value: ValidationFailure) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<RepositoryError> for EngagementError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => Self::Conflict("record already exists"),
            RepositoryError::NotFound => Self::NotFound("record"),
            RepositoryError::VersionMismatch => Self::Conflict("record was modified concurrently"),
            RepositoryError::Unavailable(detail) => Self::Upstream(detail),
        }
    }
}

impl From<SimilarityError> for EngagementError {
    fn from(value: SimilarityError) -> Self {
        Self::Upstream(value.to_string())
    }
}

impl From<MediaError> for EngagementError {
    fn from(value: MediaError) -> Self {
        match value {
            MediaError::MalformedPayload | MediaError::UnsupportedType(_) => {
                Self::Validation(value.to_string())
            }
            MediaError::NotFound => Self::NotFound("media"),
            MediaError::Unavailable(detail) => Self::Upstream(detail),
        }
    }
}

impl IntoResponse for EngagementError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngagementError::Validation(_) => StatusCode::BAD_REQUEST,
            EngagementError::NotFound(_) => StatusCode::NOT_FOUND,
            EngagementError::Conflict(_) => StatusCode::CONFLICT,
            EngagementError::Unauthorized(_) => StatusCode::FORBIDDEN,
            EngagementError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngagementError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// The engine's public facade: the four components wired over one shared
/// set of collaborators.
pub struct EngagementCore<E, C, U, S> {
    pub applications: ApplicationService<E, C>,
    pub integrity: IntegrityManager<E, C, U>,
    pub queries: EventQueryService<E, C, U>,
    pub ranking: RankingGateway<E, C, U, S>,
    pub media: Arc<dyn MediaStore>,
}

impl<E, C, U, S> EngagementCore<E, C, U, S>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    pub fn new(
        events: Arc<E>,
        communities: Arc<C>,
        users: Arc<U>,
        similarity: Arc<S>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            applications: ApplicationService::new(events.clone(), communities.clone()),
            integrity: IntegrityManager::new(events.clone(), communities.clone(), users.clone()),
            queries: EventQueryService::new(events.clone(), communities.clone(), users.clone()),
            ranking: RankingGateway::new(events, communities, users, similarity),
            media,
        }
    }
}
