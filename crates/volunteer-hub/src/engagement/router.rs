use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ApplicantId, CommunityDraft, CommunityId, EventDraft, EventId, Schedule, UserId,
};
use super::media::decode_data_uri;
use super::repository::{CommunityRepository, EventRepository, UserRepository};
use super::similarity::SimilarityClient;
use super::{EngagementCore, EngagementError};

/// Header carrying the verified actor id. The upstream identity gateway
/// authenticates the caller and injects this; the engine trusts it.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Router builder exposing every engagement operation.
pub fn engagement_router<E, C, U, S>(core: Arc<EngagementCore<E, C, U, S>>) -> Router
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    Router::new()
        .route(
            "/api/v1/communities",
            post(create_community_handler::<E, C, U, S>).get(list_communities_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/communities/:community_id",
            get(get_community_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/communities/:community_id/events",
            get(community_events_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events",
            post(create_event_handler::<E, C, U, S>).get(upcoming_events_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id",
            get(get_event_handler::<E, C, U, S>)
                .put(edit_event_handler::<E, C, U, S>)
                .delete(delete_event_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id/applicants",
            get(event_applicants_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id/applications",
            post(apply_handler::<E, C, U, S>).delete(cancel_application_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id/applications/me",
            get(application_status_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id/applicants/:applicant_id/accept",
            post(accept_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id/applicants/:applicant_id/reject",
            post(reject_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id/invitations",
            post(invite_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/events/:event_id/invitations/:user_id",
            delete(cancel_invite_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/owner/events",
            get(owner_events_handler::<E, C, U, S>),
        )
        .route("/api/v1/me/events", get(applied_events_handler::<E, C, U, S>))
        .route(
            "/api/v1/volunteers",
            get(list_volunteers_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/rankings/events",
            get(rank_events_by_skills_handler::<E, C, U, S>)
                .post(rank_events_by_query_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/rankings/volunteers",
            post(rank_volunteers_handler::<E, C, U, S>),
        )
        .route(
            "/api/v1/maintenance/reconcile",
            post(reconcile_handler::<E, C, U, S>),
        )
        .with_state(core)
}

#[derive(Debug, Deserialize)]
pub struct CreateCommunityRequest {
    pub name: String,
    pub description: String,
    /// Inline `data:image/...;base64,...` payload.
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: String,
    /// Inline `data:image/...;base64,...` payload.
    pub image: String,
    pub targeted_skills: Vec<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub user: UserId,
}

#[derive(Debug, Deserialize)]
pub struct RankQueryRequest {
    pub query: String,
    #[serde(default)]
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
}

fn actor_from(headers: &HeaderMap) -> Result<UserId, EngagementError> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| UserId(raw.to_string()))
        .ok_or(EngagementError::Unauthorized("request"))
}

async fn create_community_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    headers: HeaderMap,
    Json(request): Json<CreateCommunityRequest>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let image = store_image(&core, &request.image)?;
    let draft = CommunityDraft {
        name: request.name,
        description: request.description,
        image,
    };

    let community = core.integrity.create_community(&actor, draft)?;
    Ok((StatusCode::CREATED, Json(json!({ "community": community }))).into_response())
}

async fn list_communities_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let communities = core.queries.communities()?;
    Ok(Json(communities).into_response())
}

async fn get_community_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(community_id): Path<String>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let community = core.queries.community(&CommunityId(community_id))?;
    Ok(Json(community).into_response())
}

async fn community_events_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(community_id): Path<String>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let events = core.queries.community_events(&CommunityId(community_id))?;
    Ok(Json(json!({ "events": events })).into_response())
}

async fn create_event_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    headers: HeaderMap,
    Json(request): Json<EventRequest>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let draft = event_draft(&core, request)?;

    let event = core.integrity.create_event(&actor, draft)?;
    Ok((StatusCode::CREATED, Json(json!({ "event": event }))).into_response())
}

async fn upcoming_events_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Query(pagination): Query<PageQuery>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let today = Local::now().date_naive();
    let events = core.queries.upcoming(pagination.page, today)?;
    Ok(Json(events).into_response())
}

async fn get_event_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let event = core.queries.event(&EventId(event_id))?;
    Ok(Json(event).into_response())
}

async fn edit_event_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<EventRequest>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let draft = event_draft(&core, request)?;

    let event = core
        .integrity
        .edit_event(&actor, &EventId(event_id), draft)?;
    Ok(Json(json!({ "event": event })).into_response())
}

async fn delete_event_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let removed = core.integrity.delete_event(&actor, &EventId(event_id))?;
    Ok(Json(json!({ "removed": removed })).into_response())
}

async fn event_applicants_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let applicants = core.queries.event_applicants(&EventId(event_id))?;
    Ok(Json(json!({ "applicants": applicants })).into_response())
}

async fn apply_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let applicant = core.applications.apply(&EventId(event_id), &actor)?;
    Ok((StatusCode::CREATED, Json(json!({ "applicant": applicant }))).into_response())
}

async fn cancel_application_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let withdrawn = core.applications.cancel(&EventId(event_id), &actor)?;
    Ok(Json(json!({ "withdrawn": withdrawn })).into_response())
}

async fn application_status_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let status = core
        .applications
        .application_status(&EventId(event_id), &actor)?;
    Ok(Json(json!({ "status": status })).into_response())
}

async fn accept_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path((event_id, applicant_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let applicant = core.applications.accept(
        &EventId(event_id),
        &actor,
        &ApplicantId(applicant_id),
    )?;
    Ok(Json(json!({ "applicant": applicant })).into_response())
}

async fn reject_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path((event_id, applicant_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let applicant = core.applications.reject(
        &EventId(event_id),
        &actor,
        &ApplicantId(applicant_id),
    )?;
    Ok(Json(json!({ "applicant": applicant })).into_response())
}

async fn invite_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<InviteRequest>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let applicant = core
        .applications
        .invite(&EventId(event_id), &actor, &request.user)?;
    Ok((StatusCode::CREATED, Json(json!({ "applicant": applicant }))).into_response())
}

async fn cancel_invite_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Path((event_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let withdrawn =
        core.applications
            .cancel_invite(&EventId(event_id), &actor, &UserId(user_id))?;
    Ok(Json(json!({ "withdrawn": withdrawn })).into_response())
}

async fn owner_events_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let events = core.queries.owner_events(&actor)?;
    Ok(Json(json!({ "events": events })).into_response())
}

async fn applied_events_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let events = core.queries.applied_events(&actor)?;
    Ok(Json(events).into_response())
}

async fn list_volunteers_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let volunteers = core.queries.volunteers()?;
    Ok(Json(volunteers).into_response())
}

async fn rank_events_by_skills_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    headers: HeaderMap,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let actor = actor_from(&headers)?;
    let today = Local::now().date_naive();
    let events = core.ranking.events_by_skills(&actor, today)?;
    Ok(Json(events).into_response())
}

async fn rank_events_by_query_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Json(request): Json<RankQueryRequest>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let events = core
        .ranking
        .events_by_query(&request.query, request.threshold)?;
    Ok(Json(events).into_response())
}

async fn rank_volunteers_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
    Json(request): Json<RankQueryRequest>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let volunteers = core
        .ranking
        .volunteers_by_query(&request.query, request.threshold)?;
    Ok(Json(volunteers).into_response())
}

async fn reconcile_handler<E, C, U, S>(
    State(core): State<Arc<EngagementCore<E, C, U, S>>>,
) -> Result<Response, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let report = core.integrity.reconcile()?;
    Ok(Json(report).into_response())
}

/// Decode an inline payload and hand it to the media collaborator; the
/// engine only ever stores the returned reference.
fn store_image<E, C, U, S>(
    core: &EngagementCore<E, C, U, S>,
    raw: &str,
) -> Result<String, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let payload = decode_data_uri(raw)?;
    Ok(core.media.store(&payload)?)
}

fn event_draft<E, C, U, S>(
    core: &EngagementCore<E, C, U, S>,
    request: EventRequest,
) -> Result<EventDraft, EngagementError>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    let image = store_image(core, &request.image)?;
    Ok(EventDraft {
        title: request.title,
        description: request.description,
        schedule: request.schedule,
        location: request.location,
        image,
        targeted_skills: request.targeted_skills,
        duration_minutes: request.duration_minutes,
    })
}
