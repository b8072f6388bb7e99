use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::warn;

use super::domain::{Event, UserId, UserRole, ValidationFailure};
use super::query::{UpcomingEventView, UserProfileView};
use super::repository::{CommunityRepository, EventRepository, UserRepository};
use super::similarity::{SimilarityClient, SimilarityQuery};
use super::EngagementError;

/// Cut-off applied to free-text searches when the caller supplies none.
pub const DEFAULT_QUERY_THRESHOLD: f32 = 0.7;

/// Marshals candidates into the similarity collaborator's contract and
/// joins the returned ids back to full entities.
///
/// The gateway performs no scoring itself. The rejoin keeps the
/// collaborator's relevance order and tolerates ids the candidate set no
/// longer contains (the collaborator's index can lag the store) by
/// dropping them with a warning.
pub struct RankingGateway<E, C, U, S> {
    events: Arc<E>,
    communities: Arc<C>,
    users: Arc<U>,
    similarity: Arc<S>,
}

impl<E, C, U, S> RankingGateway<E, C, U, S>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    pub fn new(events: Arc<E>, communities: Arc<C>, users: Arc<U>, similarity: Arc<S>) -> Self {
        Self {
            events,
            communities,
            users,
            similarity,
        }
    }

    /// Rank upcoming events against the actor's skill set. No threshold:
    /// every candidate comes back, ordered by relevance.
    pub fn events_by_skills(
        &self,
        actor: &UserId,
        today: NaiveDate,
    ) -> Result<Vec<UpcomingEventView>, EngagementError> {
        let user = self
            .users
            .fetch(actor)?
            .ok_or(EngagementError::NotFound("user"))?;

        let candidates: Vec<Event> = self
            .events
            .list()?
            .into_iter()
            .filter(|event| event.schedule.date >= today)
            .collect();

        self.rerank_events(SimilarityQuery::Skills(user.skills), candidates, None)
    }

    /// Rank every event against a free-text query. This path applies no
    /// date filter; past events stay searchable.
    pub fn events_by_query(
        &self,
        query: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<UpcomingEventView>, EngagementError> {
        let query = required_query(query)?;
        let candidates = self.events.list()?;
        self.rerank_events(
            SimilarityQuery::Text(query),
            candidates,
            Some(threshold.unwrap_or(DEFAULT_QUERY_THRESHOLD)),
        )
    }

    /// Rank volunteer profiles against a free-text query.
    pub fn volunteers_by_query(
        &self,
        query: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<UserProfileView>, EngagementError> {
        let query = required_query(query)?;
        let candidates = self.users.list_by_role(UserRole::Volunteer)?;

        let ids: Vec<String> = candidates.iter().map(|user| user.id.0.clone()).collect();
        let ranked = self.similarity.rank(
            &SimilarityQuery::Text(query),
            &ids,
            Some(threshold.unwrap_or(DEFAULT_QUERY_THRESHOLD)),
        )?;

        let mut by_id: HashMap<String, UserProfileView> = candidates
            .iter()
            .map(|user| (user.id.0.clone(), UserProfileView::from(user)))
            .collect();

        let mut views = Vec::with_capacity(ranked.len());
        for candidate in ranked {
            match by_id.remove(&candidate.id) {
                Some(view) => views.push(view),
                None => warn!(
                    id = %candidate.id,
                    "similarity result references an unknown volunteer, dropping"
                ),
            }
        }
        Ok(views)
    }

    fn rerank_events(
        &self,
        query: SimilarityQuery,
        candidates: Vec<Event>,
        threshold: Option<f32>,
    ) -> Result<Vec<UpcomingEventView>, EngagementError> {
        let ids: Vec<String> = candidates.iter().map(|event| event.id.0.clone()).collect();
        let ranked = self.similarity.rank(&query, &ids, threshold)?;

        let mut by_id: HashMap<String, Event> = candidates
            .into_iter()
            .map(|event| (event.id.0.clone(), event))
            .collect();

        let mut views = Vec::with_capacity(ranked.len());
        for candidate in ranked {
            match by_id.remove(&candidate.id) {
                Some(event) => {
                    let community = self.communities.fetch(&event.community)?;
                    views.push(UpcomingEventView::project(event, community));
                }
                None => warn!(
                    id = %candidate.id,
                    "similarity result references an unknown event, dropping"
                ),
            }
        }
        Ok(views)
    }
}

fn required_query(raw: &str) -> Result<String, EngagementError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationFailure::MissingField("query").into());
    }
    Ok(trimmed.to_string())
}
