use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use super::domain::{
    Community, CommunityDraft, CommunityId, Event, EventDraft, EventId, User, UserId,
};
use super::repository::{CommunityRepository, EventRepository, RepositoryError, UserRepository};
use super::EngagementError;

/// Upper bound on compare-and-swap attempts for a single link write.
const MAX_LINK_ATTEMPTS: usize = 3;

static COMMUNITY_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_community_id() -> CommunityId {
    let id = COMMUNITY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CommunityId(format!("com-{id:06}"))
}

fn next_event_id() -> EventId {
    let id = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EventId(format!("evt-{id:06}"))
}

/// What a reconciliation pass repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Events whose owning community was not listing them.
    pub relinked: Vec<EventId>,
    /// Ids dropped from community sets because no matching event exists.
    pub unlinked: Vec<EventId>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.relinked.is_empty() && self.unlinked.is_empty()
    }
}

/// Sole owner of the Community↔Event bidirectional link.
///
/// Event creation and deletion are two-document sequences with no
/// transaction underneath: the event write and the community-set write
/// land separately. Each single write runs under the store's versioned
/// replace; a failure between the two leaves a reconcilable gap that is
/// logged and later repaired by [`IntegrityManager::reconcile`]. No other
/// component may touch `Community.events`.
pub struct IntegrityManager<E, C, U> {
    events: Arc<E>,
    communities: Arc<C>,
    users: Arc<U>,
}

impl<E, C, U> IntegrityManager<E, C, U>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
{
    pub fn new(events: Arc<E>, communities: Arc<C>, users: Arc<U>) -> Self {
        Self {
            events,
            communities,
            users,
        }
    }

    /// Create a community owned by the actor and flag the actor as a
    /// community owner. The flag is a second document write; if it fails
    /// the community stands and the gap is logged for reconciliation.
    pub fn create_community(
        &self,
        actor: &UserId,
        draft: CommunityDraft,
    ) -> Result<Community, EngagementError> {
        draft.validate()?;

        if self.communities.fetch_by_owner(actor)?.is_some() {
            return Err(EngagementError::Conflict("user already owns a community"));
        }
        let user = self
            .users
            .fetch(actor)?
            .ok_or(EngagementError::NotFound("user"))?;

        let community = Community {
            id: next_community_id(),
            name: draft.name,
            description: draft.description,
            image: draft.image,
            owner: actor.clone(),
            events: Vec::new(),
            version: 0,
        };
        let stored = self.communities.insert(community)?;

        if let Err(err) = self.flag_owner(user) {
            error!(
                community = %stored.id.0,
                user = %actor.0,
                %err,
                "community saved but owner flag update failed; reconciliation candidate"
            );
        }

        Ok(stored)
    }

    /// Create an event under the actor's community, then append its id to
    /// the community's `events` set. The append is idempotent and
    /// retried; if it still fails the event stands, the gap is logged,
    /// and the create is reported successfully.
    pub fn create_event(
        &self,
        actor: &UserId,
        draft: EventDraft,
    ) -> Result<Event, EngagementError> {
        draft.validate()?;

        let community = self
            .communities
            .fetch_by_owner(actor)?
            .ok_or(EngagementError::NotFound("community"))?;

        let event = Event {
            id: next_event_id(),
            title: draft.title,
            description: draft.description,
            schedule: draft.schedule,
            location: draft.location,
            image: draft.image,
            duration_minutes: draft.duration_minutes,
            targeted_skills: draft.targeted_skills,
            community: community.id.clone(),
            applicants: Vec::new(),
            version: 0,
        };
        let stored = self.events.insert(event)?;

        if let Err(err) = self.link_event(&community.id, &stored.id) {
            error!(
                event = %stored.id.0,
                community = %community.id.0,
                %err,
                "event saved but community link failed; reconciliation candidate"
            );
        }

        Ok(stored)
    }

    /// Replace an event's content fields. The owning community and the
    /// applicant list are never touched here.
    pub fn edit_event(
        &self,
        actor: &UserId,
        event_id: &EventId,
        draft: EventDraft,
    ) -> Result<Event, EngagementError> {
        draft.validate()?;

        for _ in 0..MAX_LINK_ATTEMPTS {
            let mut event = self
                .events
                .fetch(event_id)?
                .ok_or(EngagementError::NotFound("event"))?;
            self.require_owner(&event, actor)?;
            let expected = event.version;

            event.title = draft.title.clone();
            event.description = draft.description.clone();
            event.schedule = draft.schedule;
            event.location = draft.location.clone();
            event.image = draft.image.clone();
            event.duration_minutes = draft.duration_minutes;
            event.targeted_skills = draft.targeted_skills.clone();

            match self.events.update(event, expected) {
                Ok(updated) => return Ok(updated),
                Err(RepositoryError::VersionMismatch) => continue,
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngagementError::Conflict(
            "event is being modified concurrently",
        ))
    }

    /// Delete an event: resolve its community, check ownership, unlink,
    /// then remove the record. A non-owner fails with an authorization
    /// error, never not-found, so callers can tell the two apart.
    pub fn delete_event(
        &self,
        actor: &UserId,
        event_id: &EventId,
    ) -> Result<Event, EngagementError> {
        let event = self
            .events
            .fetch(event_id)?
            .ok_or(EngagementError::NotFound("event"))?;
        let community = self.require_owner(&event, actor)?;

        self.unlink_event(&community.id, event_id)?;

        if let Err(err) = self.events.delete(event_id) {
            error!(
                event = %event_id.0,
                community = %community.id.0,
                %err,
                "event unlinked but record delete failed; reconciliation candidate"
            );
            return Err(EngagementError::Integrity(format!(
                "event {} was unlinked but its record could not be deleted",
                event_id.0
            )));
        }

        Ok(event)
    }

    /// Repair pass over the bidirectional invariant: re-add events their
    /// community stopped listing, drop ids that resolve to nothing.
    pub fn reconcile(&self) -> Result<ReconciliationReport, EngagementError> {
        let events = self.events.list()?;
        let communities = self.communities.list()?;
        let mut report = ReconciliationReport::default();

        for event in &events {
            let listed = communities
                .iter()
                .find(|community| community.id == event.community);
            match listed {
                Some(community) if community.events.contains(&event.id) => {}
                Some(community) => {
                    self.link_event(&community.id, &event.id)?;
                    report.relinked.push(event.id.clone());
                }
                None => {
                    // Nothing to re-attach the event to; an operator has
                    // to decide whether the event or the community is the
                    // survivor.
                    error!(
                        event = %event.id.0,
                        community = %event.community.0,
                        "event references a community that does not exist"
                    );
                }
            }
        }

        for community in &communities {
            let dangling: Vec<EventId> = community
                .events
                .iter()
                .filter(|id| {
                    !events
                        .iter()
                        .any(|event| event.id == **id && event.community == community.id)
                })
                .cloned()
                .collect();
            if dangling.is_empty() {
                continue;
            }

            self.mutate_community(&community.id, |stored| {
                stored.events.retain(|id| !dangling.contains(id));
                Ok(())
            })?;
            report.unlinked.extend(dangling);
        }

        Ok(report)
    }

    fn require_owner(&self, event: &Event, actor: &UserId) -> Result<Community, EngagementError> {
        let community = self.communities.fetch(&event.community)?.ok_or_else(|| {
            EngagementError::Integrity(format!(
                "event {} references missing community {}",
                event.id.0, event.community.0
            ))
        })?;

        if community.owner != *actor {
            return Err(EngagementError::Unauthorized("event"));
        }
        Ok(community)
    }

    /// Append the event id to the community's set if absent. Safe to
    /// retry: replaying the append changes nothing.
    fn link_event(
        &self,
        community_id: &CommunityId,
        event_id: &EventId,
    ) -> Result<(), EngagementError> {
        self.mutate_community(community_id, |community| {
            if !community.events.contains(event_id) {
                community.events.push(event_id.clone());
            }
            Ok(())
        })
    }

    fn unlink_event(
        &self,
        community_id: &CommunityId,
        event_id: &EventId,
    ) -> Result<(), EngagementError> {
        self.mutate_community(community_id, |community| {
            community.events.retain(|id| id != event_id);
            Ok(())
        })
    }

    fn mutate_community(
        &self,
        id: &CommunityId,
        op: impl Fn(&mut Community) -> Result<(), EngagementError>,
    ) -> Result<(), EngagementError> {
        for _ in 0..MAX_LINK_ATTEMPTS {
            let mut community = self
                .communities
                .fetch(id)?
                .ok_or(EngagementError::NotFound("community"))?;
            let expected = community.version;

            op(&mut community)?;

            match self.communities.update(community, expected) {
                Ok(_) => return Ok(()),
                Err(RepositoryError::VersionMismatch) => continue,
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngagementError::Conflict(
            "community is being modified concurrently",
        ))
    }

    fn flag_owner(&self, user: User) -> Result<(), EngagementError> {
        if user.is_community_owner {
            return Ok(());
        }

        let mut current = user;
        for _ in 0..MAX_LINK_ATTEMPTS {
            let expected = current.version;
            current.is_community_owner = true;

            match self.users.update(current.clone(), expected) {
                Ok(_) => return Ok(()),
                Err(RepositoryError::VersionMismatch) => {
                    let id = current.id.clone();
                    current = self
                        .users
                        .fetch(&id)?
                        .ok_or(EngagementError::NotFound("user"))?;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngagementError::Conflict(
            "user record is being modified concurrently",
        ))
    }
}
