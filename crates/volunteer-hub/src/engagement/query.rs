use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use super::domain::{
    Applicant, ApplicantId, ApplicationStatus, Community, CommunityId, Event, EventId, Schedule,
    User, UserId, UserRole,
};
use super::repository::{CommunityRepository, EventRepository, UserRepository};
use super::EngagementError;

/// Events returned per page by the upcoming listing.
pub const UPCOMING_PAGE_SIZE: usize = 2;

/// Community projection attached to public event listings: only the id
/// and image reference, keeping payloads small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommunityImageView {
    pub id: CommunityId,
    pub image: String,
}

/// Public listing entry for an event. Applicants stay private here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingEventView {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub targeted_skills: Vec<String>,
    pub community: Option<CommunityImageView>,
}

impl UpcomingEventView {
    pub(crate) fn project(event: Event, community: Option<Community>) -> Self {
        Self {
            id: event.id,
            title: event.title,
            description: event.description,
            schedule: event.schedule,
            location: event.location,
            image: event.image,
            duration_minutes: event.duration_minutes,
            targeted_skills: event.targeted_skills,
            community: community.map(|community| CommunityImageView {
                id: community.id,
                image: community.image,
            }),
        }
    }
}

/// Identity fields exposed for a linked user. The raw user id is
/// deliberately absent from this projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfileView {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub skills: Vec<String>,
    pub academic_background: String,
    pub image: String,
}

impl From<&User> for UserProfileView {
    fn from(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            bio: user.bio.clone(),
            skills: user.skills.clone(),
            academic_background: user.academic_background.clone(),
            image: user.image.clone(),
        }
    }
}

/// An applicant record with its user profile populated, as owners see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicantView {
    pub id: ApplicantId,
    pub status: ApplicationStatus,
    pub user: Option<UserProfileView>,
}

/// Owner-side event projection: full applicant detail included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerEventView {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub targeted_skills: Vec<String>,
    pub applicants: Vec<ApplicantView>,
}

/// An event a volunteer applied to, flattened with their own status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedEventView {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub targeted_skills: Vec<String>,
    pub community: CommunityId,
    /// The volunteer's own status on this event; defensively `null` if
    /// the record vanished between lookup and projection.
    pub status: Option<ApplicationStatus>,
}

/// Direct event lookup projection. Applicants are excluded so one
/// volunteer never sees another's application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDetailView {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub targeted_skills: Vec<String>,
    pub community: CommunityId,
}

impl From<Event> for EventDetailView {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            title: event.title,
            description: event.description,
            schedule: event.schedule,
            location: event.location,
            image: event.image,
            duration_minutes: event.duration_minutes,
            targeted_skills: event.targeted_skills,
            community: event.community,
        }
    }
}

/// Community projection with the owner's profile populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunityView {
    pub id: CommunityId,
    pub name: String,
    pub description: String,
    pub image: String,
    pub owner: Option<UserProfileView>,
    pub events: Vec<EventId>,
}

/// Read side of the engine: date-filtered, paginated, and owner-scoped
/// retrieval. "Today" is threaded in explicitly so there is no ambient
/// clock.
pub struct EventQueryService<E, C, U> {
    events: Arc<E>,
    communities: Arc<C>,
    users: Arc<U>,
}

impl<E, C, U> EventQueryService<E, C, U>
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

    /// Events scheduled on or after `today` (date-only comparison), in
    /// the store's natural order, sliced into fixed-size pages. Page 1 is
    /// the default; page 0 means page 1.
    pub fn upcoming(
        &self,
        page: Option<u32>,
        today: NaiveDate,
    ) -> Result<Vec<UpcomingEventView>, EngagementError> {
        let page = page.unwrap_or(1).max(1) as usize;

        self.events
            .list()?
            .into_iter()
            .filter(|event| event.schedule.date >= today)
            .skip((page - 1) * UPCOMING_PAGE_SIZE)
            .take(UPCOMING_PAGE_SIZE)
            .map(|event| self.public_view(event))
            .collect()
    }

    /// Every event of the community owned by the actor, applicants
    /// populated with user profiles.
    pub fn owner_events(&self, actor: &UserId) -> Result<Vec<OwnerEventView>, EngagementError> {
        let community = self
            .communities
            .fetch_by_owner(actor)?
            .ok_or(EngagementError::NotFound("community"))?;
        self.events_with_applicants(&community)
    }

    /// Same owner-side projection for an arbitrary community id.
    pub fn community_events(
        &self,
        community_id: &CommunityId,
    ) -> Result<Vec<OwnerEventView>, EngagementError> {
        let community = self
            .communities
            .fetch(community_id)?
            .ok_or(EngagementError::NotFound("community"))?;
        self.events_with_applicants(&community)
    }

    /// Events where the actor appears in the applicant list, each
    /// flattened with the actor's own status.
    pub fn applied_events(&self, actor: &UserId) -> Result<Vec<AppliedEventView>, EngagementError> {
        let views = self
            .events
            .list()?
            .into_iter()
            .filter(|event| event.applicant_for_user(actor).is_some())
            .map(|event| {
                let status = event.applicant_for_user(actor).map(|record| record.status);
                AppliedEventView {
                    id: event.id,
                    title: event.title,
                    description: event.description,
                    schedule: event.schedule,
                    location: event.location,
                    image: event.image,
                    duration_minutes: event.duration_minutes,
                    targeted_skills: event.targeted_skills,
                    community: event.community,
                    status,
                }
            })
            .collect();
        Ok(views)
    }

    /// Applicants of one event with their user profiles populated.
    pub fn event_applicants(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<ApplicantView>, EngagementError> {
        let event = self
            .events
            .fetch(event_id)?
            .ok_or(EngagementError::NotFound("event"))?;
        event
            .applicants
            .iter()
            .map(|record| self.applicant_view(record))
            .collect()
    }

    pub fn event(&self, event_id: &EventId) -> Result<EventDetailView, EngagementError> {
        let event = self
            .events
            .fetch(event_id)?
            .ok_or(EngagementError::NotFound("event"))?;
        Ok(event.into())
    }

    pub fn community(&self, community_id: &CommunityId) -> Result<CommunityView, EngagementError> {
        let community = self
            .communities
            .fetch(community_id)?
            .ok_or(EngagementError::NotFound("community"))?;
        self.community_view(community)
    }

    pub fn communities(&self) -> Result<Vec<CommunityView>, EngagementError> {
        self.communities
            .list()?
            .into_iter()
            .map(|community| self.community_view(community))
            .collect()
    }

    /// Profile projection of every user with the volunteer role.
    pub fn volunteers(&self) -> Result<Vec<UserProfileView>, EngagementError> {
        let profiles = self
            .users
            .list_by_role(UserRole::Volunteer)?
            .iter()
            .map(UserProfileView::from)
            .collect();
        Ok(profiles)
    }

    fn events_with_applicants(
        &self,
        community: &Community,
    ) -> Result<Vec<OwnerEventView>, EngagementError> {
        let mut views = Vec::with_capacity(community.events.len());
        for event_id in &community.events {
            let Some(event) = self.events.fetch(event_id)? else {
                // Dangling id: the invariant is broken for this entry;
                // surface it to operators and keep serving the rest.
                warn!(
                    community = %community.id.0,
                    event = %event_id.0,
                    "community lists an event that does not exist"
                );
                continue;
            };

            let applicants = event
                .applicants
                .iter()
                .map(|record| self.applicant_view(record))
                .collect::<Result<Vec<_>, _>>()?;
            views.push(OwnerEventView {
                id: event.id,
                title: event.title,
                description: event.description,
                schedule: event.schedule,
                location: event.location,
                image: event.image,
                duration_minutes: event.duration_minutes,
                targeted_skills: event.targeted_skills,
                applicants,
            });
        }
        Ok(views)
    }

    fn applicant_view(&self, record: &Applicant) -> Result<ApplicantView, EngagementError> {
        let user = self.users.fetch(&record.user)?;
        Ok(ApplicantView {
            id: record.id.clone(),
            status: record.status,
            user: user.as_ref().map(UserProfileView::from),
        })
    }

    fn public_view(&self, event: Event) -> Result<UpcomingEventView, EngagementError> {
        let community = self.communities.fetch(&event.community)?;
        if community.is_none() {
            warn!(event = %event.id.0, "event references a missing community");
        }
        Ok(UpcomingEventView::project(event, community))
    }

    fn community_view(&self, community: Community) -> Result<CommunityView, EngagementError> {
        let owner = self.users.fetch(&community.owner)?;
        Ok(CommunityView {
            id: community.id,
            name: community.name,
            description: community.description,
            image: community.image,
            owner: owner.as_ref().map(UserProfileView::from),
            events: community.events,
        })
    }
}
