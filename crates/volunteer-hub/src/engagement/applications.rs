use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use super::domain::{Applicant, ApplicantId, ApplicationStatus, Event, EventId, UserId};
use super::repository::{CommunityRepository, EventRepository, RepositoryError};
use super::EngagementError;

/// Upper bound on compare-and-swap attempts for one applicant mutation.
/// Applicant writes are serialized per event by the store's versioned
/// replace; the engine never holds a lock.
const MAX_WRITE_ATTEMPTS: usize = 3;

static APPLICANT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_applicant_id() -> ApplicantId {
    let id = APPLICANT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicantId(format!("apl-{id:06}"))
}

/// Owner decision applied to an existing applicant record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Approve,
    Reject,
}

/// Legal transitions for an owner decision. Re-applying the decision a
/// record already reflects is a no-op; flipping a terminal decision is a
/// conflict.
fn next_status(
    current: ApplicationStatus,
    decision: Decision,
) -> Result<ApplicationStatus, EngagementError> {
    match decision {
        Decision::Approve => match current {
            ApplicationStatus::Rejected => {
                Err(EngagementError::Conflict("applicant was already rejected"))
            }
            _ => Ok(ApplicationStatus::Approved),
        },
        Decision::Reject => match current {
            ApplicationStatus::Approved => {
                Err(EngagementError::Conflict("applicant was already approved"))
            }
            _ => Ok(ApplicationStatus::Rejected),
        },
    }
}

/// State machine for the per-(event, user) application relationship.
///
/// Every mutation loads the event, applies the transition in memory, and
/// writes it back under optimistic versioning with a bounded retry
/// budget. Owner-only operations resolve the event's community to check
/// the actor.
pub struct ApplicationService<E, C> {
    events: Arc<E>,
    communities: Arc<C>,
}

impl<E, C> ApplicationService<E, C>
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
{
    pub fn new(events: Arc<E>, communities: Arc<C>) -> Self {
        Self {
            events,
            communities,
        }
    }

    /// Record a volunteer's application. A user may hold at most one
    /// applicant record per event, whatever its status.
    pub fn apply(&self, event_id: &EventId, actor: &UserId) -> Result<Applicant, EngagementError> {
        self.mutate(event_id, |event| {
            if event.applicant_for_user(actor).is_some() {
                return Err(EngagementError::Conflict(
                    "user already has an application for this event",
                ));
            }

            let applicant = Applicant {
                id: next_applicant_id(),
                user: actor.clone(),
                status: ApplicationStatus::Pending,
            };
            event.applicants.push(applicant.clone());
            Ok(applicant)
        })
    }

    /// Withdraw the actor's record entirely, whatever its status — an
    /// approved application can still be cancelled.
    pub fn cancel(&self, event_id: &EventId, actor: &UserId) -> Result<Applicant, EngagementError> {
        self.mutate(event_id, |event| {
            let index = event
                .applicants
                .iter()
                .position(|record| record.user == *actor)
                .ok_or(EngagementError::NotFound("application"))?;
            Ok(event.applicants.remove(index))
        })
    }

    /// Approve an applicant, located by the record's own id. Idempotent
    /// against re-invocation on an already approved record.
    pub fn accept(
        &self,
        event_id: &EventId,
        actor: &UserId,
        applicant_id: &ApplicantId,
    ) -> Result<Applicant, EngagementError> {
        self.decide(event_id, actor, applicant_id, Decision::Approve)
    }

    /// Record a rejection. The record stays on the event so later status
    /// queries see it; rejection is recorded, not erased.
    pub fn reject(
        &self,
        event_id: &EventId,
        actor: &UserId,
        applicant_id: &ApplicantId,
    ) -> Result<Applicant, EngagementError> {
        self.decide(event_id, actor, applicant_id, Decision::Reject)
    }

    /// Owner-initiated invitation: a distinct applicant record with
    /// status `invited`. Any existing record for the user blocks it.
    pub fn invite(
        &self,
        event_id: &EventId,
        actor: &UserId,
        user: &UserId,
    ) -> Result<Applicant, EngagementError> {
        self.mutate(event_id, |event| {
            self.require_owner(event, actor)?;

            if let Some(existing) = event.applicant_for_user(user) {
                return Err(match existing.status {
                    ApplicationStatus::Invited => {
                        EngagementError::Conflict("user is already invited to this event")
                    }
                    _ => EngagementError::Conflict(
                        "user already has an application for this event",
                    ),
                });
            }

            let applicant = Applicant {
                id: next_applicant_id(),
                user: user.clone(),
                status: ApplicationStatus::Invited,
            };
            event.applicants.push(applicant.clone());
            Ok(applicant)
        })
    }

    /// Remove an `invited` record. Records in any other state are left
    /// untouched and the call fails as not found.
    pub fn cancel_invite(
        &self,
        event_id: &EventId,
        actor: &UserId,
        user: &UserId,
    ) -> Result<Applicant, EngagementError> {
        self.mutate(event_id, |event| {
            self.require_owner(event, actor)?;

            let index = event
                .applicants
                .iter()
                .position(|record| {
                    record.user == *user && record.status == ApplicationStatus::Invited
                })
                .ok_or(EngagementError::NotFound("invitation"))?;
            Ok(event.applicants.remove(index))
        })
    }

    /// Report the actor's current status on an event, if any record
    /// exists.
    pub fn application_status(
        &self,
        event_id: &EventId,
        actor: &UserId,
    ) -> Result<Option<ApplicationStatus>, EngagementError> {
        let event = self
            .events
            .fetch(event_id)?
            .ok_or(EngagementError::NotFound("event"))?;
        Ok(event.applicant_for_user(actor).map(|record| record.status))
    }

    fn decide(
        &self,
        event_id: &EventId,
        actor: &UserId,
        applicant_id: &ApplicantId,
        decision: Decision,
    ) -> Result<Applicant, EngagementError> {
        self.mutate(event_id, |event| {
            self.require_owner(event, actor)?;

            let record = event
                .applicants
                .iter_mut()
                .find(|record| record.id == *applicant_id)
                .ok_or(EngagementError::NotFound("applicant"))?;
            record.status = next_status(record.status, decision)?;
            Ok(record.clone())
        })
    }

    fn require_owner(&self, event: &Event, actor: &UserId) -> Result<(), EngagementError> {
        let community = self.communities.fetch(&event.community)?.ok_or_else(|| {
            EngagementError::Integrity(format!(
                "event {} references missing community {}",
                event.id.0, event.community.0
            ))
        })?;

        if community.owner != *actor {
            return Err(EngagementError::Unauthorized("event"));
        }
        Ok(())
    }

    /// Load-mutate-store under the store's compare-and-swap. Concurrent
    /// writers on the same event cause a version mismatch; the losing
    /// side re-reads and replays its transition.
    fn mutate<T>(
        &self,
        event_id: &EventId,
        op: impl Fn(&mut Event) -> Result<T, EngagementError>,
    ) -> Result<T, EngagementError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut event = self
                .events
                .fetch(event_id)?
                .ok_or(EngagementError::NotFound("event"))?;
            let expected = event.version;

            let outcome = op(&mut event)?;

            match self.events.update(event, expected) {
                Ok(_) => return Ok(outcome),
                Err(RepositoryError::VersionMismatch) => {
                    warn!(
                        event = %event_id.0,
                        attempt,
                        "applicant write lost the version race, retrying"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngagementError::Conflict(
            "event is being modified concurrently",
        ))
    }
}
