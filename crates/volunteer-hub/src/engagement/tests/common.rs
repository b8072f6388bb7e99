use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};

use crate::engagement::domain::{
    Community, CommunityDraft, CommunityId, Event, EventDraft, EventId, Schedule, User, UserId,
    UserRole,
};
use crate::engagement::media::{MediaError, MediaPayload, MediaStore};
use crate::engagement::repository::{
    CommunityRepository, EventRepository, RepositoryError, UserRepository,
};
use crate::engagement::similarity::{
    RankedCandidate, SimilarityClient, SimilarityError, SimilarityQuery,
};
use crate::engagement::EngagementCore;

pub(super) const TODAY: &str = "2025-05-20";

pub(super) fn today() -> NaiveDate {
    date(TODAY)
}

pub(super) fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
}

pub(super) fn schedule_on(day: NaiveDate) -> Schedule {
    Schedule {
        date: day,
        start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        end_time: NaiveTime::from_hms_opt(12, 0, 0).expect("valid time"),
    }
}

pub(super) fn volunteer(id: &str, skills: &[&str]) -> User {
    User {
        id: UserId(id.to_string()),
        role: UserRole::Volunteer,
        first_name: "Amina".to_string(),
        last_name: "Diallo".to_string(),
        bio: "Weekend volunteer".to_string(),
        skills: skills.iter().map(|skill| skill.to_string()).collect(),
        academic_background: "Environmental science".to_string(),
        image: "img-900001.png".to_string(),
        is_community_owner: false,
        version: 0,
    }
}

pub(super) fn owner(id: &str) -> User {
    User {
        id: UserId(id.to_string()),
        role: UserRole::Community,
        first_name: "Morgan".to_string(),
        last_name: "Reyes".to_string(),
        bio: "Runs the harbor volunteers".to_string(),
        skills: Vec::new(),
        academic_background: "Public administration".to_string(),
        image: "img-900002.png".to_string(),
        is_community_owner: false,
        version: 0,
    }
}

pub(super) fn community_draft(name: &str) -> CommunityDraft {
    CommunityDraft {
        name: name.to_string(),
        description: "Keeps the shoreline clean".to_string(),
        image: "img-000001.png".to_string(),
    }
}

pub(super) fn event_draft(title: &str, day: NaiveDate) -> EventDraft {
    EventDraft {
        title: title.to_string(),
        description: "Pick up litter along the shore".to_string(),
        schedule: schedule_on(day),
        location: "North Beach".to_string(),
        image: "img-000002.png".to_string(),
        targeted_skills: vec!["teamwork".to_string(), "first aid".to_string()],
        duration_minutes: Some(180),
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryEvents {
    records: Arc<Mutex<Vec<Event>>>,
}

impl EventRepository for MemoryEvents {
    fn insert(&self, event: Event) -> Result<Event, RepositoryError> {
        let mut guard = self.records.lock().expect("event store mutex poisoned");
        if guard.iter().any(|stored| stored.id == event.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(event.clone());
        Ok(event)
    }

    fn fetch(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        let guard = self.records.lock().expect("event store mutex poisoned");
        Ok(guard.iter().find(|stored| stored.id == *id).cloned())
    }

    fn update(&self, mut event: Event, expected_version: u64) -> Result<Event, RepositoryError> {
        let mut guard = self.records.lock().expect("event store mutex poisoned");
        let stored = guard
            .iter_mut()
            .find(|stored| stored.id == event.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::VersionMismatch);
        }
        event.version = expected_version + 1;
        *stored = event.clone();
        Ok(event)
    }

    fn delete(&self, id: &EventId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("event store mutex poisoned");
        let index = guard
            .iter()
            .position(|stored| stored.id == *id)
            .ok_or(RepositoryError::NotFound)?;
        guard.remove(index);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Event>, RepositoryError> {
        let guard = self.records.lock().expect("event store mutex poisoned");
        Ok(guard.clone())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryCommunities {
    records: Arc<Mutex<Vec<Community>>>,
}

impl CommunityRepository for MemoryCommunities {
    fn insert(&self, community: Community) -> Result<Community, RepositoryError> {
        let mut guard = self.records.lock().expect("community store mutex poisoned");
        if guard.iter().any(|stored| stored.id == community.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(community.clone());
        Ok(community)
    }

    fn fetch(&self, id: &CommunityId) -> Result<Option<Community>, RepositoryError> {
        let guard = self.records.lock().expect("community store mutex poisoned");
        Ok(guard.iter().find(|stored| stored.id == *id).cloned())
    }

    fn fetch_by_owner(&self, owner: &UserId) -> Result<Option<Community>, RepositoryError> {
        let guard = self.records.lock().expect("community store mutex poisoned");
        Ok(guard.iter().find(|stored| stored.owner == *owner).cloned())
    }

    fn update(
        &self,
        mut community: Community,
        expected_version: u64,
    ) -> Result<Community, RepositoryError> {
        let mut guard = self.records.lock().expect("community store mutex poisoned");
        let stored = guard
            .iter_mut()
            .find(|stored| stored.id == community.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::VersionMismatch);
        }
        community.version = expected_version + 1;
        *stored = community.clone();
        Ok(community)
    }

    fn list(&self) -> Result<Vec<Community>, RepositoryError> {
        let guard = self.records.lock().expect("community store mutex poisoned");
        Ok(guard.clone())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryUsers {
    records: Arc<Mutex<Vec<User>>>,
}

impl MemoryUsers {
    pub(super) fn seed(&self, user: User) {
        self.records
            .lock()
            .expect("user store mutex poisoned")
            .push(user);
    }
}

impl UserRepository for MemoryUsers {
    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let guard = self.records.lock().expect("user store mutex poisoned");
        Ok(guard.iter().find(|stored| stored.id == *id).cloned())
    }

    fn update(&self, mut user: User, expected_version: u64) -> Result<User, RepositoryError> {
        let mut guard = self.records.lock().expect("user store mutex poisoned");
        let stored = guard
            .iter_mut()
            .find(|stored| stored.id == user.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::VersionMismatch);
        }
        user.version = expected_version + 1;
        *stored = user.clone();
        Ok(user)
    }

    fn list_by_role(&self, role: UserRole) -> Result<Vec<User>, RepositoryError> {
        let guard = self.records.lock().expect("user store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|stored| stored.role == role)
            .cloned()
            .collect())
    }
}

/// Similarity double. Without a programmed response it echoes the
/// candidate list back ranked in order with score 1.0.
#[derive(Default, Clone)]
pub(super) struct StubSimilarity {
    response: Arc<Mutex<Option<Vec<RankedCandidate>>>>,
    calls: Arc<Mutex<Vec<RecordedRankCall>>>,
    fail: Arc<Mutex<bool>>,
}

#[derive(Debug, Clone)]
pub(super) struct RecordedRankCall {
    pub(super) query: SimilarityQuery,
    pub(super) candidates: Vec<String>,
    pub(super) threshold: Option<f32>,
}

impl StubSimilarity {
    pub(super) fn respond_with(&self, ranked: Vec<RankedCandidate>) {
        *self.response.lock().expect("stub mutex poisoned") = Some(ranked);
    }

    pub(super) fn fail_next(&self) {
        *self.fail.lock().expect("stub mutex poisoned") = true;
    }

    pub(super) fn calls(&self) -> Vec<RecordedRankCall> {
        self.calls.lock().expect("stub mutex poisoned").clone()
    }
}

impl SimilarityClient for StubSimilarity {
    fn rank(
        &self,
        query: &SimilarityQuery,
        candidates: &[String],
        threshold: Option<f32>,
    ) -> Result<Vec<RankedCandidate>, SimilarityError> {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .push(RecordedRankCall {
                query: query.clone(),
                candidates: candidates.to_vec(),
                threshold,
            });

        if *self.fail.lock().expect("stub mutex poisoned") {
            return Err(SimilarityError::Unavailable(
                "scoring service offline".to_string(),
            ));
        }

        if let Some(ranked) = self.response.lock().expect("stub mutex poisoned").clone() {
            return Ok(ranked);
        }

        Ok(candidates
            .iter()
            .map(|id| RankedCandidate {
                id: id.clone(),
                score: 1.0,
            })
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryMedia {
    blobs: Arc<Mutex<HashMap<String, MediaPayload>>>,
    sequence: Arc<AtomicU64>,
}

impl MediaStore for MemoryMedia {
    fn store(&self, payload: &MediaPayload) -> Result<String, MediaError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let reference = format!("img-{id:06}.{}", payload.content_type.subtype());
        self.blobs
            .lock()
            .expect("media mutex poisoned")
            .insert(reference.clone(), payload.clone());
        Ok(reference)
    }

    fn open(&self, reference: &str) -> Result<MediaPayload, MediaError> {
        self.blobs
            .lock()
            .expect("media mutex poisoned")
            .get(reference)
            .cloned()
            .ok_or(MediaError::NotFound)
    }
}

/// Event store wrapper that loses the version race a fixed number of
/// times before delegating.
#[derive(Clone)]
pub(super) struct ContendedEvents {
    inner: MemoryEvents,
    mismatches_left: Arc<AtomicUsize>,
}

impl ContendedEvents {
    pub(super) fn new(inner: MemoryEvents, mismatches: usize) -> Self {
        Self {
            inner,
            mismatches_left: Arc::new(AtomicUsize::new(mismatches)),
        }
    }
}

impl EventRepository for ContendedEvents {
    fn insert(&self, event: Event) -> Result<Event, RepositoryError> {
        self.inner.insert(event)
    }

    fn fetch(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn update(&self, event: Event, expected_version: u64) -> Result<Event, RepositoryError> {
        let remaining = self.mismatches_left.load(Ordering::Relaxed);
        if remaining > 0 {
            self.mismatches_left.store(remaining - 1, Ordering::Relaxed);
            return Err(RepositoryError::VersionMismatch);
        }
        self.inner.update(event, expected_version)
    }

    fn delete(&self, id: &EventId) -> Result<(), RepositoryError> {
        self.inner.delete(id)
    }

    fn list(&self) -> Result<Vec<Event>, RepositoryError> {
        self.inner.list()
    }
}

/// Community store wrapper whose updates fail a fixed number of times,
/// simulating the second write of a two-document sequence going down.
#[derive(Clone)]
pub(super) struct FlakyCommunities {
    inner: MemoryCommunities,
    failures_left: Arc<AtomicUsize>,
}

impl FlakyCommunities {
    pub(super) fn new(inner: MemoryCommunities, failures: usize) -> Self {
        Self {
            inner,
            failures_left: Arc::new(AtomicUsize::new(failures)),
        }
    }
}

impl CommunityRepository for FlakyCommunities {
    fn insert(&self, community: Community) -> Result<Community, RepositoryError> {
        self.inner.insert(community)
    }

    fn fetch(&self, id: &CommunityId) -> Result<Option<Community>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn fetch_by_owner(&self, owner: &UserId) -> Result<Option<Community>, RepositoryError> {
        self.inner.fetch_by_owner(owner)
    }

    fn update(
        &self,
        community: Community,
        expected_version: u64,
    ) -> Result<Community, RepositoryError> {
        let remaining = self.failures_left.load(Ordering::Relaxed);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::Relaxed);
            return Err(RepositoryError::Unavailable("link write refused".to_string()));
        }
        self.inner.update(community, expected_version)
    }

    fn list(&self) -> Result<Vec<Community>, RepositoryError> {
        self.inner.list()
    }
}

pub(super) type TestCore = EngagementCore<MemoryEvents, MemoryCommunities, MemoryUsers, StubSimilarity>;

pub(super) struct Harness {
    pub(super) core: Arc<TestCore>,
    pub(super) events: Arc<MemoryEvents>,
    pub(super) communities: Arc<MemoryCommunities>,
    pub(super) users: Arc<MemoryUsers>,
    pub(super) similarity: Arc<StubSimilarity>,
    pub(super) media: Arc<MemoryMedia>,
}

pub(super) fn harness() -> Harness {
    let events = Arc::new(MemoryEvents::default());
    let communities = Arc::new(MemoryCommunities::default());
    let users = Arc::new(MemoryUsers::default());
    let similarity = Arc::new(StubSimilarity::default());
    let media = Arc::new(MemoryMedia::default());

    let core = Arc::new(EngagementCore::new(
        events.clone(),
        communities.clone(),
        users.clone(),
        similarity.clone(),
        media.clone(),
    ));

    Harness {
        core,
        events,
        communities,
        users,
        similarity,
        media,
    }
}

/// Seed an owner user and create their community through the manager so
/// every link is consistent from the start.
pub(super) fn seed_community(harness: &Harness, owner_id: &str, name: &str) -> Community {
    harness.users.seed(owner(owner_id));
    harness
        .core
        .integrity
        .create_community(&UserId(owner_id.to_string()), community_draft(name))
        .expect("community created")
}

pub(super) fn seed_event(harness: &Harness, owner_id: &str, title: &str, day: NaiveDate) -> Event {
    harness
        .core
        .integrity
        .create_event(&UserId(owner_id.to_string()), event_draft(title, day))
        .expect("event created")
}

pub(super) fn user_id(raw: &str) -> UserId {
    UserId(raw.to_string())
}
