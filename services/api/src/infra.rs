use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use volunteer_hub::engagement::domain::{
    Community, CommunityId, Event, EventId, User, UserId, UserRole,
};
use volunteer_hub::engagement::media::{MediaError, MediaPayload, MediaStore};
use volunteer_hub::engagement::repository::{
    CommunityRepository, EventRepository, RepositoryError, UserRepository,
};
use volunteer_hub::engagement::similarity::{
    RankedCandidate, SimilarityClient, SimilarityError, SimilarityQuery,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) media: Arc<dyn MediaStore>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryEventStore {
    records: Arc<Mutex<Vec<Event>>>,
}

impl EventRepository for InMemoryEventStore {
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
pub(crate) struct InMemoryCommunityStore {
    records: Arc<Mutex<Vec<Community>>>,
}

impl CommunityRepository for InMemoryCommunityStore {
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
pub(crate) struct InMemoryUserStore {
    records: Arc<Mutex<Vec<User>>>,
}

impl InMemoryUserStore {
    pub(crate) fn seed(&self, user: User) {
        self.records
            .lock()
            .expect("user store mutex poisoned")
            .push(user);
    }
}

impl UserRepository for InMemoryUserStore {
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

/// Media store writing decoded payloads under the configured root. The
/// returned reference is the bare file name; the media endpoint maps it
/// back to the file.
pub(crate) struct FsMediaStore {
    root: PathBuf,
    sequence: AtomicU64,
}

impl FsMediaStore {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            root,
            sequence: AtomicU64::new(1),
        }
    }
}

impl MediaStore for FsMediaStore {
    fn store(&self, payload: &MediaPayload) -> Result<String, MediaError> {
        fs::create_dir_all(&self.root)
            .map_err(|err| MediaError::Unavailable(err.to_string()))?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let reference = format!(
            "img-{millis}-{sequence:04}.{}",
            payload.content_type.subtype()
        );

        fs::write(self.root.join(&reference), &payload.bytes)
            .map_err(|err| MediaError::Unavailable(err.to_string()))?;
        Ok(reference)
    }

    fn open(&self, reference: &str) -> Result<MediaPayload, MediaError> {
        // References are bare file names; anything path-like is not ours.
        if reference.contains('/') || reference.contains('\\') || reference.contains("..") {
            return Err(MediaError::NotFound);
        }

        let path = self.root.join(reference);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::NotFound)
            }
            Err(err) => return Err(MediaError::Unavailable(err.to_string())),
        };

        let content_type = mime_guess::from_path(&path).first_or_octet_stream();
        Ok(MediaPayload {
            content_type,
            bytes,
        })
    }
}

/// Lexical stand-in for the external semantic scoring service so the
/// binary runs self-contained: token overlap between the query and the
/// candidate's indexed text, scored in [0, 1].
pub(crate) struct TokenOverlapSimilarity<E, U> {
    events: Arc<E>,
    users: Arc<U>,
}

impl<E, U> TokenOverlapSimilarity<E, U> {
    pub(crate) fn new(events: Arc<E>, users: Arc<U>) -> Self {
        Self { events, users }
    }
}

impl<E, U> SimilarityClient for TokenOverlapSimilarity<E, U>
where
    E: EventRepository + 'static,
    U: UserRepository + 'static,
{
    fn rank(
        &self,
        query: &SimilarityQuery,
        candidates: &[String],
        threshold: Option<f32>,
    ) -> Result<Vec<RankedCandidate>, SimilarityError> {
        let query_tokens = match query {
            SimilarityQuery::Skills(skills) => tokenize(&skills.join(" ")),
            SimilarityQuery::Text(text) => tokenize(text),
        };

        let mut ranked = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some(document) = self.document_for(id)? else {
                continue;
            };
            let score = jaccard(&query_tokens, &tokenize(&document));
            if threshold.map_or(true, |cut| score >= cut) {
                ranked.push(RankedCandidate {
                    id: id.clone(),
                    score,
                });
            }
        }

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(ranked)
    }
}

impl<E, U> TokenOverlapSimilarity<E, U>
where
    E: EventRepository + 'static,
    U: UserRepository + 'static,
{
    fn document_for(&self, id: &str) -> Result<Option<String>, SimilarityError> {
        let event = self
            .events
            .fetch(&EventId(id.to_string()))
            .map_err(|err| SimilarityError::Unavailable(err.to_string()))?;
        if let Some(event) = event {
            return Ok(Some(format!(
                "{} {} {} {}",
                event.title,
                event.description,
                event.location,
                event.targeted_skills.join(" ")
            )));
        }

        let user = self
            .users
            .fetch(&UserId(id.to_string()))
            .map_err(|err| SimilarityError::Unavailable(err.to_string()))?;
        Ok(user.map(|user| {
            format!(
                "{} {} {} {} {}",
                user.first_name,
                user.last_name,
                user.bio,
                user.academic_background,
                user.skills.join(" ")
            )
        }))
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|character: char| !character.is_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(|token| token.to_string())
        .collect()
}

fn jaccard(left: &BTreeSet<String>, right: &BTreeSet<String>) -> f32 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.union(right).count();
    intersection as f32 / union as f32
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Fixture identities for the demo command and `serve --seed`.
pub(crate) fn seed_fixture_users(users: &InMemoryUserStore) -> (UserId, UserId, UserId) {
    let owner = User {
        id: UserId("usr-morgan".to_string()),
        role: UserRole::Community,
        first_name: "Morgan".to_string(),
        last_name: "Reyes".to_string(),
        bio: "Runs the harbor volunteers".to_string(),
        skills: Vec::new(),
        academic_background: "Public administration".to_string(),
        image: "img-seed-owner.png".to_string(),
        is_community_owner: false,
        version: 0,
    };
    let first_volunteer = User {
        id: UserId("usr-amina".to_string()),
        role: UserRole::Volunteer,
        first_name: "Amina".to_string(),
        last_name: "Diallo".to_string(),
        bio: "Weekend volunteer with shoreline cleanup experience".to_string(),
        skills: vec!["teamwork".to_string(), "first aid".to_string()],
        academic_background: "Environmental science".to_string(),
        image: "img-seed-amina.png".to_string(),
        is_community_owner: false,
        version: 0,
    };
    let second_volunteer = User {
        id: UserId("usr-jonas".to_string()),
        role: UserRole::Volunteer,
        first_name: "Jonas".to_string(),
        last_name: "Petersen".to_string(),
        bio: "Logistics volunteer, drives the supply van".to_string(),
        skills: vec!["logistics".to_string(), "driving".to_string()],
        academic_background: "Supply chain management".to_string(),
        image: "img-seed-jonas.png".to_string(),
        is_community_owner: false,
        version: 0,
    };

    let ids = (
        owner.id.clone(),
        first_volunteer.id.clone(),
        second_volunteer.id.clone(),
    );
    users.seed(owner);
    users.seed(first_volunteer);
    users.seed(second_volunteer);
    ids
}

/// In-memory media store for the demo command, where nothing needs to
/// outlive the process.
#[derive(Default)]
pub(crate) struct InMemoryMediaStore {
    blobs: Mutex<Vec<(String, MediaPayload)>>,
    sequence: AtomicU64,
}

impl MediaStore for InMemoryMediaStore {
    fn store(&self, payload: &MediaPayload) -> Result<String, MediaError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let reference = format!("img-{sequence:06}.{}", payload.content_type.subtype());
        self.blobs
            .lock()
            .expect("media mutex poisoned")
            .push((reference.clone(), payload.clone()));
        Ok(reference)
    }

    fn open(&self, reference: &str) -> Result<MediaPayload, MediaError> {
        self.blobs
            .lock()
            .expect("media mutex poisoned")
            .iter()
            .find(|(stored, _)| stored == reference)
            .map(|(_, payload)| payload.clone())
            .ok_or(MediaError::NotFound)
    }
}
