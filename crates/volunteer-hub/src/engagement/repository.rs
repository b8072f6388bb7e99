use super::domain::{Community, CommunityId, Event, EventId, User, UserId, UserRole};

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stored version no longer matches the expected one")]
    VersionMismatch,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for community documents.
///
/// The store guarantees per-document atomicity only: `update` replaces the
/// whole document if its stored version still equals `expected_version`
/// (compare-and-swap), bumping the version on success. Nothing spanning
/// two documents is atomic; the integrity manager owns that gap.
pub trait CommunityRepository: Send + Sync {
    fn insert(&self, community: Community) -> Result<Community, RepositoryError>;
    fn fetch(&self, id: &CommunityId) -> Result<Option<Community>, RepositoryError>;
    fn fetch_by_owner(&self, owner: &UserId) -> Result<Option<Community>, RepositoryError>;
    fn update(
        &self,
        community: Community,
        expected_version: u64,
    ) -> Result<Community, RepositoryError>;
    fn list(&self) -> Result<Vec<Community>, RepositoryError>;
}

/// Storage abstraction for event documents. `list` returns the store's
/// natural order, which pagination and "upcoming" filtering rely on.
pub trait EventRepository: Send + Sync {
    fn insert(&self, event: Event) -> Result<Event, RepositoryError>;
    fn fetch(&self, id: &EventId) -> Result<Option<Event>, RepositoryError>;
    fn update(&self, event: Event, expected_version: u64) -> Result<Event, RepositoryError>;
    fn delete(&self, id: &EventId) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<Event>, RepositoryError>;
}

/// Read/update access to the externally owned user records.
pub trait UserRepository: Send + Sync {
    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn update(&self, user: User, expected_version: u64) -> Result<User, RepositoryError>;
    fn list_by_role(&self, role: UserRole) -> Result<Vec<User>, RepositoryError>;
}
