use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for communities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunityId(pub String);

/// Identifier wrapper for events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Identifier wrapper for users, volunteers and owners alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for applicant records embedded in an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

/// Wire format for schedule times (`"09:00"`).
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

/// When an event takes place. Date and both times are required together;
/// the date alone drives the "upcoming" comparison (time of day ignored).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

/// Single closed status vocabulary for an applicant record, covering both
/// the owner-decision track and the invitation track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Invited,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Invited => "invited",
        }
    }
}

/// A (user, status) relationship record embedded in an event. At most one
/// record per distinct user may exist on any event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ApplicantId,
    pub user: UserId,
    pub status: ApplicationStatus,
}

/// A scheduled activity belonging to exactly one community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub targeted_skills: Vec<String>,
    /// Owning community, set at creation and never reassigned.
    pub community: CommunityId,
    pub applicants: Vec<Applicant>,
    /// Optimistic concurrency token managed by the store.
    pub version: u64,
}

impl Event {
    pub fn applicant_for_user(&self, user: &UserId) -> Option<&Applicant> {
        self.applicants.iter().find(|record| record.user == *user)
    }

    pub fn applicant_by_id(&self, id: &ApplicantId) -> Option<&Applicant> {
        self.applicants.iter().find(|record| record.id == *id)
    }
}

/// Organization entity owning events. `events` mirrors every event whose
/// `community` field points back here; only the integrity manager may
/// touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub description: String,
    pub image: String,
    /// Exactly one owner, immutable after creation.
    pub owner: UserId,
    pub events: Vec<EventId>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Volunteer,
    Community,
}

/// Referenced identity record. The engine never owns users; it reads
/// profile fields and flips `is_community_owner` on first community
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub skills: Vec<String>,
    pub academic_background: String,
    pub image: String,
    pub is_community_owner: bool,
    pub version: u64,
}

/// Validation failures raised before any write is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("schedule end time must fall after the start time")]
    ScheduleOrder,
}

/// Validated input for creating a community. `image` carries the stable
/// media reference, never raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityDraft {
    pub name: String,
    pub description: String,
    pub image: String,
}

impl CommunityDraft {
    pub fn validate(&self) -> Result<(), ValidationFailure> {
        require("name", &self.name)?;
        require("description", &self.description)?;
        require("image", &self.image)?;
        Ok(())
    }
}

/// Validated input for creating or editing an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub schedule: Schedule,
    pub location: String,
    pub image: String,
    pub targeted_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), ValidationFailure> {
        require("title", &self.title)?;
        require("description", &self.description)?;
        require("location", &self.location)?;
        require("image", &self.image)?;
        if self.schedule.end_time <= self.schedule.start_time {
            return Err(ValidationFailure::ScheduleOrder);
        }
        Ok(())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationFailure> {
    if value.trim().is_empty() {
        return Err(ValidationFailure::MissingField(field));
    }
    Ok(())
}
