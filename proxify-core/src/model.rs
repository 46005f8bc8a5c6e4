//! Domain types for moderated reports ("alerts") and moderator votes.
//!
//! Identifiers are newtypes so a report id can never be passed where a user
//! id is expected. A rejected report is not represented by a status: once the
//! rejection quorum is reached the record is deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModerationError;

/// Lowest accepted severity.
pub const MIN_SEVERITY: u8 = 1;
/// Highest accepted severity.
pub const MAX_SEVERITY: u8 = 5;

/// Unique identifier of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub Uuid);

impl ReportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ReportId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Opaque identity of an account, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Alert,
    News,
    Sale,
    Help,
    Event,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::News => "news",
            Self::Sale => "sale",
            Self::Help => "help",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alert" => Ok(Self::Alert),
            "news" => Ok(Self::News),
            "sale" => Ok(Self::Sale),
            "help" => Ok(Self::Help),
            "event" => Ok(Self::Event),
            other => Err(ModerationError::InvalidReport(format!(
                "unknown category '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle status of a stored report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Submitted, awaiting moderator quorum.
    #[default]
    Pending,
    /// Pre-screened by the automated reviewer, still awaiting quorum.
    AiReviewed,
    /// Approved by quorum and publicly visible. Terminal.
    Reviewed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AiReviewed => "ai_reviewed",
            Self::Reviewed => "reviewed",
        }
    }

    /// Returns true once no further votes are accepted.
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Reviewed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ai_reviewed" => Ok(Self::AiReviewed),
            "reviewed" => Ok(Self::Reviewed),
            other => Err(ModerationError::InvalidReport(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

/// A WGS84 point.
///
/// Accepts either `{"latitude", "longitude"}` or a GeoJSON `Point`, whose
/// coordinates are `[longitude, latitude]`. Always serializes as the former.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LocationRepr")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocationRepr {
    GeoJson {
        #[serde(rename = "type")]
        kind: String,
        coordinates: [f64; 2],
    },
    LatLon {
        latitude: f64,
        longitude: f64,
    },
}

impl TryFrom<LocationRepr> for Location {
    type Error = String;

    fn try_from(repr: LocationRepr) -> Result<Self, Self::Error> {
        match repr {
            LocationRepr::GeoJson {
                kind,
                coordinates: [longitude, latitude],
            } => {
                if kind == "Point" {
                    Ok(Location::new(latitude, longitude))
                } else {
                    Err(format!("unsupported GeoJSON type '{}', expected 'Point'", kind))
                }
            }
            LocationRepr::LatLon {
                latitude,
                longitude,
            } => Ok(Location::new(latitude, longitude)),
        }
    }
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<(), ModerationError> {
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ModerationError::InvalidReport(
                "longitude must be between -180 and 180".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ModerationError::InvalidReport(
                "latitude must be between -90 and 90".to_string(),
            ));
        }
        Ok(())
    }
}

/// A user-submitted, geolocated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub submitter: UserId,
    pub description: String,
    pub category: Category,
    pub location: Location,
    pub severity: u8,
    pub attachments: Vec<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Whether `viewer` may see this report before it is published.
    pub fn is_visible_to(&self, viewer: &UserId, is_moderator: bool) -> bool {
        self.status == ReportStatus::Reviewed || is_moderator || &self.submitter == viewer
    }
}

/// Content of a report as submitted by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub description: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub location: Location,
    pub severity: u8,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl NewReport {
    pub fn validate(&self) -> Result<(), ModerationError> {
        if self.description.trim().is_empty() {
            return Err(ModerationError::InvalidReport(
                "description must not be empty".to_string(),
            ));
        }
        if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&self.severity) {
            return Err(ModerationError::InvalidReport(format!(
                "severity must be between {} and {}",
                MIN_SEVERITY, MAX_SEVERITY
            )));
        }
        self.location.validate()
    }

    /// Validate and turn into a stored report in `pending` status.
    pub fn into_report(
        self,
        submitter: UserId,
        now: DateTime<Utc>,
    ) -> Result<Report, ModerationError> {
        self.validate()?;
        Ok(Report {
            id: ReportId::new(),
            submitter,
            description: self.description,
            category: self.category,
            location: self.location,
            severity: self.severity,
            attachments: self.attachments,
            status: ReportStatus::Pending,
            created_at: now,
        })
    }
}

/// One moderator's vote on one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVote {
    pub id: Uuid,
    pub report_id: ReportId,
    pub moderator: UserId,
    /// `true` to approve, `false` to reject.
    pub approve: bool,
    pub created_at: DateTime<Utc>,
}

impl ReviewVote {
    pub fn new(report_id: ReportId, moderator: UserId, approve: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_id,
            moderator,
            approve,
            created_at: now,
        }
    }
}

/// Vote counts for a single report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteTally {
    pub approvals: u32,
    pub rejections: u32,
}

impl VoteTally {
    pub fn new(approvals: u32, rejections: u32) -> Self {
        Self {
            approvals,
            rejections,
        }
    }

    /// The tally after one more vote.
    pub fn with_vote(self, approve: bool) -> Self {
        if approve {
            Self {
                approvals: self.approvals + 1,
                ..self
            }
        } else {
            Self {
                rejections: self.rejections + 1,
                ..self
            }
        }
    }

    pub fn total(&self) -> u32 {
        self.approvals + self.rejections
    }
}

impl<'a> FromIterator<&'a ReviewVote> for VoteTally {
    fn from_iter<I: IntoIterator<Item = &'a ReviewVote>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::default(), |tally, vote| tally.with_vote(vote.approve))
    }
}

/// Per-submitter report counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitterStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}
