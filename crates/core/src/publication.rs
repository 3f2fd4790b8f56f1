//! Core publication types.
//!
//! A [`Publication`] is a rental listing owned by a user. It owns its images,
//! its questions and the stars users gave it; all of them are stored inline so a
//! single write replaces the listing together with its sub-entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Confirmation state of the listing's blockchain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockchainStatus {
    #[default]
    Unset,
    Confirmed,
    Denied,
    Pending,
    Error,
}

impl BlockchainStatus {
    /// Wire names, in declaration order.
    pub const NAMES: &'static [&'static str] = &["UNSET", "CONFIRMED", "DENIED", "PENDING", "ERROR"];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockchainStatus::Unset => "UNSET",
            BlockchainStatus::Confirmed => "CONFIRMED",
            BlockchainStatus::Denied => "DENIED",
            BlockchainStatus::Pending => "PENDING",
            BlockchainStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for BlockchainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockchainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNSET" => Ok(BlockchainStatus::Unset),
            "CONFIRMED" => Ok(BlockchainStatus::Confirmed),
            "DENIED" => Ok(BlockchainStatus::Denied),
            "PENDING" => Ok(BlockchainStatus::Pending),
            "ERROR" => Ok(BlockchainStatus::Error),
            other => Err(format!("unknown blockchain status '{}'", other)),
        }
    }
}

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting coordinates outside the valid degree ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, String> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("latitude {} must be within [-90, 90]", latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("longitude {} must be within [-180, 180]", longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// An image attached to a publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationImage {
    pub id: Uuid,
    pub url: String,
}

impl PublicationImage {
    /// Creates an image with a random UUID.
    pub fn new(url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
        }
    }
}

/// A question asked about a publication, optionally answered by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationQuestion {
    pub id: u64,
    pub user_id: i64,
    pub question: String,
    pub reply: Option<String>,
    pub created_at: DateTime<Utc>,
    pub replied_at: Option<DateTime<Utc>>,
}

/// A user's star on a publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationStar {
    pub user_id: i64,
    pub publication_id: u64,
    pub created_at: DateTime<Utc>,
}

/// Owner-editable fields of a publication, shared by create and replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationDraft {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub rooms: i64,
    pub beds: i64,
    pub bathrooms: i64,
    pub price_per_night: f64,
    pub images: Vec<PublicationImage>,
    pub loc: GeoPoint,
}

/// Blockchain bookkeeping fields updated by `PATCH`.
///
/// `None` leaves the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockchainPatch {
    pub blockchain_status: Option<BlockchainStatus>,
    pub blockchain_transaction_hash: Option<String>,
    pub blockchain_id: Option<i64>,
}

/// A stored rental listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: u64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub rooms: i64,
    pub beds: i64,
    pub bathrooms: i64,
    pub price_per_night: f64,
    pub images: Vec<PublicationImage>,
    pub loc: GeoPoint,
    pub publication_date: DateTime<Utc>,
    pub blocked: bool,
    pub questions: Vec<PublicationQuestion>,
    pub blockchain_status: BlockchainStatus,
    pub blockchain_id: Option<i64>,
    pub blockchain_transaction_hash: Option<String>,
    pub stars: Vec<PublicationStar>,
}

impl Publication {
    /// Creates a fresh, unblocked publication with no questions or stars.
    pub fn new(id: u64, draft: PublicationDraft, publication_date: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: draft.user_id,
            title: draft.title,
            description: draft.description,
            rooms: draft.rooms,
            beds: draft.beds,
            bathrooms: draft.bathrooms,
            price_per_night: draft.price_per_night,
            images: draft.images,
            loc: draft.loc,
            publication_date,
            blocked: false,
            questions: Vec::new(),
            blockchain_status: BlockchainStatus::Unset,
            blockchain_id: None,
            blockchain_transaction_hash: None,
            stars: Vec::new(),
        }
    }

    /// Replaces every owner-editable field, including the whole image set.
    pub fn apply_draft(&mut self, draft: PublicationDraft) {
        self.user_id = draft.user_id;
        self.title = draft.title;
        self.description = draft.description;
        self.rooms = draft.rooms;
        self.beds = draft.beds;
        self.bathrooms = draft.bathrooms;
        self.price_per_night = draft.price_per_night;
        self.images = draft.images;
        self.loc = draft.loc;
    }

    pub fn apply_patch(&mut self, patch: BlockchainPatch) {
        if let Some(status) = patch.blockchain_status {
            self.blockchain_status = status;
        }
        if let Some(hash) = patch.blockchain_transaction_hash {
            self.blockchain_transaction_hash = Some(hash);
        }
        if let Some(id) = patch.blockchain_id {
            self.blockchain_id = Some(id);
        }
    }

    pub fn is_starred_by(&self, user_id: i64) -> bool {
        self.stars.iter().any(|s| s.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PublicationDraft {
        PublicationDraft {
            user_id: 7,
            title: "Loft".into(),
            description: "Sunny loft".into(),
            rooms: 2,
            beds: 3,
            bathrooms: 1,
            price_per_night: 80.0,
            images: vec![PublicationImage::new("https://img/1.png".into())],
            loc: GeoPoint::new(-34.6, -58.4).unwrap(),
        }
    }

    #[test]
    fn test_new_publication_defaults() {
        let p = Publication::new(1, draft(), Utc::now());
        assert!(!p.blocked);
        assert_eq!(p.blockchain_status, BlockchainStatus::Unset);
        assert!(p.questions.is_empty());
        assert!(p.stars.is_empty());
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let mut p = Publication::new(1, draft(), Utc::now());
        p.apply_patch(BlockchainPatch {
            blockchain_transaction_hash: Some("0xabc".into()),
            ..Default::default()
        });
        p.apply_patch(BlockchainPatch {
            blockchain_status: Some(BlockchainStatus::Confirmed),
            ..Default::default()
        });
        assert_eq!(p.blockchain_status, BlockchainStatus::Confirmed);
        assert_eq!(p.blockchain_transaction_hash.as_deref(), Some("0xabc"));
        assert_eq!(p.blockchain_id, None);
    }

    #[test]
    fn test_apply_draft_replaces_images() {
        let mut p = Publication::new(1, draft(), Utc::now());
        let mut d = draft();
        d.images = vec![];
        d.title = "Renamed".into();
        p.apply_draft(d);
        assert!(p.images.is_empty());
        assert_eq!(p.title, "Renamed");
    }

    #[test]
    fn test_geo_point_ranges() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_blockchain_status_names_roundtrip() {
        for name in BlockchainStatus::NAMES {
            let status: BlockchainStatus = name.parse().unwrap();
            assert_eq!(status.as_str(), *name);
        }
        assert!("confirmed".parse::<BlockchainStatus>().is_err());
    }
}
