//! Core data-model types: track identifiers, segment identifiers and the
//! metadata record carried alongside every segment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque track identifier, conventionally prefixed `TR`.
pub type TrackId = String;

/// Identifier of one ~60 second window of a track's code stream: `<track_id>-<index>`.
///
/// The track ID is recovered by taking the substring before the *first* `-`,
/// so track IDs themselves must not contain `-` followed by only digits in a
/// way that would be ambiguous; in practice generated track IDs never contain
/// `-` at all.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(track_id: &str, index: u32) -> Self {
        Self(format!("{track_id}-{index}"))
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        match raw.split_once('-') {
            Some((track, idx)) if !track.is_empty() && idx.parse::<u32>().is_ok() => {
                Ok(Self(raw))
            }
            _ => Err(Error::InvalidSegmentId(raw)),
        }
    }

    /// The originating track ID: the substring before the first `-`.
    #[must_use]
    pub fn track_id(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(t, _)| t)
    }

    /// `true` if this segment ID's track prefix equals `track_id`.
    #[must_use]
    pub fn belongs_to(&self, track_id: &str) -> bool {
        self.0
            .strip_prefix(track_id)
            .is_some_and(|rest| rest.starts_with('-'))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SegmentId> for String {
    fn from(value: SegmentId) -> Self {
        value.0
    }
}

/// Metadata carried by a segment (copied from the parent track at ingest).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub length: u32,
    pub codever: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_date: Option<String>,
}

/// A record submitted for ingest, before splitting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(default)]
    pub track_id: Option<TrackId>,
    pub fp: String,
    pub length: u32,
    pub codever: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub import_date: Option<String>,
}

/// A single split (or pass-through) unit ready to be written to both stores.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub id: SegmentId,
    pub fp: String,
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_id_round_trip() {
        let id = SegmentId::new("TRAAAAA", 3);
        assert_eq!(id.as_str(), "TRAAAAA-3");
        assert_eq!(id.track_id(), "TRAAAAA");
    }

    #[test]
    fn segment_id_parse_rejects_garbage() {
        assert!(SegmentId::parse("no-dash-here-x").is_err());
        assert!(SegmentId::parse("noindex").is_err());
        assert!(SegmentId::parse("TRAAAAA-0").is_ok());
    }

    #[test]
    fn belongs_to_checks_full_prefix_not_substring() {
        let id = SegmentId::new("TRAAAAA", 0);
        assert!(id.belongs_to("TRAAAAA"));
        assert!(!id.belongs_to("TRAAAA"));
        assert!(!id.belongs_to("TRAAAAAX"));
    }
}
