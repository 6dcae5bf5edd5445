//! Reading and decoding the status file
//!
//! The game rewrites the file in place, so a read can land on a missing,
//! empty or half-written file. Both failure kinds surface as [`FeedError`]
//! and the caller keeps its previous snapshot.

use super::{GuiFocus, StatusFlags, StatusSnapshot};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FeedError {
    /// File missing, locked or empty
    #[error("status feed unavailable: {0}")]
    Unavailable(String),

    /// File readable but not a status document
    #[error("status feed malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Source of raw status documents
pub trait StatusFeed: Send {
    fn read(&mut self) -> Result<Vec<u8>, FeedError>;
}

/// `Status.json` on disk
#[derive(Debug, Clone)]
pub struct FileStatusFeed {
    path: PathBuf,
}

impl FileStatusFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusFeed for FileStatusFeed {
    fn read(&mut self) -> Result<Vec<u8>, FeedError> {
        let raw = std::fs::read(&self.path)
            .map_err(|e| FeedError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(FeedError::Unavailable(format!(
                "{}: file is empty",
                self.path.display()
            )));
        }
        debug!("Read {} bytes from {}", raw.len(), self.path.display());
        Ok(raw)
    }
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    timestamp: Option<String>,

    #[serde(rename = "Flags", default)]
    flags: u32,

    #[serde(rename = "GuiFocus", default)]
    gui_focus: u32,
}

/// Decodes a status document; absent fields default to zero / no focus
pub fn decode(raw: &[u8]) -> Result<StatusSnapshot, FeedError> {
    let status: RawStatus = serde_json::from_slice(raw)?;

    let snapshot = StatusSnapshot::new(
        StatusFlags::from_bits_retain(status.flags),
        GuiFocus::from_raw(status.gui_focus),
    );

    let timestamp = status
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Ok(match timestamp {
        Some(ts) => snapshot.with_timestamp(ts),
        None => snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{ "timestamp":"2025-03-14T18:22:05Z", "event":"Status",
        "Flags":16842765, "Flags2":0, "Pips":[4,8,0], "FireGroup":0, "GuiFocus":6,
        "Fuel":{ "FuelMain":32.0, "FuelReservoir":0.63 }, "Cargo":0.0,
        "LegalState":"Clean", "Balance":1234567 }"#;

    #[test]
    fn test_decode_full_document() {
        let snapshot = decode(SAMPLE.as_bytes()).unwrap();
        // 16842765 = docked | gear down | shields up | fsd mass locked | in main ship
        assert!(snapshot.has(StatusFlags::DOCKED));
        assert!(snapshot.has(StatusFlags::LANDING_GEAR_DOWN));
        assert!(snapshot.has(StatusFlags::SHIELDS_UP));
        assert!(snapshot.has(StatusFlags::FSD_MASS_LOCKED));
        assert!(snapshot.has(StatusFlags::IN_MAIN_SHIP));
        assert!(!snapshot.has(StatusFlags::LIGHTS_ON));
        assert_eq!(snapshot.focus(), GuiFocus::GalaxyMap);
        assert_eq!(
            snapshot.timestamp().map(|t| t.to_rfc3339()),
            Some("2025-03-14T18:22:05+00:00".to_string())
        );
    }

    #[test]
    fn test_decode_defaults_missing_fields() {
        // Shape written while the game sits in the main menu
        let snapshot = decode(br#"{ "timestamp":"2025-03-14T18:00:00Z", "event":"Status" }"#)
            .unwrap();
        assert_eq!(snapshot.flags(), StatusFlags::empty());
        assert_eq!(snapshot.focus(), GuiFocus::NoFocus);
    }

    #[test]
    fn test_decode_keeps_going_with_bad_timestamp() {
        let snapshot = decode(br#"{ "timestamp":"yesterday", "Flags":256 }"#).unwrap();
        assert!(snapshot.has(StatusFlags::LIGHTS_ON));
        assert!(snapshot.timestamp().is_none());
    }

    #[test]
    fn test_decode_rejects_truncated_document() {
        let err = decode(br#"{ "timestamp":"2025-03-14T18:00:00Z", "Flags":25"#).unwrap_err();
        assert!(matches!(err, FeedError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        assert!(matches!(
            decode(br#"{ "Flags":"lots" }"#),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn test_file_feed_reports_missing_and_empty() {
        let dir = std::env::temp_dir().join(format!("flightsync-feed-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Status.json");
        let _ = std::fs::remove_file(&path);

        let mut feed = FileStatusFeed::new(&path);
        assert!(matches!(feed.read(), Err(FeedError::Unavailable(_))));

        std::fs::File::create(&path).unwrap();
        assert!(matches!(feed.read(), Err(FeedError::Unavailable(_))));

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        drop(file);
        let raw = feed.read().unwrap();
        assert!(decode(&raw).unwrap().has(StatusFlags::DOCKED));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
