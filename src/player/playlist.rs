use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("playlist must contain at least one track")]
    Empty,
}

/// A playable resource plus the title shown while it plays.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Track {
    /// Locator relative to the asset base directory
    pub file: String,
    pub title: String,
}

impl Track {
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: title.into(),
        }
    }

    pub fn resolve(&self, asset_base: &Path) -> PathBuf {
        asset_base.join(&self.file)
    }
}

/// Ordered, append-only list of tracks. Never empty.
#[derive(Clone, Debug)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Result<Self, PlaylistError> {
        if tracks.is_empty() {
            return Err(PlaylistError::Empty);
        }
        Ok(Self { tracks })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Panics if `index` is out of range.
    pub fn track(&self, index: usize) -> &Track {
        &self.tracks[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Appends without de-duplication.
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.extend(tracks);
    }

    pub fn next_index(&self, index: usize) -> usize {
        if index + 1 < self.len() {
            index + 1
        } else {
            0
        }
    }

    pub fn previous_index(&self, index: usize) -> usize {
        if index > 0 {
            index - 1
        } else {
            self.len() - 1
        }
    }
}
