//! Track metadata shared across formats.
//!
//! Every loader fills a [`BasicMetadata`] from its header; players expose
//! it through [`MetadataFields`].

use serde::Serialize;

/// Read access to song metadata regardless of the file format.
pub trait MetadataFields {
    /// Song or game title.
    fn title(&self) -> &str;

    /// Author or composer.
    fn author(&self) -> &str;

    /// Copyright line or release date.
    fn copyright(&self) -> &str {
        ""
    }

    /// Free-form comments.
    ///
    /// Returns an empty string if no comments are available.
    fn comments(&self) -> &str {
        ""
    }

    /// File format identifier, e.g. "NSF", "AY", "KSS".
    fn format(&self) -> &str;

    /// Emulated system, e.g. "Nintendo NES" or "ZX Spectrum".
    fn system(&self) -> &str {
        ""
    }

    /// Number of tracks in the file.
    fn track_count(&self) -> usize {
        1
    }

    /// Rate at which the play routine is called, in Hz.
    ///
    /// Typical values: 50 (PAL) or 60 (NTSC).
    fn frame_rate(&self) -> u32 {
        50
    }

    /// Declared length of the current track in seconds, if any.
    fn duration_seconds(&self) -> Option<f32> {
        None
    }
}

/// Marker over [`MetadataFields`] used by the player traits.
pub trait PlaybackMetadata: MetadataFields {}

impl<T: MetadataFields> PlaybackMetadata for T {}

/// Plain metadata container produced by every loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BasicMetadata {
    /// Song or game title.
    pub title: String,
    /// Author or composer.
    pub author: String,
    /// Copyright line or release date.
    pub copyright: String,
    /// Additional comments.
    pub comments: String,
    /// File format identifier.
    pub format: String,
    /// Emulated system name.
    pub system: String,
    /// Number of tracks.
    pub track_count: usize,
    /// Play routine rate in Hz.
    pub frame_rate: u32,
    /// Declared length of the current track.
    pub duration_seconds: Option<f32>,
}

impl MetadataFields for BasicMetadata {
    fn title(&self) -> &str {
        &self.title
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn copyright(&self) -> &str {
        &self.copyright
    }

    fn comments(&self) -> &str {
        &self.comments
    }

    fn format(&self) -> &str {
        &self.format
    }

    fn system(&self) -> &str {
        &self.system
    }

    fn track_count(&self) -> usize {
        self.track_count
    }

    fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    fn duration_seconds(&self) -> Option<f32> {
        self.duration_seconds
    }
}

impl BasicMetadata {
    /// Metadata for a one-track file at 50 Hz.
    pub fn new(format: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            system: system.into(),
            track_count: 1,
            frame_rate: 50,
            ..Default::default()
        }
    }

    /// Create metadata from title and author.
    pub fn with_title_author(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            track_count: 1,
            frame_rate: 50,
            ..Default::default()
        }
    }
}
