//! Tag decoders for the audio formats the library understands.

mod date;
mod error;
pub mod flac;
pub mod id3v1;
pub mod id3v2;
pub mod mp3;
pub mod mpeg;
mod reader;

use std::path::Path;

use chrono::NaiveDateTime;

pub use date::parse_tag_date;
pub use error::{DecodeError, DecodeResult};
pub use flac::FlacMetadata;
pub use mp3::Mp3Metadata;

/// Fields extracted from a file's tags. Absent text fields are `None`,
/// absent numbers are 0.
pub trait Metadata {
    fn track_name(&self) -> Option<String>;
    fn track_position(&self) -> u32;
    fn total_tracks(&self) -> u32;

    fn artist_name(&self) -> Option<String>;
    fn album_artist_name(&self) -> Option<String>;
    fn album_name(&self) -> Option<String>;

    fn release_date(&self) -> Option<NaiveDateTime>;
    fn original_release_date(&self) -> Option<NaiveDateTime>;

    fn disc_name(&self) -> Option<String>;
    fn disc_position(&self) -> u32;
    fn total_discs(&self) -> u32;

    /// Seconds.
    fn duration(&self) -> f64;

    /// Embedded pictures in tag order.
    fn images(&self) -> Vec<&[u8]>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    Flac,
}

impl AudioFormat {
    /// Select a format by file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<AudioFormat> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "flac" => Some(AudioFormat::Flac),
            _ => None,
        }
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    AudioFormat::from_path(path).is_some()
}

#[derive(Debug)]
pub enum AudioMetadata {
    Mp3(Mp3Metadata),
    Flac(FlacMetadata),
}

impl AudioMetadata {
    pub fn parse(format: AudioFormat, buf: &[u8]) -> DecodeResult<AudioMetadata> {
        match format {
            AudioFormat::Mp3 => Mp3Metadata::parse(buf).map(AudioMetadata::Mp3),
            AudioFormat::Flac => FlacMetadata::parse(buf).map(AudioMetadata::Flac),
        }
    }

    pub fn format(&self) -> AudioFormat {
        match self {
            AudioMetadata::Mp3(_) => AudioFormat::Mp3,
            AudioMetadata::Flac(_) => AudioFormat::Flac,
        }
    }

    fn inner(&self) -> &dyn Metadata {
        match self {
            AudioMetadata::Mp3(metadata) => metadata,
            AudioMetadata::Flac(metadata) => metadata,
        }
    }
}

impl Metadata for AudioMetadata {
    fn track_name(&self) -> Option<String> {
        self.inner().track_name()
    }

    fn track_position(&self) -> u32 {
        self.inner().track_position()
    }

    fn total_tracks(&self) -> u32 {
        self.inner().total_tracks()
    }

    fn artist_name(&self) -> Option<String> {
        self.inner().artist_name()
    }

    fn album_artist_name(&self) -> Option<String> {
        self.inner().album_artist_name()
    }

    fn album_name(&self) -> Option<String> {
        self.inner().album_name()
    }

    fn release_date(&self) -> Option<NaiveDateTime> {
        self.inner().release_date()
    }

    fn original_release_date(&self) -> Option<NaiveDateTime> {
        self.inner().original_release_date()
    }

    fn disc_name(&self) -> Option<String> {
        self.inner().disc_name()
    }

    fn disc_position(&self) -> u32 {
        self.inner().disc_position()
    }

    fn total_discs(&self) -> u32 {
        self.inner().total_discs()
    }

    fn duration(&self) -> f64 {
        self.inner().duration()
    }

    fn images(&self) -> Vec<&[u8]> {
        self.inner().images()
    }
}

/// Read a whole file and decode its tags according to its extension.
pub fn parse_audio_file(path: &Path) -> DecodeResult<AudioMetadata> {
    let format = AudioFormat::from_path(path)
        .ok_or_else(|| DecodeError::UnsupportedFormat(path.display().to_string()))?;
    let buf = std::fs::read(path)?;
    AudioMetadata::parse(format, &buf)
}
