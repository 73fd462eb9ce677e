//! MP3 files: a scan over the raw bytes collecting MPEG frame headers,
//! ID3v1 tags and ID3v2 tags wherever they appear.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDateTime};
use tracing::debug;

use super::date::parse_tag_date;
use super::error::{DecodeError, DecodeResult};
use super::id3v1::{is_id3v1_tag, Id3v1Tag, ID3V1_TAG_LEN};
use super::id3v2::{
    is_id3v2_header, parse_position, tag_body_size, Id3v2Tag, PictureFrame, ID3V2_HEADER_LEN,
};
use super::mpeg::{estimate_duration, MpegHeader};
use super::Metadata;

/// Below this many bytes nothing recognizable can start.
const MIN_LOOKAHEAD: usize = 10;

#[derive(Debug, Default)]
pub struct Mp3Metadata {
    pub mpeg_headers: Vec<MpegHeader>,
    pub id3v1_tags: Vec<Id3v1Tag>,
    pub id3v2_tags: Vec<Id3v2Tag>,
    pictures: Vec<PictureFrame>,
    text_by_frame_id: OnceLock<HashMap<String, String>>,
}

impl Mp3Metadata {
    pub fn parse(buf: &[u8]) -> DecodeResult<Mp3Metadata> {
        let mut metadata = Mp3Metadata::default();
        let mut pos = 0;

        while buf.len() - pos >= MIN_LOOKAHEAD {
            let window = &buf[pos..];

            if let Some(header) = MpegHeader::parse(window) {
                let size = header.frame_size();
                if size > window.len() {
                    break;
                }
                metadata.mpeg_headers.push(header);
                pos += size;
                continue;
            }

            if is_id3v1_tag(window) {
                if let Some(tag) = Id3v1Tag::parse(&window[..ID3V1_TAG_LEN]) {
                    metadata.id3v1_tags.push(tag);
                }
                pos += ID3V1_TAG_LEN;
                continue;
            }

            if is_id3v2_header(window) {
                let tag_len = ID3V2_HEADER_LEN + tag_body_size(window);
                if tag_len > window.len() {
                    return Err(DecodeError::Truncated {
                        what: "ID3v2 tag",
                        needed: tag_len,
                        available: window.len(),
                    });
                }
                let tag = Id3v2Tag::parse(&window[..tag_len])?;
                metadata.pictures.extend(tag.picture_frames());
                metadata.id3v2_tags.push(tag);
                pos += tag_len;
                continue;
            }

            pos += 1;
        }

        debug!(
            "Parsed MP3: {} frames, {} ID3v1 tags, {} ID3v2 tags",
            metadata.mpeg_headers.len(),
            metadata.id3v1_tags.len(),
            metadata.id3v2_tags.len()
        );
        Ok(metadata)
    }

    fn text_frames(&self) -> &HashMap<String, String> {
        self.text_by_frame_id.get_or_init(|| {
            let mut frames = HashMap::new();
            for tag in &self.id3v2_tags {
                for frame in tag.text_frames() {
                    frames.insert(frame.id, frame.text);
                }
            }
            frames
        })
    }

    /// Text of a frame, or `None` when absent or empty.
    pub fn text_frame(&self, frame_id: &str) -> Option<&str> {
        self.text_frames()
            .get(frame_id)
            .map(|text| text.as_str())
            .filter(|text| !text.is_empty())
    }

    fn first_id3v1(&self, field: impl Fn(&Id3v1Tag) -> &str) -> Option<String> {
        self.id3v1_tags
            .iter()
            .map(field)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn text_or_id3v1(
        &self,
        frame_id: &str,
        field: impl Fn(&Id3v1Tag) -> &str,
    ) -> Option<String> {
        self.text_frame(frame_id)
            .map(str::to_string)
            .or_else(|| self.first_id3v1(field))
    }

    fn position_frame(&self, frame_id: &str) -> (u32, u32) {
        self.text_frame(frame_id)
            .map(parse_position)
            .unwrap_or((0, 0))
    }

    fn date_frame(&self, frame_ids: &[&str]) -> Option<NaiveDateTime> {
        frame_ids
            .iter()
            .filter_map(|id| self.text_frame(id))
            .find_map(parse_tag_date)
    }
}

/// Apply an ID3v2.3 `TDAT` value (DDMM) to a year-only date.
fn apply_day_month(date: NaiveDateTime, ddmm: &str) -> Option<NaiveDateTime> {
    if ddmm.len() != 4 || !ddmm.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day = ddmm[..2].parse().ok()?;
    let month = ddmm[2..].parse().ok()?;
    date.with_day(1)?.with_month(month)?.with_day(day)
}

impl Metadata for Mp3Metadata {
    fn track_name(&self) -> Option<String> {
        self.text_or_id3v1("TIT2", |tag| &tag.title)
    }

    fn track_position(&self) -> u32 {
        self.position_frame("TRCK").0
    }

    fn total_tracks(&self) -> u32 {
        self.position_frame("TRCK").1
    }

    fn artist_name(&self) -> Option<String> {
        self.text_or_id3v1("TPE1", |tag| &tag.artist)
    }

    fn album_artist_name(&self) -> Option<String> {
        self.text_frame("TPE2").map(str::to_string)
    }

    fn album_name(&self) -> Option<String> {
        self.text_or_id3v1("TALB", |tag| &tag.album)
    }

    fn release_date(&self) -> Option<NaiveDateTime> {
        let year_only = self.text_frame("TDRC").is_none()
            && self.text_frame("TYER").map(|y| y.trim().len()) == Some(4);
        let date = self.date_frame(&["TDRC", "TYER"])?;
        if year_only {
            if let Some(refined) = self
                .text_frame("TDAT")
                .and_then(|ddmm| apply_day_month(date, ddmm))
            {
                return Some(refined);
            }
        }
        Some(date)
    }

    fn original_release_date(&self) -> Option<NaiveDateTime> {
        self.date_frame(&["TDOR", "TORY", "TDRC"])
    }

    fn disc_name(&self) -> Option<String> {
        self.text_frame("TSST").map(str::to_string)
    }

    fn disc_position(&self) -> u32 {
        self.position_frame("TPOS").0
    }

    fn total_discs(&self) -> u32 {
        self.position_frame("TPOS").1
    }

    fn duration(&self) -> f64 {
        match self.mpeg_headers.first() {
            Some(first) => estimate_duration(first, self.mpeg_headers.len()),
            None => 0.0,
        }
    }

    fn images(&self) -> Vec<&[u8]> {
        self.pictures
            .iter()
            .map(|picture| picture.data.as_slice())
            .collect()
    }
}
