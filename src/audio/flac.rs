//! FLAC metadata blocks: STREAMINFO, VORBIS_COMMENT and PICTURE.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::debug;

use super::date::parse_tag_date;
use super::error::{DecodeError, DecodeResult};
use super::id3v2::{is_id3v2_header, tag_body_size, ID3V2_HEADER_LEN};
use super::reader::ByteReader;
use super::Metadata;

pub const FLAC_MAGIC: &[u8; 4] = b"fLaC";
pub const STREAM_INFO_LEN: usize = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Reserved(u8),
}

impl From<u8> for BlockType {
    fn from(value: u8) -> Self {
        match value {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            other => BlockType::Reserved(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub is_last: bool,
    pub block_type: BlockType,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// Zero when the encoder did not know the length.
    pub total_samples: u64,
    pub md5_signature: [u8; 16],
}

impl StreamInfo {
    pub fn parse(payload: &[u8]) -> DecodeResult<StreamInfo> {
        let mut reader = ByteReader::new(payload);
        let b = reader.take(STREAM_INFO_LEN, "STREAMINFO block")?;

        // sample rate (20) | channels - 1 (3) | bits per sample - 1 (5) | total samples (36)
        let packed = u64::from_be_bytes([b[10], b[11], b[12], b[13], b[14], b[15], b[16], b[17]]);
        let mut md5_signature = [0u8; 16];
        md5_signature.copy_from_slice(&b[18..34]);

        Ok(StreamInfo {
            min_block_size: u16::from_be_bytes([b[0], b[1]]),
            max_block_size: u16::from_be_bytes([b[2], b[3]]),
            min_frame_size: u32::from_be_bytes([0, b[4], b[5], b[6]]),
            max_frame_size: u32::from_be_bytes([0, b[7], b[8], b[9]]),
            sample_rate: (packed >> 44) as u32,
            channels: ((packed >> 41) & 0x07) as u8 + 1,
            bits_per_sample: ((packed >> 36) & 0x1F) as u8 + 1,
            total_samples: packed & 0x0F_FFFF_FFFF,
            md5_signature,
        })
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: String,
    pub comments: Vec<(String, String)>,
}

impl VorbisComment {
    pub fn parse(payload: &[u8]) -> DecodeResult<VorbisComment> {
        let mut reader = ByteReader::new(payload);
        let vendor = String::from_utf8_lossy(reader.read_le_prefixed("vendor string")?).into_owned();
        let count = reader.read_u32_le("comment count")?;

        let mut comments = Vec::new();
        for _ in 0..count {
            let raw = String::from_utf8_lossy(reader.read_le_prefixed("user comment")?);
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                DecodeError::Malformed(format!("user comment without '=': {:?}", raw))
            })?;
            comments.push((key.to_string(), value.to_string()));
        }

        Ok(VorbisComment { vendor, comments })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureBlock {
    pub picture_type: u32,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub colors_used: u32,
    pub data: Vec<u8>,
}

impl PictureBlock {
    pub fn parse(payload: &[u8]) -> DecodeResult<PictureBlock> {
        let mut reader = ByteReader::new(payload);
        Ok(PictureBlock {
            picture_type: reader.read_u32_be("picture type")?,
            mime_type: String::from_utf8_lossy(reader.read_be_prefixed("picture MIME type")?)
                .into_owned(),
            description: String::from_utf8_lossy(reader.read_be_prefixed("picture description")?)
                .into_owned(),
            width: reader.read_u32_be("picture width")?,
            height: reader.read_u32_be("picture height")?,
            bits_per_pixel: reader.read_u32_be("picture depth")?,
            colors_used: reader.read_u32_be("picture colors")?,
            data: reader.read_be_prefixed("picture data")?.to_vec(),
        })
    }
}

#[derive(Debug, Default)]
pub struct FlacMetadata {
    pub block_headers: Vec<BlockHeader>,
    pub stream_info: Option<StreamInfo>,
    pub vorbis_comments: Vec<VorbisComment>,
    pub pictures: Vec<PictureBlock>,
    user_comments: HashMap<String, Vec<String>>,
}

impl FlacMetadata {
    pub fn parse(buf: &[u8]) -> DecodeResult<FlacMetadata> {
        let mut reader = ByteReader::new(skip_leading_id3v2(buf));
        if reader.take(FLAC_MAGIC.len(), "fLaC marker")? != FLAC_MAGIC {
            return Err(DecodeError::Malformed("missing fLaC marker".to_string()));
        }

        let mut metadata = FlacMetadata::default();
        loop {
            let raw = reader.read_u32_be("metadata block header")?;
            let header = BlockHeader {
                is_last: raw & 0x8000_0000 != 0,
                block_type: BlockType::from(((raw >> 24) & 0x7F) as u8),
                length: (raw & 0x00FF_FFFF) as usize,
            };
            let payload = reader.take(header.length, "metadata block")?;

            match header.block_type {
                BlockType::StreamInfo => metadata.stream_info = Some(StreamInfo::parse(payload)?),
                BlockType::VorbisComment => {
                    metadata.vorbis_comments.push(VorbisComment::parse(payload)?)
                }
                BlockType::Picture => metadata.pictures.push(PictureBlock::parse(payload)?),
                _ => {}
            }
            metadata.block_headers.push(header);

            if header.is_last {
                break;
            }
        }

        for block in &metadata.vorbis_comments {
            for (key, value) in &block.comments {
                metadata
                    .user_comments
                    .entry(key.clone())
                    .or_default()
                    .push(value.clone());
            }
        }

        debug!(
            "Parsed FLAC: {} metadata blocks, {} comments, {} pictures",
            metadata.block_headers.len(),
            metadata.user_comments.len(),
            metadata.pictures.len()
        );
        Ok(metadata)
    }

    /// Every value recorded under `key`, in file order.
    pub fn comment_values(&self, key: &str) -> &[String] {
        self.user_comments
            .get(key)
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }

    fn joined(&self, key: &str) -> Option<String> {
        let values = self.comment_values(key);
        if values.iter().all(|value| value.is_empty()) {
            return None;
        }
        Some(values.join(", "))
    }

    fn first_number(&self, keys: &[&str]) -> u32 {
        keys.iter()
            .flat_map(|key| self.comment_values(key))
            .find_map(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    fn first_date(&self, key: &str) -> Option<NaiveDateTime> {
        self.comment_values(key)
            .iter()
            .find_map(|value| parse_tag_date(value))
    }
}

/// Some taggers put an ID3v2 tag in front of the FLAC stream.
fn skip_leading_id3v2(buf: &[u8]) -> &[u8] {
    if !is_id3v2_header(buf) {
        return buf;
    }
    let tag_len = ID3V2_HEADER_LEN + tag_body_size(buf);
    buf.get(tag_len..).unwrap_or(&[])
}

impl Metadata for FlacMetadata {
    fn track_name(&self) -> Option<String> {
        self.joined("TITLE")
    }

    fn track_position(&self) -> u32 {
        self.first_number(&["TRACKNUMBER"])
    }

    fn total_tracks(&self) -> u32 {
        self.first_number(&["TRACKTOTAL", "TOTALTRACKS"])
    }

    fn artist_name(&self) -> Option<String> {
        self.joined("ARTIST")
    }

    fn album_artist_name(&self) -> Option<String> {
        self.joined("ALBUMARTIST")
    }

    fn album_name(&self) -> Option<String> {
        self.joined("ALBUM")
    }

    fn release_date(&self) -> Option<NaiveDateTime> {
        self.first_date("DATE")
    }

    fn original_release_date(&self) -> Option<NaiveDateTime> {
        self.first_date("ORIGINALDATE")
    }

    fn disc_name(&self) -> Option<String> {
        self.joined("DISCSUBTITLE")
    }

    fn disc_position(&self) -> u32 {
        self.first_number(&["DISCNUMBER"])
    }

    fn total_discs(&self) -> u32 {
        self.first_number(&["DISCTOTAL", "TOTALDISCS"])
    }

    fn duration(&self) -> f64 {
        self.stream_info
            .map(|info| info.duration())
            .unwrap_or(0.0)
    }

    fn images(&self) -> Vec<&[u8]> {
        self.pictures
            .iter()
            .map(|picture| picture.data.as_slice())
            .collect()
    }
}
