//! Byte-level builders for audio fixtures.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R', 0, 0, 0,
    1,
];

pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0];

/// MPEG-1 Layer III, 128 kbps, 44100 Hz, no padding: 417 bytes per frame.
const MPEG_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x44];
const MPEG_FRAME_LEN: usize = 417;

fn synchsafe(value: usize) -> [u8; 4] {
    let value = value as u32;
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

#[derive(Default)]
pub struct Mp3 {
    major_version: u8,
    frames: Vec<(String, Vec<u8>)>,
    mpeg_frames: usize,
}

impl Mp3 {
    pub fn v24() -> Self {
        Self {
            major_version: 4,
            mpeg_frames: 10,
            ..Default::default()
        }
    }

    pub fn v23() -> Self {
        Self {
            major_version: 3,
            mpeg_frames: 10,
            ..Default::default()
        }
    }

    pub fn text(mut self, id: &str, text: &str) -> Self {
        let mut payload = vec![3u8];
        payload.extend_from_slice(text.as_bytes());
        payload.push(0);
        self.frames.push((id.to_string(), payload));
        self
    }

    pub fn picture(mut self, mime_type: &str, data: &[u8]) -> Self {
        let mut payload = vec![0u8];
        payload.extend_from_slice(mime_type.as_bytes());
        payload.push(0);
        payload.push(3);
        payload.extend_from_slice(b"cover\0");
        payload.extend_from_slice(data);
        self.frames.push(("APIC".to_string(), payload));
        self
    }

    pub fn mpeg_frames(mut self, count: usize) -> Self {
        self.mpeg_frames = count;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (id, payload) in &self.frames {
            body.extend_from_slice(id.as_bytes());
            if self.major_version == 4 {
                body.extend_from_slice(&synchsafe(payload.len()));
            } else {
                body.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            }
            body.extend_from_slice(&[0, 0]);
            body.extend_from_slice(payload);
        }
        body.extend_from_slice(&[0; 64]);

        let mut out = b"ID3".to_vec();
        out.extend_from_slice(&[self.major_version, 0, 0]);
        out.extend_from_slice(&synchsafe(body.len()));
        out.extend_from_slice(&body);
        for _ in 0..self.mpeg_frames {
            out.extend_from_slice(&MPEG_FRAME_HEADER);
            out.extend(std::iter::repeat(0u8).take(MPEG_FRAME_LEN - MPEG_FRAME_HEADER.len()));
        }
        out
    }
}

#[derive(Default)]
pub struct Flac {
    comments: Vec<(String, String)>,
    pictures: Vec<(String, Vec<u8>)>,
    total_samples: u64,
}

impl Flac {
    /// A stereo 16-bit 44.1 kHz stream of `seconds`.
    pub fn new(seconds: u64) -> Self {
        Self {
            total_samples: seconds * 44_100,
            ..Default::default()
        }
    }

    pub fn comment(mut self, key: &str, value: &str) -> Self {
        self.comments.push((key.to_string(), value.to_string()));
        self
    }

    pub fn picture(mut self, mime_type: &str, data: &[u8]) -> Self {
        self.pictures.push((mime_type.to_string(), data.to_vec()));
        self
    }

    fn stream_info(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&[0, 0, 14]);
        out.extend_from_slice(&[0, 0x2E, 0xE0]);
        let packed: u64 = 44_100u64 << 44 | 1u64 << 41 | 15u64 << 36 | self.total_samples;
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0; 16]);
        out
    }

    fn vorbis_comment(&self) -> Vec<u8> {
        let vendor = b"fixture";
        let mut out = Vec::new();
        out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        out.extend_from_slice(vendor);
        out.extend_from_slice(&(self.comments.len() as u32).to_le_bytes());
        for (key, value) in &self.comments {
            let comment = format!("{}={}", key, value);
            out.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            out.extend_from_slice(comment.as_bytes());
        }
        out
    }

    fn picture_block(mime_type: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&3u32.to_be_bytes());
        out.extend_from_slice(&(mime_type.len() as u32).to_be_bytes());
        out.extend_from_slice(mime_type.as_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        for value in [1u32, 1, 24, 0] {
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let mut blocks = vec![(0u8, self.stream_info()), (4u8, self.vorbis_comment())];
        for (mime_type, data) in &self.pictures {
            blocks.push((6u8, Self::picture_block(mime_type, data)));
        }

        let mut out = b"fLaC".to_vec();
        let count = blocks.len();
        for (i, (block_type, payload)) in blocks.into_iter().enumerate() {
            let last = if i + 1 == count { 0x80 } else { 0 };
            let len = (payload.len() as u32).to_be_bytes();
            out.extend_from_slice(&[last | block_type, len[1], len[2], len[3]]);
            out.extend_from_slice(&payload);
        }
        out
    }
}

pub fn write(dir: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}
