//! MPEG audio frame headers.
//!
//! Only the fields needed to walk the frame sequence and estimate the
//! duration are decoded. The duration assumes a constant bitrate, so VBR
//! files come out approximate.

/// Indexed by `[version][layer][bitrate_index]`, in kbps. Zero means reserved/free.
const BITRATE_KBPS: [[[u32; 16]; 4]; 4] = [
    // MPEG 2.5
    [
        [0; 16],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
    ],
    // reserved
    [[0; 16], [0; 16], [0; 16], [0; 16]],
    // MPEG 2
    [
        [0; 16],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
    ],
    // MPEG 1
    [
        [0; 16],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
    ],
];

/// Indexed by `[version][sample_rate_index]`, in Hz.
const SAMPLE_RATE_HZ: [[u32; 4]; 4] = [
    [11025, 12000, 8000, 0],
    [0, 0, 0, 0],
    [22050, 24000, 16000, 0],
    [44100, 48000, 32000, 0],
];

/// Frame size coefficient, indexed by `[version][layer]`.
const COEFFICIENT: [[u32; 4]; 4] = [
    [0, 72, 144, 12],
    [0, 0, 0, 0],
    [0, 72, 144, 12],
    [0, 144, 144, 12],
];

/// Samples carried by one frame, indexed by `[version][layer]`.
const SAMPLES_PER_FRAME: [[u32; 4]; 4] = [
    [0, 576, 1152, 384],
    [0, 0, 0, 0],
    [0, 576, 1152, 384],
    [0, 1152, 1152, 384],
];

/// Padding slot size in bytes, indexed by layer.
const PADDING: [u32; 4] = [0, 1, 1, 4];

pub const MPEG_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpegHeader {
    raw: [u8; MPEG_HEADER_LEN],
}

impl MpegHeader {
    /// Decode a header from the start of `buf`, returning `None` when the
    /// bytes are not a usable frame header.
    pub fn parse(buf: &[u8]) -> Option<MpegHeader> {
        if buf.len() < MPEG_HEADER_LEN {
            return None;
        }
        let header = MpegHeader {
            raw: [buf[0], buf[1], buf[2], buf[3]],
        };
        header.is_valid().then_some(header)
    }

    fn is_valid(&self) -> bool {
        self.raw[0] == 0xFF
            && self.raw[1] & 0xE0 == 0xE0
            && self.version() != 1
            && self.layer() != 0
            && self.bitrate_kbps() != 0
            && self.sample_rate() != 0
    }

    /// Raw 2-bit version id: 0 = MPEG 2.5, 1 = reserved, 2 = MPEG 2, 3 = MPEG 1.
    pub fn version(&self) -> usize {
        ((self.raw[1] & 0x18) >> 3) as usize
    }

    /// Raw 2-bit layer id: 1 = Layer III, 2 = Layer II, 3 = Layer I.
    pub fn layer(&self) -> usize {
        ((self.raw[1] & 0x06) >> 1) as usize
    }

    fn bitrate_index(&self) -> usize {
        ((self.raw[2] & 0xF0) >> 4) as usize
    }

    fn sample_rate_index(&self) -> usize {
        ((self.raw[2] & 0x0C) >> 2) as usize
    }

    pub fn has_padding(&self) -> bool {
        self.raw[2] & 0x02 != 0
    }

    pub fn bitrate_kbps(&self) -> u32 {
        BITRATE_KBPS[self.version()][self.layer()][self.bitrate_index()]
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE_HZ[self.version()][self.sample_rate_index()]
    }

    pub fn samples_per_frame(&self) -> u32 {
        SAMPLES_PER_FRAME[self.version()][self.layer()]
    }

    /// Length of the whole frame in bytes, header included.
    pub fn frame_size(&self) -> usize {
        let coefficient = COEFFICIENT[self.version()][self.layer()];
        let padding = if self.has_padding() {
            PADDING[self.layer()]
        } else {
            0
        };
        ((coefficient * self.bitrate_kbps() * 1000) / self.sample_rate() + padding) as usize
    }
}

/// Estimate a stream duration in seconds from its frame count, using the
/// rate of the first frame.
pub fn estimate_duration(first: &MpegHeader, frame_count: usize) -> f64 {
    let frames_per_second = first.sample_rate() as f64 / first.samples_per_frame() as f64;
    frame_count as f64 / frames_per_second
}

#[cfg(test)]
pub(crate) fn encode_header(
    version: u8,
    layer: u8,
    bitrate_index: u8,
    sample_rate_index: u8,
    padding: bool,
) -> [u8; MPEG_HEADER_LEN] {
    [
        0xFF,
        0xE0 | (version & 0x03) << 3 | (layer & 0x03) << 1 | 0x01,
        (bitrate_index & 0x0F) << 4 | (sample_rate_index & 0x03) << 2 | (padding as u8) << 1,
        0x44,
    ]
}
