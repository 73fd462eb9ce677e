//! ID3v2.3 / ID3v2.4 tags.
//!
//! The tag is decoded into its raw frame list first; text and picture frames
//! are interpreted on demand.

use std::borrow::Cow;

use tracing::debug;

use super::error::{DecodeError, DecodeResult};
use super::reader::ByteReader;

pub const ID3V2_HEADER_LEN: usize = 10;
const FRAME_HEADER_LEN: usize = 10;
const FLAG_UNSYNCHRONISATION: u8 = 0x80;
const FLAG_EXTENDED_HEADER: u8 = 0x40;
/// v2.4 frame format flags, second flag byte.
const FRAME_FLAG_UNSYNCHRONISATION: u8 = 0x02;
const FRAME_FLAG_DATA_LENGTH: u8 = 0x01;

/// Decode a 28-bit integer stored 7 bits per byte, most significant first.
pub fn synchsafe_decode(buf: [u8; 4]) -> u32 {
    (buf[0] as u32 & 0x7F) << 21
        | (buf[1] as u32 & 0x7F) << 14
        | (buf[2] as u32 & 0x7F) << 7
        | (buf[3] as u32 & 0x7F)
}

/// Inverse of [`synchsafe_decode`] for values below 2^28.
pub fn synchsafe_encode(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

/// Undo unsynchronisation: every `FF 00` pair becomes `FF`.
pub fn resynchronise(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len());
    let mut i = 0;
    while i < buf.len() {
        out.push(buf[i]);
        if buf[i] == 0xFF && buf.get(i + 1) == Some(&0) {
            i += 1;
        }
        i += 1;
    }
    out
}

fn four(buf: &[u8]) -> [u8; 4] {
    [buf[0], buf[1], buf[2], buf[3]]
}

/// Whether `buf` starts with a v2.3 or v2.4 tag header.
pub fn is_id3v2_header(buf: &[u8]) -> bool {
    buf.len() >= ID3V2_HEADER_LEN && buf.starts_with(b"ID3") && (buf[3] == 3 || buf[3] == 4)
}

/// Size of the tag body that follows the 10-byte header.
pub fn tag_body_size(header: &[u8]) -> usize {
    synchsafe_decode(four(&header[6..10])) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id3v2Header {
    pub major_version: u8,
    pub revision: u8,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id3v2Frame {
    pub id: String,
    pub flags: [u8; 2],
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureFrame {
    pub mime_type: String,
    pub picture_type: u8,
    pub description: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id3v2Tag {
    pub header: Id3v2Header,
    pub frames: Vec<Id3v2Frame>,
}

impl Id3v2Tag {
    /// Decode a complete tag: the 10-byte header followed by its body.
    pub fn parse(buf: &[u8]) -> DecodeResult<Id3v2Tag> {
        if !is_id3v2_header(buf) {
            return Err(DecodeError::Malformed("missing ID3v2 header".to_string()));
        }
        let header = Id3v2Header {
            major_version: buf[3],
            revision: buf[4],
            flags: buf[5],
        };
        let body_size = tag_body_size(buf);
        let mut reader = ByteReader::new(&buf[ID3V2_HEADER_LEN..]);
        let raw_body = reader.take(body_size, "ID3v2 tag body")?;

        // v2.3 unsynchronises the whole body, v2.4 does it frame by frame
        let unsynchronised = header.flags & FLAG_UNSYNCHRONISATION != 0;
        let decoded: Cow<[u8]> = if unsynchronised && header.major_version == 3 {
            Cow::Owned(resynchronise(raw_body))
        } else {
            Cow::Borrowed(raw_body)
        };
        let mut body: &[u8] = &decoded;

        if header.flags & FLAG_EXTENDED_HEADER != 0 {
            body = skip_extended_header(body, header.major_version)?;
        }

        let mut frames = Vec::new();
        while body.len() > FRAME_HEADER_LEN {
            // Not every writer sets the padding flag, a zero byte is enough.
            if body[0] == 0 {
                break;
            }

            let size = match header.major_version {
                4 => synchsafe_decode(four(&body[4..8])) as usize,
                _ => u32::from_be_bytes(four(&body[4..8])) as usize,
            };
            if size + FRAME_HEADER_LEN > body.len() {
                break;
            }

            let flags = [body[8], body[9]];
            let payload = &body[FRAME_HEADER_LEN..FRAME_HEADER_LEN + size];
            let payload = match header.major_version {
                4 => v24_frame_payload(payload, flags[1], unsynchronised),
                _ => payload.to_vec(),
            };
            frames.push(Id3v2Frame {
                id: String::from_utf8_lossy(&body[0..4]).into_owned(),
                flags,
                payload,
            });
            body = &body[FRAME_HEADER_LEN + size..];
        }

        Ok(Id3v2Tag { header, frames })
    }

    /// Text information frames, excluding user-defined `TXXX` frames.
    /// Frames that fail to decode are left out.
    pub fn text_frames(&self) -> Vec<TextFrame> {
        self.frames
            .iter()
            .filter(|frame| frame.id.starts_with('T') && frame.id != "TXXX")
            .filter_map(|frame| match parse_text_frame(frame) {
                Ok(text) => Some(text),
                Err(err) => {
                    debug!("Skipping ID3v2 frame {}: {}", frame.id, err);
                    None
                }
            })
            .collect()
    }

    /// Attached picture frames in tag order, undecodable ones left out.
    pub fn picture_frames(&self) -> Vec<PictureFrame> {
        self.frames
            .iter()
            .filter(|frame| frame.id == "APIC")
            .filter_map(|frame| match parse_picture_frame(frame) {
                Ok(picture) => Some(picture),
                Err(err) => {
                    debug!("Skipping ID3v2 picture frame: {}", err);
                    None
                }
            })
            .collect()
    }
}

/// Strip the data length indicator and undo unsynchronisation of a v2.4
/// frame payload.
fn v24_frame_payload(payload: &[u8], format_flags: u8, tag_unsynchronised: bool) -> Vec<u8> {
    let payload = if format_flags & FRAME_FLAG_DATA_LENGTH != 0 && payload.len() >= 4 {
        &payload[4..]
    } else {
        payload
    };
    if tag_unsynchronised || format_flags & FRAME_FLAG_UNSYNCHRONISATION != 0 {
        resynchronise(payload)
    } else {
        payload.to_vec()
    }
}

fn skip_extended_header(body: &[u8], major_version: u8) -> DecodeResult<&[u8]> {
    let mut reader = ByteReader::new(body);
    let size_bytes = four(reader.take(4, "ID3v2 extended header size")?);
    // v2.4 counts the size field itself, v2.3 does not
    let remaining = match major_version {
        4 => (synchsafe_decode(size_bytes) as usize).saturating_sub(4),
        _ => u32::from_be_bytes(size_bytes) as usize,
    };
    reader.take(remaining, "ID3v2 extended header")?;
    Ok(reader.rest())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextEncoding {
    Latin1,
    Utf16Bom,
    Utf16Be,
    Utf8,
}

impl TextEncoding {
    fn from_byte(b: u8) -> DecodeResult<TextEncoding> {
        match b {
            0 => Ok(TextEncoding::Latin1),
            1 => Ok(TextEncoding::Utf16Bom),
            2 => Ok(TextEncoding::Utf16Be),
            3 => Ok(TextEncoding::Utf8),
            other => Err(DecodeError::Malformed(format!(
                "unknown ID3v2 text encoding {}",
                other
            ))),
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, TextEncoding::Utf16Bom | TextEncoding::Utf16Be)
    }
}

/// Split `buf` at the encoding's terminator. Without a terminator the whole
/// buffer is the text and nothing is left over.
fn split_terminated(buf: &[u8], wide: bool) -> (&[u8], &[u8]) {
    if wide {
        let mut i = 0;
        while i + 1 < buf.len() {
            if buf[i] == 0 && buf[i + 1] == 0 {
                return (&buf[..i], &buf[i + 2..]);
            }
            i += 2;
        }
        (buf, &[])
    } else {
        match buf.iter().position(|&b| b == 0) {
            Some(i) => (&buf[..i], &buf[i + 1..]),
            None => (buf, &[]),
        }
    }
}

fn decode_utf16(buf: &[u8], little_endian: bool) -> String {
    let units = buf.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn decode_latin1(buf: &[u8]) -> String {
    buf.iter().map(|&b| b as char).collect()
}

/// Decode one terminated string, returning it with the bytes that follow.
fn decode_string(encoding: TextEncoding, buf: &[u8]) -> (String, &[u8]) {
    let (text, rest) = split_terminated(buf, encoding.is_wide());
    let decoded = match encoding {
        TextEncoding::Latin1 => decode_latin1(text),
        TextEncoding::Utf8 => String::from_utf8_lossy(text).into_owned(),
        TextEncoding::Utf16Be => decode_utf16(text, false),
        TextEncoding::Utf16Bom => match text {
            [0xFF, 0xFE, body @ ..] => decode_utf16(body, true),
            [0xFE, 0xFF, body @ ..] => decode_utf16(body, false),
            body => decode_utf16(body, false),
        },
    };
    (decoded, rest)
}

fn parse_text_frame(frame: &Id3v2Frame) -> DecodeResult<TextFrame> {
    let (&encoding, text) = frame
        .payload
        .split_first()
        .ok_or_else(|| DecodeError::Malformed(format!("empty {} frame", frame.id)))?;
    let (text, _) = decode_string(TextEncoding::from_byte(encoding)?, text);
    Ok(TextFrame {
        id: frame.id.clone(),
        text,
    })
}

fn parse_picture_frame(frame: &Id3v2Frame) -> DecodeResult<PictureFrame> {
    let mut reader = ByteReader::new(&frame.payload);
    let encoding = TextEncoding::from_byte(reader.read_u8("APIC encoding")?)?;
    // The MIME type is always plain ASCII, whatever the frame encoding.
    let (mime_type, rest) = decode_string(TextEncoding::Latin1, reader.rest());
    let mut reader = ByteReader::new(rest);
    let picture_type = reader.read_u8("APIC picture type")?;
    let (description, data) = decode_string(encoding, reader.rest());
    Ok(PictureFrame {
        mime_type,
        picture_type,
        description,
        data: data.to_vec(),
    })
}

/// Split a `position/total` value; missing or non-numeric parts read as 0.
pub fn parse_position(value: &str) -> (u32, u32) {
    let mut parts = value.splitn(2, '/');
    let position = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(0);
    let total = parts
        .next()
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0);
    (position, total)
}


#[cfg(test)]
mod tests {
    use super::test_support::TagBuilder;
    use super::*;
    use std::collections::BTreeMap;

    fn text_map(tag: &Id3v2Tag) -> BTreeMap<String, String> {
        tag.text_frames()
            .into_iter()
            .map(|f| (f.id, f.text))
            .collect()
    }

    #[test]
    fn synchsafe_roundtrip_edges() {
        for value in [0u32, 1, 127, 128, 255, 16_383, 16_384, 1 << 21, (1 << 28) - 1] {
            let encoded = synchsafe_encode(value);
            assert!(encoded.iter().all(|b| b & 0x80 == 0));
            assert_eq!(synchsafe_decode(encoded), value);
        }
    }

    #[test]
    fn synchsafe_roundtrip_sweep() {
        let mut value = 0u32;
        while value < (1 << 28) {
            assert_eq!(synchsafe_decode(synchsafe_encode(value)), value);
            value = value * 3 + 7;
        }
    }

    #[test]
    fn synchsafe_ignores_high_bits() {
        assert_eq!(synchsafe_decode([0x80, 0x80, 0x81, 0xFF]), 0xFF);
    }

    #[test]
    fn text_frames_recovered_with_and_without_padding() {
        for version in [3u8, 4] {
            let plain = TagBuilder::new(version)
                .text("TIT2", "Paranoid Android")
                .text("TPE1", "Radiohead")
                .text("TALB", "OK Computer")
                .text("TRCK", "2/12")
                .build();
            let padded = TagBuilder::new(version)
                .text("TIT2", "Paranoid Android")
                .text("TPE1", "Radiohead")
                .text("TALB", "OK Computer")
                .text("TRCK", "2/12")
                .padding(512)
                .build();

            let plain_tag = Id3v2Tag::parse(&plain).unwrap();
            let padded_tag = Id3v2Tag::parse(&padded).unwrap();
            assert_eq!(plain_tag.header.major_version, version);
            assert_eq!(text_map(&plain_tag), text_map(&padded_tag));

            let frames = text_map(&plain_tag);
            assert_eq!(frames.len(), 4);
            assert_eq!(frames["TIT2"], "Paranoid Android");
            assert_eq!(frames["TRCK"], "2/12");
        }
    }

    #[test]
    fn v24_frame_sizes_are_synchsafe() {
        // 200 bytes needs the second synchsafe byte, a plain read would be wrong
        let long_title = "x".repeat(200);
        let raw = TagBuilder::new(4).text("TIT2", &long_title).text("TPE1", "A").build();
        let frames = text_map(&Id3v2Tag::parse(&raw).unwrap());
        assert_eq!(frames["TIT2"], long_title);
        assert_eq!(frames["TPE1"], "A");
    }

    #[test]
    fn decodes_every_text_encoding() {
        let mut utf16_le = vec![1, 0xFF, 0xFE];
        for unit in "Björk".encode_utf16() {
            utf16_le.extend_from_slice(&unit.to_le_bytes());
        }
        utf16_le.extend_from_slice(&[0, 0]);

        let mut utf16_bom_be = vec![1, 0xFE, 0xFF];
        let mut utf16_be = vec![2];
        for unit in "Sigur Rós".encode_utf16() {
            utf16_bom_be.extend_from_slice(&unit.to_be_bytes());
            utf16_be.extend_from_slice(&unit.to_be_bytes());
        }
        utf16_be.extend_from_slice(&[0, 0]);

        let raw = TagBuilder::new(3)
            .frame("TPE1", &utf16_le)
            .frame("TPE2", &utf16_bom_be)
            .frame("TALB", &utf16_be)
            .frame("TIT2", b"\x00Caf\xe9\x00")
            .build();
        let frames = text_map(&Id3v2Tag::parse(&raw).unwrap());
        assert_eq!(frames["TPE1"], "Björk");
        assert_eq!(frames["TPE2"], "Sigur Rós");
        assert_eq!(frames["TALB"], "Sigur Rós");
        assert_eq!(frames["TIT2"], "Café");
    }

    #[test]
    fn utf16_terminator_is_code_unit_aligned() {
        // "Ā" is 0x0100 in UTF-16BE: the bytes 01 00 00 41 contain "00 00" at an odd offset
        let payload = [2, 0x01, 0x00, 0x00, 0x41, 0x00, 0x00];
        let raw = TagBuilder::new(3).frame("TIT2", &payload).build();
        let frames = text_map(&Id3v2Tag::parse(&raw).unwrap());
        assert_eq!(frames["TIT2"], "ĀA");
    }

    #[test]
    fn skips_user_defined_text_frames() {
        let raw = TagBuilder::new(3)
            .text("TXXX", "custom")
            .text("TIT2", "Song")
            .frame("COMM", b"\x00eng\x00hello")
            .build();
        let tag = Id3v2Tag::parse(&raw).unwrap();
        assert_eq!(tag.frames.len(), 3);
        let frames = text_map(&tag);
        assert_eq!(frames.len(), 1);
        assert!(frames.contains_key("TIT2"));
    }

    #[test]
    fn picture_frames_carry_raw_bytes() {
        let image = [0x89, b'P', b'N', b'G', 0, 0, 1, 2, 3];
        let raw = TagBuilder::new(3).picture("image/png", &image).build();
        let pictures = Id3v2Tag::parse(&raw).unwrap().picture_frames();
        assert_eq!(pictures.len(), 1);
        assert_eq!(pictures[0].mime_type, "image/png");
        assert_eq!(pictures[0].picture_type, 3);
        assert_eq!(pictures[0].description, "cover");
        assert_eq!(pictures[0].data, image);
    }

    #[test]
    fn oversized_frame_stops_the_frame_loop() {
        let mut raw = TagBuilder::new(3).text("TIT2", "Song").text("TPE1", "Band").build();
        // bump the declared size of the second frame past the end of the tag
        let second = ID3V2_HEADER_LEN + FRAME_HEADER_LEN + 6;
        raw[second + 7] = 0xFF;
        let tag = Id3v2Tag::parse(&raw).unwrap();
        assert_eq!(tag.frames.len(), 1);
        assert_eq!(tag.frames[0].id, "TIT2");
    }

    #[test]
    fn truncated_tag_body_is_an_error() {
        let raw = TagBuilder::new(4).text("TIT2", "Song").build();
        let result = Id3v2Tag::parse(&raw[..raw.len() - 3]);
        assert!(matches!(result, Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn undecodable_text_frames_leave_the_others() {
        let raw = TagBuilder::new(3)
            .text("TIT2", "Airbag")
            .text("TPE1", "Radiohead")
            .frame("TCON", b"\x05junk")
            .frame("TCOM", b"")
            .text("TALB", "OK Computer")
            .build();
        let tag = Id3v2Tag::parse(&raw).unwrap();
        assert_eq!(tag.frames.len(), 5);

        let frames = text_map(&tag);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames["TIT2"], "Airbag");
        assert_eq!(frames["TPE1"], "Radiohead");
        assert_eq!(frames["TALB"], "OK Computer");
        assert!(matches!(
            parse_text_frame(&tag.frames[2]),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn undecodable_picture_frame_is_skipped() {
        let image = [0x89, b'P', b'N', b'G', 1];
        let raw = TagBuilder::new(3)
            .frame("APIC", b"\x09")
            .picture("image/png", &image)
            .build();
        let pictures = Id3v2Tag::parse(&raw).unwrap().picture_frames();
        assert_eq!(pictures.len(), 1);
        assert_eq!(pictures[0].data, image);
    }

    #[test]
    fn resynchronise_drops_inserted_zeros() {
        assert_eq!(resynchronise(&[0xFF, 0x00, 0xE0]), vec![0xFF, 0xE0]);
        assert_eq!(resynchronise(&[0xFF, 0x00, 0x00]), vec![0xFF, 0x00]);
        assert_eq!(resynchronise(&[0xFF]), vec![0xFF]);
        assert_eq!(resynchronise(&[0x00, 0xFF, 0x01]), vec![0x00, 0xFF, 0x01]);
    }

    #[test]
    fn v23_unsynchronised_tag_is_restored() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0x00, 0x42];
        let raw = TagBuilder::new(3)
            .text("TIT2", "Lucky")
            .picture("image/jpeg", &jpeg)
            .padding(16)
            .build_unsynchronised();
        assert_ne!(raw[5] & FLAG_UNSYNCHRONISATION, 0);

        let tag = Id3v2Tag::parse(&raw).unwrap();
        assert_eq!(text_map(&tag)["TIT2"], "Lucky");
        let pictures = tag.picture_frames();
        assert_eq!(pictures.len(), 1);
        assert_eq!(pictures[0].data, jpeg);
    }

    #[test]
    fn v24_frame_unsynchronisation_and_data_length() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE1, 7];
        let mut apic = b"\x00image/jpeg\x00\x03\x00".to_vec();
        apic.extend_from_slice(&jpeg);
        let mut payload = synchsafe_encode(apic.len() as u32).to_vec();
        payload.extend(test_support::unsynchronise(&apic));

        let raw = TagBuilder::new(4)
            .frame_with_flags(
                "APIC",
                [0, FRAME_FLAG_UNSYNCHRONISATION | FRAME_FLAG_DATA_LENGTH],
                &payload,
            )
            .text("TIT2", "Karma Police")
            .build();
        let tag = Id3v2Tag::parse(&raw).unwrap();
        assert_eq!(tag.picture_frames()[0].data, jpeg);
        assert_eq!(text_map(&tag)["TIT2"], "Karma Police");
    }

    #[test]
    fn extended_header_is_skipped() {
        let mut raw = TagBuilder::new(3).text("TIT2", "Song").build();
        // v2.3: 4-byte size (excluding itself) + 6 bytes of extended header
        let ext = [0u8, 0, 0, 6, 0, 0, 0, 0, 0, 0];
        raw.splice(ID3V2_HEADER_LEN..ID3V2_HEADER_LEN, ext);
        raw[5] |= FLAG_EXTENDED_HEADER;
        let body_len = (raw.len() - ID3V2_HEADER_LEN) as u32;
        raw[6..10].copy_from_slice(&synchsafe_encode(body_len));
        let frames = text_map(&Id3v2Tag::parse(&raw).unwrap());
        assert_eq!(frames["TIT2"], "Song");
    }

    #[test]
    fn positions() {
        assert_eq!(parse_position("3/12"), (3, 12));
        assert_eq!(parse_position("7"), (7, 0));
        assert_eq!(parse_position(" 4 / 9 "), (4, 9));
        assert_eq!(parse_position("a/b"), (0, 0));
        assert_eq!(parse_position(""), (0, 0));
    }
}
