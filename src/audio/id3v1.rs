//! ID3v1 trailing tags: a fixed 128-byte block starting with "TAG".

pub const ID3V1_TAG_LEN: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id3v1Tag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub comment: String,
    pub genre: u8,
}

pub fn is_id3v1_tag(buf: &[u8]) -> bool {
    buf.len() >= ID3V1_TAG_LEN && buf.starts_with(b"TAG")
}

/// Fields are Latin-1, cut at the first NUL and stripped of space padding.
fn read_field(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let text: String = buf[..end].iter().map(|&b| b as char).collect();
    text.trim_end_matches(' ').to_string()
}

impl Id3v1Tag {
    /// Decode a tag from a buffer accepted by [`is_id3v1_tag`].
    pub fn parse(buf: &[u8]) -> Option<Id3v1Tag> {
        if !is_id3v1_tag(buf) {
            return None;
        }
        Some(Id3v1Tag {
            title: read_field(&buf[3..33]),
            artist: read_field(&buf[33..63]),
            album: read_field(&buf[63..93]),
            year: read_field(&buf[93..97]),
            comment: read_field(&buf[97..127]),
            genre: buf[127],
        })
    }
}

#[cfg(test)]
pub(crate) fn encode_tag(title: &str, artist: &str, album: &str, year: &str) -> Vec<u8> {
    fn field(out: &mut Vec<u8>, value: &str, width: usize) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(width, 0);
        out.extend_from_slice(&bytes[..width]);
    }
    let mut out = b"TAG".to_vec();
    field(&mut out, title, 30);
    field(&mut out, artist, 30);
    field(&mut out, album, 30);
    field(&mut out, year, 4);
    field(&mut out, "", 30);
    out.push(17);
    out
}
