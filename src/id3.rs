pub const ID3_HEADER_LEN: usize = 10;

const FRAME_HEADER_LEN: usize = 10;
const TIMESTAMP_OWNER: &[u8] = b"com.apple.streaming.transportStreamTimestamp";
const PTS_MASK: u64 = 0x1_ffff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id3Header {
    pub major_version: u8,
    pub flags: u8,
    /// Size of everything after the 10-byte header, footer included.
    pub body_len: usize,
}

impl Id3Header {
    const FLAG_EXTENDED_HEADER: u8 = 0x40;
    const FLAG_FOOTER: u8 = 0x10;

    #[must_use]
    pub fn is_tag_start(data: &[u8]) -> bool {
        data.starts_with(b"ID3")
    }

    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ID3_HEADER_LEN || !Self::is_tag_start(data) {
            return None;
        }
        let major_version = data[3];
        if data[4] == 0xff || major_version == 0xff {
            return None;
        }
        let flags = data[5];
        let size = syncsafe(&data[6..10])?;
        let footer = if flags & Self::FLAG_FOOTER != 0 {
            ID3_HEADER_LEN
        } else {
            0
        };
        Some(Self {
            major_version,
            flags,
            body_len: size + footer,
        })
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        ID3_HEADER_LEN + self.body_len
    }
}

/// Looks for the transport stream timestamp inside a tag body (the bytes
/// following the header). Returns the 33-bit PTS in 90 kHz ticks.
#[must_use]
pub fn transport_stream_timestamp(header: &Id3Header, body: &[u8]) -> Option<u64> {
    if header.major_version < 3 {
        return None;
    }
    let mut frames = body;
    if header.flags & Id3Header::FLAG_EXTENDED_HEADER != 0 {
        let size_bytes = frames.get(..4)?;
        let skip = if header.major_version >= 4 {
            syncsafe(size_bytes)?
        } else {
            read_u32(size_bytes) as usize + 4
        };
        frames = frames.get(skip..)?;
    }

    while frames.len() >= FRAME_HEADER_LEN {
        let id = &frames[..4];
        if id[0] == 0 {
            // padding
            break;
        }
        let size = if header.major_version >= 4 {
            syncsafe(&frames[4..8])?
        } else {
            read_u32(&frames[4..8]) as usize
        };
        let content = frames.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + size)?;
        if id == b"PRIV" {
            if let Some(pts) = priv_timestamp(content) {
                return Some(pts);
            }
        }
        frames = &frames[FRAME_HEADER_LEN + size..];
    }
    None
}

fn priv_timestamp(content: &[u8]) -> Option<u64> {
    let owner_end = content.iter().position(|byte| *byte == 0)?;
    if &content[..owner_end] != TIMESTAMP_OWNER {
        return None;
    }
    let data = content.get(owner_end + 1..owner_end + 9)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(data);
    Some(u64::from_be_bytes(raw) & PTS_MASK)
}

fn syncsafe(bytes: &[u8]) -> Option<usize> {
    if bytes.iter().any(|byte| byte & 0x80 != 0) {
        return None;
    }
    Some(
        bytes
            .iter()
            .fold(0usize, |acc, byte| (acc << 7) | usize::from(*byte)),
    )
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
