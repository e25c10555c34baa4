use std::io::{Read, SeekFrom};

use tracing::{debug, trace};

use crate::{
    DemuxError, Result,
    id3::{self, ID3_HEADER_LEN, Id3Header},
    stream::{ByteStream, read_up_to},
};

pub const ADTS_HEADER_LEN: usize = 7;
pub const ADTS_CRC_HEADER_LEN: usize = 9;
pub const SAMPLES_PER_RAW_BLOCK: u64 = 1024;
pub const PTS_CLOCK_HZ: u64 = 90_000;

const SCAN_CHUNK: usize = 4096;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// 0 = MPEG-4, 1 = MPEG-2.
    pub mpeg_version: u8,
    pub protection_absent: bool,
    /// Audio object type minus one (0 = Main, 1 = LC, 2 = SSR, 3 = LTP).
    pub profile: u8,
    pub sample_rate_index: u8,
    pub channel_config: u8,
    /// Whole frame length, header included.
    pub frame_length: u16,
    pub num_raw_data_blocks: u8,
}

impl AdtsHeader {
    /// Parses the fixed and variable header parts. `data` must hold at least
    /// [`ADTS_HEADER_LEN`] bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ADTS_HEADER_LEN {
            return Err(DemuxError::StreamFormat("ADTS header too short".to_string()));
        }
        if !is_sync(data[0], data[1]) {
            return Err(DemuxError::StreamFormat("invalid ADTS sync word".to_string()));
        }

        let mpeg_version = (data[1] >> 3) & 1;
        let protection_absent = data[1] & 1 == 1;
        let profile = (data[2] >> 6) & 3;
        let sample_rate_index = (data[2] >> 2) & 0xf;
        let channel_config = ((data[2] & 1) << 2) | ((data[3] >> 6) & 3);
        let frame_length = (u16::from(data[3] & 3) << 11)
            | (u16::from(data[4]) << 3)
            | (u16::from(data[5]) >> 5);
        let num_raw_data_blocks = data[6] & 3;

        if usize::from(sample_rate_index) >= SAMPLE_RATES.len() {
            return Err(DemuxError::StreamFormat(format!(
                "reserved ADTS sample rate index {sample_rate_index}"
            )));
        }
        let header = Self {
            mpeg_version,
            protection_absent,
            profile,
            sample_rate_index,
            channel_config,
            frame_length,
            num_raw_data_blocks,
        };
        if usize::from(frame_length) <= header.header_len() {
            return Err(DemuxError::StreamFormat(format!(
                "ADTS frame length {frame_length} does not cover its header"
            )));
        }
        Ok(header)
    }

    #[must_use]
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_LEN
        } else {
            ADTS_CRC_HEADER_LEN
        }
    }

    #[must_use]
    pub fn payload_len(&self) -> usize {
        usize::from(self.frame_length) - self.header_len()
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[usize::from(self.sample_rate_index)]
    }

    #[must_use]
    pub fn channels(&self) -> u32 {
        match self.channel_config {
            7 => 8,
            other => u32::from(other),
        }
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        SAMPLES_PER_RAW_BLOCK * (u64::from(self.num_raw_data_blocks) + 1)
    }

    /// Frame duration in 90 kHz ticks, truncated.
    #[must_use]
    pub fn duration_90k(&self) -> u64 {
        self.samples() * PTS_CLOCK_HZ / u64::from(self.sample_rate())
    }
}

fn is_sync(first: u8, second: u8) -> bool {
    // 12-bit sync word followed by layer 00
    first == 0xff && second & 0xf6 == 0xf0
}

/// Offset of the next ADTS sync word or ID3 tag in `data`.
#[must_use]
pub fn find_frame_start(data: &[u8]) -> Option<usize> {
    data.windows(3)
        .position(|window| is_sync(window[0], window[1]) || Id3Header::is_tag_start(window))
        .or_else(|| match data {
            [.., first, second] if is_sync(*first, *second) => Some(data.len() - 2),
            _ => None,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsReaderOptions {
    /// Bytes that may be skipped while hunting for a sync word before the
    /// stream is declared malformed.
    pub max_resync_bytes: usize,
}

impl Default for AdtsReaderOptions {
    fn default() -> Self {
        Self {
            max_resync_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameInfo {
    pts: u64,
    duration: u64,
}

#[derive(Debug, Clone, Copy)]
struct TimingState {
    base_pts: u64,
    summed_samples: u64,
    sample_rate: u32,
}

/// Pulls ADTS frames from a byte stream and stamps them in 90 kHz ticks
/// relative to the last ID3 timestamp seen (0 when none).
#[derive(Debug)]
pub struct AdtsReader<S> {
    stream: S,
    options: AdtsReaderOptions,
    packet: Vec<u8>,
    current: Option<FrameInfo>,
    last_header: Option<AdtsHeader>,
    timing: TimingState,
    /// Whether `timing` describes the stream from its first byte up to the
    /// current position. Cleared by `reset`, restored by a rewind.
    anchored: bool,
}

impl<S: ByteStream> AdtsReader<S> {
    pub fn new(stream: S) -> Self {
        Self::with_options(stream, AdtsReaderOptions::default())
    }

    pub fn with_options(stream: S, options: AdtsReaderOptions) -> Self {
        Self {
            stream,
            options,
            packet: Vec::new(),
            current: None,
            last_header: None,
            timing: TimingState {
                base_pts: 0,
                summed_samples: 0,
                sample_rate: 0,
            },
            anchored: true,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Positions the stream on the next ID3 tag or ADTS sync word without
    /// consuming it. Returns `false` when the stream ends first.
    pub fn sync(&mut self) -> Result<bool> {
        let mut chunk = [0u8; SCAN_CHUNK];
        let mut skipped = 0usize;
        loop {
            let start = self.stream.stream_position()?;
            let len = read_up_to(&mut self.stream, &mut chunk)?;
            if let Some(found) = find_frame_start(&chunk[..len]) {
                self.stream.seek(SeekFrom::Start(start + found as u64))?;
                skipped += found;
                if skipped > 0 {
                    trace!(skipped, "resynchronised ADTS stream");
                }
                return Ok(true);
            }
            if len < chunk.len() {
                return Ok(false);
            }
            // keep a possible split marker for the next chunk
            let consumed = len - 2;
            skipped += consumed;
            if skipped > self.options.max_resync_bytes {
                return Err(DemuxError::StreamFormat(format!(
                    "no ADTS sync word within {skipped} bytes"
                )));
            }
            self.stream.seek(SeekFrom::Start(start + consumed as u64))?;
        }
    }

    /// Reads the next frame. Returns `false` at the end of the stream; a
    /// truncated trailing frame counts as the end.
    pub fn read_packet(&mut self) -> Result<bool> {
        let found = self.next_frame()?;
        if !found {
            self.packet.clear();
            self.current = None;
        }
        Ok(found)
    }

    fn next_frame(&mut self) -> Result<bool> {
        let mut skipped = 0usize;
        loop {
            if !self.sync()? {
                return Ok(false);
            }
            let frame_start = self.stream.stream_position()?;
            let mut header_bytes = [0u8; ID3_HEADER_LEN];
            let len = read_up_to(&mut self.stream, &mut header_bytes)?;

            if Id3Header::is_tag_start(&header_bytes[..len]) {
                if !self.read_id3_tag(&header_bytes[..len], frame_start)? {
                    return Ok(false);
                }
                continue;
            }
            if len < ADTS_HEADER_LEN {
                return Ok(false);
            }

            let header = match AdtsHeader::parse(&header_bytes) {
                Ok(header) => header,
                Err(err) => {
                    skipped += 1;
                    if skipped > self.options.max_resync_bytes {
                        return Err(err);
                    }
                    trace!(offset = frame_start, "skipping false ADTS sync: {err}");
                    self.stream.seek(SeekFrom::Start(frame_start + 1))?;
                    continue;
                }
            };

            self.packet.resize(usize::from(header.frame_length), 0);
            self.stream.seek(SeekFrom::Start(frame_start))?;
            let got = read_up_to(&mut self.stream, &mut self.packet)?;
            if got < self.packet.len() {
                debug!(
                    expected = self.packet.len(),
                    got, "truncated ADTS frame at end of stream"
                );
                return Ok(false);
            }

            self.stamp(header);
            return Ok(true);
        }
    }

    fn read_id3_tag(&mut self, peeked: &[u8], tag_start: u64) -> Result<bool> {
        let Some(tag) = Id3Header::parse(peeked) else {
            if peeked.len() < ID3_HEADER_LEN {
                return Ok(false);
            }
            // "ID3" inside garbage: step over it
            self.stream.seek(SeekFrom::Start(tag_start + 1))?;
            return Ok(true);
        };
        self.stream
            .seek(SeekFrom::Start(tag_start + ID3_HEADER_LEN as u64))?;
        // the declared size is untrusted, only buffer what the stream holds
        let mut body = Vec::new();
        self.stream
            .by_ref()
            .take(tag.body_len as u64)
            .read_to_end(&mut body)?;
        if body.len() < tag.body_len {
            debug!(
                declared = tag.body_len,
                got = body.len(),
                "truncated ID3 tag at end of stream"
            );
            return Ok(false);
        }
        if let Some(pts) = id3::transport_stream_timestamp(&tag, &body) {
            debug!(pts, "ID3 transport stream timestamp");
            self.timing.base_pts = pts;
            self.timing.summed_samples = 0;
        }
        Ok(true)
    }

    fn stamp(&mut self, header: AdtsHeader) {
        let sample_rate = header.sample_rate();
        if self.timing.sample_rate != sample_rate {
            // offsets are only meaningful within one rate
            if self.timing.sample_rate != 0 && self.timing.summed_samples != 0 {
                self.timing.base_pts += self.offset_90k();
                self.timing.summed_samples = 0;
            }
            self.timing.sample_rate = sample_rate;
        }
        let pts = self.next_pts();
        self.timing.summed_samples += header.samples();
        self.current = Some(FrameInfo {
            pts,
            duration: header.duration_90k(),
        });
        self.last_header = Some(header);
    }

    /// Start time of the frame the next read returns, in 90 kHz ticks.
    fn next_pts(&self) -> u64 {
        self.timing.base_pts + self.offset_90k()
    }

    fn offset_90k(&self) -> u64 {
        if self.timing.sample_rate == 0 {
            return 0;
        }
        self.timing.summed_samples * PTS_CLOCK_HZ / u64::from(self.timing.sample_rate)
    }

    /// Whole ADTS frame (header included) of the last successful read.
    #[must_use]
    pub fn packet_data(&self) -> &[u8] {
        match self.current {
            Some(_) => &self.packet,
            None => &[],
        }
    }

    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_data().len()
    }

    /// PTS of the current frame in 90 kHz ticks.
    #[must_use]
    pub fn pts(&self) -> Option<u64> {
        self.current.map(|frame| frame.pts)
    }

    /// Duration of the current frame in 90 kHz ticks.
    #[must_use]
    pub fn duration(&self) -> u64 {
        self.current.map_or(0, |frame| frame.duration)
    }

    /// Header of the most recent frame, kept across resets.
    #[must_use]
    pub fn last_header(&self) -> Option<&AdtsHeader> {
        self.last_header.as_ref()
    }

    /// Drops the current frame and the timing state. The stream position is
    /// left alone, so timestamps restart at 0 from wherever it points.
    pub fn reset(&mut self) {
        self.packet.clear();
        self.current = None;
        self.timing = TimingState {
            base_pts: 0,
            summed_samples: 0,
            sample_rate: 0,
        };
        self.anchored = false;
    }

    /// Positions the reader so that the next [`AdtsReader::read_packet`]
    /// returns the frame containing `target` (`preceding`) or the first frame
    /// starting at or after it. Returns `false` when no such frame exists.
    ///
    /// Targets behind the read position, and any seek after a `reset`,
    /// rescan from the first byte of the stream.
    pub fn seek_time(&mut self, target: u64, preceding: bool) -> Result<bool> {
        if !self.anchored || target < self.next_pts() {
            debug!(target, "rewinding ADTS stream for seek");
            self.stream.seek(SeekFrom::Start(0))?;
            self.reset();
            self.anchored = true;
        }

        loop {
            let position = self.stream.stream_position()?;
            let timing = self.timing;
            if !self.read_packet()? {
                return Ok(false);
            }
            let Some(frame) = self.current else {
                return Ok(false);
            };
            let hit = if preceding {
                frame.pts + frame.duration > target
            } else {
                frame.pts >= target
            };
            if hit {
                self.stream.seek(SeekFrom::Start(position))?;
                self.timing = timing;
                self.packet.clear();
                self.current = None;
                return Ok(true);
            }
        }
    }
}
