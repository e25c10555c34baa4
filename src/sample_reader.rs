use crate::{
    Codec, Result, StreamInfo,
    adts::{AdtsReader, AdtsReaderOptions, PTS_CLOCK_HZ},
    stream::ByteStream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Sample,
    EndOfStream,
}

/// One access unit, borrowed from the reader that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample<'a> {
    pub data: &'a [u8],
    pub pts: u64,
    pub dts: u64,
    pub stream_id: u32,
    pub encrypted: bool,
}

/// Converts native 90 kHz ticks to the reader output unit (microseconds).
/// Truncates.
#[must_use]
pub const fn rescale_90k(ticks: u64) -> u64 {
    ticks * 100 / 9
}

/// Inverse of [`rescale_90k`], rounding up so that `to_90k(rescale_90k(t))`
/// is `t` again. Defined for every `u64`.
#[must_use]
pub const fn to_90k(value: u64) -> u64 {
    // u64::MAX * 9 / 100 still fits the result
    (value as u128 * 9).div_ceil(100) as u64
}

pub trait SampleReader {
    fn is_started(&self) -> bool;
    fn eos(&self) -> bool;
    fn dts(&self) -> u64;
    fn pts(&self) -> u64;

    /// Locates the first frame. Returns whether the reader is started;
    /// format errors leave the started state untouched.
    fn start(&mut self) -> Result<bool>;

    fn read_sample(&mut self) -> Result<ReadOutcome>;

    /// Drops in-flight state. The reader is not started afterwards and its
    /// EOS flag becomes `eos`.
    fn reset(&mut self, eos: bool);

    fn get_information(&self, info: &mut StreamInfo) -> bool;

    /// Moves to the sample at or around `pts` and reads it.
    fn time_seek(&mut self, pts: u64, preceding: bool) -> Result<bool>;

    /// Bias consumed by the next successful read to compute
    /// [`SampleReader::pts_diff`]. `None` clears it.
    fn set_pts_offset(&mut self, offset: Option<u64>);
    fn start_pts(&self) -> Option<u64>;
    fn set_start_pts(&mut self, pts: Option<u64>);
    fn pts_diff(&self) -> i64;
    fn time_scale(&self) -> u32;
    fn stream_id(&self) -> u32;
    fn sample_data(&self) -> &[u8];
    fn duration(&self) -> u64;
    fn is_encrypted(&self) -> bool;

    fn sample_data_size(&self) -> usize {
        self.sample_data().len()
    }

    /// View of the last sample read; the borrow ends before the next
    /// mutating call.
    fn sample(&self) -> Option<Sample<'_>> {
        let data = self.sample_data();
        if data.is_empty() {
            return None;
        }
        Some(Sample {
            data,
            pts: self.pts(),
            dts: self.dts(),
            stream_id: self.stream_id(),
            encrypted: self.is_encrypted(),
        })
    }
}

/// Reader for raw ADTS AAC streams (e.g. HLS packed audio segments).
#[derive(Debug)]
pub struct AdtsSampleReader<S> {
    parser: AdtsReader<S>,
    stream_id: u32,
    started: bool,
    eos: bool,
    pts: u64,
    duration: u64,
    pts_diff: i64,
    pts_offset: Option<u64>,
    start_pts: Option<u64>,
}

impl<S: ByteStream> AdtsSampleReader<S> {
    pub fn new(stream: S, stream_id: u32) -> Self {
        Self::with_options(stream, stream_id, AdtsReaderOptions::default())
    }

    pub fn with_options(stream: S, stream_id: u32, options: AdtsReaderOptions) -> Self {
        Self {
            parser: AdtsReader::with_options(stream, options),
            stream_id,
            started: false,
            eos: false,
            pts: 0,
            duration: 0,
            pts_diff: 0,
            pts_offset: None,
            start_pts: None,
        }
    }

    fn mark_exhausted(&mut self) {
        if !self.parser.stream().waiting_for_segment() {
            self.eos = true;
        }
    }
}

impl<S: ByteStream> SampleReader for AdtsSampleReader<S> {
    fn is_started(&self) -> bool {
        self.started
    }

    fn eos(&self) -> bool {
        self.eos
    }

    fn dts(&self) -> u64 {
        self.pts
    }

    fn pts(&self) -> u64 {
        self.pts
    }

    fn start(&mut self) -> Result<bool> {
        if self.started {
            return Ok(true);
        }
        if !self.parser.sync()? {
            self.mark_exhausted();
            return Ok(false);
        }
        self.started = true;
        self.eos = false;
        Ok(true)
    }

    fn read_sample(&mut self) -> Result<ReadOutcome> {
        if !self.parser.read_packet()? {
            self.mark_exhausted();
            return Ok(ReadOutcome::EndOfStream);
        }
        self.pts = rescale_90k(self.parser.pts().unwrap_or_default());
        self.duration = rescale_90k(self.parser.duration());
        if let Some(offset) = self.pts_offset.take() {
            self.pts_diff = self.pts.wrapping_sub(offset) as i64;
        }
        Ok(ReadOutcome::Sample)
    }

    fn reset(&mut self, eos: bool) {
        self.parser.reset();
        self.started = false;
        self.eos = eos;
    }

    fn get_information(&self, info: &mut StreamInfo) -> bool {
        let Some(header) = self.parser.last_header() else {
            return false;
        };
        let mut changed = info.update_codec_name(Codec::Aac.display_name());
        changed |= info.update_sample_rate(header.sample_rate());
        changed |= info.update_channels(header.channels());
        changed
    }

    fn time_seek(&mut self, pts: u64, preceding: bool) -> Result<bool> {
        if !self.parser.seek_time(to_90k(pts), preceding)? {
            return Ok(false);
        }
        self.started = true;
        self.eos = false;
        Ok(self.read_sample()? == ReadOutcome::Sample)
    }

    fn set_pts_offset(&mut self, offset: Option<u64>) {
        self.pts_offset = offset;
    }

    fn start_pts(&self) -> Option<u64> {
        self.start_pts
    }

    fn set_start_pts(&mut self, pts: Option<u64>) {
        self.start_pts = pts;
    }

    fn pts_diff(&self) -> i64 {
        self.pts_diff
    }

    fn time_scale(&self) -> u32 {
        PTS_CLOCK_HZ as u32
    }

    fn stream_id(&self) -> u32 {
        self.stream_id
    }

    fn sample_data(&self) -> &[u8] {
        self.parser.packet_data()
    }

    fn duration(&self) -> u64 {
        self.duration
    }

    fn is_encrypted(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{DemuxError, adts::tests::adts_stream};

    fn reader(frames: usize) -> AdtsSampleReader<Cursor<Vec<u8>>> {
        AdtsSampleReader::new(Cursor::new(adts_stream(frames, 3)), 7)
    }

    #[test]
    fn rescale_truncates() {
        assert_eq!(rescale_90k(9), 100);
        assert_eq!(rescale_90k(18), 200);
        assert_eq!(rescale_90k(1), 11);
        assert_eq!(to_90k(100), 9);
        assert_eq!(to_90k(rescale_90k(1920)), 1920);
        assert_eq!(to_90k(u64::MAX), 1_660_206_966_633_859_646);
    }

    #[test]
    fn start_is_idempotent() {
        let mut reader = reader(2);
        assert!(reader.start().unwrap());
        assert!(reader.start().unwrap());
        assert!(reader.is_started());
        assert_eq!(reader.read_sample().unwrap(), ReadOutcome::Sample);
        assert_eq!(reader.pts(), 0);
    }

    #[test]
    fn start_on_garbage_fails_without_starting() {
        let mut reader = AdtsSampleReader::with_options(
            Cursor::new(vec![0u8; 20_000]),
            1,
            AdtsReaderOptions {
                max_resync_bytes: 4096,
            },
        );
        assert!(matches!(reader.start(), Err(DemuxError::StreamFormat(_))));
        assert!(!reader.is_started());
        assert!(!reader.eos());
    }

    #[test]
    fn empty_stream_reports_end_without_starting() {
        let mut reader = AdtsSampleReader::new(Cursor::new(Vec::new()), 1);
        assert!(!reader.start().unwrap());
        assert!(!reader.is_started());
        assert!(reader.eos());
    }

    #[test]
    fn reads_until_end_of_stream() {
        let mut reader = reader(3);
        reader.start().unwrap();
        let mut stamps = Vec::new();
        while reader.read_sample().unwrap() == ReadOutcome::Sample {
            let sample = reader.sample().unwrap();
            assert_eq!(sample.pts, sample.dts);
            assert_eq!(sample.stream_id, 7);
            assert!(!sample.encrypted);
            stamps.push(sample.pts);
        }
        // 1920 ticks at 90 kHz per 48 kHz frame
        assert_eq!(stamps, vec![0, 21_333, 42_666]);
        assert!(reader.eos());
        assert!(reader.sample().is_none());
        assert_eq!(reader.sample_data_size(), 0);
    }

    #[test]
    fn pts_offset_is_consumed_by_next_read() {
        let mut reader = reader(3);
        reader.start().unwrap();
        reader.read_sample().unwrap();
        reader.set_pts_offset(Some(50_000));
        reader.read_sample().unwrap();
        assert_eq!(reader.pts_diff(), 21_333 - 50_000);
        reader.read_sample().unwrap();
        assert_eq!(reader.pts_diff(), 21_333 - 50_000);
    }

    #[test]
    fn start_pts_is_stored_verbatim() {
        let mut reader = reader(1);
        assert_eq!(reader.start_pts(), None);
        reader.set_start_pts(Some(123));
        assert_eq!(reader.start_pts(), Some(123));
        reader.set_start_pts(None);
        assert_eq!(reader.start_pts(), None);
    }

    #[test]
    fn reports_audio_information_after_first_frame() {
        let mut reader = reader(2);
        let mut info = StreamInfo::default();
        assert!(!reader.get_information(&mut info));
        reader.start().unwrap();
        reader.read_sample().unwrap();
        assert!(reader.get_information(&mut info));
        assert_eq!(info.codec_name, "aac");
        assert_eq!(info.sample_rate, 48_000);
        assert_eq!(info.channels, 2);
        assert!(!reader.get_information(&mut info));
    }

    #[test]
    fn time_seek_reads_target_sample() {
        let mut reader = reader(10);
        reader.start().unwrap();
        // 4 frames in: 4 * 1920 ticks
        assert!(reader.time_seek(rescale_90k(4 * 1920) + 5, true).unwrap());
        assert_eq!(reader.pts(), rescale_90k(4 * 1920));
        assert!(reader.time_seek(rescale_90k(1920), false).unwrap());
        assert_eq!(reader.pts(), rescale_90k(1920));
    }

    #[test]
    fn time_seek_to_a_reported_pts_lands_on_that_sample() {
        let mut reader = reader(10);
        reader.start().unwrap();
        reader.read_sample().unwrap();
        reader.read_sample().unwrap();
        let second = reader.pts();
        for _ in 0..4 {
            reader.read_sample().unwrap();
        }
        assert!(reader.time_seek(second, true).unwrap());
        assert_eq!(reader.pts(), second);
        assert!(reader.time_seek(second, false).unwrap());
        assert_eq!(reader.pts(), second);
    }

    #[test]
    fn time_seek_back_after_end_of_stream() {
        let mut reader = reader(10);
        reader.start().unwrap();
        while reader.read_sample().unwrap() == ReadOutcome::Sample {}
        assert!(reader.eos());

        assert!(reader.time_seek(rescale_90k(2 * 1920), true).unwrap());
        assert_eq!(reader.pts(), rescale_90k(2 * 1920));
        assert!(!reader.eos());
        assert!(reader.is_started());
        assert_eq!(reader.read_sample().unwrap(), ReadOutcome::Sample);
        assert_eq!(reader.pts(), rescale_90k(3 * 1920));
    }

    #[test]
    fn time_seek_after_reset_rebuilds_timing() {
        let mut reader = reader(10);
        reader.start().unwrap();
        for _ in 0..6 {
            reader.read_sample().unwrap();
        }
        reader.reset(false);
        reader.start().unwrap();
        assert!(reader.time_seek(rescale_90k(2 * 1920), true).unwrap());
        assert_eq!(reader.pts(), rescale_90k(2 * 1920));
    }

    #[test]
    fn time_seek_past_the_end_does_not_overflow() {
        let mut reader = reader(3);
        reader.start().unwrap();
        assert!(!reader.time_seek(u64::MAX / 4, false).unwrap());
        assert!(!reader.time_seek(u64::MAX, true).unwrap());
    }

    #[test]
    fn time_scale_is_native_clock() {
        assert_eq!(reader(1).time_scale(), 90_000);
    }
}
