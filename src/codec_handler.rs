use std::borrow::Cow;

use tracing::warn;

use crate::{
    Codec, DemuxError, NaluLengthSize, Result, SampleFormat, StreamInfo,
    annexb::{length_prefixed_to_annexb, parameter_sets_to_annexb, write_annexb},
    description::SampleDescription,
    make_fourcc,
};

/// Fixed-point scale for the frame-rate hints of a decoder configuration
/// record (frames per 256 seconds).
pub const FRAME_RATE_SCALE: u32 = 256;

pub trait CodecHandler {
    fn codec(&self) -> Option<Codec>;

    /// Current extradata: the raw configuration record until
    /// [`CodecHandler::extra_data_to_annexb`] succeeds, Annex-B afterwards.
    fn extra_data(&self) -> &[u8];

    /// Rewrites the extradata into start-code form. On failure the previous
    /// extradata stays in place.
    fn extra_data_to_annexb(&mut self) -> Result<()>;

    /// Copies derived metadata into `info`; returns whether any field changed.
    fn get_information(&self, info: &mut StreamInfo) -> bool;

    fn nalu_length_size(&self) -> Option<NaluLengthSize> {
        None
    }

    /// Converts one sample to Annex-B when the codec stores length-prefixed
    /// NAL units; other codecs get their sample back untouched.
    fn sample_to_annexb<'s>(&self, sample: &'s [u8]) -> Result<Cow<'s, [u8]>> {
        match self.nalu_length_size() {
            Some(length_size) => length_prefixed_to_annexb(sample, length_size).map(Cow::Owned),
            None => Ok(Cow::Borrowed(sample)),
        }
    }
}

/// Picks the handler matching the description's codec family.
#[must_use]
pub fn create_codec_handler(description: &SampleDescription) -> Box<dyn CodecHandler + '_> {
    match description {
        SampleDescription::Hevc(_) => Box::new(HevcCodecHandler::new(description)),
        SampleDescription::Avc(_) => Box::new(AvcCodecHandler::new(description)),
        SampleDescription::Other { .. } => Box::new(PassthroughCodecHandler::new(description)),
    }
}

#[derive(Debug)]
pub struct HevcCodecHandler<'a> {
    description: &'a SampleDescription,
    extra_data: Vec<u8>,
    nalu_length_size: Option<NaluLengthSize>,
}

impl<'a> HevcCodecHandler<'a> {
    /// A non-HEVC description yields a handler with empty extradata.
    #[must_use]
    pub fn new(description: &'a SampleDescription) -> Self {
        let (extra_data, nalu_length_size) = match description.as_hevc() {
            Some(hevc) => (hevc.raw_bytes().to_vec(), Some(hevc.nalu_length_size())),
            None => (Vec::new(), None),
        };
        Self {
            description,
            extra_data,
            nalu_length_size,
        }
    }
}

impl CodecHandler for HevcCodecHandler<'_> {
    fn codec(&self) -> Option<Codec> {
        Some(Codec::Hevc)
    }

    fn extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    fn extra_data_to_annexb(&mut self) -> Result<()> {
        let Some(hevc) = self.description.as_hevc() else {
            warn!(
                format = %self.description.format(),
                "no HEVC sample description, annex-b extradata not available"
            );
            return Err(DemuxError::UnsupportedVariant {
                expected: Codec::Hevc,
                format: self.description.format(),
            });
        };
        parameter_sets_to_annexb(hevc.sequences(), &mut self.extra_data).map(|_| ())
    }

    fn get_information(&self, info: &mut StreamInfo) -> bool {
        let mut changed = info.update_codec_name(Codec::Hevc.display_name());

        if let Some(fourcc) = hevc_fourcc(self.description.format()) {
            changed |= info.update_codec_fourcc(fourcc);
        }

        if info.fps_rate == 0 {
            if let Some(hevc) = self.description.as_hevc() {
                let rate = if hevc.average_frame_rate() > 0 {
                    u32::from(hevc.average_frame_rate())
                } else {
                    u32::from(hevc.constant_frame_rate())
                };
                if rate > 0 {
                    info.fps_rate = rate;
                    info.fps_scale = FRAME_RATE_SCALE;
                    changed = true;
                }
            }
        }
        changed
    }

    fn nalu_length_size(&self) -> Option<NaluLengthSize> {
        self.nalu_length_size
    }
}

fn hevc_fourcc(format: SampleFormat) -> Option<u32> {
    match format {
        SampleFormat::Hev1 => Some(make_fourcc(b"hev1")),
        SampleFormat::Hvc1 => Some(make_fourcc(b"hvc1")),
        SampleFormat::Dvhe => Some(make_fourcc(b"dvhe")),
        SampleFormat::Dvh1 => Some(make_fourcc(b"dvh1")),
        _ => None,
    }
}

#[derive(Debug)]
pub struct AvcCodecHandler<'a> {
    description: &'a SampleDescription,
    extra_data: Vec<u8>,
    nalu_length_size: Option<NaluLengthSize>,
}

impl<'a> AvcCodecHandler<'a> {
    #[must_use]
    pub fn new(description: &'a SampleDescription) -> Self {
        let (extra_data, nalu_length_size) = match description.as_avc() {
            Some(avc) => (avc.raw_bytes().to_vec(), Some(avc.nalu_length_size())),
            None => (Vec::new(), None),
        };
        Self {
            description,
            extra_data,
            nalu_length_size,
        }
    }
}

impl CodecHandler for AvcCodecHandler<'_> {
    fn codec(&self) -> Option<Codec> {
        Some(Codec::H264)
    }

    fn extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    fn extra_data_to_annexb(&mut self) -> Result<()> {
        let Some(avc) = self.description.as_avc() else {
            warn!(
                format = %self.description.format(),
                "no AVC sample description, annex-b extradata not available"
            );
            return Err(DemuxError::UnsupportedVariant {
                expected: Codec::H264,
                format: self.description.format(),
            });
        };
        if avc.sequence_parameters().is_empty() && avc.picture_parameters().is_empty() {
            warn!("no parameter sets available for AVC codec extradata");
            return Err(DemuxError::EmptyConfiguration);
        }
        let nalus = avc
            .sequence_parameters()
            .iter()
            .chain(avc.picture_parameters())
            .map(Vec::as_slice);
        write_annexb(nalus, &mut self.extra_data);
        Ok(())
    }

    fn get_information(&self, info: &mut StreamInfo) -> bool {
        let mut changed = info.update_codec_name(Codec::H264.display_name());
        if let Some(fourcc) = avc_fourcc(self.description.format()) {
            changed |= info.update_codec_fourcc(fourcc);
        }
        changed
    }

    fn nalu_length_size(&self) -> Option<NaluLengthSize> {
        self.nalu_length_size
    }
}

fn avc_fourcc(format: SampleFormat) -> Option<u32> {
    match format {
        SampleFormat::Avc1 => Some(make_fourcc(b"avc1")),
        SampleFormat::Avc2 => Some(make_fourcc(b"avc2")),
        SampleFormat::Avc3 => Some(make_fourcc(b"avc3")),
        SampleFormat::Avc4 => Some(make_fourcc(b"avc4")),
        SampleFormat::Dva1 => Some(make_fourcc(b"dva1")),
        SampleFormat::Dvav => Some(make_fourcc(b"dvav")),
        _ => None,
    }
}

/// Handler for sample entries without codec-specific treatment: the raw
/// configuration record is passed through as extradata.
#[derive(Debug)]
pub struct PassthroughCodecHandler<'a> {
    description: &'a SampleDescription,
    extra_data: Vec<u8>,
}

impl<'a> PassthroughCodecHandler<'a> {
    #[must_use]
    pub fn new(description: &'a SampleDescription) -> Self {
        Self {
            description,
            extra_data: description.raw_bytes().to_vec(),
        }
    }
}

impl CodecHandler for PassthroughCodecHandler<'_> {
    fn codec(&self) -> Option<Codec> {
        self.description.codec()
    }

    fn extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    fn extra_data_to_annexb(&mut self) -> Result<()> {
        Err(DemuxError::NotApplicable(self.description.format()))
    }

    fn get_information(&self, info: &mut StreamInfo) -> bool {
        match self.description.codec() {
            Some(codec) => info.update_codec_name(codec.display_name()),
            None => false,
        }
    }
}
