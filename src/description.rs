use crate::{Codec, DemuxError, NaluLengthSize, Result, SampleFormat};

const HVCC_HEADER_LEN: usize = 23;
const AVCC_HEADER_LEN: usize = 6;

/// One array of configuration NAL units sharing a NAL unit type
/// (VPS, SPS, PPS, SEI ...), in record order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSetArray {
    pub array_completeness: bool,
    pub nal_unit_type: u8,
    pub nalus: Vec<Vec<u8>>,
}

impl ParameterSetArray {
    #[must_use]
    pub fn new(nal_unit_type: u8, nalus: Vec<Vec<u8>>) -> Self {
        Self {
            array_completeness: true,
            nal_unit_type,
            nalus,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SampleDescription {
    Hevc(HevcSampleDescription),
    Avc(AvcSampleDescription),
    Other {
        format: SampleFormat,
        raw_bytes: Vec<u8>,
    },
}

impl SampleDescription {
    /// Picks the variant from the sample-entry type and parses the attached
    /// decoder-configuration record when the codec family is known.
    pub fn from_sample_entry(format: SampleFormat, raw_bytes: Vec<u8>) -> Result<Self> {
        match format {
            SampleFormat::Hev1 | SampleFormat::Hvc1 | SampleFormat::Dvhe | SampleFormat::Dvh1 => {
                Ok(Self::Hevc(HevcSampleDescription::parse(format, raw_bytes)?))
            }
            SampleFormat::Avc1
            | SampleFormat::Avc2
            | SampleFormat::Avc3
            | SampleFormat::Avc4
            | SampleFormat::Dva1
            | SampleFormat::Dvav => Ok(Self::Avc(AvcSampleDescription::parse(format, raw_bytes)?)),
            _ => Ok(Self::Other { format, raw_bytes }),
        }
    }

    #[must_use]
    pub fn format(&self) -> SampleFormat {
        match self {
            Self::Hevc(desc) => desc.format,
            Self::Avc(desc) => desc.format,
            Self::Other { format, .. } => *format,
        }
    }

    #[must_use]
    pub fn codec(&self) -> Option<Codec> {
        match self {
            Self::Hevc(_) => Some(Codec::Hevc),
            Self::Avc(_) => Some(Codec::H264),
            Self::Other {
                format: SampleFormat::Mp4a,
                ..
            } => Some(Codec::Aac),
            Self::Other { .. } => None,
        }
    }

    #[must_use]
    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            Self::Hevc(desc) => &desc.raw_bytes,
            Self::Avc(desc) => &desc.raw_bytes,
            Self::Other { raw_bytes, .. } => raw_bytes,
        }
    }

    #[must_use]
    pub fn as_hevc(&self) -> Option<&HevcSampleDescription> {
        match self {
            Self::Hevc(desc) => Some(desc),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_avc(&self) -> Option<&AvcSampleDescription> {
        match self {
            Self::Avc(desc) => Some(desc),
            _ => None,
        }
    }
}

/// `HEVCDecoderConfigurationRecord` (ISO/IEC 14496-15, 8.3.3.1).
#[derive(Debug, Clone)]
pub struct HevcSampleDescription {
    format: SampleFormat,
    raw_bytes: Vec<u8>,
    sequences: Vec<ParameterSetArray>,
    nalu_length_size: NaluLengthSize,
    average_frame_rate: u16,
    constant_frame_rate: u8,
}

impl HevcSampleDescription {
    pub fn parse(format: SampleFormat, raw_bytes: Vec<u8>) -> Result<Self> {
        let mut reader = RecordReader::new(&raw_bytes);
        reader.require(HVCC_HEADER_LEN, "hvcC header")?;
        // profile/tier/level, segmentation, chroma and bit depth fields
        reader.skip(19)?;
        let average_frame_rate = reader.read_u16()?;
        let packed = reader.read_u8()?;
        let constant_frame_rate = packed >> 6;
        let nalu_length_size = NaluLengthSize::try_from((packed & 0x03) + 1)?;

        let array_count = reader.read_u8()?;
        let mut sequences = Vec::with_capacity(usize::from(array_count));
        for _ in 0..array_count {
            let header = reader.read_u8()?;
            let nalu_count = reader.read_u16()?;
            let mut nalus = Vec::with_capacity(usize::from(nalu_count));
            for _ in 0..nalu_count {
                let len = usize::from(reader.read_u16()?);
                nalus.push(reader.read_bytes(len)?.to_vec());
            }
            sequences.push(ParameterSetArray {
                array_completeness: header & 0x80 != 0,
                nal_unit_type: header & 0x3f,
                nalus,
            });
        }

        Ok(Self {
            format,
            raw_bytes,
            sequences,
            nalu_length_size,
            average_frame_rate,
            constant_frame_rate,
        })
    }

    /// Builds a description from fields a container parser already decoded.
    #[must_use]
    pub fn from_parts(
        format: SampleFormat,
        raw_bytes: Vec<u8>,
        sequences: Vec<ParameterSetArray>,
        nalu_length_size: NaluLengthSize,
        average_frame_rate: u16,
        constant_frame_rate: u8,
    ) -> Self {
        Self {
            format,
            raw_bytes,
            sequences,
            nalu_length_size,
            average_frame_rate,
            constant_frame_rate,
        }
    }

    #[must_use]
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    #[must_use]
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    #[must_use]
    pub fn sequences(&self) -> &[ParameterSetArray] {
        &self.sequences
    }

    #[must_use]
    pub fn nalu_length_size(&self) -> NaluLengthSize {
        self.nalu_length_size
    }

    /// Frames per 256 seconds, 0 when unspecified.
    #[must_use]
    pub fn average_frame_rate(&self) -> u16 {
        self.average_frame_rate
    }

    #[must_use]
    pub fn constant_frame_rate(&self) -> u8 {
        self.constant_frame_rate
    }
}

/// `AVCDecoderConfigurationRecord` (ISO/IEC 14496-15, 5.3.3.1).
#[derive(Debug, Clone)]
pub struct AvcSampleDescription {
    format: SampleFormat,
    raw_bytes: Vec<u8>,
    profile: u8,
    level: u8,
    sequence_parameters: Vec<Vec<u8>>,
    picture_parameters: Vec<Vec<u8>>,
    nalu_length_size: NaluLengthSize,
}

impl AvcSampleDescription {
    pub fn parse(format: SampleFormat, raw_bytes: Vec<u8>) -> Result<Self> {
        let mut reader = RecordReader::new(&raw_bytes);
        reader.require(AVCC_HEADER_LEN, "avcC header")?;
        let version = reader.read_u8()?;
        if version != 1 {
            return Err(DemuxError::InvalidConfiguration(format!(
                "unsupported avcC configuration version {version}"
            )));
        }
        let profile = reader.read_u8()?;
        let _compatibility = reader.read_u8()?;
        let level = reader.read_u8()?;
        let nalu_length_size = NaluLengthSize::try_from((reader.read_u8()? & 0x03) + 1)?;

        let sps_count = reader.read_u8()? & 0x1f;
        let sequence_parameters = reader.read_parameter_sets(usize::from(sps_count))?;
        let pps_count = reader.read_u8()?;
        let picture_parameters = reader.read_parameter_sets(usize::from(pps_count))?;

        Ok(Self {
            format,
            raw_bytes,
            profile,
            level,
            sequence_parameters,
            picture_parameters,
            nalu_length_size,
        })
    }

    #[must_use]
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    #[must_use]
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    #[must_use]
    pub fn profile(&self) -> u8 {
        self.profile
    }

    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[must_use]
    pub fn sequence_parameters(&self) -> &[Vec<u8>] {
        &self.sequence_parameters
    }

    #[must_use]
    pub fn picture_parameters(&self) -> &[Vec<u8>] {
        &self.picture_parameters
    }

    #[must_use]
    pub fn nalu_length_size(&self) -> NaluLengthSize {
        self.nalu_length_size
    }
}

struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn require(&self, len: usize, what: &str) -> Result<()> {
        if self.data.len() - self.pos < len {
            return Err(DemuxError::InvalidConfiguration(format!(
                "{what} needs {len} bytes, {} available",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.require(len, "record field")?;
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_parameter_sets(&mut self, count: usize) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let len = usize::from(self.read_u16()?);
            out.push(self.read_bytes(len)?.to_vec());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialises an hvcC record around the given arrays.
    fn hvcc_record(
        arrays: &[(u8, &[&[u8]])],
        average_frame_rate: u16,
        constant_frame_rate: u8,
        length_size: u8,
    ) -> Vec<u8> {
        let mut out = vec![1, 0x01, 0x60, 0, 0, 0, 0x90, 0, 0, 0, 0, 0, 0x5d];
        out.extend_from_slice(&[0xf0, 0x00, 0xfc, 0xfd, 0xf8, 0xf8]);
        out.extend_from_slice(&average_frame_rate.to_be_bytes());
        out.push((constant_frame_rate << 6) | 0x0c | ((length_size - 1) & 0x03));
        out.push(arrays.len() as u8);
        for (nal_type, nalus) in arrays {
            out.push(0x80 | nal_type);
            out.extend_from_slice(&(nalus.len() as u16).to_be_bytes());
            for nal in *nalus {
                out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
                out.extend_from_slice(nal);
            }
        }
        out
    }

    #[test]
    fn parses_hvcc_arrays_in_record_order() {
        let vps: &[u8] = &[0x40, 0x01, 0x0c];
        let sps: &[u8] = &[0x42, 0x01, 0x01, 0x01];
        let pps: &[u8] = &[0x44, 0x01, 0xc1];
        let raw = hvcc_record(&[(32, &[vps]), (33, &[sps]), (34, &[pps])], 7680, 1, 4);

        let desc = HevcSampleDescription::parse(SampleFormat::Hvc1, raw.clone()).unwrap();
        assert_eq!(desc.raw_bytes(), raw.as_slice());
        assert_eq!(desc.average_frame_rate(), 7680);
        assert_eq!(desc.constant_frame_rate(), 1);
        assert_eq!(desc.nalu_length_size(), NaluLengthSize::Four);
        let types: Vec<u8> = desc.sequences().iter().map(|s| s.nal_unit_type).collect();
        assert_eq!(types, vec![32, 33, 34]);
        assert_eq!(desc.sequences()[1].nalus, vec![sps.to_vec()]);
        assert!(desc.sequences()[0].array_completeness);
    }

    #[test]
    fn rejects_truncated_hvcc() {
        let raw = hvcc_record(&[(32, &[&[0x40, 0x01]])], 0, 0, 4);
        let truncated = raw[..raw.len() - 1].to_vec();
        assert!(matches!(
            HevcSampleDescription::parse(SampleFormat::Hev1, truncated),
            Err(DemuxError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_three_byte_length_field() {
        let raw = hvcc_record(&[], 0, 0, 3);
        assert!(HevcSampleDescription::parse(SampleFormat::Hev1, raw).is_err());
    }

    #[test]
    fn parses_avcc_parameter_sets() {
        let raw = vec![
            1, 0x64, 0x00, 0x1f, 0xfd, 0xe1, //
            0x00, 0x04, 0x67, 0x64, 0x00, 0x1f, //
            0x01, //
            0x00, 0x03, 0x68, 0xee, 0x3c,
        ];
        let desc = AvcSampleDescription::parse(SampleFormat::Avc1, raw).unwrap();
        assert_eq!(desc.profile(), 0x64);
        assert_eq!(desc.level(), 0x1f);
        assert_eq!(desc.nalu_length_size(), NaluLengthSize::Two);
        assert_eq!(desc.sequence_parameters(), &[vec![0x67, 0x64, 0x00, 0x1f]]);
        assert_eq!(desc.picture_parameters(), &[vec![0x68, 0xee, 0x3c]]);
    }

    #[test]
    fn unknown_sample_entry_is_kept_opaque() {
        let desc = SampleDescription::from_sample_entry(SampleFormat::Mp4a, vec![0x12, 0x10])
            .unwrap();
        assert_eq!(desc.codec(), Some(Codec::Aac));
        assert!(desc.as_hevc().is_none());
        assert_eq!(desc.raw_bytes(), &[0x12, 0x10]);
    }
}
