use tracing::{debug, warn};

use crate::{DemuxError, NaluLengthSize, Result, description::ParameterSetArray};

pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Rewrites every NAL unit of every parameter-set array, in record order, as
/// `00 00 00 01 <nalu>` into `extra_data`.
///
/// An empty array list is refused and `extra_data` is left untouched.
pub fn parameter_sets_to_annexb(
    sequences: &[ParameterSetArray],
    extra_data: &mut Vec<u8>,
) -> Result<usize> {
    if sequences.is_empty() {
        warn!("no parameter set arrays available for codec extradata");
        return Err(DemuxError::EmptyConfiguration);
    }
    let written = write_annexb(
        sequences
            .iter()
            .flat_map(|sequence| sequence.nalus.iter().map(Vec::as_slice)),
        extra_data,
    );
    debug!(bytes = written, "converted codec extradata to annex-b");
    Ok(written)
}

/// Replaces `out` with the Annex-B form of `nalus`. The destination is sized
/// once from a first pass over the units.
pub fn write_annexb<'a, I>(nalus: I, out: &mut Vec<u8>) -> usize
where
    I: Iterator<Item = &'a [u8]> + Clone,
{
    let size = annexb_size(nalus.clone());
    out.clear();
    out.resize(size, 0);

    let mut cursor = 0usize;
    for nal in nalus {
        let payload_start = cursor + START_CODE.len();
        out[cursor..payload_start].copy_from_slice(&START_CODE);
        out[payload_start..payload_start + nal.len()].copy_from_slice(nal);
        cursor = payload_start + nal.len();
    }
    debug_assert_eq!(cursor, out.len());
    size
}

#[must_use]
pub fn annexb_size<'a>(nalus: impl Iterator<Item = &'a [u8]>) -> usize {
    nalus.map(|nal| nal.len() + START_CODE.len()).sum()
}

/// Converts one length-prefixed access unit (`hvcC`/`avcC` sample layout) to
/// Annex-B using the configured length field width.
pub fn length_prefixed_to_annexb(sample: &[u8], length_size: NaluLengthSize) -> Result<Vec<u8>> {
    let width = length_size.bytes();
    let mut out = Vec::with_capacity(sample.len() + sample.len() / 8);
    let mut payload = sample;
    while payload.len() >= width {
        let nal_len = payload[..width]
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
        payload = &payload[width..];
        if nal_len == 0 || payload.len() < nal_len {
            return Err(DemuxError::InvalidBitstream(format!(
                "NAL unit length {nal_len} exceeds remaining {} bytes",
                payload.len()
            )));
        }
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(&payload[..nal_len]);
        payload = &payload[nal_len..];
    }
    if !payload.is_empty() {
        return Err(DemuxError::InvalidBitstream(
            "trailing bytes after length-prefixed sample parse".to_string(),
        ));
    }
    Ok(out)
}

/// Splits an Annex-B buffer into NAL unit payloads. Both 3- and 4-byte start
/// codes are recognised; bytes ahead of the first start code are dropped.
#[must_use]
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let start_codes = find_start_codes(data);
    let mut out = Vec::with_capacity(start_codes.len());
    for (index, &(start, start_len)) in start_codes.iter().enumerate() {
        let payload_start = start + start_len;
        let end = start_codes
            .get(index + 1)
            .map_or(data.len(), |&(next, _)| next);
        if end > payload_start {
            out.push(&data[payload_start..end]);
        }
    }
    out
}

fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 3 <= data.len() {
        if i + 4 <= data.len() && data[i..i + 4] == START_CODE {
            out.push((i, 4));
            i += 4;
            continue;
        }
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            out.push((i, 3));
            i += 3;
            continue;
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrays(groups: Vec<Vec<Vec<u8>>>) -> Vec<ParameterSetArray> {
        groups
            .into_iter()
            .enumerate()
            .map(|(index, nalus)| ParameterSetArray::new(32 + index as u8, nalus))
            .collect()
    }

    #[test]
    fn two_nalus_become_twenty_three_bytes() {
        let first = [0x40u8, 0x01, 0x0c, 0x01, 0xff];
        let second = [0x42u8, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90];
        let sequences = arrays(vec![vec![first.to_vec(), second.to_vec()]]);
        let mut out = Vec::new();

        let written = parameter_sets_to_annexb(&sequences, &mut out).unwrap();

        assert_eq!(written, 23);
        assert_eq!(out.len(), 23);
        assert_eq!(out[0..4], START_CODE);
        assert_eq!(out[4..9], first);
        assert_eq!(out[9..13], START_CODE);
        assert_eq!(out[13..], second);
    }

    #[test]
    fn empty_configuration_keeps_previous_buffer() {
        let mut out = vec![0xaa, 0xbb];
        let result = parameter_sets_to_annexb(&[], &mut out);
        assert!(matches!(result, Err(DemuxError::EmptyConfiguration)));
        assert_eq!(out, vec![0xaa, 0xbb]);
    }

    #[test]
    fn conversion_is_repeatable() {
        let sequences = arrays(vec![
            vec![vec![0x40, 0x01]],
            vec![vec![0x42, 0x01, 0x02]],
            vec![vec![0x44]],
        ]);
        let mut first = Vec::new();
        let mut second = vec![9; 64];
        parameter_sets_to_annexb(&sequences, &mut first).unwrap();
        parameter_sets_to_annexb(&sequences, &mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), (2 + 4) + (3 + 4) + (1 + 4));
    }

    #[test]
    fn emulation_prevention_bytes_are_copied_verbatim() {
        let nal = [0x42u8, 0x00, 0x00, 0x03, 0x01];
        let sequences = arrays(vec![vec![nal.to_vec()]]);
        let mut out = Vec::new();
        parameter_sets_to_annexb(&sequences, &mut out).unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 0x42, 0x00, 0x00, 0x03, 0x01]);
    }

    #[test]
    fn length_prefixed_sample_uses_configured_width() {
        let two_byte = [0x00, 0x02, 0x26, 0x01, 0x00, 0x01, 0xaf];
        assert_eq!(
            length_prefixed_to_annexb(&two_byte, NaluLengthSize::Two).unwrap(),
            vec![0, 0, 0, 1, 0x26, 0x01, 0, 0, 0, 1, 0xaf]
        );
        let one_byte = [0x01, 0x65, 0x02, 0x41, 0x9a];
        assert_eq!(
            length_prefixed_to_annexb(&one_byte, NaluLengthSize::One).unwrap(),
            vec![0, 0, 0, 1, 0x65, 0, 0, 0, 1, 0x41, 0x9a]
        );
    }

    #[test]
    fn length_prefixed_sample_rejects_overrun_and_trailing_bytes() {
        let overrun = [0, 0, 0, 9, 0x26, 0x01];
        assert!(matches!(
            length_prefixed_to_annexb(&overrun, NaluLengthSize::Four),
            Err(DemuxError::InvalidBitstream(_))
        ));
        let trailing = [0, 0, 0, 1, 0x26, 0x00, 0x00];
        assert!(matches!(
            length_prefixed_to_annexb(&trailing, NaluLengthSize::Four),
            Err(DemuxError::InvalidBitstream(_))
        ));
    }

    #[test]
    fn split_handles_short_and_long_start_codes() {
        let data = [0xff, 0, 0, 0, 1, 0x40, 0x01, 0, 0, 1, 0x42, 0, 0, 0, 1, 0x44];
        let nalus = split_annexb(&data);
        assert_eq!(nalus, vec![&[0x40, 0x01][..], &[0x42][..], &[0x44][..]]);
    }
}
