//! H.264 and AAC packaging for RTMP.
//!
//! Encoders hand us H.264 in **Annex B** form (start-code separated NAL
//! units). RTMP carries FLV tag bodies, where video is **AVCC** (4-byte
//! length prefixed NAL units) preceded by an AVC decoder configuration
//! record, and AAC is preceded by its AudioSpecificConfig.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// NAL unit types relevant for H.264.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NalUnitType {
    /// Non-IDR slice (P/B frame).
    NonIdrSlice = 1,
    /// IDR slice (keyframe).
    IdrSlice = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    /// Access Unit Delimiter.
    Aud = 9,
    Other = 0,
}

impl From<u8> for NalUnitType {
    fn from(byte: u8) -> Self {
        match byte & 0x1F {
            1 => Self::NonIdrSlice,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            _ => Self::Other,
        }
    }
}

/// A single NAL unit, without its start code.
#[derive(Debug, Clone)]
pub struct NalUnit {
    pub nal_type: NalUnitType,
    /// Header byte included.
    pub data: Bytes,
}

/// Returns the offset and length of the next start code at or after `from`.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, 3));
            }
            if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Split an Annex B byte stream into NAL units.
pub fn parse_annex_b(data: &[u8]) -> Vec<NalUnit> {
    let mut nals = Vec::new();
    let mut next = find_start_code(data, 0);

    while let Some((pos, len)) = next {
        let start = pos + len;
        next = find_start_code(data, start);
        let end = next.map_or(data.len(), |(p, _)| p);

        if start < end {
            let nal = &data[start..end];
            nals.push(NalUnit {
                nal_type: NalUnitType::from(nal[0]),
                data: Bytes::copy_from_slice(nal),
            });
        }
    }

    nals
}

/// Concatenate NAL units with 4-byte big-endian length prefixes.
pub fn nals_to_avcc(nals: &[NalUnit]) -> Bytes {
    let mut buf = BytesMut::with_capacity(nals.iter().map(|n| n.data.len() + 4).sum());
    for nal in nals {
        buf.put_u32(nal.data.len() as u32);
        buf.put_slice(&nal.data);
    }
    buf.freeze()
}

/// Find the last SPS and PPS among `nals`.
pub fn extract_sps_pps(nals: &[NalUnit]) -> Option<(Bytes, Bytes)> {
    let sps = nals.iter().rev().find(|n| n.nal_type == NalUnitType::Sps)?;
    let pps = nals.iter().rev().find(|n| n.nal_type == NalUnitType::Pps)?;
    Some((sps.data.clone(), pps.data.clone()))
}

/// Drop SPS, PPS and AUD units; they travel in the sequence header.
pub fn filter_parameter_sets(nals: Vec<NalUnit>) -> Vec<NalUnit> {
    nals.into_iter()
        .filter(|nal| {
            !matches!(
                nal.nal_type,
                NalUnitType::Sps | NalUnitType::Pps | NalUnitType::Aud
            )
        })
        .collect()
}

/// Build an AVC decoder configuration record (ISO 14496-15) from one SPS
/// and one PPS. Returns `None` for an SPS too short to carry profile/level.
pub fn build_avc_decoder_config(sps: &[u8], pps: &[u8]) -> Option<Bytes> {
    if sps.len() < 4 {
        trace!(len = sps.len(), "SPS too short");
        return None;
    }

    let mut buf = BytesMut::with_capacity(11 + sps.len() + pps.len());
    buf.put_u8(0x01); // configurationVersion
    buf.put_u8(sps[1]); // profile_idc
    buf.put_u8(sps[2]); // constraint flags
    buf.put_u8(sps[3]); // level_idc
    buf.put_u8(0xFF); // 4-byte NAL lengths
    buf.put_u8(0xE1); // one SPS
    buf.put_u16(sps.len() as u16);
    buf.put_slice(sps);
    buf.put_u8(0x01); // one PPS
    buf.put_u16(pps.len() as u16);
    buf.put_slice(pps);

    Some(buf.freeze())
}

/// Build an FLV video tag body for H.264.
///
/// First byte is frame type (1 = key, 2 = inter) and codec id 7 (AVC),
/// then the AVC packet type (0 = sequence header, 1 = NALU) and a 24-bit
/// composition time offset.
pub fn build_flv_video_tag(
    data: &[u8],
    is_keyframe: bool,
    is_sequence_header: bool,
    composition_time: i32,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + data.len());

    let frame_type = if is_keyframe { 0x10 } else { 0x20 };
    buf.put_u8(frame_type | 0x07);
    buf.put_u8(if is_sequence_header { 0x00 } else { 0x01 });

    let ct = composition_time as u32;
    buf.put_u8((ct >> 16) as u8);
    buf.put_u8((ct >> 8) as u8);
    buf.put_u8(ct as u8);

    buf.put_slice(data);
    buf.freeze()
}

/// Build an FLV audio tag body for AAC.
///
/// `0xAF` = AAC, 44 kHz, 16-bit, stereo (FLV requires these fixed flags for
/// AAC); then the AAC packet type (0 = AudioSpecificConfig, 1 = raw).
pub fn build_aac_tag(data: &[u8], is_sequence_header: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + data.len());
    buf.put_u8(0xAF);
    buf.put_u8(if is_sequence_header { 0x00 } else { 0x01 });
    buf.put_slice(data);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 4] = [0x67, 0x42, 0x00, 0x1E];
    const PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

    #[test]
    fn test_parse_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, // SPS, 4-byte start
            0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80, // PPS, 3-byte start
            0x00, 0x00, 0x01, 0x65, 0x88, 0x84, // IDR
        ];
        let nals = parse_annex_b(&data);
        assert_eq!(nals.len(), 3);
        assert_eq!(nals[0].nal_type, NalUnitType::Sps);
        assert_eq!(nals[1].nal_type, NalUnitType::Pps);
        assert_eq!(nals[2].nal_type, NalUnitType::IdrSlice);
        assert_eq!(nals[2].data.as_ref(), &[0x65, 0x88, 0x84]);
    }

    #[test]
    fn test_parse_without_start_code_is_empty() {
        assert!(parse_annex_b(&[0x65, 0x88, 0x84]).is_empty());
        assert!(parse_annex_b(&[]).is_empty());
    }

    #[test]
    fn test_extract_and_filter_parameter_sets() {
        let mut data = vec![0x00, 0x00, 0x00, 0x01];
        data.extend_from_slice(&SPS);
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        data.extend_from_slice(&PPS);
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x01]);

        let nals = parse_annex_b(&data);
        let (sps, pps) = extract_sps_pps(&nals).unwrap();
        assert_eq!(sps.as_ref(), &SPS);
        assert_eq!(pps.as_ref(), &PPS);

        let slices = filter_parameter_sets(nals);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].nal_type, NalUnitType::IdrSlice);
        assert_eq!(nals_to_avcc(&slices).as_ref(), &[0, 0, 0, 2, 0x65, 0x01]);
    }

    #[test]
    fn test_decoder_config_layout() {
        let config = build_avc_decoder_config(&SPS, &PPS).unwrap();
        assert_eq!(&config[..6], &[0x01, 0x42, 0x00, 0x1E, 0xFF, 0xE1]);
        assert_eq!(&config[6..8], &[0x00, 0x04]);
        assert_eq!(config[12], 0x01);
        assert_eq!(config.len(), 11 + SPS.len() + PPS.len());

        assert!(build_avc_decoder_config(&[0x67, 0x42], &PPS).is_none());
    }

    #[test]
    fn test_video_tag_headers() {
        let key = build_flv_video_tag(&[0xAA], true, false, 0);
        assert_eq!(key.as_ref(), &[0x17, 0x01, 0x00, 0x00, 0x00, 0xAA]);

        let inter = build_flv_video_tag(&[0xAA], false, false, 0);
        assert_eq!(inter[0], 0x27);

        let header = build_flv_video_tag(&[0xAA], true, true, 0);
        assert_eq!(header[1], 0x00);
    }

    #[test]
    fn test_aac_tag_headers() {
        assert_eq!(build_aac_tag(&[0x12, 0x10], true).as_ref(), &[0xAF, 0x00, 0x12, 0x10]);
        assert_eq!(build_aac_tag(&[0x21], false).as_ref(), &[0xAF, 0x01, 0x21]);
    }
}
