//! Extradata parser: detects Annex B vs AVCC config records and extracts
//! `(SPS, PPS, nalLengthSize)` (spec §4.10).

use crate::error::{CodecError, Result};
use crate::frame::ParameterSets;

const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;

/// Parses either an AVCDecoderConfigurationRecord (AVCC) or an Annex B byte
/// stream containing SPS/PPS NAL units, returning the parameter sets plus
/// the NAL length size the stream's AVCC packets use (`1`, `2`, or `4`).
/// Annex B extradata has no length-size field; `4` is assumed for any AVCC
/// repacking performed downstream, matching common FFmpeg/muxer behavior.
pub fn parse_extradata(extradata: &[u8]) -> Result<ParameterSets> {
    if is_avcc_config_record(extradata) {
        parse_avcc_config_record(extradata)
    } else {
        parse_annex_b_extradata(extradata)
    }
}

fn is_avcc_config_record(data: &[u8]) -> bool {
    // configurationVersion must be 1, and there must be room for the fixed
    // header plus at least one SPS length prefix.
    data.len() >= 7 && data[0] == 1
}

fn parse_avcc_config_record(data: &[u8]) -> Result<ParameterSets> {
    if data.len() < 6 {
        return Err(CodecError::UnrecognizedExtradata.into());
    }
    let nal_length_size = (data[4] & 0x03) + 1;
    let num_sps = (data[5] & 0x1F) as usize;

    let mut offset = 6;
    let mut sps = Vec::new();
    for i in 0..num_sps {
        let (nal, next) = read_length_prefixed(data, offset)?;
        if i == 0 {
            sps = nal;
        }
        offset = next;
    }

    if offset >= data.len() {
        return Err(CodecError::TruncatedNal.into());
    }
    let num_pps = data[offset] as usize;
    offset += 1;

    let mut pps = Vec::new();
    for i in 0..num_pps {
        let (nal, next) = read_length_prefixed(data, offset)?;
        if i == 0 {
            pps = nal;
        }
        offset = next;
    }

    if sps.is_empty() || pps.is_empty() {
        return Err(CodecError::MissingParameterSets.into());
    }

    Ok(ParameterSets::new(sps, pps, nal_length_size))
}

fn read_length_prefixed(data: &[u8], offset: usize) -> Result<(Vec<u8>, usize)> {
    if offset + 2 > data.len() {
        return Err(CodecError::TruncatedNal.into());
    }
    let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
    let start = offset + 2;
    let end = start + len;
    if end > data.len() {
        return Err(CodecError::TruncatedNal.into());
    }
    Ok((data[start..end].to_vec(), end))
}

fn parse_annex_b_extradata(data: &[u8]) -> Result<ParameterSets> {
    let nals = crate::h264::nal::split_annex_b(data);
    let mut sps = None;
    let mut pps = None;

    for nal in nals {
        if nal.is_empty() {
            continue;
        }
        match nal[0] & 0x1F {
            NAL_TYPE_SPS if sps.is_none() => sps = Some(nal.to_vec()),
            NAL_TYPE_PPS if pps.is_none() => pps = Some(nal.to_vec()),
            _ => {}
        }
    }

    match (sps, pps) {
        (Some(sps), Some(pps)) => Ok(ParameterSets::new(sps, pps, 4)),
        _ => Err(CodecError::MissingParameterSets.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_avcc_record() -> Vec<u8> {
        let sps = vec![0x67, 0x42, 0x00, 0x1F];
        let pps = vec![0x68, 0xCE, 0x3C, 0x80];
        let mut record = vec![
            1,    // configurationVersion
            0x42, // profile
            0x00, // compat
            0x1F, // level
            0xFF, // reserved(6) + lengthSizeMinusOne=3 -> 4-byte lengths
            0xE1, // reserved(3) + numSPS=1
        ];
        record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        record.extend_from_slice(&sps);
        record.push(1); // numPPS
        record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        record.extend_from_slice(&pps);
        record
    }

    #[test]
    fn parses_avcc_configuration_record() {
        let record = sample_avcc_record();
        let params = parse_extradata(&record).unwrap();
        assert_eq!(params.nal_length_size, 4);
        assert_eq!(params.sps, vec![0x67, 0x42, 0x00, 0x1F]);
        assert_eq!(params.pps, vec![0x68, 0xCE, 0x3C, 0x80]);
    }

    #[test]
    fn parses_annex_b_extradata() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F];
        data.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]);
        let params = parse_extradata(&data).unwrap();
        assert_eq!(params.nal_length_size, 4);
        assert_eq!(params.sps, vec![0x67, 0x42, 0x00, 0x1F]);
        assert_eq!(params.pps, vec![0x68, 0xCE, 0x3C, 0x80]);
    }

    #[test]
    fn rejects_missing_parameter_sets() {
        let data = vec![0, 0, 0, 1, 0x65, 0x01, 0x02];
        assert!(parse_extradata(&data).is_err());
    }
}
