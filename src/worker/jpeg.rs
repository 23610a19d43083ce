//! YUV420p -> JPEG re-encoding for the latest-JPEG slot (spec §3 JpegFrame,
//! §4.1 "recomputed at the currently-applicable frame rate"). `image` is the
//! project's structural ancestor's own (previously feature-gated) dependency
//! for this, made unconditional here since JPEG re-encoding sits on the
//! always-on camera path rather than behind an optional analysis feature.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;

use crate::error::{Result, StreamError};
use crate::frame::{JpegFrame, YuvFrame};

/// Encodes a planar YUV420p frame to baseline JPEG at `quality` (1-100).
pub fn encode_yuv420p(frame: &YuvFrame, quality: u8) -> Result<JpegFrame> {
    let rgb = yuv420p_to_rgb(&frame.data, frame.width, frame.height, frame.stride)?;

    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
        encoder
            .encode(&rgb, frame.width, frame.height, image::ColorType::Rgb8)
            .map_err(|e| StreamError::FrameEncoding(format!("jpeg encode failed: {e}")))?;
    }

    Ok(JpegFrame::new(buf, frame.width, frame.height, frame.sequence))
}

fn yuv420p_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let y_stride = stride.max(width) as usize;
    let y_size = y_stride * h;
    let c_stride = y_stride / 2;
    let c_size = c_stride * (h / 2);

    if data.len() < y_size + 2 * c_size {
        return Err(StreamError::FrameEncoding("yuv buffer shorter than width*height*1.5".into()).into());
    }

    let y_plane = &data[..y_size];
    let u_plane = &data[y_size..y_size + c_size];
    let v_plane = &data[y_size + c_size..y_size + 2 * c_size];

    let mut rgb = vec![0u8; w * h * 3];
    for row in 0..h {
        for col in 0..w {
            let y = y_plane[row * y_stride + col] as f32;
            let u = u_plane[(row / 2) * c_stride + col / 2] as f32 - 128.0;
            let v = v_plane[(row / 2) * c_stride + col / 2] as f32 - 128.0;

            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

            let idx = (row * w + col) * 3;
            rgb[idx] = r;
            rgb[idx + 1] = g;
            rgb[idx + 2] = b;
        }
    }
    Ok(rgb)
}

/// Used only by tests below to build a synthetic luma-only frame (no chroma
/// subsampling math to verify, just that the encoder path runs end to end).
#[cfg(test)]
fn synthetic_yuv420p(width: u32, height: u32) -> YuvFrame {
    let y_size = (width * height) as usize;
    let c_size = y_size / 4;
    let mut data = vec![128u8; y_size + 2 * c_size];
    for i in 0..y_size {
        data[i] = ((i * 7) % 256) as u8;
    }
    YuvFrame::new(data, width, width, height, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_synthetic_frame_to_valid_jpeg_bytes() {
        let frame = synthetic_yuv420p(16, 16);
        let jpeg = encode_yuv420p(&frame, 80).unwrap();
        assert!(jpeg.data.len() > 2);
        assert_eq!(&jpeg.data[..2], &[0xFF, 0xD8]);
        assert_eq!(jpeg.width, 16);
        assert_eq!(jpeg.height, 16);
    }

    #[test]
    fn rejects_undersized_buffers() {
        let frame = YuvFrame::new(vec![0u8; 4], 16, 16, 16, 1);
        assert!(encode_yuv420p(&frame, 80).is_err());
    }
}
