//! m3u8 media playlist generation (spec §4.2), including the LL-HLS
//! `#EXT-X-PART-INF` / `#EXT-X-PART` extensions. Media sequence numbers are
//! taken directly from `Segment::id`, which `HlsSegmenter` only ever
//! increments -- this is what gives testable property 6 (monotonic media
//! sequence numbers) for free rather than as a playlist-layer invariant to
//! re-derive.

use std::fmt::Write as _;

use crate::hls::segmenter::Segment;

pub struct PlaylistOptions {
    pub target_duration_secs: u32,
    pub part_target_duration_secs: f64,
    pub ll_hls_enabled: bool,
}

/// Builds the media playlist text for the given window of segments. The
/// caller decides the URL scheme (segment/part file naming); this function
/// only deals in already-resolved segment/part numbers and durations.
pub fn build_media_playlist(segments: &[Segment], options: &PlaylistOptions, printer: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#EXT-X-VERSION:{}", if options.ll_hls_enabled { 9 } else { 3 });
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", options.target_duration_secs);

    let media_sequence = segments.first().map(|s| s.id).unwrap_or(0);
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", media_sequence);

    if options.ll_hls_enabled {
        let _ = writeln!(out, "#EXT-X-PART-INF:PART-TARGET={:.3}", options.part_target_duration_secs);
        let _ = writeln!(
            out,
            "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK={:.3}",
            options.part_target_duration_secs * 3.0
        );
    }

    for segment in segments {
        if segment.independent {
            let _ = writeln!(out, "#EXT-X-DISCONTINUITY");
        }
        if options.ll_hls_enabled {
            for (part_index, part) in segment.parts.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "#EXT-X-PART:DURATION={:.3},URI=\"{}\"{}",
                    part.duration_ms as f64 / 1000.0,
                    part_uri(printer, segment.id, part_index as u32),
                    if part.independent { ",INDEPENDENT=YES" } else { "" },
                );
            }
        }
        let _ = writeln!(out, "#EXTINF:{:.3},", segment.duration_ms as f64 / 1000.0);
        let _ = writeln!(out, "{}", segment_uri(printer, segment.id));
    }

    out
}

pub fn segment_uri(printer: &str, segment_id: u64) -> String {
    format!("segment-{segment_id}.{ext}?printer={printer}", ext = "m4s", segment_id = segment_id, printer = printer)
}

pub fn part_uri(printer: &str, segment_id: u64, part_index: u32) -> String {
    format!("part-{segment_id}-{part_index}.m4s?printer={printer}")
}

/// Parses LL-HLS blocking-reload query parameters (`_HLS_msn`, `_HLS_part`)
/// from a raw query string, per spec §4.2.
pub fn parse_blocking_reload_params(query: &str) -> Option<(u64, Option<u32>)> {
    let mut msn = None;
    let mut part = None;
    for pair in query.split('&') {
        let mut split = pair.splitn(2, '=');
        let key = split.next()?;
        let value = split.next()?;
        match key {
            "_HLS_msn" => msn = value.parse::<u64>().ok(),
            "_HLS_part" => part = value.parse::<u32>().ok(),
            _ => {}
        }
    }
    msn.map(|m| (m, part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn segment(id: u64, parts: usize) -> Segment {
        Segment {
            id,
            duration_ms: 2000,
            independent: id == 0,
            data: Bytes::new(),
            parts: (0..parts)
                .map(|i| std::sync::Arc::new(crate::hls::segmenter::Part { id: i as u32, duration_ms: 500, independent: i == 0, data: Bytes::new() }))
                .collect(),
        }
    }

    #[test]
    fn media_sequence_matches_first_segment_id() {
        let segments = vec![segment(3, 0), segment(4, 0)];
        let options = PlaylistOptions { target_duration_secs: 2, part_target_duration_secs: 0.5, ll_hls_enabled: false };
        let playlist = build_media_playlist(&segments, &options, "printer1");
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:3"));
    }

    #[test]
    fn ll_hls_playlist_includes_part_inf_and_parts() {
        let segments = vec![segment(0, 2)];
        let options = PlaylistOptions { target_duration_secs: 2, part_target_duration_secs: 0.5, ll_hls_enabled: true };
        let playlist = build_media_playlist(&segments, &options, "printer1");
        assert!(playlist.contains("#EXT-X-PART-INF:PART-TARGET=0.500"));
        assert_eq!(playlist.matches("#EXT-X-PART:").count(), 2);
    }

    #[test]
    fn non_ll_hls_playlist_omits_parts() {
        let segments = vec![segment(0, 2)];
        let options = PlaylistOptions { target_duration_secs: 2, part_target_duration_secs: 0.5, ll_hls_enabled: false };
        let playlist = build_media_playlist(&segments, &options, "printer1");
        assert!(!playlist.contains("#EXT-X-PART"));
    }

    #[test]
    fn parses_msn_and_part_query_params() {
        assert_eq!(parse_blocking_reload_params("_HLS_msn=10&_HLS_part=2"), Some((10, Some(2))));
        assert_eq!(parse_blocking_reload_params("_HLS_msn=10"), Some((10, None)));
        assert_eq!(parse_blocking_reload_params("foo=bar"), None);
    }
}
