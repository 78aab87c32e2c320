//! Pure-Rust media file prober.
//!
//! Uses `mp4parse` for MP4/MOV files and the `matroska` crate for MKV/WebM.
//! Containers are recognised by magic bytes first, so temp files with opaque
//! names still probe correctly; the extension is only a fallback.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use cs_core::{Error, MediaMetadata};

use crate::prober::Prober;

/// One unit in the 16.16 fixed-point track-header matrix.
const FIXED_ONE: i32 = 0x0001_0000;

/// Container families understood by [`NativeProber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Matroska,
}

impl Container {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Matroska => "video/x-matroska",
        }
    }
}

/// A [`Prober`] that parses containers in-process.
///
/// It cannot report a declared bitrate; stack it in front of an ffprobe-based
/// prober when that matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProber;

impl NativeProber {
    pub fn new() -> Self {
        Self
    }
}

impl Prober for NativeProber {
    fn name(&self) -> &'static str {
        "native"
    }

    fn supports(&self, path: &Path) -> bool {
        detect_container(path).is_ok()
    }

    fn probe(&self, path: &Path) -> cs_core::Result<MediaMetadata> {
        let info = match detect_container(path)? {
            Container::Mp4 => probe_mp4(path)?,
            Container::Matroska => probe_mkv(path)?,
        };
        Ok(info.normalized())
    }
}

// ---------------------------------------------------------------------------
// Container detection
// ---------------------------------------------------------------------------

/// Detect container format from file magic bytes, with extension fallback.
pub fn detect_container(path: &Path) -> cs_core::Result<Container> {
    let mut file = File::open(path).map_err(|e| Error::probe(format!("{}: {e}", path.display())))?;

    let mut magic = [0u8; 12];
    if file.read(&mut magic).unwrap_or(0) >= 8 {
        if magic[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
            return Ok(Container::Matroska);
        }
        if matches!(&magic[4..8], b"ftyp" | b"moov" | b"mdat" | b"free" | b"wide") {
            return Ok(Container::Mp4);
        }
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => match ext.to_lowercase().as_str() {
            "mkv" | "webm" => Ok(Container::Matroska),
            "mp4" | "m4v" | "mov" | "3gp" => Ok(Container::Mp4),
            other => Err(Error::probe(format!("unsupported container extension: {other}"))),
        },
        None => Err(Error::probe("unable to detect container format")),
    }
}

// ---------------------------------------------------------------------------
// MP4 probing
// ---------------------------------------------------------------------------

fn probe_mp4(path: &Path) -> cs_core::Result<MediaMetadata> {
    let mut file = File::open(path).map_err(|e| Error::probe(e.to_string()))?;
    let file_size = file.metadata().map_err(|e| Error::probe(e.to_string()))?.len();

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)
        .map_err(|e| Error::probe(e.to_string()))?;

    let mut cursor = std::io::Cursor::new(&buffer);
    let context = mp4parse::read_mp4(&mut cursor)
        .map_err(|e| Error::probe(format!("MP4 parse error: {e:?}")))?;

    let video = context
        .tracks
        .iter()
        .find(|t| matches!(t.track_type, mp4parse::TrackType::Video))
        .ok_or_else(|| Error::probe(format!("no video track in {}", path.display())))?;

    let (width, height) = match video
        .stsd
        .as_ref()
        .and_then(|stsd| stsd.descriptions.first())
    {
        Some(mp4parse::SampleEntry::Video(ve)) => (ve.width as u32, ve.height as u32),
        _ => video
            .tkhd
            .as_ref()
            .map(|tkhd| (tkhd.width >> 16, tkhd.height >> 16))
            .unwrap_or((0, 0)),
    };

    let rotation_degrees = video
        .tkhd
        .as_ref()
        .map(|tkhd| rotation_from_matrix(tkhd.matrix.a, tkhd.matrix.b, tkhd.matrix.c, tkhd.matrix.d))
        .unwrap_or(0);

    let frame_count = video
        .stts
        .as_ref()
        .map(|stts| stts.samples.iter().map(|s| s.sample_count as u64).sum::<u64>());

    let audio_sample_rate = context
        .tracks
        .iter()
        .filter(|t| matches!(t.track_type, mp4parse::TrackType::Audio))
        .find_map(|t| match t.stsd.as_ref()?.descriptions.first()? {
            mp4parse::SampleEntry::Audio(ae) => Some(ae.samplerate as u32),
            _ => None,
        });

    Ok(MediaMetadata {
        mime_type: Some(Container::Mp4.mime_type().to_string()),
        rotation_degrees,
        width,
        height,
        declared_bitrate: None,
        duration_secs: mp4_duration_secs(&context, video),
        frame_count,
        audio_sample_rate,
        file_size,
    })
}

fn mp4_duration_secs(context: &mp4parse::MediaContext, video: &mp4parse::Track) -> Option<f64> {
    let global_scale = context.timescale.map(|s| s.0);
    std::iter::once(video)
        .chain(context.tracks.iter())
        .find_map(|t| {
            let duration = t.duration?;
            let scale = t.timescale.map(|s| s.0).or(global_scale)?;
            if scale == 0 {
                return None;
            }
            Some(duration.0 as f64 / scale as f64)
        })
}

/// Map the rotation part of a track-header matrix to clockwise degrees.
///
/// Only the four axis-aligned rotations are recognised; anything else
/// (shear, mirror, arbitrary angles) reports 0.
pub fn rotation_from_matrix(a: i32, b: i32, c: i32, d: i32) -> i32 {
    match (a, b, c, d) {
        (0, FIXED_ONE, x, 0) if x == -FIXED_ONE => 90,
        (x, 0, 0, y) if x == -FIXED_ONE && y == -FIXED_ONE => 180,
        (0, x, FIXED_ONE, 0) if x == -FIXED_ONE => 270,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Matroska probing
// ---------------------------------------------------------------------------

fn probe_mkv(path: &Path) -> cs_core::Result<MediaMetadata> {
    let file = File::open(path).map_err(|e| Error::probe(e.to_string()))?;
    let file_size = file.metadata().map_err(|e| Error::probe(e.to_string()))?.len();

    let mkv = matroska::Matroska::open(BufReader::new(file))
        .map_err(|e| Error::probe(format!("MKV parse error: {e}")))?;

    let duration_secs = mkv.info.duration.map(|d| d.as_secs_f64());

    let (video_track, width, height) = mkv
        .tracks
        .iter()
        .find_map(|t| match &t.settings {
            matroska::Settings::Video(v) => Some((t, v.pixel_width as u32, v.pixel_height as u32)),
            _ => None,
        })
        .ok_or_else(|| Error::probe(format!("no video track in {}", path.display())))?;

    let frame_count = match (duration_secs, video_track.default_duration) {
        (Some(total), Some(per_frame)) if per_frame.as_secs_f64() > 0.0 => {
            Some((total / per_frame.as_secs_f64()).round() as u64)
        }
        _ => None,
    };

    let audio_sample_rate = mkv.tracks.iter().find_map(|t| match &t.settings {
        matroska::Settings::Audio(a) => Some(a.sample_rate as u32),
        _ => None,
    });

    Ok(MediaMetadata {
        mime_type: Some(Container::Matroska.mime_type().to_string()),
        rotation_degrees: 0,
        width,
        height,
        declared_bitrate: None,
        duration_secs,
        frame_count,
        audio_sample_rate,
        file_size,
    })
}
