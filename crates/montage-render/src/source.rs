//! Source media access.
//!
//! [`FrameSource`] is how the compositor gets pixels for a clip at a given
//! source time. Backends here shell out to FFmpeg for video and use the
//! `image` crate for stills.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{Command, Stdio};

use dashmap::DashMap;

use montage_core::{Affine2D, FrameBuffer, MontageError, MontageResult, Size2D};
use montage_ir::{EditorState, SourceRef};

/// What a source reports about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    /// Encoded frame size, before orientation.
    pub natural_size: Size2D,
    /// Transform that makes the encoded frame upright, if it is not already.
    pub orientation: Option<Affine2D>,
    pub has_audio: bool,
    /// Length in seconds.
    pub duration: f64,
}

impl SourceMetadata {
    /// Size as displayed, after orientation.
    pub fn display_size(&self) -> Size2D {
        match self.orientation {
            Some(o) if o.is_quarter_turn() => self.natural_size.transposed(),
            _ => self.natural_size,
        }
    }
}

/// Decodes frames of source media. Implementations must be safe to call
/// from several render threads at once.
pub trait FrameSource: Send + Sync {
    /// The frame shown at `seconds` into the source, at its natural size
    /// and without orientation applied.
    fn decode(&self, source: &SourceRef, seconds: f64) -> MontageResult<FrameBuffer>;

    fn metadata(&self, source: &SourceRef) -> MontageResult<SourceMetadata>;
}

/// Fill in cached media facts (size, orientation, audio) for every clip
/// that does not have them yet.
pub fn probe_clips(state: &mut EditorState, source: &dyn FrameSource) -> MontageResult<()> {
    let pending: Vec<_> = state
        .clips()
        .iter()
        .filter(|c| c.natural_size.is_none())
        .map(|c| (c.id, c.source.clone()))
        .collect();
    for (id, source_ref) in pending {
        let meta = source.metadata(&source_ref)?;
        state.set_clip_media(id, meta.natural_size, meta.orientation, meta.has_audio)?;
    }
    Ok(())
}

/// Decoded frames kept per source path.
pub const FRAMES_CACHED_PER_SOURCE: usize = 4;

/// The most recent decodes of each source, keyed by millisecond.
///
/// Export asks for a new time on every frame, so a source only ever holds
/// its last few frames. Preview scrubbing around one spot still hits.
struct FrameCache {
    per_source: usize,
    entries: DashMap<String, VecDeque<(u64, FrameBuffer)>>,
}

impl FrameCache {
    fn new(per_source: usize) -> Self {
        Self {
            per_source: per_source.max(1),
            entries: DashMap::new(),
        }
    }

    fn get(&self, path: &str, ms: u64) -> Option<FrameBuffer> {
        let recent = self.entries.get(path)?;
        recent
            .iter()
            .find(|(at, _)| *at == ms)
            .map(|(_, fb)| fb.clone())
    }

    fn insert(&self, path: String, ms: u64, frame: FrameBuffer) {
        let mut recent = self.entries.entry(path).or_default();
        recent.retain(|(at, _)| *at != ms);
        while recent.len() >= self.per_source {
            recent.pop_front();
        }
        recent.push_back((ms, frame));
    }

    fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Video decoding through `ffprobe`/`ffmpeg` subprocesses.
pub struct FfmpegSource {
    ffmpeg: String,
    ffprobe: String,
    frame_cache: FrameCache,
    info_cache: DashMap<String, SourceMetadata>,
}

impl FfmpegSource {
    pub fn new() -> Self {
        Self::with_binaries("ffmpeg", "ffprobe")
    }

    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            frame_cache: FrameCache::new(FRAMES_CACHED_PER_SOURCE),
            info_cache: DashMap::new(),
        }
    }

    /// Check if FFmpeg is available on the system.
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn clear_cache(&self) {
        self.frame_cache.clear();
        self.info_cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.frame_cache.len()
    }

    fn probe(&self, path: &Path) -> MontageResult<SourceMetadata> {
        let key = path.to_string_lossy().to_string();
        if let Some(info) = self.info_cache.get(&key) {
            return Ok(info.clone());
        }
        if !path.exists() {
            return Err(MontageError::asset(
                format!("media file not found: {}", path.display()),
                path,
            ));
        }

        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                MontageError::decode(format!("failed to run ffprobe: {}", e), path.display())
            })?;
        if !output.status.success() {
            return Err(MontageError::decode(
                format!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr)),
                path.display(),
            ));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            MontageError::decode(format!("unreadable ffprobe output: {}", e), path.display())
        })?;
        let info = parse_probe(&json).map_err(|msg| MontageError::decode(msg, path.display()))?;
        self.info_cache.insert(key, info.clone());
        Ok(info)
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegSource {
    fn decode(&self, source: &SourceRef, seconds: f64) -> MontageResult<FrameBuffer> {
        let path = source.path();
        let key = path.to_string_lossy().to_string();
        let ms = (seconds.max(0.0) * 1000.0).round() as u64;
        if let Some(cached) = self.frame_cache.get(&key, ms) {
            return Ok(cached);
        }

        let info = self.probe(path)?;
        let width = info.natural_size.width as u32;
        let height = info.natural_size.height as u32;
        let ts = format!("{:.3}", seconds.max(0.0));

        // Orientation is applied by the compositor, so keep FFmpeg from
        // rotating on its own.
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-noautorotate", "-ss", &ts, "-i"])
            .arg(path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| MontageError::decode(format!("failed to run ffmpeg: {}", e), source))?;

        if !output.status.success() {
            return Err(MontageError::decode(
                format!(
                    "ffmpeg failed at {}s: {}",
                    ts,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                source,
            ));
        }
        let expected = width as usize * height as usize * FrameBuffer::BPP;
        if output.stdout.len() < expected {
            return Err(MontageError::decode(
                format!("no frame at {}s (got {} of {} bytes)", ts, output.stdout.len(), expected),
                source,
            ));
        }
        let mut data = output.stdout;
        data.truncate(expected);
        let fb = FrameBuffer::from_raw(width, height, data)
            .ok_or_else(|| MontageError::decode("frame size mismatch", source))?;

        self.frame_cache.insert(key, ms, fb.clone());
        Ok(fb)
    }

    fn metadata(&self, source: &SourceRef) -> MontageResult<SourceMetadata> {
        self.probe(source.path())
    }
}

/// Extract size, orientation, audio presence and duration from `ffprobe`
/// JSON output.
fn parse_probe(json: &serde_json::Value) -> Result<SourceMetadata, String> {
    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| "no streams found".to_string())?;
    let video = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| "no video stream found".to_string())?;

    let width = video["width"].as_u64().ok_or("missing width in video stream")?;
    let height = video["height"].as_u64().ok_or("missing height in video stream")?;
    let has_audio = streams
        .iter()
        .any(|s| s["codec_type"].as_str() == Some("audio"));

    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| video["duration"].as_str().and_then(|s| s.parse::<f64>().ok()))
        .unwrap_or(0.0);

    Ok(SourceMetadata {
        natural_size: Size2D::new(width as f64, height as f64),
        orientation: orientation_from_stream(video),
        has_audio,
        duration,
    })
}

/// Clockwise display rotation, from the display matrix side data or the
/// legacy `rotate` tag.
fn orientation_from_stream(stream: &serde_json::Value) -> Option<Affine2D> {
    // Display matrix rotation is counter-clockwise.
    let from_side_data = stream["side_data_list"].as_array().and_then(|list| {
        list.iter()
            .find_map(|d| d["rotation"].as_f64())
            .map(|deg| -deg)
    });
    let from_tag = || {
        stream["tags"]["rotate"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
    };
    let degrees = from_side_data.or_else(from_tag)?;
    let normalized = degrees.rem_euclid(360.0);
    if normalized.abs() < 1e-6 {
        return None;
    }
    Some(Affine2D::rotate(normalized.to_radians()))
}

/// Parse a frame rate string like "30/1" or "24000/1001".
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den <= 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (fps > 0.0).then_some(fps)
}

/// Still images: every time shows the same frame.
#[derive(Default)]
pub struct StillImageSource {
    cache: DashMap<String, FrameBuffer>,
}

impl StillImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self, path: &Path) -> MontageResult<FrameBuffer> {
        let key = path.to_string_lossy().to_string();
        if let Some(fb) = self.cache.get(&key) {
            return Ok(fb.clone());
        }
        let img = image::open(path).map_err(|e| {
            MontageError::asset(format!("failed to load image '{}': {}", path.display(), e), path)
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let fb = FrameBuffer::from_raw(width, height, rgba.into_raw())
            .ok_or_else(|| MontageError::asset("image buffer size mismatch", path))?;
        self.cache.insert(key, fb.clone());
        Ok(fb)
    }
}

impl FrameSource for StillImageSource {
    fn decode(&self, source: &SourceRef, _seconds: f64) -> MontageResult<FrameBuffer> {
        self.load(source.path())
    }

    fn metadata(&self, source: &SourceRef) -> MontageResult<SourceMetadata> {
        let fb = self.load(source.path())?;
        Ok(SourceMetadata {
            natural_size: Size2D::new(fb.width as f64, fb.height as f64),
            orientation: None,
            has_audio: false,
            duration: f64::INFINITY,
        })
    }
}

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Routes still images to [`StillImageSource`] and everything else to
/// [`FfmpegSource`], by file extension.
#[derive(Default)]
pub struct MediaSource {
    video: FfmpegSource,
    stills: StillImageSource,
}

impl MediaSource {
    pub fn new(video: FfmpegSource) -> Self {
        Self {
            video,
            stills: StillImageSource::new(),
        }
    }

    fn is_still(source: &SourceRef) -> bool {
        source
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl FrameSource for MediaSource {
    fn decode(&self, source: &SourceRef, seconds: f64) -> MontageResult<FrameBuffer> {
        if Self::is_still(source) {
            self.stills.decode(source, seconds)
        } else {
            self.video.decode(source, seconds)
        }
    }

    fn metadata(&self, source: &SourceRef) -> MontageResult<SourceMetadata> {
        if Self::is_still(source) {
            self.stills.metadata(source)
        } else {
            self.video.metadata(source)
        }
    }
}
