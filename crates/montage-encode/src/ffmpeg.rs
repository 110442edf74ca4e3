use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use montage_core::{
    AudioSegment, AudioSink, ExportConfig, FrameBuffer, FrameSink, MontageError, MontageResult,
    SinkSummary, Timestamp,
};

/// Streams raw RGBA frames into FFmpeg as they are rendered and muxes the
/// audio passthrough segments in on [`FrameSink::finish`].
///
/// Video goes to a temporary file next to the output first. When audio
/// segments were appended, a second FFmpeg pass copies that video stream
/// and places each segment's trimmed audio at its timeline offset.
pub struct FfmpegSink {
    output: PathBuf,
    fps: f64,
    config: ExportConfig,
    video_path: PathBuf,
    encoder: Option<Encoder>,
    size: Option<(u32, u32)>,
    frames_written: u64,
    audio: FfmpegAudio,
}

struct Encoder {
    child: Child,
    stdin: ChildStdin,
}

/// Audio segments collected for the mux pass.
#[derive(Default)]
pub struct FfmpegAudio {
    segments: Vec<AudioSegment>,
}

impl AudioSink for FfmpegAudio {
    fn append_segment(&mut self, segment: &AudioSegment) -> MontageResult<()> {
        if segment.source_range.is_empty() {
            return Err(MontageError::Sink(format!(
                "empty audio range {} from {}",
                segment.source_range,
                segment.source.display()
            )));
        }
        self.segments.push(segment.clone());
        Ok(())
    }
}

impl FfmpegSink {
    pub fn new(output: impl Into<PathBuf>, fps: f64, config: ExportConfig) -> Self {
        let output = output.into();
        let video_path = temp_video_path(&output);
        Self {
            output,
            fps,
            config,
            video_path,
            encoder: None,
            size: None,
            frames_written: 0,
            audio: FfmpegAudio::default(),
        }
    }

    /// Check if the configured FFmpeg binary runs.
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn start(&mut self, width: u32, height: u32) -> MontageResult<()> {
        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.args(self.encode_args(width, height));
        cmd.arg(&self.video_path);

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MontageError::Sink(format!("failed to start ffmpeg: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MontageError::Sink("failed to open ffmpeg stdin".into()))?;

        tracing::debug!(
            "ffmpeg encoding {}x{} @ {}fps to {}",
            width,
            height,
            self.fps,
            self.video_path.display()
        );
        self.encoder = Some(Encoder { child, stdin });
        self.size = Some((width, height));
        Ok(())
    }

    /// Arguments for the video pass, up to the output path. yuv420p needs
    /// even dimensions, so odd frames get one black row or column.
    fn encode_args(&self, width: u32, height: u32) -> Vec<String> {
        let size = format!("{}x{}", width, height);
        let fps = self.fps.to_string();
        let crf = self.config.crf.to_string();
        let mut args = vec![
            "-y", "-v", "error", "-nostats",
            "-f", "rawvideo",
            "-pixel_format", "rgba",
            "-video_size", size.as_str(),
            "-framerate", fps.as_str(),
            "-i", "-",
        ];
        if width % 2 != 0 || height % 2 != 0 {
            args.extend(["-vf", EVEN_PAD]);
        }
        args.extend([
            "-c:v", "libx264",
            "-pix_fmt", "yuv420p",
            "-preset", self.config.preset.as_str(),
            "-crf", crf.as_str(),
            "-movflags", "+faststart",
        ]);
        args.into_iter().map(String::from).collect()
    }

    /// Close stdin and wait for the video pass.
    fn finish_video(&mut self) -> MontageResult<()> {
        let Some(Encoder { child, stdin }) = self.encoder.take() else {
            return Err(MontageError::Sink("no frames were written".into()));
        };
        drop(stdin);
        let output = child
            .wait_with_output()
            .map_err(|e| MontageError::Sink(format!("ffmpeg process error: {}", e)))?;
        if !output.status.success() {
            return Err(MontageError::Sink(format!(
                "ffmpeg failed with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn mux_audio(&self) -> MontageResult<()> {
        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.args(["-y", "-v", "error", "-i"]).arg(&self.video_path);
        for segment in &self.audio.segments {
            cmd.arg("-i").arg(&segment.source);
        }
        cmd.args(["-filter_complex", &audio_filter_graph(&self.audio.segments)]);
        cmd.args(["-map", "0:v", "-map", "[aout]"]);
        cmd.args(["-c:v", "copy", "-c:a", "aac", "-b:a", &self.config.audio_bitrate]);
        cmd.args(["-movflags", "+faststart"]);
        cmd.arg(&self.output);

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| MontageError::Sink(format!("failed to start ffmpeg mux: {}", e)))?;
        if !output.status.success() {
            return Err(MontageError::Sink(format!(
                "ffmpeg mux failed with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn append(&mut self, frame: &FrameBuffer, _pts: Timestamp) -> MontageResult<()> {
        match self.size {
            None => self.start(frame.width, frame.height)?,
            Some((w, h)) if w != frame.width || h != frame.height => {
                return Err(MontageError::Sink(format!(
                    "frame {} has dimensions {}x{}, expected {}x{}",
                    self.frames_written, frame.width, frame.height, w, h
                )));
            }
            Some(_) => {}
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| MontageError::Sink("encoder already finished".into()))?;
        // Blocks while ffmpeg's pipe is full.
        if let Err(e) = encoder.stdin.write_all(&frame.data) {
            let stderr = self
                .encoder
                .take()
                .and_then(|Encoder { child, stdin }| {
                    drop(stdin);
                    child.wait_with_output().ok()
                })
                .map(|o| String::from_utf8_lossy(&o.stderr).trim().to_string())
                .unwrap_or_default();
            return Err(MontageError::Sink(format!(
                "failed to write frame {} to ffmpeg: {}. ffmpeg stderr: {}",
                self.frames_written, e, stderr
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn audio(&mut self) -> Option<&mut dyn AudioSink> {
        Some(&mut self.audio)
    }

    fn finish(&mut self) -> MontageResult<SinkSummary> {
        self.finish_video()?;
        if self.audio.segments.is_empty() {
            std::fs::rename(&self.video_path, &self.output)?;
        } else {
            let muxed = self.mux_audio();
            let _ = std::fs::remove_file(&self.video_path);
            muxed?;
        }
        tracing::info!(
            "encoded {} frames with {} audio segments to {}",
            self.frames_written,
            self.audio.segments.len(),
            self.output.display()
        );
        Ok(SinkSummary {
            frames_written: self.frames_written,
            audio_segments: self.audio.segments.len(),
            output: Some(self.output.clone()),
        })
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Some(Encoder { mut child, stdin }) = self.encoder.take() {
            drop(stdin);
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(&self.video_path);
        }
    }
}

/// Rounds both dimensions up to even with black.
const EVEN_PAD: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

fn temp_video_path(output: &Path) -> PathBuf {
    let name = format!(".montage-video-{}.mp4", uuid::Uuid::new_v4());
    match output.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Filter graph that trims each segment out of its source (input `i + 1`),
/// delays it to its timeline start, and merges them into `[aout]`.
pub fn audio_filter_graph(segments: &[AudioSegment]) -> String {
    let mut graph = String::new();
    let mut labels = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let delay_ms = (segment.output_start.max(0.0) * 1000.0).round() as i64;
        graph.push_str(&format!(
            "[{}:a]atrim=start={:.6}:end={:.6},asetpts=PTS-STARTPTS,adelay={}|{}:all=1[a{}];",
            i + 1,
            segment.source_range.start,
            segment.source_range.end,
            delay_ms,
            delay_ms,
            i
        ));
        labels.push_str(&format!("[a{}]", i));
    }
    graph.push_str(&format!(
        "{}amix=inputs={}:duration=longest:normalize=0[aout]",
        labels,
        segments.len()
    ));
    graph
}
