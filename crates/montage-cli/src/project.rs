use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use montage_core::MontageConfig;
use montage_ir::EditorState;
use montage_render::{probe_clips, FfmpegSource, FontdueRasterizer, FrameCompositor, MediaSource};

pub const DEFAULT_CONFIG_FILE: &str = "montage.toml";

/// Load `--config` when given, else `montage.toml` from the working
/// directory when it exists, else defaults.
pub fn load_config(path: Option<&Path>) -> Result<MontageConfig> {
    match path {
        Some(path) => MontageConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            if local.exists() {
                tracing::debug!("using {}", local.display());
                MontageConfig::load_from_file(&local)
                    .with_context(|| format!("failed to load config: {}", local.display()))
            } else {
                Ok(MontageConfig::default())
            }
        }
    }
}

/// A project file with every clip's media probed, plus the compositor that
/// renders it.
pub struct LoadedProject {
    pub state: EditorState,
    pub compositor: Arc<FrameCompositor>,
}

pub fn load_project(
    file: &Path,
    config: &MontageConfig,
    font: Option<PathBuf>,
) -> Result<LoadedProject> {
    let mut state = EditorState::load_from_file(file)
        .with_context(|| format!("failed to load project: {}", file.display()))?;

    let source = Arc::new(MediaSource::new(video_source(&config.export.ffmpeg_path)));
    probe_clips(&mut state, source.as_ref())
        .with_context(|| format!("failed to probe media for {}", file.display()))?;

    let mut text = FontdueRasterizer::new();
    if let Some(font) = font {
        text = text.with_default_font(font);
    }
    let background = config.render.background_color()?;
    let compositor = FrameCompositor::new(source, Arc::new(text)).with_background(background);

    Ok(LoadedProject {
        state,
        compositor: Arc::new(compositor),
    })
}

/// FFmpeg decoder using the configured binary, with `ffprobe` looked up
/// next to it.
fn video_source(ffmpeg_path: &str) -> FfmpegSource {
    let ffmpeg = Path::new(ffmpeg_path);
    match ffmpeg.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => FfmpegSource::with_binaries(
            ffmpeg_path,
            dir.join("ffprobe").to_string_lossy().into_owned(),
        ),
        None => FfmpegSource::with_binaries(ffmpeg_path, "ffprobe"),
    }
}
