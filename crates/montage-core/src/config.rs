use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{MontageError, MontageResult};
use crate::math::Size2D;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Canvas used when no clip provides a natural size.
    pub default_width: u32,
    pub default_height: u32,
    /// Accumulator fill under the bottom layer, as `#RRGGBB[AA]`.
    pub background: String,
    pub fps: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_width: 1920,
            default_height: 1080,
            background: "#000000".to_string(),
            fps: 30.0,
        }
    }
}

impl RenderConfig {
    pub fn default_canvas(&self) -> Size2D {
        Size2D::new(self.default_width as f64, self.default_height as f64)
    }

    pub fn background_color(&self) -> MontageResult<Color> {
        Color::from_hex(&self.background).map_err(|_| {
            MontageError::Config(format!("invalid background color '{}'", self.background))
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub ffmpeg_path: String,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_bitrate: "192k".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Upper bound on renders running at once; further requests wait.
    pub max_concurrent_renders: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_concurrent_renders: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MontageConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl MontageConfig {
    pub fn load_from_file(path: &std::path::Path) -> MontageResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> MontageResult<Self> {
        let config: MontageConfig = toml::from_str(contents)
            .map_err(|e| MontageError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> MontageResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| MontageError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> MontageResult<()> {
        if self.render.default_width == 0 || self.render.default_height == 0 {
            return Err(MontageError::Config("default canvas must be non-zero".into()));
        }
        if !(self.render.fps > 0.0) {
            return Err(MontageError::Config("fps must be positive".into()));
        }
        if self.preview.max_concurrent_renders == 0 {
            return Err(MontageError::Config(
                "max_concurrent_renders must be at least 1".into(),
            ));
        }
        self.render.background_color()?;
        Ok(())
    }
}
