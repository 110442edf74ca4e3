use serde::{Deserialize, Serialize};

/// Color/look filter assigned to a clip. Each filter reads the clip's
/// `filter_intensity` (0.0–1.0) and maps it to its own parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    None,
    /// Warm brown tone, blended by intensity.
    Sepia,
    /// Luminance-only grayscale.
    Mono,
    /// High-contrast grayscale.
    Noir,
    /// Boosted saturation and contrast.
    Chrome,
    /// Lifted blacks, reduced saturation.
    Fade,
    /// Color inversion, blended by intensity.
    Invert,
    /// Darkened edges; intensity drives strength and radius.
    Vignette,
    /// Gaussian blur; intensity maps to a pixel radius. Expands the image extent.
    Blur,
}

impl Filter {
    pub const ALL: [Filter; 9] = [
        Filter::None,
        Filter::Sepia,
        Filter::Mono,
        Filter::Noir,
        Filter::Chrome,
        Filter::Fade,
        Filter::Invert,
        Filter::Vignette,
        Filter::Blur,
    ];

    pub fn is_none(&self) -> bool {
        matches!(self, Filter::None)
    }

    /// Whether applying this filter can grow the image past its input bounds.
    pub fn expands_extent(&self) -> bool {
        matches!(self, Filter::Blur)
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::None
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Filter::None => "none",
            Filter::Sepia => "sepia",
            Filter::Mono => "mono",
            Filter::Noir => "noir",
            Filter::Chrome => "chrome",
            Filter::Fade => "fade",
            Filter::Invert => "invert",
            Filter::Vignette => "vignette",
            Filter::Blur => "blur",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Filter {
    type Err = crate::MontageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::ALL
            .into_iter()
            .find(|f| f.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| crate::MontageError::InvalidArgument(format!("unknown filter '{}'", s)))
    }
}

/// Horizontal alignment of multi-line text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl Default for TextAlign {
    fn default() -> Self {
        Self::Center
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_display_and_parse() {
        for filter in Filter::ALL {
            let parsed: Filter = filter.to_string().parse().unwrap();
            assert_eq!(parsed, filter);
        }
        assert_eq!("SEPIA".parse::<Filter>().unwrap(), Filter::Sepia);
        assert!("lomo".parse::<Filter>().is_err());
    }

    #[test]
    fn test_only_blur_expands() {
        assert!(Filter::Blur.expands_extent());
        assert!(!Filter::Sepia.expands_extent());
    }

    #[test]
    fn test_filter_serde_name() {
        let json = serde_json::to_string(&Filter::Vignette).unwrap();
        assert_eq!(json, "\"vignette\"");
    }
}
