//! Text measurement used to size nodes around their labels.
//!
//! [`TextMeasure`] is the seam between the layout engine and font handling.
//! [`FontMeasurer`] shapes text with cosmic-text against the system fonts;
//! [`FixedWidthMeasurer`] uses a constant advance per character and is what
//! headless runs and tests use when reproducible geometry matters more than
//! typographic accuracy.

use std::sync::{Mutex, OnceLock};

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping};
use log::info;

use crate::geometry::Size;

/// Measures the rendered extent of a label.
pub trait TextMeasure {
    /// Returns the size `text` occupies at `font_size` pixels.
    fn measure(&self, text: &str, font_size: f32) -> Size;
}

/// Measures text with a constant advance per character.
///
/// ```
/// use flowchart_core::draw::{FixedWidthMeasurer, TextMeasure};
///
/// let measurer = FixedWidthMeasurer::new(0.5, 1.2);
/// let size = measurer.measure("abcd", 10.0);
/// assert_eq!(size.width(), 20.0);
/// assert_eq!(size.height(), 12.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedWidthMeasurer {
    advance: f32,
    line_height: f32,
}

impl FixedWidthMeasurer {
    /// Creates a measurer; both factors are multiples of the font size.
    pub fn new(advance: f32, line_height: f32) -> Self {
        Self {
            advance,
            line_height,
        }
    }
}

impl Default for FixedWidthMeasurer {
    fn default() -> Self {
        Self::new(0.55, 1.15)
    }
}

impl TextMeasure for FixedWidthMeasurer {
    fn measure(&self, text: &str, font_size: f32) -> Size {
        if text.is_empty() {
            return Size::default();
        }
        let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        let lines = text.lines().count().max(1);
        Size::new(
            longest as f32 * font_size * self.advance,
            lines as f32 * font_size * self.line_height,
        )
    }
}

/// Shapes text with cosmic-text to obtain real font metrics.
///
/// All instances share one lazily created [`FontSystem`]; loading system
/// fonts is expensive and only happens once per process.
#[derive(Debug, Clone)]
pub struct FontMeasurer {
    family: String,
}

impl FontMeasurer {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
        }
    }
}

impl Default for FontMeasurer {
    fn default() -> Self {
        Self::new("Arial")
    }
}

static FONT_SYSTEM: OnceLock<Mutex<FontSystem>> = OnceLock::new();

impl TextMeasure for FontMeasurer {
    fn measure(&self, text: &str, font_size: f32) -> Size {
        if text.is_empty() {
            return Size::default();
        }

        let mut font_system = FONT_SYSTEM
            .get_or_init(|| {
                info!("Initializing FontSystem");
                Mutex::new(FontSystem::new())
            })
            .lock()
            .expect("failed to lock FontSystem");

        let line_height = font_size * 1.15;
        let metrics = Metrics::new(font_size, line_height);

        let mut buffer = Buffer::new(&mut font_system, metrics);
        let mut buffer = buffer.borrow_with(&mut font_system);

        let attrs = Attrs::new().family(Family::Name(&self.family));
        buffer.set_size(None, None);
        buffer.set_text(text, &attrs, Shaping::Advanced, None);
        buffer.shape_until_scroll(true);

        let mut max_width: f32 = 0.0;
        let mut total_height: f32 = 0.0;

        let layout_runs: Vec<_> = buffer.layout_runs().collect();
        if !layout_runs.is_empty() {
            for last in layout_runs.iter().map(|run| run.glyphs.last()) {
                if let Some(last) = last {
                    max_width = max_width.max(last.x + last.w);
                }
                total_height += metrics.line_height;
            }
        } else {
            // No font available; approximate with an average glyph advance.
            max_width = text.chars().count() as f32 * (font_size * 0.55);
            total_height = metrics.line_height;
        }

        Size::new(max_width, total_height)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_fixed_width_empty_text() {
        let measurer = FixedWidthMeasurer::default();
        assert!(measurer.measure("", 12.0).is_zero());
    }

    #[test]
    fn test_fixed_width_multiline_uses_longest_line() {
        let measurer = FixedWidthMeasurer::new(1.0, 2.0);
        let size = measurer.measure("ab\nabcd\nc", 10.0);
        assert_approx_eq!(f32, size.width(), 40.0);
        assert_approx_eq!(f32, size.height(), 60.0);
    }

    #[test]
    fn test_fixed_width_counts_chars_not_bytes() {
        let measurer = FixedWidthMeasurer::new(1.0, 1.0);
        assert_approx_eq!(f32, measurer.measure("开始", 10.0).width(), 20.0);
    }
}
