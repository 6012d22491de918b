//! Spectrum bars
//!
//! One bar per frequency bin, left to right. Bar height is the byte value
//! over 255 times the surface height. Each bar's hue walks linearly from
//! 0° at the first bin to 360° at the last, with a vertical gradient from
//! the base lightness at the bottom to the top lightness at the bar's tip.

use bw_core::MeterConfig;

use crate::common::{Color, Rect};
use crate::draw::{DrawList, Fill};

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumConfig {
    pub width: f32,
    pub height: f32,
    pub background: Color,
    pub saturation: f32,
    pub base_lightness: f32,
    pub top_lightness: f32,
    /// Horizontal gap between bars in pixels
    pub bar_gap: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 200.0,
            background: Color::BACKGROUND,
            saturation: 1.0,
            base_lightness: 0.5,
            top_lightness: 0.7,
            bar_gap: 1.0,
        }
    }
}

impl From<&MeterConfig> for SpectrumConfig {
    fn from(meter: &MeterConfig) -> Self {
        Self {
            width: meter.spectrum_width,
            height: meter.spectrum_height,
            ..Default::default()
        }
    }
}

/// Hue for bin `index` of `count`, in degrees
#[inline]
pub fn bin_hue(index: usize, count: usize) -> f32 {
    if count == 0 {
        return 0.0;
    }
    index as f32 / count as f32 * 360.0
}

/// Draw the spectrum into `out`, replacing its previous contents
pub fn build_spectrum(bins: &[u8], config: &SpectrumConfig, out: &mut DrawList) {
    let (width, height) = (config.width, config.height);
    out.reset(width, height);
    out.fill_rect(Rect::new(0.0, 0.0, width, height), Fill::Solid(config.background));

    if bins.is_empty() {
        return;
    }

    let slot = width / bins.len() as f32;
    // Bars narrower than the gap are drawn touching
    let bar_width = if slot > config.bar_gap {
        slot - config.bar_gap
    } else {
        slot
    };
    for (i, &value) in bins.iter().enumerate() {
        let bar_height = value as f32 / 255.0 * height;
        if bar_height <= 0.0 {
            continue;
        }
        let x = i as f32 * slot;
        let hue = bin_hue(i, bins.len());
        out.fill_rect(
            Rect::new(x, height - bar_height, bar_width, bar_height),
            Fill::Ramp {
                start: [x, height],
                end: [x, height - bar_height],
                from: Color::from_hsl(hue, config.saturation, config.base_lightness),
                to: Color::from_hsl(hue, config.saturation, config.top_lightness),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bw_core::AnalyserConfig;

    #[test]
    fn test_background_only_for_silence() {
        let mut list = DrawList::default();
        build_spectrum(&[0; 16], &SpectrumConfig::default(), &mut list);
        assert_eq!(list.len(), 1);
        let (rect, fill) = list.rects().next().unwrap();
        assert_eq!(*rect, Rect::new(0.0, 0.0, 600.0, 200.0));
        assert_eq!(*fill, Fill::Solid(Color::BACKGROUND));
    }

    #[test]
    fn test_bar_geometry() {
        let config = SpectrumConfig {
            width: 400.0,
            height: 100.0,
            ..Default::default()
        };
        let bins = [255, 0, 51, 0];
        let mut list = DrawList::default();
        build_spectrum(&bins, &config, &mut list);

        let bars: Vec<_> = list.rects().skip(1).collect();
        assert_eq!(bars.len(), 2);

        let (full, _) = bars[0];
        assert_relative_eq!(full.x, 0.0);
        assert_relative_eq!(full.y, 0.0);
        assert_relative_eq!(full.width, 99.0);
        assert_relative_eq!(full.height, 100.0);

        let (fifth, fill) = bars[1];
        assert_relative_eq!(fifth.x, 200.0);
        assert_relative_eq!(fifth.height, 20.0);
        assert_relative_eq!(fifth.y, 80.0);

        // Third of four bins sits at 180°
        let base = fill.color_at(200.0, 100.0);
        let cyan = Color::from_hsl(180.0, 1.0, 0.5);
        assert_relative_eq!(base.g, cyan.g);
        assert_relative_eq!(base.b, cyan.b);
    }

    #[test]
    fn test_default_bin_count_draws_every_bar() {
        let config = SpectrumConfig::from(&MeterConfig::default());
        let bin_count = AnalyserConfig::default().fft_size / 2;
        let bins = vec![128u8; bin_count];
        let mut list = DrawList::default();
        build_spectrum(&bins, &config, &mut list);

        let bars: Vec<_> = list.rects().skip(1).collect();
        assert_eq!(bars.len(), bin_count);
        assert!(bars.iter().all(|(rect, _)| !rect.is_empty()));
        let (last, _) = bars[bin_count - 1];
        assert!(last.right() <= config.width + 1e-3);

        let mut vertices = Vec::new();
        list.tessellate(&mut vertices);
        assert_eq!(vertices.len(), 6 * (bin_count + 1));
    }

    #[test]
    fn test_gradient_brightens_upward() {
        let mut list = DrawList::default();
        build_spectrum(&[200], &SpectrumConfig::default(), &mut list);
        let (rect, fill) = list.rects().nth(1).unwrap();
        let bottom = fill.color_at(rect.x, rect.bottom());
        let top = fill.color_at(rect.x, rect.y);
        let lum = |c: Color| c.r + c.g + c.b;
        assert!(lum(top) > lum(bottom));
    }

    #[test]
    fn test_hue_spans_bins() {
        assert_eq!(bin_hue(0, 1024), 0.0);
        assert_relative_eq!(bin_hue(512, 1024), 180.0);
        assert!(bin_hue(1023, 1024) < 360.0);
        assert_eq!(bin_hue(3, 0), 0.0);
    }

    #[test]
    fn test_from_meter_config() {
        let config = SpectrumConfig::from(&MeterConfig::default());
        assert_eq!(config.width, 600.0);
        assert_eq!(config.height, 200.0);
    }
}
