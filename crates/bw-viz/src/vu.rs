//! VU meter
//!
//! Horizontal bar on a −60..0 dB scale. The RMS bar is `min(rms·width, width)`
//! wide and ramps green → amber → red; the peak marker is a 2 px white tick.
//! Gridlines mark −12 dB and −6 dB, and a red line marks full scale.

use bw_core::{METER_FLOOR_DB, MeterConfig};

use crate::common::{Color, Rect};
use crate::draw::{DrawList, Fill, GradientStop};

const BAR_HEIGHT: f32 = 20.0;
const MARKER_WIDTH: f32 = 2.0;
const MARKER_HEIGHT: f32 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VuConfig {
    pub width: f32,
    pub height: f32,
    pub background: Color,
    /// Bottom of the gridline scale, in dB
    pub range_db: f32,
    pub gridlines_db: Vec<f32>,
}

impl Default for VuConfig {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 60.0,
            background: Color::BACKGROUND,
            range_db: METER_FLOOR_DB as f32,
            gridlines_db: vec![-12.0, -6.0],
        }
    }
}

impl From<&MeterConfig> for VuConfig {
    fn from(meter: &MeterConfig) -> Self {
        Self {
            width: meter.vu_width,
            height: meter.vu_height,
            range_db: meter.floor_db as f32,
            ..Default::default()
        }
    }
}

impl VuConfig {
    /// X position of a dB gridline
    pub fn gridline_x(&self, db: f32) -> f32 {
        (1.0 - db / self.range_db) * self.width
    }
}

fn level_width(level: f64, width: f32) -> f32 {
    let level = if level.is_finite() {
        level.max(0.0)
    } else {
        log::trace!("[VU] non-finite level {level}");
        0.0
    };
    (level as f32 * width).min(width)
}

/// Draw the meter for linear `rms` and `peak` (0..1) into `out`
pub fn build_vu_meter(rms: f64, peak: f64, config: &VuConfig, out: &mut DrawList) {
    let (width, height) = (config.width, config.height);
    out.reset(width, height);
    out.fill_rect(Rect::new(0.0, 0.0, width, height), Fill::Solid(config.background));

    let rms_width = level_width(rms, width);
    out.fill_rect(
        Rect::new(0.0, height / 2.0 - BAR_HEIGHT / 2.0, rms_width, BAR_HEIGHT),
        Fill::LinearGradient {
            start: [0.0, 0.0],
            end: [rms_width, 0.0],
            stops: vec![
                GradientStop::new(0.0, Color::GREEN),
                GradientStop::new(0.7, Color::AMBER),
                GradientStop::new(1.0, Color::RED),
            ],
        },
    );

    let peak_width = level_width(peak, width);
    out.fill_rect(
        Rect::new(
            (peak_width - MARKER_WIDTH).max(0.0),
            height / 2.0 - MARKER_HEIGHT / 2.0,
            MARKER_WIDTH,
            MARKER_HEIGHT,
        ),
        Fill::Solid(Color::WHITE),
    );

    for &db in &config.gridlines_db {
        let x = config.gridline_x(db);
        out.line([x, 0.0], [x, height], Color::GRID, 1.0);
    }
    out.line([width, 0.0], [width, height], Color::RED, 1.0);
}
