//! bw-viz: Meter visualizations for Brainwave Live
//!
//! Turns meter data into backend-agnostic draw lists:
//! - Spectrum bars (hue across bins, brightness gradient per bar)
//! - VU meter (RMS bar with color ramp, peak marker, dB gridlines)
//!
//! A [`RenderTarget`] receives the finished [`DrawList`]. Targets that want
//! triangles call [`DrawList::tessellate`] and upload the vertex slice as is.

pub mod common;
pub mod draw;
pub mod spectrum;
pub mod vu;

pub use common::{Color, Rect, RectVertex};
pub use draw::{DrawCommand, DrawList, Fill, GradientStop, RecordingTarget, RenderTarget};
pub use spectrum::{SpectrumConfig, build_spectrum};
pub use vu::{VuConfig, build_vu_meter};
