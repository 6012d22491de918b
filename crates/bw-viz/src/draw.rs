//! Draw lists and render targets

use crate::common::{Color, Rect, RectVertex};

/// Color stop on a gradient axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// How a shape is filled
#[derive(Debug, Clone, PartialEq)]
pub enum Fill {
    Solid(Color),
    /// Gradient along the axis `start -> end`, stops sorted by offset
    LinearGradient {
        start: [f32; 2],
        end: [f32; 2],
        stops: Vec<GradientStop>,
    },
    /// Two-color gradient along `start -> end`
    Ramp {
        start: [f32; 2],
        end: [f32; 2],
        from: Color,
        to: Color,
    },
}

impl Fill {
    /// Fill color at a point
    pub fn color_at(&self, x: f32, y: f32) -> Color {
        match self {
            Fill::Solid(color) => *color,
            Fill::LinearGradient { start, end, stops } => {
                let Some(first) = stops.first() else {
                    return Color::new(0.0, 0.0, 0.0, 0.0);
                };
                match axis_position(*start, *end, x, y) {
                    Some(t) => gradient_color(stops, t),
                    None => first.color,
                }
            }
            Fill::Ramp {
                start,
                end,
                from,
                to,
            } => match axis_position(*start, *end, x, y) {
                Some(t) => from.lerp(*to, t),
                None => *from,
            },
        }
    }
}

/// Projection of `(x, y)` onto the axis, 0 at `start` and 1 at `end`.
/// `None` for a degenerate axis.
fn axis_position(start: [f32; 2], end: [f32; 2], x: f32, y: f32) -> Option<f32> {
    let dx = end[0] - start[0];
    let dy = end[1] - start[1];
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return None;
    }
    Some(((x - start[0]) * dx + (y - start[1]) * dy) / len_sq)
}

fn gradient_color(stops: &[GradientStop], t: f32) -> Color {
    let mut prev = stops[0];
    if t <= prev.offset {
        return prev.color;
    }
    for &stop in &stops[1..] {
        if t <= stop.offset {
            let span = stop.offset - prev.offset;
            if span <= f32::EPSILON {
                return stop.color;
            }
            return prev.color.lerp(stop.color, (t - prev.offset) / span);
        }
        prev = stop;
    }
    prev.color
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect { rect: Rect, fill: Fill },
    Line {
        from: [f32; 2],
        to: [f32; 2],
        color: Color,
        width: f32,
    },
}

/// Ordered drawing for one frame of one surface
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    width: f32,
    height: f32,
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    /// Start a new frame, keeping the allocation
    pub fn reset(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
        self.commands.clear();
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn fill_rect(&mut self, rect: Rect, fill: Fill) {
        self.commands.push(DrawCommand::FillRect { rect, fill });
    }

    pub fn line(&mut self, from: [f32; 2], to: [f32; 2], color: Color, width: f32) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            color,
            width,
        });
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Filled rectangles, in draw order
    pub fn rects(&self) -> impl Iterator<Item = (&Rect, &Fill)> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::FillRect { rect, fill } => Some((rect, fill)),
            DrawCommand::Line { .. } => None,
        })
    }

    /// Two triangles per command, appended to `out`. Empty rects are skipped.
    pub fn tessellate(&self, out: &mut Vec<RectVertex>) {
        for command in &self.commands {
            match command {
                DrawCommand::FillRect { rect, fill } => {
                    if rect.is_empty() {
                        continue;
                    }
                    push_quad(out, rect, |x, y| fill.color_at(x, y));
                }
                DrawCommand::Line {
                    from,
                    to,
                    color,
                    width,
                } => {
                    let half = width * 0.5;
                    let rect = Rect::new(
                        from[0].min(to[0]) - half,
                        from[1].min(to[1]),
                        (to[0] - from[0]).abs() + width,
                        (to[1] - from[1]).abs().max(*width),
                    );
                    if rect.is_empty() {
                        continue;
                    }
                    push_quad(out, &rect, |_, _| *color);
                }
            }
        }
    }
}

fn push_quad(out: &mut Vec<RectVertex>, rect: &Rect, color_at: impl Fn(f32, f32) -> Color) {
    let (x0, y0, x1, y1) = (rect.x, rect.y, rect.right(), rect.bottom());
    let tl = RectVertex::new(x0, y0, color_at(x0, y0));
    let tr = RectVertex::new(x1, y0, color_at(x1, y0));
    let bl = RectVertex::new(x0, y1, color_at(x0, y1));
    let br = RectVertex::new(x1, y1, color_at(x1, y1));
    out.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
}

/// Sink for finished draw lists
pub trait RenderTarget {
    /// Drawing surface size in pixels
    fn size(&self) -> (f32, f32);

    fn submit(&mut self, list: &DrawList);
}

/// Target that keeps the last submitted frame
#[derive(Debug, Clone, Default)]
pub struct RecordingTarget {
    width: f32,
    height: f32,
    frames: u64,
    last: DrawList,
}

impl RecordingTarget {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            frames: 0,
            last: DrawList::new(width, height),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last(&self) -> &DrawList {
        &self.last
    }
}

impl RenderTarget for RecordingTarget {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn submit(&mut self, list: &DrawList) {
        self.last.clone_from(list);
        self.frames += 1;
    }
}
