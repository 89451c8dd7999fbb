//! Frame rendering
//!
//! Each frame clears the four edge strips of the free buffer, draws one bar
//! per band, submits the buffer with the strips as damage and swaps the
//! buffer roles. Everything drawn is mirrored left to right at the pixel
//! level; top and bottom symmetry comes from the layout.

mod canvas;
mod scale;

use log::{debug, trace};

use self::canvas::{Canvas, snap_end, snap_start};
use crate::app::Shutdown;
use crate::audio::SpectrumSnapshot;
use crate::config::Config;
use crate::geometry::{Bar, Corner, Edge, Extent, Layout};
use crate::output::{Damage, OutputSurface, Presenter};

pub use self::scale::ScaleSmoother;

/// The four edge strips a frame can touch
pub fn damage(width: i32, height: i32, max_bar_height: i32) -> [Damage; 4] {
    [
        Damage {
            x: 0,
            y: 0,
            width,
            height: max_bar_height,
        },
        Damage {
            x: 0,
            y: 0,
            width: max_bar_height,
            height,
        },
        Damage {
            x: 0,
            y: height - max_bar_height,
            width,
            height: max_bar_height,
        },
        Damage {
            x: width - max_bar_height,
            y: 0,
            width: max_bar_height,
            height,
        },
    ]
}

pub struct FrameRenderer {
    noise_threshold: f32,
    /// Premultiplied ARGB
    color: u32,
    shutdown: Shutdown,
}

impl FrameRenderer {
    pub fn new(config: &Config, shutdown: Shutdown) -> Self {
        Self {
            noise_threshold: config.noise_threshold,
            color: config.color.argb(),
            shutdown,
        }
    }

    /// Pixel height for a band, or `None` when it falls under the noise
    /// threshold
    fn bar_height(&self, amplitude: f32, scale: f32, max_bar_height: i32) -> Option<i32> {
        let height = amplitude / scale;
        if !(height >= self.noise_threshold) {
            return None;
        }
        let height = if height < 1.0 {
            (height - self.noise_threshold) / (1.0 - self.noise_threshold)
        } else {
            1.0
        };
        let pixels = (height * max_bar_height as f32).round() as i32;
        (pixels > 0).then_some(pixels)
    }

    /// Draw and submit one frame. Returns whether another frame was
    /// requested from the presenter.
    pub fn render_frame<P: Presenter>(
        &self,
        surface: &mut OutputSurface<P>,
        spectrum: &SpectrumSnapshot,
    ) -> bool {
        let OutputSurface {
            geometry,
            style,
            layout,
            buffers,
            frame_scheduled,
            scale,
            presenter,
            ..
        } = surface;
        *frame_scheduled = false;

        let (Some(geometry), Some(layout), Some(buffers)) = (geometry, layout.as_ref(), buffers)
        else {
            return false;
        };
        let Some((width, height)) = geometry.buffer_size() else {
            return false;
        };
        let running = !self.shutdown.is_requested();

        let Some(pixels) = presenter.canvas(&buffers.free) else {
            trace!("Free buffer still held by the compositor; skipping frame");
            presenter.idle_commit(running);
            *frame_scheduled = running;
            return running;
        };

        let max_bar_height = style.bar_height;
        let damage = damage(width as i32, height as i32, max_bar_height);
        let current_scale = scale.update(spectrum.peak);

        let mut canvas = Canvas::new(pixels, width, height);
        for strip in &damage {
            canvas.clear(strip);
        }
        for (index, &amplitude) in spectrum.bands.iter().enumerate().take(layout.bars.len()) {
            if let Some(bar_height) = self.bar_height(amplitude, current_scale, max_bar_height) {
                draw_layout_bar(&mut canvas, layout, index, bar_height, max_bar_height, self.color);
            }
        }

        let more = running && (!spectrum.silent || spectrum.has_residual());
        match presenter.submit(&buffers.free, &damage, more) {
            Ok(()) => {
                buffers.swap();
                *frame_scheduled = more;
                more
            }
            Err(err) => {
                debug!("{err}; retrying next frame");
                presenter.idle_commit(running);
                *frame_scheduled = running;
                running
            }
        }
    }
}

/// Upper-half bars are drawn as their lower-half source reflected row for
/// row, so a bar and its mirror always cover the same pixels.
fn draw_layout_bar(
    canvas: &mut Canvas<'_>,
    layout: &Layout,
    index: usize,
    bar_height: i32,
    max_bar_height: i32,
    color: u32,
) {
    let (source, flipped) = match layout.mirror_source(index) {
        Some(source) => (source, true),
        None => (index, false),
    };
    let Some(bar) = layout.bars.get(source) else {
        return;
    };
    canvas.set_flipped(flipped);
    draw_bar(canvas, bar, bar_height, max_bar_height, color);
    canvas.set_flipped(false);
}

fn draw_bar(canvas: &mut Canvas<'_>, bar: &Bar, bar_height: i32, max_bar_height: i32, color: u32) {
    match *bar {
        Bar::Straight { edge, extent } => {
            draw_straight(canvas, edge, extent, bar_height, color)
        }
        Bar::Skewed { edge, base, top } => {
            draw_skewed(canvas, edge, base, top, bar_height, max_bar_height, color)
        }
        Bar::Corner { corner, base, top } => {
            draw_corner(canvas, corner, base, top, bar_height, max_bar_height, color)
        }
    }
}

fn draw_straight(canvas: &mut Canvas<'_>, edge: Edge, extent: Extent, bar_height: i32, color: u32) {
    let (width, height) = (canvas.width(), canvas.height());
    match edge {
        Edge::Bottom | Edge::Top => {
            let (x_start, x_end) = (snap_start(extent.start), snap_end(extent.end));
            let rows = if edge == Edge::Bottom {
                height - bar_height..height
            } else {
                0..bar_height
            };
            for y in rows {
                canvas.fill_row_mirrored(y, x_start, x_end, color);
            }
        }
        Edge::Left | Edge::Right => {
            let (y_start, y_end) = (snap_start(extent.start), snap_end(extent.end));
            let columns = if edge == Edge::Left {
                0..bar_height
            } else {
                width - bar_height..width
            };
            for x in columns {
                canvas.fill_column_mirrored(x, y_start, y_end, color);
            }
        }
    }
}

fn draw_skewed(
    canvas: &mut Canvas<'_>,
    edge: Edge,
    base: Extent,
    top: Extent,
    bar_height: i32,
    max_bar_height: i32,
    color: u32,
) {
    let (width, height) = (canvas.width(), canvas.height());
    let max = max_bar_height as f32;
    for depth in 0..bar_height {
        let t = depth as f32 / max;
        let start = base.start + (top.start - base.start) * t;
        let end = base.end + (top.end - base.end) * t;
        match edge {
            Edge::Bottom => {
                canvas.fill_row_mirrored(height - 1 - depth, snap_start(start), snap_end(end), color)
            }
            Edge::Top => canvas.fill_row_mirrored(depth, snap_start(start), snap_end(end), color),
            Edge::Left => {
                canvas.fill_column_mirrored(depth, snap_start(start), snap_end(end), color)
            }
            Edge::Right => canvas.fill_column_mirrored(
                width - 1 - depth,
                snap_start(start),
                snap_end(end),
                color,
            ),
        }
    }
}

/// Wedge filled row by row outwards from the horizontal edge. Its inner
/// side follows the same taper as skewed bars up to the bar height, then
/// extrapolates towards the point where the wedge meets the vertical edge.
fn draw_corner(
    canvas: &mut Canvas<'_>,
    corner: Corner,
    base: Extent,
    top: Extent,
    bar_height: i32,
    max_bar_height: i32,
    color: u32,
) {
    let height = canvas.height();
    let max = max_bar_height as f32;
    let reached = bar_height as f32 / max;
    let bar_top = base.start + (top.start - base.start) * reached;
    let bar_edge = base.end + (top.end - base.end) * reached;
    let bottom = matches!(corner, Corner::BottomLeft | Corner::BottomRight);
    let shape_height = if bottom {
        height as f32 - bar_top
    } else {
        bar_top
    };

    for depth in 0..shape_height.round() as i32 {
        let (edge_distance, row) = if bottom {
            ((height - depth) as f32, height - 1 - depth)
        } else {
            (depth as f32, depth)
        };

        let x_start = ((edge_distance - base.start) / (top.start - base.start) * max).max(0.0);
        let x_end = if depth > max_bar_height {
            max
        } else if depth > bar_height {
            bar_edge
                + (bar_height as f32 - bar_edge) * (depth - bar_height) as f32
                    / (shape_height - bar_height as f32)
        } else {
            base.end + (top.end - base.end) * depth as f32 / max
        };

        let (x_start, x_end) = (x_start.round() as i32, x_end.round() as i32);
        if matches!(corner, Corner::BottomRight | Corner::TopRight) {
            let width = canvas.width();
            canvas.fill_row_mirrored(row, width - x_end, width - x_start, color);
        } else {
            canvas.fill_row_mirrored(row, x_start, x_end, color);
        }
    }
}
