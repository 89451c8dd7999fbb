//! Per-output drawing state and the presentation seam
//!
//! An [`OutputSurface`] owns everything one display needs: its geometry, its
//! bar layout and a pair of pixel buffers. The [`Presenter`] behind it hands
//! out buffers and takes finished frames; the Wayland one lives in
//! `crate::wayland`.

use log::debug;

use crate::error::WavError;
use crate::geometry::{BarStyle, Layout, layout_bars};
use crate::render::ScaleSmoother;

/// Buffer-space rectangle reported as changed on submit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Acquires, exposes and submits pixel buffers for one surface
pub trait Presenter {
    type Buffer;

    /// A zeroed ARGB8888 buffer of `width` x `height` pixels
    fn create_buffer(&mut self, width: u32, height: u32) -> Result<Self::Buffer, WavError>;

    /// Writable pixels, or `None` while the compositor still holds the buffer
    fn canvas(&mut self, buffer: &Self::Buffer) -> Option<&mut [u8]>;

    /// Present `buffer`, optionally asking for a frame callback
    fn submit(
        &mut self,
        buffer: &Self::Buffer,
        damage: &[Damage],
        next_frame: bool,
    ) -> Result<(), WavError>;

    /// Commit without new content, optionally asking for a frame callback
    fn idle_commit(&mut self, next_frame: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
    pub scale: i32,
}

impl SurfaceGeometry {
    /// Size in device pixels, `None` on overflow
    pub fn buffer_size(&self) -> Option<(u32, u32)> {
        let scale = self.scale.max(1) as u32;
        Some((self.width.checked_mul(scale)?, self.height.checked_mul(scale)?))
    }
}

/// `free` is drawn into; `busy` was last handed to the compositor
#[derive(Debug)]
pub struct BufferPair<B> {
    pub free: B,
    pub busy: B,
}

impl<B> BufferPair<B> {
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.free, &mut self.busy);
    }
}

pub struct OutputSurface<P: Presenter> {
    pub(crate) geometry: Option<SurfaceGeometry>,
    /// Style in logical pixels
    base_style: BarStyle,
    /// Style in buffer pixels
    pub(crate) style: BarStyle,
    pub(crate) layout: Option<Layout>,
    pub(crate) buffers: Option<BufferPair<P::Buffer>>,
    pub(crate) frame_scheduled: bool,
    pub(crate) scale: ScaleSmoother,
    pub(crate) presenter: P,
}

impl<P: Presenter> OutputSurface<P> {
    /// An unconfigured surface; it draws nothing until [`Self::configure`]
    pub fn new(presenter: P, style: BarStyle) -> Self {
        Self {
            geometry: None,
            base_style: style,
            style,
            layout: None,
            buffers: None,
            frame_scheduled: false,
            scale: ScaleSmoother::default(),
            presenter,
        }
    }

    pub fn geometry(&self) -> Option<SurfaceGeometry> {
        self.geometry
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn bar_count(&self) -> usize {
        self.layout.as_ref().map_or(0, |layout| layout.bars.len())
    }

    pub fn is_renderable(&self) -> bool {
        self.layout.is_some() && self.buffers.is_some()
    }

    pub fn is_frame_scheduled(&self) -> bool {
        self.frame_scheduled
    }

    /// Renderable and not already waiting on a frame callback
    pub fn should_draw_now(&self) -> bool {
        self.is_renderable() && !self.frame_scheduled
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Lay out bars and allocate buffers for a new size.
    ///
    /// An infeasible layout leaves the surface inert (no bars, no buffers)
    /// until a later resize succeeds. A failed allocation leaves the
    /// previous bars and buffers untouched; the caller drops the surface.
    pub fn configure(&mut self, geometry: SurfaceGeometry) -> Result<(), WavError> {
        let scaled = self.scaled_style(geometry.scale.max(1));
        let layout = geometry
            .buffer_size()
            .ok_or_else(|| WavError::LayoutInfeasible(format!("{geometry:?} overflows")))
            .and_then(|(width, height)| {
                let style = scaled.ok_or_else(|| {
                    WavError::LayoutInfeasible(format!("bar style overflows at scale {}", geometry.scale))
                })?;
                Ok((width, height, style, layout_bars(width, height, &style)?))
            });
        let (width, height, style, layout) = match layout {
            Ok(configured) => configured,
            Err(err) => {
                self.geometry = Some(geometry);
                self.layout = None;
                self.buffers = None;
                self.frame_scheduled = false;
                return Err(err);
            }
        };

        let free = self.presenter.create_buffer(width, height)?;
        let busy = self.presenter.create_buffer(width, height)?;
        debug!(
            "Configured {width}x{height} surface with {} bars",
            layout.bars.len()
        );

        self.geometry = Some(geometry);
        self.style = style;
        self.layout = Some(layout);
        self.buffers = Some(BufferPair { free, busy });
        Ok(())
    }

    fn scaled_style(&self, scale: i32) -> Option<BarStyle> {
        Some(BarStyle {
            bar_width: self.base_style.bar_width.checked_mul(scale)?,
            bar_margin: self.base_style.bar_margin.checked_mul(scale)?,
            bar_height: self.base_style.bar_height.checked_mul(scale)?,
            roundness: self.base_style.roundness,
        })
    }
}
