//! Wayland layer-shell integration
//!
//! One bottom-layer surface per accepted output, anchored to all four edges,
//! click-through and without an exclusive zone. Each surface is backed by an
//! [`OutputSurface`] whose [`Presenter`] is a [`LayerPresenter`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::{
        WaylandSurface,
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{
        Shm, ShmHandler,
        slot::{Buffer, SlotPool},
    },
};
use wayland_client::{
    Connection, QueueHandle,
    globals::GlobalList,
    protocol::{wl_output, wl_shm, wl_surface},
};

use crate::app::Shutdown;
use crate::audio::{SharedSpectrum, SpectrumSnapshot};
use crate::config::Config;
use crate::error::WavError;
use crate::output::{Damage, OutputSurface, Presenter, SurfaceGeometry};
use crate::render::FrameRenderer;

const NAMESPACE: &str = "panel";

/// Grown on demand by the pool when a bigger output shows up
const INITIAL_POOL_SIZE: usize = 1920 * 1080 * 4 * 2;

/// Shared-memory buffers attached to one layer surface
pub struct LayerPresenter {
    layer: LayerSurface,
    pool: SlotPool,
    qh: QueueHandle<WavApp>,
}

impl LayerPresenter {
    fn wl_surface(&self) -> &wl_surface::WlSurface {
        self.layer.wl_surface()
    }

    fn request_frame(&self) {
        let surface = self.wl_surface();
        surface.frame(&self.qh, surface.clone());
    }
}

impl Presenter for LayerPresenter {
    type Buffer = Buffer;

    fn create_buffer(&mut self, width: u32, height: u32) -> Result<Buffer, WavError> {
        let (buffer, canvas) = self
            .pool
            .create_buffer(
                width as i32,
                height as i32,
                width as i32 * 4,
                wl_shm::Format::Argb8888,
            )
            .map_err(|e| WavError::AllocationFailure(format!("{width}x{height} buffer: {e:?}")))?;
        canvas.fill(0);
        Ok(buffer)
    }

    fn canvas(&mut self, buffer: &Buffer) -> Option<&mut [u8]> {
        buffer.canvas(&mut self.pool)
    }

    fn submit(&mut self, buffer: &Buffer, damage: &[Damage], next_frame: bool) -> Result<(), WavError> {
        let surface = self.wl_surface();
        buffer
            .attach_to(surface)
            .map_err(|e| WavError::PresentationRejected(format!("{e:?}")))?;
        for rect in damage {
            surface.damage_buffer(rect.x, rect.y, rect.width, rect.height);
        }
        if next_frame {
            self.request_frame();
        }
        surface.commit();
        Ok(())
    }

    fn idle_commit(&mut self, next_frame: bool) {
        if next_frame {
            self.request_frame();
        }
        self.wl_surface().commit();
    }
}

struct OutputEntry {
    output: wl_output::WlOutput,
    name: Option<String>,
    scale: i32,
    surface: OutputSurface<LayerPresenter>,
}

impl OutputEntry {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn owns(&self, surface: &wl_surface::WlSurface) -> bool {
        self.surface.presenter().wl_surface() == surface
    }
}

/// Wayland client state driven by the event loop
pub struct WavApp {
    registry_state: RegistryState,
    output_state: OutputState,
    compositor_state: CompositorState,
    shm: Shm,
    layer_shell: LayerShell,

    config: Config,
    renderer: FrameRenderer,
    outputs: Vec<OutputEntry>,

    spectrum: Option<Arc<SharedSpectrum>>,
    snapshot: SpectrumSnapshot,
}

impl WavApp {
    pub fn new(
        globals: &GlobalList,
        qh: &QueueHandle<Self>,
        config: Config,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let registry_state = RegistryState::new(globals);
        let output_state = OutputState::new(globals, qh);
        let compositor_state =
            CompositorState::bind(globals, qh).context("wl_compositor is not available")?;
        let shm = Shm::bind(globals, qh).context("wl_shm is not available")?;
        let layer_shell = LayerShell::bind(globals, qh)
            .context("Compositor does not support the wlr layer shell")?;
        let renderer = FrameRenderer::new(&config, shutdown);

        Ok(Self {
            registry_state,
            output_state,
            compositor_state,
            shm,
            layer_shell,
            config,
            renderer,
            outputs: Vec::new(),
            spectrum: None,
            snapshot: SpectrumSnapshot {
                silent: true,
                ..SpectrumSnapshot::default()
            },
        })
    }

    /// Largest bar count over the configured surfaces, if any are drawable
    pub fn max_bar_count(&self) -> Option<usize> {
        self.outputs
            .iter()
            .map(|entry| entry.surface.bar_count())
            .max()
            .filter(|&count| count > 0)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn attach_spectrum(&mut self, spectrum: Arc<SharedSpectrum>) {
        self.spectrum = Some(spectrum);
    }

    /// Redraw every surface that is not already waiting on a frame callback
    pub fn wake(&mut self) {
        for index in 0..self.outputs.len() {
            if self.outputs[index].surface.should_draw_now() {
                self.redraw(index);
            }
        }
    }

    fn redraw(&mut self, index: usize) {
        if let Some(spectrum) = &self.spectrum {
            spectrum.snapshot_into(Instant::now(), &mut self.snapshot);
        }
        if let Some(entry) = self.outputs.get_mut(index) {
            self.renderer.render_frame(&mut entry.surface, &self.snapshot);
        }
    }

    fn position_of(&self, surface: &wl_surface::WlSurface) -> Option<usize> {
        self.outputs.iter().position(|entry| entry.owns(surface))
    }

    fn add_output(
        &mut self,
        qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
        name: Option<String>,
        scale: i32,
    ) -> Result<(), WavError> {
        let pool = SlotPool::new(INITIAL_POOL_SIZE, &self.shm)
            .map_err(|e| WavError::AllocationFailure(format!("shm pool: {e}")))?;
        let region = Region::new(&self.compositor_state)
            .map_err(|e| WavError::AllocationFailure(format!("input region: {e}")))?;

        let surface = self.compositor_state.create_surface(qh);
        let layer = self.layer_shell.create_layer_surface(
            qh,
            surface,
            Layer::Bottom,
            Some(NAMESPACE),
            Some(&output),
        );
        layer.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
        layer.set_exclusive_zone(-1);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer.set_size(0, 0);
        layer.wl_surface().set_input_region(Some(region.wl_region()));
        layer.wl_surface().set_buffer_scale(scale);
        layer.wl_surface().commit();

        let presenter = LayerPresenter {
            layer,
            pool,
            qh: qh.clone(),
        };
        self.outputs.push(OutputEntry {
            output,
            name,
            scale,
            surface: OutputSurface::new(presenter, self.config.bar_style()),
        });
        Ok(())
    }

    fn reconfigure(&mut self, index: usize, geometry: SurfaceGeometry) {
        let Some(entry) = self.outputs.get_mut(index) else {
            return;
        };
        match entry.surface.configure(geometry) {
            Ok(()) => {
                info!(
                    "Output {}: {}x{} @{}x, {} bars",
                    entry.label(),
                    geometry.width,
                    geometry.height,
                    geometry.scale,
                    entry.surface.bar_count()
                );
                // a pending frame callback draws with the new layout
                if entry.surface.should_draw_now() {
                    self.redraw(index);
                }
            }
            Err(err @ WavError::LayoutInfeasible(_)) => {
                warn!("Output {}: {err}; not drawing until resized", entry.label());
            }
            Err(err) => {
                warn!("Output {}: {err}; dropping surface", entry.label());
                self.outputs.remove(index);
            }
        }
    }
}

delegate_compositor!(WavApp);
delegate_output!(WavApp);
delegate_shm!(WavApp);
delegate_layer!(WavApp);
delegate_registry!(WavApp);

impl CompositorHandler for WavApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        surface: &wl_surface::WlSurface,
        new_factor: i32,
    ) {
        let Some(index) = self.position_of(surface) else {
            return;
        };
        let entry = &mut self.outputs[index];
        if entry.scale == new_factor {
            return;
        }
        debug!("Output {}: scale {} -> {new_factor}", entry.label(), entry.scale);
        entry.scale = new_factor;
        surface.set_buffer_scale(new_factor);
        if let Some(geometry) = entry.surface.geometry() {
            self.reconfigure(
                index,
                SurfaceGeometry {
                    scale: new_factor,
                    ..geometry
                },
            );
        }
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        if let Some(index) = self.position_of(surface) {
            self.redraw(index);
        }
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WavApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        let info = self.output_state.info(&output);
        let name = info.as_ref().and_then(|info| info.name.clone());
        let scale = info.as_ref().map_or(1, |info| info.scale_factor.max(1));

        if !self.config.wants_output(name.as_deref()) {
            info!("Skipping output {}", name.as_deref().unwrap_or("<unnamed>"));
            return;
        }
        if let Err(err) = self.add_output(qh, output, name.clone(), scale) {
            warn!(
                "Output {}: {err}; not drawing on it",
                name.as_deref().unwrap_or("<unnamed>")
            );
        }
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        if let Some(index) = self.outputs.iter().position(|entry| entry.output == output) {
            let entry = self.outputs.remove(index);
            info!("Output {} removed", entry.label());
        }
    }
}

impl LayerShellHandler for WavApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        if let Some(index) = self.position_of(layer.wl_surface()) {
            let entry = self.outputs.remove(index);
            info!("Output {}: surface closed by compositor", entry.label());
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let Some(index) = self.position_of(layer.wl_surface()) else {
            return;
        };
        let entry = &self.outputs[index];

        let (mut width, mut height) = configure.new_size;
        if width == 0 || height == 0 {
            let logical = self
                .output_state
                .info(&entry.output)
                .and_then(|info| info.logical_size);
            match logical {
                Some((w, h)) if w > 0 && h > 0 => (width, height) = (w as u32, h as u32),
                _ => {
                    warn!("Output {}: compositor sent an empty size", entry.label());
                    return;
                }
            }
        }

        let geometry = SurfaceGeometry {
            width,
            height,
            scale: entry.scale,
        };
        if entry.surface.geometry() == Some(geometry) && entry.surface.is_renderable() {
            return;
        }
        self.reconfigure(index, geometry);
    }
}

impl ShmHandler for WavApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for WavApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }
    registry_handlers![OutputState];
}
