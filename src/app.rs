//! Startup, the event loop, and teardown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result, anyhow};
use calloop::EventLoop;
use calloop::ping::{Ping, make_ping};
use log::{debug, info};
use smithay_client_toolkit::reexports::calloop_wayland_source::WaylandSource;
use wayland_client::Connection;
use wayland_client::globals::registry_queue_init;

use crate::audio::{AudioSource, SpectralAnalyzer};
use crate::config::Config;
use crate::wayland::WavApp;

/// Process-wide stop request, shared by the signal handler, the audio side
/// and the render loop. Requesting is idempotent.
#[derive(Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    /// First fatal error, if the stop was caused by one
    failure: Arc<OnceLock<String>>,
    waker: Option<Ping>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also ping the event loop so a blocked dispatch returns
    pub fn with_waker(mut self, waker: Ping) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        if let Some(waker) = &self.waker {
            waker.ping();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Stop because of an unrecoverable error; the first reason is kept
    pub fn fail(&self, reason: String) {
        let _ = self.failure.set(reason);
        self.request();
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }
}

pub fn run(config: Config) -> Result<()> {
    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;
    let (globals, mut event_queue) =
        registry_queue_init::<WavApp>(&conn).context("Failed to initialize Wayland registry")?;
    let qh = event_queue.handle();

    let mut event_loop: EventLoop<WavApp> =
        EventLoop::try_new().context("Failed to create event loop")?;
    let (shutdown_ping, shutdown_source) =
        make_ping().context("Failed to create shutdown ping")?;
    let shutdown = Shutdown::new().with_waker(shutdown_ping);

    let mut app = WavApp::new(&globals, &qh, config.clone(), shutdown.clone())?;

    // Outputs arrive on the first roundtrip, their initial sizes on the second
    event_queue
        .roundtrip(&mut app)
        .context("Wayland roundtrip failed")?;
    event_queue
        .roundtrip(&mut app)
        .context("Wayland roundtrip failed")?;
    info!("Drawing on {} output(s)", app.output_count());

    let source = AudioSource::open(config.device.as_deref(), config.wav.as_deref())?;
    let band_count = app.max_bar_count();
    if band_count.is_none() {
        debug!("No drawable surface yet; analyzing every frequency bin");
    }
    let analyzer = SpectralAnalyzer::new(
        source.sample_rate(),
        config.frequency_step,
        band_count,
        config.diminish_rate,
    )?;
    app.attach_spectrum(analyzer.spectrum());

    let handle = event_loop.handle();
    WaylandSource::new(conn.clone(), event_queue)
        .insert(handle.clone())
        .map_err(|e| anyhow!("Failed to register Wayland source: {}", e.error))?;

    let (wake_ping, wake_source) = make_ping().context("Failed to create wake ping")?;
    handle
        .insert_source(wake_source, |_, _, app: &mut WavApp| app.wake())
        .map_err(|e| anyhow!("Failed to register wake source: {}", e.error))?;
    handle
        .insert_source(shutdown_source, |_, _, _: &mut WavApp| {
            debug!("Shutdown requested");
        })
        .map_err(|e| anyhow!("Failed to register shutdown source: {}", e.error))?;

    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.request())
            .context("Failed to install signal handler")?;
    }

    let capture = source.start(analyzer, wake_ping, shutdown.clone())?;
    app.wake();

    while !shutdown.is_requested() {
        event_loop
            .dispatch(None, &mut app)
            .context("Event loop failed")?;
    }

    info!("Shutting down");
    drop(capture);
    drop(event_loop);
    drop(app);

    match shutdown.failure() {
        Some(reason) => Err(anyhow!("{reason}")),
        None => Ok(()),
    }
}
