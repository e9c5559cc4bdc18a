//! Window creation and event handling via winit.
//!
//! [`AppState`] implements winit's [`ApplicationHandler`]: it creates the
//! window and the wgpu-backed [`Engine`] on resume, forwards resizes and
//! renders a frame per redraw.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use umbra_config::Config;
use umbra_render::{OverlayText, WgpuBackend};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::clock::FrameClock;
use crate::engine::Engine;
use crate::error::AppError;
use crate::live_config::LiveConfig;

/// Returns [`WindowAttributes`] based on the given configuration.
pub fn window_attributes_from_config(config: &Config) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(config.window.title.clone())
        .with_inner_size(LogicalSize::new(
            config.window.width as f64,
            config.window.height as f64,
        ))
}

/// Window title with the overlay text of the last frame appended.
pub fn title_with_overlay(base: &str, overlay: &str) -> String {
    if overlay.is_empty() {
        base.to_string()
    } else {
        format!("{base} - {overlay}")
    }
}

/// What a key press asks the application to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    ToggleScene,
    CycleDebugView,
}

/// Escape quits, Tab switches scene, F3 steps the debug overlay.
pub fn key_action(key: PhysicalKey) -> Option<KeyAction> {
    match key {
        PhysicalKey::Code(KeyCode::Escape) => Some(KeyAction::Quit),
        PhysicalKey::Code(KeyCode::Tab) => Some(KeyAction::ToggleScene),
        PhysicalKey::Code(KeyCode::F3) => Some(KeyAction::CycleDebugView),
        _ => None,
    }
}

/// Application state: the window, the engine rendering into it and the
/// config being watched.
pub struct AppState {
    config: LiveConfig,
    window: Option<Arc<Window>>,
    engine: Option<Engine>,
    overlay: Option<OverlayText>,
    clock: FrameClock,
    title: String,
    error: Option<AppError>,
}

impl AppState {
    pub fn new(config: LiveConfig) -> Self {
        Self {
            config,
            window: None,
            engine: None,
            overlay: None,
            clock: FrameClock::new(),
            title: String::new(),
            error: None,
        }
    }

    /// Record a fatal error and leave the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: AppError) {
        error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let config = self.config.effective();
        let window = Arc::new(event_loop.create_window(window_attributes_from_config(&config))?);
        let backend = WgpuBackend::new(Arc::clone(&window), config.window.vsync)?;
        self.overlay = Some(backend.overlay());
        self.engine = Some(Engine::new(Box::new(backend), &config)?);
        self.title = config.window.title;
        self.clock.reset();
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        match key_action(event.physical_key) {
            Some(KeyAction::Quit) => {
                info!("Escape pressed, shutting down");
                event_loop.exit();
            }
            Some(KeyAction::ToggleScene) => engine.toggle_scene(),
            Some(KeyAction::CycleDebugView) => engine.cycle_debug_view(),
            None => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let delta = self.clock.tick();
        if let Err(err) = engine.frame(delta) {
            self.fail(event_loop, err.into());
            return;
        }

        if let Some(config) = self.config.poll(delta) {
            if let Err(err) = engine.apply_config(&config) {
                warn!("Ignoring reloaded config: {err}");
            } else {
                self.title = config.window.title;
            }
        }

        if let (Some(window), Some(overlay)) = (&self.window, &self.overlay) {
            window.set_title(&title_with_overlay(&self.title, &overlay.summary()));
        }

        if engine.finished() {
            info!(frames = engine.frames(), "Frame limit reached");
            event_loop.exit();
        } else if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = self.engine.as_mut()
                    && let Err(err) = engine.resize(size.width, size.height)
                {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.on_key(event_loop, &event),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown();
        }
    }
}

/// Creates an event loop and runs the application until the window closes
/// or the frame limit is reached.
#[instrument(skip_all)]
pub fn run(config: LiveConfig) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    let mut app = AppState::new(config);
    event_loop.run_app(&mut app)?;
    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
