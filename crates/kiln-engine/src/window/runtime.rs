use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::config::RendererConfig;
use crate::core::{FrameControl, Renderer, RendererEvent};
use crate::device::{Gpu, GpuInit, WgpuBackend};

/// Renderer driven by a window surface.
pub type WindowRenderer<'w> = Renderer<WgpuBackend<'w>>;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub gpu: GpuInit,
    pub renderer: RendererConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "kiln".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            gpu: GpuInit::default(),
            renderer: RendererConfig::default(),
        }
    }
}

/// Application callbacks driven by [`Runtime`].
pub trait App {
    /// Called once the window and renderer exist, before the first frame.
    /// Shader registration and static uploads belong here.
    fn setup(&mut self, _renderer: &mut WindowRenderer<'_>) -> Result<()> {
        Ok(())
    }

    /// Records one frame. Only called while the frame is recording.
    fn draw(&mut self, renderer: &mut WindowRenderer<'_>);

    /// Raw window events, seen before the renderer translates them.
    fn on_window_event(&mut self, _event: &WindowEvent) -> FrameControl {
        FrameControl::Continue
    }
}

/// Single-window event loop.
pub struct Runtime;

impl Runtime {
    pub fn run<A>(config: RuntimeConfig, app: A) -> Result<()>
    where
        A: App + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            app,
            entry: None,
            exit_requested: false,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    renderer: WindowRenderer<'this>,
}

struct AppState<A: App + 'static> {
    config: RuntimeConfig,
    app: A,
    entry: Option<WindowEntry>,
    exit_requested: bool,
}

impl<A: App + 'static> AppState<A> {
    fn create_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.config.gpu.clone();
        let renderer_config = self.config.renderer.clone();

        let mut entry = WindowEntry::try_new(window, |window| {
            let size = window.inner_size();
            Gpu::new_blocking(window, gpu_init).map(|gpu| {
                Renderer::new(
                    WgpuBackend::new(gpu),
                    renderer_config,
                    size.width,
                    size.height,
                    window.scale_factor() as f32,
                )
            })
        })?;

        let app = &mut self.app;
        entry.with_renderer_mut(|renderer| app.setup(renderer))?;
        Ok(entry)
    }

    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        // Renderer (and its GPU resources) go before the window.
        self.entry = None;
        event_loop.exit();
    }
}

impl<A: App + 'static> ApplicationHandler for AppState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }

        match self.create_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.entry = Some(entry);
            }
            Err(e) => {
                log::error!("failed to create window: {e:#}");
                self.request_exit(event_loop);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw.
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if self.app.on_window_event(&event) == FrameControl::Exit {
            self.request_exit(event_loop);
            return;
        }

        let (app, entry) = (&mut self.app, &mut self.entry);
        let Some(entry) = entry.as_mut() else {
            return;
        };
        if entry.with_window(|w| w.id()) != window_id {
            return;
        }

        let control = match &event {
            WindowEvent::CloseRequested => FrameControl::Exit,

            WindowEvent::RedrawRequested => {
                entry.with_renderer_mut(|renderer| renderer.render_frame(|r| app.draw(r)))
            }

            other => {
                if let Some(ev) = RendererEvent::from_window_event(other) {
                    entry.with_renderer_mut(|renderer| renderer.handle_event(ev));
                    entry.with_window(|w| w.request_redraw());
                }
                FrameControl::Continue
            }
        };

        if control == FrameControl::Exit {
            self.request_exit(event_loop);
        }
    }
}
