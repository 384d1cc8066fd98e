use anyhow::Result;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use kiln_engine::coords::{Rect, Vec2};
use kiln_engine::core::FrameControl;
use kiln_engine::logging::{LoggingConfig, init_logging};
use kiln_engine::paint::Color;
use kiln_engine::render::ObjectData;
use kiln_engine::shader::RasterMode;
use kiln_engine::window::{App, Runtime, RuntimeConfig, WindowRenderer};

/// Draws a grid of shapes; `W` toggles wireframe, `Esc` quits.
#[derive(Default)]
struct Showcase {
    t: f32,
    wireframe: bool,
}

impl App for Showcase {
    fn setup(&mut self, renderer: &mut WindowRenderer<'_>) -> Result<()> {
        renderer.on_stats(|stats| {
            if stats.frame_index % 600 == 0 {
                log::info!(
                    "frame {}: {} groups, {} draw calls, {} instances, heap capacity {} bytes",
                    stats.frame_index,
                    stats.groups,
                    stats.draw_calls,
                    stats.instances,
                    stats.heap.total_capacity(),
                );
            }
        });
        Ok(())
    }

    fn draw(&mut self, r: &mut WindowRenderer<'_>) {
        self.t += 1.0 / 60.0;
        let view = r.viewport();

        let accent = Color::from_srgb_u8(0xe0, 0x6c, 0x3c, 0xff);
        let teal = Color::from_srgb_u8(0x2a, 0x9d, 0x8f, 0xff);
        let sand = Color::from_srgb_u8(0xe9, 0xc4, 0x6a, 0xc0);

        r.set_raster_mode(if self.wireframe { RasterMode::Line } else { RasterMode::Fill });

        let cell = 48.0;
        let cols = (view.width / cell) as u32;
        let rows = (view.height / cell) as u32;
        for y in 0..rows {
            for x in 0..cols {
                let origin = Vec2::new(x as f32 * cell, y as f32 * cell);
                let rect = Rect::new(origin.x + 4.0, origin.y + 4.0, cell - 8.0, cell - 8.0);
                match (x + y) % 3 {
                    0 => r.rect(rect, teal.with_opacity(0.35)),
                    1 => r.circle(origin + Vec2::splat(cell * 0.5), cell * 0.35, sand),
                    _ => r.rect_outline(rect, accent),
                };
            }
        }

        let wobble = ObjectData::translated(Vec2::new(self.t.sin() * 40.0, 0.0)).with_tint(Color::WHITE);
        let id = r.push_object(wobble);
        r.set_object(id);
        let c = Vec2::new(view.width * 0.5, view.height * 0.5);
        r.triangle(c + Vec2::new(0.0, -80.0), c + Vec2::new(70.0, 40.0), c + Vec2::new(-70.0, 40.0), accent);
        r.line(c + Vec2::new(-120.0, 60.0), c + Vec2::new(120.0, 60.0), Color::WHITE);
        r.point(c, Color::WHITE);
    }

    fn on_window_event(&mut self, event: &WindowEvent) -> FrameControl {
        if let WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state: ElementState::Pressed,
                    repeat: false,
                    ..
                },
            ..
        } = event
        {
            match code {
                KeyCode::Escape => return FrameControl::Exit,
                KeyCode::KeyW => self.wireframe = !self.wireframe,
                _ => {}
            }
        }
        FrameControl::Continue
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "kiln showcase".to_string(),
        ..RuntimeConfig::default()
    };
    Runtime::run(config, Showcase::default())
}
