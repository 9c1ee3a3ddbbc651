use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use eframe::egui;
use egui::{Color32, ColorImage, FontId, TextureHandle, TextureOptions};
use log::{error, info};

use crate::components::ControlPanel;
use crate::error::LayerError;
use crate::ops::preview::PreviewFrame;
use crate::session::{Command, FrameInput, Session, Tick};

/// Interval between preview refreshes while idle.
const REFRESH: Duration = Duration::from_millis(30);

/// Window title for the active layer: `Tuner [i/n]: name`.
pub fn window_title(session: &Session) -> String {
    format!(
        "Tuner [{}/{}]: {}",
        session.state().layer_index + 1,
        session.layers().len(),
        session.active_layer().name
    )
}

/// Error that stopped the tuning session, shared with `main` once the window is gone.
pub type FailureSlot = Rc<RefCell<Option<LayerError>>>;

/// Exit code for a finished tuner run: failure if the window errored or the session stopped on an error.
pub fn exit_code(run: Result<(), eframe::Error>, failure: &FailureSlot) -> ExitCode {
    if let Err(e) = run {
        error!("window error: {}", e);
        return ExitCode::FAILURE;
    }
    match failure.borrow_mut().take() {
        Some(e) => {
            error!("Tuner stopped: {}", e);
            ExitCode::FAILURE
        }
        None => {
            info!("Tuner closed");
            ExitCode::SUCCESS
        }
    }
}

/// Maps this frame's key presses to a command. Text fields keep their keys.
fn shortcut(pressed: impl Fn(egui::Key) -> bool, wants_keyboard: bool) -> Option<Command> {
    if wants_keyboard {
        None
    } else if pressed(egui::Key::Q) || pressed(egui::Key::Escape) {
        Some(Command::Quit)
    } else if pressed(egui::Key::S) {
        Some(Command::Save)
    } else if pressed(egui::Key::N) {
        Some(Command::Advance)
    } else {
        None
    }
}

/// Header lines that still need painting when no font was found for the frame itself.
struct HeaderText {
    lines: [String; 2],
    header_height: u32,
}

pub struct TunerApp {
    session: Session,
    panel: ControlPanel,
    texture: Option<TextureHandle>,
    header: Option<HeaderText>,
    shown_layer: usize,
    finished: bool,
    failure: FailureSlot,
}

impl TunerApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, session: Session, failure: FailureSlot) -> Self {
        let panel = ControlPanel::new(&session.state().params);
        let shown_layer = session.state().layer_index;
        Self {
            session,
            panel,
            texture: None,
            header: None,
            shown_layer,
            finished: false,
            failure,
        }
    }

    /// Key presses for this frame; the first recognised key wins.
    fn key_command(ctx: &egui::Context) -> Option<Command> {
        let wants_keyboard = ctx.wants_keyboard_input();
        ctx.input(|i| shortcut(|key| i.key_pressed(key), wants_keyboard))
    }

    fn upload(&mut self, ctx: &egui::Context, frame: PreviewFrame) {
        let (w, h) = frame.image.dimensions();
        let image = ColorImage::from_rgba_unmultiplied([w as usize, h as usize], frame.image.as_raw());
        match &mut self.texture {
            Some(tex) => tex.set(image, TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("tuner_preview", image, TextureOptions::LINEAR)),
        }
        self.header = (!frame.text_drawn).then(|| HeaderText {
            lines: frame.lines,
            header_height: frame.header_height,
        });
    }

    fn finish(&mut self, ctx: &egui::Context) {
        self.finished = true;
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn show_preview(&self, ui: &mut egui::Ui) {
        let Some(tex) = &self.texture else {
            return;
        };
        let size = tex.size_vec2();
        let avail = ui.available_size();
        let scale = (avail.x / size.x).min(avail.y / size.y).min(1.0).max(0.01);
        let response = ui.image((tex.id(), size * scale));

        if let Some(header) = &self.header {
            let painter = ui.painter_at(response.rect);
            let band = header.header_height as f32 * scale;
            let origin = response.rect.min + egui::vec2(10.0 * scale, 0.0);
            painter.text(
                origin + egui::vec2(0.0, band * 0.2),
                egui::Align2::LEFT_TOP,
                &header.lines[0],
                FontId::proportional((20.0 * scale).max(8.0)),
                Color32::YELLOW,
            );
            painter.text(
                origin + egui::vec2(0.0, band * 0.6),
                egui::Align2::LEFT_TOP,
                &header.lines[1],
                FontId::proportional((16.0 * scale).max(8.0)),
                Color32::WHITE,
            );
        }
    }
}

impl eframe::App for TunerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.finished {
            return;
        }

        let close_requested = ctx.input(|i| i.viewport().close_requested());
        let mut command = Self::key_command(ctx);

        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            self.panel.show(ui);
            ui.horizontal(|ui| {
                if ui.button("Save (S)").clicked() {
                    command = command.or(Some(Command::Save));
                }
                if ui.button("Next layer (N)").clicked() {
                    command = command.or(Some(Command::Advance));
                }
                if ui.button("Quit (Q)").clicked() {
                    command = command.or(Some(Command::Quit));
                }
                if let Some(saved) = self.session.last_save() {
                    ui.label(format!("Last saved: {} ({:.1}%)", saved.path.display(), saved.saved_coverage));
                }
            });
            ui.add_space(4.0);
        });

        let input = FrameInput {
            controls: self.panel.read(),
            command,
            close_requested,
        };

        match self.session.tick(&input) {
            Ok(Tick::Frame(frame)) => self.upload(ctx, frame),
            Ok(Tick::Finished) => {
                info!("Closing tuner window");
                self.finish(ctx);
                return;
            }
            Err(e) => {
                error!("Tuning session stopped: {}", e);
                *self.failure.borrow_mut() = Some(e);
                self.finish(ctx);
                return;
            }
        }

        let layer_index = self.session.state().layer_index;
        if layer_index != self.shown_layer {
            self.shown_layer = layer_index;
            self.panel.reset(&self.session.state().params);
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(window_title(&self.session)));
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                ui.centered_and_justified(|ui| self.show_preview(ui));
            });

        ctx.request_repaint_after(REFRESH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_map_to_commands() {
        assert_eq!(shortcut(|k| k == egui::Key::S, false), Some(Command::Save));
        assert_eq!(shortcut(|k| k == egui::Key::N, false), Some(Command::Advance));
        assert_eq!(shortcut(|k| k == egui::Key::Escape, false), Some(Command::Quit));
        assert_eq!(shortcut(|_| false, false), None);
    }

    #[test]
    fn focused_text_field_swallows_shortcuts() {
        assert_eq!(shortcut(|k| k == egui::Key::S, true), None);
        assert_eq!(shortcut(|k| k == egui::Key::Q, true), None);
    }

    #[test]
    fn session_error_fails_the_run() {
        let failure: FailureSlot = Rc::default();
        assert_eq!(exit_code(Ok(()), &failure), ExitCode::SUCCESS);

        *failure.borrow_mut() = Some(LayerError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "proofs/Canopy.png is read-only",
        )));
        assert_eq!(exit_code(Ok(()), &failure), ExitCode::FAILURE);
    }
}
