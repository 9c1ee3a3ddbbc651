// ============================================================================
// Interactive tuning session
// ============================================================================
//
// The session is driven one frame at a time through `Session::tick` with a
// `FrameInput` snapshot (control readings + at most one command + the
// window-close flag). All decisions live in the pure `transition` function;
// `Session` owns the image data and carries out the resulting effects
// (writing proof images, printing parameter dumps, rendering the preview).

use std::io::Write;
use std::path::{Path, PathBuf};

use ab_glyph::FontArc;
use image::RgbaImage;
use log::{debug, info};
use thiserror::Error;

use crate::error::Result;
use crate::io;
use crate::layers::{Control, LayerDescriptor, LayerParams, LayerSet, ParamDump};
use crate::ops::color::HsvPlanes;
use crate::ops::mask::{self, BinaryMask};
use crate::ops::overlay;
use crate::ops::preview::{PreviewFrame, PreviewRenderer, DEFAULT_DISPLAY_WIDTH};
use crate::ops::refine;

/// Single-key actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Save,
    Advance,
    Quit,
}

/// Why a control could not be read this frame.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlError {
    #[error("control '{0}' has not been realized yet")]
    NotRealized(Control),
    #[error("control '{0}' is temporarily unavailable")]
    Unavailable(Control),
}

pub type ControlRead = std::result::Result<i32, ControlError>;

/// Everything the host observed during one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub controls: Vec<(Control, ControlRead)>,
    pub command: Option<Command>,
    pub close_requested: bool,
}

impl FrameInput {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn command(command: Command) -> Self {
        Self {
            command: Some(command),
            ..Self::default()
        }
    }

    pub fn closed() -> Self {
        Self {
            close_requested: true,
            ..Self::default()
        }
    }

    pub fn with_control(mut self, control: Control, read: ControlRead) -> Self {
        self.controls.push((control, read));
        self
    }

    /// Snapshot of all ten controls as currently set in `params`.
    pub fn from_params(params: &LayerParams) -> Self {
        Self {
            controls: Control::ALL
                .into_iter()
                .map(|c| (c, Ok(params.get(c) as i32)))
                .collect(),
            ..Self::default()
        }
    }
}

/// `Tuning(layer_index, parameters, running)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TuningState {
    pub layer_index: usize,
    pub params: LayerParams,
    pub running: bool,
}

impl TuningState {
    /// Start on `layer_index` (clamped) with that layer's defaults.
    pub fn start(layers: &LayerSet, layer_index: usize) -> Self {
        let layer_index = layer_index.min(layers.len().saturating_sub(1));
        let params = layers
            .get(layer_index)
            .map(|l| l.params)
            .unwrap_or(LayerParams::new((0, 0), (0, 0), (0, 0), (0, 0), (0, 0)));
        Self {
            layer_index,
            params,
            running: !layers.is_empty(),
        }
    }
}

/// Side effects requested by a transition, carried out by [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Refine and write the proof image for a layer.
    Save { layer_index: usize, params: LayerParams },
    /// Print a layer's final parameters.
    Report { layer_index: usize, params: LayerParams },
    /// A new layer became active.
    Entered { layer_index: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub state: TuningState,
    pub effects: Vec<Effect>,
}

/// Pure state update for one frame.
///
/// * Control reads that succeeded overwrite the matching parameter (clamped);
///   failed reads keep the previous value.
/// * A close request or `Quit` reports the current layer and stops.
/// * `Save` requests a save of the current parameters and keeps tuning.
/// * `Advance` reports the current layer, then moves to the next one
///   (wrapping) with its predefined defaults.
/// * A stopped state never changes again.
pub fn transition(state: &TuningState, layers: &LayerSet, input: &FrameInput) -> Transition {
    let mut next = *state;
    let mut effects = Vec::new();

    if !state.running || layers.is_empty() {
        next.running = false;
        return Transition { state: next, effects };
    }

    for (control, read) in &input.controls {
        match read {
            Ok(value) => next.params.set(*control, *value),
            Err(e) => debug!("Keeping {} = {}: {}", control, next.params.get(*control), e),
        }
    }

    if input.close_requested || input.command == Some(Command::Quit) {
        effects.push(Effect::Report {
            layer_index: next.layer_index,
            params: next.params,
        });
        next.running = false;
        return Transition { state: next, effects };
    }

    match input.command {
        Some(Command::Save) => effects.push(Effect::Save {
            layer_index: next.layer_index,
            params: next.params,
        }),
        Some(Command::Advance) => {
            effects.push(Effect::Report {
                layer_index: next.layer_index,
                params: next.params,
            });
            next.layer_index = (next.layer_index + 1) % layers.len();
            if let Some(layer) = layers.get(next.layer_index) {
                next.params = layer.params;
            }
            effects.push(Effect::Entered {
                layer_index: next.layer_index,
            });
        }
        Some(Command::Quit) | None => {}
    }

    Transition { state: next, effects }
}

/// Result of one [`Session::tick`].
pub enum Tick {
    Frame(PreviewFrame),
    Finished,
}

/// A written proof image.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedLayer {
    pub name: String,
    pub path: PathBuf,
    /// Coverage of the raw mask shown in the preview.
    pub preview_coverage: f64,
    /// Coverage after refinement, as written.
    pub saved_coverage: f64,
}

/// Session construction options.
pub struct SessionOptions {
    pub output_dir: PathBuf,
    pub display_width: u32,
    pub font: Option<FontArc>,
}

impl SessionOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            display_width: DEFAULT_DISPLAY_WIDTH,
            font: None,
        }
    }
}

/// Owns the source image, its HSV planes and the tuning state.
/// `out` receives the human-readable log (layer banners, saves, parameter dumps).
pub struct Session<W: Write = std::io::Stdout> {
    source: RgbaImage,
    hsv: HsvPlanes,
    layers: LayerSet,
    state: TuningState,
    renderer: PreviewRenderer,
    output_dir: PathBuf,
    out: W,
    last_save: Option<SavedLayer>,
}

impl<W: Write> Session<W> {
    pub fn new(source: RgbaImage, layers: LayerSet, start_index: usize, options: SessionOptions, out: W) -> Result<Self> {
        layers.validate()?;
        let hsv = HsvPlanes::from_rgba(&source);
        let renderer = PreviewRenderer::new(&source, options.display_width, options.font);
        let state = TuningState::start(&layers, start_index);
        info!(
            "Tuning session on {}x{} image, {} layers, starting at {}",
            source.width(),
            source.height(),
            layers.len(),
            state.layer_index + 1
        );

        let mut session = Self {
            source,
            hsv,
            layers,
            state,
            renderer,
            output_dir: options.output_dir,
            out,
            last_save: None,
        };
        session.announce(session.state.layer_index)?;
        Ok(session)
    }

    pub fn state(&self) -> &TuningState {
        &self.state
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    pub fn active_layer(&self) -> &LayerDescriptor {
        &self.layers.layers[self.state.layer_index]
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn last_save(&self) -> Option<&SavedLayer> {
        self.last_save.as_ref()
    }

    /// The human-readable output written so far.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Raw (unrefined) mask for the current parameters, as shown in the preview.
    pub fn current_mask(&self) -> BinaryMask {
        mask::evaluate(&self.hsv, &self.state.params)
    }

    /// Advance one frame. Returns the rendered preview while tuning continues,
    /// `Finished` once the session has stopped. Write failures propagate.
    pub fn tick(&mut self, input: &FrameInput) -> Result<Tick> {
        if !self.state.running {
            return Ok(Tick::Finished);
        }

        let Transition { state, effects } = transition(&self.state, &self.layers, input);
        self.state = state;

        for effect in effects {
            match effect {
                Effect::Save { layer_index, params } => {
                    let saved = self.save_layer(layer_index, &params)?;
                    self.last_save = Some(saved);
                }
                Effect::Report { layer_index, params } => self.report(layer_index, &params)?,
                Effect::Entered { layer_index } => self.announce(layer_index)?,
            }
        }

        if !self.state.running {
            info!("Tuning session finished");
            return Ok(Tick::Finished);
        }

        let layer = self.active_layer();
        let raw = mask::evaluate(&self.hsv, &self.state.params);
        let frame = self.renderer.render(&raw, layer.color, &self.state.params.region, &layer.name);
        Ok(Tick::Frame(frame))
    }

    /// Refine the mask for `params`, blend it into a full-resolution copy of the
    /// source and write `<output_dir>/<layer name>.png`.
    fn save_layer(&mut self, layer_index: usize, params: &LayerParams) -> Result<SavedLayer> {
        let layer = &self.layers.layers[layer_index];
        let raw = mask::evaluate(&self.hsv, params);
        let refined = refine::refine(&raw, &layer.refine);
        let proof = overlay::tinted(&self.source, &refined, layer.color);

        let path = io::layer_png_path(&self.output_dir, &layer.name);
        io::write_png(&proof, &path)?;

        let saved = SavedLayer {
            name: layer.name.clone(),
            path,
            preview_coverage: raw.coverage_percent(),
            saved_coverage: refined.coverage_percent(),
        };
        info!(
            "Saved {} ({:.1}% raw, {:.1}% refined)",
            saved.path.display(),
            saved.preview_coverage,
            saved.saved_coverage
        );
        writeln!(self.out, "  [Saved] {}.png  ({:.1}%)", saved.name, saved.saved_coverage)?;
        Ok(saved)
    }

    fn report(&mut self, layer_index: usize, params: &LayerParams) -> Result<()> {
        let name = &self.layers.layers[layer_index].name;
        info!("Final parameters for {}: {:?}", name, params);
        writeln!(self.out)?;
        write!(self.out, "{}", ParamDump { name, params })?;
        self.out.flush()?;
        Ok(())
    }

    fn announce(&mut self, layer_index: usize) -> Result<()> {
        let name = &self.layers.layers[layer_index].name;
        writeln!(self.out, "\n>>> Layer {}: {}", layer_index + 1, name)?;
        writeln!(self.out, "    S=Save  N=Next layer  Q=Quit\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers() -> LayerSet {
        LayerSet::tuner()
    }

    #[test]
    fn control_reads_update_parameters() {
        let set = layers();
        let state = TuningState::start(&set, 0);
        let input = FrameInput::idle()
            .with_control(Control::HMin, Ok(90))
            .with_control(Control::VMax, Ok(999));
        let next = transition(&state, &set, &input).state;
        assert_eq!(next.params.get(Control::HMin), 90);
        assert_eq!(next.params.get(Control::VMax), 255);
        assert!(next.running);
    }

    #[test]
    fn failed_reads_keep_previous_value() {
        let set = layers();
        let state = TuningState::start(&set, 1);
        let input = FrameInput::idle()
            .with_control(Control::SMin, Err(ControlError::NotRealized(Control::SMin)))
            .with_control(Control::SMax, Err(ControlError::Unavailable(Control::SMax)))
            .with_control(Control::XMin, Ok(40));
        let t = transition(&state, &set, &input);
        assert_eq!(t.state.params.get(Control::SMin), 55);
        assert_eq!(t.state.params.get(Control::SMax), 110);
        assert_eq!(t.state.params.get(Control::XMin), 40);
        assert!(t.state.running);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn advance_wraps_from_last_layer() {
        let set = layers();
        let state = TuningState::start(&set, 3);
        let t = transition(&state, &set, &FrameInput::command(Command::Advance));
        assert_eq!(t.state.layer_index, 0);
        assert_eq!(t.state.params, set.layers[0].params);
        assert_eq!(
            t.effects,
            vec![
                Effect::Report { layer_index: 3, params: set.layers[3].params },
                Effect::Entered { layer_index: 0 },
            ]
        );
    }

    #[test]
    fn advance_discards_edits_of_previous_layer() {
        let set = layers();
        let state = TuningState::start(&set, 0);
        let input = FrameInput::command(Command::Advance).with_control(Control::HMin, Ok(1));
        let t = transition(&state, &set, &input);
        assert_eq!(t.state.params, set.layers[1].params);
        match t.effects[0] {
            Effect::Report { params, .. } => assert_eq!(params.get(Control::HMin), 1),
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn quit_and_close_stop_with_one_report() {
        let set = layers();
        for input in [FrameInput::command(Command::Quit), FrameInput::closed()] {
            let state = TuningState::start(&set, 2);
            let t = transition(&state, &set, &input);
            assert!(!t.state.running);
            assert_eq!(t.effects.len(), 1);
            assert!(matches!(t.effects[0], Effect::Report { layer_index: 2, .. }));

            let after = transition(&t.state, &set, &FrameInput::command(Command::Save));
            assert!(after.effects.is_empty());
            assert_eq!(after.state, t.state);
        }
    }

    #[test]
    fn save_keeps_tuning() {
        let set = layers();
        let state = TuningState::start(&set, 0);
        let t = transition(&state, &set, &FrameInput::command(Command::Save));
        assert!(t.state.running);
        assert_eq!(t.state.layer_index, 0);
        assert!(matches!(t.effects[..], [Effect::Save { layer_index: 0, .. }]));
    }

    #[test]
    fn start_clamps_index() {
        let set = layers();
        assert_eq!(TuningState::start(&set, 42).layer_index, 3);
    }

    #[test]
    fn from_params_reads_every_control() {
        let set = layers();
        let input = FrameInput::from_params(&set.layers[2].params);
        assert_eq!(input.controls.len(), 10);
        let state = TuningState::start(&set, 0);
        let mut moved = state;
        moved.layer_index = 2;
        let t = transition(&moved, &set, &input);
        assert_eq!(t.state.params, set.layers[2].params);
    }
}
