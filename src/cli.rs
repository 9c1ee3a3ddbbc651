// ============================================================================
// TreeLayers CLI — tuner arguments and headless batch export
// ============================================================================
//
// Usage examples:
//   TreeLayers scene.png                          (tune from layer 1)
//   TreeLayers scene.png 3 --output-dir proofs/   (tune from layer 3)
//   TreeLayers -i scene.png --preset semantic --output-dir layers/
//   TreeLayers -i "shots/*.png" --layers my_layers.json --no-composite
//   TreeLayers -i scene.png --sample             (zone HSV percentiles + export)
//   TreeLayers --preset semantic --dump-layers > my_layers.json
//
// Batch mode never opens a window. Each file is processed on the calling
// thread; the per-pixel passes inside use rayon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{error, info, warn};

use crate::error::Result;
use crate::export::{export_layers, ExportOptions};
use crate::io::{load_image, write_json};
use crate::layers::{LayerSet, Preset};
use crate::ops::color::HsvPlanes;
use crate::ops::preview::DEFAULT_DISPLAY_WIDTH;
use crate::ops::report::DEFAULT_SVG_WIDTH;
use crate::ops::sample::{sample_zones, DEFAULT_ZONES, SAMPLES_NAME};

/// Default directory for saved proofs and exports.
pub const DEFAULT_OUTPUT_DIR: &str = "layers_out";

// ============================================================================
// Tuner (GUI) arguments
// ============================================================================

/// Interactive HSV layer tuner.
#[derive(Parser, Debug)]
#[command(
    name = "TreeLayers",
    version,
    about = "Tune HSV threshold layers on an illustration with live preview",
    long_about = "Opens a preview window with ten sliders (hue, saturation, value and\n\
                  the vertical/horizontal region) for one layer at a time.\n\n\
                  Keys:  S = save proof   N = next layer   Q / Esc = quit\n\n\
                  Example:\n  \
                  TreeLayers scene.png 2 --output-dir proofs/"
)]
pub struct TuneArgs {
    /// Source image (PNG, BMP, TGA or TIFF).
    #[arg(value_name = "IMAGE", required_unless_present = "dump_layers")]
    pub image: Option<PathBuf>,

    /// 1-based index of the layer to start on (clamped into range).
    #[arg(value_name = "LAYER", allow_negative_numbers = true)]
    pub layer: Option<i64>,

    /// Directory that receives `<layer>.png` proofs.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// JSON layer set to use instead of a built-in preset.
    #[arg(long, value_name = "FILE.json")]
    pub layers: Option<PathBuf>,

    /// Built-in layer set.
    #[arg(long, value_enum, default_value_t = Preset::Tuner)]
    pub preset: Preset,

    /// Width of the live preview in pixels.
    #[arg(long, default_value_t = DEFAULT_DISPLAY_WIDTH, value_name = "PX")]
    pub display_width: u32,

    /// Print the selected layer set as JSON and exit.
    #[arg(long)]
    pub dump_layers: bool,
}

// ============================================================================
// Batch arguments
// ============================================================================

/// TreeLayers headless batch exporter.
#[derive(Parser, Debug)]
#[command(
    name = "TreeLayers",
    about = "TreeLayers headless layer exporter",
    long_about = "Extract every layer of a layer set from one or more images without\n\
                  opening the GUI. Writes tinted proofs, transparent cut-outs, an\n\
                  all-layers composite and a JSON report with SVG hitboxes.\n\n\
                  Example:\n  \
                  TreeLayers -i scene.png --preset semantic --output-dir layers/\n  \
                  TreeLayers -i \"shots/*.png\" --layers my_layers.json"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.tif").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output directory. With several inputs each file gets its own
    /// `<DIR>/<stem>/` sub-directory.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// JSON layer set to use instead of a built-in preset.
    #[arg(long, value_name = "FILE.json")]
    pub layers: Option<PathBuf>,

    /// Built-in layer set.
    #[arg(long, value_enum, default_value_t = Preset::Semantic)]
    pub preset: Preset,

    /// Width of the SVG view box used in the report.
    #[arg(long, default_value_t = DEFAULT_SVG_WIDTH, value_name = "UNITS")]
    pub svg_width: u32,

    /// Skip `report.json`.
    #[arg(long)]
    pub no_report: bool,

    /// Skip `0_ALL_LAYERS.png`.
    #[arg(long)]
    pub no_composite: bool,

    /// Skip `0_uncategorised.png` (pixels no layer selected).
    #[arg(long)]
    pub no_uncategorised: bool,

    /// Print HSV percentiles of the expected scene zones and write `samples.json`.
    #[arg(long)]
    pub sample: bool,

    /// Print the selected layer set as JSON and exit.
    #[arg(long)]
    pub dump_layers: bool,

    /// Print per-layer coverage and per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any batch-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }

    fn export_options(&self) -> ExportOptions {
        ExportOptions {
            svg_width: self.svg_width.max(1),
            write_report: !self.no_report,
            write_composite: !self.no_composite,
            write_uncategorised: !self.no_uncategorised,
        }
    }
}

/// Layer set from `--layers` when given, otherwise the chosen preset.
pub fn select_layers(layers: Option<&Path>, preset: Preset) -> Result<LayerSet> {
    match layers {
        Some(path) => {
            let set = LayerSet::from_json_file(path)?;
            info!("Loaded {} layers from {}", set.len(), path.display());
            Ok(set)
        }
        None => Ok(LayerSet::preset(preset)),
    }
}

/// Print `layers` as JSON on stdout.
pub fn dump_layers(layers: &LayerSet) -> ExitCode {
    match layers.to_json() {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run batch export and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let layers = match select_layers(args.layers.as_deref(), args.preset) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.dump_layers {
        return dump_layers(&layers);
    }

    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let options = args.export_options();
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(out_dir) = build_output_dir(input_path, &args.output_dir, multi) else {
            eprintln!("  error: cannot determine output directory for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &out_dir, &layers, &options, args.sample, args.verbose) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        out_dir.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                error!("{}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input:   &Path,
    out_dir: &Path,
    layers:  &LayerSet,
    options: &ExportOptions,
    sample:  bool,
    verbose: bool,
) -> Result<()> {
    let source = load_image(input)?;

    if sample {
        let samples = sample_zones(&HsvPlanes::from_rgba(&source), &DEFAULT_ZONES);
        for zone in &samples {
            print!("{}", zone);
        }
        write_json(&samples, &out_dir.join(SAMPLES_NAME))?;
    }

    let outcome = export_layers(&source, layers, out_dir, options)?;

    if verbose {
        for layer in &outcome.report.layers {
            println!(
                "  [{:<12}] {:5.1}%  px_y:{:?}  px_x:{:?}",
                layer.layer, layer.pct, layer.px_bbox.y, layer.px_bbox.x
            );
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
pub fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    warn!("pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                warn!("invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `output_dir` itself for a single input, `output_dir/<stem>` when several
/// inputs would otherwise overwrite each other.
pub fn build_output_dir(input: &Path, output_dir: &Path, multi: bool) -> Option<PathBuf> {
    if !multi {
        return Some(output_dir.to_path_buf());
    }
    let stem = input.file_stem()?;
    Some(output_dir.join(stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_input_writes_to_output_dir() {
        let dir = build_output_dir(Path::new("a/scene.png"), Path::new("out"), false);
        assert_eq!(dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn multiple_inputs_get_stem_subdirectories() {
        let dir = build_output_dir(Path::new("a/scene.png"), Path::new("out"), true);
        assert_eq!(dir, Some(PathBuf::from("out/scene")));
    }

    #[test]
    fn glob_patterns_expand_and_dedupe() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.png", "notes.txt"] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let literal = tmp.path().join("a.png").to_string_lossy().into_owned();
        let pattern = tmp.path().join("*.png").to_string_lossy().into_owned();
        let found = resolve_inputs(&[literal, pattern]);
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.png"));
        assert!(found.iter().any(|p| p.ends_with("b.png")));
    }

    #[test]
    fn batch_flags_parse() {
        let args = CliArgs::try_parse_from([
            "TreeLayers", "-i", "x.png", "y.png", "--preset", "tuner", "--no-report", "--svg-width", "450",
            "--no-uncategorised", "--sample",
        ])
        .unwrap();
        assert!(args.sample);
        assert_eq!(args.input, vec!["x.png", "y.png"]);
        assert_eq!(args.preset, Preset::Tuner);
        let opts = args.export_options();
        assert!(!opts.write_report);
        assert!(opts.write_composite);
        assert!(!opts.write_uncategorised);
        assert_eq!(opts.svg_width, 450);
    }

    #[test]
    fn tuner_args_take_optional_layer() {
        let args = TuneArgs::try_parse_from(["TreeLayers", "scene.png", "3"]).unwrap();
        assert_eq!(args.image, Some(PathBuf::from("scene.png")));
        assert_eq!(args.layer, Some(3));
        assert_eq!(args.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(args.display_width, DEFAULT_DISPLAY_WIDTH);

        let dump = TuneArgs::try_parse_from(["TreeLayers", "--dump-layers"]).unwrap();
        assert!(dump.image.is_none());
        assert!(TuneArgs::try_parse_from(["TreeLayers"]).is_err());
    }

    #[test]
    fn missing_layer_file_is_an_error() {
        assert!(select_layers(Some(Path::new("/no/such/layers.json")), Preset::Tuner).is_err());
        assert_eq!(select_layers(None, Preset::Semantic).unwrap().len(), 9);
    }
}
