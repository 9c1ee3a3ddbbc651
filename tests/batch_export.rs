use std::process::ExitCode;

use clap::Parser;
use image::{Rgba, RgbaImage};
use treelayers::cli::{self, CliArgs};
use treelayers::export::{export_layers, ExportOptions, COMPOSITE_NAME, REPORT_NAME, UNCATEGORISED};
use treelayers::layers::{LayerDescriptor, LayerParams, LayerSet, RefineParams};
use treelayers::ops::sample::{DEFAULT_ZONES, SAMPLES_NAME};

fn scene() -> RgbaImage {
    RgbaImage::from_fn(100, 50, |x, y| {
        if (20..40).contains(&x) && (10..30).contains(&y) {
            Rgba([0, 255, 0, 255])
        } else {
            Rgba([90, 90, 90, 255])
        }
    })
}

fn green_set() -> LayerSet {
    LayerSet {
        layers: vec![LayerDescriptor {
            name: "green".into(),
            color: [255, 255, 0],
            params: LayerParams::new((50, 70), (100, 255), (100, 255), (0, 100), (0, 100)),
            alternatives: Vec::new(),
            refine: RefineParams::NONE,
            exclude: Vec::new(),
            note: "leaves".into(),
        }],
    }
}

#[test]
fn report_describes_the_selection() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = export_layers(&scene(), &green_set(), dir.path(), &ExportOptions::default()).unwrap();

    let layer = &outcome.report.layers[0];
    assert_eq!(layer.pct, 8.0);
    assert_eq!(layer.px_bbox.x, [20, 39]);
    assert_eq!(layer.px_bbox.y, [10, 29]);
    assert_eq!(outcome.report.svg.view_box, [0, 0, 900, 450]);
    assert_eq!(layer.svg_bbox.x, [180, 351]);
    assert!(layer.hitbox.as_deref().unwrap().starts_with("M180,90"));

    let cut = image::open(dir.path().join("cut_green.png")).unwrap().to_rgba8();
    assert_eq!(cut.get_pixel(25, 15), &Rgba([0, 255, 0, 255]));
    assert_eq!(cut.get_pixel(5, 5)[3], 0);
    assert!(dir.path().join("1_green.png").exists());
    assert!(dir.path().join(COMPOSITE_NAME).exists());
    assert!(dir.path().join(REPORT_NAME).exists());
}

#[test]
fn optional_artifacts_can_be_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let options = ExportOptions {
        write_report: false,
        write_composite: false,
        ..ExportOptions::default()
    };
    export_layers(&scene(), &green_set(), dir.path(), &options).unwrap();
    assert!(dir.path().join("1_green.png").exists());
    assert!(!dir.path().join(COMPOSITE_NAME).exists());
    assert!(!dir.path().join(REPORT_NAME).exists());
}

#[test]
fn cli_processes_each_input_into_its_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.png", "b.png"] {
        scene().save(dir.path().join(name)).unwrap();
    }
    let layers_path = dir.path().join("layers.json");
    std::fs::write(&layers_path, green_set().to_json().unwrap()).unwrap();
    let out = dir.path().join("out");

    let pattern = dir.path().join("*.png").to_string_lossy().into_owned();
    let args = CliArgs::try_parse_from([
        "TreeLayers".to_string(),
        "-i".to_string(),
        pattern,
        "--layers".to_string(),
        layers_path.to_string_lossy().into_owned(),
        "--output-dir".to_string(),
        out.to_string_lossy().into_owned(),
    ])
    .unwrap();

    assert_eq!(cli::run(args), ExitCode::SUCCESS);
    assert!(out.join("a").join("1_green.png").exists());
    assert!(out.join("b").join(REPORT_NAME).exists());
}

#[test]
fn cli_fails_when_any_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.png");
    scene().save(&good).unwrap();
    let bad = dir.path().join("bad.png");
    std::fs::write(&bad, b"not a png").unwrap();

    let args = CliArgs::try_parse_from([
        "TreeLayers".to_string(),
        "-i".to_string(),
        good.to_string_lossy().into_owned(),
        bad.to_string_lossy().into_owned(),
        "--output-dir".to_string(),
        dir.path().join("out").to_string_lossy().into_owned(),
    ])
    .unwrap();

    assert_eq!(cli::run(args), ExitCode::FAILURE);
    assert!(dir.path().join("out").join("good").join("0_ALL_LAYERS.png").exists());
}

#[test]
fn cli_sample_writes_zone_percentiles() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scene.png");
    scene().save(&input).unwrap();
    let out = dir.path().join("out");

    let args = CliArgs::try_parse_from([
        "TreeLayers".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "--sample".to_string(),
        "--output-dir".to_string(),
        out.to_string_lossy().into_owned(),
    ])
    .unwrap();

    assert_eq!(cli::run(args), ExitCode::SUCCESS);
    let text = std::fs::read_to_string(out.join(SAMPLES_NAME)).unwrap();
    let samples: serde_json::Value = serde_json::from_str(&text).unwrap();
    let zones = samples.as_array().unwrap();
    assert_eq!(zones.len(), DEFAULT_ZONES.len());
    assert_eq!(zones[0]["name"], "Rain zone (top-right)");
    // The rain zone is all grey: achromatic, V = 90.
    assert_eq!(zones[0]["s"]["p95"], 0.0);
    assert_eq!(zones[0]["v"]["median"], 90.0);
    assert!(out.join(format!("0_{}.png", UNCATEGORISED)).exists());
}
