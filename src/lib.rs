//! TreeLayers: HSV-threshold layer extraction for illustrated scenes.
//!
//! The library holds everything except process startup: layer catalogues,
//! mask evaluation and refinement, preview rendering, the frame-driven
//! tuning session and the headless batch exporter.

pub mod app;
pub mod cli;
pub mod components;
pub mod error;
pub mod export;
pub mod io;
pub mod layers;
pub mod logger;
pub mod ops;
pub mod session;

pub use error::{LayerError, Result};
pub use layers::{Control, LayerDescriptor, LayerParams, LayerSet, Preset};
pub use session::{Command, FrameInput, Session, SessionOptions, Tick};
