pub mod color;
pub mod mask;
pub mod overlay;
pub mod preview;
pub mod refine;
pub mod report;
pub mod sample;
pub mod text;
