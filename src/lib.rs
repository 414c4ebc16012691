// xuebox: FFmpeg encode orchestration and media-library quality control

pub mod cancel;
pub mod config;
pub mod engine;
pub mod logging;
pub mod qc;
