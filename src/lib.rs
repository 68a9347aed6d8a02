// media-relay-server: accepts uploaded images and audio files and forwards
// them to external processing (a hosted upscaling API, a local WebP re-encode,
// a local audio normalization pass), returning file paths/status to the caller.

pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod recompress;
pub mod temp;
pub mod upscale;
