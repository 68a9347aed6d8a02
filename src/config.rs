// Startup configuration. Everything that was ambient process state in earlier
// iterations (API credential, ffmpeg location) is collected here once at
// startup and passed into the components that need it.

use clap::Parser;
use std::path::{Path, PathBuf};

/// Command line arguments for media-relay-server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Hostname/IP to bind the server to. Use "*" to listen on all interfaces.
    #[arg(long, env = "MEDIA_RELAY_HOST", default_value = "localhost")]
    pub host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "MEDIA_RELAY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// API credential for the upscaling inference provider.
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    pub replicate_api_token: String,

    /// Base URL of the upscaling inference provider.
    #[arg(
        long,
        env = "REPLICATE_API_BASE",
        default_value = "https://api.replicate.com"
    )]
    pub replicate_api_base: String,

    /// Directory containing the ffmpeg executable used for audio encoding.
    /// When unset, ffmpeg is resolved from PATH.
    #[arg(long, env = "MEDIA_RELAY_FFMPEG_DIR")]
    pub ffmpeg_dir: Option<PathBuf>,

    /// Maximum number of concurrent upscale calls made to the provider by the
    /// multi-file endpoint.
    #[arg(long, env = "MEDIA_RELAY_MAX_CONCURRENT_UPSCALES", default_value_t = 4)]
    pub max_concurrent_upscales: usize,

    /// Origin allowed by CORS (with credentials).
    #[arg(
        long,
        env = "MEDIA_RELAY_ALLOWED_ORIGIN",
        default_value = "http://localhost:3000"
    )]
    pub allowed_origin: String,

    /// Directory where temp files and processed outputs are written.
    #[arg(long, env = "MEDIA_RELAY_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,
}

impl AppConfig {
    /// Full path of the ffmpeg executable to invoke.
    pub fn ffmpeg_program(&self) -> PathBuf {
        match &self.ffmpeg_dir {
            Some(dir) => dir.join("ffmpeg"),
            None => Path::new("ffmpeg").to_path_buf(),
        }
    }
}
