use clap::Parser;
use std::path::PathBuf;

use crate::settings::PlayerSettings;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless animated-image player
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Image files, played in order as frames (PNG, JPEG, GIF, TIFF, TGA, BMP)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Play every image in a directory (sorted by name)
    #[arg(short = 'd', long = "dir", value_name = "DIR", conflicts_with = "files")]
    pub dir: Option<PathBuf>,

    /// Play a generated animation of N frames instead of files
    #[arg(short = 's', long = "synthetic", value_name = "N", conflicts_with_all = ["files", "dir"])]
    pub synthetic: Option<usize>,

    /// Delay per frame in seconds
    #[arg(long = "delay", value_name = "SECONDS", default_value_t = 0.1)]
    pub delay: f64,

    /// Artificial decode latency for synthetic frames
    #[arg(long = "decode-ms", value_name = "MS", default_value_t = 0)]
    pub decode_ms: u64,

    /// How long to play before exiting
    #[arg(short = 't', long = "seconds", value_name = "SECONDS", default_value_t = 3.0)]
    pub seconds: f64,

    /// Playback speed multiplier
    #[arg(long = "speed", value_name = "X")]
    pub speed: Option<f64>,

    /// Advance at most one frame per tick
    #[arg(long = "no-skip")]
    pub no_skip: bool,

    /// Frames to preload ahead of the playhead
    #[arg(long = "preload", value_name = "N")]
    pub preload: Option<usize>,

    /// Display refresh rate driving the clock
    #[arg(long = "fps", value_name = "HZ")]
    pub fps: Option<f64>,

    /// Tick every N refreshes
    #[arg(long = "interval", value_name = "N")]
    pub interval: Option<u32>,

    /// Attach paused
    #[arg(long = "paused")]
    pub paused: bool,

    /// Seek to this time (seconds) right after attaching
    #[arg(long = "seek", value_name = "SECONDS", allow_negative_numbers = true)]
    pub seek: Option<f64>,

    /// Write the effective settings to the config file
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Enable debug logging to file (default: flick.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Overlay command-line values on loaded settings
    pub fn apply_to(&self, settings: &mut PlayerSettings) {
        if let Some(speed) = self.speed {
            settings.speed = speed;
        }
        if self.no_skip {
            settings.skip_frames = false;
        }
        if let Some(preload) = self.preload {
            settings.preload_window = preload;
        }
        if let Some(fps) = self.fps {
            settings.refresh_hz = fps;
        }
        if let Some(interval) = self.interval {
            settings.frame_interval = interval;
        }
        if self.paused {
            settings.autoplay = false;
        }
    }
}
