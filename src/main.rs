use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flick::cli::Args;
use flick::core::{FrameClock, MemoryWatch, Workers};
use flick::entities::{FnSource, Frame, FrameSource, SequenceSource, SharedSource};
use flick::paths::{self, PathConfig};
use flick::settings::{PlayerSettings, SETTINGS_FILE};
use flick::view::AnimatedView;

/// Side length of synthetic frames
const SYNTHETIC_SIZE: u32 = 64;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths::data_file("flick.log", path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Procedural animation: a hue sweep with optional decode latency
fn synthetic_source(count: usize, delay: f64, decode_ms: u64) -> SharedSource {
    let count = count.max(1);
    let latency = Duration::from_millis(decode_ms);
    let source = FnSource::new(vec![delay; count], move |index| {
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let t = index as f32 / count as f32;
        let r = (255.0 * t) as u8;
        let b = (255.0 * (1.0 - t)) as u8;
        Some(Frame::solid(SYNTHETIC_SIZE, SYNTHETIC_SIZE, [r, 96, b, 255]))
    });
    Arc::new(source)
}

fn build_source(args: &Args) -> Result<SharedSource> {
    if let Some(count) = args.synthetic {
        info!("Synthetic source: {} frames, {}ms decode", count, args.decode_ms);
        return Ok(synthetic_source(count, args.delay, args.decode_ms));
    }
    if let Some(dir) = &args.dir {
        let source = SequenceSource::from_dir(dir, args.delay)
            .with_context(|| format!("Failed to open sequence directory: {}", dir.display()))?;
        return Ok(Arc::new(source));
    }
    if !args.files.is_empty() {
        let source = SequenceSource::from_paths(args.files.clone(), args.delay)
            .context("Failed to open image files")?;
        return Ok(Arc::new(source));
    }
    bail!("Nothing to play: pass image files, --dir or --synthetic N")
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    info!("Flick starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = paths::config_file(SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());

    let mut settings = PlayerSettings::load(&settings_path)?;
    args.apply_to(&mut settings);
    if args.save_settings {
        settings.save(&settings_path)?;
        info!("Settings saved to {}", settings_path.display());
    }

    let source = build_source(&args)?;
    let frame_count = source.frame_count();
    let total = source.total_duration();

    let workers = Arc::new(Workers::new(settings.resolved_worker_threads()));
    let view = AnimatedView::with_workers(workers);
    view.apply_settings(&settings);

    let clock = FrameClock::start(settings.refresh_hz, settings.frame_interval)
        .context("Failed to start frame clock")?;
    view.bind_clock(&clock);
    view.set_animated_image(Some(source), false);
    if let Some(t) = args.seek {
        view.with_player(|p| p.seek_to_time(t));
    }

    let mut memory = MemoryWatch::new(settings.memory_pressure_percent);
    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    let started = Instant::now();
    while started.elapsed() < run_for {
        let remaining = run_for.saturating_sub(started.elapsed());
        std::thread::sleep(remaining.min(Duration::from_secs(1)));
        if memory.poll() {
            warn!("System memory above {}%, trimming cache", settings.memory_pressure_percent);
            view.with_player(|p| p.on_memory_pressure());
        }
    }

    let (hit_rate, misses, jobs, frame_index, elapsed) = view.with_player(|p| {
        let stats = p.cache_stats();
        (
            stats.hit_rate(),
            stats.misses(),
            p.preload_jobs_started(),
            p.frame_index(),
            p.elapsed(),
        )
    });
    view.set_animated_image(None, false);
    drop(clock);

    let stats = view.stats();
    println!("Source:          {} frames, {:.3}s loop", frame_count, total);
    println!("Frames shown:    {}", stats.frames_shown);
    println!("Distinct frames: {}", stats.distinct_frames);
    println!("Final position:  frame {} at {:.3}s", frame_index, elapsed);
    println!("Cache hit rate:  {:.1}% ({} misses)", hit_rate * 100.0, misses);
    println!("Preload jobs:    {}", jobs);

    Ok(())
}
