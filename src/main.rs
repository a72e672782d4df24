mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Args;
use live_spectrogram::audio::readoff::Note;
use live_spectrogram::{list_input_devices, LogContext, SpectrogramPipeline};
use std::thread;
use std::time::{Duration, Instant};

const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    if args.list_devices {
        let devices = list_input_devices().context("failed to enumerate input devices")?;
        if devices.is_empty() {
            println!("no input devices found");
        }
        for name in devices {
            println!("{}", name);
        }
        return Ok(());
    }

    let log = LogContext::default();
    let config = args.build_config(&log).context("invalid configuration")?;
    let tick_interval = Duration::try_from_secs_f32(1.0 / config.tick_rate_hz)
        .with_context(|| format!("tick rate {} Hz is too low", config.tick_rate_hz))?;
    let run_for = args.run_duration()?;
    log::info!("capture backend: {}", config.backend);

    let mut pipeline =
        SpectrogramPipeline::new(config, log).context("failed to build analysis pipeline")?;
    let format = pipeline.start().context("failed to start audio capture")?;
    log::info!(
        "capturing {} ch @ {} Hz, history spans {:.1} s",
        format.channels,
        format.sample_rate,
        pipeline.history_span_seconds()
    );

    run(&mut pipeline, tick_interval, run_for)?;

    pipeline.stop();
    log::info!(
        "stopped after {} samples",
        pipeline.ring().total_written()
    );
    Ok(())
}

/// Drive display ticks at a fixed cadence, logging FPS and the dominant
/// pitch once per second
fn run(
    pipeline: &mut SpectrogramPipeline,
    tick_interval: Duration,
    run_for: Option<Duration>,
) -> Result<()> {
    let started = Instant::now();
    let deadline = run_for
        .map(|duration| {
            started
                .checked_add(duration)
                .context("run length overflows the clock")
        })
        .transpose()?;

    let mut next_tick = started;
    let mut window_start = started;
    let mut frames = 0u32;

    loop {
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }

        pipeline
            .on_display_tick()
            .context("spectral analysis failed")?;
        frames += 1;

        let elapsed = now.duration_since(window_start);
        if elapsed >= DIAGNOSTICS_INTERVAL {
            let fps = frames as f32 / elapsed.as_secs_f32();
            match pipeline.peak_frequency() {
                Some(peak) => {
                    let note = Note::from_frequency(peak)
                        .map(|note| note.to_string())
                        .unwrap_or_default();
                    log::info!("{:.1} fps, peak {:.0} Hz {}", fps, peak, note);
                }
                None => log::info!("{:.1} fps, silence", fps),
            }
            frames = 0;
            window_start = now;
        }

        next_tick += tick_interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            // fell behind; don't try to catch up with a burst of ticks
            next_tick = now;
        }
    }

    Ok(())
}
