use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vibrosense::config::{SourceKind, SystemConfig};
use vibrosense::controller::AcquisitionController;
use vibrosense::net::UdpSource;
use vibrosense::pipeline::PipelineHandle;
use vibrosense::simulator::SimulatedSource;
use vibrosense::traits::SampleSource;

const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the built-in simulated sensor node instead of UDP
    #[arg(long, default_value_t = false)]
    simulated: bool,

    #[arg(long)]
    bind: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// ISO 10816 machine group (G1 or G2)
    #[arg(long)]
    iso_group: Option<String>,

    /// Start a calibration capture as soon as data flows
    #[arg(long, default_value_t = false)]
    calibrate: bool,
}

fn load_config(args: &Args) -> Result<SystemConfig> {
    let mut config = match &args.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };

    if args.simulated {
        config.acquisition.source = SourceKind::Simulated;
    }
    if let Some(bind) = &args.bind {
        config.acquisition.bind_addr = bind.clone();
    }
    if let Some(port) = args.port {
        config.acquisition.port = port;
    }
    if let Some(group) = &args.iso_group {
        config.analysis.iso_group = group.clone();
    }
    Ok(config)
}

fn spawn_health_monitor(
    pipeline: PipelineHandle,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("link-health".into())
        .spawn(move || {
            let transitions = pipeline.run_link_watchdog(&running, interval);
            debug!("[Link] Watchdog stopped after {} state changes", transitions);
        })
        .context("Failed to spawn health monitor thread")
}

fn run_acquisition<S: SampleSource>(
    mut controller: AcquisitionController<S>,
    running: &AtomicBool,
) -> Result<()> {
    controller.setup()?;

    info!("Starting acquisition loop...");
    let mut last_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        if last_log.elapsed() >= STATUS_INTERVAL {
            controller.log_status();
            last_log = Instant::now();
        }

        if let Err(e) = controller.process_loop_iteration() {
            warn!("Error in loop: {}", e);
            thread::sleep(Duration::from_millis(100));
        }
    }

    controller.log_status();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    let pipeline = match PipelineHandle::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Pipeline ready: fs={} Hz, FFT window {}, RMS window {}, ISO {}, Kalman {}",
        config.sensor.sample_rate_hz,
        config.analysis.fft_window,
        config.analysis.rms_window,
        config.analysis.iso_group,
        if config.kalman.enabled { "on" } else { "off" }
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let health = spawn_health_monitor(
        pipeline.clone(),
        running.clone(),
        Duration::from_millis(config.health.check_interval_ms),
    )?;

    if args.calibrate {
        pipeline.request_calibration();
    }

    let result = match config.acquisition.source {
        SourceKind::Live => {
            let source = UdpSource::new(
                &config.acquisition.bind_addr,
                config.acquisition.port,
                Duration::from_millis(config.acquisition.recv_timeout_ms),
                config.acquisition.max_batch,
            );
            run_acquisition(AcquisitionController::new(source, pipeline), &running)
        }
        SourceKind::Simulated => {
            let source = SimulatedSource::new(config.simulator.clone(), config.sensor.sample_rate_hz);
            run_acquisition(AcquisitionController::new(source, pipeline), &running)
        }
    };

    running.store(false, Ordering::SeqCst);
    if health.join().is_err() {
        warn!("Health monitor thread panicked");
    }

    info!("Exiting.");
    result
}
