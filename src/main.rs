//! neo-lidar - print scans from a libneo device
//!
//! ```text
//! neo-lidar /dev/ttyUSB0                 # 10 scans at 5 Hz, then stop the motor
//! neo-lidar /dev/ttyUSB0 --scans 0       # stream until Ctrl-C
//! neo-lidar /dev/ttyUSB0 -b 115200 -c neo.toml
//! neo-lidar mock --mock                  # no hardware
//! ```

use neo_lidar::config::Config;
use neo_lidar::device::{DeviceSession, RecvTimeoutError, ScanWorker};
use neo_lidar::error::{Error, Result};
use neo_lidar::native::NativeLibrary;
use neo_lidar::types::Scan;
use std::env;
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const USAGE: &str =
    "Usage: neo-lidar <PORT> [-b|--bitrate N] [-n|--scans N] [-c|--config PATH] [--mock]";

/// Command-line arguments
#[derive(Debug, Default, PartialEq)]
struct Args {
    port: Option<String>,
    bitrate: Option<i32>,
    scans: Option<usize>,
    config: Option<String>,
    mock: bool,
    help: bool,
}

fn parse_value<T: FromStr>(flag: &str, value: Option<String>) -> std::result::Result<T, String> {
    let value = value.ok_or_else(|| format!("{} requires a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

/// Parse arguments (without the program name).
///
/// Supports one positional port plus flags in any order.
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> std::result::Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-b" | "--bitrate" => parsed.bitrate = Some(parse_value(&arg, args.next())?),
            "-n" | "--scans" => parsed.scans = Some(parse_value(&arg, args.next())?),
            "-c" | "--config" => parsed.config = Some(parse_value(&arg, args.next())?),
            "--mock" => parsed.mock = true,
            "-h" | "--help" => parsed.help = true,
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {}", flag)),
            port => {
                if parsed.port.is_some() {
                    return Err(format!("Unexpected argument: {}", port));
                }
                parsed.port = Some(port.to_string());
            }
        }
    }

    Ok(parsed)
}

fn main() -> Result<()> {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}\n{}", msg, USAGE);
            process::exit(1);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if let Some(port) = args.port {
        config.device.port = Some(port);
    }
    if let Some(bitrate) = args.bitrate {
        config.device.bitrate = Some(bitrate);
    }
    if let Some(scans) = args.scans {
        config.scanning.scan_count = scans;
    }
    config.validate()?;

    let Some(port) = config.device.port.clone() else {
        eprintln!("{}", USAGE);
        process::exit(1);
    };

    log::info!("neo-lidar v{} starting...", env!("CARGO_PKG_VERSION"));

    let library = open_library(args.mock)?;
    let session = DeviceSession::new(library, &port, config.device.bitrate)?;
    log::info!("libneo {} on {}", session.library_version(), port);

    if config.scanning.scan_count == 0 {
        stream_until_interrupted(session, &config)
    } else {
        print_scans(session, &config)
    }
}

fn open_library(mock: bool) -> Result<Arc<dyn NativeLibrary>> {
    if mock {
        #[cfg(feature = "mock")]
        return Ok(Arc::new(neo_lidar::native::MockNeo::new()));
        #[cfg(not(feature = "mock"))]
        return Err(Error::Unsupported(
            "built without the `mock` feature".into(),
        ));
    }

    #[cfg(feature = "libneo")]
    let library: Result<Arc<dyn NativeLibrary>> = Ok(Arc::new(neo_lidar::native::LibNeo::new()));
    #[cfg(not(feature = "libneo"))]
    let library: Result<Arc<dyn NativeLibrary>> = Err(Error::Unsupported(
        "built without the `libneo` feature; rebuild with `--features libneo` or pass --mock"
            .into(),
    ));
    library
}

fn print_scan(n: usize, scan: &Scan) {
    println!("Scan #{}: {} samples", n, scan.len());
    for sample in scan {
        println!(
            "  angle {:>8.3} distance {:>5} strength {:>3}",
            sample.angle_degrees(),
            sample.distance,
            sample.signal_strength
        );
    }
}

/// Fixed number of scans on the main thread
fn print_scans(mut session: DeviceSession, config: &Config) -> Result<()> {
    let scanning = &config.scanning;

    session.scoped(|device| {
        device.set_motor_speed(scanning.motor_speed)?;
        if let Some(rate) = scanning.sample_rate {
            device.set_sample_rate(rate)?;
        }
        log::info!("Motor speed: {} Hz", device.motor_speed()?);

        device.start_scanning()?;
        for (n, scan) in device.get_scans().take(scanning.scan_count).enumerate() {
            print_scan(n, &scan?);
        }
        device.stop_scanning()?;

        // Stop the motor
        device.set_motor_speed(scanning.idle_motor_speed)
    })
}

/// Scan on a worker thread until Ctrl-C
fn stream_until_interrupted(session: DeviceSession, config: &Config) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let worker = ScanWorker::spawn(session, config.scanning.worker_config())?;
    log::info!("Streaming scans. Press Ctrl-C to stop.");

    let mut count = 0;
    let mut failure = None;
    while running.load(Ordering::Relaxed) {
        match worker.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(scan)) => {
                print_scan(count, &scan);
                count += 1;
            }
            Ok(Err(e)) => {
                failure = Some(e);
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Shutting down...");
    worker.stop()?;
    log::info!("Stopped after {} scans", count);

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
