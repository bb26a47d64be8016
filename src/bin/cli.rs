//! Knee Monitor - live view of the knee controller
//!
//! This is the CLI entry point for the knee-control library.
//! Run with: cargo run --bin knee-monitor

use knee_control::sampling::{KneeEvent, LinkStatus, SamplingHandle, SamplingLoop};
use knee_control::sensor::{LineSource, ReplaySource, SensorError, SerialLink};
use knee_control::{KneeCommand, KneeDispatcher, KneeSettings, TargetRange};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: knee-monitor [OPTIONS]

Options:
  --calibrate           Calibrate, print the calibration as JSON and exit
  --replay <FILE>       Read frames from a recorded capture instead of the port
  --port <PORT>         Serial port (overrides settings and KNEE_PORT)
  --range <NAME>        Map events into angle, canvas or brightness
  --stored-calibration  Reuse the calibration saved in the settings file
  --json                Print one JSON object per event
  --list-ports          List serial ports and exit
  --save-settings       Write the effective settings (and calibration) to disk
  -h, --help            Show this help";

struct Options {
    calibrate_only: bool,
    replay: Option<PathBuf>,
    port: Option<String>,
    range: Option<TargetRange>,
    stored_calibration: bool,
    json: bool,
    list_ports: bool,
    save_settings: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    let mut options = Options {
        calibrate_only: false,
        replay: None,
        port: None,
        range: None,
        stored_calibration: false,
        json: false,
        list_ports: false,
        save_settings: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--calibrate" => options.calibrate_only = true,
            "--replay" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--replay needs a file"))?;
                options.replay = Some(PathBuf::from(path));
            }
            "--port" => {
                let port = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--port needs a value"))?;
                options.port = Some(port.clone());
            }
            "--range" => {
                let name = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--range needs a value"))?;
                options.range = Some(match name.to_lowercase().as_str() {
                    "angle" => TargetRange::ANGLE,
                    "canvas" => TargetRange::CANVAS,
                    "brightness" => TargetRange::BRIGHTNESS,
                    other => anyhow::bail!("Unknown range '{}'", other),
                });
            }
            "--stored-calibration" => options.stored_calibration = true,
            "--json" => options.json = true,
            "--list-ports" => options.list_ports = true,
            "--save-settings" => options.save_settings = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            other => anyhow::bail!("Unknown argument '{}'\n\n{}", other, USAGE),
        }
    }

    Ok(Some(options))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("knee_control=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    if options.list_ports {
        return list_ports();
    }

    let mut settings = KneeSettings::load();
    settings.apply_env();
    if let Some(ref port) = options.port {
        settings.port = port.clone();
    }

    let mut config = settings.sampling_config();
    if let Some(range) = options.range {
        config = config.with_target_range(range);
    }
    if options.stored_calibration {
        match settings.calibration {
            Some(calibration) => config = config.with_preset_calibration(calibration),
            None => println!("⚠️ No stored calibration, calibrating instead"),
        }
    }

    println!("🦵 Knee Monitor");
    println!("================================================");
    match options.replay {
        Some(ref path) => println!("Source: replay {}", path.display()),
        None => println!("Source: {} @ {} baud", settings.port, settings.baud_rate),
    }
    println!("Sample period: {}ms", config.period_ms);
    println!("Mode cycle: {:?}", config.mode_cycle);
    println!("================================================\n");

    let sampling = SamplingLoop::new(config);
    let handle = match options.replay {
        Some(path) => sampling.spawn(move || -> Result<Box<dyn LineSource>, SensorError> {
            let source = ReplaySource::open(&path).map_err(|e| SensorError::TransportUnavailable {
                port: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(Box::new(source))
        })?,
        None => {
            let port = settings.port.clone();
            let baud_rate = settings.baud_rate;
            let timeout = settings.read_timeout();
            sampling.spawn(move || -> Result<Box<dyn LineSource>, SensorError> {
                Ok(Box::new(SerialLink::open(&port, baud_rate, timeout)?))
            })?
        }
    };

    println!("🎯 Calibrating: keep your knee at rest...");
    let calibration = match handle.wait_live().await {
        Ok(calibration) => calibration,
        Err(e) => {
            eprintln!("\n❌ Knee control disabled: {}", e);
            return Ok(());
        }
    };
    println!(
        "🎯 Calibrated: x={:.3} [{:.3}, {:.3}], y={:.3} [{:.3}, {:.3}]\n",
        calibration.x_center,
        calibration.x_min,
        calibration.x_max,
        calibration.y_center,
        calibration.y_min,
        calibration.y_max
    );

    if options.save_settings {
        settings.calibration = Some(calibration);
        match settings.save() {
            Ok(path) => println!("💾 Settings saved to {}", path.display()),
            Err(e) => eprintln!("⚠️ {}", e),
        }
    }

    if options.calibrate_only {
        println!("{}", serde_json::to_string_pretty(&calibration)?);
        handle.join()?;
        return Ok(());
    }

    stream_events(&handle, KneeDispatcher::new(calibration, 0), options.json).await?;

    match handle.status() {
        LinkStatus::Disabled(reason) => eprintln!("\n❌ Knee control disabled: {}", reason),
        _ => println!("\nGoodbye! 👋"),
    }
    handle.join()?;
    Ok(())
}

fn list_ports() -> anyhow::Result<()> {
    let ports = SerialLink::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.description {
            Some(description) => println!("{}  ({})", port.name, description),
            None => println!("{}", port.name),
        }
    }
    Ok(())
}

/// Print events until Ctrl-C or until the link goes away.
async fn stream_events(
    handle: &SamplingHandle,
    mut dispatcher: KneeDispatcher,
    json: bool,
) -> anyhow::Result<()> {
    let mut events = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.stop();
                break;
            }
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
                let event = *events.borrow_and_update();
                if let Some(event) = event {
                    print_event(&event, &mut dispatcher, json)?;
                }
            }
        }
    }
    Ok(())
}

fn print_event(event: &KneeEvent, dispatcher: &mut KneeDispatcher, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    if let KneeCommand::ModeChanged { mode, canvas_mode } = dispatcher.dispatch(event) {
        println!("🔀 Mode: {} (canvas: {})", mode, canvas_mode);
        return Ok(());
    }

    match event.mapped {
        Some(mapped) => println!(
            "#{:<6} x={:7.3} y={:7.3} -> ({:7.2}, {:7.2})  {}",
            event.seq, event.position.x, event.position.y, mapped.x, mapped.y, event.mode
        ),
        None if event.position.is_sentinel() => {
            println!("#{:<6} x={:7.3} retracted  {}", event.seq, event.position.x, event.mode)
        }
        None => println!(
            "#{:<6} x={:7.3} y={:7.3}  {}",
            event.seq, event.position.x, event.position.y, event.mode
        ),
    }
    Ok(())
}
