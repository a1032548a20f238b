// atelier test application -- CLI tool for driving an Atelier receiver over
// RS-232, against real hardware or a mock transport.
//
// Usage:
//   atelier-test-app --port /dev/ttyUSB0 status
//   atelier-test-app --port /dev/ttyUSB0 power on
//   atelier-test-app --port /dev/ttyUSB0 volume set 35
//   atelier-test-app --port /dev/ttyUSB0 --max-volume 60 volume set 50 --percent
//   atelier-test-app --port /dev/ttyUSB0 input cd
//   atelier-test-app --mock --verbose send transmit-status
//   atelier-test-app --port /dev/ttyUSB0 monitor --duration 30

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use atelier_core::{DeviceState, InputSource, MAX_VOLUME, absolute_volume, relative_volume};
use atelier_rs232::{AtelierBuilder, AtelierDevice, Command as DeviceCommand};
use atelier_test_harness::MockTransport;

/// How long after the last queued command the CLI keeps the port open, so
/// the appliance can echo the result.
const ECHO_GRACE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// atelier test application -- drives an Atelier receiver from the command line.
#[derive(Parser)]
#[command(name = "atelier-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3). Required unless --mock
    /// is used.
    #[arg(long)]
    port: Option<String>,

    /// Override the default baud rate (300).
    #[arg(long)]
    baud: Option<u32>,

    /// Use a mock transport that behaves like a switched-on appliance.
    /// Useful for verifying CLI parsing and driver wiring without hardware.
    #[arg(long)]
    mock: bool,

    /// Volume, in device units, that counts as 100 percent.
    #[arg(long, default_value_t = MAX_VOLUME)]
    max_volume: u8,

    /// Log driver activity (debug level unless RUST_LOG says otherwise).
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh and print the believed state.
    Status,

    /// Switch power on or off.
    Power { state: Switch },

    /// Switch mute on or off.
    Mute { state: Switch },

    /// Switch loudness compensation on or off.
    Loudness { state: Switch },

    /// Switch a speaker pair on or off.
    Speaker {
        /// Speaker pair (1 or 2).
        #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
        pair: u8,
        state: Switch,
    },

    /// Select the input source (am, fm, cd, phono, tv, tape1, tape2).
    Input { source: InputSource },

    /// Volume operations.
    Volume {
        #[command(subcommand)]
        action: VolumeAction,
    },

    /// Tape and disc transport controls.
    Transport { action: TransportAction },

    /// Send a raw catalog command by name (e.g. transmit-status).
    Send { name: String },

    /// List the command catalog.
    List,

    /// Print state events in real time.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
}

#[derive(Subcommand)]
enum VolumeAction {
    /// Ramp to an absolute volume.
    Set {
        volume: u8,

        /// Interpret the value as a percentage of --max-volume.
        #[arg(long)]
        percent: bool,
    },
    /// Step the volume up.
    Up {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Step the volume down.
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn is_on(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportAction {
    Stop,
    Pause,
    Start,
    FastForward,
    Rewind,
}

// ---------------------------------------------------------------------------
// Device creation
// ---------------------------------------------------------------------------

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// A mock appliance that answers status requests like a switched-on unit.
fn mock_transport() -> MockTransport {
    let mut mock = MockTransport::new();
    mock.reply_to(
        DeviceCommand::TransmitStatus.wire_bytes(),
        b";0;\r\n;1;40\r\n;5; N\r\n;6; N\r\n;7;TV\r\n",
    );
    mock
}

async fn create_device(cli: &Cli) -> Result<AtelierDevice> {
    let mut builder = AtelierBuilder::new();
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }

    if cli.mock {
        let device = builder
            .build_with_transport(Box::new(mock_transport()))
            .await
            .context("failed to start mock device")?;
        println!("Connected (mock transport)");
        return Ok(device);
    }

    let Some(port) = cli.port.as_deref() else {
        bail!("--port is required unless --mock is used");
    };
    let device = builder
        .serial_port(port)
        .build()
        .await
        .with_context(|| format!("failed to open {port}"))?;
    println!("Connected to {port}");
    Ok(device)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Keep the IO task running until the queue has drained and the appliance
/// had a moment to echo the result.
async fn wait_idle(device: &AtelierDevice, at_least: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if start.elapsed() < at_least {
            continue;
        }
        let mut busy = device.ramp_target().await?.is_some();
        for cmd in DeviceCommand::ALL {
            busy |= device.is_enqueued(cmd).await?;
        }
        if !busy {
            break;
        }
    }
    tokio::time::sleep(ECHO_GRACE).await;
    Ok(())
}

fn print_state(state: &DeviceState, max_volume: u8) {
    println!("Power:     {}", on_off(state.is_on));
    println!(
        "Volume:    {} ({}%)",
        state.volume,
        relative_volume(state.volume, max_volume)
    );
    println!("Mute:      {}", on_off(state.is_mute));
    println!("Loudness:  {}", on_off(state.is_loudness));
    println!("Input:     {}", state.input_source);
    println!("Speaker 1: {}", on_off(state.is_speaker1));
    println!("Speaker 2: {}", on_off(state.is_speaker2));
    match state.last_updated {
        Some(at) => println!("Updated:   {:.1}s ago", at.elapsed().as_secs_f32()),
        None => println!("Updated:   never"),
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

async fn cmd_status(device: &AtelierDevice, max_volume: u8) -> Result<()> {
    // The first read queues a refresh when the state is stale.
    device.state().await?;
    wait_idle(device, Duration::from_secs(3)).await?;
    let state = device.state().await?;
    print_state(&state, max_volume);
    Ok(())
}

async fn cmd_volume(device: &AtelierDevice, action: &VolumeAction, max_volume: u8) -> Result<()> {
    match *action {
        VolumeAction::Set { volume, percent } => {
            let target = if percent {
                absolute_volume(volume, max_volume)
            } else {
                volume
            };
            device
                .set_volume(target)
                .await
                .context("failed to set volume")?;
            println!("Ramping volume to {target}");
        }
        VolumeAction::Up { steps } => {
            for _ in 0..steps {
                device.volume_up().await?;
            }
        }
        VolumeAction::Down { steps } => {
            for _ in 0..steps {
                device.volume_down().await?;
            }
        }
    }
    wait_idle(device, Duration::ZERO).await?;
    println!("Volume: {}", device.state().await?.volume);
    Ok(())
}

async fn cmd_transport(device: &AtelierDevice, action: TransportAction) -> Result<()> {
    match action {
        TransportAction::Stop => device.stop().await?,
        TransportAction::Pause => device.pause().await?,
        TransportAction::Start => device.start().await?,
        TransportAction::FastForward => device.fast_forward().await?,
        TransportAction::Rewind => device.rewind().await?,
    }
    wait_idle(device, Duration::ZERO).await
}

async fn cmd_send(device: &AtelierDevice, name: &str) -> Result<()> {
    let Some(cmd) = DeviceCommand::from_name(name) else {
        bail!("unknown command '{name}' (see `list`)");
    };
    device.enqueue(cmd).await?;
    println!("Queued {cmd}");
    wait_idle(device, Duration::ZERO).await
}

fn cmd_list() -> Result<()> {
    println!("{:<18} {}", "Command", "Wire");
    for cmd in DeviceCommand::ALL {
        println!(
            "{:<18} {}",
            cmd.name(),
            String::from_utf8_lossy(cmd.wire_bytes())
        );
    }
    Ok(())
}

async fn cmd_monitor(device: &AtelierDevice, duration_secs: u64) -> Result<()> {
    let mut event_rx = device.subscribe();

    println!("Monitoring state events (Ctrl-C to stop)...");

    let deadline = if duration_secs > 0 {
        Some(Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, event_rx.recv()).await {
            Ok(Ok(event)) => {
                println!("[event] {event:?}");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                }
                break;
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.max_volume == 0 || cli.max_volume > MAX_VOLUME {
        bail!("--max-volume must be between 1 and {MAX_VOLUME}");
    }

    // The `list` command does not require a connection.
    if matches!(cli.command, Command::List) {
        return cmd_list();
    }

    let device = create_device(&cli).await?;

    let result = match &cli.command {
        Command::Status => cmd_status(&device, cli.max_volume).await,
        Command::Power { state } => {
            device.set_power(state.is_on()).await?;
            // A stale state is refreshed before power is toggled.
            wait_idle(&device, Duration::from_secs(3)).await?;
            println!("Power: {}", on_off(device.state().await?.is_on));
            Ok(())
        }
        Command::Mute { state } => {
            device.set_mute(state.is_on()).await?;
            wait_idle(&device, Duration::ZERO).await
        }
        Command::Loudness { state } => {
            device.set_loudness(state.is_on()).await?;
            wait_idle(&device, Duration::ZERO).await
        }
        Command::Speaker { pair, state } => {
            if *pair == 1 {
                device.set_speaker_1(state.is_on()).await?;
            } else {
                device.set_speaker_2(state.is_on()).await?;
            }
            wait_idle(&device, Duration::ZERO).await
        }
        Command::Input { source } => {
            device.set_input(*source).await?;
            wait_idle(&device, Duration::ZERO).await
        }
        Command::Volume { action } => cmd_volume(&device, action, cli.max_volume).await,
        Command::Transport { action } => cmd_transport(&device, *action).await,
        Command::Send { name } => cmd_send(&device, name).await,
        Command::Monitor { duration } => cmd_monitor(&device, *duration).await,
        Command::List => unreachable!("handled before connecting"),
    };

    device.shutdown().await.context("failed to shut down device")?;
    result
}
