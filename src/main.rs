use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nxt_control::domain::settings::{BrickSettings, DriveSettings, SettingsService};
use nxt_control::infrastructure::logging;
use nxt_control::{Brick, BrickAddress, DriveDirection, MotorPort, Power, SensorPort};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

/// Bluetooth control for the LEGO NXT
#[derive(Parser, Debug)]
#[command(name = "nxtctl", version, long_about = None)]
struct Args {
    /// Bluetooth address of the brick (defaults to the last one used)
    #[arg(short, long)]
    address: Option<BrickAddress>,

    /// RFCOMM channel (overrides the settings file)
    #[arg(long)]
    channel: Option<u8>,

    /// Settings file to use instead of the one in the config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Play a tone
    Tone {
        /// Frequency in Hz
        freq: u16,
        /// Duration in milliseconds
        time: u16,
    },
    /// Keep the brick from powering down
    KeepAlive {
        /// Keep sending until Ctrl-C, at the interval from the settings file
        #[arg(long)]
        repeat: bool,
        /// Keep sending every this many seconds until Ctrl-C
        #[arg(long)]
        every: Option<u64>,
    },
    /// Print the battery voltage in mV
    Battery,
    /// Print the brick name, address and firmware
    Info,
    /// Read a touch sensor
    Button { port: SensorPort },
    /// Read a light sensor (0-1023)
    Light { port: SensorPort },
    /// Run a motor at a power in [-100, 100]
    Motor {
        port: MotorPort,
        #[arg(allow_hyphen_values = true)]
        power: i32,
    },
    /// Stop one motor, or all of them
    Stop {
        port: Option<MotorPort>,
        /// Let the motors spin down instead of braking
        #[arg(long)]
        coast: bool,
    },
    /// Drive with the two drive motors for a number of seconds
    Drive {
        direction: Direction,
        /// Seconds to drive for
        time: u64,
        #[arg(long, allow_hyphen_values = true)]
        power: Option<i32>,
        #[arg(long)]
        left: Option<MotorPort>,
        #[arg(long)]
        right: Option<MotorPort>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl From<Direction> for DriveDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => DriveDirection::Forward,
            Direction::Backward => DriveDirection::Backward,
            Direction::Left => DriveDirection::TurnLeft,
            Direction::Right => DriveDirection::TurnRight,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => SettingsService::with_path(path.clone()),
        None => SettingsService::new()?,
    };
    let _log_guard = logging::init_logger(&settings.get().log_settings, args.verbose)?;
    info!("Using settings from {}", settings.path().display());

    let address = args
        .address
        .or(settings.get().last_connected_address)
        .context("No brick address given and none remembered; pass --address")?;

    let mut brick_settings = settings.get().brick.clone();
    if let Some(channel) = args.channel {
        brick_settings.rfcomm_channel = channel;
    }

    run(args.command, address, &brick_settings, &mut settings).await
}

/// How often `keep-alive` repeats, or `None` to send a single one
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn keep_alive_repeat(repeat: bool, every: Option<u64>, brick: &BrickSettings) -> Option<Duration> {
    match every {
        Some(secs) => Some(Duration::from_secs(secs.max(1))),
        None if repeat => Some(brick.keep_alive_interval()),
        None => None,
    }
}

#[cfg(target_os = "linux")]
async fn run(
    command: Cmd,
    address: BrickAddress,
    brick_settings: &BrickSettings,
    settings: &mut SettingsService,
) -> Result<()> {
    use nxt_control::KeepAlive;
    use std::sync::Arc;

    let mut nxt = Brick::connect(address, brick_settings).await?;
    if let Err(e) = settings.remember_address(address) {
        tracing::warn!("Could not save settings: {:#}", e);
    }

    if let Cmd::KeepAlive { repeat, every } = command {
        if let Some(interval) = keep_alive_repeat(repeat, every, brick_settings) {
            let shared = Arc::new(tokio::sync::Mutex::new(nxt));
            let keep_alive = KeepAlive::spawn(shared.clone(), interval);
            let signal = tokio::signal::ctrl_c().await;
            let sent = keep_alive.stop().await;
            println!("sent {} keep-alives", sent);
            shared.lock().await.close().await;
            return signal.context("Failed to wait for Ctrl-C");
        }
    }

    let result = execute(&mut nxt, command, &settings.get().drive).await;
    nxt.close().await;
    result
}

/// Carry out one command on an open brick
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
async fn execute<S>(nxt: &mut Brick<S>, command: Cmd, drive: &DriveSettings) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match command {
        Cmd::Tone { freq, time } => nxt
            .play_tone(freq, time)
            .await
            .context("Failed to play a tone")?,
        Cmd::KeepAlive { .. } => {
            let limit = nxt
                .stay_alive()
                .await
                .context("Failed to send keep-alive to the NXT")?;
            println!("sleep limit: {} ms", limit);
        }
        Cmd::Battery => {
            let mv = nxt
                .battery_level()
                .await
                .context("Failed to read the battery level")?;
            println!("{} mV", mv);
        }
        Cmd::Info => {
            let device = nxt.device_info().await?;
            let firmware = nxt.firmware_version().await?;
            println!("name:     {}", device.name);
            println!("address:  {}", BrickAddress(device.bluetooth_address));
            println!("flash:    {} bytes free", device.free_flash);
            println!("version:  {}", firmware);
        }
        Cmd::Button { port } => {
            nxt.init_button(port)
                .await
                .with_context(|| format!("Failed to initalize the button on port {}", port))?;
            let pressed = nxt.is_pressed(port).await.with_context(|| {
                format!("Failed to read the state of the button on port {}", port)
            })?;
            println!("{}", pressed);
        }
        Cmd::Light { port } => {
            nxt.init_light(port)
                .await
                .with_context(|| format!("Failed to initalize the light on port {}", port))?;
            let value = nxt.read_light(port).await.with_context(|| {
                format!("Failed to read the state of the light sensor on port {}", port)
            })?;
            println!("{}", value);
        }
        Cmd::Motor { port, power } => {
            let power = Power::new(power)?;
            nxt.set_motor(port, power)
                .await
                .with_context(|| format!("Failed to set motor on port {} to {}", port, power))?;
        }
        Cmd::Stop { port, coast } => match (port, coast) {
            (Some(port), false) => nxt
                .stop_motor(port)
                .await
                .with_context(|| format!("Failed to stop motor on port {}", port))?,
            (Some(port), true) => nxt
                .coast_motor(port)
                .await
                .with_context(|| format!("Failed to coast motor on port {}", port))?,
            (None, false) => nxt
                .stop_all_motors()
                .await
                .context("Failed to stop all motors.")?,
            (None, true) => nxt
                .coast_all_motors()
                .await
                .context("Failed to coast all motors.")?,
        },
        Cmd::Drive {
            direction,
            time,
            power,
            left,
            right,
        } => {
            let power = Power::new(power.unwrap_or(drive.power))?;
            let left = match left {
                Some(port) => port,
                None => MotorPort::new(drive.left_port as i32)?,
            };
            let right = match right {
                Some(port) => port,
                None => MotorPort::new(drive.right_port as i32)?,
            };
            let direction = DriveDirection::from(direction);
            nxt.drive(direction, Duration::from_secs(time), power, left, right)
                .await
                .with_context(|| format!("Failed to {}", direction.describe()))?;
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(
    _command: Cmd,
    _address: BrickAddress,
    _brick_settings: &BrickSettings,
    _settings: &mut SettingsService,
) -> Result<()> {
    Err(nxt_control::NxtError::Unsupported("RFCOMM").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nxt_control::infrastructure::bluetooth::transport::{read_frame, write_frame};
    use nxt_control::ConnectionConfig;

    #[test]
    fn test_keep_alive_interval_falls_back_to_settings() {
        let brick = BrickSettings {
            keep_alive_interval_ms: 45_000,
            ..Default::default()
        };
        assert_eq!(keep_alive_repeat(false, None, &brick), None);
        assert_eq!(
            keep_alive_repeat(true, None, &brick),
            Some(Duration::from_secs(45))
        );
        assert_eq!(
            keep_alive_repeat(true, Some(5), &brick),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            keep_alive_repeat(false, Some(0), &brick),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_parse_keep_alive_and_stop_flags() {
        let args = Args::try_parse_from(["nxtctl", "keep-alive", "--repeat"]).unwrap();
        assert!(matches!(
            args.command,
            Cmd::KeepAlive {
                repeat: true,
                every: None
            }
        ));

        let args = Args::try_parse_from(["nxtctl", "stop", "A", "--coast"]).unwrap();
        assert!(matches!(
            args.command,
            Cmd::Stop {
                port: Some(MotorPort::A),
                coast: true
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_command_leaves_brick_open_for_close() {
        let (client, mut brick) = tokio::io::duplex(256);
        let mut nxt = Brick::from_stream(client, 0, &ConnectionConfig::default());
        let answer = tokio::spawn(async move {
            read_frame(&mut brick).await.unwrap();
            write_frame(&mut brick, &[0x02, 0x0B, 0xDD]).await.unwrap();
            brick
        });

        let err = execute(&mut nxt, Cmd::Battery, &DriveSettings::default())
            .await
            .unwrap_err();
        assert_eq!(format!("{}", err), "Failed to read the battery level");
        assert!(!nxt.is_closed());
        answer.await.unwrap();
        nxt.close().await;
    }
}
