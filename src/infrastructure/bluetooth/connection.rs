//! Brick Connection Module
//!
//! Typed request/reply exchanges on top of the framed transport. One
//! request is in flight at a time. Once a reply goes missing or arrives
//! garbled the connection is marked broken and refuses further requests,
//! since a late reply would otherwise be taken as the answer to the next
//! request.

use crate::domain::error::{NxtError, Result};
use crate::infrastructure::bluetooth::protocol::{
    Command, DeviceInfo, FirmwareVersion, InputValues, MailboxMessage, MotorState, OutputState,
    Payload, Reply, SensorMode, SensorType,
};
use crate::infrastructure::bluetooth::transport::Transport;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long to wait for each reply
    pub response_timeout: std::time::Duration,
    /// Ask for acknowledgements on commands that return no data
    pub require_replies: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            response_timeout: std::time::Duration::from_secs(2),
            require_replies: true,
        }
    }
}

pub struct NxtConnection<S> {
    transport: Transport<S>,
    require_replies: bool,
    broken: bool,
}

impl<S> NxtConnection<S> {
    /// Whether an earlier exchange left the link out of step
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn check_link<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.breaks_link() && !self.broken {
                warn!("NXT link is out of step, giving it up: {}", e);
                self.broken = true;
            }
        }
        result
    }
}

impl<S> NxtConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: &ConnectionConfig) -> Self {
        Self {
            transport: Transport::new(stream, config.response_timeout),
            require_replies: config.require_replies,
            broken: false,
        }
    }

    /// Send a command and, when one is expected, check its reply
    ///
    /// Returns `None` for commands sent without a reply request.
    pub async fn execute(&mut self, command: &Command) -> Result<Option<Payload>> {
        let wants_reply = command.returns_data() || self.require_replies;
        self.exchange(command, wants_reply).await
    }

    /// Execute a command that must answer with data
    async fn query(&mut self, command: Command) -> Result<Payload> {
        self.exchange(&command, true)
            .await?
            .ok_or_else(|| NxtError::MalformedReply {
                opcode: command.opcode(),
                reason: "no reply requested".to_string(),
            })
    }

    async fn exchange(&mut self, command: &Command, wants_reply: bool) -> Result<Option<Payload>> {
        if self.broken {
            return Err(NxtError::Closed);
        }
        let telegram = command.encode(wants_reply)?;
        debug!("Sending {:?}", command);
        let sent = self.transport.send(&telegram).await;
        self.check_link(sent)?;

        if !wants_reply {
            return Ok(None);
        }

        let received = self.transport.recv().await;
        let reply = Reply::parse(&self.check_link(received)?)?;
        reply.expect(command.opcode()).map(Some)
    }

    async fn send(&mut self, command: Command) -> Result<()> {
        self.execute(&command).await.map(|_| ())
    }

    pub async fn play_tone(&mut self, frequency: u16, duration_ms: u16) -> Result<()> {
        self.send(Command::PlayTone {
            frequency,
            duration_ms,
        })
        .await
    }

    pub async fn play_sound_file(&mut self, name: &str, looping: bool) -> Result<()> {
        self.send(Command::PlaySoundFile {
            looping,
            name: name.to_string(),
        })
        .await
    }

    pub async fn stop_sound_playback(&mut self) -> Result<()> {
        self.send(Command::StopSoundPlayback).await
    }

    pub async fn start_program(&mut self, name: &str) -> Result<()> {
        self.send(Command::StartProgram {
            name: name.to_string(),
        })
        .await
    }

    pub async fn stop_program(&mut self) -> Result<()> {
        self.send(Command::StopProgram).await
    }

    pub async fn current_program_name(&mut self) -> Result<String> {
        self.query(Command::GetCurrentProgramName)
            .await?
            .program_name()
    }

    /// Returns the brick's current sleep time limit in milliseconds
    pub async fn keep_alive(&mut self) -> Result<u32> {
        self.query(Command::KeepAlive).await?.sleep_limit()
    }

    pub async fn battery_level(&mut self) -> Result<u16> {
        self.query(Command::GetBatteryLevel).await?.battery_level()
    }

    pub async fn set_output_state(&mut self, state: OutputState) -> Result<()> {
        self.send(Command::SetOutputState(state)).await
    }

    pub async fn get_output_state(&mut self, port: u8) -> Result<MotorState> {
        self.query(Command::GetOutputState { port })
            .await?
            .motor_state()
    }

    pub async fn reset_motor_position(&mut self, port: u8, relative: bool) -> Result<()> {
        self.send(Command::ResetMotorPosition { port, relative })
            .await
    }

    pub async fn set_input_mode(
        &mut self,
        port: u8,
        sensor_type: SensorType,
        sensor_mode: SensorMode,
    ) -> Result<()> {
        self.send(Command::SetInputMode {
            port,
            sensor_type,
            sensor_mode,
        })
        .await
    }

    pub async fn get_input_values(&mut self, port: u8) -> Result<InputValues> {
        self.query(Command::GetInputValues { port })
            .await?
            .input_values()
    }

    pub async fn reset_input_scaled_value(&mut self, port: u8) -> Result<()> {
        self.send(Command::ResetInputScaledValue { port }).await
    }

    pub async fn message_write(&mut self, inbox: u8, message: &[u8]) -> Result<()> {
        self.send(Command::MessageWrite {
            inbox,
            message: message.to_vec(),
        })
        .await
    }

    pub async fn message_read(
        &mut self,
        remote_inbox: u8,
        local_inbox: u8,
        remove: bool,
    ) -> Result<MailboxMessage> {
        self.query(Command::MessageRead {
            remote_inbox,
            local_inbox,
            remove,
        })
        .await?
        .mailbox_message()
    }

    pub async fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        self.query(Command::GetFirmwareVersion)
            .await?
            .firmware_version()
    }

    pub async fn device_info(&mut self) -> Result<DeviceInfo> {
        self.query(Command::GetDeviceInfo).await?.device_info()
    }

    pub async fn set_brick_name(&mut self, name: &str) -> Result<()> {
        self.send(Command::SetBrickName {
            name: name.to_string(),
        })
        .await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.transport.shutdown().await
    }
}
