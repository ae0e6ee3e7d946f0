//! Brick Module
//!
//! `Brick` is the handle applications hold: one open Bluetooth link to
//! one NXT, with the sensor and motor operations expressed in the
//! port numbers printed on the brick.

use crate::domain::error::{NxtError, Result};
use crate::domain::models::{
    ConnectionStatus, DriveDirection, MotorPort, Power, SensorPort, ALL_MOTORS,
};
use crate::infrastructure::bluetooth::connection::{ConnectionConfig, NxtConnection};
use crate::infrastructure::bluetooth::protocol::{
    DeviceInfo, FirmwareVersion, InputValues, MailboxMessage, MotorState, OutputState, SensorMode,
    SensorType,
};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

pub struct Brick<S> {
    connection: Option<NxtConnection<S>>,
    dev_id: u16,
}

impl<S> Brick<S> {
    pub fn status(&self) -> ConnectionStatus {
        match &self.connection {
            Some(connection) if !connection.is_broken() => ConnectionStatus::Open,
            _ => ConnectionStatus::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status() == ConnectionStatus::Closed
    }
}

#[cfg(target_os = "linux")]
impl Brick<crate::infrastructure::bluetooth::transport::RfcommStream> {
    /// Open an RFCOMM link to the brick at `address`
    pub async fn connect(
        address: crate::domain::models::BrickAddress,
        settings: &crate::domain::settings::BrickSettings,
    ) -> Result<Self> {
        use crate::infrastructure::bluetooth::transport::connect_rfcomm;

        info!(
            "Connecting to NXT at {} (channel {})",
            address, settings.rfcomm_channel
        );
        let stream = connect_rfcomm(address, settings.rfcomm_channel)
            .await
            .map_err(|source| NxtError::ConnectFailed {
                address: address.to_string(),
                source,
            })?;

        let config = ConnectionConfig {
            response_timeout: settings.response_timeout(),
            require_replies: settings.require_replies,
        };
        let brick = Self::from_stream(stream, settings.adapter_id, &config);
        info!("Connected to {}", brick);
        Ok(brick)
    }
}

impl<S> Brick<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn from_stream(stream: S, dev_id: u16, config: &ConnectionConfig) -> Self {
        Self {
            connection: Some(NxtConnection::new(stream, config)),
            dev_id,
        }
    }

    fn connection(&mut self) -> Result<&mut NxtConnection<S>> {
        if self.connection.as_ref().is_some_and(|c| c.is_broken()) {
            // Dropping the stream discards whatever reply is still in flight
            info!("Closing NXT connection after a link failure");
            self.connection = None;
        }
        self.connection.as_mut().ok_or(NxtError::Closed)
    }

    /// Local adapter the link was opened through
    pub fn dev_id(&self) -> Result<u16> {
        if self.is_closed() {
            return Err(NxtError::Closed);
        }
        Ok(self.dev_id)
    }

    /// Close the link. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.shutdown().await {
                debug!("Error while shutting down NXT link: {}", e);
            }
            info!("Closed NXT connection");
        }
    }

    /// Play a tone of `freq` Hz for `time_ms` milliseconds
    pub async fn play_tone(&mut self, freq: u16, time_ms: u16) -> Result<()> {
        self.connection()?.play_tone(freq, time_ms).await
    }

    /// Play a sound file stored on the brick
    pub async fn play_sound_file(&mut self, name: &str, looping: bool) -> Result<()> {
        self.connection()?.play_sound_file(name, looping).await
    }

    pub async fn stop_sound(&mut self) -> Result<()> {
        self.connection()?.stop_sound_playback().await
    }

    /// Keep the brick from powering down; returns its sleep limit in ms
    pub async fn stay_alive(&mut self) -> Result<u32> {
        self.connection()?.keep_alive().await
    }

    /// Battery voltage in millivolts
    pub async fn battery_level(&mut self) -> Result<u16> {
        self.connection()?.battery_level().await
    }

    pub async fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        self.connection()?.firmware_version().await
    }

    pub async fn device_info(&mut self) -> Result<DeviceInfo> {
        self.connection()?.device_info().await
    }

    pub async fn set_brick_name(&mut self, name: &str) -> Result<()> {
        self.connection()?.set_brick_name(name).await
    }

    pub async fn start_program(&mut self, name: &str) -> Result<()> {
        self.connection()?.start_program(name).await
    }

    pub async fn stop_program(&mut self) -> Result<()> {
        self.connection()?.stop_program().await
    }

    pub async fn current_program_name(&mut self) -> Result<String> {
        self.connection()?.current_program_name().await
    }

    /// Post a message to one of the running program's inboxes (0-9)
    pub async fn message_write(&mut self, inbox: u8, message: &[u8]) -> Result<()> {
        self.connection()?.message_write(inbox, message).await
    }

    /// Fetch a message the running program left in `remote_inbox`
    pub async fn message_read(
        &mut self,
        remote_inbox: u8,
        local_inbox: u8,
        remove: bool,
    ) -> Result<MailboxMessage> {
        self.connection()?
            .message_read(remote_inbox, local_inbox, remove)
            .await
    }

    /// Tell the brick a touch sensor is plugged into `port`
    pub async fn init_button(&mut self, port: SensorPort) -> Result<()> {
        debug!("Initializing button on port {}", port);
        self.connection()?
            .set_input_mode(port.index(), SensorType::Switch, SensorMode::Boolean)
            .await
    }

    /// Tell the brick a light sensor (with its LED on) is plugged into `port`
    pub async fn init_light(&mut self, port: SensorPort) -> Result<()> {
        debug!("Initializing light sensor on port {}", port);
        self.connection()?
            .set_input_mode(
                port.index(),
                SensorType::LightActive,
                SensorMode::PercentFullScale,
            )
            .await
    }

    pub async fn read_sensor(&mut self, port: SensorPort) -> Result<InputValues> {
        let values = self.connection()?.get_input_values(port.index()).await?;
        if !values.valid {
            warn!("Sensor reading on port {} is not marked valid yet", port);
        }
        Ok(values)
    }

    pub async fn reset_sensor(&mut self, port: SensorPort) -> Result<()> {
        self.connection()?
            .reset_input_scaled_value(port.index())
            .await
    }

    pub async fn is_pressed(&mut self, port: SensorPort) -> Result<bool> {
        Ok(self.read_sensor(port).await?.scaled != 0)
    }

    /// Light level on a 0-1023 scale
    pub async fn read_light(&mut self, port: SensorPort) -> Result<u16> {
        Ok(self.read_sensor(port).await?.normalized)
    }

    pub async fn set_motor(&mut self, port: MotorPort, power: Power) -> Result<()> {
        debug!("Setting motor {} to {}", port, power);
        self.connection()?
            .set_output_state(OutputState::running(port.index(), power.value()))
            .await
    }

    pub async fn stop_motor(&mut self, port: MotorPort) -> Result<()> {
        debug!("Stopping motor {}", port);
        self.connection()?
            .set_output_state(OutputState::braked(port.index()))
            .await
    }

    pub async fn stop_all_motors(&mut self) -> Result<()> {
        debug!("Stopping all motors");
        self.connection()?
            .set_output_state(OutputState::braked(ALL_MOTORS))
            .await
    }

    /// Cut power to a motor and let it spin down on its own
    pub async fn coast_motor(&mut self, port: MotorPort) -> Result<()> {
        debug!("Coasting motor {}", port);
        self.connection()?
            .set_output_state(OutputState::coasting(port.index()))
            .await
    }

    pub async fn coast_all_motors(&mut self) -> Result<()> {
        debug!("Coasting all motors");
        self.connection()?
            .set_output_state(OutputState::coasting(ALL_MOTORS))
            .await
    }

    pub async fn motor_state(&mut self, port: MotorPort) -> Result<MotorState> {
        self.connection()?.get_output_state(port.index()).await
    }

    pub async fn reset_motor_position(&mut self, port: MotorPort, relative: bool) -> Result<()> {
        self.connection()?
            .reset_motor_position(port.index(), relative)
            .await
    }

    /// Run both drive motors for `time`, then brake them
    pub async fn drive(
        &mut self,
        direction: DriveDirection,
        time: Duration,
        power: Power,
        left_port: MotorPort,
        right_port: MotorPort,
    ) -> Result<()> {
        self.connection()?;
        let (left_power, right_power) = direction.motor_powers(power);
        info!(
            "{} for {:?} (left {} at {}, right {} at {})",
            direction.describe(),
            time,
            left_port,
            left_power,
            right_port,
            right_power
        );

        self.set_motor(left_port, left_power).await?;
        if let Err(e) = self.set_motor(right_port, right_power).await {
            // Don't leave one wheel spinning
            let _ = self.stop_motor(left_port).await;
            return Err(e);
        }

        tokio::time::sleep(time).await;

        let left = self.stop_motor(left_port).await;
        let right = self.stop_motor(right_port).await;
        left.and(right)
    }

    pub async fn drive_forward(
        &mut self,
        time: Duration,
        power: Power,
        left_port: MotorPort,
        right_port: MotorPort,
    ) -> Result<()> {
        self.drive(DriveDirection::Forward, time, power, left_port, right_port)
            .await
    }

    pub async fn drive_backward(
        &mut self,
        time: Duration,
        power: Power,
        left_port: MotorPort,
        right_port: MotorPort,
    ) -> Result<()> {
        self.drive(DriveDirection::Backward, time, power, left_port, right_port)
            .await
    }

    pub async fn turn_left(
        &mut self,
        time: Duration,
        power: Power,
        left_port: MotorPort,
        right_port: MotorPort,
    ) -> Result<()> {
        self.drive(DriveDirection::TurnLeft, time, power, left_port, right_port)
            .await
    }

    pub async fn turn_right(
        &mut self,
        time: Duration,
        power: Power,
        left_port: MotorPort,
        right_port: MotorPort,
    ) -> Result<()> {
        self.drive(DriveDirection::TurnRight, time, power, left_port, right_port)
            .await
    }
}

impl<S> fmt::Display for Brick<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<NXT: {}{}>",
            self.dev_id,
            if self.is_closed() {
                " (closed)"
            } else {
                ""
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_brick_refuses_operations() {
        let (client, _brick) = tokio::io::duplex(64);
        let mut nxt = Brick::from_stream(client, 2, &ConnectionConfig::default());
        assert_eq!(nxt.to_string(), "<NXT: 2>");
        assert_eq!(nxt.dev_id().unwrap(), 2);

        nxt.close().await;
        nxt.close().await;
        assert!(nxt.is_closed());
        assert_eq!(nxt.to_string(), "<NXT: 2 (closed)>");

        assert!(matches!(nxt.dev_id(), Err(NxtError::Closed)));
        assert!(matches!(nxt.play_tone(440, 100).await, Err(NxtError::Closed)));
        assert!(matches!(nxt.stop_all_motors().await, Err(NxtError::Closed)));
        assert!(matches!(
            nxt.drive_forward(
                Duration::from_secs(1),
                Power::new(50).unwrap(),
                MotorPort::B,
                MotorPort::C
            )
            .await,
            Err(NxtError::Closed)
        ));
    }
}
