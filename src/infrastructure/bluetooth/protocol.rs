//! NXT Communication Protocol
//!
//! Telegram definitions for the direct and system commands the NXT
//! firmware accepts over Bluetooth, plus decoders for their replies.

use crate::domain::error::{NxtError, Result};
use std::fmt;
use tracing::trace;

/// Largest telegram the brick accepts over Bluetooth
pub const MAX_TELEGRAM_LEN: usize = 64;

/// Filename field width (15.3 name + NUL)
pub const FILENAME_LEN: usize = 20;

/// Brick name field width in SetBrickName
pub const BRICK_NAME_LEN: usize = 16;

/// Largest mailbox message, excluding the NUL terminator
pub const MAX_MESSAGE_LEN: usize = 58;

pub const MAILBOX_COUNT: u8 = 10;

/// Outgoing mailboxes a running program can fill (0-9 plus the
/// response queues 10-19)
pub const REMOTE_MAILBOX_COUNT: u8 = 20;

/// First byte of every telegram
pub mod telegram_type {
    pub const DIRECT_COMMAND: u8 = 0x00;
    pub const SYSTEM_COMMAND: u8 = 0x01;
    pub const REPLY: u8 = 0x02;
    /// Set on a command type to tell the brick not to answer
    pub const NO_REPLY: u8 = 0x80;
}

pub mod opcode {
    pub const START_PROGRAM: u8 = 0x00;
    pub const STOP_PROGRAM: u8 = 0x01;
    pub const PLAY_SOUND_FILE: u8 = 0x02;
    pub const PLAY_TONE: u8 = 0x03;
    pub const SET_OUTPUT_STATE: u8 = 0x04;
    pub const SET_INPUT_MODE: u8 = 0x05;
    pub const GET_OUTPUT_STATE: u8 = 0x06;
    pub const GET_INPUT_VALUES: u8 = 0x07;
    pub const RESET_INPUT_SCALED_VALUE: u8 = 0x08;
    pub const MESSAGE_WRITE: u8 = 0x09;
    pub const RESET_MOTOR_POSITION: u8 = 0x0A;
    pub const GET_BATTERY_LEVEL: u8 = 0x0B;
    pub const STOP_SOUND_PLAYBACK: u8 = 0x0C;
    pub const KEEP_ALIVE: u8 = 0x0D;
    pub const GET_CURRENT_PROGRAM_NAME: u8 = 0x11;
    pub const MESSAGE_READ: u8 = 0x13;

    pub const GET_FIRMWARE_VERSION: u8 = 0x88;
    pub const SET_BRICK_NAME: u8 = 0x98;
    pub const GET_DEVICE_INFO: u8 = 0x9B;
}

/// Status byte carried by every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    PendingTransaction,
    MailboxEmpty,
    RequestFailed,
    UnknownOpcode,
    InsanePacket,
    OutOfRange,
    BusError,
    NoFreeMemory,
    InvalidChannel,
    ChannelBusy,
    NoActiveProgram,
    IllegalSize,
    IllegalMailbox,
    InvalidField,
    BadInputOutput,
    InsufficientMemory,
    BadArguments,
    Unknown(u8),
}

impl CommandStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Success,
            0x20 => Self::PendingTransaction,
            0x40 => Self::MailboxEmpty,
            0xBD => Self::RequestFailed,
            0xBE => Self::UnknownOpcode,
            0xBF => Self::InsanePacket,
            0xC0 => Self::OutOfRange,
            0xDD => Self::BusError,
            0xDE => Self::NoFreeMemory,
            0xDF => Self::InvalidChannel,
            0xE0 => Self::ChannelBusy,
            0xEC => Self::NoActiveProgram,
            0xED => Self::IllegalSize,
            0xEE => Self::IllegalMailbox,
            0xEF => Self::InvalidField,
            0xF0 => Self::BadInputOutput,
            0xFB => Self::InsufficientMemory,
            0xFF => Self::BadArguments,
            other => Self::Unknown(other),
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::PendingTransaction => "pending communication transaction in progress",
            Self::MailboxEmpty => "specified mailbox queue is empty",
            Self::RequestFailed => "request failed (i.e. specified file not found)",
            Self::UnknownOpcode => "unknown command opcode",
            Self::InsanePacket => "insane packet",
            Self::OutOfRange => "data contains out-of-range values",
            Self::BusError => "communication bus error",
            Self::NoFreeMemory => "no free memory in communication buffer",
            Self::InvalidChannel => "specified channel/connection is not valid",
            Self::ChannelBusy => "specified channel/connection not configured or busy",
            Self::NoActiveProgram => "no active program",
            Self::IllegalSize => "illegal size specified",
            Self::IllegalMailbox => "illegal mailbox queue ID specified",
            Self::InvalidField => "attempted to access invalid field of a structure",
            Self::BadInputOutput => "bad input or output specified",
            Self::InsufficientMemory => "insufficient memory available",
            Self::BadArguments => "bad arguments",
            Self::Unknown(byte) => return write!(f, "unknown status {:#04X}", byte),
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorType {
    NoSensor = 0x00,
    Switch = 0x01,
    Temperature = 0x02,
    Reflection = 0x03,
    Angle = 0x04,
    LightActive = 0x05,
    LightInactive = 0x06,
    SoundDb = 0x07,
    SoundDba = 0x08,
    Custom = 0x09,
    LowSpeed = 0x0A,
    LowSpeed9V = 0x0B,
}

impl SensorType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::NoSensor,
            0x01 => Self::Switch,
            0x02 => Self::Temperature,
            0x03 => Self::Reflection,
            0x04 => Self::Angle,
            0x05 => Self::LightActive,
            0x06 => Self::LightInactive,
            0x07 => Self::SoundDb,
            0x08 => Self::SoundDba,
            0x09 => Self::Custom,
            0x0A => Self::LowSpeed,
            0x0B => Self::LowSpeed9V,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorMode {
    Raw = 0x00,
    Boolean = 0x20,
    TransitionCount = 0x40,
    PeriodCounter = 0x60,
    PercentFullScale = 0x80,
    Celsius = 0xA0,
    Fahrenheit = 0xC0,
    AngleSteps = 0xE0,
}

impl SensorMode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        // Low bits carry the slope, only the top three select the mode
        Some(match byte & 0xE0 {
            0x00 => Self::Raw,
            0x20 => Self::Boolean,
            0x40 => Self::TransitionCount,
            0x60 => Self::PeriodCounter,
            0x80 => Self::PercentFullScale,
            0xA0 => Self::Celsius,
            0xC0 => Self::Fahrenheit,
            0xE0 => Self::AngleSteps,
            _ => return None,
        })
    }
}

/// Output mode bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputMode(pub u8);

impl OutputMode {
    pub const IDLE: OutputMode = OutputMode(0x00);
    pub const MOTOR_ON: OutputMode = OutputMode(0x01);
    pub const BRAKE: OutputMode = OutputMode(0x02);
    pub const REGULATED: OutputMode = OutputMode(0x04);

    pub fn contains(&self, other: OutputMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OutputMode {
    type Output = OutputMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        OutputMode(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegulationMode {
    Idle = 0x00,
    MotorSpeed = 0x01,
    MotorSync = 0x02,
}

impl RegulationMode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Idle),
            0x01 => Some(Self::MotorSpeed),
            0x02 => Some(Self::MotorSync),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0x00,
    RampUp = 0x10,
    Running = 0x20,
    RampDown = 0x40,
}

impl RunState {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Idle),
            0x10 => Some(Self::RampUp),
            0x20 => Some(Self::Running),
            0x40 => Some(Self::RampDown),
            _ => None,
        }
    }
}

/// Parameters of SetOutputState, echoed back by GetOutputState
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputState {
    /// 0 indexed output port, or `ALL_MOTORS`
    pub port: u8,
    pub power: i8,
    pub mode: OutputMode,
    pub regulation: RegulationMode,
    pub turn_ratio: i8,
    pub run_state: RunState,
    /// 0 runs forever
    pub tacho_limit: u32,
}

impl OutputState {
    /// Speed regulated, running until told otherwise
    pub fn running(port: u8, power: i8) -> Self {
        Self {
            port,
            power,
            mode: OutputMode::MOTOR_ON | OutputMode::BRAKE | OutputMode::REGULATED,
            regulation: RegulationMode::MotorSpeed,
            turn_ratio: 0,
            run_state: RunState::Running,
            tacho_limit: 0,
        }
    }

    /// Actively hold the motor at zero power
    pub fn braked(port: u8) -> Self {
        Self {
            port,
            power: 0,
            mode: OutputMode::MOTOR_ON | OutputMode::BRAKE | OutputMode::REGULATED,
            regulation: RegulationMode::MotorSpeed,
            turn_ratio: 0,
            run_state: RunState::Running,
            tacho_limit: 0,
        }
    }

    /// Let the motor spin down freely
    pub fn coasting(port: u8) -> Self {
        Self {
            port,
            power: 0,
            mode: OutputMode::IDLE,
            regulation: RegulationMode::Idle,
            turn_ratio: 0,
            run_state: RunState::Idle,
            tacho_limit: 0,
        }
    }
}

/// Full motor state from GetOutputState
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorState {
    pub output: OutputState,
    /// Counts since the last motor command reset
    pub tacho_count: i32,
    /// Counts relative to the last programmed movement
    pub block_tacho_count: i32,
    /// Counts relative to the last reset of the rotation sensor
    pub rotation_count: i32,
}

/// Reading from GetInputValues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputValues {
    pub port: u8,
    pub valid: bool,
    pub calibrated: bool,
    pub sensor_type: SensorType,
    pub sensor_mode: SensorMode,
    pub raw: u16,
    /// 0-1023
    pub normalized: u16,
    /// Value in the current mode's units
    pub scaled: i16,
    pub calibrated_value: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub protocol: (u8, u8),
    pub firmware: (u8, u8),
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "firmware {}.{:02}, protocol {}.{}",
            self.firmware.0, self.firmware.1, self.protocol.0, self.protocol.1
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub bluetooth_address: [u8; 6],
    pub signal_strength: u32,
    /// Free user flash in bytes
    pub free_flash: u32,
}

/// A message popped from one of the brick's outgoing mailboxes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    pub inbox: u8,
    pub data: Vec<u8>,
}

/// Every command this client can send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartProgram { name: String },
    StopProgram,
    PlaySoundFile { looping: bool, name: String },
    /// Frequency in Hz (200-14000), duration in milliseconds
    PlayTone { frequency: u16, duration_ms: u16 },
    SetOutputState(OutputState),
    SetInputMode { port: u8, sensor_type: SensorType, sensor_mode: SensorMode },
    GetOutputState { port: u8 },
    GetInputValues { port: u8 },
    ResetInputScaledValue { port: u8 },
    MessageWrite { inbox: u8, message: Vec<u8> },
    ResetMotorPosition { port: u8, relative: bool },
    GetBatteryLevel,
    StopSoundPlayback,
    KeepAlive,
    GetCurrentProgramName,
    MessageRead { remote_inbox: u8, local_inbox: u8, remove: bool },
    GetFirmwareVersion,
    SetBrickName { name: String },
    GetDeviceInfo,
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::StartProgram { .. } => opcode::START_PROGRAM,
            Self::StopProgram => opcode::STOP_PROGRAM,
            Self::PlaySoundFile { .. } => opcode::PLAY_SOUND_FILE,
            Self::PlayTone { .. } => opcode::PLAY_TONE,
            Self::SetOutputState(_) => opcode::SET_OUTPUT_STATE,
            Self::SetInputMode { .. } => opcode::SET_INPUT_MODE,
            Self::GetOutputState { .. } => opcode::GET_OUTPUT_STATE,
            Self::GetInputValues { .. } => opcode::GET_INPUT_VALUES,
            Self::ResetInputScaledValue { .. } => opcode::RESET_INPUT_SCALED_VALUE,
            Self::MessageWrite { .. } => opcode::MESSAGE_WRITE,
            Self::ResetMotorPosition { .. } => opcode::RESET_MOTOR_POSITION,
            Self::GetBatteryLevel => opcode::GET_BATTERY_LEVEL,
            Self::StopSoundPlayback => opcode::STOP_SOUND_PLAYBACK,
            Self::KeepAlive => opcode::KEEP_ALIVE,
            Self::GetCurrentProgramName => opcode::GET_CURRENT_PROGRAM_NAME,
            Self::MessageRead { .. } => opcode::MESSAGE_READ,
            Self::GetFirmwareVersion => opcode::GET_FIRMWARE_VERSION,
            Self::SetBrickName { .. } => opcode::SET_BRICK_NAME,
            Self::GetDeviceInfo => opcode::GET_DEVICE_INFO,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Self::GetFirmwareVersion | Self::SetBrickName { .. } | Self::GetDeviceInfo
        )
    }

    /// Commands whose reply carries data and therefore always need one
    pub fn returns_data(&self) -> bool {
        matches!(
            self,
            Self::GetOutputState { .. }
                | Self::GetInputValues { .. }
                | Self::GetBatteryLevel
                | Self::KeepAlive
                | Self::GetCurrentProgramName
                | Self::MessageRead { .. }
                | Self::GetFirmwareVersion
                | Self::GetDeviceInfo
        )
    }

    /// Encode into a telegram (without the Bluetooth length prefix)
    pub fn encode(&self, reply_required: bool) -> Result<Vec<u8>> {
        let mut kind = if self.is_system() {
            telegram_type::SYSTEM_COMMAND
        } else {
            telegram_type::DIRECT_COMMAND
        };
        if !reply_required {
            kind |= telegram_type::NO_REPLY;
        }

        let mut out = vec![kind, self.opcode()];
        match self {
            Self::StartProgram { name } => put_fixed_string(&mut out, name, FILENAME_LEN)?,
            Self::PlaySoundFile { looping, name } => {
                out.push(*looping as u8);
                put_fixed_string(&mut out, name, FILENAME_LEN)?;
            }
            Self::PlayTone {
                frequency,
                duration_ms,
            } => {
                out.extend_from_slice(&frequency.to_le_bytes());
                out.extend_from_slice(&duration_ms.to_le_bytes());
            }
            Self::SetOutputState(state) => {
                out.push(state.port);
                out.push(state.power as u8);
                out.push(state.mode.0);
                out.push(state.regulation as u8);
                out.push(state.turn_ratio as u8);
                out.push(state.run_state as u8);
                out.extend_from_slice(&state.tacho_limit.to_le_bytes());
            }
            Self::SetInputMode {
                port,
                sensor_type,
                sensor_mode,
            } => {
                out.push(*port);
                out.push(*sensor_type as u8);
                out.push(*sensor_mode as u8);
            }
            Self::GetOutputState { port }
            | Self::GetInputValues { port }
            | Self::ResetInputScaledValue { port } => out.push(*port),
            Self::MessageWrite { inbox, message } => {
                check_mailbox("mailbox", *inbox, MAILBOX_COUNT)?;
                if message.len() > MAX_MESSAGE_LEN {
                    return Err(NxtError::InvalidArgument(format!(
                        "message is {} bytes, at most {} fit in a telegram",
                        message.len(),
                        MAX_MESSAGE_LEN
                    )));
                }
                out.push(*inbox);
                out.push((message.len() + 1) as u8);
                out.extend_from_slice(message);
                out.push(0);
            }
            Self::ResetMotorPosition { port, relative } => {
                out.push(*port);
                out.push(*relative as u8);
            }
            Self::MessageRead {
                remote_inbox,
                local_inbox,
                remove,
            } => {
                check_mailbox("remote mailbox", *remote_inbox, REMOTE_MAILBOX_COUNT)?;
                check_mailbox("local mailbox", *local_inbox, MAILBOX_COUNT)?;
                out.push(*remote_inbox);
                out.push(*local_inbox);
                out.push(*remove as u8);
            }
            Self::SetBrickName { name } => put_fixed_string(&mut out, name, BRICK_NAME_LEN)?,
            Self::StopProgram
            | Self::GetBatteryLevel
            | Self::StopSoundPlayback
            | Self::KeepAlive
            | Self::GetCurrentProgramName
            | Self::GetFirmwareVersion
            | Self::GetDeviceInfo => {}
        }

        trace!("Encoded telegram: {:02X?}", &out);
        Ok(out)
    }
}

fn check_mailbox(what: &str, inbox: u8, count: u8) -> Result<()> {
    if inbox >= count {
        return Err(NxtError::InvalidArgument(format!(
            "{} must be 0-{}, got: {}",
            what,
            count - 1,
            inbox
        )));
    }
    Ok(())
}

/// Write `value` as a NUL padded field of `width` bytes
fn put_fixed_string(out: &mut Vec<u8>, value: &str, width: usize) -> Result<()> {
    if !value.is_ascii() || value.len() >= width {
        return Err(NxtError::InvalidArgument(format!(
            "{:?} must be ASCII and at most {} characters",
            value,
            width - 1
        )));
    }
    out.extend_from_slice(value.as_bytes());
    out.resize(out.len() + width - value.len(), 0);
    Ok(())
}

/// A reply telegram: `[0x02, opcode, status, payload...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub opcode: u8,
    pub status: CommandStatus,
    pub payload: Vec<u8>,
}

impl Reply {
    pub fn parse(telegram: &[u8]) -> Result<Self> {
        if telegram.len() < 3 {
            return Err(NxtError::MalformedReply {
                opcode: telegram.get(1).copied().unwrap_or(0),
                reason: format!("{} bytes is too short for a reply", telegram.len()),
            });
        }
        if telegram[0] != telegram_type::REPLY {
            return Err(NxtError::MalformedReply {
                opcode: telegram[1],
                reason: format!("telegram type {:#04X} is not a reply", telegram[0]),
            });
        }

        Ok(Self {
            opcode: telegram[1],
            status: CommandStatus::from_byte(telegram[2]),
            payload: telegram[3..].to_vec(),
        })
    }

    /// Check that this answers `opcode` successfully and hand back its payload
    pub fn expect(self, opcode: u8) -> Result<Payload> {
        if self.opcode != opcode {
            return Err(NxtError::UnexpectedReply {
                expected: opcode,
                got: self.opcode,
            });
        }
        if !self.status.is_success() {
            return Err(NxtError::Command {
                opcode,
                status: self.status,
            });
        }
        Ok(Payload {
            opcode,
            data: self.payload,
            pos: 0,
        })
    }
}

/// Cursor over a reply payload
#[derive(Debug)]
pub struct Payload {
    opcode: u8,
    data: Vec<u8>,
    pos: usize,
}

impl Payload {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.pos + n > self.data.len() {
            return Err(NxtError::MalformedReply {
                opcode: self.opcode,
                reason: format!(
                    "payload ends after {} bytes, needed {}",
                    self.data.len(),
                    self.pos + n
                ),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    /// Read a NUL padded field of `width` bytes
    pub fn string(&mut self, width: usize) -> Result<String> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    fn malformed(&self, reason: String) -> NxtError {
        NxtError::MalformedReply {
            opcode: self.opcode,
            reason,
        }
    }

    pub fn input_values(mut self) -> Result<InputValues> {
        let port = self.u8()?;
        let valid = self.bool()?;
        let calibrated = self.bool()?;
        let type_byte = self.u8()?;
        let sensor_type = SensorType::from_byte(type_byte)
            .ok_or_else(|| self.malformed(format!("unknown sensor type {:#04X}", type_byte)))?;
        let mode_byte = self.u8()?;
        let sensor_mode = SensorMode::from_byte(mode_byte)
            .ok_or_else(|| self.malformed(format!("unknown sensor mode {:#04X}", mode_byte)))?;

        Ok(InputValues {
            port,
            valid,
            calibrated,
            sensor_type,
            sensor_mode,
            raw: self.u16()?,
            normalized: self.u16()?,
            scaled: self.i16()?,
            calibrated_value: self.i16()?,
        })
    }

    pub fn motor_state(mut self) -> Result<MotorState> {
        let port = self.u8()?;
        let power = self.i8()?;
        let mode = OutputMode(self.u8()?);
        let reg_byte = self.u8()?;
        let regulation = RegulationMode::from_byte(reg_byte)
            .ok_or_else(|| self.malformed(format!("unknown regulation mode {:#04X}", reg_byte)))?;
        let turn_ratio = self.i8()?;
        let run_byte = self.u8()?;
        let run_state = RunState::from_byte(run_byte)
            .ok_or_else(|| self.malformed(format!("unknown run state {:#04X}", run_byte)))?;

        Ok(MotorState {
            output: OutputState {
                port,
                power,
                mode,
                regulation,
                turn_ratio,
                run_state,
                tacho_limit: self.u32()?,
            },
            tacho_count: self.i32()?,
            block_tacho_count: self.i32()?,
            rotation_count: self.i32()?,
        })
    }

    /// Battery voltage in millivolts
    pub fn battery_level(mut self) -> Result<u16> {
        self.u16()
    }

    /// Current sleep time limit in milliseconds
    pub fn sleep_limit(mut self) -> Result<u32> {
        self.u32()
    }

    pub fn program_name(mut self) -> Result<String> {
        self.string(FILENAME_LEN)
    }

    pub fn mailbox_message(mut self) -> Result<MailboxMessage> {
        let inbox = self.u8()?;
        let size = self.u8()? as usize;
        let available = self.data.len() - self.pos;
        if size > available {
            return Err(self.malformed(format!(
                "message claims {} bytes but only {} follow",
                size, available
            )));
        }
        let mut data = self.bytes(size)?;
        if data.last() == Some(&0) {
            data.pop();
        }
        Ok(MailboxMessage { inbox, data })
    }

    pub fn firmware_version(mut self) -> Result<FirmwareVersion> {
        let protocol_minor = self.u8()?;
        let protocol_major = self.u8()?;
        let firmware_minor = self.u8()?;
        let firmware_major = self.u8()?;
        Ok(FirmwareVersion {
            protocol: (protocol_major, protocol_minor),
            firmware: (firmware_major, firmware_minor),
        })
    }

    pub fn device_info(mut self) -> Result<DeviceInfo> {
        let name = self.string(15)?;
        let address = self.bytes(7)?;
        let mut bluetooth_address = [0u8; 6];
        bluetooth_address.copy_from_slice(&address[..6]);
        Ok(DeviceInfo {
            name,
            bluetooth_address,
            signal_strength: self.u32()?,
            free_flash: self.u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(opcode: u8, status: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![telegram_type::REPLY, opcode, status];
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_play_tone_bytes() {
        let cmd = Command::PlayTone {
            frequency: 440,
            duration_ms: 500,
        };
        assert_eq!(
            cmd.encode(true).unwrap(),
            vec![0x00, 0x03, 0xB8, 0x01, 0xF4, 0x01]
        );
        assert_eq!(cmd.encode(false).unwrap()[0], 0x80);
    }

    #[test]
    fn test_set_output_state_bytes() {
        let cmd = Command::SetOutputState(OutputState::running(1, -50));
        assert_eq!(
            cmd.encode(true).unwrap(),
            vec![0x00, 0x04, 0x01, 0xCE, 0x07, 0x01, 0x00, 0x20, 0, 0, 0, 0]
        );

        let coast = Command::SetOutputState(OutputState::coasting(0xFF));
        assert_eq!(
            coast.encode(false).unwrap(),
            vec![0x80, 0x04, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_set_input_mode_bytes() {
        let cmd = Command::SetInputMode {
            port: 2,
            sensor_type: SensorType::LightActive,
            sensor_mode: SensorMode::PercentFullScale,
        };
        assert_eq!(cmd.encode(true).unwrap(), vec![0x00, 0x05, 0x02, 0x05, 0x80]);
    }

    #[test]
    fn test_system_commands_use_system_type() {
        assert_eq!(Command::GetFirmwareVersion.encode(true).unwrap(), vec![0x01, 0x88]);
        assert_eq!(Command::GetDeviceInfo.encode(true).unwrap(), vec![0x01, 0x9B]);

        let rename = Command::SetBrickName {
            name: "Robo".to_string(),
        }
        .encode(false)
        .unwrap();
        assert_eq!(rename[0], 0x81);
        assert_eq!(rename.len(), 2 + BRICK_NAME_LEN);
        assert_eq!(&rename[2..6], b"Robo");
        assert!(rename[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_filename_field() {
        let cmd = Command::StartProgram {
            name: "drive.rxe".to_string(),
        };
        let bytes = cmd.encode(true).unwrap();
        assert_eq!(bytes.len(), 2 + FILENAME_LEN);
        assert_eq!(&bytes[2..11], b"drive.rxe");

        let too_long = Command::StartProgram {
            name: "a_really_long_name.rxe".to_string(),
        };
        assert!(matches!(too_long.encode(true), Err(NxtError::InvalidArgument(_))));
    }

    #[test]
    fn test_message_write_limits() {
        let ok = Command::MessageWrite {
            inbox: 9,
            message: b"hi".to_vec(),
        };
        assert_eq!(ok.encode(true).unwrap(), vec![0x00, 0x09, 9, 3, b'h', b'i', 0]);

        let bad_inbox = Command::MessageWrite {
            inbox: 10,
            message: vec![],
        };
        assert!(bad_inbox.encode(true).is_err());

        let too_big = Command::MessageWrite {
            inbox: 0,
            message: vec![b'x'; MAX_MESSAGE_LEN + 1],
        };
        assert!(too_big.encode(true).is_err());
    }

    #[test]
    fn test_message_read_mailbox_bounds() {
        let read = |remote_inbox, local_inbox| Command::MessageRead {
            remote_inbox,
            local_inbox,
            remove: true,
        };
        assert_eq!(read(19, 9).encode(true).unwrap(), vec![0x00, 0x13, 19, 9, 1]);

        match read(20, 0).encode(true) {
            Err(NxtError::InvalidArgument(msg)) => {
                assert_eq!(msg, "remote mailbox must be 0-19, got: 20")
            }
            other => panic!("expected invalid argument, got {other:?}"),
        }
        assert!(matches!(
            read(0, 10).encode(true),
            Err(NxtError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_every_command_fits_a_telegram() {
        let commands = [
            Command::PlaySoundFile {
                looping: true,
                name: "Woops.rso".to_string(),
            },
            Command::MessageWrite {
                inbox: 0,
                message: vec![b'x'; MAX_MESSAGE_LEN],
            },
            Command::SetOutputState(OutputState::braked(2)),
        ];
        for cmd in commands {
            assert!(cmd.encode(true).unwrap().len() <= MAX_TELEGRAM_LEN);
        }
    }

    #[test]
    fn test_reply_status_error() {
        let telegram = reply(opcode::GET_INPUT_VALUES, 0xC0, &[]);
        let err = Reply::parse(&telegram)
            .unwrap()
            .expect(opcode::GET_INPUT_VALUES)
            .unwrap_err();
        match err {
            NxtError::Command { opcode, status } => {
                assert_eq!(opcode, 0x07);
                assert_eq!(status, CommandStatus::OutOfRange);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reply_rejects_wrong_opcode_and_type() {
        let telegram = reply(opcode::KEEP_ALIVE, 0, &[0, 0, 0, 0]);
        assert!(matches!(
            Reply::parse(&telegram).unwrap().expect(opcode::GET_BATTERY_LEVEL),
            Err(NxtError::UnexpectedReply {
                expected: 0x0B,
                got: 0x0D
            })
        ));

        assert!(Reply::parse(&[0x00, 0x0B, 0x00]).is_err());
        assert!(Reply::parse(&[0x02, 0x0B]).is_err());
    }

    #[test]
    fn test_parse_input_values() {
        let payload = [
            0x01, // port
            0x01, // valid
            0x00, // calibrated
            0x05, // light active
            0x80, // percent full scale
            0x34, 0x02, // raw 564
            0x20, 0x02, // normalized 544
            0x35, 0x00, // scaled 53
            0x00, 0x00,
        ];
        let values = Reply::parse(&reply(opcode::GET_INPUT_VALUES, 0, &payload))
            .unwrap()
            .expect(opcode::GET_INPUT_VALUES)
            .unwrap()
            .input_values()
            .unwrap();

        assert_eq!(values.port, 1);
        assert!(values.valid);
        assert_eq!(values.sensor_type, SensorType::LightActive);
        assert_eq!(values.sensor_mode, SensorMode::PercentFullScale);
        assert_eq!(values.raw, 564);
        assert_eq!(values.normalized, 544);
        assert_eq!(values.scaled, 53);
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let result = Reply::parse(&reply(opcode::GET_INPUT_VALUES, 0, &[0x01, 0x01]))
            .unwrap()
            .expect(opcode::GET_INPUT_VALUES)
            .unwrap()
            .input_values();
        assert!(matches!(result, Err(NxtError::MalformedReply { opcode: 0x07, .. })));
    }

    #[test]
    fn test_parse_motor_state() {
        let mut payload = vec![0x02, 0x4B, 0x07, 0x01, 0x00, 0x20];
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&360i32.to_le_bytes());
        payload.extend_from_slice(&(-10i32).to_le_bytes());
        payload.extend_from_slice(&720i32.to_le_bytes());

        let state = Reply::parse(&reply(opcode::GET_OUTPUT_STATE, 0, &payload))
            .unwrap()
            .expect(opcode::GET_OUTPUT_STATE)
            .unwrap()
            .motor_state()
            .unwrap();

        assert_eq!(state.output, OutputState::running(2, 75));
        assert_eq!(state.tacho_count, 360);
        assert_eq!(state.block_tacho_count, -10);
        assert_eq!(state.rotation_count, 720);
    }

    #[test]
    fn test_parse_system_replies() {
        let version = Reply::parse(&reply(opcode::GET_FIRMWARE_VERSION, 0, &[0x7C, 0x01, 0x1C, 0x01]))
            .unwrap()
            .expect(opcode::GET_FIRMWARE_VERSION)
            .unwrap()
            .firmware_version()
            .unwrap();
        assert_eq!(version.protocol, (1, 124));
        assert_eq!(version.firmware, (1, 28));
        assert_eq!(version.to_string(), "firmware 1.28, protocol 1.124");

        let mut payload = Vec::new();
        payload.extend_from_slice(b"NXT\0\0\0\0\0\0\0\0\0\0\0\0");
        payload.extend_from_slice(&[0x00, 0x16, 0x53, 0x01, 0x02, 0x03, 0x00]);
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&80_000u32.to_le_bytes());
        let info = Reply::parse(&reply(opcode::GET_DEVICE_INFO, 0, &payload))
            .unwrap()
            .expect(opcode::GET_DEVICE_INFO)
            .unwrap()
            .device_info()
            .unwrap();
        assert_eq!(info.name, "NXT");
        assert_eq!(info.bluetooth_address, [0x00, 0x16, 0x53, 0x01, 0x02, 0x03]);
        assert_eq!(info.free_flash, 80_000);
    }

    #[test]
    fn test_parse_mailbox_message() {
        let mut payload = vec![0x03, 0x04, b'a', b'c', b'k', 0x00];
        payload.resize(2 + 59, 0);
        let message = Reply::parse(&reply(opcode::MESSAGE_READ, 0, &payload))
            .unwrap()
            .expect(opcode::MESSAGE_READ)
            .unwrap()
            .mailbox_message()
            .unwrap();
        assert_eq!(message.inbox, 3);
        assert_eq!(message.data, b"ack");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(CommandStatus::from_byte(0xEC).to_string(), "no active program");
        assert_eq!(CommandStatus::from_byte(0x12), CommandStatus::Unknown(0x12));
        assert_eq!(CommandStatus::Unknown(0x12).to_string(), "unknown status 0x12");
    }
}
