use crate::infrastructure::bluetooth::protocol::CommandStatus;
use thiserror::Error;

/// Errors raised while talking to an NXT brick
#[derive(Debug, Error)]
pub enum NxtError {
    #[error("Port must be {min}-{max}, got: {got}")]
    InvalidPort { got: i32, min: u8, max: u8 },

    #[error("Power must be in the range [-100, 100], got: {0}")]
    InvalidPower(i32),

    #[error("Invalid Bluetooth address: {0:?}")]
    InvalidAddress(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot perform operation on closed NXT connection.")]
    Closed,

    #[error("Failed to connect to a device at MAC: {address}")]
    ConnectFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Communication with the NXT failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("No reply from the NXT within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Telegram of {0} bytes exceeds the 64 byte limit")]
    FrameTooLarge(usize),

    #[error("Received an empty frame")]
    EmptyFrame,

    #[error("Unexpected reply: expected opcode {expected:#04X}, got {got:#04X}")]
    UnexpectedReply { expected: u8, got: u8 },

    #[error("Malformed reply to opcode {opcode:#04X}: {reason}")]
    MalformedReply { opcode: u8, reason: String },

    #[error("Command {opcode:#04X} failed: {status}")]
    Command { opcode: u8, status: CommandStatus },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, NxtError>;

impl NxtError {
    /// Whether the byte stream can no longer be trusted to line up
    /// requests with replies
    pub fn breaks_link(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Timeout(_) | Self::EmptyFrame | Self::FrameTooLarge(_)
        )
    }
}
