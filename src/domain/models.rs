//! Values the brick API is expressed in.
//!
//! Ports are numbered the way they are printed on the brick: sensor
//! ports 1-4 and motor ports A-C (1-3). On the wire they are 0 indexed.

use crate::domain::error::{NxtError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire value addressing every output port at once
pub const ALL_MOTORS: u8 = 0xFF;

/// A Bluetooth device address, most significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BrickAddress(pub [u8; 6]);

impl BrickAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for BrickAddress {
    type Err = NxtError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || NxtError::InvalidAddress(s.to_string());
        let parts: Vec<&str> = s.trim().split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for BrickAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl TryFrom<String> for BrickAddress {
    type Error = NxtError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BrickAddress> for String {
    fn from(address: BrickAddress) -> Self {
        address.to_string()
    }
}

/// One of the four sensor inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorPort(u8);

impl SensorPort {
    pub const COUNT: u8 = 4;

    pub fn new(port: i32) -> Result<Self> {
        if port < 1 || port > Self::COUNT as i32 {
            return Err(NxtError::InvalidPort {
                got: port,
                min: 1,
                max: Self::COUNT,
            });
        }
        Ok(Self(port as u8))
    }

    /// Port number as printed on the brick
    pub fn number(&self) -> u8 {
        self.0
    }

    /// 0 indexed port used in telegrams
    pub fn index(&self) -> u8 {
        self.0 - 1
    }
}

impl fmt::Display for SensorPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SensorPort {
    type Err = NxtError;

    fn from_str(s: &str) -> Result<Self> {
        let port = s
            .trim()
            .parse::<i32>()
            .map_err(|_| NxtError::InvalidArgument(format!("not a sensor port: {s:?}")))?;
        Self::new(port)
    }
}

/// One of the three motor outputs (A, B, C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotorPort(u8);

impl MotorPort {
    pub const COUNT: u8 = 3;

    pub const A: MotorPort = MotorPort(1);
    pub const B: MotorPort = MotorPort(2);
    pub const C: MotorPort = MotorPort(3);

    pub fn new(port: i32) -> Result<Self> {
        if port < 1 || port > Self::COUNT as i32 {
            return Err(NxtError::InvalidPort {
                got: port,
                min: 1,
                max: Self::COUNT,
            });
        }
        Ok(Self(port as u8))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn index(&self) -> u8 {
        self.0 - 1
    }

    pub fn letter(&self) -> char {
        (b'A' + self.index()) as char
    }
}

impl fmt::Display for MotorPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for MotorPort {
    type Err = NxtError;

    /// Accepts either the letter on the brick or the 1 based number
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            "C" | "c" => Ok(Self::C),
            other => {
                let port = other
                    .parse::<i32>()
                    .map_err(|_| NxtError::InvalidArgument(format!("not a motor port: {s:?}")))?;
                Self::new(port)
            }
        }
    }
}

/// Motor power as a signed percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Power(i8);

impl Power {
    pub const MAX: i32 = 100;
    pub const ZERO: Power = Power(0);

    pub fn new(power: i32) -> Result<Self> {
        if !(-Self::MAX..=Self::MAX).contains(&power) {
            return Err(NxtError::InvalidPower(power));
        }
        Ok(Self(power as i8))
    }

    pub fn value(&self) -> i8 {
        self.0
    }

    pub fn reversed(&self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closed,
}

/// Direction of a timed two-motor manoeuvre
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveDirection {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
}

impl DriveDirection {
    /// Powers for the (left, right) motors
    pub fn motor_powers(&self, power: Power) -> (Power, Power) {
        match self {
            Self::Forward => (power, power),
            Self::Backward => (power.reversed(), power.reversed()),
            Self::TurnLeft => (power.reversed(), power),
            Self::TurnRight => (power, power.reversed()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Forward => "drive forward",
            Self::Backward => "drive backward",
            Self::TurnLeft => "turn left",
            Self::TurnRight => "turn right",
        }
    }
}
