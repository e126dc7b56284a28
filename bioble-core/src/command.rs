//! Command and result code definitions

use std::fmt;

use crate::error::{Error, Result};

/// Operation requested from the peripheral
///
/// Carried in the second byte of Start and Trigger frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Enroll = 0x01,
    Authenticate = 0x02,
}

impl Command {
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Enroll => "ENROLL",
            Self::Authenticate => "AUTHENTICATE",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Enroll),
            0x02 => Ok(Self::Authenticate),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Outcome reported by the peripheral on the RESULT channel
///
/// `EnrollFail` and `AuthFail` are device-reported outcomes, not transport
/// failures. Unmapped codes decode to `Unknown` rather than an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResultCode {
    EnrollOk,
    AuthOk,
    EnrollFail,
    AuthFail,
    Unknown(u8),
}

impl ResultCode {
    /// Check if the peripheral accepted the operation
    pub fn is_success(self) -> bool {
        matches!(self, Self::EnrollOk | Self::AuthOk)
    }

    /// The success code the peripheral sends for `command`
    pub fn success_for(command: Command) -> Self {
        match command {
            Command::Enroll => Self::EnrollOk,
            Command::Authenticate => Self::AuthOk,
        }
    }

    /// The failure code the peripheral sends for `command`
    pub fn failure_for(command: Command) -> Self {
        match command {
            Command::Enroll => Self::EnrollFail,
            Command::Authenticate => Self::AuthFail,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::EnrollOk => "ENROLL_OK",
            Self::AuthOk => "AUTH_OK",
            Self::EnrollFail => "ENROLL_FAIL",
            Self::AuthFail => "AUTH_FAIL",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::EnrollOk,
            0x02 => Self::AuthOk,
            0xF1 => Self::EnrollFail,
            0xF2 => Self::AuthFail,
            other => Self::Unknown(other),
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> u8 {
        match code {
            ResultCode::EnrollOk => 0x01,
            ResultCode::AuthOk => 0x02,
            ResultCode::EnrollFail => 0xF1,
            ResultCode::AuthFail => 0xF2,
            ResultCode::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), u8::from(*self))
    }
}
