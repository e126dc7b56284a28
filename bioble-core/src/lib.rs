//! # bioble-core
//!
//! Core protocol implementation for the BLE biometric peripheral.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure, encoding and notification decoding
//! - Command and result code definitions
//! - Channel definitions
//! - Session phase tracking
//! - Protocol constants

pub mod channel;
pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod session;

pub use channel::{Channel, ChannelSet};
pub use command::{Command, ResultCode};
pub use error::{DecodeError, Error, Result};
pub use frame::{decode_notification, Assembled, Frame, FrameAssembler, FrameCodec};
pub use session::{ActiveSession, SessionPhase, SessionTracker};
