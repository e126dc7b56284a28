//! Link frame structure and encoding/decoding

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    command::{Command, ResultCode},
    constants::{END_MARKER, FRAMING_OVERHEAD, MAX_CHUNK_COUNT, START_MARKER},
    error::{DecodeError, Error, Result},
};

/// One link-layer write unit
///
/// # Frame Layouts
///
/// ```text
/// Start    ┌──────┬─────────┬────────────┐
///          │ 0xAA │ command │ chunkCount │                    3 bytes
///          └──────┴─────────┴────────────┘
/// Data     ┌──────┬─────────────────────┬──────┐
///          │ 0xAA │ payload (1..=max)   │ 0xBB │              3..=max+2 bytes
///          └──────┴─────────────────────┴──────┘
/// End      ┌──────┬──────┬──────┐
///          │ 0xBB │ 0x00 │ 0x00 │                             3 bytes
///          └──────┴──────┴──────┘
/// Trigger  ┌──────┬─────────┬──────┬──────┐
///          │ 0xAA │ command │ 0x00 │ 0xBB │                   4 bytes
///          └──────┴─────────┴──────┴──────┘
/// ```
///
/// All fields are single bytes, so there is no byte order to worry about.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    /// Start frame announcing `chunk_count` Data frames
    pub fn start(command: Command, chunk_count: u8) -> Self {
        Self(Bytes::copy_from_slice(&[START_MARKER, command.into(), chunk_count]))
    }

    /// Data frame wrapping one chunk
    pub fn data(chunk: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(chunk.len() + FRAMING_OVERHEAD);
        buf.put_u8(START_MARKER);
        buf.put_slice(chunk);
        buf.put_u8(END_MARKER);
        Self(buf.freeze())
    }

    /// End frame closing a transfer
    pub fn end() -> Self {
        Self(Bytes::from_static(&[END_MARKER, 0x00, 0x00]))
    }

    /// Trigger frame telling the peripheral to process what it received
    pub fn trigger(command: Command) -> Self {
        Self(Bytes::copy_from_slice(&[START_MARKER, command.into(), 0x00, END_MARKER]))
    }

    /// Result notification as the peripheral sends it
    pub fn result(code: ResultCode) -> Self {
        Self(Bytes::copy_from_slice(&[START_MARKER, code.into(), END_MARKER]))
    }

    /// Wrap raw bytes received from the link
    pub fn from_raw(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the `[START, .., END]` envelope shared by Data, Trigger and result frames
    pub fn is_enveloped(bytes: &[u8]) -> bool {
        bytes.len() >= FRAMING_OVERHEAD
            && bytes[0] == START_MARKER
            && bytes[bytes.len() - 1] == END_MARKER
    }

    /// Payload bytes between the markers of a Data frame
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Malformed` if the frame lacks either marker.
    pub fn data_payload(bytes: &[u8]) -> std::result::Result<&[u8], DecodeError> {
        if !Self::is_enveloped(bytes) {
            return Err(DecodeError::malformed(bytes, "missing start/end marker"));
        }
        Ok(&bytes[1..bytes.len() - 1])
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{}]", hex::encode(&self.0))
    }
}

/// Decode a RESULT-channel notification
///
/// The notification must be at least 2 bytes, start with `0xAA` and end with
/// `0xBB`. The second byte is mapped through the [`ResultCode`] table; unmapped
/// values decode to `ResultCode::Unknown`, which is not an error.
///
/// # Examples
///
/// ```
/// use bioble_core::{decode_notification, ResultCode};
///
/// assert_eq!(decode_notification(&[0xAA, 0x01, 0xBB]).unwrap(), ResultCode::EnrollOk);
/// assert!(decode_notification(&[0x01, 0x02]).is_err());
/// ```
pub fn decode_notification(bytes: &[u8]) -> std::result::Result<ResultCode, DecodeError> {
    if !Frame::is_enveloped(bytes) {
        return Err(DecodeError::malformed(bytes, "missing start/end marker"));
    }
    Ok(ResultCode::from(bytes[1]))
}

/// Splits payloads into link-sized frames
///
/// # Examples
///
/// ```
/// use bioble_core::{Command, FrameCodec};
///
/// let codec = FrameCodec::new(18).unwrap();
/// let frames = codec.encode(b"", Command::Enroll).unwrap();
///
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[0].as_bytes(), &[0xAA, 0x01, 0x00]);
/// assert_eq!(frames[1].as_bytes(), &[0xBB, 0x00, 0x00]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_chunk: usize,
}

impl FrameCodec {
    /// Create a codec emitting at most `max_chunk` payload bytes per Data frame
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMaxChunk` if `max_chunk` is zero.
    pub fn new(max_chunk: usize) -> Result<Self> {
        if max_chunk == 0 {
            return Err(Error::InvalidMaxChunk(max_chunk));
        }
        Ok(Self { max_chunk })
    }

    /// Create a codec from the link's negotiated write size
    pub fn from_write_budget(write_budget: usize) -> Result<Self> {
        Self::new(write_budget.saturating_sub(FRAMING_OVERHEAD))
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Number of Data frames needed for `len` payload bytes
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_chunk)
    }

    /// Encode `payload` as Start, Data..., End
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` if the payload needs more chunks than
    /// fit in the Start frame's one-byte count.
    pub fn encode(&self, payload: &[u8], command: Command) -> Result<Vec<Frame>> {
        let chunks = self.chunk_count(payload.len());
        let announced = u8::try_from(chunks).map_err(|_| Error::PayloadTooLarge {
            size: payload.len(),
            chunks,
            max: MAX_CHUNK_COUNT,
        })?;

        let mut frames = Vec::with_capacity(chunks + 2);
        frames.push(Frame::start(command, announced));
        frames.extend(payload.chunks(self.max_chunk).map(Frame::data));
        frames.push(Frame::end());

        trace!(
            "Encoded {} bytes for {} into {} frames",
            payload.len(),
            command,
            frames.len()
        );

        Ok(frames)
    }

    /// Trigger frame for `command`
    pub fn trigger(&self, command: Command) -> Frame {
        Frame::trigger(command)
    }
}

/// Something a [`FrameAssembler`] completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// A full Start/Data.../End transfer
    Transfer {
        command: u8,
        payload: Bytes,
    },

    /// A trigger frame
    Trigger {
        command: u8,
    },
}

#[derive(Debug)]
enum AssemblerState {
    Idle,
    Receiving {
        command: u8,
        expected: usize,
        received: usize,
        buf: BytesMut,
    },
}

/// Reassembles one channel's frame stream (the receiving side of [`FrameCodec`])
///
/// Frames are classified by position: after a Start frame the assembler only
/// accepts the announced number of Data frames followed by an End frame, so a
/// one-byte Data frame is never mistaken for a Start frame. Any out-of-place
/// frame resets the assembler and is reported as malformed.
#[derive(Debug)]
pub struct FrameAssembler {
    state: AssemblerState,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            state: AssemblerState::Idle,
        }
    }

    /// Check if no transfer is partially received
    pub fn is_idle(&self) -> bool {
        matches!(self.state, AssemblerState::Idle)
    }

    /// Feed one received frame
    pub fn push(&mut self, frame: &[u8]) -> std::result::Result<Option<Assembled>, DecodeError> {
        let state = std::mem::replace(&mut self.state, AssemblerState::Idle);

        match state {
            AssemblerState::Idle => match frame {
                [START_MARKER, command, count] => {
                    self.state = AssemblerState::Receiving {
                        command: *command,
                        expected: *count as usize,
                        received: 0,
                        buf: BytesMut::new(),
                    };
                    Ok(None)
                }
                [START_MARKER, command, 0x00, END_MARKER] => Ok(Some(Assembled::Trigger {
                    command: *command,
                })),
                _ => Err(DecodeError::malformed(frame, "expected start or trigger frame")),
            },
            AssemblerState::Receiving {
                command,
                expected,
                received,
                mut buf,
            } if received < expected => {
                let chunk = Frame::data_payload(frame)?;
                buf.put_slice(chunk);
                self.state = AssemblerState::Receiving {
                    command,
                    expected,
                    received: received + 1,
                    buf,
                };
                Ok(None)
            }
            AssemblerState::Receiving { command, buf, .. } => {
                if *frame != [END_MARKER, 0x00, 0x00] {
                    return Err(DecodeError::malformed(frame, "expected end frame"));
                }
                Ok(Some(Assembled::Transfer {
                    command,
                    payload: buf.freeze(),
                }))
            }
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
