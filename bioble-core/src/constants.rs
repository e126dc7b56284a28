//! Protocol constants

use std::time::Duration;

use uuid::Uuid;

/// First byte of Start, Data and Trigger frames
pub const START_MARKER: u8 = 0xAA;

/// Last byte of Data and Trigger frames, first byte of the End frame
pub const END_MARKER: u8 = 0xBB;

/// Framing overhead of a Data frame (start + end marker)
pub const FRAMING_OVERHEAD: usize = 2;

/// Default link write budget (ATT MTU 23 minus 3 bytes of ATT header)
pub const DEFAULT_WRITE_BUDGET: usize = 20;

/// Default payload bytes per Data frame
pub const DEFAULT_MAX_CHUNK: usize = DEFAULT_WRITE_BUDGET - FRAMING_OVERHEAD;

/// Largest chunk count a Start frame can announce
pub const MAX_CHUNK_COUNT: usize = u8::MAX as usize;

/// Advertised name of the peripheral firmware
pub const DEFAULT_DEVICE_NAME: &str = "BiometricAuthDevice";

/// Default scan window
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(10);

/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for the result notification after the trigger frame
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(10);

/// GATT identifiers, all in Bluetooth base UUID form (`0000xxxx-0000-1000-8000-00805f9b34fb`)
pub mod gatt {
    use super::Uuid;

    const fn short(id: u16) -> Uuid {
        Uuid::from_u128(((id as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
    }

    /// Biometric service
    pub const BIOMETRIC_SERVICE_UUID: Uuid = short(0x1101);

    /// Command characteristic (write without response)
    pub const COMMAND_CHAR_UUID: Uuid = short(0x1102);

    /// Result characteristic (notify)
    pub const RESULT_CHAR_UUID: Uuid = short(0x1103);

    /// Face data characteristic (multi-channel firmware only)
    pub const FACE_CHAR_UUID: Uuid = short(0x1104);

    /// Voice data characteristic (multi-channel firmware only)
    pub const VOICE_CHAR_UUID: Uuid = short(0x1105);

    /// Gesture data characteristic (multi-channel firmware only)
    pub const GESTURE_CHAR_UUID: Uuid = short(0x1106);
}

#[cfg(test)]
mod tests {
    use super::gatt::*;

    #[test]
    fn test_short_uuid_expansion() {
        assert_eq!(
            BIOMETRIC_SERVICE_UUID.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            RESULT_CHAR_UUID.to_string(),
            "00001103-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_default_chunk_fits_budget() {
        assert_eq!(super::DEFAULT_MAX_CHUNK, 18);
    }
}
