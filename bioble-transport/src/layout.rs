//! Mapping of logical channels onto GATT characteristics

use uuid::Uuid;

use bioble_core::constants::gatt::{
    COMMAND_CHAR_UUID, FACE_CHAR_UUID, GESTURE_CHAR_UUID, RESULT_CHAR_UUID, VOICE_CHAR_UUID,
};
use bioble_core::{Channel, ChannelSet};

/// How the peripheral firmware exposes channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelLayout {
    /// Every outgoing channel is framed through the single command characteristic
    #[default]
    Shared,

    /// Separate characteristics for face, voice and gesture data
    Multi,
}

impl ChannelLayout {
    /// Characteristic a channel is written to or notified on
    pub fn characteristic(self, channel: Channel) -> Uuid {
        match (self, channel) {
            (_, Channel::Result) => RESULT_CHAR_UUID,
            (_, Channel::Trigger) | (Self::Shared, _) => COMMAND_CHAR_UUID,
            (Self::Multi, Channel::Face) => FACE_CHAR_UUID,
            (Self::Multi, Channel::Voice) => VOICE_CHAR_UUID,
            (Self::Multi, Channel::Gesture) => GESTURE_CHAR_UUID,
        }
    }

    /// Channels reachable through the given characteristics
    pub fn resolve(self, characteristics: &[Uuid]) -> ChannelSet {
        Channel::ALL
            .into_iter()
            .filter(|c| characteristics.contains(&self.characteristic(*c)))
            .collect()
    }

    /// Channels a session needs
    pub fn required(self) -> ChannelSet {
        ChannelSet::all()
    }
}
