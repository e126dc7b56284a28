//! Peripheral channels

use std::fmt;

use bitflags::bitflags;

/// An addressable endpoint on the peripheral
///
/// Frames on different channels never interleave within one logical transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Face,
    Voice,
    Gesture,
    Trigger,
    Result,
}

impl Channel {
    /// Every channel, in declaration order
    pub const ALL: [Channel; 5] = [
        Self::Face,
        Self::Voice,
        Self::Gesture,
        Self::Trigger,
        Self::Result,
    ];

    /// Check if payload chunks may be sent on this channel
    pub fn is_data(self) -> bool {
        matches!(self, Self::Face | Self::Voice | Self::Gesture)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Face => "FACE",
            Self::Voice => "VOICE",
            Self::Gesture => "GESTURE",
            Self::Trigger => "TRIGGER",
            Self::Result => "RESULT",
        }
    }

    /// The set containing only this channel
    pub fn as_set(self) -> ChannelSet {
        match self {
            Self::Face => ChannelSet::FACE,
            Self::Voice => ChannelSet::VOICE,
            Self::Gesture => ChannelSet::GESTURE,
            Self::Trigger => ChannelSet::TRIGGER,
            Self::Result => ChannelSet::RESULT,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A set of channels, e.g. the endpoints a connected peripheral exposes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelSet: u8 {
        const FACE = 1;
        const VOICE = 1 << 1;
        const GESTURE = 1 << 2;
        const TRIGGER = 1 << 3;
        const RESULT = 1 << 4;
    }
}

impl ChannelSet {
    /// Check membership of a single channel
    pub fn has(self, channel: Channel) -> bool {
        self.contains(channel.as_set())
    }

    /// First channel of `required` (in declaration order) missing from `self`
    pub fn first_missing(self, required: ChannelSet) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|c| required.has(*c) && !self.has(*c))
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ChannelSet::empty(), |set, c| set | c.as_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_channels() {
        assert!(Channel::Face.is_data());
        assert!(!Channel::Trigger.is_data());
        assert!(!Channel::Result.is_data());
    }

    #[test]
    fn test_channel_set_collect() {
        let set: ChannelSet = [Channel::Trigger, Channel::Result].into_iter().collect();
        assert!(set.has(Channel::Result));
        assert!(!set.has(Channel::Face));
        assert_eq!(set.first_missing(ChannelSet::all()), Some(Channel::Face));
        assert_eq!(set.first_missing(ChannelSet::TRIGGER | ChannelSet::RESULT), None);
    }
}
