//! Sense multiplexer channels

use bitflags::bitflags;
use core::fmt;
use core::str::FromStr;

use crate::error::Error;

/// Input of the 16-way sense multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SenseChannel {
    /// Ground reference
    Gnd = 0,
    /// I/O pin B3
    B3 = 1,
    /// Adjustable I/O voltage rail
    Vio = 2,
    /// Target voltage sense input
    Vsense = 3,
    /// I/O pin A0
    A0 = 4,
    /// I/O pin A1
    A1 = 5,
    /// I/O pin A2
    A2 = 6,
    /// I/O pin B2
    B2 = 7,
    /// 3.3 V rail
    V3v3 = 8,
    /// I/O pin B0
    B0 = 9,
    /// I/O pin B1
    B1 = 10,
    /// I/O pin A3
    A3 = 11,
    /// I/O pin A4
    A4 = 12,
    /// I/O pin A5
    A5 = 13,
    /// 1.2 V rail
    V1v2 = 14,
    /// Unconnected input
    Open = 15,
}

/// All channels in multiplexer order
pub const ALL_CHANNELS: [SenseChannel; 16] = [
    SenseChannel::Gnd,
    SenseChannel::B3,
    SenseChannel::Vio,
    SenseChannel::Vsense,
    SenseChannel::A0,
    SenseChannel::A1,
    SenseChannel::A2,
    SenseChannel::B2,
    SenseChannel::V3v3,
    SenseChannel::B0,
    SenseChannel::B1,
    SenseChannel::A3,
    SenseChannel::A4,
    SenseChannel::A5,
    SenseChannel::V1v2,
    SenseChannel::Open,
];

/// Sense channel of each user I/O pin, in GPIO bit order (A0..A5, B0..B3)
pub const IO_SENSE_CHANNELS: [SenseChannel; 10] = [
    SenseChannel::A0,
    SenseChannel::A1,
    SenseChannel::A2,
    SenseChannel::A3,
    SenseChannel::A4,
    SenseChannel::A5,
    SenseChannel::B0,
    SenseChannel::B1,
    SenseChannel::B2,
    SenseChannel::B3,
];

impl SenseChannel {
    /// Look up a channel by multiplexer index
    pub fn from_index(index: u8) -> Option<Self> {
        ALL_CHANNELS.get(index as usize).copied()
    }

    /// Multiplexer index
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Short name as used on the command line
    pub fn name(self) -> &'static str {
        match self {
            Self::Gnd => "gnd",
            Self::B3 => "b3",
            Self::Vio => "vio",
            Self::Vsense => "vsense",
            Self::A0 => "a0",
            Self::A1 => "a1",
            Self::A2 => "a2",
            Self::B2 => "b2",
            Self::V3v3 => "3v3",
            Self::B0 => "b0",
            Self::B1 => "b1",
            Self::A3 => "a3",
            Self::A4 => "a4",
            Self::A5 => "a5",
            Self::V1v2 => "1v2",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for SenseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SenseChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if let Some(ch) = ALL_CHANNELS.iter().find(|ch| ch.name() == s) {
            return Ok(*ch);
        }
        match s.parse::<u8>() {
            Ok(index) => Self::from_index(index).ok_or(Error::InvalidChannel(index)),
            Err(_) => Err(Error::Probe(format!("unknown sense channel: {}", s))),
        }
    }
}

impl TryFrom<u8> for SenseChannel {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or(Error::InvalidChannel(index))
    }
}

bitflags! {
    /// Set of sense channels, laid out as the USB channel mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SenseChannels: u16 {
        /// Ground reference
        const GND    = 1 << 0;
        /// I/O pin B3
        const B3     = 1 << 1;
        /// I/O voltage rail
        const VIO    = 1 << 2;
        /// Target voltage sense
        const VSENSE = 1 << 3;
        /// I/O pin A0
        const A0     = 1 << 4;
        /// I/O pin A1
        const A1     = 1 << 5;
        /// I/O pin A2
        const A2     = 1 << 6;
        /// I/O pin B2
        const B2     = 1 << 7;
        /// 3.3 V rail
        const V3V3   = 1 << 8;
        /// I/O pin B0
        const B0     = 1 << 9;
        /// I/O pin B1
        const B1     = 1 << 10;
        /// I/O pin A3
        const A3     = 1 << 11;
        /// I/O pin A4
        const A4     = 1 << 12;
        /// I/O pin A5
        const A5     = 1 << 13;
        /// 1.2 V rail
        const V1V2   = 1 << 14;
        /// Unconnected input
        const OPEN   = 1 << 15;
    }
}

impl SenseChannels {
    /// Members in ascending multiplexer order
    pub fn channels(&self) -> impl Iterator<Item = SenseChannel> + '_ {
        ALL_CHANNELS
            .iter()
            .copied()
            .filter(move |ch| self.contains_channel(*ch))
    }

    /// Check membership of a single channel
    pub fn contains_channel(&self, channel: SenseChannel) -> bool {
        self.bits() & (1 << channel.index()) != 0
    }

    /// Number of channels in the set
    pub fn len(&self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl From<SenseChannel> for SenseChannels {
    fn from(channel: SenseChannel) -> Self {
        Self::from_bits_retain(1 << channel.index())
    }
}

impl FromIterator<SenseChannel> for SenseChannels {
    fn from_iter<I: IntoIterator<Item = SenseChannel>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, ch| acc | Self::from(ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for (i, ch) in ALL_CHANNELS.iter().enumerate() {
            assert_eq!(ch.index() as usize, i);
            assert_eq!(SenseChannel::from_index(i as u8), Some(*ch));
        }
        assert_eq!(SenseChannel::from_index(16), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("vio".parse::<SenseChannel>().unwrap(), SenseChannel::Vio);
        assert_eq!("3V3".parse::<SenseChannel>().unwrap(), SenseChannel::V3v3);
        assert_eq!("14".parse::<SenseChannel>().unwrap(), SenseChannel::V1v2);
        assert_eq!("16".parse::<SenseChannel>(), Err(Error::InvalidChannel(16)));
        assert!("bogus".parse::<SenseChannel>().is_err());
    }

    #[test]
    fn test_mask() {
        let set: SenseChannels = [SenseChannel::A0, SenseChannel::Vsense].into_iter().collect();
        assert_eq!(set.bits(), (1 << 3) | (1 << 4));
        assert_eq!(set, SenseChannels::VSENSE | SenseChannels::A0);
        assert_eq!(set.len(), 2);

        // Iteration is always ascending regardless of insertion order
        let order: Vec<_> = set.channels().collect();
        assert_eq!(order, vec![SenseChannel::Vsense, SenseChannel::A0]);
    }

    #[test]
    fn test_io_channels_distinct() {
        let set: SenseChannels = IO_SENSE_CHANNELS.into_iter().collect();
        assert_eq!(set.len(), IO_SENSE_CHANNELS.len());
        assert!(!set.contains_channel(SenseChannel::Vio));
    }
}
