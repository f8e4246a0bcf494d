//! The ladder of supported protocol revisions.
//!
//! Every wire number Mojang shipped between 1.7.2 and 1.21.3 is listed;
//! a handshake carrying anything else is an unknown client.

use std::fmt;

/// A protocol revision of Minecraft: Java Edition.
///
/// Discriminants are the on-wire protocol numbers, which Mojang has kept
/// strictly ascending since 1.7.2, so the derived ordering is release order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ProtocolVersion {
    V1_7_2 = 4,
    V1_7_6 = 5,
    V1_8 = 47,
    V1_9 = 107,
    V1_9_1 = 108,
    V1_9_2 = 109,
    V1_9_3 = 110,
    V1_10 = 210,
    V1_11 = 315,
    V1_11_1 = 316,
    V1_12 = 335,
    V1_12_1 = 338,
    V1_12_2 = 340,
    V1_13 = 393,
    V1_13_1 = 401,
    V1_13_2 = 404,
    V1_14 = 477,
    V1_14_1 = 480,
    V1_14_2 = 485,
    V1_14_3 = 490,
    V1_14_4 = 498,
    V1_15 = 573,
    V1_15_1 = 575,
    V1_15_2 = 578,
    V1_16 = 735,
    V1_16_1 = 736,
    V1_16_2 = 751,
    V1_16_3 = 753,
    V1_16_4 = 754,
    V1_17 = 755,
    V1_17_1 = 756,
    V1_18 = 757,
    V1_18_2 = 758,
    V1_19 = 759,
    V1_19_1 = 760,
    V1_19_3 = 761,
    V1_19_4 = 762,
    V1_20 = 763,
    V1_20_2 = 764,
    V1_20_3 = 765,
    V1_20_5 = 766,
    V1_21 = 767,
    V1_21_2 = 768,
}

impl ProtocolVersion {
    pub const MINIMUM: ProtocolVersion = ProtocolVersion::V1_7_2;
    pub const MAXIMUM: ProtocolVersion = ProtocolVersion::V1_21_2;

    /// Every supported revision, ascending.
    pub const ALL: &'static [ProtocolVersion] = &[
        Self::V1_7_2,
        Self::V1_7_6,
        Self::V1_8,
        Self::V1_9,
        Self::V1_9_1,
        Self::V1_9_2,
        Self::V1_9_3,
        Self::V1_10,
        Self::V1_11,
        Self::V1_11_1,
        Self::V1_12,
        Self::V1_12_1,
        Self::V1_12_2,
        Self::V1_13,
        Self::V1_13_1,
        Self::V1_13_2,
        Self::V1_14,
        Self::V1_14_1,
        Self::V1_14_2,
        Self::V1_14_3,
        Self::V1_14_4,
        Self::V1_15,
        Self::V1_15_1,
        Self::V1_15_2,
        Self::V1_16,
        Self::V1_16_1,
        Self::V1_16_2,
        Self::V1_16_3,
        Self::V1_16_4,
        Self::V1_17,
        Self::V1_17_1,
        Self::V1_18,
        Self::V1_18_2,
        Self::V1_19,
        Self::V1_19_1,
        Self::V1_19_3,
        Self::V1_19_4,
        Self::V1_20,
        Self::V1_20_2,
        Self::V1_20_3,
        Self::V1_20_5,
        Self::V1_21,
        Self::V1_21_2,
    ];

    /// The on-wire protocol number.
    pub fn wire(self) -> i32 {
        self as i32
    }

    /// Resolves a wire number from a handshake. Returns `None` for numbers
    /// no shipped release ever used (including snapshots).
    pub fn from_wire(number: i32) -> Option<ProtocolVersion> {
        Self::ALL
            .iter()
            .copied()
            .find(|version| version.wire() == number)
    }

    /// Name of the earliest release using this revision.
    pub fn name(self) -> &'static str {
        match self {
            Self::V1_7_2 => "1.7.2",
            Self::V1_7_6 => "1.7.6",
            Self::V1_8 => "1.8",
            Self::V1_9 => "1.9",
            Self::V1_9_1 => "1.9.1",
            Self::V1_9_2 => "1.9.2",
            Self::V1_9_3 => "1.9.3",
            Self::V1_10 => "1.10",
            Self::V1_11 => "1.11",
            Self::V1_11_1 => "1.11.1",
            Self::V1_12 => "1.12",
            Self::V1_12_1 => "1.12.1",
            Self::V1_12_2 => "1.12.2",
            Self::V1_13 => "1.13",
            Self::V1_13_1 => "1.13.1",
            Self::V1_13_2 => "1.13.2",
            Self::V1_14 => "1.14",
            Self::V1_14_1 => "1.14.1",
            Self::V1_14_2 => "1.14.2",
            Self::V1_14_3 => "1.14.3",
            Self::V1_14_4 => "1.14.4",
            Self::V1_15 => "1.15",
            Self::V1_15_1 => "1.15.1",
            Self::V1_15_2 => "1.15.2",
            Self::V1_16 => "1.16",
            Self::V1_16_1 => "1.16.1",
            Self::V1_16_2 => "1.16.2",
            Self::V1_16_3 => "1.16.3",
            Self::V1_16_4 => "1.16.4",
            Self::V1_17 => "1.17",
            Self::V1_17_1 => "1.17.1",
            Self::V1_18 => "1.18",
            Self::V1_18_2 => "1.18.2",
            Self::V1_19 => "1.19",
            Self::V1_19_1 => "1.19.1",
            Self::V1_19_3 => "1.19.3",
            Self::V1_19_4 => "1.19.4",
            Self::V1_20 => "1.20",
            Self::V1_20_2 => "1.20.2",
            Self::V1_20_3 => "1.20.3",
            Self::V1_20_5 => "1.20.5",
            Self::V1_21 => "1.21",
            Self::V1_21_2 => "1.21.2",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (protocol {})", self.name(), self.wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_strictly_ascending() {
        for pair in ProtocolVersion::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].wire() < pair[1].wire());
        }
    }

    #[test]
    fn wire_numbers_round_trip() {
        for &version in ProtocolVersion::ALL {
            assert_eq!(ProtocolVersion::from_wire(version.wire()), Some(version));
        }
    }

    #[test]
    fn unknown_numbers_rejected() {
        assert_eq!(ProtocolVersion::from_wire(0), None);
        assert_eq!(ProtocolVersion::from_wire(48), None);
        assert_eq!(ProtocolVersion::from_wire(1073741825), None);
    }

    #[test]
    fn release_ordering() {
        assert!(ProtocolVersion::V1_8 < ProtocolVersion::V1_16);
        assert!(ProtocolVersion::V1_20_2 >= ProtocolVersion::V1_20_2);
        assert_eq!(ProtocolVersion::MINIMUM.wire(), 4);
        assert_eq!(ProtocolVersion::MAXIMUM.wire(), 768);
    }
}
