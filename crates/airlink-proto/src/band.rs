//! Frequency bands.
//!
//! Radio work admission compares band sets: two works may share a radio with
//! simultaneous off-channel support only when their bands do not overlap.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of frequency bands
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BandSet: u8 {
        /// 2.4 GHz (channels 1-14)
        const GHZ_2_4 = 0b0000_0001;

        /// 5 GHz, including the 4.9 GHz public-safety channels
        const GHZ_5 = 0b0000_0010;

        /// 6 GHz
        const GHZ_6 = 0b0000_0100;

        /// 60 GHz (DMG)
        const GHZ_60 = 0b0000_1000;
    }
}

impl BandSet {
    /// Band containing `freq` (MHz). Empty for 0 or an unknown frequency.
    #[must_use]
    pub const fn from_freq(freq: u32) -> Self {
        match freq {
            2412..=2484 => Self::GHZ_2_4,
            4910..=5895 => Self::GHZ_5,
            5925..=7125 => Self::GHZ_6,
            58_320..=70_200 => Self::GHZ_60,
            _ => Self::empty(),
        }
    }

    /// Union of the bands of every frequency in `freqs`.
    #[must_use]
    pub fn from_freqs(freqs: &[u32]) -> Self {
        freqs.iter().fold(Self::empty(), |bands, &freq| bands | Self::from_freq(freq))
    }

    /// True when both sets are non-empty and share no band.
    #[must_use]
    pub fn is_disjoint_from(self, other: Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.intersection(other).is_empty()
    }
}

impl Default for BandSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// True when `freq` (MHz) lies in the 6 GHz band, where PMF is mandatory.
#[must_use]
pub const fn is_6ghz(freq: u32) -> bool {
    matches!(freq, 5925..=7125)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freq_to_band() {
        assert_eq!(BandSet::from_freq(2412), BandSet::GHZ_2_4);
        assert_eq!(BandSet::from_freq(2484), BandSet::GHZ_2_4);
        assert_eq!(BandSet::from_freq(5180), BandSet::GHZ_5);
        assert_eq!(BandSet::from_freq(5955), BandSet::GHZ_6);
        assert_eq!(BandSet::from_freq(60_480), BandSet::GHZ_60);
        assert!(BandSet::from_freq(0).is_empty());
        assert!(BandSet::from_freq(900).is_empty());
    }

    #[test]
    fn freq_list_union() {
        let bands = BandSet::from_freqs(&[2412, 2437, 5180]);
        assert_eq!(bands, BandSet::GHZ_2_4 | BandSet::GHZ_5);
        assert!(BandSet::from_freqs(&[]).is_empty());
    }

    #[test]
    fn empty_sets_are_never_disjoint() {
        assert!(BandSet::GHZ_2_4.is_disjoint_from(BandSet::GHZ_5));
        assert!(!BandSet::GHZ_2_4.is_disjoint_from(BandSet::GHZ_2_4 | BandSet::GHZ_5));
        assert!(!BandSet::empty().is_disjoint_from(BandSet::GHZ_5));
        assert!(!BandSet::GHZ_5.is_disjoint_from(BandSet::empty()));
    }

    #[test]
    fn six_ghz_detection() {
        assert!(is_6ghz(5955));
        assert!(!is_6ghz(5180));
    }
}
