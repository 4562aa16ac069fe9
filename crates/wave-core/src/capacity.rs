//! Fixed capacity table: bandwidth + modulation → required spectrum slots.

use serde::{Deserialize, Serialize};

/// Slot width of the flexible grid.
pub const SLOT_WIDTH_GHZ: f64 = 12.5;

/// Supported coherent modulation formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modulation {
    #[serde(rename = "DP-QPSK")]
    DpQpsk,
    #[serde(rename = "DP-8QAM")]
    Dp8Qam,
    #[serde(rename = "DP-16QAM")]
    Dp16Qam,
}

impl Modulation {
    /// Spectral efficiency in bit/s/Hz.
    pub fn bits_per_hz(self) -> f64 {
        match self {
            Modulation::DpQpsk => 2.0,
            Modulation::Dp8Qam => 3.0,
            Modulation::Dp16Qam => 4.0,
        }
    }
}

impl Default for Modulation {
    fn default() -> Self {
        Modulation::Dp16Qam
    }
}

/// Number of contiguous 12.5 GHz slots required for a demand.
///
/// `ceil(bandwidth / efficiency / slot_width)`, minimum one slot.
pub fn required_slots(bandwidth_gbps: f64, modulation: Modulation) -> usize {
    let required_ghz = bandwidth_gbps / modulation.bits_per_hz();
    let slots = (required_ghz / SLOT_WIDTH_GHZ).ceil() as usize;
    slots.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_hundred_gig_16qam_needs_eight_slots() {
        assert_eq!(required_slots(400.0, Modulation::Dp16Qam), 8);
    }

    #[test]
    fn hundred_gig_16qam_needs_two_slots() {
        // 100 / 4.0 = 25 GHz → 2 slots.
        assert_eq!(required_slots(100.0, Modulation::Dp16Qam), 2);
    }

    #[test]
    fn qpsk_needs_twice_the_spectrum_of_16qam() {
        assert_eq!(
            required_slots(400.0, Modulation::DpQpsk),
            2 * required_slots(400.0, Modulation::Dp16Qam)
        );
    }

    #[test]
    fn tiny_demand_still_gets_one_slot() {
        assert_eq!(required_slots(1.0, Modulation::Dp16Qam), 1);
    }

    #[test]
    fn modulation_wire_names() {
        assert_eq!(
            serde_json::to_string(&Modulation::Dp16Qam).unwrap(),
            "\"DP-16QAM\""
        );
        let m: Modulation = serde_json::from_str("\"DP-QPSK\"").unwrap();
        assert_eq!(m, Modulation::DpQpsk);
    }
}
