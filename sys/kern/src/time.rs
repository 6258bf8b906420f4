// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel time.
//!
//! There is no time of day here. The only clock is milliseconds since boot,
//! assembled from whole ticks plus the hardware timer's free-running counter
//! in between, and it wraps at 2^16.

/// Milliseconds since boot, wrapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Timestamp(u16);

impl Timestamp {
    /// Builds a timestamp from whole elapsed milliseconds at the last tick
    /// plus a sub-tick remainder. Wrapping is the defined behavior, not an
    /// error.
    pub fn from_parts(ms_at_tick: u16, sub_tick_ms: u16) -> Self {
        Timestamp(ms_at_tick.wrapping_add(sub_tick_ms))
    }
}

impl From<u16> for Timestamp {
    fn from(v: u16) -> Self {
        Timestamp(v)
    }
}

impl From<Timestamp> for u16 {
    fn from(v: Timestamp) -> Self {
        v.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_rather_than_saturates() {
        let t = Timestamp::from_parts(u16::MAX, 3);
        assert_eq!(u16::from(t), 2);
    }
}
