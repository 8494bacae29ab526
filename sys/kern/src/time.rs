// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Implementation of kernel time.

/// Number of clock ticks in one preemption quantum: how long a process may
/// hold the processor before the clock interrupt forces a reschedule.
pub const QUANTUM: u32 = 2;

/// In-kernel timestamp representation.
///
/// This is currently measured in an arbitrary "tick" unit, one per clock
/// interrupt.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Boot time.
    pub const ZERO: Self = Self(0);

    /// Returns the timestamp one tick later.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u64> for Timestamp {
    fn from(v: u64) -> Self {
        Timestamp(v)
    }
}

impl From<Timestamp> for u64 {
    fn from(v: Timestamp) -> Self {
        v.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_advance_and_compare() {
        let t0 = Timestamp::ZERO;
        let t1 = t0.next();
        assert!(t0 < t1);
        assert_eq!(u64::from(t1), 1);
        assert_eq!(Timestamp::from(1), t1);
    }
}
