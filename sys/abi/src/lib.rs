// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scheduler ABI definitions, shared between the kernel core and embedders.

#![no_std]

use core::fmt;

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Names a process in the process table.
///
/// A `ProcId` is an index into the process table, which has a fixed size
/// chosen by the embedder. Process 0 is reserved for the idle process, which
/// is created at kernel initialization and must remain runnable for the
/// kernel's entire uptime -- it is what the dispatcher falls back to when
/// nothing else is ready.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(transparent)]
pub struct ProcId(pub u16);

impl ProcId {
    /// The reserved identifier of the permanent idle process.
    pub const IDLE: Self = Self(0);

    /// Extracts the process-table index this ID names.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Indicates priority of a process: the key the ready queue is ordered by.
///
/// Priorities are signed, and numerically *greater* values are more
/// important. The idle process sits at priority 0; real processes should use
/// positive priorities so that they always outrank it.
///
/// Note that this type *deliberately* does not implement `PartialOrd`/`Ord`,
/// to keep us from confusing ourselves on whether `>` means more important or
/// less important. Use `is_more_important_than`.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Default,
    Serialize,
    Deserialize,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Checks if `self` is strictly more important than `other`.
    ///
    /// This is easier to read than comparing the numeric values of the
    /// priorities.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 > other.0
    }

    /// Returns this priority raised by one step, as applied by the aging
    /// pass. Saturates rather than wrapping around to the least important
    /// value.
    #[must_use]
    pub fn aged(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling state of a process-table entry.
///
/// Only the `Current`/`Ready` transitions are driven by the dispatcher
/// itself; `Blocked` covers every wait reason (the kernel core does not care
/// why a process is not runnable), and `Free` marks an unoccupied table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum ProcState {
    /// Table slot holds no process.
    #[default]
    Free,
    /// Process is executing on the processor.
    Current,
    /// Process is runnable and waiting in the ready queue.
    Ready,
    /// Process is waiting for some event and is on no queue we manage.
    Blocked,
}

bitflags::bitflags! {
    /// Collection of boolean flags controlling dispatcher behavior.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct KernFlags: u32 {
        /// Enables the anti-starvation aging pass on every reschedule.
        const AGING = 1 << 0;
    }
}
