// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process table and dispatcher.
//!
//! The dispatcher owns the process table and the ready queue and is the only
//! code that moves processes between them. All kernel scheduling state lives
//! in one [`Dispatcher`] value passed around by reference; there are no
//! globals, so an embedder decides where the state lives and how it is
//! shared with interrupt handlers (see [`crate::sync`]).
//!
//! The actual transfer of the processor between processes is delegated to
//! the [`ContextSwitch`] trait, which the embedder implements for its
//! architecture. Everything on this side of that trait is portable and runs
//! in host tests.

use core::mem;
use core::ops::{Deref, DerefMut};

use quern_abi::{KernFlags, Priority, ProcId, ProcState};

use crate::queue::{InsertError, PriorityQueue, QueueEmpty};
use crate::time::{Timestamp, QUANTUM};

/// Hardware hand-off primitive, implemented by the embedder.
///
/// A real implementation saves the calling processor state into `save` and
/// resumes execution from `resume`; the call then "returns" only when the
/// saved context is itself resumed by some later hand-off. Host tests
/// substitute a recording mock, which returns immediately.
pub trait ContextSwitch {
    /// Saved execution state of one process. On real hardware this is
    /// typically a stack pointer or a small register frame, so cloning one
    /// is cheap; `Default` provides the pre-first-run state.
    type Context: Default + Clone;

    /// Performs the hand-off: stores the outgoing state into `save` and
    /// resumes from `resume`.
    fn switch(&mut self, save: &mut Self::Context, resume: &Self::Context);
}

/// One process-table entry.
///
/// The fields are private so that state transitions stay inside this module;
/// the dispatcher is the only writer.
#[derive(Clone, Debug)]
pub struct Proc<C> {
    state: ProcState,
    priority: Priority,
    context: C,
}

impl<C> Proc<C> {
    /// Returns this process's scheduling state.
    pub fn state(&self) -> ProcState {
        self.state
    }

    /// Returns this process's current priority.
    ///
    /// For a process waiting in the ready queue this tracks its queue key,
    /// including any boosts applied by the aging pass.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns a reference to the saved execution context.
    pub fn context(&self) -> &C {
        &self.context
    }
}

/// Error returned when `spawn` finds no free process-table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NoProcSlot;

/// Error returned by the process lifecycle operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduleError {
    /// The process id does not name a process-table slot.
    BadId,
    /// The process is not in a state the operation applies to.
    NotBlocked,
    /// The ready queue refused the insertion.
    Queue(InsertError),
}

/// Bookkeeping for postponed rescheduling.
#[derive(Copy, Clone, Debug, Default)]
struct DeferState {
    /// Number of live [`DeferGuard`]s.
    nesting: u32,
    /// Whether a reschedule was requested while deferred. Cleared when the
    /// owed reschedule is issued.
    pending: bool,
}

/// Kernel scheduling state: process table, ready queue, and dispatch
/// machinery, for a table of `N` processes on platform `P`.
///
/// Process 0 is the idle process. It is created by [`Dispatcher::new`], is
/// initially current, and must stay runnable forever -- it is the guarantee
/// that the ready queue is never empty when a reschedule needs a victim.
pub struct Dispatcher<P: ContextSwitch, const N: usize> {
    procs: [Proc<P::Context>; N],
    ready: PriorityQueue<N>,
    current: ProcId,
    defer: DeferState,
    flags: KernFlags,
    uptime: Timestamp,
    /// Clock ticks left in the running process's quantum.
    preempt: u32,
    platform: P,
}

impl<P: ContextSwitch, const N: usize> Dispatcher<P, N> {
    /// Creates the kernel state with an empty ready queue and the idle
    /// process (priority 0) as the running process.
    pub fn new(platform: P, flags: KernFlags) -> Self {
        assert!(N >= 1, "process table needs room for the idle process");
        assert!(N <= 1 << 16, "process ids are 16 bits");

        let mut procs: [Proc<P::Context>; N] = core::array::from_fn(|_| Proc {
            state: ProcState::Free,
            priority: Priority(0),
            context: P::Context::default(),
        });
        procs[ProcId::IDLE.index()].state = ProcState::Current;

        Self {
            procs,
            ready: PriorityQueue::new(),
            current: ProcId::IDLE,
            defer: DeferState::default(),
            flags,
            uptime: Timestamp::ZERO,
            preempt: QUANTUM,
            platform,
        }
    }

    /// Returns the id of the running process.
    pub fn current(&self) -> ProcId {
        self.current
    }

    /// Returns the kernel uptime in clock ticks.
    pub fn uptime(&self) -> Timestamp {
        self.uptime
    }

    /// Borrows a process-table entry for inspection.
    pub fn proc(&self, pid: ProcId) -> Option<&Proc<P::Context>> {
        self.procs.get(pid.index())
    }

    /// Borrows the ready queue for inspection (diagnostics, tests).
    pub fn ready_queue(&self) -> &PriorityQueue<N> {
        &self.ready
    }

    /// Borrows the platform for inspection.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Claims a free table slot for a new process, initially `Blocked`.
    ///
    /// The process starts participating in scheduling once `make_ready`
    /// admits it to the ready queue.
    pub fn spawn(
        &mut self,
        priority: Priority,
        context: P::Context,
    ) -> Result<ProcId, NoProcSlot> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Free)
            .ok_or(NoProcSlot)?;
        self.procs[slot] = Proc {
            state: ProcState::Blocked,
            priority,
            context,
        };
        Ok(ProcId(slot as u16))
    }

    /// Admits a blocked process to the ready queue, keyed by its priority.
    ///
    /// Does not reschedule; callers decide when the switch happens.
    pub fn make_ready(&mut self, pid: ProcId) -> Result<(), ScheduleError> {
        let proc = self
            .procs
            .get(pid.index())
            .ok_or(ScheduleError::BadId)?;
        if proc.state != ProcState::Blocked {
            return Err(ScheduleError::NotBlocked);
        }
        let key = proc.priority;
        self.ready.insert(pid, key).map_err(ScheduleError::Queue)?;
        self.procs[pid.index()].state = ProcState::Ready;
        Ok(())
    }

    /// Wakes a blocked process: interrupt-handler-facing name for
    /// `make_ready`.
    pub fn unblock(&mut self, pid: ProcId) -> Result<(), ScheduleError> {
        self.make_ready(pid)
    }

    /// Marks the running process blocked and hands the processor to the
    /// best ready process.
    ///
    /// The idle process must never block; it is what reschedule falls back
    /// to when nothing else is runnable.
    pub fn block_current(&mut self) {
        assert!(
            self.current != ProcId::IDLE,
            "idle process may not block"
        );
        self.procs[self.current.index()].state = ProcState::Blocked;
        self.reschedule();
    }

    /// Hands the processor to the highest-priority ready process.
    ///
    /// If rescheduling is deferred, records that one is owed and returns
    /// immediately. Otherwise: a still-`Current` caller (preempted, not
    /// blocked) goes back on the ready queue at its priority; the head of
    /// the queue becomes current; the quantum is rearmed; with
    /// [`KernFlags::AGING`] set, every other waiting process gets a one-step
    /// priority boost; and exactly one context hand-off is performed.
    ///
    /// On real hardware the call returns when the *calling* process is next
    /// selected to run.
    pub fn reschedule(&mut self) {
        if self.defer.nesting > 0 {
            self.defer.pending = true;
            log::trace!("reschedule deferred (nesting={})", self.defer.nesting);
            return;
        }

        let old = self.current;
        if self.procs[old.index()].state == ProcState::Current {
            // Preempted rather than blocked: back on the ready queue.
            self.procs[old.index()].state = ProcState::Ready;
            let key = self.procs[old.index()].priority;
            if let Err(e) = self.ready.insert(old, key) {
                panic!("ready queue rejected running process {old}: {e:?}");
            }
        }

        let new = match self.ready.remove_first() {
            Ok(pid) => pid,
            // The permanent idle process keeps the ready queue nonempty
            // whenever the running process stops; an empty queue means the
            // kernel has lost it.
            Err(QueueEmpty) => panic!("ready queue empty at reschedule"),
        };
        self.current = new;
        self.procs[new.index()].state = ProcState::Current;
        self.preempt = QUANTUM;

        if self.flags.contains(KernFlags::AGING) {
            self.age_ready(old, new);
        }

        log::trace!("dispatch {old} -> {new}");

        // Exactly one hand-off. Control comes back here when `old` next
        // becomes current.
        let resume = self.procs[new.index()].context.clone();
        let Self {
            procs, platform, ..
        } = self;
        platform.switch(&mut procs[old.index()].context, &resume);
    }

    /// Clock-interrupt entry point: advances uptime and burns down the
    /// running process's quantum, rescheduling when it expires.
    ///
    /// Programming the timer that calls this is the embedder's concern.
    pub fn on_clock_tick(&mut self) {
        self.uptime = self.uptime.next();
        if self.preempt > 0 {
            self.preempt -= 1;
        }
        if self.preempt == 0 {
            self.reschedule();
        }
    }

    /// Enters a critical section during which rescheduling is postponed.
    ///
    /// The guard derefs to the dispatcher, so work inside the section --
    /// including further nested `defer` calls -- goes through it. Releasing
    /// the outermost guard issues the owed reschedule if any was requested
    /// while deferred; a deferred request is postponed, never lost.
    #[must_use = "rescheduling resumes as soon as the guard is dropped"]
    pub fn defer(&mut self) -> DeferGuard<'_, P, N> {
        self.defer.nesting += 1;
        DeferGuard { sched: self }
    }

    /// Aging pass: boosts the key of every ready-queue entry except the
    /// idle process and the two processes in the current switch, mirroring
    /// each boost into the process table. Order is untouched; later
    /// insertions pick positions from the boosted keys.
    fn age_ready(&mut self, old: ProcId, new: ProcId) {
        let Self { ready, procs, .. } = self;
        ready.adjust_keys(|pid, key| {
            if pid == ProcId::IDLE || pid == old || pid == new {
                key
            } else {
                let boosted = key.aged();
                procs[pid.index()].priority = boosted;
                boosted
            }
        });
        log::debug!("aged ready queue around {old} -> {new}");
    }
}

/// Scoped postponement of rescheduling; see [`Dispatcher::defer`].
#[must_use = "rescheduling resumes as soon as the guard is dropped"]
pub struct DeferGuard<'d, P: ContextSwitch, const N: usize> {
    sched: &'d mut Dispatcher<P, N>,
}

impl<P: ContextSwitch, const N: usize> Deref for DeferGuard<'_, P, N> {
    type Target = Dispatcher<P, N>;

    fn deref(&self) -> &Self::Target {
        self.sched
    }
}

impl<P: ContextSwitch, const N: usize> DerefMut for DeferGuard<'_, P, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.sched
    }
}

impl<P: ContextSwitch, const N: usize> Drop for DeferGuard<'_, P, N> {
    fn drop(&mut self) {
        self.sched.defer.nesting -= 1;
        if self.sched.defer.nesting == 0
            && mem::take(&mut self.sched.defer.pending)
        {
            self.sched.reschedule();
        }
    }
}
