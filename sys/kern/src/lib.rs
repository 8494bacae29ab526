// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! quern kernel core: a priority ready queue and the dispatcher that
//! consumes it.
//!
//! This crate is the portable heart of a small single-core kernel. It
//! contains no architecture-specific code: the context-switch primitive is
//! an injected trait, timer programming belongs to the embedder, and every
//! operation is a bounded synchronous mutation suitable for running with
//! interrupts masked.
//!
//! # Design principles
//!
//! 1. Static configuration. The process table size is a compile-time
//!    constant; nothing here allocates.
//! 2. No globals. All scheduling state lives in one [`sched::Dispatcher`]
//!    value the embedder owns and shares explicitly (see [`sync`]).
//! 3. A strong preference for safe code; `unsafe` appears only inside the
//!    lock primitive.
//! 4. A preference for simple and clear algorithms over fast and clever
//!    algorithms.

// Allow std-y things to be used in test. Note that this attribute is a bit
// of a trap for the programmer, because rust-analyzer by default seems to
// build things with test set. This means it's easy to introduce code
// incompatible with no_std without your editor hassling you about it.
// Beware.
#![cfg_attr(not(test), no_std)]
#![forbid(clippy::wildcard_imports)]

pub mod queue;
pub mod sched;
pub mod sync;
pub mod time;
