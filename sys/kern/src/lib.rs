// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A small full-served pre-emptive kernel for the ATmega2560.
//!
//! The kernel multiplexes a fixed pool of tasks across the single CPU under
//! three disciplines at once: strictly prioritized SYSTEM tasks,
//! time-triggered PERIODIC tasks with a declared worst-case execution time,
//! and time-sliced round-robin tasks, with a built-in idle task underneath
//! them all. A small rendezvous primitive ("services") lets non-periodic
//! tasks block for a 16-bit value that a publisher broadcasts to every
//! waiter at once.
//!
//! "Full-served" means the kernel always executes on its own stack: every
//! system call and every tick trap saves the full register file on the
//! task's stack, hops to the kernel stack, and returns the same way. The
//! narrow assembly shims that do this live in the `arch` module; everything
//! else is ordinary Rust operating on a single [`sched::Kernel`] value.
//!
//! # Design principles
//!
//! 1. Static configuration. Pool sizes, stack sizes and tick length are
//!    compile-time constants; there is no allocator.
//! 2. One owner for kernel state. All queues, descriptors and counters live
//!    in a single `Kernel` value and are mutated only with interrupts
//!    masked.
//! 3. A strong preference for safe code where reasonable; `unsafe` is
//!    confined to the context switch, the trampoline entry protocol, and
//!    delivering a published value through a registered sink.
//! 4. Errors don't come back. An RTOS must not limp past a violated
//!    invariant, so every error funnels into [`fail::die`].

#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
pub mod arch;

pub mod fail;
pub mod queue;
pub mod sched;
pub mod services;
pub mod stack;
pub mod startup;
pub mod syscalls;
pub mod task;
pub mod time;
