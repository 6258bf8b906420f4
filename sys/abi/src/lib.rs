// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between the kernel and applications.
//!
//! Everything here is deliberately `Copy` data with fixed representations:
//! these types cross the trampoline boundary between user tasks and the
//! kernel, and one of them (`KernelRequest`) additionally crosses between
//! assembly and Rust.

#![no_std]

use num_derive::FromPrimitive;

/// Number of user task descriptors. One extra descriptor (index `MAX_TASKS`)
/// is reserved for the idle task and is never on the free-list.
pub const MAX_TASKS: usize = 8;

/// Number of rendezvous services that can ever be allocated.
pub const MAX_SERVICES: usize = 8;

/// Size of each task's private stack, in bytes. Must leave comfortable
/// headroom above the initial context frame; the kernel checks this at
/// compile time.
pub const STACK_BYTES: usize = 256;

/// Length of one scheduler tick in milliseconds. `period`, `wcet` and
/// `start` are all expressed in these ticks.
pub const TICK_MS: u16 = 5;

/// Scheduling class of a task.
///
/// The classes are strictly ordered: a READY `System` task always runs
/// before any `Periodic` task, which always runs before any `Rr` task.
/// `Idle` is the class of the single built-in idle task and is never
/// available to applications.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Level {
    /// First-come-first-served, runs to completion or voluntary yield.
    System = 0,
    /// Time-triggered with a declared period and worst-case execution time.
    Periodic = 1,
    /// Round-robin, pre-empted on every tick.
    Rr = 2,
    /// The built-in busy-loop task; scheduled only when nothing else is
    /// runnable.
    Idle = 3,
}

/// Names a task. Zero is reserved as the "no task" / failure value; real
/// tasks get `index + 1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct TaskId(pub u8);

impl TaskId {
    /// The failure value returned when a task could not be created. (In
    /// practice creation failure is fatal, so applications rarely see this.)
    pub const NONE: Self = Self(0);

    /// Fabricates the `TaskId` for a task table index.
    pub const fn for_index(index: usize) -> Self {
        TaskId(index as u8 + 1)
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Names a service allocated by `service_init`. Stable for the life of the
/// system; services are never freed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct ServiceId(pub u8);

/// Requests a task (or the tick ISR) can make of the kernel.
///
/// The discriminants are fixed because the tick ISR stores one of these into
/// the request slot from assembly.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum KernelRequest {
    /// No request pending. Observed if the kernel is re-entered spuriously.
    None = 0,
    /// A tick elapsed; posted by the timer ISR.
    TimerExpired = 1,
    /// Create the task described by the staged `CreateArgs`.
    TaskCreate = 2,
    /// The current task is done forever.
    TaskTerminate = 3,
    /// The current task gives up the rest of its slot.
    TaskNext = 4,
    /// The current task should step aside for a just-woken `System` task.
    /// Internal; staged by `service_publish`, never by applications.
    TaskInterrupt = 5,
}

/// Fatal error codes.
///
/// There is no recoverable error path in this kernel: every code here stops
/// the system. The numeric value is recorded for debuggers; external
/// signalling hardware blinks `code + 1` times.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum FatalCode {
    /// A periodic task was created with `wcet > period`.
    WcetExceedsPeriod = 0,
    /// The task free-list was empty on create.
    TooManyTasks = 1,
    /// The service pool was exhausted.
    TooManyServices = 2,
    /// A periodic task was still running when its WCET budget ran out.
    PeriodicOverrun = 3,
    /// Two periodic tasks were due in the same tick.
    PeriodicCollision = 4,
    /// A periodic task called `service_subscribe`.
    PeriodicSubscribed = 5,
    /// `service_publish` found a periodic task in a subscriber queue.
    PeriodicFoundSubscribed = 6,
    /// The application called `os_abort`.
    UserAbort = 7,
    /// The kernel reached a case it believes unreachable.
    Internal = 8,
}

impl FatalCode {
    /// Number of blinks an external signalling routine should emit for this
    /// code.
    pub fn flashes(self) -> u8 {
        self as u8 + 1
    }
}

/// Arguments staged by a `create_*` trampoline for the `TaskCreate` request.
#[derive(Copy, Clone, Debug)]
pub struct CreateArgs {
    /// Task body. When it returns, the task self-terminates.
    pub entry: fn(),
    /// Opaque 16-bit value the task can retrieve with `get_arg`.
    pub arg: i16,
    /// Scheduling class.
    pub level: Level,
    /// Slot length in ticks; `Periodic` only, must be nonzero.
    pub period: u16,
    /// Worst-case ticks per release; `Periodic` only, must be `<= period`.
    pub wcet: u16,
    /// Ticks until the first release; `Periodic` only.
    pub start: u16,
}

impl CreateArgs {
    pub fn system(entry: fn(), arg: i16) -> Self {
        Self::plain(entry, arg, Level::System)
    }

    pub fn round_robin(entry: fn(), arg: i16) -> Self {
        Self::plain(entry, arg, Level::Rr)
    }

    pub fn periodic(
        entry: fn(),
        arg: i16,
        period: u16,
        wcet: u16,
        start: u16,
    ) -> Self {
        Self {
            entry,
            arg,
            level: Level::Periodic,
            period,
            wcet,
            start,
        }
    }

    /// Used once, at boot, for the idle slot.
    pub fn idle(entry: fn()) -> Self {
        Self::plain(entry, 0, Level::Idle)
    }

    fn plain(entry: fn(), arg: i16, level: Level) -> Self {
        Self {
            entry,
            arg,
            level,
            period: 0,
            wcet: 0,
            start: 0,
        }
    }
}
