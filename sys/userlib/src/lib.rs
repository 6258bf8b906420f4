// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Application support library.
//!
//! This is the surface an application sees: task creation, yielding,
//! services and the clock, as thin typed wrappers over the kernel's
//! trampolines. It also re-exports the shared `abi` types so applications
//! only need one dependency.
//!
//! The application provides two things of its own:
//!
//! - `app_main`, exported with `#[no_mangle]`, launched as the first SYSTEM
//!   task;
//! - a call to [`os_init`] from its reset path.

#![cfg_attr(target_os = "none", no_std)]

pub use abi::{CreateArgs, FatalCode, Level, ServiceId, TaskId, TICK_MS};

use kern::syscalls;

/// Boots the kernel and never returns. The first SYSTEM task is the
/// application's `app_main`.
pub fn os_init() -> ! {
    kern::startup::start_kernel()
}

/// Creates a SYSTEM task: runs before anything else, until it finishes or
/// yields.
pub fn create_system(entry: fn(), arg: i16) -> TaskId {
    syscalls::sys_create(CreateArgs::system(entry, arg))
}

/// Creates a round-robin task: shares leftover time with its peers, one
/// tick at a time.
pub fn create_rr(entry: fn(), arg: i16) -> TaskId {
    syscalls::sys_create(CreateArgs::round_robin(entry, arg))
}

/// Creates a periodic task released every `period` ticks, starting `start`
/// ticks from now, with a declared worst case of `wcet` ticks per release.
pub fn create_periodic(
    entry: fn(),
    arg: i16,
    period: u16,
    wcet: u16,
    start: u16,
) -> TaskId {
    syscalls::sys_create(CreateArgs::periodic(entry, arg, period, wcet, start))
}

/// Voluntarily gives up the rest of the current slot.
pub fn yield_now() {
    syscalls::sys_yield()
}

/// Ends the calling task. Also what happens implicitly when a task body
/// returns.
pub fn terminate() -> ! {
    syscalls::sys_terminate()
}

/// The 16-bit argument this task was created with.
pub fn get_arg() -> i16 {
    syscalls::sys_get_arg()
}

/// Milliseconds since boot; wraps at 2^16.
pub fn now() -> u16 {
    syscalls::sys_now().into()
}

/// Allocates a new service.
pub fn service_init() -> ServiceId {
    syscalls::sys_service_init()
}

/// Blocks until the next publish on `service`; the value lands in `cell`.
///
/// Periodic tasks must not call this: a release that blocks cannot meet its
/// deadline, and the kernel treats the attempt as fatal.
pub fn service_subscribe(service: ServiceId, cell: &mut i16) {
    syscalls::sys_service_subscribe(service, cell)
}

/// Broadcasts `value` to every task currently subscribed to `service`.
/// Tasks that subscribe later miss it; there is no buffering.
pub fn service_publish(service: ServiceId, value: i16) {
    syscalls::sys_service_publish(service, value)
}

/// Stops the system with `ERR_USER_ABORT`. For conditions the application
/// knows it cannot recover from.
pub fn os_abort() -> ! {
    syscalls::sys_abort()
}
