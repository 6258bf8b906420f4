// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hosted stand-in for the real architecture backend.
//!
//! This exists so the kernel's policy code -- scheduler, queues, services,
//! stack layout -- can be compiled and unit-tested on a development machine.
//! There is no context switch here: tests construct a `Kernel` and drive
//! `dispatch`/`handle_request` directly, playing the role of the trampolines
//! and the tick ISR themselves. The two shims therefore panic if called.
//!
//! The backend is single-threaded and nothing ever interrupts it, so the
//! "interrupts disabled" predicate that kernel methods assert is simply
//! always true here.

use core::sync::atomic::{AtomicU16, AtomicU8, Ordering};

use abi::{FatalCode, KernelRequest};
use num_traits::FromPrimitive;

use crate::fail;
use crate::time::Timestamp;

static REQUEST: AtomicU8 = AtomicU8::new(0);
static CLOCK_MS: AtomicU16 = AtomicU16::new(0);

/// See `avr2560::enter_kernel`. The hosted backend has no task stacks to
/// switch between.
pub unsafe fn enter_kernel() {
    panic!("context switch attempted on the hosted backend");
}

/// See `avr2560::exit_kernel`.
pub unsafe fn exit_kernel() {
    panic!("context switch attempted on the hosted backend");
}

pub fn set_current_task(_sp_cell: *mut usize) {
    // Nothing consumes the saved SP here.
}

pub fn stage_request(request: KernelRequest) {
    REQUEST.store(request as u8, Ordering::Relaxed);
}

pub fn take_request() -> KernelRequest {
    let raw = REQUEST.swap(0, Ordering::Relaxed);
    match KernelRequest::from_u8(raw) {
        Some(request) => request,
        None => fail::die(FatalCode::Internal),
    }
}

pub fn interrupt_free<R>(body: impl FnOnce() -> R) -> R {
    body()
}

pub fn disable_interrupts() {}

pub fn interrupts_disabled() -> bool {
    true
}

pub fn start_tick_timer() {}

pub fn now() -> Timestamp {
    Timestamp::from(CLOCK_MS.load(Ordering::Relaxed))
}

/// Test hook: moves the hosted clock forward.
pub fn advance_clock(ms: u16) {
    let t = CLOCK_MS.load(Ordering::Relaxed);
    CLOCK_MS.store(t.wrapping_add(ms), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_slot_is_take_once() {
        stage_request(KernelRequest::TaskNext);
        assert_eq!(take_request(), KernelRequest::TaskNext);
        assert_eq!(take_request(), KernelRequest::None);
    }

    #[test]
    fn clock_advances_and_wraps() {
        let before = u16::from(now());
        advance_clock(5);
        advance_clock(u16::MAX);
        // Net effect of +5 and +65535 is wrapping +4.
        assert_eq!(u16::from(now()), before.wrapping_add(4));
    }
}
