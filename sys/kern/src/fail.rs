// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fatal-error funnel.
//!
//! Every unrecoverable condition in the kernel ends up in [`die`]. There is
//! deliberately no other exit: a real-time kernel that keeps scheduling
//! after an invariant breaks is worse than one that stops.
//!
//! On the target, `die` records its evidence in statics that debuggers (and
//! any external signalling routine) can find, then parks the CPU with
//! interrupts off:
//!
//! - `kern::fail::KERNEL_HAS_FAILED` is a `bool`, cleared at boot and set on
//!   the way down.
//! - `kern::fail::KERNEL_FATAL_CODE` holds the [`FatalCode`] as a `u8`. A
//!   signalling routine should blink `code + 1` times between long pauses.
//!
//! On hosted builds `die` panics instead, which is what lets the test suite
//! assert that a scenario is fatal and *which* code it dies with.

use abi::FatalCode;

/// One-stop flag for debugger triage.
#[used]
static mut KERNEL_HAS_FAILED: bool = false;

/// The recorded fatal code, meaningful only once `KERNEL_HAS_FAILED` is set.
#[used]
static mut KERNEL_FATAL_CODE: u8 = 0;

fn record(code: FatalCode) {
    // Safety: these statics are written only here and in the panic handler,
    // both of which run with interrupts disabled and never return; a second
    // arrival just rewrites the same cells before parking.
    unsafe {
        core::ptr::write_volatile(
            core::ptr::addr_of_mut!(KERNEL_FATAL_CODE),
            code as u8,
        );
        core::ptr::write_volatile(
            core::ptr::addr_of_mut!(KERNEL_HAS_FAILED),
            true,
        );
    }
}

/// Records `code` and stops the system.
#[inline(never)]
pub fn die(code: FatalCode) -> ! {
    crate::arch::disable_interrupts();
    record(code);

    #[cfg(not(target_os = "none"))]
    panic!("kernel died: {code:?}");

    #[cfg(target_os = "none")]
    loop {
        // Platform-independent NOP; keeps the optimizer from deleting the
        // loop while staying debugger-friendly.
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

/// Kernel panics (assertion failures, mostly from `uassert!`) are internal
/// errors; route them through the same funnel so the evidence lands in the
/// same place.
#[cfg(target_os = "none")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo<'_>) -> ! {
    die(FatalCode::Internal)
}
