// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel startup and the dispatcher main loop.

use abi::FatalCode;

use crate::arch;
use crate::fail;
use crate::sched::Kernel;

/// The kernel singleton. Trampolines reach it through [`kernel_ptr`] while
/// the main loop below holds no long-lived reference, so the two access
/// paths never alias.
static mut KERNEL: Kernel = Kernel::new();

static mut KERNEL_STARTED: bool = false;

pub(crate) fn kernel_ptr() -> *mut Kernel {
    core::ptr::addr_of_mut!(KERNEL)
}

/// The idle task: scheduled when nothing else is runnable, never
/// terminates.
fn idle() {
    loop {
        core::hint::spin_loop();
    }
}

// The application provides its own entry point, launched as the first
// SYSTEM task.
#[cfg(target_os = "none")]
extern "Rust" {
    fn app_main();
}

fn first_task() {
    #[cfg(target_os = "none")]
    // Safety: plain Rust function defined by the application crate.
    unsafe {
        app_main()
    }
}

/// Boots the kernel: builds the free-list, creates idle and `app_main`,
/// starts the tick, and enters the dispatch loop. Does not return.
///
/// Call exactly once, from the reset path, before interrupts are ever
/// enabled.
pub fn start_kernel() -> ! {
    arch::disable_interrupts();

    // Safety: we are the only execution context this early, and the flag
    // rejects a second call.
    unsafe {
        if KERNEL_STARTED {
            fail::die(FatalCode::Internal);
        }
        KERNEL_STARTED = true;
    }

    klog!("starting: tables");
    unsafe { (*kernel_ptr()).boot(idle, first_task) };

    klog!("starting: tick");
    arch::start_tick_timer();

    klog!("starting: first task");
    loop {
        // Each access re-derives the pointer: while `exit_kernel` has
        // control parked inside a task, the trampolines form their own
        // references to the kernel, and a reference held here across that
        // window would alias them.
        unsafe { (*kernel_ptr()).dispatch() };

        // Returns when the running task traps back in, by syscall or tick.
        unsafe { arch::exit_kernel() };

        let request = arch::take_request();
        unsafe { (*kernel_ptr()).handle_request(request) };
    }
}
