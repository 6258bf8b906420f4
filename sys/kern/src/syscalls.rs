// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Syscall trampolines: the user-side half of every kernel entry.
//!
//! Each trampoline runs on the calling task's stack. The protocol is always
//! the same: save the caller's status register and mask interrupts, stage
//! the request (and any arguments) in the kernel, cross the stack boundary
//! with `enter_kernel`, and restore the status register once the kernel
//! resumes us. Two calls skip the kernel entirely: `sys_get_arg` only reads,
//! and `sys_now` only talks to the clock.
//!
//! Kernel accesses here re-derive the raw pointer for every touch instead of
//! holding a reference, because `enter_kernel` parks this stack while the
//! dispatcher -- which has its own access path -- runs.

use core::ptr::NonNull;

use abi::{CreateArgs, FatalCode, KernelRequest, ServiceId, TaskId};

use crate::arch;
use crate::fail;
use crate::startup::kernel_ptr;
use crate::time::Timestamp;

/// Creates a task. Fails fatally rather than returning `TaskId::NONE`; the
/// zero id exists for ABI completeness.
pub fn sys_create(args: CreateArgs) -> TaskId {
    arch::interrupt_free(|| {
        unsafe { (*kernel_ptr()).stage_create(args) };
        arch::stage_request(KernelRequest::TaskCreate);
        unsafe { arch::enter_kernel() };
        unsafe { (*kernel_ptr()).take_create_result() }
    })
}

/// Gives up the rest of the current slot.
pub fn sys_yield() {
    arch::interrupt_free(|| {
        arch::stage_request(KernelRequest::TaskNext);
        unsafe { arch::enter_kernel() };
    });
}

/// Terminates the calling task. The kernel frees the descriptor and never
/// resumes this stack.
pub fn sys_terminate() -> ! {
    arch::disable_interrupts();
    arch::stage_request(KernelRequest::TaskTerminate);
    unsafe { arch::enter_kernel() };
    // Resuming a terminated task means the free-list is corrupt.
    fail::die(FatalCode::Internal)
}

/// Planted by the stack builder as every entry function's return address,
/// so a task body that returns terminates like one that called
/// [`sys_terminate`].
pub fn terminate_on_return() {
    sys_terminate();
}

/// The 16-bit argument this task was created with. Answered from the
/// descriptor without entering the kernel.
pub fn sys_get_arg() -> i16 {
    arch::interrupt_free(|| unsafe { (*kernel_ptr()).current_arg() })
}

/// Milliseconds since boot, wrapping at 2^16.
pub fn sys_now() -> Timestamp {
    arch::now()
}

/// Allocates a service.
pub fn sys_service_init() -> ServiceId {
    arch::interrupt_free(|| unsafe { (*kernel_ptr()).service_init() })
}

/// Blocks until the next publish on `sid`; the published value lands in
/// `cell`. The cell stays borrowed for the whole wait: this function does
/// not return until the kernel has written it and rescheduled us.
pub fn sys_service_subscribe(sid: ServiceId, cell: &mut i16) {
    arch::interrupt_free(|| {
        let sink = NonNull::from(&mut *cell);
        unsafe { (*kernel_ptr()).subscribe_current(sid, sink) };
        // Subscribing parked us WAITING; now actually give up the CPU. The
        // kernel knows not to re-enqueue a WAITING yielder.
        arch::stage_request(KernelRequest::TaskNext);
        unsafe { arch::enter_kernel() };
    });
}

/// Broadcasts `value` to everything subscribed to `sid`. If that woke a
/// SYSTEM task and we are not one, immediately trade the CPU away so it can
/// run.
pub fn sys_service_publish(sid: ServiceId, value: i16) {
    arch::interrupt_free(|| {
        let woke_system = unsafe { (*kernel_ptr()).publish(sid, value) };
        if woke_system {
            arch::stage_request(KernelRequest::TaskInterrupt);
            unsafe { arch::enter_kernel() };
        }
    });
}

/// Voluntary fatal stop, for applications that detect their own
/// unrecoverable conditions.
pub fn sys_abort() -> ! {
    fail::die(FatalCode::UserAbort)
}
