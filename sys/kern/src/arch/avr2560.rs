// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture support for the AVR ATmega2560.
//!
//! # The context switch
//!
//! This is a full-served kernel: the kernel owns a stack (the boot stack)
//! and every entry into it crosses a stack boundary. The crossing is done by
//! two naked shims that are exact mirror images:
//!
//! - [`enter_kernel`] pushes the caller's full register file, `SREG` and
//!   `EIND` onto the *task* stack, saves SP into the current task's
//!   descriptor, loads the kernel SP, and pops the *kernel's* saved context.
//!   The final `ret` resumes the kernel at the instruction after its last
//!   `exit_kernel` call.
//! - [`exit_kernel`] does the same dance in the other direction.
//!
//! It is important to keep the order of saving and restoring exactly
//! reversed, and the stack builder (`crate::stack`) must lay out a new
//! task's first frame in the same order, because starting a task for the
//! first time *is* a restore.
//!
//! Neither shim may touch the stack or registers outside the sequence
//! below, which is why they are naked and why the SP handoff goes through
//! two statics rather than function arguments.
//!
//! # The tick ISR
//!
//! Timer 1 compare A fires every [`TICK_CYCLES`] counts. The handler is the
//! save half of `enter_kernel` inlined (hardware has already disabled
//! interrupts for us), with one twist: the saved copy of `SREG` gets its
//! interrupt-enable bit forced on. The interrupted task certainly had
//! interrupts enabled (this ISR ran), but the bit reads as zero once we are
//! inside the handler; without the fix-up the task would resume with
//! interrupts off forever. The handler then stages `TimerExpired`, advances
//! the compare register and the coarse clock, restores the kernel context,
//! and returns with `ret` -- not `reti`, because the kernel body runs with
//! interrupts masked.

use core::arch::{asm, naked_asm};

use abi::{FatalCode, KernelRequest, TICK_MS};
use avr_device::atmega2560 as pac;
use num_traits::FromPrimitive;

use crate::fail;
use crate::time::Timestamp;

/// I/O-space addresses used by the shims. `in`/`out` operands, not data
/// addresses.
const SPL: u8 = 0x3D;
const SPH: u8 = 0x3E;
const SREG: u8 = 0x3F;
const EIND: u8 = 0x3C;
/// Interrupt-enable bit within `SREG`.
const SREG_I: u8 = 0x80;

/// CPU clock. The board runs the stock Arduino Mega crystal.
const CPU_HZ: u32 = 16_000_000;
/// Timer 1 prescaler (`CS11`).
const TIMER_PRESCALE: u32 = 8;
/// Timer counts per millisecond at the prescaled rate.
const CYCLES_PER_MS: u16 = (CPU_HZ / TIMER_PRESCALE / 1_000) as u16;
/// Timer counts per scheduler tick.
pub const TICK_CYCLES: u16 = CYCLES_PER_MS * TICK_MS;

// Register bits we poke by hand; the PAC's field API names drift between
// releases, the bit positions do not.
const TCCR1B_CS11: u8 = 1 << 1;
const TIMSK1_OCIE1A: u8 = 1 << 1;
const TIFR1_OCF1A: u8 = 1 << 1;

/// Address of the saved-SP cell inside the current task's descriptor. The
/// dispatcher points this at whichever task it resumes next; the shims and
/// the tick ISR load and store through it.
static mut CURRENT_SP_CELL: *mut usize = core::ptr::null_mut();

/// The kernel's own saved stack pointer, written by `exit_kernel` and read
/// by `enter_kernel` and the tick ISR.
static mut KERNEL_SP: usize = 0;

/// The pending request, as a raw discriminant because the tick ISR's
/// assembly path conceptually owns it too.
static mut KERNEL_REQUEST: u8 = 0;

/// Coarse clock: milliseconds elapsed at the most recent tick.
static mut MS_AT_LAST_TICK: u16 = 0;

/// Timer count at the most recent tick (the compare value that fired).
static mut LAST_TICK_COUNT: u16 = 0;

/// Trap from task into kernel. Called by the syscall trampolines with
/// interrupts disabled and a request already staged.
///
/// # Safety
///
/// Must run on a live task's stack with `CURRENT_SP_CELL` pointing at that
/// task's descriptor and a kernel context parked under `KERNEL_SP`.
#[unsafe(naked)]
pub unsafe extern "C" fn enter_kernel() {
    naked_asm!(
        // The call that got us here pushed the task-side return PC; pile
        // the rest of the context on top of it.
        "push r31",
        "in r31, {eind}",
        "push r31",
        "in r31, {sreg}",
        "cli",
        "push r31",
        "push r30", "push r29", "push r28", "push r27", "push r26",
        "push r25", "push r24", "push r23", "push r22", "push r21",
        "push r20", "push r19", "push r18", "push r17", "push r16",
        "push r15", "push r14", "push r13", "push r12", "push r11",
        "push r10", "push r9", "push r8", "push r7", "push r6",
        "push r5", "push r4", "push r3", "push r2", "push r1",
        "push r0",
        // The last piece of the context is SP itself; park it in the
        // current task's descriptor.
        "lds r26, {cur_sp}",
        "lds r27, {cur_sp}+1",
        "in r24, {spl}",
        "in r25, {sph}",
        "st X+, r24",
        "st X, r25",
        // Hop to the kernel stack and unpack the kernel's context.
        "lds r24, {kern_sp}",
        "lds r25, {kern_sp}+1",
        "out {spl}, r24",
        "out {sph}, r25",
        "pop r0",
        "pop r1", "pop r2", "pop r3", "pop r4", "pop r5",
        "pop r6", "pop r7", "pop r8", "pop r9", "pop r10",
        "pop r11", "pop r12", "pop r13", "pop r14", "pop r15",
        "pop r16", "pop r17", "pop r18", "pop r19", "pop r20",
        "pop r21", "pop r22", "pop r23", "pop r24", "pop r25",
        "pop r26", "pop r27", "pop r28", "pop r29", "pop r30",
        "pop r31",
        "out {sreg}, r31",
        "pop r31",
        "out {eind}, r31",
        "pop r31",
        // The kernel-side return PC comes off with the ret.
        "ret",
        eind = const EIND,
        sreg = const SREG,
        spl = const SPL,
        sph = const SPH,
        cur_sp = sym CURRENT_SP_CELL,
        kern_sp = sym KERNEL_SP,
    )
}

/// Resume the current task. Called by the dispatcher loop with interrupts
/// disabled; returns (on the kernel stack) when the task next traps.
///
/// # Safety
///
/// `CURRENT_SP_CELL` must point at a descriptor whose saved SP holds a
/// well-formed context frame -- either parked by `enter_kernel`/the tick
/// ISR, or freshly laid out by the stack builder.
#[unsafe(naked)]
pub unsafe extern "C" fn exit_kernel() {
    naked_asm!(
        "push r31",
        "in r31, {eind}",
        "push r31",
        "in r31, {sreg}",
        "cli",
        "push r31",
        "push r30", "push r29", "push r28", "push r27", "push r26",
        "push r25", "push r24", "push r23", "push r22", "push r21",
        "push r20", "push r19", "push r18", "push r17", "push r16",
        "push r15", "push r14", "push r13", "push r12", "push r11",
        "push r10", "push r9", "push r8", "push r7", "push r6",
        "push r5", "push r4", "push r3", "push r2", "push r1",
        "push r0",
        // Park the kernel SP.
        "in r24, {spl}",
        "in r25, {sph}",
        "sts {kern_sp}, r24",
        "sts {kern_sp}+1, r25",
        // Adopt the task's stack and unpack its context. Interrupt state
        // comes back with the task's saved SREG, so there is no sei here.
        "lds r26, {cur_sp}",
        "lds r27, {cur_sp}+1",
        "ld r24, X+",
        "ld r25, X",
        "out {spl}, r24",
        "out {sph}, r25",
        "pop r0",
        "pop r1", "pop r2", "pop r3", "pop r4", "pop r5",
        "pop r6", "pop r7", "pop r8", "pop r9", "pop r10",
        "pop r11", "pop r12", "pop r13", "pop r14", "pop r15",
        "pop r16", "pop r17", "pop r18", "pop r19", "pop r20",
        "pop r21", "pop r22", "pop r23", "pop r24", "pop r25",
        "pop r26", "pop r27", "pop r28", "pop r29", "pop r30",
        "pop r31",
        "out {sreg}, r31",
        "pop r31",
        "out {eind}, r31",
        "pop r31",
        "ret",
        eind = const EIND,
        sreg = const SREG,
        spl = const SPL,
        sph = const SPH,
        cur_sp = sym CURRENT_SP_CELL,
        kern_sp = sym KERNEL_SP,
    )
}

/// Timer 1 output compare A: the tick trap. See the module docs for why the
/// saved `SREG` gets its I-bit forced on and why this returns with `ret`.
#[unsafe(naked)]
#[export_name = "__vector_17"]
pub unsafe extern "C" fn timer1_compare_a() {
    naked_asm!(
        "push r31",
        "in r31, {eind}",
        "push r31",
        "in r31, {sreg}",
        // The interrupted task was running with interrupts enabled or this
        // handler could not have fired; put the bit back in its saved copy.
        "ori r31, {sreg_i}",
        "push r31",
        "push r30", "push r29", "push r28", "push r27", "push r26",
        "push r25", "push r24", "push r23", "push r22", "push r21",
        "push r20", "push r19", "push r18", "push r17", "push r16",
        "push r15", "push r14", "push r13", "push r12", "push r11",
        "push r10", "push r9", "push r8", "push r7", "push r6",
        "push r5", "push r4", "push r3", "push r2", "push r1",
        "push r0",
        "lds r26, {cur_sp}",
        "lds r27, {cur_sp}+1",
        "in r24, {spl}",
        "in r25, {sph}",
        "st X+, r24",
        "st X, r25",
        "lds r24, {kern_sp}",
        "lds r25, {kern_sp}+1",
        "out {spl}, r24",
        "out {sph}, r25",
        // Bookkeeping happens in Rust on the kernel stack. The ABI wants
        // the zero register actually zero; r1 currently holds task state.
        "clr r1",
        "call {trap}",
        "pop r0",
        "pop r1", "pop r2", "pop r3", "pop r4", "pop r5",
        "pop r6", "pop r7", "pop r8", "pop r9", "pop r10",
        "pop r11", "pop r12", "pop r13", "pop r14", "pop r15",
        "pop r16", "pop r17", "pop r18", "pop r19", "pop r20",
        "pop r21", "pop r22", "pop r23", "pop r24", "pop r25",
        "pop r26", "pop r27", "pop r28", "pop r29", "pop r30",
        "pop r31",
        "out {sreg}, r31",
        "pop r31",
        "out {eind}, r31",
        "pop r31",
        // ret, not reti: the kernel body must run with interrupts masked.
        "ret",
        eind = const EIND,
        sreg = const SREG,
        sreg_i = const SREG_I,
        spl = const SPL,
        sph = const SPH,
        cur_sp = sym CURRENT_SP_CELL,
        kern_sp = sym KERNEL_SP,
        trap = sym tick_trap,
    )
}

/// Rust half of the tick trap. Runs on the kernel stack, interrupts masked.
unsafe extern "C" fn tick_trap() {
    KERNEL_REQUEST = KernelRequest::TimerExpired as u8;

    // Schedule the next compare without stopping the free-running counter.
    let tc1 = &*pac::TC1::ptr();
    tc1.ocr1a
        .modify(|r, w| unsafe { w.bits(r.bits().wrapping_add(TICK_CYCLES)) });

    LAST_TICK_COUNT = LAST_TICK_COUNT.wrapping_add(TICK_CYCLES);
    MS_AT_LAST_TICK = MS_AT_LAST_TICK.wrapping_add(TICK_MS);
}

/// Publishes which task the next `exit_kernel` should resume. Kernel
/// context only.
pub fn set_current_task(sp_cell: *mut usize) {
    uassert!(interrupts_disabled());
    unsafe {
        CURRENT_SP_CELL = sp_cell;
    }
}

/// Stages a request for the next kernel entry. Caller must have interrupts
/// disabled; the slot is shared with the tick ISR.
pub fn stage_request(request: KernelRequest) {
    uassert!(interrupts_disabled());
    unsafe {
        KERNEL_REQUEST = request as u8;
    }
}

/// Consumes the pending request. Kernel context only.
pub fn take_request() -> KernelRequest {
    uassert!(interrupts_disabled());
    let raw = unsafe {
        let raw = KERNEL_REQUEST;
        KERNEL_REQUEST = 0;
        raw
    };
    match KernelRequest::from_u8(raw) {
        Some(request) => request,
        // A trashed request slot means the trampoline protocol broke.
        None => fail::die(FatalCode::Internal),
    }
}

/// Runs `body` with interrupts masked, restoring the caller's `SREG`
/// (including its flag bits) afterwards. This is the trampolines' critical
/// section; it nests correctly because it restores rather than re-enables.
pub fn interrupt_free<R>(body: impl FnOnce() -> R) -> R {
    let sreg = read_sreg();
    disable_interrupts();
    let r = body();
    unsafe {
        asm!("out {sreg}, {0}", in(reg) sreg, sreg = const SREG);
    }
    r
}

pub fn disable_interrupts() {
    unsafe {
        asm!("cli", options(nomem, nostack));
    }
}

pub fn interrupts_disabled() -> bool {
    read_sreg() & SREG_I == 0
}

fn read_sreg() -> u8 {
    let sreg: u8;
    unsafe {
        asm!(
            "in {0}, {sreg}",
            out(reg) sreg,
            sreg = const SREG,
            options(nomem, preserves_flags)
        );
    }
    sreg
}

/// Configures Timer 1 as the tick source and enables its compare interrupt.
/// Called once from startup, before the first `exit_kernel`.
pub fn start_tick_timer() {
    uassert!(interrupts_disabled());
    let tc1 = unsafe { &*pac::TC1::ptr() };

    // Free-running, prescaler /8. No waveform generation; we ride the
    // counter and bump the compare register each tick.
    tc1.tccr1b
        .modify(|r, w| unsafe { w.bits(r.bits() | TCCR1B_CS11) });

    let count = tc1.tcnt1.read().bits();
    unsafe {
        LAST_TICK_COUNT = count;
        MS_AT_LAST_TICK = 0;
    }
    tc1.ocr1a
        .write(|w| unsafe { w.bits(count.wrapping_add(TICK_CYCLES)) });

    // Clear a stale compare flag, then unmask. Writing one clears it.
    tc1.tifr1.write(|w| unsafe { w.bits(TIFR1_OCF1A) });
    tc1.timsk1
        .modify(|r, w| unsafe { w.bits(r.bits() | TIMSK1_OCIE1A) });
}

/// Milliseconds since boot, wrapping at 2^16. Whole ticks come from the
/// coarse clock; the remainder is read out of the free-running counter.
pub fn now() -> Timestamp {
    interrupt_free(|| {
        let tc1 = unsafe { &*pac::TC1::ptr() };
        let (ms, since) = unsafe {
            (
                MS_AT_LAST_TICK,
                tc1.tcnt1.read().bits().wrapping_sub(LAST_TICK_COUNT),
            )
        };
        let sub_ms = (since / CYCLES_PER_MS).min(TICK_MS - 1);
        Timestamp::from_parts(ms, sub_ms)
    })
}
