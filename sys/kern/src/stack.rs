// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Initial stack layout for freshly created tasks.
//!
//! A task is started by *restoring* it, exactly as if it had entered the
//! kernel through `enter_kernel` at its first instruction. So creation means
//! writing a plausible saved context onto the task's empty stack and
//! pointing the saved SP below it. From low addresses to high (the order the
//! restore sequence consumes it):
//!
//! ```text
//!   r0..r30          31 bytes, popped first (r1 must be zero: the
//!                    compiler's zero register)
//!   SREG             status register; interrupt-enable bit set so the task
//!                    starts with interrupts on
//!   EIND             extended indirection register (24-bit PC part)
//!   r31
//!   entry address    3 bytes, consumed by `ret` at the end of the restore
//!   terminator addr  3 bytes, consumed by `ret` if the entry function
//!                    returns; points at the terminate trampoline so a task
//!                    that falls off the end of its body self-terminates
//! ```
//!
//! The AVR `ret` instruction pops the program counter most-significant byte
//! first, so both addresses are stored big-endian even though the CPU is
//! otherwise little-endian.

use byteorder::{BigEndian, ByteOrder};
use zerocopy::FromBytes as _;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

use abi::{FatalCode, STACK_BYTES};

use crate::fail;

bitflags::bitflags! {
    /// Bits of the AVR status register.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Sreg: u8 {
        const CARRY = 1 << 0;
        const ZERO = 1 << 1;
        const NEGATIVE = 1 << 2;
        const OVERFLOW = 1 << 3;
        const SIGN = 1 << 4;
        const HALF_CARRY = 1 << 5;
        const TRANSFER = 1 << 6;
        /// Global interrupt enable.
        const INTERRUPT = 1 << 7;
    }
}

/// Width of a return address as `ret` consumes it. The ATmega2560 has more
/// than 128 KiB of flash, so its pushed program counter is three bytes.
pub const RETURN_ADDR_BYTES: usize = 3;

/// The saved context of a task that has never run, laid out the way the
/// restore half of the context switch expects to find it.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct InitialFrame {
    /// r0 through r30. All zero; r1 doubles as the compiler's zero register
    /// and must actually be zero.
    gp_low: [u8; 31],
    sreg: u8,
    eind: u8,
    r31: u8,
    entry: [u8; RETURN_ADDR_BYTES],
    terminator: [u8; RETURN_ADDR_BYTES],
}

/// Bytes a saved full context occupies on a task stack.
pub const FRAME_BYTES: usize = core::mem::size_of::<InitialFrame>();

// The frame must fit with room to spare for actual execution. 64 bytes is
// the floor below which even leaf functions get dicey.
const _: () = assert!(STACK_BYTES >= FRAME_BYTES + 64);

/// Converts a task entry point to the address form `ret` consumes.
///
/// On this target a function pointer's integer value is already in the
/// program-counter encoding that `ret`/`call` use, so the cast is the whole
/// story; it is named so the convention has exactly one home.
pub fn code_addr(f: fn()) -> u32 {
    f as usize as u32
}

/// Writes the initial context frame into the top of `stk` and returns the
/// offset the saved stack pointer should hold: the free cell just below the
/// frame, since AVR `push` stores and then decrements.
pub fn build_initial_frame(
    stk: &mut [u8; STACK_BYTES],
    entry: u32,
    terminator: u32,
) -> usize {
    let frame_at = STACK_BYTES - FRAME_BYTES;
    let Ok(frame) = InitialFrame::mut_from_bytes(&mut stk[frame_at..]) else {
        // Sizes are checked at compile time above; reaching this means the
        // table is corrupt.
        fail::die(FatalCode::Internal);
    };

    frame.gp_low = [0; 31];
    frame.sreg = Sreg::INTERRUPT.bits();
    frame.eind = 0;
    frame.r31 = 0;
    BigEndian::write_u24(&mut frame.entry, entry & 0x00FF_FFFF);
    BigEndian::write_u24(&mut frame.terminator, terminator & 0x00FF_FFFF);

    frame_at - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_matches_restore_order() {
        let mut stk = [0xAAu8; STACK_BYTES];
        let top = build_initial_frame(&mut stk, 0x0001_2345, 0x000A_BCDE);

        assert_eq!(top, STACK_BYTES - FRAME_BYTES - 1);
        // The cell the saved SP points at is free, not part of the frame.
        assert_eq!(stk[top], 0xAA);

        let frame = &stk[STACK_BYTES - FRAME_BYTES..];
        // r0..r30 cleared, r1 (the zero register) in particular.
        assert!(frame[..31].iter().all(|&b| b == 0));
        // Status register: interrupts on, nothing else.
        assert_eq!(frame[31], Sreg::INTERRUPT.bits());
        // EIND and r31.
        assert_eq!(frame[32], 0);
        assert_eq!(frame[33], 0);
        // Return addresses most-significant byte first.
        assert_eq!(&frame[34..37], &[0x01, 0x23, 0x45]);
        assert_eq!(&frame[37..40], &[0x0A, 0xBC, 0xDE]);
    }

    #[test]
    fn frame_is_the_documented_size() {
        // 31 low registers + SREG + EIND + r31 + two 3-byte addresses.
        assert_eq!(FRAME_BYTES, 31 + 1 + 1 + 1 + 3 + 3);
    }
}
