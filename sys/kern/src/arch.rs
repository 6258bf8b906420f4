// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! In practice, this works by
//!
//! - Conditionally defining a nested module (below).
//! - `pub use`-ing its contents
//!
//! Thus, all architecture-specific types and functions show up right here in
//! the `arch` module, tailored for the current target. Each backend must
//! define the same set of names:
//!
//! - `enter_kernel` / `exit_kernel`: the context-switch shims.
//! - `set_current_task`, `stage_request`, `take_request`: the handshake
//!   between trampolines / ISR and the dispatcher.
//! - `interrupt_free`, `disable_interrupts`, `interrupts_disabled`.
//! - `start_tick_timer`, `now`.
//!
//! The `avr2560` backend is the real thing. The `hosted` backend stands in
//! on every other target so the kernel's policy code can be compiled and
//! unit-tested on a development machine; it cannot context-switch, and its
//! `enter_kernel`/`exit_kernel` say so loudly.

macro_rules! uassert {
    ($cond:expr) => {
        if !$cond {
            panic!("Assertion failed!");
        }
    };
}

macro_rules! uassert_eq {
    ($left:expr, $right:expr) => {
        if !($left == $right) {
            panic!("Assertion failed!");
        }
    };
}

#[cfg(all(feature = "klog-hosted", not(target_os = "none")))]
macro_rules! klog {
    ($s:expr) => { std::eprintln!(concat!("kern: ", $s)) };
    ($s:expr, $($tt:tt)*) => { std::eprintln!(concat!("kern: ", $s), $($tt)*) };
}

#[cfg(not(all(feature = "klog-hosted", not(target_os = "none"))))]
macro_rules! klog {
    ($s:expr) => {};
    ($s:expr, $($tt:tt)*) => {};
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "avr")] {
        pub mod avr2560;
        pub use avr2560::*;
    } else {
        pub mod hosted;
        pub use hosted::*;
    }
}
