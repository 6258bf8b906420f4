// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Demo application: one task of every flavor.
//!
//! A periodic sampler publishes the current uptime to a service every
//! release; a SYSTEM watchdog and two round-robin workers subscribe to it.
//! Service ids fit in a task argument, which is how the tasks find the feed
//! their creator allocated.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

use userlib::{
    create_periodic, create_rr, create_system, get_arg, now, service_init,
    service_publish, service_subscribe, yield_now, ServiceId,
};

/// Sampler release interval and initial offset, in ticks.
const SAMPLE_PERIOD: u16 = 20;
const SAMPLE_WCET: u16 = 1;
const SAMPLE_START: u16 = 10;

/// Most recent uptime sample, for anything watching memory from outside.
static mut LATEST_SAMPLE: i16 = 0;

/// Periodic: publish the clock once per release, then hand the slot back.
fn sampler() {
    let feed = ServiceId(get_arg() as u8);
    loop {
        service_publish(feed, now() as i16);
        yield_now();
    }
}

/// SYSTEM: first in line for every sample. A periodic publisher outranks
/// nobody, so the kernel hands us the CPU the moment the publish lands.
fn watchdog() {
    let feed = ServiceId(get_arg() as u8);
    loop {
        let mut sample: i16 = 0;
        service_subscribe(feed, &mut sample);
        // Safety: single writer; the workers only read their own copies.
        unsafe {
            core::ptr::write_volatile(
                core::ptr::addr_of_mut!(LATEST_SAMPLE),
                sample,
            );
        }
    }
}

/// Round-robin: wait for a sample, chew on it, repeat.
fn worker() {
    let feed = ServiceId(get_arg() as u8);
    let mut sum: i16 = 0;
    loop {
        let mut sample: i16 = 0;
        service_subscribe(feed, &mut sample);
        sum = sum.wrapping_add(sample);
        core::hint::black_box(sum);
    }
}

#[no_mangle]
pub fn app_main() {
    let feed = service_init();
    let arg = feed.0 as i16;

    create_system(watchdog, arg);
    create_rr(worker, arg);
    create_rr(worker, arg);
    create_periodic(sampler, arg, SAMPLE_PERIOD, SAMPLE_WCET, SAMPLE_START);

    // Falling off the end terminates this task; the others carry on.
}

#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn main() -> ! {
    userlib::os_init()
}

#[cfg(not(target_os = "none"))]
fn main() {
    // The kernel only runs on the target; hosted builds exist for the
    // test suite in `kern`.
}
