// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Services: a broadcast rendezvous carrying one 16-bit value.
//!
//! A service is nothing but a queue of blocked subscribers. Subscribing
//! parks the calling task (WAITING, off every ready queue) with a pointer to
//! the cell it wants filled; publishing drains the queue in FIFO order,
//! writes the value through every registered cell, and makes each subscriber
//! READY at the *front* of its level's queue. There is no buffering: a value
//! published with no subscribers is gone, and a task that subscribes after a
//! publish waits for the next one.
//!
//! If a publish wakes a SYSTEM task and the publisher is not itself SYSTEM,
//! the publisher's trampoline follows up with a `TaskInterrupt` so the woken
//! task gets the CPU immediately; see `syscalls::sys_service_publish`.

use core::ptr::NonNull;

use abi::{FatalCode, Level, ServiceId, MAX_SERVICES};

use crate::arch;
use crate::fail;
use crate::queue::Queue;
use crate::sched::Kernel;
use crate::task::{Container, TaskState};

/// One rendezvous point.
#[derive(Copy, Clone)]
pub struct Service {
    pub(crate) subscribers: Queue,
}

impl Service {
    const fn new(id: ServiceId) -> Self {
        Self {
            subscribers: Queue::new(Container::Subscribers(id)),
        }
    }
}

/// The fixed pool services are handed out of. Services are never freed;
/// their ids stay valid for the life of the system.
pub struct ServicePool {
    services: [Service; MAX_SERVICES],
    next: u8,
}

impl ServicePool {
    pub const fn new() -> Self {
        // Each slot's queue is stamped with its own identity up front, so
        // the container tags are right even before allocation.
        let mut services = [Service::new(ServiceId(0)); MAX_SERVICES];
        let mut i = 1;
        while i < MAX_SERVICES {
            services[i] = Service::new(ServiceId(i as u8));
            i += 1;
        }
        Self { services, next: 0 }
    }

    fn allocate(&mut self) -> ServiceId {
        if usize::from(self.next) >= MAX_SERVICES {
            fail::die(FatalCode::TooManyServices);
        }
        let id = ServiceId(self.next);
        self.next += 1;
        id
    }

    pub(crate) fn service_mut(&mut self, id: ServiceId) -> &mut Service {
        uassert!(id.0 < self.next);
        &mut self.services[usize::from(id.0)]
    }
}

impl Default for ServicePool {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Allocates a service from the pool. Exhaustion is a configuration
    /// error and fatal, like every other pool here.
    pub fn service_init(&mut self) -> ServiceId {
        uassert!(arch::interrupts_disabled());
        self.services.allocate()
    }

    /// Parks the current task on `sid` until the next publish, which will
    /// write through `sink`. Periodic tasks cannot block -- a blocked
    /// release could never meet its WCET -- so a periodic caller is fatal.
    ///
    /// The caller must follow up with a `TaskNext` request; the task is
    /// WAITING from here on and must not keep the CPU.
    pub fn subscribe_current(&mut self, sid: ServiceId, sink: NonNull<i16>) {
        uassert!(arch::interrupts_disabled());
        let cur = self.current;
        if self.tasks[cur].level() == Level::Periodic {
            fail::die(FatalCode::PeriodicSubscribed);
        }

        self.services
            .service_mut(sid)
            .subscribers
            .enqueue(&mut self.tasks, cur);
        self.tasks[cur].set_state(TaskState::Waiting);
        self.tasks[cur].set_value_sink(sink);
    }

    /// Delivers `value` to every task currently subscribed to `sid`, waking
    /// them at the front of their ready queues. Returns whether a SYSTEM
    /// task was woken by a non-SYSTEM publisher, in which case the caller
    /// should issue a `TaskInterrupt` and yield the CPU.
    pub fn publish(&mut self, sid: ServiceId, value: i16) -> bool {
        uassert!(arch::interrupts_disabled());
        let publisher_level = self.tasks[self.current].level();
        let mut woke_system = false;

        while let Some(sub) = self
            .services
            .service_mut(sid)
            .subscribers
            .dequeue(&mut self.tasks)
        {
            if self.tasks[sub].state() != TaskState::Waiting {
                continue;
            }

            let Some(sink) = self.tasks[sub].take_value_sink() else {
                fail::die(FatalCode::Internal);
            };
            // Safety: the subscriber registered this cell when it blocked
            // and has been WAITING ever since, so nothing else is touching
            // it; it cannot run again until we mark it READY below.
            unsafe {
                sink.as_ptr().write(value);
            }

            self.tasks[sub].set_state(TaskState::Ready);
            match self.tasks[sub].level() {
                Level::System => {
                    if publisher_level != Level::System {
                        woke_system = true;
                    }
                    self.system.push_front(&mut self.tasks, sub);
                }
                Level::Rr => self.rr.push_front(&mut self.tasks, sub),
                Level::Periodic | Level::Idle => {
                    // Subscribe refuses periodics, and idle never calls
                    // anything; finding one here means the queues are
                    // corrupt.
                    fail::die(FatalCode::PeriodicFoundSubscribed);
                }
            }
        }

        woke_system
    }
}
