// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The dispatcher and scheduling policy.
//!
//! All kernel state lives in one [`Kernel`] value: the task table, the three
//! ready containers, the free-list, the service pool and the slot budget.
//! The main loop in `startup` drives it through two entry points:
//!
//! - [`Kernel::dispatch`] picks the task to resume (SYSTEM, then a due
//!   PERIODIC, then round-robin, then idle) and publishes its saved-SP cell
//!   to the context switch.
//! - [`Kernel::handle_request`] interprets whatever request the resumed task
//!   (or the tick ISR) came back with.
//!
//! Every method asserts that interrupts are masked; the kernel is
//! single-threaded by construction and this is the construction.

use abi::{CreateArgs, FatalCode, KernelRequest, Level, TaskId};

use crate::arch;
use crate::fail;
use crate::queue::{List, Queue};
use crate::services::ServicePool;
use crate::task::{Container, TaskIndex, TaskState, TaskTable};

pub struct Kernel {
    pub(crate) tasks: TaskTable,
    /// Dead descriptors waiting for `create_*`.
    pub(crate) free: Queue,
    /// READY SYSTEM tasks, first come first served.
    pub(crate) system: Queue,
    /// READY round-robin tasks.
    pub(crate) rr: Queue,
    /// Every non-dead PERIODIC task, whatever its state.
    pub(crate) periodic: List,
    pub(crate) services: ServicePool,
    /// The task most recently given the CPU.
    pub(crate) current: TaskIndex,
    /// Arguments staged by a `create_*` trampoline, consumed by
    /// `TaskCreate`.
    pub(crate) create_args: Option<CreateArgs>,
    /// Id handed back to the `create_*` trampoline.
    pub(crate) create_result: TaskId,
    /// Ticks left in the open periodic slot; zero means no slot is open.
    pub(crate) ticks_remaining: u16,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            free: Queue::new(Container::FreeList),
            system: Queue::new(Container::SystemReady),
            rr: Queue::new(Container::RrReady),
            periodic: List::new(Container::PeriodicList),
            services: ServicePool::new(),
            current: TaskIndex::IDLE,
            create_args: None,
            create_result: TaskId::NONE,
            ticks_remaining: 0,
        }
    }

    /// One-time setup: threads the free-list, creates the idle task and the
    /// first SYSTEM task, and selects the latter to run.
    pub fn boot(&mut self, idle_entry: fn(), first_entry: fn()) {
        uassert!(arch::interrupts_disabled());
        for ix in (0..abi::MAX_TASKS).map(TaskIndex::new) {
            self.free.enqueue(&mut self.tasks, ix);
        }

        self.create_task(&CreateArgs::idle(idle_entry));
        self.create_task(&CreateArgs::system(first_entry, 0));

        let Some(first) = self.system.dequeue(&mut self.tasks) else {
            fail::die(FatalCode::Internal);
        };
        self.tasks[first].set_state(TaskState::Running);
        self.current = first;
    }

    /// Chooses the task the next `exit_kernel` resumes.
    ///
    /// If the current task is still RUNNING, `handle_request` has already
    /// decided it keeps the CPU -- except for idle, which stands aside for
    /// anyone.
    pub fn dispatch(&mut self) {
        uassert!(arch::interrupts_disabled());

        if self.tasks[self.current].state() != TaskState::Running
            || self.current == TaskIndex::IDLE
        {
            if self.tasks[self.current].state() == TaskState::Running {
                // Only idle gets here still RUNNING; it has no queue to
                // wait on, so just demote it in place.
                self.tasks[self.current].set_state(TaskState::Ready);
            }

            let next = if let Some(ix) = self.system.dequeue(&mut self.tasks)
            {
                ix
            } else if let Some(ix) = self.find_due_periodic() {
                self.tasks[ix].advance_countdown();
                // Zero means a fresh slot: arm the full budget. Nonzero
                // means a pre-empted slot is resuming with what it has
                // left.
                if self.ticks_remaining == 0 {
                    self.ticks_remaining = self.tasks[ix].wcet();
                }
                ix
            } else if let Some(ix) = self.rr.dequeue(&mut self.tasks) {
                ix
            } else {
                TaskIndex::IDLE
            };

            self.tasks[next].set_state(TaskState::Running);
            self.current = next;
        }

        self.check_dispatch_invariants();
        arch::set_current_task(self.tasks[self.current].saved_sp_cell());
    }

    /// Scans the periodic list for a task whose countdown has run out.
    /// Exactly one may be due; two at once is unschedulable and fatal.
    fn find_due_periodic(&self) -> Option<TaskIndex> {
        let mut due = None;
        let mut ix = self.periodic.head();
        while let Some(p) = ix {
            if self.tasks[p].is_due() {
                if due.is_some() {
                    fail::die(FatalCode::PeriodicCollision);
                }
                due = Some(p);
            }
            ix = self.periodic.next(&self.tasks, p);
        }
        due
    }

    /// Interprets the request the last `exit_kernel` came back with.
    pub fn handle_request(&mut self, request: KernelRequest) {
        uassert!(arch::interrupts_disabled());
        match request {
            KernelRequest::None => {
                // Spurious kernel entry; nothing to do.
            }

            KernelRequest::TimerExpired => {
                self.update_ticker();

                // Round-robin tasks are pre-empted on every tick. SYSTEM
                // and PERIODIC tasks run to completion or voluntary yield.
                let cur = self.current;
                if self.tasks[cur].level() == Level::Rr
                    && self.tasks[cur].state() == TaskState::Running
                {
                    self.tasks[cur].set_state(TaskState::Ready);
                    self.rr.enqueue(&mut self.tasks, cur);
                }
            }

            KernelRequest::TaskCreate => {
                let Some(args) = self.create_args.take() else {
                    fail::die(FatalCode::Internal);
                };
                self.create_result = self.create_task(&args);
                self.maybe_demote_current(&args);
            }

            KernelRequest::TaskTerminate => {
                if self.current != TaskIndex::IDLE {
                    self.terminate_current();
                }
            }

            KernelRequest::TaskNext => self.yield_current(),

            KernelRequest::TaskInterrupt => self.interrupt_current(),
        }
    }

    /// Allocates and initializes a descriptor and threads it onto its
    /// level's container. Exhaustion and a WCET that cannot fit its period
    /// are configuration errors, and configuration errors are fatal.
    fn create_task(&mut self, args: &CreateArgs) -> TaskId {
        if args.level == Level::Periodic
            && (args.period == 0 || args.period < args.wcet)
        {
            fail::die(FatalCode::WcetExceedsPeriod);
        }

        let ix = if args.level == Level::Idle {
            // The idle slot is reserved past the end of the free-list.
            TaskIndex::IDLE
        } else {
            match self.free.dequeue(&mut self.tasks) {
                Some(ix) => ix,
                None => fail::die(FatalCode::TooManyTasks),
            }
        };

        self.tasks[ix].initialize(args);

        match args.level {
            Level::System => self.system.enqueue(&mut self.tasks, ix),
            Level::Periodic => self.periodic.append(&mut self.tasks, ix),
            Level::Rr => self.rr.enqueue(&mut self.tasks, ix),
            Level::Idle => {}
        }

        TaskId::for_index(ix.as_usize())
    }

    /// Decides whether the task that just created `args` keeps the CPU.
    fn maybe_demote_current(&mut self, args: &CreateArgs) {
        let cur = self.current;

        // A new SYSTEM task outranks any non-SYSTEM current task.
        if args.level == Level::System
            && self.tasks[cur].level() != Level::System
        {
            self.tasks[cur].set_state(TaskState::Ready);
            if self.tasks[cur].level() == Level::Periodic {
                // Hand the release back so the next dispatch finds this
                // task due again, and return the tick the demotion ate.
                self.tasks[cur].rewind_countdown();
                self.ticks_remaining += 1;
            }
        }

        // A PERIODIC task due immediately outranks a running RR task.
        if self.tasks[cur].level() == Level::Rr
            && args.level == Level::Periodic
            && args.start == 0
        {
            self.tasks[cur].set_state(TaskState::Ready);
        }

        // Either demotion above leaves an RR task READY but unqueued; it
        // rejoins at the back of the line here.
        if self.tasks[cur].level() == Level::Rr
            && self.tasks[cur].state() == TaskState::Ready
        {
            self.rr.enqueue(&mut self.tasks, cur);
        }
    }

    /// `TASK_TERMINATE`: the current task is done forever.
    fn terminate_current(&mut self) {
        let cur = self.current;
        if self.tasks[cur].level() == Level::Periodic {
            self.periodic.remove(&mut self.tasks, cur);
        }
        self.tasks[cur].mark_dead();
        self.free.enqueue(&mut self.tasks, cur);
    }

    /// `TASK_NEXT`: voluntary yield. A WAITING caller (one that just
    /// subscribed) is left exactly where it is.
    fn yield_current(&mut self) {
        let cur = self.current;
        if self.tasks[cur].state() != TaskState::Running {
            return;
        }

        match self.tasks[cur].level() {
            Level::System => self.system.enqueue(&mut self.tasks, cur),
            Level::Periodic => {
                // Release the rest of the slot. The periodic list carries
                // the task; there is nothing to re-enqueue.
                self.ticks_remaining = 0;
            }
            Level::Rr => self.rr.enqueue(&mut self.tasks, cur),
            Level::Idle => {}
        }

        self.tasks[cur].set_state(TaskState::Ready);
    }

    /// `TASK_INTERRUPT`: a publish made a SYSTEM task runnable; the
    /// publisher steps aside. Front-of-queue, not back: it resumes as soon
    /// as the woken work drains.
    fn interrupt_current(&mut self) {
        let cur = self.current;
        if self.tasks[cur].state() != TaskState::Running {
            return;
        }

        match self.tasks[cur].level() {
            Level::System => {
                // SYSTEM publishers are never displaced.
            }
            Level::Periodic => {
                self.tasks[cur].set_state(TaskState::Ready);
                self.tasks[cur].rewind_countdown();
                self.ticks_remaining += 1;
            }
            Level::Rr => {
                self.tasks[cur].set_state(TaskState::Ready);
                self.rr.push_front(&mut self.tasks, cur);
            }
            Level::Idle => {
                self.tasks[cur].set_state(TaskState::Ready);
            }
        }
    }

    /// `TIMER_EXPIRED` bookkeeping: burn the open slot's budget, detect
    /// overrun, count every periodic down and detect collisions with the
    /// running release. Skipped entirely while no periodics exist.
    fn update_ticker(&mut self) {
        if self.periodic.is_empty() {
            return;
        }

        let cur = self.current;
        if self.tasks[cur].level() != Level::System
            && self.ticks_remaining > 0
        {
            // The budget burns for any non-SYSTEM tick, not just the
            // periodic's own: time spent by RR work inside a pre-empted
            // slot still counts against that slot. SYSTEM time is free.
            self.ticks_remaining -= 1;
            if self.ticks_remaining == 0
                && self.tasks[cur].level() == Level::Periodic
            {
                fail::die(FatalCode::PeriodicOverrun);
            }
        }

        let mut ix = self.periodic.head();
        while let Some(p) = ix {
            let next = self.periodic.next(&self.tasks, p);
            self.tasks[p].tick_countdown();
            if self.tasks[p].countdown() == 0
                && self.tasks[cur].level() == Level::Periodic
                && p != cur
            {
                // A second release came due while another periodic still
                // holds its slot. Releases of non-running periodics may
                // overlap here; those collide at the next dispatch instead.
                fail::die(FatalCode::PeriodicCollision);
            }
            ix = next;
        }
    }

    /// Post-dispatch invariants: exactly one RUNNING task, and it never
    /// outranks a READY SYSTEM task.
    fn check_dispatch_invariants(&self) {
        let mut running = 0;
        for ix in TaskTable::indices() {
            if self.tasks[ix].state() == TaskState::Running {
                running += 1;
            }
        }
        uassert_eq!(running, 1);
        uassert_eq!(self.tasks[self.current].state(), TaskState::Running);

        if self.tasks[self.current].level() != Level::System {
            uassert!(self.system.is_empty());
        }
    }

    /// Index of the task currently given the CPU.
    pub fn current(&self) -> TaskIndex {
        self.current
    }

    /// The current task's creation argument; answered by the `get_arg`
    /// trampoline without a kernel entry.
    pub fn current_arg(&self) -> i16 {
        self.tasks[self.current].arg()
    }

    /// Parks `create_*` arguments for the next `TaskCreate` request.
    pub fn stage_create(&mut self, args: CreateArgs) {
        uassert!(arch::interrupts_disabled());
        self.create_args = Some(args);
    }

    /// Reads back the id produced by the last `TaskCreate`.
    pub fn take_create_result(&mut self) -> TaskId {
        core::mem::replace(&mut self.create_result, TaskId::NONE)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;
    use abi::{KernelRequest as Req, MAX_SERVICES, MAX_TASKS};
    use core::ptr::NonNull;

    fn noop() {}

    /// Boots a kernel the way `startup` does: idle in the reserved slot, a
    /// SYSTEM "main" task (arg 0) selected as current.
    fn booted() -> Kernel {
        let mut k = Kernel::new();
        k.boot(noop, noop);
        k
    }

    /// Simulates the current task calling a `create_*` trampoline. Note
    /// that, as in the real kernel, the dispatcher does not run until the
    /// caller's next simulated trap.
    fn create(k: &mut Kernel, args: CreateArgs) -> TaskId {
        k.stage_create(args);
        k.handle_request(Req::TaskCreate);
        k.take_create_result()
    }

    /// Simulates a tick trap and the dispatcher round after it.
    fn tick(k: &mut Kernel) {
        k.handle_request(Req::TimerExpired);
        k.dispatch();
    }

    /// Simulates the current task yielding.
    fn yield_current(k: &mut Kernel) {
        k.handle_request(Req::TaskNext);
        k.dispatch();
    }

    /// Simulates the current task terminating (or returning from its body,
    /// which lands in the same request).
    fn terminate_current(k: &mut Kernel) {
        k.handle_request(Req::TaskTerminate);
        k.dispatch();
    }

    #[test]
    fn boot_selects_the_first_system_task() {
        let mut k = booted();
        assert_eq!(k.tasks[k.current()].level(), Level::System);
        assert_ne!(k.current(), crate::task::TaskIndex::IDLE);
        // Re-dispatching without a request changes nothing and passes the
        // post-dispatch invariant checks.
        let me = k.current();
        k.dispatch();
        assert_eq!(k.current(), me);
    }

    #[test]
    fn round_robin_is_strict_fifo() {
        let mut k = booted();
        for id in 1..=3 {
            create(&mut k, CreateArgs::round_robin(noop, id));
        }
        terminate_current(&mut k);

        let mut log = Vec::new();
        for _ in 0..9 {
            log.push(k.current_arg());
            yield_current(&mut k);
        }
        assert_eq!(log, [1, 2, 3, 1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn tick_rotates_round_robin_tasks() {
        let mut k = booted();
        create(&mut k, CreateArgs::round_robin(noop, 1));
        create(&mut k, CreateArgs::round_robin(noop, 2));
        terminate_current(&mut k);

        assert_eq!(k.current_arg(), 1);
        tick(&mut k);
        assert_eq!(k.current_arg(), 2);
        tick(&mut k);
        assert_eq!(k.current_arg(), 1);
    }

    #[test]
    fn new_system_task_preempts_rr_creator() {
        let mut k = booted();
        create(&mut k, CreateArgs::round_robin(noop, 10));
        create(&mut k, CreateArgs::round_robin(noop, 11));
        terminate_current(&mut k);
        assert_eq!(k.current_arg(), 10);
        let r1 = k.current();

        // R1 creates a SYSTEM task; it loses the CPU before its next
        // instruction and rejoins at the back of the RR line.
        create(&mut k, CreateArgs::system(noop, 99));
        assert_eq!(k.tasks[r1].state(), TaskState::Ready);
        k.dispatch();
        assert_eq!(k.current_arg(), 99);

        terminate_current(&mut k);
        assert_eq!(k.current_arg(), 11);
        yield_current(&mut k);
        assert_eq!(k.current(), r1);
    }

    #[test]
    fn created_task_observes_its_argument() {
        let mut k = booted();
        create(&mut k, CreateArgs::round_robin(noop, -1234));
        terminate_current(&mut k);
        assert_eq!(k.current_arg(), -1234);
    }

    #[test]
    fn yield_with_no_competition_returns_to_caller() {
        let mut k = booted();
        let me = k.current();
        yield_current(&mut k);
        assert_eq!(k.current(), me);
        yield_current(&mut k);
        assert_eq!(k.current(), me);
        assert!(k.system.is_empty());
        assert_eq!(k.ticks_remaining, 0);
    }

    #[test]
    fn periodic_release_count_matches_the_formula() {
        let mut k = booted();
        let (period, start) = (7u16, 3u16);
        create(&mut k, CreateArgs::periodic(noop, 1, period, 1, start));
        terminate_current(&mut k);

        let n_ticks = 40usize;
        let mut releases = 0;
        for _ in 0..n_ticks {
            tick(&mut k);
            if k.tasks[k.current()].level() == Level::Periodic {
                releases += 1;
                yield_current(&mut k);
            }
        }
        assert_eq!(
            releases,
            (n_ticks - usize::from(start)) / usize::from(period) + 1
        );
    }

    #[test]
    fn system_create_suspends_and_resumes_a_periodic_slot() {
        let mut k = booted();
        create(&mut k, CreateArgs::periodic(noop, 1, 10, 4, 0));
        terminate_current(&mut k);
        assert_eq!(k.current_arg(), 1);
        let p = k.current();

        tick(&mut k);
        assert_eq!(k.ticks_remaining, 3);

        // The periodic spawns a SYSTEM helper mid-slot: it is demoted, its
        // countdown advance is reversed, and the demotion tick is returned.
        create(&mut k, CreateArgs::system(noop, 9));
        assert_eq!(k.tasks[p].state(), TaskState::Ready);
        assert!(k.tasks[p].is_due());
        assert_eq!(k.ticks_remaining, 4);
        k.dispatch();
        assert_eq!(k.current_arg(), 9);

        // When the helper finishes the same slot resumes, budget intact.
        terminate_current(&mut k);
        assert_eq!(k.current(), p);
        assert_eq!(k.ticks_remaining, 4);
    }

    #[test]
    fn system_ticks_are_not_charged_to_the_slot() {
        let mut k = booted();
        create(&mut k, CreateArgs::periodic(noop, 1, 10, 2, 0));
        terminate_current(&mut k);

        create(&mut k, CreateArgs::system(noop, 9));
        k.dispatch();
        assert_eq!(k.current_arg(), 9);
        let budget = k.ticks_remaining;

        // The helper runs for a while; SYSTEM time is free.
        tick(&mut k);
        tick(&mut k);
        tick(&mut k);
        assert_eq!(k.current_arg(), 9);
        assert_eq!(k.ticks_remaining, budget);
    }

    #[test]
    #[should_panic(expected = "PeriodicOverrun")]
    fn periodic_overrun_is_fatal() {
        let mut k = booted();
        create(&mut k, CreateArgs::periodic(noop, 1, 10, 3, 0));
        terminate_current(&mut k);
        assert_eq!(k.current_arg(), 1);

        // The body busy-loops well past its declared worst case.
        for _ in 0..5 {
            tick(&mut k);
        }
    }

    #[test]
    #[should_panic(expected = "PeriodicCollision")]
    fn simultaneous_periodics_collide_at_dispatch() {
        let mut k = booted();
        create(&mut k, CreateArgs::periodic(noop, 1, 10, 2, 0));
        create(&mut k, CreateArgs::periodic(noop, 2, 10, 2, 0));
        terminate_current(&mut k);
    }

    #[test]
    #[should_panic(expected = "PeriodicCollision")]
    fn release_due_while_another_periodic_runs_is_fatal() {
        let mut k = booted();
        create(&mut k, CreateArgs::periodic(noop, 1, 10, 5, 0));
        create(&mut k, CreateArgs::periodic(noop, 2, 10, 2, 2));
        terminate_current(&mut k);
        assert_eq!(k.current_arg(), 1);

        tick(&mut k);
        tick(&mut k); // the second release comes due mid-slot
    }

    #[test]
    #[should_panic(expected = "WcetExceedsPeriod")]
    fn wcet_must_fit_in_period() {
        let mut k = booted();
        create(&mut k, CreateArgs::periodic(noop, 0, 5, 6, 0));
    }

    #[test]
    #[should_panic(expected = "TooManyTasks")]
    fn table_exhaustion_is_fatal() {
        let mut k = booted();
        // The boot task holds one slot; the pool runs dry one short of
        // MAX_TASKS.
        for i in 0..MAX_TASKS {
            create(&mut k, CreateArgs::round_robin(noop, i as i16));
        }
    }

    #[test]
    fn terminated_descriptors_recycle() {
        let mut k = booted();
        // Fill the pool...
        for i in 0..MAX_TASKS - 1 {
            let id = create(&mut k, CreateArgs::round_robin(noop, i as i16));
            assert!(!id.is_none());
        }
        // ...then keep creating: each task spawns a successor and falls
        // through. Twice around the pool proves the free-list recycles.
        for round in 0..2 * MAX_TASKS {
            terminate_current(&mut k);
            let id =
                create(&mut k, CreateArgs::round_robin(noop, round as i16));
            assert!(!id.is_none());
        }
    }

    #[test]
    fn publish_broadcasts_to_every_waiter() {
        let mut k = booted();
        let sid = k.service_init();
        create(&mut k, CreateArgs::round_robin(noop, 1));
        create(&mut k, CreateArgs::round_robin(noop, 2));
        create(&mut k, CreateArgs::round_robin(noop, 3)); // never subscribes
        let mut xa: i16 = 0;
        let mut xb: i16 = 0;
        terminate_current(&mut k);

        // A and B block on the service.
        assert_eq!(k.current_arg(), 1);
        let a = k.current();
        k.subscribe_current(sid, NonNull::from(&mut xa));
        yield_current(&mut k);
        assert_eq!(k.current_arg(), 2);
        let b = k.current();
        k.subscribe_current(sid, NonNull::from(&mut xb));
        yield_current(&mut k);

        // C spawns a SYSTEM publisher, which displaces it.
        assert_eq!(k.current_arg(), 3);
        create(&mut k, CreateArgs::system(noop, 9));
        k.dispatch();
        assert_eq!(k.current_arg(), 9);

        // One publish reaches both waiters; a SYSTEM publisher never needs
        // the interrupt follow-up.
        assert!(!k.publish(sid, 42));
        assert_eq!((xa, xb), (42, 42));
        assert_eq!(k.tasks[a].state(), TaskState::Ready);
        assert_eq!(k.tasks[b].state(), TaskState::Ready);

        // Both woken tasks run before C comes around again.
        terminate_current(&mut k);
        let first = k.current();
        yield_current(&mut k);
        let second = k.current();
        assert!(
            (first, second) == (a, b) || (first, second) == (b, a),
            "woken subscribers should run first"
        );
        yield_current(&mut k);
        assert_eq!(k.current_arg(), 3);
    }

    #[test]
    fn subscribe_after_publish_misses_the_value() {
        let mut k = booted();
        let sid = k.service_init();
        create(&mut k, CreateArgs::round_robin(noop, 1));
        create(&mut k, CreateArgs::round_robin(noop, 2));

        // Published into the void: nobody is subscribed yet.
        assert!(!k.publish(sid, 7));

        let mut xa: i16 = 0;
        terminate_current(&mut k);
        assert_eq!(k.current_arg(), 1);
        let a = k.current();
        k.subscribe_current(sid, NonNull::from(&mut xa));
        yield_current(&mut k);
        assert_eq!(k.tasks[a].state(), TaskState::Waiting);
        assert_eq!(xa, 0);

        // Ticks pass; the late subscriber stays parked.
        tick(&mut k);
        assert_eq!(k.tasks[a].state(), TaskState::Waiting);

        // Only the next publish lands.
        assert_eq!(k.current_arg(), 2);
        assert!(!k.publish(sid, 9));
        assert_eq!(xa, 9);
        assert_eq!(k.tasks[a].state(), TaskState::Ready);
    }

    #[test]
    fn waking_a_system_task_interrupts_the_publisher() {
        let mut k = booted();
        let sid = k.service_init();
        create(&mut k, CreateArgs::system(noop, 5)); // waiter
        create(&mut k, CreateArgs::round_robin(noop, 6)); // publisher
        let mut cell: i16 = 0;
        terminate_current(&mut k);

        assert_eq!(k.current_arg(), 5);
        let w = k.current();
        k.subscribe_current(sid, NonNull::from(&mut cell));
        yield_current(&mut k);

        assert_eq!(k.current_arg(), 6);
        let p = k.current();
        // The publish wakes a SYSTEM task; the trampoline must follow up
        // with TaskInterrupt, after which the waiter owns the CPU and the
        // publisher sits at the front of the RR queue.
        assert!(k.publish(sid, 7));
        k.handle_request(Req::TaskInterrupt);
        k.dispatch();
        assert_eq!(k.current(), w);
        assert_eq!(cell, 7);
        assert_eq!(k.tasks[p].state(), TaskState::Ready);

        // The waiter goes back to sleep; the publisher resumes.
        k.subscribe_current(sid, NonNull::from(&mut cell));
        yield_current(&mut k);
        assert_eq!(k.current(), p);
    }

    #[test]
    #[should_panic(expected = "PeriodicSubscribed")]
    fn periodic_tasks_cannot_subscribe() {
        let mut k = booted();
        let sid = k.service_init();
        create(&mut k, CreateArgs::periodic(noop, 1, 10, 2, 0));
        terminate_current(&mut k);
        assert_eq!(k.current_arg(), 1);

        let mut cell: i16 = 0;
        k.subscribe_current(sid, NonNull::from(&mut cell));
    }

    #[test]
    #[should_panic(expected = "TooManyServices")]
    fn service_pool_exhaustion_is_fatal() {
        let mut k = booted();
        for _ in 0..=MAX_SERVICES {
            k.service_init();
        }
    }
}
