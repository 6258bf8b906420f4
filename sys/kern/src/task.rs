// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task descriptors and the fixed descriptor table.
//!
//! The fields of [`Task`] are private so the invariants around state
//! transitions and container membership stay in this module and in
//! [`crate::queue`]. In particular, a task's intrusive link records *which*
//! container currently threads it; the queue operations check that tag, which
//! is what turns "a task is in at most one container" from a convention into
//! a checked property.

use core::ops::{Index, IndexMut};
use core::ptr::NonNull;

use abi::{CreateArgs, Level, ServiceId, MAX_TASKS, STACK_BYTES};

use crate::stack;

/// Total descriptor count: all user slots plus the pinned idle slot.
pub const TABLE_SIZE: usize = MAX_TASKS + 1;

/// Index of a task in the descriptor table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct TaskIndex(u8);

impl TaskIndex {
    /// The idle task lives in the last slot and is never freed.
    pub const IDLE: Self = Self(MAX_TASKS as u8);

    pub const fn new(ix: usize) -> Self {
        Self(ix as u8)
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TaskState {
    /// Descriptor unused; on the free-list.
    #[default]
    Dead,
    /// Runnable, parked in its level's container.
    Ready,
    /// Currently executing. At most one task is in this state, and none is
    /// while the kernel itself runs.
    Running,
    /// Blocked on a service until the next publish.
    Waiting,
}

/// Identifies the container a task is currently threaded on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Container {
    /// The dead pool of unused descriptors.
    FreeList,
    /// The SYSTEM ready queue.
    SystemReady,
    /// The round-robin ready queue.
    RrReady,
    /// The periodic list; holds every non-dead periodic regardless of state.
    PeriodicList,
    /// A service's subscriber queue.
    Subscribers(ServiceId),
}

/// The intrusive link cell embedded in every descriptor. The same two index
/// fields are reused by whichever container holds the task; `home` says
/// which one that is.
#[derive(Copy, Clone, Debug)]
pub struct Link {
    pub(crate) next: Option<TaskIndex>,
    pub(crate) prev: Option<TaskIndex>,
    pub(crate) home: Option<Container>,
}

impl Link {
    const EMPTY: Self = Self {
        next: None,
        prev: None,
        home: None,
    };
}

/// One task: scheduling bookkeeping plus the task's private stack.
pub struct Task {
    state: TaskState,
    level: Level,
    arg: i16,
    /// Saved stack pointer, valid whenever the task is not executing. This
    /// is the only part of the stack the kernel touches after creation; the
    /// buffer itself belongs to the task.
    sp: usize,
    link: Link,
    /// Slot length in ticks (periodic only).
    period: u16,
    /// Declared worst case per release, in ticks (periodic only).
    wcet: u16,
    /// Ticks until the next release. Signed: it keeps counting down while a
    /// due task waits out higher-priority work.
    countdown: i16,
    /// Where to deliver a published value; set only while `Waiting` on a
    /// service.
    value_sink: Option<NonNull<i16>>,
    stack: [u8; STACK_BYTES],
}

impl Task {
    const fn new() -> Self {
        Self {
            state: TaskState::Dead,
            level: Level::Idle,
            arg: 0,
            sp: 0,
            link: Link::EMPTY,
            period: 0,
            wcet: 0,
            countdown: 0,
            value_sink: None,
            stack: [0; STACK_BYTES],
        }
    }

    /// Fills in a freshly allocated descriptor and lays out its stack so
    /// that the next context restore "returns" into `args.entry`.
    pub(crate) fn initialize(&mut self, args: &CreateArgs) {
        self.state = TaskState::Ready;
        self.level = args.level;
        self.arg = args.arg;
        self.period = args.period;
        self.wcet = args.wcet;
        self.countdown = args.start as i16;
        self.value_sink = None;

        let top = stack::build_initial_frame(
            &mut self.stack,
            stack::code_addr(args.entry),
            stack::code_addr(crate::syscalls::terminate_on_return),
        );
        self.sp = self.stack.as_ptr() as usize + top;
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn arg(&self) -> i16 {
        self.arg
    }

    pub fn period(&self) -> u16 {
        self.period
    }

    pub fn wcet(&self) -> u16 {
        self.wcet
    }

    pub fn countdown(&self) -> i16 {
        self.countdown
    }

    /// A periodic task is due once its countdown has run out.
    pub fn is_due(&self) -> bool {
        self.countdown <= 0
    }

    /// Charges one period for the release that is about to start.
    pub(crate) fn advance_countdown(&mut self) {
        self.countdown = self.countdown.wrapping_add(self.period as i16);
    }

    /// Backs out `advance_countdown` when a release is handed back mid-slot
    /// (pre-emption by a SYSTEM task). The next dispatch will find the task
    /// due again and resume the same slot.
    pub(crate) fn rewind_countdown(&mut self) {
        self.countdown = self.countdown.wrapping_sub(self.period as i16);
    }

    pub(crate) fn tick_countdown(&mut self) {
        self.countdown = self.countdown.wrapping_sub(1);
    }

    pub(crate) fn set_value_sink(&mut self, sink: NonNull<i16>) {
        self.value_sink = Some(sink);
    }

    pub(crate) fn take_value_sink(&mut self) -> Option<NonNull<i16>> {
        self.value_sink.take()
    }

    /// Marks the descriptor dead and severs everything that could alias
    /// user memory.
    pub(crate) fn mark_dead(&mut self) {
        self.state = TaskState::Dead;
        self.value_sink = None;
    }

    /// Address of the saved-SP cell, published to the context-switch shims.
    pub(crate) fn saved_sp_cell(&mut self) -> *mut usize {
        &mut self.sp
    }

    pub(crate) fn link(&self) -> &Link {
        &self.link
    }

    pub(crate) fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

/// The fixed descriptor table. Slot `MAX_TASKS` is the idle task.
pub struct TaskTable {
    tasks: [Task; TABLE_SIZE],
}

impl TaskTable {
    pub const fn new() -> Self {
        // `[Task::new(); N]` needs `Copy`, which a stack buffer should not
        // have; build the array element by element instead.
        const EMPTY: Task = Task::new();
        Self {
            tasks: [EMPTY; TABLE_SIZE],
        }
    }

    pub fn indices() -> impl Iterator<Item = TaskIndex> {
        (0..TABLE_SIZE).map(TaskIndex::new)
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<TaskIndex> for TaskTable {
    type Output = Task;

    fn index(&self, ix: TaskIndex) -> &Task {
        &self.tasks[ix.as_usize()]
    }
}

impl IndexMut<TaskIndex> for TaskTable {
    fn index_mut(&mut self, ix: TaskIndex) -> &mut Task {
        &mut self.tasks[ix.as_usize()]
    }
}
