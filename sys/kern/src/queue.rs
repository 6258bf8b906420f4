// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Intrusive containers threading tasks through their embedded link cells.
//!
//! Both containers store table indices, not pointers, so they are plain data
//! and the borrow of the task table stays explicit at every call site. Each
//! container knows its identity (`Container`); inserting a task stamps that
//! identity into the task's link, and every removal checks it. A task can
//! therefore never be threaded on two containers at once without tripping an
//! assertion.

use crate::task::{Container, TaskIndex, TaskTable};

/// Singly-threaded FIFO with head and tail, used for the ready queues, the
/// free-list and service subscriber queues.
#[derive(Copy, Clone, Debug)]
pub struct Queue {
    head: Option<TaskIndex>,
    tail: Option<TaskIndex>,
    home: Container,
}

impl Queue {
    pub const fn new(home: Container) -> Self {
        Self {
            head: None,
            tail: None,
            home,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Inserts at the tail.
    pub fn enqueue(&mut self, tasks: &mut TaskTable, ix: TaskIndex) {
        let link = tasks[ix].link_mut();
        uassert!(link.home.is_none());
        link.next = None;
        link.prev = None;
        link.home = Some(self.home);

        match self.tail {
            None => {
                self.head = Some(ix);
                self.tail = Some(ix);
            }
            Some(tail) => {
                tasks[tail].link_mut().next = Some(ix);
                self.tail = Some(ix);
            }
        }
    }

    /// Inserts at the head, ahead of everything already queued. Service
    /// wakeups use this so a just-unblocked task runs before its level's
    /// backlog.
    pub fn push_front(&mut self, tasks: &mut TaskTable, ix: TaskIndex) {
        let head = self.head;
        let link = tasks[ix].link_mut();
        uassert!(link.home.is_none());
        link.next = head;
        link.prev = None;
        link.home = Some(self.home);

        match head {
            None => {
                self.head = Some(ix);
                self.tail = Some(ix);
            }
            Some(old) => {
                tasks[old].link_mut().prev = Some(ix);
                self.head = Some(ix);
            }
        }
    }

    /// Removes and returns the head, or `None` if the queue is empty.
    pub fn dequeue(&mut self, tasks: &mut TaskTable) -> Option<TaskIndex> {
        let ix = self.head?;
        let link = tasks[ix].link_mut();
        uassert!(link.home == Some(self.home));
        self.head = link.next;
        if self.head.is_none() {
            self.tail = None;
        }
        link.next = None;
        link.prev = None;
        link.home = None;
        Some(ix)
    }
}

/// Doubly linked list with O(1) removal from the middle; carries the
/// periodic tasks, which leave in arbitrary order when they terminate.
#[derive(Copy, Clone, Debug)]
pub struct List {
    head: Option<TaskIndex>,
    tail: Option<TaskIndex>,
    home: Container,
}

impl List {
    pub const fn new(home: Container) -> Self {
        Self {
            head: None,
            tail: None,
            home,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<TaskIndex> {
        self.head
    }

    /// The successor of `ix` within this list.
    pub fn next(&self, tasks: &TaskTable, ix: TaskIndex) -> Option<TaskIndex> {
        uassert!(tasks[ix].link().home == Some(self.home));
        tasks[ix].link().next
    }

    /// Inserts at the tail.
    pub fn append(&mut self, tasks: &mut TaskTable, ix: TaskIndex) {
        let tail = self.tail;
        let link = tasks[ix].link_mut();
        uassert!(link.home.is_none());
        link.next = None;
        link.prev = tail;
        link.home = Some(self.home);

        match tail {
            None => {
                self.head = Some(ix);
                self.tail = Some(ix);
            }
            Some(old) => {
                tasks[old].link_mut().next = Some(ix);
                self.tail = Some(ix);
            }
        }
    }

    /// Unlinks `ix` from wherever it sits in the list.
    pub fn remove(&mut self, tasks: &mut TaskTable, ix: TaskIndex) {
        let link = *tasks[ix].link();
        uassert!(link.home == Some(self.home));

        if self.tail == Some(ix) {
            self.tail = link.prev;
        }
        if self.head == Some(ix) {
            self.head = link.next;
        }
        if let Some(prev) = link.prev {
            tasks[prev].link_mut().next = link.next;
        }
        if let Some(next) = link.next {
            tasks[next].link_mut().prev = link.prev;
        }

        let link = tasks[ix].link_mut();
        link.next = None;
        link.prev = None;
        link.home = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Container;

    fn ix(i: usize) -> TaskIndex {
        TaskIndex::new(i)
    }

    #[test]
    fn queue_is_fifo() {
        let mut tasks = TaskTable::new();
        let mut q = Queue::new(Container::RrReady);
        for i in 0..3 {
            q.enqueue(&mut tasks, ix(i));
        }
        assert_eq!(q.dequeue(&mut tasks), Some(ix(0)));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(1)));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(2)));
        assert_eq!(q.dequeue(&mut tasks), None);
    }

    #[test]
    fn push_front_jumps_the_line() {
        let mut tasks = TaskTable::new();
        let mut q = Queue::new(Container::RrReady);
        q.enqueue(&mut tasks, ix(0));
        q.enqueue(&mut tasks, ix(1));
        q.push_front(&mut tasks, ix(2));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(2)));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(0)));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(1)));
    }

    #[test]
    fn push_front_onto_empty_sets_both_ends() {
        let mut tasks = TaskTable::new();
        let mut q = Queue::new(Container::SystemReady);
        q.push_front(&mut tasks, ix(4));
        q.enqueue(&mut tasks, ix(5));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(4)));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(5)));
        assert!(q.is_empty());
    }

    #[test]
    fn list_removes_from_middle() {
        let mut tasks = TaskTable::new();
        let mut l = List::new(Container::PeriodicList);
        for i in 0..3 {
            l.append(&mut tasks, ix(i));
        }
        l.remove(&mut tasks, ix(1));
        assert_eq!(l.head(), Some(ix(0)));
        assert_eq!(l.next(&tasks, ix(0)), Some(ix(2)));
        assert_eq!(l.next(&tasks, ix(2)), None);

        l.remove(&mut tasks, ix(0));
        l.remove(&mut tasks, ix(2));
        assert!(l.is_empty());
    }

    #[test]
    fn removed_task_can_join_another_container() {
        let mut tasks = TaskTable::new();
        let mut l = List::new(Container::PeriodicList);
        let mut q = Queue::new(Container::FreeList);
        l.append(&mut tasks, ix(0));
        l.remove(&mut tasks, ix(0));
        q.enqueue(&mut tasks, ix(0));
        assert_eq!(q.dequeue(&mut tasks), Some(ix(0)));
    }

    #[test]
    #[should_panic]
    fn double_membership_is_caught() {
        let mut tasks = TaskTable::new();
        let mut a = Queue::new(Container::SystemReady);
        let mut b = Queue::new(Container::RrReady);
        a.enqueue(&mut tasks, ix(0));
        b.enqueue(&mut tasks, ix(0));
    }
}
