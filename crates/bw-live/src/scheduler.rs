//! Cooperative scheduler
//!
//! Single-threaded stand-in for UI timers and the display frame loop.
//! Time is virtual: nothing runs until the host calls [`Scheduler::advance`],
//! which fires every due task in time order and moves the clock forward.
//!
//! Callbacks receive the scheduler, so they can arm or cancel tasks while
//! running. An interval may cancel itself from inside its own callback.

use std::fmt;

/// Handle to a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

type OnceCallback = Box<dyn FnOnce(&mut Scheduler)>;
type RepeatCallback = Box<dyn FnMut(&mut Scheduler)>;

enum Callback {
    Once(OnceCallback),
    Repeat { period: u64, callback: RepeatCallback },
}

struct Task {
    id: TaskId,
    due: u64,
    seq: u64,
    callback: Callback,
}

pub struct Scheduler {
    now: u64,
    frame_interval: u64,
    next_id: u64,
    next_seq: u64,
    tasks: Vec<Task>,
    /// Interval currently inside its callback
    running: Option<TaskId>,
    running_cancelled: bool,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("frame_interval", &self.frame_interval)
            .field("pending", &self.tasks.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Scheduler {
    /// Frame callbacks fire on multiples of `frame_interval_ms`
    pub fn new(frame_interval_ms: u64) -> Self {
        Self {
            now: 0,
            frame_interval: frame_interval_ms.max(1),
            next_id: 1,
            next_seq: 0,
            tasks: Vec::new(),
            running: None,
            running_cancelled: false,
        }
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn frame_interval(&self) -> u64 {
        self.frame_interval
    }

    /// Number of armed tasks
    pub fn pending(&self) -> usize {
        self.tasks.len() + usize::from(self.running.is_some() && !self.running_cancelled)
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        (self.running == Some(id) && !self.running_cancelled)
            || self.tasks.iter().any(|t| t.id == id)
    }

    fn push(&mut self, due: u64, callback: Callback) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.push_with_id(id, due, callback);
        id
    }

    fn push_with_id(&mut self, id: TaskId, due: u64, callback: Callback) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(Task {
            id,
            due,
            seq,
            callback,
        });
    }

    /// Run `callback` once, `delay_ms` from now
    pub fn set_timeout(
        &mut self,
        delay_ms: u64,
        callback: impl FnOnce(&mut Scheduler) + 'static,
    ) -> TaskId {
        self.push(self.now + delay_ms, Callback::Once(Box::new(callback)))
    }

    /// Run `callback` every `period_ms`, first after `first_delay_ms`
    pub fn set_interval(
        &mut self,
        first_delay_ms: u64,
        period_ms: u64,
        callback: impl FnMut(&mut Scheduler) + 'static,
    ) -> TaskId {
        self.push(
            self.now + first_delay_ms,
            Callback::Repeat {
                period: period_ms.max(1),
                callback: Box::new(callback),
            },
        )
    }

    /// Run `callback` once at the next frame boundary
    pub fn request_frame(&mut self, callback: impl FnOnce(&mut Scheduler) + 'static) -> TaskId {
        let due = (self.now / self.frame_interval + 1) * self.frame_interval;
        self.push(due, Callback::Once(Box::new(callback)))
    }

    /// Disarm a task. Returns `false` if it already ran, was already
    /// cancelled, or never existed.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if self.running == Some(id) {
            if self.running_cancelled {
                return false;
            }
            self.running_cancelled = true;
            return true;
        }
        match self.tasks.iter().position(|t| t.id == id) {
            Some(index) => {
                self.tasks.swap_remove(index);
                true
            }
            None => false,
        }
    }

    fn next_due(&self, until: u64) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= until)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)
    }

    /// Move the clock forward by `dt_ms`, firing due tasks in order.
    /// Returns the number of callbacks run.
    pub fn advance(&mut self, dt_ms: u64) -> usize {
        let target = self.now + dt_ms;
        let mut ran = 0;

        while let Some(index) = self.next_due(target) {
            let task = self.tasks.swap_remove(index);
            self.now = self.now.max(task.due);
            ran += 1;

            match task.callback {
                Callback::Once(callback) => callback(self),
                Callback::Repeat {
                    period,
                    mut callback,
                } => {
                    self.running = Some(task.id);
                    self.running_cancelled = false;
                    callback(self);
                    let cancelled = self.running_cancelled;
                    self.running = None;
                    self.running_cancelled = false;
                    if !cancelled {
                        self.push_with_id(
                            task.id,
                            task.due + period,
                            Callback::Repeat { period, callback },
                        );
                    }
                }
            }
        }

        self.now = target;
        ran
    }
}
