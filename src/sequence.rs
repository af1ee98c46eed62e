//! Serialized task sequences.
//!
//! A sequence is a dedicated thread that owns one piece of state and runs boxed
//! tasks against it one at a time, in submission order. Launcher and startup
//! state are only ever touched from inside their sequence, which is what lets
//! them go without locks.
//!
//! ```text
//!   caller thread ──post(task)──┐
//!   helper thread ──post(task)──┼──► channel ──► sequence thread ──► task(&mut S)
//!   caller thread ──call(task)──┘                      │
//!        ▲                                             │
//!        └──────────────── reply channel ◄─────────────┘
//! ```

use crate::error::{Result, WardenError};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

/// A unit of work run against the sequence's state.
type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Run(Task<S>),
    Shutdown,
}

/// Cloneable handle for submitting tasks to a sequence.
///
/// The state owned by a sequence usually keeps a handle to its own sequence so
/// that it can post follow-up work (deferred callbacks, results from helper
/// threads) without re-entering itself.
pub struct SequenceHandle<S> {
    tx: Sender<Message<S>>,
    name: &'static str,
    thread_id: Arc<OnceLock<ThreadId>>,
}

impl<S> Clone for SequenceHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
            thread_id: Arc::clone(&self.thread_id),
        }
    }
}

impl<S: 'static> SequenceHandle<S> {
    /// Queue a task. Returns `false` if the sequence has shut down.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx.send(Message::Run(Box::new(task))).is_ok()
    }

    /// Run a task on the sequence and block until it returns.
    ///
    /// Must not be called from the sequence's own thread: the task would queue
    /// behind the caller and never run.
    pub fn call<F, R>(&self, task: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        debug_assert!(
            !self.runs_on_current_thread(),
            "blocking call into the {} sequence from its own thread",
            self.name
        );
        let (reply_tx, reply_rx) = bounded(1);
        let posted = self.post(move |state| {
            let _ = reply_tx.send(task(state));
        });
        if !posted {
            return Err(WardenError::SequenceStopped(self.name));
        }
        reply_rx
            .recv()
            .map_err(|_| WardenError::SequenceStopped(self.name))
    }

    /// Whether the calling thread is this sequence's thread.
    pub fn runs_on_current_thread(&self) -> bool {
        self.thread_id.get() == Some(&thread::current().id())
    }

    /// Name used for the thread and in errors.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Owner of a sequence thread. Dropping it stops the thread after the task in
/// progress; queued tasks are discarded.
pub struct Sequence<S> {
    handle: SequenceHandle<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: 'static> Sequence<S> {
    /// Start a sequence thread. `init` runs on the new thread and builds the
    /// state, receiving a handle to the sequence it will live in.
    pub fn spawn<F>(name: &'static str, init: F) -> Result<Self>
    where
        F: FnOnce(SequenceHandle<S>) -> S + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let handle = SequenceHandle {
            tx,
            name,
            thread_id: Arc::new(OnceLock::new()),
        };
        let inner = handle.clone();

        let thread = thread::Builder::new()
            .name(format!("warden-{}", name))
            .spawn(move || {
                let _ = inner.thread_id.set(thread::current().id());
                let mut state = init(inner);
                run_tasks(&mut state, rx, name);
            })?;

        tracing::debug!(sequence = name, "Sequence started");

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Get a handle for posting tasks.
    pub fn handle(&self) -> SequenceHandle<S> {
        self.handle.clone()
    }

    /// See [`SequenceHandle::post`].
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.handle.post(task)
    }

    /// See [`SequenceHandle::call`].
    pub fn call<F, R>(&self, task: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.call(task)
    }

    /// Stop the sequence thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        let _ = self.handle.tx.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            // Joining ourselves would never return.
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::warn!(sequence = self.handle.name, "Sequence thread panicked");
            }
        }
    }
}

impl<S> Drop for Sequence<S> {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Message::Shutdown);
        if let Some(thread) = self.thread.take()
            && thread.thread().id() != thread::current().id()
        {
            let _ = thread.join();
        }
    }
}

fn run_tasks<S>(state: &mut S, rx: Receiver<Message<S>>, name: &'static str) {
    for message in rx {
        match message {
            Message::Run(task) => {
                // A panicking task must not take the whole sequence down with it.
                if catch_unwind(AssertUnwindSafe(|| task(state))).is_err() {
                    tracing::error!(sequence = name, "Task panicked; continuing");
                }
            }
            Message::Shutdown => break,
        }
    }
    tracing::debug!(sequence = name, "Sequence stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tasks_run_in_submission_order() {
        let seq = Sequence::spawn("test-order", |_| Vec::<u32>::new()).unwrap();
        for i in 0..100 {
            seq.post(move |v: &mut Vec<u32>| v.push(i));
        }
        let seen = seq.call(|v| v.clone()).unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_state_can_post_to_itself() {
        struct Counter {
            me: SequenceHandle<Counter>,
            hits: u32,
        }
        let seq = Sequence::spawn("test-self", |me| Counter { me, hits: 0 }).unwrap();
        seq.post(|c: &mut Counter| {
            c.hits += 1;
            c.me.post(|c| c.hits += 10);
        });
        // The follow-up was queued before this call, so it has run by now.
        assert_eq!(seq.call(|c| c.hits).unwrap(), 11);
    }

    #[test]
    fn test_runs_on_current_thread() {
        let seq = Sequence::spawn("test-thread", |me: SequenceHandle<()>| {
            assert!(me.runs_on_current_thread());
        })
        .unwrap();
        assert!(!seq.handle().runs_on_current_thread());
        let handle = seq.handle();
        assert!(seq.call(move |_| handle.runs_on_current_thread()).unwrap());
    }

    #[test]
    fn test_panicking_task_does_not_stop_sequence() {
        let seq = Sequence::spawn("test-panic", |_| 0u32).unwrap();
        seq.post(|_| panic!("boom"));
        seq.post(|n| *n += 1);
        assert_eq!(seq.call(|n| *n).unwrap(), 1);
    }

    #[test]
    fn test_call_after_shutdown_fails() {
        let mut seq = Sequence::spawn("test-shutdown", |_| ()).unwrap();
        let handle = seq.handle();
        seq.shutdown();
        std::thread::sleep(Duration::from_millis(10));
        assert!(!handle.post(|_| {}));
        assert!(matches!(
            handle.call(|_| ()),
            Err(WardenError::SequenceStopped("test-shutdown"))
        ));
    }
}
