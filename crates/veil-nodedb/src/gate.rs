//! Serialized access to state owned by a single thread
//!
//! A [`Gate`] spawns an owner thread that holds some state exclusively and
//! runs submitted tasks against it one at a time, in arrival order. Any
//! thread can submit work, either fire-and-forget ([`Gate::call`]) or
//! blocking until the owner has produced a result ([`Gate::call_get`]).
//!
//! Code already running on the owner thread executes submissions inline
//! instead of queueing them, so a task can call back into the gate without
//! waiting on itself. The state borrow handed out by [`Owned::with`] must
//! not be held across such a call.
//!
//! A task or tick that panics is logged and dropped; the owner thread keeps
//! serving.

use flume::{Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// The gate was shut down; nothing submitted will run
    #[error("gate owner thread has shut down")]
    Closed,

    /// The task panicked. The owner thread logged it and keeps serving.
    #[error("task panicked on the gate owner thread")]
    TaskPanicked,
}

/// State as seen from the owner thread
pub struct Owned<S> {
    state: RefCell<S>,
}

impl<S> Owned<S> {
    /// Borrow the state for the duration of `f`
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }
}

type Task<S> = Box<dyn FnOnce(&Owned<S>) + Send>;

enum Message<S> {
    Run(Task<S>),
    Shutdown,
}

thread_local! {
    // Set only on owner threads, each of which serves exactly one gate
    static OWNED: RefCell<Option<Rc<dyn Any>>> = RefCell::new(None);
}

/// Run `f`, turning a panic into `None` after logging it
fn guarded<R>(f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => Some(r),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Gate task panicked: {}", message);
            None
        }
    }
}

pub struct Gate<S> {
    /// `None` once the gate is shut down. Sends happen under the read
    /// lock, so nothing can be accepted after the shutdown message.
    sender: Arc<RwLock<Option<Sender<Message<S>>>>>,
    owner: ThreadId,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<S> Clone for Gate<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            owner: self.owner,
            thread: self.thread.clone(),
        }
    }
}

impl<S> fmt::Debug for Gate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queued = match self.sender.read() {
            Ok(guard) => guard.as_ref().map(|s| s.len()),
            Err(_) => None,
        };
        f.debug_struct("Gate")
            .field("owner", &self.owner)
            .field("queued", &queued)
            .finish()
    }
}

impl<S: Send + 'static> Gate<S> {
    /// Spawn the owner thread.
    ///
    /// `on_tick` runs on the owner roughly every `tick_every`, between tasks.
    /// The thread exits on [`Gate::shutdown`] or once every handle is dropped.
    pub fn spawn<F>(name: &str, state: S, tick_every: Duration, on_tick: F) -> std::io::Result<Self>
    where
        F: FnMut(&Owned<S>) + Send + 'static,
    {
        let (sender, receiver) = flume::unbounded();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(state, receiver, tick_every, on_tick))?;

        Ok(Self {
            sender: Arc::new(RwLock::new(Some(sender))),
            owner: handle.thread().id(),
            thread: Arc::new(Mutex::new(Some(handle))),
        })
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Submit `task` and return without waiting for it.
    ///
    /// `Ok` means the task will run. A panic inside it is logged.
    pub fn call<F>(&self, task: F) -> Result<(), GateError>
    where
        F: FnOnce(&Owned<S>) + Send + 'static,
    {
        if let Some(owned) = self.inline() {
            guarded(|| task(&*owned));
            return Ok(());
        }

        self.send(Message::Run(Box::new(task)))
    }

    /// Submit `task` and block until the owner has run it
    pub fn call_get<R, F>(&self, task: F) -> Result<R, GateError>
    where
        F: FnOnce(&Owned<S>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if let Some(owned) = self.inline() {
            return guarded(|| task(&*owned)).ok_or(GateError::TaskPanicked);
        }

        let (tx, rx) = flume::bounded(1);
        self.send(Message::Run(Box::new(move |owned| {
            let _ = tx.send(guarded(|| task(owned)));
        })))?;

        match rx.recv() {
            Ok(Some(r)) => Ok(r),
            Ok(None) => Err(GateError::TaskPanicked),
            Err(_) => Err(GateError::Closed),
        }
    }

    /// Stop the owner thread once the tasks accepted so far have run.
    ///
    /// Every later submission fails with [`GateError::Closed`]. Blocks until
    /// the thread has exited, unless called from it.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.write() {
            if let Some(sender) = guard.take() {
                let _ = sender.send(Message::Shutdown);
            }
        }

        if self.is_owner_thread() {
            return;
        }
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn send(&self, message: Message<S>) -> Result<(), GateError> {
        let guard = self.sender.read().map_err(|_| GateError::Closed)?;
        match guard.as_ref() {
            Some(sender) => sender.send(message).map_err(|_| GateError::Closed),
            None => Err(GateError::Closed),
        }
    }

    fn inline(&self) -> Option<Rc<Owned<S>>> {
        if !self.is_owner_thread() {
            return None;
        }
        OWNED
            .with(|slot| slot.borrow().clone())
            .and_then(|owned| owned.downcast::<Owned<S>>().ok())
    }
}

fn run<S: 'static, F>(state: S, receiver: Receiver<Message<S>>, tick_every: Duration, mut on_tick: F)
where
    F: FnMut(&Owned<S>),
{
    let owned = Rc::new(Owned {
        state: RefCell::new(state),
    });
    OWNED.with(|slot| *slot.borrow_mut() = Some(owned.clone() as Rc<dyn Any>));

    let mut next_tick = Instant::now() + tick_every;
    loop {
        match receiver.recv_deadline(next_tick) {
            Ok(Message::Run(task)) => {
                guarded(|| task(&*owned));
            }
            Ok(Message::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("All gate handles dropped, stopping owner thread");
                break;
            }
        }

        if Instant::now() >= next_tick {
            guarded(|| on_tick(&*owned));
            next_tick = Instant::now() + tick_every;
        }
    }

    OWNED.with(|slot| slot.borrow_mut().take());
}
