use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error};

/// A unit of work that runs with exclusive access to the host state.
pub type Job<W> = Box<dyn FnOnce(&mut W) + Send + 'static>;

enum Envelope<W> {
    Run(Job<W>),
    Shutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("host loop is no longer running")]
    Closed,
    #[error("failed to spawn host thread: {0}")]
    Spawn(String),
}

/// Cloneable, thread-safe submission side of the owner's job queue.
pub struct HostHandle<W> {
    tx: Sender<Envelope<W>>,
}

impl<W> Clone for HostHandle<W> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<W> std::fmt::Debug for HostHandle<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle").finish_non_exhaustive()
    }
}

impl<W> HostHandle<W> {
    /// Queue `job` to run on the owner thread. Returns immediately.
    pub fn submit<F>(&self, job: F) -> Result<(), HostError>
    where
        F: FnOnce(&mut W) + Send + 'static,
    {
        self.tx.send(Envelope::Run(Box::new(job))).map_err(|_| HostError::Closed)
    }

    /// Ask the loop to stop once the jobs queued before this call have run.
    pub fn shutdown(&self) -> Result<(), HostError> {
        self.tx.send(Envelope::Shutdown).map_err(|_| HostError::Closed)
    }
}

/// Owner side: holds the state and runs submitted jobs against it.
///
/// Workers never touch the state directly. They submit closures through a
/// [`HostHandle`] and the loop runs them one at a time, in submission order,
/// on whichever thread drives it.
pub struct HostLoop<W> {
    state: W,
    rx: Receiver<Envelope<W>>,
    stopped: bool,
}

/// Create a connected handle/loop pair around `state`.
pub fn channel<W>(state: W) -> (HostHandle<W>, HostLoop<W>) {
    let (tx, rx) = mpsc::channel();
    (HostHandle { tx }, HostLoop { state, rx, stopped: false })
}

/// Run a [`HostLoop`] on a dedicated thread named `host-owner`.
///
/// The join handle yields the state back once the loop stops.
pub fn spawn<W>(state: W) -> Result<(HostHandle<W>, JoinHandle<W>), HostError>
where
    W: Send + 'static,
{
    let (handle, host) = channel(state);
    let join = thread::Builder::new()
        .name("host-owner".into())
        .spawn(move || host.run())
        .map_err(|e| HostError::Spawn(e.to_string()))?;
    Ok((handle, join))
}

impl<W> HostLoop<W> {
    pub fn state(&self) -> &W {
        &self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Run every job queued right now, without blocking. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while !self.stopped {
            match self.rx.try_recv() {
                Ok(Envelope::Run(job)) => {
                    self.execute(job);
                    ran += 1;
                }
                Ok(Envelope::Shutdown) | Err(TryRecvError::Disconnected) => self.stopped = true,
                Err(TryRecvError::Empty) => break,
            }
        }
        ran
    }

    /// Block and run jobs until shutdown is requested or every handle is dropped.
    pub fn run(mut self) -> W {
        debug!("host loop started");
        while !self.stopped {
            match self.rx.recv() {
                Ok(Envelope::Run(job)) => self.execute(job),
                Ok(Envelope::Shutdown) | Err(_) => self.stopped = true,
            }
        }
        debug!("host loop stopped");
        self.state
    }

    fn execute(&mut self, job: Job<W>) {
        let state = &mut self.state;
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(move || job(state))) {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(panic = %msg, "host job panicked; continuing");
        }
    }
}
