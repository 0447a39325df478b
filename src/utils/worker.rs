//! Named background threads with explicit join and cancel.
//!
//! Whoever spawns a [`Background`] owns it: there is no process-wide
//! registry, so shutdown means cancelling and joining the handles you hold.

use anyhow::{Result, anyhow};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

/// Cooperative cancellation flag handed to the worker body.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Handle to a running background thread.
#[derive(Debug)]
pub struct Background<T> {
    name: String,
    token: CancelToken,
    handle: JoinHandle<T>,
}

/// Spawn `body` on a named thread.
pub fn spawn<T, F>(name: impl Into<String>, body: F) -> Result<Background<T>>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> T + Send + 'static,
{
    let name = name.into();
    let token = CancelToken::default();
    let worker_token = token.clone();
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || body(worker_token))
        .map_err(|e| anyhow!("Failed to spawn thread `{name}`: {e}"))?;

    Ok(Background { name, token, handle })
}

impl<T> Background<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to stop. The body observes it through its token.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its result; a panic becomes an error.
    pub fn join(self) -> Result<T> {
        let name = self.name;
        self.handle
            .join()
            .map_err(|_| anyhow!("Background thread `{name}` panicked"))
    }
}

/// Join every finished handle in `handles`, keeping the running ones.
pub fn reap<T>(handles: &mut Vec<Background<T>>) -> Vec<Result<T>> {
    let (done, running): (Vec<_>, Vec<_>) = handles.drain(..).partition(Background::is_finished);
    *handles = running;
    done.into_iter().map(Background::join).collect()
}
