//! Thread management and CPU affinity
//!
//! Consumers usually get a dedicated thread each. [`ThreadBuilder`] names
//! the thread and optionally pins it to a core; [`ManagedThread`] joins it
//! on drop so a consumer thread never outlives its owner silently.

use core_affinity::CoreId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

static THREAD_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Builder for consumer threads
#[derive(Debug, Clone, Default)]
pub struct ThreadBuilder {
    name: Option<String>,
    affinity: Option<CoreId>,
}

impl ThreadBuilder {
    /// Create a builder with a generated name and no affinity
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the thread to a CPU core
    ///
    /// A core that does not exist on this machine is reported when the
    /// thread starts and the thread runs unpinned.
    pub fn pin_at_core(mut self, core_id: usize) -> Self {
        self.affinity = Some(CoreId { id: core_id });
        self
    }

    /// Set the thread name
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Spawn `f` on a new thread with the configured settings
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be created
    pub fn spawn<F>(self, f: F) -> std::io::Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_name = self.name.unwrap_or_else(|| {
            let id = THREAD_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
            format!("batch-consumer-{id}")
        });
        let affinity = self.affinity;

        let name_in_thread = thread_name.clone();
        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                set_affinity_if_defined(affinity, &name_in_thread);
                f();
            })?;

        debug!(thread = %thread_name, "thread spawned");
        Ok(ManagedThread {
            join_handle: Some(join_handle),
            thread_name,
        })
    }
}

/// A spawned thread that is joined when dropped
#[derive(Debug)]
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    thread_name: String,
}

impl ManagedThread {
    /// The name the thread was spawned with
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Wait for the thread to finish
    ///
    /// # Errors
    /// Returns the panic payload if the thread panicked
    pub fn join(mut self) -> thread::Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    /// Whether the thread is still executing its closure
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!(thread = %self.thread_name, "thread panicked");
            }
        }
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    let Some(core_id) = affinity else {
        return;
    };
    let available = get_available_cores();
    if !available.contains(&core_id.id) {
        warn!(
            thread = thread_name,
            core = core_id.id,
            ?available,
            "core not available, thread runs unpinned"
        );
        return;
    }
    if core_affinity::set_for_current(core_id) {
        debug!(thread = thread_name, core = core_id.id, "thread pinned");
    } else {
        warn!(
            thread = thread_name,
            core = core_id.id,
            "could not pin thread"
        );
    }
}

/// CPU core ids available on this machine
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
