//! Run Directory (spec §4.6/§9, C9): the only process-wide mutable state in
//! the core. A single mutex guards a map from `run_id` to that run's cancel
//! sender; `stop(run_id)` (spec §4.6) is implemented entirely in terms of
//! `signal_cancel`.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;

#[derive(Default)]
pub struct RunDirectory {
    runs: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl RunDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: impl Into<String>, cancel_tx: watch::Sender<bool>) {
        self.runs
            .lock()
            .expect("run directory lock poisoned")
            .insert(run_id.into(), cancel_tx);
    }

    pub fn deregister(&self, run_id: &str) {
        self.runs.lock().expect("run directory lock poisoned").remove(run_id);
    }

    pub fn lookup(&self, run_id: &str) -> bool {
        self.runs.lock().expect("run directory lock poisoned").contains_key(run_id)
    }

    /// Sets the run's cancel signal. Returns `true` iff the run was found
    /// and still active (spec §4.6 `stop` return value). Never blocks on the
    /// run's completion.
    pub fn signal_cancel(&self, run_id: &str) -> bool {
        match self.runs.lock().expect("run directory lock poisoned").get(run_id) {
            Some(tx) => {
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_cancel_returns_false_for_unknown_run() {
        let dir = RunDirectory::new();
        assert!(!dir.signal_cancel("missing"));
    }

    #[test]
    fn signal_cancel_sets_the_registered_receiver() {
        let dir = RunDirectory::new();
        let (tx, rx) = watch::channel(false);
        dir.register("r1", tx);
        assert!(dir.signal_cancel("r1"));
        assert!(*rx.borrow());
    }

    #[test]
    fn deregister_removes_the_run_from_lookup() {
        let dir = RunDirectory::new();
        let (tx, _rx) = watch::channel(false);
        dir.register("r1", tx);
        assert!(dir.lookup("r1"));
        dir.deregister("r1");
        assert!(!dir.lookup("r1"));
    }
}
