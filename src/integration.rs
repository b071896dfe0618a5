use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::bytecode::format::{Opcode, ScriptPtr, SegmentedAddress};
use crate::overrides::OwnerId;

/// Observable events for commands that fail without faulting, plus override activity.
///
/// Content relies on these paths being non-fatal, so they are reported here instead of
/// aborting the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    AreaBeginFailed { index: u8, reason: String },
    InvalidAreaIndex { opcode: Opcode, index: u8 },
    MissingCamera { index: u8 },
    NoActiveArea { opcode: Opcode },
    SlotOutOfRange { opcode: Opcode, index: u8 },
    UnknownVariable { mode: u8, var: u8 },
    OverrideResolved {
        original: ScriptPtr,
        replacement: ScriptPtr,
        owner: OwnerId,
    },
    OverrideConflict {
        original: ScriptPtr,
        owner: OwnerId,
        shadowed_by: OwnerId,
    },
    TokenUnresolved {
        opcode: Opcode,
        token: u32,
        owner: Option<OwnerId>,
    },
    UnresolvedAddress { opcode: Opcode, address: SegmentedAddress },
    ContentLoadFailed { opcode: Opcode, reason: String },
    PoolExhausted {
        opcode: Opcode,
        requested: usize,
        available: usize,
    },
    PoolUnderflow { opcode: Opcode },
    UnknownHostFunction { id: u32 },
    DispatchTableRestored { patched: Vec<Opcode> },
    /// Summary of the diagnostics dropped once a run exhausted its budget.
    Suppressed { dropped: usize },
}

impl Diagnostic {
    fn is_routine(&self) -> bool {
        matches!(self, Diagnostic::OverrideResolved { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Diagnostic::*;
        match self {
            AreaBeginFailed { index, reason } => {
                write!(f, "area {index} failed to build: {reason}")
            }
            InvalidAreaIndex { opcode, index } => {
                write!(f, "{opcode}: area index {index} is invalid")
            }
            MissingCamera { index } => write!(f, "area {index} has no camera"),
            NoActiveArea { opcode } => write!(f, "{opcode}: no active area"),
            SlotOutOfRange { opcode, index } => write!(f, "{opcode}: slot {index} is out of range"),
            UnknownVariable { mode, var } => {
                write!(f, "GET_OR_SET: unknown mode {mode} or variable {var}")
            }
            OverrideResolved {
                original,
                replacement,
                owner,
            } => write!(f, "{original} overridden by {replacement} ({owner})"),
            OverrideConflict {
                original,
                owner,
                shadowed_by,
            } => write!(f, "override of {original} by {owner} is shadowed by {shadowed_by}"),
            TokenUnresolved { opcode, token, owner } => match owner {
                Some(owner) => write!(f, "{opcode}: token {token} unresolved for {owner}"),
                None => write!(f, "{opcode}: token {token} unresolved"),
            },
            UnresolvedAddress { opcode, address } => {
                write!(f, "{opcode}: address {address} is not mapped")
            }
            ContentLoadFailed { opcode, reason } => write!(f, "{opcode}: load failed: {reason}"),
            PoolExhausted {
                opcode,
                requested,
                available,
            } => write!(
                f,
                "{opcode}: level pool exhausted ({requested} requested, {available} available)"
            ),
            PoolUnderflow { opcode } => write!(f, "{opcode}: no memory checkpoint to pop"),
            UnknownHostFunction { id } => write!(f, "host function 0x{id:08X} is not registered"),
            DispatchTableRestored { patched } => {
                write!(f, "dispatch table restored, patched canaries: {patched:?}")
            }
            Suppressed { dropped } => write!(f, "{dropped} further diagnostics suppressed"),
        }
    }
}

type DiagnosticCallback = Arc<dyn Fn(&Diagnostic) + Send + Sync + 'static>;

#[derive(Debug, Default)]
struct RunBudget {
    limit: usize,
    emitted: usize,
    dropped: usize,
}

/// Diagnostics sink shared between the interpreter and its host.
///
/// Each `execute` call gets a fresh budget; diagnostics past the budget are counted and
/// reported as a single [`Diagnostic::Suppressed`] when the run ends. The sink can be
/// registered or cleared at any time through a shared reference.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<RwLock<Option<DiagnosticCallback>>>,
    budget: Arc<Mutex<RunBudget>>,
}

impl Diagnostics {
    pub fn new(limit: usize) -> Self {
        Self {
            sink: Arc::new(RwLock::new(None)),
            budget: Arc::new(Mutex::new(RunBudget {
                limit,
                ..RunBudget::default()
            })),
        }
    }

    /// Registers the host callback.
    pub fn set_sink<F>(&self, hook: F)
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        *self.sink.write() = Some(Arc::new(hook));
    }

    pub fn clear_sink(&self) {
        *self.sink.write() = None;
    }

    pub fn set_limit(&self, limit: usize) {
        self.budget.lock().limit = limit;
    }

    pub(crate) fn begin_run(&self) {
        let mut budget = self.budget.lock();
        budget.emitted = 0;
        budget.dropped = 0;
    }

    pub(crate) fn finish_run(&self) {
        let dropped = std::mem::take(&mut self.budget.lock().dropped);
        if dropped > 0 {
            self.deliver(Diagnostic::Suppressed { dropped });
        }
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        {
            let mut budget = self.budget.lock();
            if budget.emitted >= budget.limit {
                budget.dropped += 1;
                return;
            }
            budget.emitted += 1;
        }
        self.deliver(diagnostic);
    }

    fn deliver(&self, diagnostic: Diagnostic) {
        if diagnostic.is_routine() {
            debug!(target: "levelscript::diagnostics", "{diagnostic}");
        } else {
            warn!(target: "levelscript::diagnostics", "{diagnostic}");
        }
        // The guard must be released before the host runs: a sink may replace itself.
        let callback = self.sink.read().clone();
        if let Some(callback) = callback {
            callback(&diagnostic);
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(limit: usize) -> (Diagnostics, Arc<Mutex<Vec<Diagnostic>>>) {
        let diagnostics = Diagnostics::new(limit);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        diagnostics.set_sink(move |diagnostic| sink.lock().push(diagnostic.clone()));
        (diagnostics, seen)
    }

    #[test]
    fn rate_limits_per_run_and_summarises() {
        let (diagnostics, seen) = recording(2);
        diagnostics.begin_run();
        for id in 0..5 {
            diagnostics.emit(Diagnostic::UnknownHostFunction { id });
        }
        diagnostics.finish_run();
        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], Diagnostic::Suppressed { dropped: 3 });
    }

    #[test]
    fn new_run_restores_budget() {
        let (diagnostics, seen) = recording(1);
        diagnostics.begin_run();
        diagnostics.emit(Diagnostic::MissingCamera { index: 0 });
        diagnostics.finish_run();
        diagnostics.begin_run();
        diagnostics.emit(Diagnostic::MissingCamera { index: 1 });
        diagnostics.finish_run();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn cleared_sink_receives_nothing() {
        let (diagnostics, seen) = recording(4);
        diagnostics.clear_sink();
        diagnostics.emit(Diagnostic::NoActiveArea { opcode: Opcode::EndArea });
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn sink_can_clear_itself_while_handling_a_diagnostic() {
        let diagnostics = Diagnostics::new(4);
        let handle = diagnostics.clone();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        diagnostics.set_sink(move |_| {
            *counter.lock() += 1;
            handle.clear_sink();
        });

        let (done, finished) = std::sync::mpsc::channel();
        let worker = diagnostics.clone();
        std::thread::spawn(move || {
            worker.emit(Diagnostic::MissingCamera { index: 0 });
            worker.emit(Diagnostic::MissingCamera { index: 1 });
            let _ = done.send(());
        });
        finished
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("emit returned");
        assert_eq!(*calls.lock(), 1);
    }
}
