//! The startup state machine, run on its own sequence.

use super::{StartupLevel, StartupOutcome, StartupState};
use crate::error::{Result, WardenError};
use crate::sequence::{Sequence, SequenceHandle};
use crossbeam_channel::bounded;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, error, info, warn};

/// Continuation for a startup request. Called exactly once.
pub type StartupCallback = Box<dyn FnOnce(StartupOutcome) + Send>;

/// The work behind each startup phase.
pub trait Bootstrap: Send {
    /// Start `phase`. The phase is over when `completion` is finished, which
    /// may happen inside this call or later from any thread. Dropping the
    /// completion unfinished counts as failure.
    fn begin(&mut self, phase: StartupLevel, completion: PhaseCompletion);
}

/// Reports the end of one startup phase back to the orchestrator.
pub struct PhaseCompletion {
    sequence: SequenceHandle<StartupCore>,
    phase: StartupLevel,
    reported: bool,
}

impl PhaseCompletion {
    pub fn phase(&self) -> StartupLevel {
        self.phase
    }

    pub fn finish(mut self, result: Result<()>) {
        self.reported = true;
        self.report(result.map_err(|e| e.to_string()));
    }

    fn report(&self, result: std::result::Result<(), String>) {
        let phase = self.phase;
        if !self
            .sequence
            .post(move |core| core.on_phase_finished(phase, result))
        {
            debug!(%phase, "Startup sequence gone before phase finished");
        }
    }
}

impl Drop for PhaseCompletion {
    fn drop(&mut self) {
        if !self.reported {
            self.report(Err(format!("{} startup was abandoned", self.phase)));
        }
    }
}

struct StartupCore {
    me: SequenceHandle<StartupCore>,
    bootstrap: Box<dyn Bootstrap>,
    state: StartupState,
    published: Arc<AtomicU8>,
    /// Chain into the full phase once partial completes.
    promote_to_full: bool,
    /// Callbacks with their target level, in arrival order.
    queue: VecDeque<(StartupLevel, StartupCallback)>,
}

impl StartupCore {
    fn set_state(&mut self, state: StartupState) {
        self.state = state;
        self.published.store(state.to_u8(), Ordering::Release);
        debug!(%state, "Startup state changed");
    }

    fn request(&mut self, level: StartupLevel, callback: Option<StartupCallback>) {
        if self.state.has_reached(level) {
            if let Some(callback) = callback {
                // Never call back from inside the request.
                self.me
                    .post(move |_| run_callback(callback, StartupOutcome::Success));
            }
            return;
        }

        if let Some(callback) = callback {
            self.queue.push_back((level, callback));
        }
        if level == StartupLevel::Full {
            self.promote_to_full = true;
        }
        self.kick();
    }

    fn observe(&mut self, callback: StartupCallback) {
        if self.state.has_reached(StartupLevel::Full) {
            self.me
                .post(move |_| run_callback(callback, StartupOutcome::Success));
        } else {
            self.queue.push_back((StartupLevel::Full, callback));
        }
    }

    /// Begin the next phase if one is wanted and none is in flight.
    fn kick(&mut self) {
        match self.state {
            StartupState::NotStarted => self.begin_phase(StartupLevel::Partial),
            StartupState::PartialStarted if self.promote_to_full => {
                self.begin_phase(StartupLevel::Full)
            }
            _ => {}
        }
    }

    fn begin_phase(&mut self, phase: StartupLevel) {
        if phase == StartupLevel::Full {
            self.promote_to_full = false;
        }
        self.set_state(phase.starting());
        info!(%phase, "Starting phase");

        let completion = PhaseCompletion {
            sequence: self.me.clone(),
            phase,
            reported: false,
        };
        let bootstrap = &mut self.bootstrap;
        // A panic drops the completion, which reports the failure.
        if catch_unwind(AssertUnwindSafe(|| bootstrap.begin(phase, completion))).is_err() {
            error!(%phase, "Bootstrap panicked");
        }
    }

    fn on_phase_finished(&mut self, phase: StartupLevel, result: std::result::Result<(), String>) {
        if self.state != phase.starting() {
            warn!(%phase, state = %self.state, "Ignoring stale phase completion");
            return;
        }

        match result {
            Ok(()) => {
                self.set_state(phase.started());
                info!(%phase, "Startup phase complete");
                self.drain(|level| level <= phase, StartupOutcome::Success);
                self.kick();
            }
            Err(message) => {
                error!(%phase, error = %message, "Startup phase failed");
                let fallback = match phase {
                    StartupLevel::Partial => StartupState::NotStarted,
                    StartupLevel::Full => StartupState::PartialStarted,
                };
                self.set_state(fallback);
                self.promote_to_full = false;
                self.drain(|_| true, StartupOutcome::Failure(message));
            }
        }
    }

    /// Run and remove queued callbacks whose level matches, in FIFO order.
    fn drain(&mut self, matches: impl Fn(StartupLevel) -> bool, outcome: StartupOutcome) {
        let queued = std::mem::take(&mut self.queue);
        for (level, callback) in queued {
            if matches(level) {
                run_callback(callback, outcome.clone());
            } else {
                self.queue.push_back((level, callback));
            }
        }
    }
}

fn run_callback(callback: StartupCallback, outcome: StartupOutcome) {
    if catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_err() {
        error!("Startup callback panicked");
    }
}

/// Owner of the startup state machine. One per host.
pub struct StartupOrchestrator {
    sequence: Sequence<StartupCore>,
    published: Arc<AtomicU8>,
}

impl StartupOrchestrator {
    pub fn new(bootstrap: impl Bootstrap + 'static) -> Result<Self> {
        let published = Arc::new(AtomicU8::new(StartupState::NotStarted.to_u8()));
        let shared = Arc::clone(&published);
        let bootstrap: Box<dyn Bootstrap> = Box::new(bootstrap);
        let sequence = Sequence::spawn("startup", move |me| StartupCore {
            me,
            bootstrap,
            state: StartupState::NotStarted,
            published: shared,
            promote_to_full: false,
            queue: VecDeque::new(),
        })?;
        Ok(Self {
            sequence,
            published,
        })
    }

    /// Ask for `level`; `callback` hears how it went.
    pub fn request_start(
        &self,
        level: StartupLevel,
        callback: impl FnOnce(StartupOutcome) + Send + 'static,
    ) {
        let callback: StartupCallback = Box::new(callback);
        if !self
            .sequence
            .post(move |core| core.request(level, Some(callback)))
        {
            warn!(%level, "Startup requested after shutdown");
        }
    }

    /// Block until `level` is reached.
    ///
    /// Must not be called from a thread the bootstrap needs in order to finish,
    /// or from inside a startup callback.
    pub fn request_start_sync(&self, level: StartupLevel) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.request_start(level, move |outcome| {
            let _ = tx.send(outcome);
        });
        match rx.recv() {
            Ok(StartupOutcome::Success) => Ok(()),
            Ok(StartupOutcome::Failure(message)) => {
                debug!(%level, %message, "Synchronous startup failed");
                Err(WardenError::StartupFailed(level))
            }
            Err(_) => Err(WardenError::SequenceStopped("startup")),
        }
    }

    /// Be told when full startup completes, without requesting it.
    pub fn add_completion_observer(&self, callback: impl FnOnce(StartupOutcome) + Send + 'static) {
        let callback: StartupCallback = Box::new(callback);
        self.sequence.post(move |core| core.observe(callback));
    }

    pub fn state(&self) -> StartupState {
        StartupState::from_u8(self.published.load(Ordering::Acquire))
    }

    pub fn is_startup_successfully_completed(&self) -> bool {
        self.state() == StartupState::FullStarted
    }
}
