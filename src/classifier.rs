//! # Classifier Module
//!
//! Drives one train/test lifecycle over a trace. Training folds qualifying epochs into the
//! normal profile; testing compares every remaining epoch against the frozen profile and flags
//! the ones that drift below the test threshold.
//!
//! ```text
//! Uninitialized -> Training -> Trained -> Testing -> Done
//!                          \-> TrainingFailed
//! ```
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::database::FrequencyDatabase;
use crate::error::{Error, Result};
use crate::pattern::Encoding;
use crate::stats::{EpochRecord, Statistics};
use crate::syscall::SyscallIndex;
use crate::trace::{Epoch, Epochs, Trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Training,
    Trained,
    TrainingFailed,
    Testing,
    Done,
}

/// Cooperative cancellation flag, checked at every epoch boundary.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        StopSignal::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning of a single classifier run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierParams {
    pub epoch_size: usize,
    pub pattern_width: usize,
    pub encoding: Encoding,
    pub train_threshold: f64,
    pub test_threshold: f64,
    /// Upper bound on the number of epochs consumed by training.
    pub train_epochs: usize,
}

pub struct EpochClassifier<'a, R> {
    epochs: Epochs<'a, R>,
    params: ClassifierParams,
    alphabet: usize,
    profile: FrequencyDatabase,
    phase: Phase,
    stop: StopSignal,
}

impl<'a, R: BufRead> EpochClassifier<'a, R> {
    /// `seed` is a previously dumped profile that training extends instead of starting empty.
    pub fn new(
        trace: Trace<R>,
        index: &'a SyscallIndex,
        params: ClassifierParams,
        seed: Option<FrequencyDatabase>,
        stop: StopSignal,
    ) -> Self {
        EpochClassifier {
            epochs: trace.epochs(index, params.epoch_size),
            params,
            alphabet: index.len(),
            profile: seed.unwrap_or_default(),
            phase: Phase::Uninitialized,
            stop,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn profile(&self) -> &FrequencyDatabase {
        &self.profile
    }

    fn epoch_database(&self, epoch: &Epoch) -> FrequencyDatabase {
        let encoding = self.params.encoding;
        let mut database = FrequencyDatabase::new();
        for pattern in encoding.windows(&epoch.ids, self.params.pattern_width, self.alphabet) {
            database.add(pattern);
        }
        database
    }

    /// Builds the normal profile from the head of the trace.
    ///
    /// An epoch is committed when its similarity to the profile reaches the train threshold, or
    /// unconditionally while the profile is still empty. Training stops after
    /// `train_epochs` epochs, at the end of the trace, or on a stop request.
    ///
    /// Returns `Ok(false)` when no usable profile came out of it; that is a property of this
    /// parameter combination, not an error.
    pub fn train_unconditionally(&mut self, stats: &mut Statistics) -> Result<bool> {
        self.phase = Phase::Training;

        let mut consumed = 0;
        let mut committed = 0;
        while consumed < self.params.train_epochs && !self.stop.is_requested() {
            let epoch = match self.epochs.next() {
                Some(epoch) => epoch?,
                None => break,
            };
            consumed += 1;
            stats.unknown_syscalls += epoch.unknown();

            let local = self.epoch_database(&epoch);
            let similarity = if self.profile.is_empty() {
                0.0
            } else {
                local.similarity_to(&self.profile)
            };
            let commit = !local.is_empty()
                && (self.profile.is_empty() || similarity >= self.params.train_threshold);
            if commit {
                self.profile.commit(&local);
                committed += 1;
            }
            trace!(
                epoch = epoch.number,
                similarity,
                commit,
                "training epoch"
            );
            stats.record_training(commit);
        }
        stats.training.profile_size = self.profile.len();

        let trained = !self.profile.is_empty() && (consumed == 0 || committed > 0);
        self.phase = if trained {
            Phase::Trained
        } else {
            Phase::TrainingFailed
        };
        debug!(
            consumed,
            committed,
            profile = self.profile.len(),
            "training finished: {:?}",
            self.phase
        );
        Ok(trained)
    }

    /// Classifies every remaining epoch against the frozen profile.
    pub fn test(&mut self, stats: &mut Statistics) -> Result<()> {
        if self.phase != Phase::Trained {
            return Err(Error::NotTrained);
        }
        self.phase = Phase::Testing;

        while !self.stop.is_requested() {
            let epoch = match self.epochs.next() {
                Some(epoch) => epoch?,
                None => break,
            };
            stats.unknown_syscalls += epoch.unknown();

            let similarity = self.epoch_database(&epoch).similarity_to(&self.profile);
            let anomalous = similarity < self.params.test_threshold;
            trace!(
                epoch = epoch.number,
                similarity,
                anomalous,
                "testing epoch"
            );
            stats.record_test(EpochRecord {
                number: epoch.number,
                similarity,
                anomalous,
                under_attack: epoch.under_attack,
            });
        }

        self.phase = Phase::Done;
        Ok(())
    }
}
