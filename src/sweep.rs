//! # Sweep Module
//!
//! Evaluates every combination of epoch size, train threshold and test threshold. The grid is
//! walked in a fixed nested order (epoch size outermost, test threshold innermost) and each
//! point runs a fresh classifier over the trace from its first line.
//!
//! Points can be spread over several worker threads. Each worker owns the profile and
//! statistics of the point it evaluates; results come back over a channel to the one thread
//! that owns the summary and the report sink.
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{ClassifierParams, EpochClassifier, StopSignal};
use crate::database::FrequencyDatabase;
use crate::error::{Error, Result};
use crate::pattern::Encoding;
use crate::report::ResultSink;
use crate::stats::{Statistics, Summary};
use crate::syscall::SyscallIndex;
use crate::trace::Trace;

/// Upper bound on the number of values one range may expand to.
pub const MAX_RANGE_VALUES: usize = 10_000;

/// Thresholds are rounded to this resolution; smaller steps are rejected.
pub const THRESHOLD_RESOLUTION: f64 = 1e-9;

fn too_many<T: fmt::Display>(range: &Range<T>) -> Error {
    Error::InvalidRange(format!(
        "{}: expands to more than {} values",
        range, MAX_RANGE_VALUES
    ))
}

/// Inclusive `min..=max` range walked with a positive `step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
    pub step: T,
}

impl<T: Copy> Range<T> {
    pub fn single(value: T, step: T) -> Self {
        Range {
            min: value,
            max: value,
            step,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.min, self.max, self.step)
    }
}

/// Parses `min:max:step`, `min:max` (with `default_step`) or a single value.
pub fn parse_range<T>(text: &str, default_step: T) -> Result<Range<T>>
where
    T: FromStr + Copy,
    T::Err: fmt::Display,
{
    let field = |s: &str| {
        s.trim()
            .parse::<T>()
            .map_err(|e| Error::InvalidRange(format!("{:?}: {}", text, e)))
    };
    let parts: Vec<&str> = text.split(':').collect();
    match parts.as_slice() {
        &[value] => Ok(Range::single(field(value)?, default_step)),
        &[min, max] => Ok(Range {
            min: field(min)?,
            max: field(max)?,
            step: default_step,
        }),
        &[min, max, step] => Ok(Range {
            min: field(min)?,
            max: field(max)?,
            step: field(step)?,
        }),
        _ => Err(Error::InvalidRange(format!(
            "{:?}: expected min:max:step",
            text
        ))),
    }
}

impl Range<usize> {
    pub fn values(&self) -> Result<Vec<usize>> {
        if self.step == 0 || self.min == 0 || self.min > self.max {
            return Err(Error::InvalidRange(format!(
                "{}: need 0 < min <= max and step > 0",
                self
            )));
        }
        let count = ((self.max - self.min) / self.step).checked_add(1);
        match count {
            Some(n) if n <= MAX_RANGE_VALUES => {
                Ok((self.min..=self.max).step_by(self.step).collect())
            }
            _ => Err(too_many(self)),
        }
    }
}

impl Range<f64> {
    /// Values are computed as `min + i * step` so that rounding does not accumulate.
    pub fn values(&self) -> Result<Vec<f64>> {
        let finite = self.min.is_finite() && self.max.is_finite() && self.step.is_finite();
        if !finite || self.step < THRESHOLD_RESOLUTION || self.min > self.max {
            return Err(Error::InvalidRange(format!(
                "{}: need min <= max and step >= {}",
                self, THRESHOLD_RESOLUTION
            )));
        }
        let steps = ((self.max - self.min) / self.step + 1e-9).floor();
        if steps >= MAX_RANGE_VALUES as f64 {
            return Err(too_many(self));
        }
        let mut values: Vec<f64> = (0..=steps as usize)
            .map(|i| ((self.min + i as f64 * self.step) * 1e9).round() / 1e9)
            .collect();
        values.dedup();
        Ok(values)
    }
}

/// One combination of swept parameters. `ordinal` is its position in grid order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPoint {
    pub ordinal: usize,
    pub epoch_size: usize,
    pub train_threshold: f64,
    pub test_threshold: f64,
}

impl GridPoint {
    /// File name of the profile dumped for this point.
    pub fn dump_name(&self) -> String {
        format!(
            "normal-e{}-t{}-d{}.tsv",
            self.epoch_size, self.train_threshold, self.test_threshold
        )
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "epoch size {}, train threshold {}, test threshold {}",
            self.epoch_size, self.train_threshold, self.test_threshold
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterGrid {
    pub epoch_size: Range<usize>,
    pub train_threshold: Range<f64>,
    pub test_threshold: Range<f64>,
}

impl ParameterGrid {
    /// Cross product in sweep order.
    pub fn points(&self) -> Result<Vec<GridPoint>> {
        let epoch_sizes = self.epoch_size.values()?;
        let train_thresholds = self.train_threshold.values()?;
        let test_thresholds = self.test_threshold.values()?;

        let mut points = Vec::new();
        for &epoch_size in &epoch_sizes {
            for &train_threshold in &train_thresholds {
                for &test_threshold in &test_thresholds {
                    points.push(GridPoint {
                        ordinal: points.len(),
                        epoch_size,
                        train_threshold,
                        test_threshold,
                    });
                }
            }
        }
        Ok(points)
    }
}

/// Everything a sweep needs besides the index and the seed profile.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub trace: PathBuf,
    pub grid: ParameterGrid,
    pub pattern_width: usize,
    pub encoding: Encoding,
    pub train_epochs: usize,
    pub jobs: usize,
    pub dump_dir: Option<PathBuf>,
}

#[derive(Debug)]
enum Outcome {
    Completed(Statistics),
    Skipped,
    Interrupted,
}

pub struct Sweep<'a> {
    config: &'a SweepConfig,
    index: &'a SyscallIndex,
    seed: Option<&'a FrequencyDatabase>,
    stop: StopSignal,
}

impl<'a> Sweep<'a> {
    pub fn new(
        config: &'a SweepConfig,
        index: &'a SyscallIndex,
        seed: Option<&'a FrequencyDatabase>,
        stop: StopSignal,
    ) -> Self {
        Sweep {
            config,
            index,
            seed,
            stop,
        }
    }

    fn params(&self, point: &GridPoint) -> ClassifierParams {
        ClassifierParams {
            epoch_size: point.epoch_size,
            pattern_width: self.config.pattern_width,
            encoding: self.config.encoding,
            train_threshold: point.train_threshold,
            test_threshold: point.test_threshold,
            train_epochs: self.config.train_epochs,
        }
    }

    fn evaluate(&self, point: GridPoint, keep_epochs: bool) -> Result<Outcome> {
        info!("evaluating {}", point);
        let trace = Trace::open(&self.config.trace)?;
        let mut stats = Statistics::new(point, keep_epochs);
        let mut classifier = EpochClassifier::new(
            trace,
            self.index,
            self.params(&point),
            self.seed.cloned(),
            self.stop.clone(),
        );

        if !classifier.train_unconditionally(&mut stats)? {
            if self.stop.is_requested() {
                return Ok(Outcome::Interrupted);
            }
            info!("training failed for {}, skipping", point);
            return Ok(Outcome::Skipped);
        }
        if let Some(dir) = &self.config.dump_dir {
            let path = dir.join(point.dump_name());
            classifier.profile().dump(&path)?;
            debug!("normal profile written to {}", path.display());
        }

        classifier.test(&mut stats)?;
        if self.stop.is_requested() {
            return Ok(Outcome::Interrupted);
        }
        Ok(Outcome::Completed(stats))
    }

    /// Runs the whole grid, reporting each completed point to `sink` as it arrives and the
    /// summary at the end. Any I/O or data error aborts the sweep.
    pub fn run(&self, sink: &mut dyn ResultSink) -> Result<Summary> {
        let points = self.config.grid.points()?;
        let jobs = self.config.jobs.clamp(1, points.len().max(1));
        let keep_epochs = sink.wants_epochs();
        info!(
            combinations = points.len(),
            jobs,
            "sweeping {}",
            self.config.trace.display()
        );

        let next = AtomicUsize::new(0);
        let mut summary = Summary::new();
        let mut failure: Option<Error> = None;

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Result<Outcome>>();
            for _ in 0..jobs {
                let tx = tx.clone();
                let next = &next;
                let points = &points;
                scope.spawn(move || {
                    while !self.stop.is_requested() {
                        let Some(point) = points.get(next.fetch_add(1, Ordering::SeqCst)) else {
                            break;
                        };
                        if tx.send(self.evaluate(*point, keep_epochs)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for outcome in rx {
                // once the sweep is abandoned, late results are dropped unreported
                if failure.is_some() {
                    continue;
                }
                let result = match outcome {
                    Ok(Outcome::Completed(stats)) => {
                        let reported = sink.combination(&stats);
                        summary.add(stats);
                        reported
                    }
                    Ok(Outcome::Skipped) => {
                        summary.skip();
                        Ok(())
                    }
                    Ok(Outcome::Interrupted) => {
                        summary.interrupted = true;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    // first failure wins; the rest of the grid is abandoned
                    self.stop.request();
                    failure.get_or_insert(e);
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        if self.stop.is_requested() {
            warn!("sweep interrupted after {} combinations", summary.evaluated);
            summary.interrupted = true;
        }
        summary.sort();
        sink.summary(&summary)?;
        Ok(summary)
    }
}
