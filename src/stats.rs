use serde::Serialize;

use crate::sweep::GridPoint;

/// Outcome of one tested epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochRecord {
    pub number: usize,
    pub similarity: f64,
    pub anomalous: bool,
    pub under_attack: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrainingStats {
    pub epochs: usize,
    pub committed: usize,
    pub profile_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Confusion {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl Confusion {
    pub fn record(&mut self, anomalous: bool, under_attack: bool) {
        match (anomalous, under_attack) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Results of a single grid point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    #[serde(flatten)]
    pub point: GridPoint,
    pub training: TrainingStats,
    pub tested_epochs: usize,
    pub anomalous_epochs: usize,
    pub confusion: Confusion,
    pub unknown_syscalls: usize,
    pub detection_rate: Option<f64>,
    pub false_positive_rate: Option<f64>,
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub epochs: Vec<EpochRecord>,
    #[serde(skip)]
    keep_epochs: bool,
}

impl Statistics {
    pub fn new(point: GridPoint, keep_epochs: bool) -> Self {
        Statistics {
            point,
            training: TrainingStats::default(),
            tested_epochs: 0,
            anomalous_epochs: 0,
            confusion: Confusion::default(),
            unknown_syscalls: 0,
            detection_rate: None,
            false_positive_rate: None,
            accuracy: None,
            epochs: Vec::new(),
            keep_epochs,
        }
    }

    pub fn record_training(&mut self, committed: bool) {
        self.training.epochs += 1;
        if committed {
            self.training.committed += 1;
        }
    }

    pub fn record_test(&mut self, record: EpochRecord) {
        self.tested_epochs += 1;
        if record.anomalous {
            self.anomalous_epochs += 1;
        }
        self.confusion.record(record.anomalous, record.under_attack);
        if self.keep_epochs {
            self.epochs.push(record);
        }
        self.refresh_rates();
    }

    fn refresh_rates(&mut self) {
        let c = &self.confusion;
        self.detection_rate = ratio(c.true_positives, c.true_positives + c.false_negatives);
        self.false_positive_rate = ratio(c.false_positives, c.false_positives + c.true_negatives);
        self.accuracy = ratio(c.true_positives + c.true_negatives, c.total());
    }
}

/// Running summary over the whole sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub evaluated: usize,
    pub skipped: usize,
    pub interrupted: bool,
    pub results: Vec<Statistics>,
}

impl Summary {
    pub fn new() -> Self {
        Summary::default()
    }

    pub fn add(&mut self, stats: Statistics) {
        self.evaluated += 1;
        self.results.push(stats);
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Restores grid order after out-of-order arrival from parallel workers.
    pub fn sort(&mut self) {
        self.results.sort_by_key(|stats| stats.point.ordinal);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Highest accuracy; ties go to the lower false-positive rate, then the earlier grid point.
    pub fn best(&self) -> Option<&Statistics> {
        let key = |stats: &Statistics| {
            (
                stats.accuracy.unwrap_or(-1.0),
                -stats.false_positive_rate.unwrap_or(1.0),
            )
        };
        self.results.iter().fold(None, |best: Option<&Statistics>, stats| match best {
            Some(current) if key(current) >= key(stats) => Some(current),
            _ => Some(stats),
        })
    }
}
