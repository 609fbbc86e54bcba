//! Result reporting. Statistics and the final summary are results, not diagnostics, so they go
//! to their own writer (stdout or the output file) rather than through `tracing`.
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::{Statistics, Summary};

/// Receives the results of a sweep.
pub trait ResultSink {
    /// Called once for every grid point whose training succeeded.
    fn combination(&mut self, stats: &Statistics) -> Result<()>;

    /// Called once when the sweep ends.
    fn summary(&mut self, summary: &Summary) -> Result<()>;

    /// Whether per-epoch records should be kept in [`Statistics`].
    fn wants_epochs(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    All = 4,
}

impl Verbosity {
    /// Levels above `All` saturate.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::None,
            1 => Verbosity::Low,
            2 => Verbosity::Medium,
            3 => Verbosity::High,
            _ => Verbosity::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(Error::InvalidConfig(format!("unknown format {:?}", other))),
        }
    }
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.2}%", value * 100.0),
        None => "n/a".to_string(),
    }
}

struct StatsBlock<'a>(&'a Statistics);

impl fmt::Display for StatsBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let stats = self.0;
        let c = &stats.confusion;
        writeln!(f, "  training epochs:    {}", stats.training.epochs)?;
        writeln!(f, "  committed epochs:   {}", stats.training.committed)?;
        writeln!(f, "  profile patterns:   {}", stats.training.profile_size)?;
        writeln!(f, "  tested epochs:      {}", stats.tested_epochs)?;
        writeln!(f, "  anomalous epochs:   {}", stats.anomalous_epochs)?;
        writeln!(
            f,
            "  TP/FP/TN/FN:        {}/{}/{}/{}",
            c.true_positives, c.false_positives, c.true_negatives, c.false_negatives
        )?;
        writeln!(f, "  detection rate:     {}", percent(stats.detection_rate))?;
        writeln!(f, "  false positives:    {}", percent(stats.false_positive_rate))?;
        writeln!(f, "  accuracy:           {}", percent(stats.accuracy))?;
        if stats.unknown_syscalls > 0 {
            writeln!(f, "  unknown syscalls:   {}", stats.unknown_syscalls)?;
        }
        Ok(())
    }
}

/// Writes results as text blocks or JSON lines.
pub struct Reporter<W> {
    out: W,
    verbosity: Verbosity,
    format: Format,
    origin: PathBuf,
}

impl<W: Write> Reporter<W> {
    /// `origin` names the destination in I/O errors.
    pub fn new(out: W, verbosity: Verbosity, format: Format, origin: impl Into<PathBuf>) -> Self {
        Reporter {
            out,
            verbosity,
            format,
            origin: origin.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn text_combination(&mut self, stats: &Statistics) -> std::io::Result<()> {
        let rule = "#".repeat(55);
        writeln!(self.out, "{}", rule)?;
        writeln!(self.out, "Epoch size: {}", stats.point.epoch_size)?;
        writeln!(self.out, "Train threshold: {}", stats.point.train_threshold)?;
        writeln!(self.out, "Test threshold: {}", stats.point.test_threshold)?;
        writeln!(self.out, "{}", rule)?;
        write!(self.out, "{}", StatsBlock(stats))?;
        if self.verbosity >= Verbosity::High {
            for epoch in &stats.epochs {
                writeln!(
                    self.out,
                    "    epoch {:>6}  similarity {:.6}  {}{}",
                    epoch.number,
                    epoch.similarity,
                    if epoch.anomalous { "ANOMALOUS" } else { "normal" },
                    if epoch.under_attack { " (attack)" } else { "" }
                )?;
            }
        }
        Ok(())
    }

    fn text_summary(&mut self, summary: &Summary) -> std::io::Result<()> {
        writeln!(
            self.out,
            "Summary: {} evaluated, {} skipped{}",
            summary.evaluated,
            summary.skipped,
            if summary.interrupted { ", interrupted" } else { "" }
        )?;
        writeln!(
            self.out,
            "{:>8} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10}",
            "epoch", "train", "test", "tested", "detection", "false-pos", "accuracy"
        )?;
        for stats in &summary.results {
            writeln!(
                self.out,
                "{:>8} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10}",
                stats.point.epoch_size,
                stats.point.train_threshold,
                stats.point.test_threshold,
                stats.tested_epochs,
                percent(stats.detection_rate),
                percent(stats.false_positive_rate),
                percent(stats.accuracy)
            )?;
        }
        if let Some(best) = summary.best() {
            writeln!(self.out, "Best: {}", best.point)?;
        }
        Ok(())
    }

    fn io(&self, e: std::io::Error) -> Error {
        Error::io(&self.origin, e)
    }
}

impl<W: Write> ResultSink for Reporter<W> {
    fn combination(&mut self, stats: &Statistics) -> Result<()> {
        if self.verbosity < Verbosity::Low {
            return Ok(());
        }
        match self.format {
            Format::Text => self.text_combination(stats).map_err(|e| self.io(e))?,
            Format::Json => {
                serde_json::to_writer(&mut self.out, stats)?;
                writeln!(self.out).map_err(|e| self.io(e))?;
            }
        }
        self.out.flush().map_err(|e| self.io(e))
    }

    fn summary(&mut self, summary: &Summary) -> Result<()> {
        match self.format {
            Format::Text => self.text_summary(summary).map_err(|e| self.io(e))?,
            Format::Json => {
                serde_json::to_writer(&mut self.out, summary)?;
                writeln!(self.out).map_err(|e| self.io(e))?;
            }
        }
        self.out.flush().map_err(|e| self.io(e))
    }

    fn wants_epochs(&self) -> bool {
        self.verbosity >= Verbosity::High
    }
}
