//! # Database Module
//!
//! A [`FrequencyDatabase`] counts how often each [`Pattern`] occurred. It is the representation of
//! both a single epoch and the accumulated normal profile, and compares the two with cosine
//! similarity over their count vectors.
//!
//! Only the operations below are exposed, so every stored count is at least 1: entries are
//! created by [`FrequencyDatabase::add`] or [`FrequencyDatabase::commit`] and never decremented.
//!
//! Databases persist as plain text, one `pattern<TAB>count` record per line, no header.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::pattern::Pattern;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrequencyDatabase {
    counts: HashMap<Pattern, u64>,
}

impl FrequencyDatabase {
    pub fn new() -> Self {
        FrequencyDatabase {
            counts: HashMap::new(),
        }
    }

    /// Counts one occurrence of `pattern`. The null pattern (`None`) is ignored.
    pub fn add(&mut self, pattern: Option<Pattern>) {
        if let Some(pattern) = pattern {
            *self.counts.entry(pattern).or_insert(0) += 1;
        }
    }

    /// Adds every count of `other` into `self`. `other` is left untouched.
    pub fn commit(&mut self, other: &FrequencyDatabase) {
        for (pattern, count) in &other.counts {
            *self.counts.entry(pattern.clone()).or_insert(0) += count;
        }
    }

    /// L2 norm of the count vector.
    pub fn norm(&self) -> f64 {
        let sum: u128 = self
            .counts
            .values()
            .map(|&count| (count as u128) * (count as u128))
            .sum();
        (sum as f64).sqrt()
    }

    /// Cosine similarity between the two count vectors, in `[0, 1]`.
    ///
    /// Patterns missing from either side contribute nothing to the dot product, so only the
    /// smaller map is walked. An empty operand gives exactly 0.
    pub fn similarity_to(&self, other: &FrequencyDatabase) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }

        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: u128 = small
            .counts
            .iter()
            .filter_map(|(pattern, &count)| {
                large
                    .counts
                    .get(pattern)
                    .map(|&theirs| (count as u128) * (theirs as u128))
            })
            .sum();

        (dot as f64 / (self.norm() * other.norm())).min(1.0)
    }

    /// Occurrences of `pattern`, 0 when absent.
    pub fn count(&self, pattern: &Pattern) -> u64 {
        self.counts.get(pattern).copied().unwrap_or(0)
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Pattern, u64)> {
        self.counts.iter().map(|(pattern, &count)| (pattern, count))
    }

    /// Reads a dump written by [`FrequencyDatabase::dump`]. Any malformed record fails the
    /// whole load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::read_from(BufReader::new(file), path)
    }

    /// Parses dump records from `reader`; `origin` only names the source in errors.
    pub fn read_from<R: BufRead>(reader: R, origin: &Path) -> Result<Self> {
        let mut database = FrequencyDatabase::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::io(origin, e))?;
            let malformed = |reason: String| Error::MalformedRecord {
                path: origin.to_path_buf(),
                line: number + 1,
                reason,
            };

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 2 {
                return Err(malformed(format!("expected 2 fields, found {}", fields.len())));
            }
            let pattern: Pattern = fields[0]
                .parse()
                .map_err(|e: Error| malformed(e.to_string()))?;
            let count: u64 = fields[1]
                .trim()
                .parse()
                .map_err(|e| malformed(format!("count {:?}: {}", fields[1], e)))?;
            if count == 0 {
                return Err(malformed("zero count".to_string()));
            }
            // duplicate records accumulate
            *database.counts.entry(pattern).or_insert(0) += count;
        }
        Ok(database)
    }

    /// Writes every entry as `pattern<TAB>count`, in map iteration order.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| Error::io(path, e))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (pattern, count) in &self.counts {
            writeln!(writer, "{}\t{}", pattern, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn p(raw: &[u16]) -> Pattern {
        Pattern::new(raw.to_vec())
    }

    fn db(entries: &[(&[u16], u64)]) -> FrequencyDatabase {
        let mut database = FrequencyDatabase::new();
        for &(pattern, count) in entries {
            for _ in 0..count {
                database.add(Some(p(pattern)));
            }
        }
        database
    }

    #[test]
    fn add_twice_counts_two() {
        let mut database = FrequencyDatabase::new();
        database.add(Some(p(&[1, 2])));
        database.add(Some(p(&[1, 2])));
        assert_eq!(database.count(&p(&[1, 2])), 2);
        assert_eq!(database.len(), 1);
    }

    #[test]
    fn add_null_pattern_is_noop() {
        let mut database = db(&[(&[1], 1)]);
        let before = database.clone();
        database.add(None);
        assert_eq!(database, before);

        let mut empty = FrequencyDatabase::new();
        empty.add(None);
        assert!(empty.is_empty());
    }

    #[test]
    fn commit_with_self_doubles() {
        let a = db(&[(&[1], 3), (&[2], 2)]);
        let mut doubled = a.clone();
        doubled.commit(&a);
        assert_eq!(doubled.count(&p(&[1])), 6);
        assert_eq!(doubled.count(&p(&[2])), 4);
        assert_eq!(doubled.len(), 2);
    }

    #[test]
    fn commit_is_commutative_and_leaves_other_alone() {
        let a = db(&[(&[1], 3), (&[2], 2)]);
        let b = db(&[(&[1], 1), (&[3], 5)]);

        let mut ab = a.clone();
        ab.commit(&b);
        let mut ba = b.clone();
        ba.commit(&a);

        assert_eq!(ab, ba);
        assert_eq!(ab.count(&p(&[1])), 4);
        assert_eq!(ab.count(&p(&[3])), 5);
        assert_eq!(b, db(&[(&[1], 1), (&[3], 5)]));
    }

    #[test]
    fn norm_is_l2() {
        let a = db(&[(&[1], 3), (&[2], 4)]);
        assert!((a.norm() - 5.0).abs() < 1e-12);
        assert_eq!(FrequencyDatabase::new().norm(), 0.0);
    }

    #[test]
    fn similarity_with_self_is_one() {
        let a = db(&[(&[1, 2], 7), (&[2, 3], 1), (&[4, 4], 2)]);
        assert!((a.similarity_to(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = db(&[(&[1], 3), (&[2], 2), (&[9], 1)]);
        let b = db(&[(&[1], 1), (&[2], 1), (&[3], 5)]);
        assert_eq!(a.similarity_to(&b), b.similarity_to(&a));
    }

    #[test]
    fn similarity_with_empty_is_zero() {
        let a = db(&[(&[1], 3)]);
        let empty = FrequencyDatabase::new();
        assert_eq!(a.similarity_to(&empty), 0.0);
        assert_eq!(empty.similarity_to(&a), 0.0);
        assert_eq!(empty.similarity_to(&empty), 0.0);
    }

    #[test]
    fn similarity_concrete_vectors() {
        // X = [1], Y = [2], Z = [3]
        let a = db(&[(&[1], 3), (&[2], 2)]);
        let b = db(&[(&[1], 1), (&[2], 1), (&[3], 5)]);
        let expected = 5.0 / 351f64.sqrt();
        assert!((a.similarity_to(&b) - expected).abs() < 1e-6);
        assert!((a.similarity_to(&b) - 0.2669).abs() < 1e-4);
    }

    #[test]
    fn disjoint_databases_are_orthogonal() {
        let a = db(&[(&[1], 3)]);
        let b = db(&[(&[2], 3)]);
        assert_eq!(a.similarity_to(&b), 0.0);
    }

    #[test]
    fn dump_then_load_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal.tsv");
        let a = db(&[(&[1, 2, 3], 4), (&[3, 2, 1], 1), (&[0, 0, 0], 12)]);

        a.dump(&path).unwrap();
        let loaded = FrequencyDatabase::load(&path).unwrap();
        assert_eq!(loaded, a);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().any(|line| line == "0,0,0\t12"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FrequencyDatabase::load(dir.path().join("absent.tsv")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn load_rejects_bad_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsv");
        fs::write(&path, "1,2\t3\n2,3\tmany\n").unwrap();
        match FrequencyDatabase::load(&path).unwrap_err() {
            Error::MalformedRecord { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_rejects_wrong_field_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsv");
        fs::write(&path, "1,2\t3\t4\n").unwrap();
        assert!(matches!(
            FrequencyDatabase::load(&path).unwrap_err(),
            Error::MalformedRecord { line: 1, .. }
        ));

        fs::write(&path, "1,2\n").unwrap();
        assert!(FrequencyDatabase::load(&path).is_err());
    }

    #[test]
    fn load_rejects_zero_count() {
        let reader = std::io::Cursor::new("4\t0\n");
        assert!(FrequencyDatabase::read_from(reader, Path::new("mem")).is_err());
    }
}
