//! # Syscall Module
//!
//! Maps syscall names to the small integer ids used inside patterns. The index is loaded once
//! from a plain-text file (one name per line) and is read-only afterwards, so a single instance
//! can be shared by every grid point of a sweep.
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use syscalls::Sysno;

use crate::error::{Error, Result};

/// Id of a syscall inside a [`SyscallIndex`], assigned in first-seen order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyscallId(pub u16);

impl fmt::Display for SyscallId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SyscallIndex {
    ids: HashMap<String, SyscallId>,
    names: Vec<String>,
}

impl SyscallIndex {
    /// Reads an index file. Blank lines and `#` comments are skipped, duplicates keep the id
    /// of their first appearance.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let index = Self::from_names(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )?;
        if index.is_empty() {
            return Err(Error::EmptyIndex {
                path: path.to_path_buf(),
            });
        }
        Ok(index)
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = SyscallIndex::default();
        for name in names {
            let name = name.as_ref();
            if index.ids.contains_key(name) {
                continue;
            }
            let id = u16::try_from(index.names.len()).map_err(|_| {
                Error::InvalidConfig(format!("more than {} distinct syscalls", u16::MAX))
            })?;
            index.ids.insert(name.to_string(), SyscallId(id));
            index.names.push(name.to_string());
        }
        Ok(index)
    }

    pub fn lookup(&self, name: &str) -> Option<SyscallId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: SyscallId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in id order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl fmt::Display for SyscallIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (id, name) in self.names.iter().enumerate() {
            writeln!(f, "{:>4} {}", id, name)?;
        }
        Ok(())
    }
}

/// Turns one trace token into a syscall name. Bare numbers are decoded through the host's
/// syscall table, everything else is taken verbatim.
pub fn normalize_name(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let decoded = token
        .parse::<usize>()
        .ok()
        .and_then(Sysno::new)
        .map(|sysno| sysno.to_string());
    Some(decoded.unwrap_or_else(|| token.to_string()))
}
