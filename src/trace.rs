//! # Trace Module
//!
//! Reads an offline syscall trace and splits it into epochs. Each line carries one syscall, either
//! as a bare name, as a syscall number, or as a raw `strace` line from which the name in front of
//! the argument list is taken.
//!
//! Lines starting with `#` are comments, except for two markers used to label evaluation traces:
//! `#attack` flags every following syscall as attack traffic and `#normal` clears the flag.
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::syscall::{normalize_name, SyscallId, SyscallIndex};

pub const ATTACK_MARKER: &str = "#attack";
pub const NORMAL_MARKER: &str = "#normal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Syscall(String),
    AttackStart,
    AttackEnd,
}

/// Strips the pid column `strace -f` puts in front of each line, either `[pid N]` or a bare
/// number followed by whitespace.
fn strip_pid(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("[pid") {
        let (pid, rest) = rest.split_once(']')?;
        return pid.trim().parse::<u32>().ok().map(|_| rest.trim_start());
    }
    let (pid, rest) = line.split_once(char::is_whitespace)?;
    if pid.bytes().all(|b| b.is_ascii_digit()) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Decodes a single trace line. Returns `None` for lines that carry no syscall.
pub fn parse_line(line: &str) -> Option<TraceEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(directive) = line.strip_prefix('#') {
        return match directive.trim() {
            "attack" => Some(TraceEvent::AttackStart),
            "normal" => Some(TraceEvent::AttackEnd),
            _ => None,
        };
    }

    let (rest, prefixed) = match strip_pid(line) {
        Some(rest) => (rest, true),
        None => (line, false),
    };
    // strace noise: signals, exits and resumed calls
    if rest.starts_with("---") || rest.starts_with("+++") || rest.starts_with('<') {
        return None;
    }

    let (head, call) = match rest.split_once('(') {
        Some((head, _)) => (head.trim_end(), true),
        None => (rest, false),
    };
    if head.is_empty() || head.contains(char::is_whitespace) {
        return None;
    }
    // a syscall number is only accepted as a line of its own
    if (prefixed || call) && head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    normalize_name(head).map(TraceEvent::Syscall)
}

pub struct Trace<R> {
    lines: Lines<R>,
    origin: PathBuf,
}

impl Trace<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Ok(Trace::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> Trace<R> {
    pub fn new(reader: R, origin: impl Into<PathBuf>) -> Self {
        Trace {
            lines: reader.lines(),
            origin: origin.into(),
        }
    }

    pub fn epochs(self, index: &SyscallIndex, size: usize) -> Epochs<'_, R> {
        Epochs {
            trace: self,
            index,
            size: size.max(1),
            under_attack: false,
            next: 0,
        }
    }
}

impl<R: BufRead> Iterator for Trace<R> {
    type Item = Result<TraceEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if let Some(event) = parse_line(&line) {
                        return Some(Ok(event));
                    }
                }
                Err(e) => return Some(Err(Error::io(&self.origin, e))),
            }
        }
    }
}

/// A block of consecutive syscalls classified as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    /// Position of the epoch in the trace, from 0.
    pub number: usize,
    /// Index ids; `None` for names the index does not know.
    pub ids: Vec<Option<SyscallId>>,
    /// At least one syscall was read under `#attack`.
    pub under_attack: bool,
}

impl Epoch {
    pub fn unknown(&self) -> usize {
        self.ids.iter().filter(|id| id.is_none()).count()
    }
}

/// Iterator over the full-size epochs of a trace. A trailing block shorter than the epoch size
/// is dropped.
pub struct Epochs<'a, R> {
    trace: Trace<R>,
    index: &'a SyscallIndex,
    size: usize,
    under_attack: bool,
    next: usize,
}

impl<'a, R: BufRead> Iterator for Epochs<'a, R> {
    type Item = Result<Epoch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut ids = Vec::with_capacity(self.size);
        let mut attacked = false;

        while ids.len() < self.size {
            match self.trace.next() {
                Some(Ok(TraceEvent::Syscall(name))) => {
                    attacked |= self.under_attack;
                    ids.push(self.index.lookup(&name));
                }
                Some(Ok(TraceEvent::AttackStart)) => self.under_attack = true,
                Some(Ok(TraceEvent::AttackEnd)) => self.under_attack = false,
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    if !ids.is_empty() {
                        debug!(
                            "dropping trailing {} syscalls shorter than epoch size {}",
                            ids.len(),
                            self.size
                        );
                    }
                    return None;
                }
            }
        }

        let epoch = Epoch {
            number: self.next,
            ids,
            under_attack: attacked,
        };
        self.next += 1;
        Some(Ok(epoch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index() -> SyscallIndex {
        SyscallIndex::from_names(["read", "write", "close"]).unwrap()
    }

    fn syscall(name: &str) -> Option<TraceEvent> {
        Some(TraceEvent::Syscall(name.to_string()))
    }

    #[test]
    fn parses_bare_names() {
        assert_eq!(parse_line("read"), syscall("read"));
        assert_eq!(parse_line("  write \r"), syscall("write"));
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn parses_strace_lines() {
        assert_eq!(
            parse_line("openat(AT_FDCWD, \"/etc/passwd\", O_RDONLY) = 3"),
            syscall("openat")
        );
        assert_eq!(parse_line("4242  read(3, \"\", 4096) = 0"), syscall("read"));
        assert_eq!(parse_line("--- SIGCHLD {si_signo=SIGCHLD} ---"), None);
        assert_eq!(parse_line("+++ exited with 0 +++"), None);
        assert_eq!(parse_line("<... read resumed>) = 5"), None);
    }

    #[test]
    fn parses_pid_prefixed_lines() {
        assert_eq!(
            parse_line("[pid  4242] write(1, \"ok\", 2) = 2"),
            syscall("write")
        );
        assert_eq!(
            parse_line("[pid  4242] read(3, <unfinished ...>"),
            syscall("read")
        );
        assert_eq!(
            parse_line("[pid  4242] <... read resumed>\"abc\", 4096) = 5"),
            None
        );
        assert_eq!(parse_line("4242  <... read resumed>\"abc\", 4096) = 5"), None);
        assert_eq!(
            parse_line("[pid  4242] --- SIGCHLD {si_signo=SIGCHLD} ---"),
            None
        );
        assert_eq!(parse_line("[pid  4242] +++ exited with 0 +++"), None);
        assert_eq!(parse_line("4242  +++ killed by SIGKILL +++"), None);
    }

    #[test]
    fn numbers_only_decode_as_whole_lines() {
        assert_eq!(parse_line("0"), normalize_name("0").map(TraceEvent::Syscall));
        assert!(parse_line("0").is_some());
        assert_eq!(parse_line("4242  5"), None);
        assert_eq!(parse_line("[pid 7] 5"), None);
        assert_eq!(parse_line("read 5"), None);
    }

    #[test]
    fn parses_markers_and_comments() {
        assert_eq!(parse_line("#attack"), Some(TraceEvent::AttackStart));
        assert_eq!(parse_line("# normal"), Some(TraceEvent::AttackEnd));
        assert_eq!(parse_line("# recorded on host-1"), None);
    }

    #[test]
    fn splits_into_full_epochs() {
        let input = "read\nwrite\nclose\nread\nwrite\n";
        let index = index();
        let epochs: Vec<_> = Trace::new(Cursor::new(input), "mem")
            .epochs(&index, 2)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(epochs.len(), 2);
        assert_eq!(epochs[0].number, 0);
        assert_eq!(epochs[0].ids, vec![Some(SyscallId(0)), Some(SyscallId(1))]);
        assert_eq!(epochs[1].ids, vec![Some(SyscallId(2)), Some(SyscallId(0))]);
    }

    #[test]
    fn unknown_names_are_kept_as_gaps() {
        let index = index();
        let epochs: Vec<_> = Trace::new(Cursor::new("read\nexecve\n"), "mem")
            .epochs(&index, 2)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(epochs[0].ids, vec![Some(SyscallId(0)), None]);
        assert_eq!(epochs[0].unknown(), 1);
    }

    #[test]
    fn attack_markers_label_epochs() {
        let input = "read\nread\n#attack\nwrite\nwrite\n#normal\nclose\nclose\n";
        let index = index();
        let labels: Vec<bool> = Trace::new(Cursor::new(input), "mem")
            .epochs(&index, 2)
            .map(|epoch| epoch.unwrap().under_attack)
            .collect();
        assert_eq!(labels, vec![false, true, false]);
    }

    #[test]
    fn open_missing_trace_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Trace::open(dir.path().join("trace")),
            Err(Error::Io { .. })
        ));
    }
}
