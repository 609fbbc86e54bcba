use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::syscall::SyscallId;

/// Fixed-width key of a frequency database. Equality and hashing cover every element.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pattern(Box<[u16]>);

impl Pattern {
    pub fn new(elements: impl Into<Box<[u16]>>) -> Self {
        Pattern(elements.into())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", element)?;
        }
        Ok(())
    }
}

impl FromStr for Pattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::InvalidPattern("empty pattern".to_string()));
        }
        s.split(',')
            .map(|element| {
                element
                    .trim()
                    .parse::<u16>()
                    .map_err(|e| Error::InvalidPattern(format!("{:?}: {}", element, e)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Pattern::new)
    }
}

/// How a window of syscalls becomes a [`Pattern`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// The ordered ids of the window.
    #[default]
    Sequence,
    /// Per-syscall counts over the window, one slot per index entry.
    Bag,
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequence" => Ok(Encoding::Sequence),
            "bag" => Ok(Encoding::Bag),
            other => Err(Error::InvalidConfig(format!("unknown encoding {:?}", other))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Encoding::Sequence => f.write_str("sequence"),
            Encoding::Bag => f.write_str("bag"),
        }
    }
}

impl Encoding {
    /// Encodes one window. `None` entries are syscalls missing from the index; a window
    /// holding one yields the null pattern.
    pub fn encode(&self, window: &[Option<SyscallId>], alphabet: usize) -> Option<Pattern> {
        match self {
            Encoding::Sequence => window
                .iter()
                .map(|id| id.map(|id| id.0))
                .collect::<Option<Vec<_>>>()
                .map(Pattern::new),
            Encoding::Bag => {
                let mut bag = vec![0u16; alphabet];
                for id in window {
                    let slot = bag.get_mut(id.as_ref()?.0 as usize)?;
                    *slot = slot.saturating_add(1);
                }
                Some(Pattern::new(bag))
            }
        }
    }

    /// Slides a window of `width` over `ids` with step 1. Fewer than `width` ids yield nothing.
    pub fn windows<'a>(
        &'a self,
        ids: &'a [Option<SyscallId>],
        width: usize,
        alphabet: usize,
    ) -> impl Iterator<Item = Option<Pattern>> + 'a {
        ids.windows(width.max(1))
            .map(move |window| self.encode(window, alphabet))
    }
}
