//! Capabilities a backend declares.
//!
//! A [`Capacity`] is fixed when the backend is constructed and never changes
//! afterwards.  [`crate::DataFs`] consults it before dispatching any
//! capability-gated operation, so a backend never sees a call it didn't
//! declare support for.

use std::{fmt, str::FromStr};

use crate::error::{DataFsError, Result};

/// A single operation class a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Open objects for reading, and test for their existence.
    ReadData,
    /// Open objects for writing.
    WriteData,
    /// List and read per-object metadata.
    ReadMeta,
    /// Store and clear per-object metadata.
    WriteMeta,
}

impl Capability {
    /// All capabilities, in declaration order.
    pub const ALL: [Capability; 4] = [
        Capability::ReadData,
        Capability::WriteData,
        Capability::ReadMeta,
        Capability::WriteMeta,
    ];

    /// The token name used in configuration and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ReadData => "read_data",
            Capability::WriteData => "write_data",
            Capability::ReadMeta => "read_meta",
            Capability::WriteMeta => "write_meta",
        }
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = DataFsError;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DataFsError::InvalidArgument(format!("unknown capability {s:?}")))
    }
}

/// An immutable set of [`Capability`] values.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Capacity(u8);

impl Capacity {
    /// Build a set from the given capabilities.  Duplicates are ignored.
    pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self {
        Self(caps.into_iter().fold(0, |bits, cap| bits | cap.bit()))
    }

    /// The set with no capabilities.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The set with every capability.
    pub fn all() -> Self {
        Self::new(Capability::ALL)
    }

    /// Parse a set from token names such as `"read_data"`.
    ///
    /// Fails with [`DataFsError::InvalidArgument`] on the first unknown token.
    pub fn from_tokens<S: AsRef<str>>(tokens: impl IntoIterator<Item = S>) -> Result<Self> {
        tokens
            .into_iter()
            .map(|token| token.as_ref().parse::<Capability>())
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Whether `cap` is in this set.
    pub fn has(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Iterate the members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|cap| self.has(*cap))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(Capability::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl FromIterator<Capability> for Capacity {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_membership() {
        let caps = Capacity::new([Capability::ReadData, Capability::WriteData]);
        assert!(caps.has(Capability::ReadData));
        assert!(caps.has(Capability::WriteData));
        assert!(!caps.has(Capability::ReadMeta));
        assert!(!caps.has(Capability::WriteMeta));
        assert_eq!(format!("{caps}"), "{read_data, write_data}");
    }

    #[test]
    fn test_empty_and_all() {
        assert!(Capacity::empty().is_empty());
        assert_eq!(Capacity::empty().iter().count(), 0);
        assert_eq!(
            Capacity::all().iter().collect::<Vec<_>>(),
            Capability::ALL.to_vec()
        );
        assert_eq!(Capacity::default(), Capacity::empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let caps: Capacity = [Capability::ReadMeta, Capability::ReadMeta]
            .into_iter()
            .collect();
        assert_eq!(caps.iter().collect::<Vec<_>>(), vec![Capability::ReadMeta]);
    }

    #[test]
    fn test_from_tokens() {
        let caps = Capacity::from_tokens(["READ_DATA", "write_meta"]).unwrap();
        assert_eq!(
            caps,
            Capacity::new([Capability::ReadData, Capability::WriteMeta])
        );

        let err = Capacity::from_tokens(["read_data", "execute"]).unwrap_err();
        assert!(matches!(err, DataFsError::InvalidArgument(_)));
    }
}
