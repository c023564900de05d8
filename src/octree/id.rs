//! Path-encoded octant identifiers
//!
//! An id is the path of child positions from the root: the root is the empty
//! path and every level appends one octal digit (bit 0 = +x, bit 1 = +y,
//! bit 2 = +z). Digits are packed left-aligned into a `u64`, three bits per
//! level, so comparing `(bits, level)` orders ids exactly like their path
//! strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Deepest level an id can encode (21 * 3 = 63 bits)
pub const MAX_LEVEL: u8 = 21;

/// Identifier of one octant, immutable once assigned
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OctantId {
    bits: u64,
    level: u8,
}

impl OctantId {
    /// The root octant (empty path)
    pub const ROOT: OctantId = OctantId { bits: 0, level: 0 };

    /// Build an id from its sequence of child positions
    pub fn from_path(digits: &[u8]) -> Result<Self> {
        let mut id = Self::ROOT;
        for &digit in digits {
            id = id.checked_child(digit)?;
        }
        Ok(id)
    }

    /// Parse a Potree node name such as `"r"` or `"r0374"`
    pub fn from_potree_name(name: &str) -> Result<Self> {
        let digits = name
            .strip_prefix('r')
            .ok_or_else(|| Error::InvalidOctantId(format!("potree name must start with 'r': {name:?}")))?;
        digits.parse()
    }

    /// Potree node name: `"r"` followed by the path digits
    pub fn to_potree_name(&self) -> String {
        format!("r{self}")
    }

    /// Depth of this octant; equals the length of its path
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Child position at `level` (1-based, `1..=self.level()`)
    pub fn digit(&self, level: u8) -> Option<u8> {
        if level == 0 || level > self.level {
            return None;
        }
        Some(((self.bits >> Self::shift(level)) & 0b111) as u8)
    }

    /// Position of this octant inside its parent
    pub fn position_in_parent(&self) -> Option<u8> {
        self.digit(self.level)
    }

    /// Iterator over the path digits, root to leaf
    pub fn digits(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=self.level).filter_map(move |level| self.digit(level))
    }

    /// Id of the child at `position`
    ///
    /// # Panics
    /// If `position > 7` or the id is already at `MAX_LEVEL`.
    pub fn child(&self, position: u8) -> OctantId {
        match self.checked_child(position) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }

    /// Id of the child at `position`, rejecting bad digits and overflow
    pub fn checked_child(&self, position: u8) -> Result<OctantId> {
        if position > 7 {
            return Err(Error::InvalidOctantId(format!("child position {position} is not in 0..=7")));
        }
        if self.level >= MAX_LEVEL {
            return Err(Error::InvalidOctantId(format!("octant {self:?} is already at the maximum level {MAX_LEVEL}")));
        }
        let level = self.level + 1;
        Ok(OctantId {
            bits: self.bits | (u64::from(position) << Self::shift(level)),
            level,
        })
    }

    /// Parent id, `None` for the root
    pub fn parent(&self) -> Option<OctantId> {
        if self.level == 0 {
            return None;
        }
        let mask = 0b111u64 << Self::shift(self.level);
        Some(OctantId {
            bits: self.bits & !mask,
            level: self.level - 1,
        })
    }

    /// True if `self` is a strict ancestor of `other`
    pub fn is_ancestor_of(&self, other: &OctantId) -> bool {
        if self.level >= other.level {
            return false;
        }
        let mut cursor = *other;
        while cursor.level > self.level {
            match cursor.parent() {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
        cursor == *self
    }

    fn shift(level: u8) -> u32 {
        u32::from(MAX_LEVEL - level) * 3
    }
}

impl fmt::Display for OctantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in self.digits() {
            write!(f, "{digit}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for OctantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OctantId(r{self})")
    }
}

impl FromStr for OctantId {
    type Err = Error;

    /// Parse a bare path string (`""` is the root)
    fn from_str(s: &str) -> Result<Self> {
        let mut id = Self::ROOT;
        for c in s.chars() {
            let digit = c
                .to_digit(8)
                .ok_or_else(|| Error::InvalidOctantId(format!("{c:?} is not an octal digit in {s:?}")))?;
            id = id.checked_child(digit as u8)?;
        }
        Ok(id)
    }
}
