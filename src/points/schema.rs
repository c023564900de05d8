//! Point layout descriptor
//!
//! A point cloud stores a double-precision position plus any combination of
//! color, normal, intensity and classification label. Instead of one type per
//! combination, a `PointSchema` names which optional attributes are present and
//! drives a single conversion path.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Which attributes a point cloud's records carry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointSchema {
    pub position: bool,
    pub color: bool,
    pub normal: bool,
    pub intensity: bool,
    pub label: bool,
}

impl PointSchema {
    /// No attributes at all; rejected wherever a schema is required
    pub const UNDEFINED: Self = Self::with(false, false, false, false, false);

    pub const POS_D3: Self = Self::with(true, false, false, false, false);
    pub const POS_D3_COL_F3: Self = Self::with(true, true, false, false, false);
    pub const POS_D3_IN_US: Self = Self::with(true, false, false, true, false);
    pub const POS_D3_COL_F3_IN_US: Self = Self::with(true, true, false, true, false);
    pub const POS_D3_LBL_B: Self = Self::with(true, false, false, false, true);
    pub const POS_D3_COL_F3_LBL_B: Self = Self::with(true, true, false, false, true);
    pub const POS_D3_NOR_F3_COL_F3: Self = Self::with(true, true, true, false, false);
    pub const POS_D3_NOR_F3_IN_US: Self = Self::with(true, false, true, true, false);
    pub const POS_D3_NOR_F3_COL_F3_IN_US: Self = Self::with(true, true, true, true, false);
    pub const POS_D3_COL_F3_IN_US_LBL_B: Self = Self::with(true, true, false, true, true);

    const fn with(position: bool, color: bool, normal: bool, intensity: bool, label: bool) -> Self {
        Self { position, color, normal, intensity, label }
    }

    /// A schema is usable only if it carries positions
    pub fn is_defined(&self) -> bool {
        self.position
    }

    /// Reject `UNDEFINED` and any layout without positions
    pub fn validate(&self) -> Result<()> {
        if self.is_defined() {
            Ok(())
        } else {
            Err(Error::UndefinedPointSchema)
        }
    }

    /// Legacy layout name, e.g. `PosD3ColF3InUs`
    pub fn name(&self) -> String {
        if !self.is_defined() {
            return "Undefined".to_string();
        }
        let mut name = String::from("PosD3");
        if self.normal {
            name.push_str("NorF3");
        }
        if self.color {
            name.push_str("ColF3");
        }
        if self.intensity {
            name.push_str("InUs");
        }
        if self.label {
            name.push_str("LblB");
        }
        name
    }
}

impl fmt::Display for PointSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
