use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// The five teaching-content categories a unit can be labeled with.
///
/// Declaration order is significant: it is the tie-break order for
/// classification and the iteration order of every per-label structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InfoType {
    Definition,
    Mechanism,
    Procedure,
    Comparison,
    Example,
}

impl InfoType {
    pub const ALL: [InfoType; 5] = [
        InfoType::Definition,
        InfoType::Mechanism,
        InfoType::Procedure,
        InfoType::Comparison,
        InfoType::Example,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InfoType::Definition => "Definition",
            InfoType::Mechanism => "Mechanism",
            InfoType::Procedure => "Procedure",
            InfoType::Comparison => "Comparison",
            InfoType::Example => "Example",
        }
    }

    /// Scorer prior for structurally valuable label types.
    pub fn prior(self) -> f64 {
        match self {
            InfoType::Definition => 0.05,
            InfoType::Mechanism => 0.10,
            InfoType::Procedure => 0.12,
            InfoType::Comparison => 0.10,
            InfoType::Example => 0.05,
        }
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfoType {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InfoType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| InputError::UnknownLabel(s.to_string()))
    }
}
