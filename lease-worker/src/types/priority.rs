use serde::{Deserialize, Serialize};

/// Priority hint carried by a task (lower values = more urgent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Most urgent value
    pub const HIGHEST: Priority = Priority(0);

    /// Mid-scale default
    pub const NORMAL: Priority = Priority(5);

    /// Least urgent value
    pub const LOWEST: Priority = Priority(9);

    /// Create a priority, clamping into the 0..=9 scale
    pub fn new(value: u8) -> Self {
        Self(value.min(Self::LOWEST.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Check if this priority is more urgent than `other`
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Any integer is accepted on the wire and clamped into the scale
impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self(value.clamp(Self::HIGHEST.0.into(), Self::LOWEST.0.into()) as u8)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
