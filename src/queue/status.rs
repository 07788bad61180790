use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::QueueError;

/// Where a walk-in patient currently is in the visit.
///
/// Any status may be overwritten with any other; `Completed` and `Cancelled`
/// are only terminal by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    WithDoctor,
    Completed,
    Cancelled,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 4] = [
        QueueStatus::Waiting,
        QueueStatus::WithDoctor,
        QueueStatus::Completed,
        QueueStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::WithDoctor => "with_doctor",
            QueueStatus::Completed => "completed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal_by_convention(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        QueueStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| {
                QueueError::ValidationFailed(format!(
                    "status must be one of waiting, with_doctor, completed, cancelled (got {wanted:?})"
                ))
            })
    }
}
