use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{QueueError, QueueStatus};

/// The patient fields the front desk shows next to a queue number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientSummary {
    pub id: i64,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_number: i32,
    pub patient_id: i64,
    pub patient: PatientSummary,
    pub doctor_id: Option<i64>,
    pub status: QueueStatus,
    pub joined_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Overwrites the status and stamps the matching timestamp.
    ///
    /// `with_doctor` refreshes `called_at` on every call and takes the new
    /// doctor when one is given. `completed` refreshes `completed_at`.
    /// Nothing is ever cleared.
    pub fn apply_transition(
        &mut self,
        status: QueueStatus,
        doctor_id: Option<i64>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        match status {
            QueueStatus::WithDoctor => {
                self.called_at = Some(now);
                if let Some(doctor_id) = doctor_id {
                    self.doctor_id = Some(doctor_id);
                }
            }
            QueueStatus::Completed => self.completed_at = Some(now),
            QueueStatus::Waiting | QueueStatus::Cancelled => {}
        }
    }
}

/// Intake data for an entry that has not been numbered yet.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoctorRef {
    pub id: i64,
    pub is_available: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QueueEntryRow {
    pub id: i64,
    pub queue_number: i32,
    pub patient_id: i64,
    pub patient_name: String,
    pub patient_phone: String,
    pub doctor_id: Option<i64>,
    pub status: String,
    pub joined_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueEntryRow> for QueueEntry {
    type Error = QueueError;

    fn try_from(row: QueueEntryRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<QueueStatus>()
            .map_err(|_| QueueError::Storage(format!("unknown status {:?} in row {}", row.status, row.id)))?;

        Ok(QueueEntry {
            id: row.id,
            queue_number: row.queue_number,
            patient_id: row.patient_id,
            patient: PatientSummary {
                id: row.patient_id,
                name: row.patient_name,
                phone: row.patient_phone,
            },
            doctor_id: row.doctor_id,
            status,
            joined_at: row.joined_at,
            called_at: row.called_at,
            completed_at: row.completed_at,
        })
    }
}
