//! Walk-in queue: sequential ticket numbers and the entry status tracker.
//!
//! Numbers come from the highest number ever issued, so a deleted entry's
//! number is never handed out again. How allocation interacts with concurrent
//! callers is chosen by [`NumberingMode`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

mod entry;
mod error;
#[cfg(test)]
pub mod memory;
mod status;
pub mod store;

pub use entry::{DoctorRef, NewQueueEntry, PatientSummary, QueueEntry};
pub use error::QueueError;
pub use status::QueueStatus;
pub use store::{ClinicDirectory, PgQueueStore, QueueStore};

/// Source of "now" for intake and transition timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock UTC time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How `enqueue` turns "read the next number" and "insert" into storage calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NumberingMode {
    /// One atomic storage operation; concurrent intakes never share a number.
    #[default]
    Serialized,
    /// Read then insert as two calls. Concurrent intakes may share a number.
    Unguarded,
}

impl NumberingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            NumberingMode::Serialized => "serialized",
            NumberingMode::Unguarded => "unguarded",
        }
    }
}

impl fmt::Display for NumberingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NumberingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serialized" => Ok(NumberingMode::Serialized),
            "unguarded" => Ok(NumberingMode::Unguarded),
            other => Err(format!(
                "unknown queue numbering mode {other:?} (expected serialized or unguarded)"
            )),
        }
    }
}

pub struct QueueService {
    store: Arc<dyn QueueStore>,
    directory: Arc<dyn ClinicDirectory>,
    clock: Arc<dyn Clock>,
    numbering: NumberingMode,
}

impl QueueService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        directory: Arc<dyn ClinicDirectory>,
        clock: Arc<dyn Clock>,
        numbering: NumberingMode,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            numbering,
        }
    }

    pub fn numbering(&self) -> NumberingMode {
        self.numbering
    }

    pub async fn enqueue(
        &self,
        patient_id: i64,
        doctor_id: Option<i64>,
    ) -> Result<QueueEntry, QueueError> {
        if !self.directory.patient_exists(patient_id).await? {
            return Err(QueueError::patient_not_found(patient_id));
        }
        if let Some(doctor_id) = doctor_id {
            self.ensure_doctor(doctor_id).await?;
        }

        let new = NewQueueEntry {
            patient_id,
            doctor_id,
            joined_at: self.clock.now(),
        };

        let entry = match self.numbering {
            NumberingMode::Serialized => self.store.insert_next(new).await?,
            NumberingMode::Unguarded => {
                let next = self.store.peek_next_number().await?;
                self.store.insert_numbered(next, new).await?
            }
        };

        tracing::info!(
            entry_id = entry.id,
            queue_number = entry.queue_number,
            patient_id,
            doctor_id = ?entry.doctor_id,
            "patient joined walk-in queue"
        );
        Ok(entry)
    }

    pub async fn transition(
        &self,
        entry_id: i64,
        status: QueueStatus,
        doctor_id: Option<i64>,
    ) -> Result<QueueEntry, QueueError> {
        let mut entry = self.get(entry_id).await?;

        if status == QueueStatus::WithDoctor {
            if let Some(doctor_id) = doctor_id {
                self.ensure_doctor(doctor_id).await?;
            }
        }

        let previous = entry.status;
        entry.apply_transition(status, doctor_id, self.clock.now());
        self.store.update(&entry).await?;

        tracing::info!(
            entry_id,
            queue_number = entry.queue_number,
            from = %previous,
            to = %status,
            "queue entry status changed"
        );
        Ok(entry)
    }

    pub async fn get(&self, entry_id: i64) -> Result<QueueEntry, QueueError> {
        self.store
            .find(entry_id)
            .await?
            .ok_or_else(|| QueueError::entry_not_found(entry_id))
    }

    pub async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>, QueueError> {
        self.store.list(status).await
    }

    /// Entries still waiting to be called.
    pub async fn current(&self) -> Result<Vec<QueueEntry>, QueueError> {
        self.list(Some(QueueStatus::Waiting)).await
    }

    pub async fn remove(&self, entry_id: i64) -> Result<(), QueueError> {
        if !self.store.delete(entry_id).await? {
            return Err(QueueError::entry_not_found(entry_id));
        }
        tracing::info!(entry_id, "queue entry removed");
        Ok(())
    }

    async fn ensure_doctor(&self, doctor_id: i64) -> Result<DoctorRef, QueueError> {
        let doctor = self
            .directory
            .find_doctor(doctor_id)
            .await?
            .ok_or_else(|| QueueError::doctor_not_found(doctor_id))?;

        // availability is informational only; an unavailable doctor can still be assigned
        if !doctor.is_available {
            tracing::info!(doctor_id = doctor.id, "doctor marked unavailable assigned to queue entry");
        }
        Ok(doctor)
    }
}
