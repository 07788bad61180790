//! In-process queue storage for tests.
//!
//! Each call yields once where a real database would round-trip, so
//! concurrently driven futures interleave the same way requests would.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::store::{ClinicDirectory, QueueStore};
use super::{DoctorRef, NewQueueEntry, PatientSummary, QueueEntry, QueueError, QueueStatus};

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<i64, QueueEntry>,
    last_id: i64,
    high_water: i32,
    patients: HashMap<i64, PatientSummary>,
    doctors: HashMap<i64, bool>,
}

impl MemoryState {
    fn next_number(&self) -> i32 {
        let table_max = self
            .entries
            .values()
            .map(|e| e.queue_number)
            .max()
            .unwrap_or(0);
        self.high_water.max(table_max) + 1
    }

    fn insert(&mut self, queue_number: i32, new: NewQueueEntry) -> Result<QueueEntry, QueueError> {
        // same outcome as the foreign key on queue_entry.patient_id
        let patient = self
            .patients
            .get(&new.patient_id)
            .cloned()
            .ok_or_else(|| QueueError::patient_not_found(new.patient_id))?;

        self.last_id += 1;
        self.high_water = self.high_water.max(queue_number);

        let entry = QueueEntry {
            id: self.last_id,
            queue_number,
            patient_id: new.patient_id,
            patient,
            doctor_id: new.doctor_id,
            status: QueueStatus::Waiting,
            joined_at: new.joined_at,
            called_at: None,
            completed_at: None,
        };
        self.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }
}

#[derive(Default)]
pub struct MemoryQueueStore {
    state: Mutex<MemoryState>,
}

impl MemoryQueueStore {
    /// Patients get a generated name and phone derived from their id.
    pub fn with_directory(patients: &[i64], doctors: &[(i64, bool)]) -> Self {
        let state = MemoryState {
            patients: patients
                .iter()
                .map(|&id| {
                    let summary = PatientSummary {
                        id,
                        name: format!("Patient {id}"),
                        phone: format!("555-{id:04}"),
                    };
                    (id, summary)
                })
                .collect(),
            doctors: doctors.iter().copied().collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert_next(&self, entry: NewQueueEntry) -> Result<QueueEntry, QueueError> {
        let mut state = self.state.lock().await;
        // held across the round trip, like the counter row lock
        tokio::task::yield_now().await;
        let number = state.next_number();
        state.insert(number, entry)
    }

    async fn peek_next_number(&self) -> Result<i32, QueueError> {
        Ok(self.state.lock().await.next_number())
    }

    async fn insert_numbered(
        &self,
        queue_number: i32,
        entry: NewQueueEntry,
    ) -> Result<QueueEntry, QueueError> {
        tokio::task::yield_now().await;
        self.state.lock().await.insert(queue_number, entry)
    }

    async fn find(&self, id: i64) -> Result<Option<QueueEntry>, QueueError> {
        Ok(self.state.lock().await.entries.get(&id).cloned())
    }

    async fn update(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(&entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                Ok(())
            }
            None => Err(QueueError::entry_not_found(entry.id)),
        }
    }

    async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>, QueueError> {
        let state = self.state.lock().await;
        let mut out: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.queue_number, e.id));
        Ok(out)
    }

    async fn delete(&self, id: i64) -> Result<bool, QueueError> {
        Ok(self.state.lock().await.entries.remove(&id).is_some())
    }
}

#[async_trait]
impl ClinicDirectory for MemoryQueueStore {
    async fn patient_exists(&self, patient_id: i64) -> Result<bool, QueueError> {
        Ok(self.state.lock().await.patients.contains_key(&patient_id))
    }

    async fn find_doctor(&self, doctor_id: i64) -> Result<Option<DoctorRef>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.doctors.get(&doctor_id).map(|&is_available| DoctorRef {
            id: doctor_id,
            is_available,
        }))
    }
}
