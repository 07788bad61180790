// src/queue/store.rs

use async_trait::async_trait;
use sqlx::PgPool;

use super::entry::QueueEntryRow;
use super::{DoctorRef, NewQueueEntry, QueueEntry, QueueError, QueueStatus};

/// Persistence for queue entries and the queue-number high-water mark.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Allocates the next number and inserts the entry as one indivisible step.
    async fn insert_next(&self, entry: NewQueueEntry) -> Result<QueueEntry, QueueError>;

    /// Reads the number the next entry would receive without reserving it.
    async fn peek_next_number(&self) -> Result<i32, QueueError>;

    /// Inserts with a caller-chosen number and raises the high-water mark to it.
    async fn insert_numbered(
        &self,
        queue_number: i32,
        entry: NewQueueEntry,
    ) -> Result<QueueEntry, QueueError>;

    async fn find(&self, id: i64) -> Result<Option<QueueEntry>, QueueError>;

    async fn update(&self, entry: &QueueEntry) -> Result<(), QueueError>;

    /// Ordered by ascending queue number, then id.
    async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>, QueueError>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: i64) -> Result<bool, QueueError>;
}

/// Patient and doctor lookups the queue validates references against.
#[async_trait]
pub trait ClinicDirectory: Send + Sync {
    async fn patient_exists(&self, patient_id: i64) -> Result<bool, QueueError>;

    async fn find_doctor(&self, doctor_id: i64) -> Result<Option<DoctorRef>, QueueError>;
}

#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Selected from `queue_entry q JOIN patient p`.
const ENTRY_COLUMNS: &str = "q.id, q.queue_number, q.patient_id, p.name AS patient_name, \
     p.phone AS patient_phone, q.doctor_id, q.status, q.joined_at, q.called_at, q.completed_at";

const PATIENT_JOIN: &str = "JOIN patient p ON p.id = q.patient_id";

// Postgres SQLSTATE for foreign_key_violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";
const DOCTOR_FK: &str = "queue_entry_doctor_id_fkey";

/// A reference that passed the directory check but was gone by insert time.
fn dangling_reference(constraint: Option<&str>, entry: &NewQueueEntry) -> QueueError {
    match (constraint, entry.doctor_id) {
        (Some(DOCTOR_FK), Some(doctor_id)) => QueueError::doctor_not_found(doctor_id),
        _ => QueueError::patient_not_found(entry.patient_id),
    }
}

fn insert_error(e: sqlx::Error, entry: &NewQueueEntry) -> QueueError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            dangling_reference(db.constraint(), entry)
        }
        _ => e.into(),
    }
}

fn insert_sql() -> String {
    format!(
        r#"
        WITH q AS (
            INSERT INTO queue_entry (queue_number, patient_id, doctor_id, status, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        )
        SELECT {ENTRY_COLUMNS}
        FROM q
        {PATIENT_JOIN}
        "#
    )
}

// Highest number ever issued: the persisted mark, or the table max if the
// mark somehow lags behind (rows inserted outside the service).
const NEXT_NUMBER_EXPR: &str =
    "GREATEST(last_number, (SELECT COALESCE(MAX(queue_number), 0) FROM queue_entry)) + 1";

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn insert_next(&self, entry: NewQueueEntry) -> Result<QueueEntry, QueueError> {
        let mut tx = self.pool.begin().await?;

        // The UPDATE takes the counter row lock, so concurrent enqueues queue
        // up here until this transaction commits.
        let queue_number: i32 = sqlx::query_scalar(&format!(
            r#"
            UPDATE queue_counter
            SET last_number = {NEXT_NUMBER_EXPR}
            WHERE singleton_id = TRUE
            RETURNING last_number
            "#
        ))
        .fetch_one(&mut *tx)
        .await?;

        let row: QueueEntryRow = sqlx::query_as::<_, QueueEntryRow>(&insert_sql())
            .bind(queue_number)
            .bind(entry.patient_id)
            .bind(entry.doctor_id)
            .bind(QueueStatus::Waiting.as_str())
            .bind(entry.joined_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| insert_error(e, &entry))?;

        tx.commit().await?;

        row.try_into()
    }

    async fn peek_next_number(&self) -> Result<i32, QueueError> {
        let next: i32 = sqlx::query_scalar(&format!(
            r#"
            SELECT {NEXT_NUMBER_EXPR}
            FROM queue_counter
            WHERE singleton_id = TRUE
            "#
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(next)
    }

    async fn insert_numbered(
        &self,
        queue_number: i32,
        entry: NewQueueEntry,
    ) -> Result<QueueEntry, QueueError> {
        let row: QueueEntryRow = sqlx::query_as::<_, QueueEntryRow>(&insert_sql())
            .bind(queue_number)
            .bind(entry.patient_id)
            .bind(entry.doctor_id)
            .bind(QueueStatus::Waiting.as_str())
            .bind(entry.joined_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| insert_error(e, &entry))?;

        sqlx::query(
            r#"
            UPDATE queue_counter
            SET last_number = GREATEST(last_number, $1)
            WHERE singleton_id = TRUE
            "#,
        )
        .bind(queue_number)
        .execute(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find(&self, id: i64) -> Result<Option<QueueEntry>, QueueError> {
        let row: Option<QueueEntryRow> = sqlx::query_as::<_, QueueEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entry q {PATIENT_JOIN} WHERE q.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn update(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE queue_entry
            SET status = $1,
                doctor_id = $2,
                called_at = $3,
                completed_at = $4,
                updated_at = now()
            WHERE id = $5
            "#,
        )
        .bind(entry.status.as_str())
        .bind(entry.doctor_id)
        .bind(entry.called_at)
        .bind(entry.completed_at)
        .bind(entry.id)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(QueueError::entry_not_found(entry.id));
        }
        Ok(())
    }

    async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>, QueueError> {
        let rows: Vec<QueueEntryRow> = sqlx::query_as::<_, QueueEntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM queue_entry q
            {PATIENT_JOIN}
            WHERE ($1::text IS NULL OR q.status = $1)
            ORDER BY q.queue_number ASC, q.id ASC
            "#
        ))
        .bind(status.map(QueueStatus::as_str))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    async fn delete(&self, id: i64) -> Result<bool, QueueError> {
        let res = sqlx::query("DELETE FROM queue_entry WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl ClinicDirectory for PgQueueStore {
    async fn patient_exists(&self, patient_id: i64) -> Result<bool, QueueError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM patient WHERE id = $1")
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn find_doctor(&self, doctor_id: i64) -> Result<Option<DoctorRef>, QueueError> {
        let row: Option<(i64, bool)> =
            sqlx::query_as("SELECT id, is_available FROM doctor WHERE id = $1")
                .bind(doctor_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, is_available)| DoctorRef { id, is_available }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_entry(patient_id: i64) -> NewQueueEntry {
        NewQueueEntry {
            patient_id,
            doctor_id: None,
            joined_at: Utc::now(),
        }
    }

    async fn seed_patient(pool: &PgPool, name: &str) -> i64 {
        sqlx::query_scalar("INSERT INTO patient (name, phone) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind("555-0100")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn seed_doctor(pool: &PgPool) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO doctor (name, specialization, gender, location) \
             VALUES ('Dr. Okafor', 'general', 'female', 'Room 2') RETURNING id",
        )
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[test]
    fn doctor_constraint_maps_to_the_doctor() {
        let entry = NewQueueEntry {
            patient_id: 7,
            doctor_id: Some(9),
            joined_at: Utc::now(),
        };
        let err = dangling_reference(Some("queue_entry_doctor_id_fkey"), &entry);
        assert_eq!(err.to_string(), "doctor 9 was not found");
    }

    #[test]
    fn other_constraints_map_to_the_patient() {
        let entry = new_entry(7);
        for constraint in [Some("queue_entry_patient_id_fkey"), None] {
            let err = dangling_reference(constraint, &entry);
            assert!(matches!(err, QueueError::NotFound(_)));
            assert_eq!(err.to_string(), "patient 7 was not found");
        }
    }

    // The tests below need a disposable Postgres reachable through DATABASE_URL:
    // DATABASE_URL=postgres://... cargo test -- --ignored

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn insert_next_numbers_sequentially(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let patient = seed_patient(&pool, "Asha Rao").await;

        let mut numbers = Vec::new();
        for _ in 0..3 {
            numbers.push(store.insert_next(new_entry(patient)).await.unwrap().queue_number);
        }

        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.peek_next_number().await.unwrap(), 4);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn deleting_the_highest_entry_does_not_free_its_number(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let patient = seed_patient(&pool, "Asha Rao").await;

        store.insert_next(new_entry(patient)).await.unwrap();
        let second = store.insert_next(new_entry(patient)).await.unwrap();
        assert!(store.delete(second.id).await.unwrap());

        let third = store.insert_next(new_entry(patient)).await.unwrap();
        assert_eq!(third.queue_number, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_inserts_get_distinct_numbers(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let a = seed_patient(&pool, "Asha Rao").await;
        let b = seed_patient(&pool, "Ben Ito").await;

        let (first, second) = tokio::join!(
            store.insert_next(new_entry(a)),
            store.insert_next(new_entry(b)),
        );
        let mut numbers = vec![first.unwrap().queue_number, second.unwrap().queue_number];
        numbers.sort();

        assert_eq!(numbers, vec![1, 2]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn insert_numbered_raises_the_high_water_mark(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let patient = seed_patient(&pool, "Asha Rao").await;

        // two read-then-insert callers that both peeked before either inserted
        let peeked = store.peek_next_number().await.unwrap();
        assert_eq!(store.peek_next_number().await.unwrap(), peeked);
        store.insert_numbered(peeked, new_entry(patient)).await.unwrap();
        store.insert_numbered(peeked, new_entry(patient)).await.unwrap();

        let next = store.insert_next(new_entry(patient)).await.unwrap();
        assert_eq!(next.queue_number, peeked + 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn list_orders_by_number_and_filters_by_status(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let patient = seed_patient(&pool, "Asha Rao").await;

        // out-of-order numbers, as a manual insert could leave them
        let late = store.insert_numbered(5, new_entry(patient)).await.unwrap();
        let early = store.insert_numbered(2, new_entry(patient)).await.unwrap();
        let mut called = store.insert_numbered(3, new_entry(patient)).await.unwrap();
        called.status = QueueStatus::WithDoctor;
        called.called_at = Some(Utc::now());
        store.update(&called).await.unwrap();

        let all: Vec<i64> = store.list(None).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(all, vec![early.id, called.id, late.id]);

        let waiting: Vec<i32> = store
            .list(Some(QueueStatus::Waiting))
            .await
            .unwrap()
            .iter()
            .map(|e| e.queue_number)
            .collect();
        assert_eq!(waiting, vec![2, 5]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn reads_join_the_patient(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let patient = seed_patient(&pool, "Asha Rao").await;

        let inserted = store.insert_next(new_entry(patient)).await.unwrap();
        assert_eq!(inserted.patient.name, "Asha Rao");

        let found = store.find(inserted.id).await.unwrap().unwrap();
        assert_eq!(found.patient.id, patient);
        assert_eq!(found.patient.phone, "555-0100");
        assert_eq!(store.list(None).await.unwrap()[0].patient, found.patient);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn update_of_a_missing_entry_is_not_found(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let patient = seed_patient(&pool, "Asha Rao").await;

        let mut entry = store.insert_next(new_entry(patient)).await.unwrap();
        assert!(store.delete(entry.id).await.unwrap());
        entry.status = QueueStatus::Completed;

        let err = store.update(&entry).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
        assert!(!store.delete(entry.id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn dangling_references_are_not_found_and_burn_no_number(pool: PgPool) {
        let store = PgQueueStore::new(pool.clone());
        let patient = seed_patient(&pool, "Asha Rao").await;
        let doctor = seed_doctor(&pool).await;

        let err = store.insert_next(new_entry(patient + 1000)).await.unwrap_err();
        assert_eq!(err.to_string(), format!("patient {} was not found", patient + 1000));

        let missing_doctor = NewQueueEntry {
            doctor_id: Some(doctor + 1000),
            ..new_entry(patient)
        };
        let err = store.insert_numbered(1, missing_doctor).await.unwrap_err();
        assert_eq!(err.to_string(), format!("doctor {} was not found", doctor + 1000));

        let first = store.insert_next(new_entry(patient)).await.unwrap();
        assert_eq!(first.queue_number, 1);
    }
}
