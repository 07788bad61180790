use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl QueueError {
    pub fn entry_not_found(id: i64) -> Self {
        QueueError::NotFound(format!("queue entry {id} was not found"))
    }

    pub fn patient_not_found(id: i64) -> Self {
        QueueError::NotFound(format!("patient {id} was not found"))
    }

    pub fn doctor_not_found(id: i64) -> Self {
        QueueError::NotFound(format!("doctor {id} was not found"))
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::Storage(err.to_string())
    }
}
