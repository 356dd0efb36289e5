/// Opaque, collision-free task identifier (UUIDv7, time ordered).
pub type TaskId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
