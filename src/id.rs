use uuid::Uuid;

/// Time-ordered identifier for rows created by the SQLite store.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}
