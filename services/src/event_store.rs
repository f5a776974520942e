use crate::attendance::Attendance;
use crate::error::AttendanceError;
use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Append-only persistence of attendance logs, keyed by (session, member).
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_by_session_and_member(
        &self,
        session_id: i64,
        member_id: i64,
    ) -> Result<Option<Attendance>, AttendanceError>;

    /// Writes the uncommitted events of `attendance`.
    ///
    /// Fails with [`AttendanceError::ConcurrencyConflict`] when the stored
    /// version differs from `attendance.version()`, including when a record
    /// for the same pair was created since `attendance` was loaded. On
    /// success the returned aggregate has its id, the next version, and no
    /// uncommitted events.
    async fn append(&self, attendance: Attendance) -> Result<Attendance, AttendanceError>;

    /// Records of `member_id` in any of `session_ids`. Missing pairs are skipped.
    async fn find_by_member(
        &self,
        member_id: i64,
        session_ids: &[i64],
    ) -> Result<Vec<Attendance>, AttendanceError>;
}

#[derive(Debug, Clone)]
struct StoredAttendance {
    id: i64,
    version: i64,
    events: Vec<crate::attendance_event::AttendanceEvent>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    records: HashMap<(i64, i64), StoredAttendance>,
}

/// Keeps every log in memory behind one async mutex.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: Mutex<MemoryState>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn find_by_session_and_member(
        &self,
        session_id: i64,
        member_id: i64,
    ) -> Result<Option<Attendance>, AttendanceError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&(session_id, member_id)).map(|r| {
            Attendance::rehydrate(r.id, session_id, member_id, r.version, r.events.clone())
        }))
    }

    async fn append(&self, attendance: Attendance) -> Result<Attendance, AttendanceError> {
        let key = (attendance.session_id(), attendance.member_id());
        let mut state = self.state.lock().await;

        let expected = attendance.version();
        let actual = state.records.get(&key).map(|r| r.version).unwrap_or(0);
        if actual != expected {
            warn!(
                "Version conflict on attendance session={} member={}: expected {expected}, found {actual}",
                key.0, key.1
            );
            return Err(AttendanceError::ConcurrencyConflict { expected, actual });
        }

        if attendance.uncommitted_events().is_empty() {
            return Ok(attendance);
        }

        let existing = state.records.get(&key).map(|r| r.id);
        let id = match existing {
            Some(id) => id,
            None => {
                state.next_id += 1;
                state.next_id
            }
        };
        let record = state.records.entry(key).or_insert_with(|| StoredAttendance {
            id,
            version: 0,
            events: Vec::new(),
        });
        record
            .events
            .extend_from_slice(attendance.uncommitted_events());
        record.version += 1;

        Ok(attendance.mark_persisted(id))
    }

    async fn find_by_member(
        &self,
        member_id: i64,
        session_ids: &[i64],
    ) -> Result<Vec<Attendance>, AttendanceError> {
        let state = self.state.lock().await;
        Ok(session_ids
            .iter()
            .filter_map(|&session_id| {
                state.records.get(&(session_id, member_id)).map(|r| {
                    Attendance::rehydrate(r.id, session_id, member_id, r.version, r.events.clone())
                })
            })
            .collect())
    }
}
