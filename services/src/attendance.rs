use crate::attendance_event::{AttendanceEvent, AttendanceStatus, RequestGrant};
use crate::clock::Clock;
use crate::error::AttendanceError;
use chrono::{DateTime, Utc};

/// Running state of the status fold.
///
/// `derived` tracks what check-ins say; `corrected` holds the override set by
/// an approved correction until the next check-in or check-out clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatusFold {
    derived: AttendanceStatus,
    corrected: Option<AttendanceStatus>,
}

impl Default for StatusFold {
    fn default() -> Self {
        Self {
            derived: AttendanceStatus::Absent,
            corrected: None,
        }
    }
}

impl StatusFold {
    fn apply(mut self, event: &AttendanceEvent) -> Self {
        match event {
            AttendanceEvent::CheckedIn { .. } => {
                self.derived = AttendanceStatus::Present;
                self.corrected = None;
            }
            AttendanceEvent::CheckedOut { .. } => {
                self.corrected = None;
            }
            AttendanceEvent::StatusCorrected { new_status, .. } => {
                self.corrected = Some(*new_status);
            }
            AttendanceEvent::CorrectionRequested { .. } => {}
            AttendanceEvent::CorrectionRejected { .. } => {}
        }
        self
    }

    fn status(self) -> AttendanceStatus {
        self.corrected.unwrap_or(self.derived)
    }
}

/// Full recompute of the final status of a log.
pub fn fold_status(events: &[AttendanceEvent]) -> AttendanceStatus {
    events
        .iter()
        .fold(StatusFold::default(), StatusFold::apply)
        .status()
}

/// An unresolved correction request, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCorrection {
    pub requested_at: DateTime<Utc>,
    pub current_status: AttendanceStatus,
    pub requested_status: AttendanceStatus,
    pub reason: String,
    pub requested_by: i64,
    pub grant: RequestGrant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionState {
    Idle,
    PendingCorrection(PendingCorrection),
}

impl CorrectionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, CorrectionState::Idle)
    }
}

/// Attendance of one member in one session: the aggregate root.
///
/// Events are only ever appended. `version` is the number of successful
/// store appends this instance has seen and is what the store compares
/// against on the next append.
#[derive(Debug, Clone, PartialEq)]
pub struct Attendance {
    id: Option<i64>,
    session_id: i64,
    member_id: i64,
    events: Vec<AttendanceEvent>,
    version: i64,
    fold: StatusFold,
    persisted: usize,
}

impl Attendance {
    /// A record with an empty log that has never been stored.
    pub fn new(session_id: i64, member_id: i64) -> Self {
        Self {
            id: None,
            session_id,
            member_id,
            events: Vec::new(),
            version: 0,
            fold: StatusFold::default(),
            persisted: 0,
        }
    }

    /// Rebuilds a stored record; every event given is treated as persisted.
    pub fn rehydrate(
        id: i64,
        session_id: i64,
        member_id: i64,
        version: i64,
        events: Vec<AttendanceEvent>,
    ) -> Self {
        let fold = events.iter().fold(StatusFold::default(), StatusFold::apply);
        let persisted = events.len();
        Self {
            id: Some(id),
            session_id,
            member_id,
            events,
            version,
            fold,
            persisted,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn member_id(&self) -> i64 {
        self.member_id
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn events(&self) -> &[AttendanceEvent] {
        &self.events
    }

    /// Number of events already written to the store.
    pub fn persisted_len(&self) -> usize {
        self.persisted
    }

    pub fn uncommitted_events(&self) -> &[AttendanceEvent] {
        &self.events[self.persisted..]
    }

    /// Status maintained incrementally on every append.
    pub fn final_status(&self) -> AttendanceStatus {
        self.fold.status()
    }

    /// Status recomputed from the whole log.
    pub fn fold_status(&self) -> AttendanceStatus {
        fold_status(&self.events)
    }

    /// Whether the latest check-in has not been followed by a check-out.
    pub fn is_checked_in(&self) -> bool {
        self.events
            .iter()
            .rev()
            .find_map(|e| match e {
                AttendanceEvent::CheckedIn { .. } => Some(true),
                AttendanceEvent::CheckedOut { .. } => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Reads the correction state from the tail of the log.
    pub fn correction_state(&self) -> CorrectionState {
        for event in self.events.iter().rev() {
            match event {
                AttendanceEvent::StatusCorrected { .. }
                | AttendanceEvent::CorrectionRejected { .. } => return CorrectionState::Idle,
                AttendanceEvent::CorrectionRequested {
                    at,
                    current_status,
                    requested_status,
                    reason,
                    requested_by,
                    grant,
                } => {
                    return CorrectionState::PendingCorrection(PendingCorrection {
                        requested_at: *at,
                        current_status: *current_status,
                        requested_status: *requested_status,
                        reason: reason.clone(),
                        requested_by: *requested_by,
                        grant: *grant,
                    });
                }
                AttendanceEvent::CheckedIn { .. } | AttendanceEvent::CheckedOut { .. } => {}
            }
        }
        CorrectionState::Idle
    }

    pub fn check_in(&mut self, clock: &dyn Clock) -> Result<(), AttendanceError> {
        if self.is_checked_in() {
            return Err(AttendanceError::AlreadyCheckedIn);
        }
        self.record(AttendanceEvent::CheckedIn { at: clock.now() });
        Ok(())
    }

    pub fn check_out(&mut self, clock: &dyn Clock) -> Result<(), AttendanceError> {
        if !self.is_checked_in() {
            return Err(AttendanceError::NotCheckedIn);
        }
        self.record(AttendanceEvent::CheckedOut { at: clock.now() });
        Ok(())
    }

    /// Appends an event without checking any invariant. Callers in this
    /// crate check first.
    pub(crate) fn record(&mut self, event: AttendanceEvent) {
        self.fold = self.fold.apply(&event);
        self.events.push(event);
    }

    /// Called by a store after it has durably written the uncommitted events.
    pub(crate) fn mark_persisted(mut self, id: i64) -> Self {
        self.id = Some(id);
        self.version += 1;
        self.persisted = self.events.len();
        self
    }
}
