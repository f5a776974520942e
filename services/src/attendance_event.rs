//! Events recorded in an attendance log.
//!
//! The log is append-only; the current status of a record is always a fold
//! over these events (see [`crate::attendance`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Attendance outcome for one member in one session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    LeftEarly,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::LeftEarly,
    ];

    /// Whether the member counts as having attended.
    pub fn is_attended(self) -> bool {
        !matches!(self, AttendanceStatus::Absent)
    }
}

/// Role system through which a correction request was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleTier {
    Course,
    System,
}

/// Standing of the requester when the request was filed. Reviews compare
/// against this, not against the requester's roles at review time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestGrant {
    pub tier: RoleTier,
    pub rank: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AttendanceEvent {
    /// Member checked in to the session.
    CheckedIn { at: DateTime<Utc> },

    /// Member checked out of the session.
    CheckedOut { at: DateTime<Utc> },

    /// A mentor or operator asked for the status to be changed.
    CorrectionRequested {
        at: DateTime<Utc>,
        current_status: AttendanceStatus,
        requested_status: AttendanceStatus,
        reason: String,
        requested_by: i64,
        grant: RequestGrant,
    },

    /// A pending request was approved and the status replaced.
    StatusCorrected {
        at: DateTime<Utc>,
        previous_status: AttendanceStatus,
        new_status: AttendanceStatus,
        reason: String,
        corrected_by: i64,
    },

    /// A pending request was turned down.
    CorrectionRejected {
        at: DateTime<Utc>,
        rejection_reason: String,
        rejected_by: i64,
    },
}

impl AttendanceEvent {
    /// Stable discriminator stored next to the serialized payload.
    pub fn kind(&self) -> &'static str {
        match self {
            AttendanceEvent::CheckedIn { .. } => "checked_in",
            AttendanceEvent::CheckedOut { .. } => "checked_out",
            AttendanceEvent::CorrectionRequested { .. } => "correction_requested",
            AttendanceEvent::StatusCorrected { .. } => "status_corrected",
            AttendanceEvent::CorrectionRejected { .. } => "correction_rejected",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AttendanceEvent::CheckedIn { at }
            | AttendanceEvent::CheckedOut { at }
            | AttendanceEvent::CorrectionRequested { at, .. }
            | AttendanceEvent::StatusCorrected { at, .. }
            | AttendanceEvent::CorrectionRejected { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_json_shape() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let event = AttendanceEvent::CorrectionRequested {
            at,
            current_status: AttendanceStatus::Present,
            requested_status: AttendanceStatus::LeftEarly,
            reason: "left mid-session".into(),
            requested_by: 7,
            grant: RequestGrant {
                tier: RoleTier::Course,
                rank: 1,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CorrectionRequested");
        assert_eq!(json["data"]["requested_status"], "LEFT_EARLY");
        assert_eq!(json["data"]["requested_by"], 7);
        assert_eq!(json["data"]["grant"]["tier"], "COURSE");

        let back: AttendanceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "correction_requested");
        assert_eq!(back.occurred_at(), at);
    }

    #[test]
    fn test_status_parsing_and_attended() {
        assert_eq!(
            "left_early".parse::<AttendanceStatus>().unwrap(),
            AttendanceStatus::LeftEarly
        );
        assert_eq!(AttendanceStatus::Late.to_string(), "LATE");
        assert!(AttendanceStatus::Late.is_attended());
        assert!(!AttendanceStatus::Absent.is_attended());
    }
}
