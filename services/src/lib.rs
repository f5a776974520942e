pub mod attendance;
pub mod attendance_event;
pub mod attendance_service;
pub mod authorization;
pub mod clock;
pub mod correction;
pub mod error;
pub mod event_store;
pub mod repositories;
pub mod role_hierarchy;

pub use attendance::{Attendance, CorrectionState, PendingCorrection};
pub use attendance_event::{AttendanceEvent, AttendanceStatus, RequestGrant, RoleTier};
pub use attendance_service::{
    ApproveCorrection, AttendanceKey, AttendanceService, AttendanceSummary,
    CourseAttendanceStatistics, CourseAttendanceSummary, RejectCorrection, RequestCorrection,
    SessionStatus,
};
pub use authorization::{
    AuthorizationResolver, InMemoryRoleDirectory, ReviewAuthority, RoleDirectory, SessionScope,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use correction::CorrectionWorkflow;
pub use error::{AttendanceError, ErrorKind};
pub use event_store::{EventStore, InMemoryEventStore};
pub use role_hierarchy::RoleHierarchy;

pub use db::models::course_member::CourseRole;
pub use db::models::member_system_role::SystemRole;
