pub mod attendance;
pub mod attendance_event;
pub mod course;
pub mod course_member;
pub mod member;
pub mod member_system_role;
pub mod session;

pub use attendance::Entity as Attendance;
pub use attendance_event::Entity as AttendanceEvent;
pub use course::Entity as Course;
pub use course_member::Entity as CourseMember;
pub use member::Entity as Member;
pub use member_system_role::Entity as MemberSystemRole;
pub use session::Entity as Session;
