pub mod m202510010001_create_members;
pub mod m202510010002_create_courses;
pub mod m202510010003_create_sessions;
pub mod m202510010004_create_member_system_roles;
pub mod m202510010005_create_attendance;
