//! sea-orm backed implementations of the store and directory traits.

pub mod attendance_repository;
pub mod role_repository;

pub use attendance_repository::SeaOrmEventStore;
pub use role_repository::SeaOrmRoleDirectory;
