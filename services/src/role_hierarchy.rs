//! Rank ordering for the two role systems.
//!
//! System roles and course roles are separate types with separate ladders.
//! Nothing here converts one into the other.

use db::models::course_member::CourseRole;
use db::models::member_system_role::SystemRole;

pub trait RoleHierarchy: Copy + Eq + Sized + 'static {
    /// Every role of this hierarchy, lowest first.
    const ALL: &'static [Self];

    fn rank(self) -> u8;

    fn is_higher_or_equal(self, minimum: Self) -> bool {
        self.rank() >= minimum.rank()
    }

    fn is_higher(self, other: Self) -> bool {
        self.rank() > other.rank()
    }

    /// Roles whose capabilities `self` includes, `self` among them.
    fn implied_roles(self) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|r| r.rank() <= self.rank())
            .collect()
    }
}

impl RoleHierarchy for SystemRole {
    const ALL: &'static [Self] = &[
        SystemRole::Member,
        SystemRole::Operator,
        SystemRole::Registrar,
        SystemRole::Auditor,
        SystemRole::Supervisor,
        SystemRole::Admin,
    ];

    fn rank(self) -> u8 {
        match self {
            SystemRole::Member => 0,
            // peers: none outranks the others
            SystemRole::Operator | SystemRole::Registrar | SystemRole::Auditor => 1,
            SystemRole::Supervisor => 2,
            SystemRole::Admin => 3,
        }
    }
}

impl RoleHierarchy for CourseRole {
    const ALL: &'static [Self] = &[CourseRole::Mentee, CourseRole::Mentor, CourseRole::Manager];

    fn rank(self) -> u8 {
        match self {
            CourseRole::Mentee => 0,
            CourseRole::Mentor => 1,
            CourseRole::Manager => 2,
        }
    }
}

/// Highest rank among `roles`, or `None` when the set is empty.
pub fn highest_rank<R, I>(roles: I) -> Option<u8>
where
    R: RoleHierarchy,
    I: IntoIterator<Item = R>,
{
    roles.into_iter().map(R::rank).max()
}
