//! Who may do what.
//!
//! Every mutating board operation asks [`can_perform`] before touching
//! storage. Actions carry the ownership facts the decision depends on, so
//! the policy itself never needs to look anything up.

use crate::{Role, User, UserId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Read topics, comments and ratings
    ViewBoard,
    CreateTopic,
    Like,
    Comment,
    CreateRating,
    Rate,
    DeleteTopic { author: UserId },
    DeleteComment { author: UserId },
    DeleteRating { author: UserId },
    PinTopic,
    /// Close or reopen a rating
    CloseRating,
    CreateAssignment,
    EditAssignment { teacher: UserId },
    ViewAssignments { teacher: UserId },
    ViewAllAssignments,
    DeleteAssignment,
    /// List one's own homework
    ViewHomework,
    ToggleCompletion,
    HideSubjects,
    CreateUser,
    DeleteUser { target: UserId },
    SeedSubjects,
    CleanupAssignments,
}

pub fn can_perform(user: &User, action: Action) -> bool {
    use Action::*;
    match (user.role, action) {
        (Role::Admin, DeleteUser { target }) => target != user.id,
        // admins moderate, they do not do homework
        (Role::Admin, CreateAssignment | ViewHomework | ToggleCompletion | HideSubjects) => false,
        (Role::Admin, _) => true,

        (Role::Student, ViewBoard | CreateTopic | Like | Comment | CreateRating | Rate) => true,
        (Role::Student, ViewHomework | ToggleCompletion | HideSubjects) => true,
        (
            Role::Student,
            DeleteTopic { author } | DeleteComment { author } | DeleteRating { author },
        ) => author == user.id,

        (Role::Teacher, CreateAssignment) => true,
        (Role::Teacher, ViewAssignments { teacher } | EditAssignment { teacher }) => {
            teacher == user.id
        }

        _ => false,
    }
}

/// Whether `viewer` may see who authored a possibly-anonymous entity
pub fn author_visible(viewer: &User, author: UserId, anonymous: bool) -> bool {
    !anonymous || viewer.role == Role::Admin || viewer.id == author
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Uuid;

    fn user(role: Role) -> User {
        User {
            id: UserId(Uuid::new_v4()),
            name: String::from("someone"),
            role,
            student_id: None,
        }
    }

    #[test]
    fn teachers_stay_off_the_board() {
        let t = user(Role::Teacher);
        for a in [Action::ViewBoard, Action::CreateTopic, Action::Like, Action::Rate] {
            assert!(!can_perform(&t, a), "teacher allowed to {a:?}");
        }
        assert!(can_perform(&t, Action::CreateAssignment));
        assert!(can_perform(&t, Action::ViewAssignments { teacher: t.id }));
        assert!(!can_perform(
            &t,
            Action::ViewAssignments {
                teacher: UserId::stub()
            }
        ));
        assert!(can_perform(&t, Action::EditAssignment { teacher: t.id }));
        assert!(!can_perform(
            &t,
            Action::EditAssignment {
                teacher: UserId::stub()
            }
        ));
        assert!(!can_perform(&t, Action::HideSubjects));
    }

    #[test]
    fn students_delete_only_their_own_content() {
        let s = user(Role::Student);
        let other = UserId(Uuid::new_v4());
        assert!(can_perform(&s, Action::DeleteTopic { author: s.id }));
        assert!(!can_perform(&s, Action::DeleteTopic { author: other }));
        assert!(can_perform(&s, Action::DeleteComment { author: s.id }));
        assert!(!can_perform(&s, Action::DeleteComment { author: other }));
        assert!(!can_perform(&s, Action::DeleteRating { author: other }));
        assert!(!can_perform(&s, Action::PinTopic));
        assert!(!can_perform(&s, Action::CreateAssignment));
        assert!(can_perform(&s, Action::ToggleCompletion));
        assert!(!can_perform(&s, Action::ViewAllAssignments));
        assert!(!can_perform(&s, Action::CloseRating));
        assert!(can_perform(&s, Action::HideSubjects));
    }

    #[test]
    fn admins_moderate_everything_but_themselves() {
        let a = user(Role::Admin);
        let other = UserId(Uuid::new_v4());
        assert!(can_perform(&a, Action::PinTopic));
        assert!(can_perform(&a, Action::DeleteComment { author: other }));
        assert!(can_perform(&a, Action::DeleteUser { target: other }));
        assert!(!can_perform(&a, Action::DeleteUser { target: a.id }));
        assert!(can_perform(&a, Action::CleanupAssignments));
        assert!(!can_perform(&a, Action::ToggleCompletion));
        assert!(can_perform(&a, Action::ViewAllAssignments));
        assert!(can_perform(&a, Action::DeleteAssignment));
        assert!(can_perform(&a, Action::CloseRating));
        assert!(can_perform(
            &a,
            Action::EditAssignment {
                teacher: UserId::stub()
            }
        ));
        assert!(!can_perform(&a, Action::HideSubjects));
    }

    #[test]
    fn anonymity() {
        let author = user(Role::Student);
        let reader = user(Role::Student);
        let admin = user(Role::Admin);
        assert!(author_visible(&reader, author.id, false));
        assert!(!author_visible(&reader, author.id, true));
        assert!(author_visible(&author, author.id, true));
        assert!(author_visible(&admin, author.id, true));
    }
}
