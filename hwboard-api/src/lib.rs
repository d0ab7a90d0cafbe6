use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Unwraps a `Result<_, Error>` inside a board operation, returning the
/// domain error as the operation's (successful) outcome.
macro_rules! api_try {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        }
    };
}

macro_rules! ensure_allowed {
    ($actor:expr, $action:expr) => {{
        let actor: &$crate::User = $actor;
        let action = $action;
        if !$crate::policy::can_perform(actor, action) {
            tracing::debug!(user = ?actor.id, ?action, "refusing action");
            return Ok(Err($crate::Error::PermissionDenied));
        }
    }};
}

mod assignment;
pub use assignment::{
    assignment_detail, cleanup_assignments, cleanup_cutoff, create_assignment,
    delete_assignment, student_assignments, teacher_assignments, toggle_completion,
    update_assignment, Assignment, AssignmentDetail, AssignmentId, AssignmentStats,
    AssignmentUpdate, CleanupReport, CleanupRequest, CompletionRecord, Homework, NewAssignment,
    StudentRecord, DEFAULT_CLEANUP_DAYS, NO_DESCRIPTION,
};

mod auth;
pub use auth::{AuthToken, NewSession};

mod comment;
pub use comment::{
    comment_stats, create_comment, delete_comment, hot_comments, list_comments, list_replies,
    Comment, CommentId, NewComment, Thread,
};

mod db;
pub use db::Db;

mod error;
pub use error::Error;

pub mod heat;
pub use heat::{CommentStats, Heat, RatingStats, TopicStats};

mod like;
pub use like::{toggle_like, LikeTarget, LikeToggle};

pub mod policy;

pub mod rank;
pub use rank::{Page, Ranked, RatingOrder};

mod rating;
pub use rating::{
    create_rating, delete_rating, list_ratings, rate, rating_detail, rating_stats,
    toggle_rating_active, NewRating, NewScore, Rating, RatingFilter, RatingId, RatingView,
    UserRating,
};

mod subject;
pub use subject::{
    hidden_subjects, seed_subjects, set_hidden_subjects, Subject, SubjectId, DEFAULT_SUBJECTS,
};

mod topic;
pub use topic::{
    create_topic, delete_topic, leaderboard, recent_topics, toggle_pin, topic_detail,
    topic_stats, NewTopic, Topic, TopicId, TopicView,
};

mod user;
pub use user::{create_user, delete_user, NewUser, Role, User, UserId};

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
