use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    Assignment, AssignmentId, Comment, CommentId, CompletionRecord, LikeTarget, NewUser, Rating,
    RatingId, Role, Subject, SubjectId, Thread, Time, Topic, TopicId, User, UserId,
};

/// Storage seen by the board operations.
///
/// Methods named `count_*` or `average_*` are aggregate queries over the
/// related rows, linear in the number of those rows: callers that need a
/// count several times should keep it rather than ask again. Methods
/// named `insert_*` return `false` when a uniqueness constraint refused
/// the row, and `delete_*` return `false` when there was nothing to
/// delete. Deletions cascade as the data model requires.
#[async_trait]
pub trait Db: Send {
    async fn fetch_user(&mut self, u: UserId) -> anyhow::Result<Option<User>>;
    async fn user_name_taken(&mut self, name: &str) -> anyhow::Result<bool>;
    async fn list_users(&mut self, role: Role) -> anyhow::Result<Vec<User>>;
    async fn insert_user(&mut self, u: &NewUser) -> anyhow::Result<bool>;
    async fn delete_user(&mut self, u: UserId) -> anyhow::Result<bool>;

    async fn fetch_topic(&mut self, t: TopicId) -> anyhow::Result<Option<Topic>>;
    async fn list_topics(&mut self) -> anyhow::Result<Vec<Topic>>;
    async fn insert_topic(&mut self, t: &Topic) -> anyhow::Result<bool>;
    async fn set_topic_pinned(&mut self, t: TopicId, pinned: bool) -> anyhow::Result<()>;
    async fn delete_topic(&mut self, t: TopicId) -> anyhow::Result<bool>;

    async fn fetch_comment(&mut self, c: CommentId) -> anyhow::Result<Option<Comment>>;
    async fn list_top_level_comments(&mut self, t: Thread) -> anyhow::Result<Vec<Comment>>;
    async fn list_replies(&mut self, c: CommentId) -> anyhow::Result<Vec<Comment>>;
    async fn insert_comment(&mut self, c: &Comment) -> anyhow::Result<bool>;
    async fn delete_comment(&mut self, c: CommentId) -> anyhow::Result<bool>;
    async fn count_replies(&mut self, c: CommentId) -> anyhow::Result<u64>;
    /// Counts every comment of the thread, replies included
    async fn count_comments(&mut self, t: Thread) -> anyhow::Result<u64>;

    async fn count_likes(&mut self, t: LikeTarget) -> anyhow::Result<u64>;
    async fn has_liked(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool>;
    async fn insert_like(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool>;
    async fn delete_like(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool>;

    async fn fetch_rating(&mut self, r: RatingId) -> anyhow::Result<Option<Rating>>;
    async fn list_active_ratings(&mut self) -> anyhow::Result<Vec<Rating>>;
    async fn insert_rating(&mut self, r: &Rating) -> anyhow::Result<bool>;
    async fn set_rating_active(&mut self, r: RatingId, active: bool) -> anyhow::Result<()>;
    async fn delete_rating(&mut self, r: RatingId) -> anyhow::Result<bool>;
    /// Inserts or overwrites the score of `u` for `r`
    async fn upsert_user_rating(&mut self, r: RatingId, u: UserId, score: u8)
        -> anyhow::Result<()>;
    async fn user_score(&mut self, r: RatingId, u: UserId) -> anyhow::Result<Option<u8>>;
    async fn count_user_ratings(&mut self, r: RatingId) -> anyhow::Result<u64>;
    async fn average_score(&mut self, r: RatingId) -> anyhow::Result<Option<f64>>;

    async fn list_subjects(&mut self) -> anyhow::Result<Vec<Subject>>;
    async fn insert_subject(&mut self, s: &Subject) -> anyhow::Result<bool>;
    async fn list_hidden_subjects(&mut self, u: UserId) -> anyhow::Result<Vec<SubjectId>>;
    /// Replaces the whole set of subjects hidden by `u`
    async fn set_hidden_subjects(&mut self, u: UserId, s: &[SubjectId]) -> anyhow::Result<()>;

    async fn fetch_assignment(&mut self, a: AssignmentId) -> anyhow::Result<Option<Assignment>>;
    /// Lists the assignments of `teacher`, or all of them when `None`
    async fn list_assignments(
        &mut self,
        teacher: Option<UserId>,
    ) -> anyhow::Result<Vec<Assignment>>;
    async fn list_assignments_created_before(
        &mut self,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>>;
    async fn insert_assignment(&mut self, a: &Assignment) -> anyhow::Result<bool>;
    /// Overwrites everything but the id, teacher and creation time
    async fn update_assignment(&mut self, a: &Assignment) -> anyhow::Result<bool>;
    async fn delete_assignment(&mut self, a: AssignmentId) -> anyhow::Result<bool>;
    async fn insert_completion_record(
        &mut self,
        student: UserId,
        a: AssignmentId,
    ) -> anyhow::Result<bool>;
    async fn list_completion_records(
        &mut self,
        student: UserId,
    ) -> anyhow::Result<Vec<CompletionRecord>>;
    async fn list_assignment_records(
        &mut self,
        a: AssignmentId,
    ) -> anyhow::Result<Vec<CompletionRecord>>;
    async fn fetch_completion_record(
        &mut self,
        student: UserId,
        a: AssignmentId,
    ) -> anyhow::Result<Option<CompletionRecord>>;
    async fn set_completion(
        &mut self,
        student: UserId,
        a: AssignmentId,
        completed_at: Option<Time>,
    ) -> anyhow::Result<()>;
    /// Returns (completed, total) completion records of the assignment
    async fn count_completions(&mut self, a: AssignmentId) -> anyhow::Result<(u64, u64)>;
}
