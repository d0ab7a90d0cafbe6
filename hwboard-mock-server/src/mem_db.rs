use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use hwboard_api::{
    Assignment, AssignmentId, Comment, CommentId, CompletionRecord, Db, LikeTarget, NewUser,
    Rating, RatingId, Role, Subject, SubjectId, Thread, Time, Topic, TopicId, User, UserId,
};

/// In-memory storage, with the same uniqueness and cascade rules as the
/// PostgreSQL schema
#[derive(Debug, Default)]
pub struct MemDb {
    users: BTreeMap<UserId, (User, String)>,
    topics: BTreeMap<TopicId, Topic>,
    comments: BTreeMap<CommentId, Comment>,
    topic_likes: BTreeSet<(TopicId, UserId)>,
    comment_likes: BTreeSet<(CommentId, UserId)>,
    ratings: BTreeMap<RatingId, Rating>,
    scores: BTreeMap<(RatingId, UserId), u8>,
    subjects: BTreeMap<SubjectId, Subject>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    completions: BTreeMap<(UserId, AssignmentId), Option<Time>>,
    hidden_subjects: BTreeSet<(UserId, SubjectId)>,
    stale_like_reads: bool,
}

impl MemDb {
    pub fn new() -> MemDb {
        MemDb::default()
    }

    pub fn password_hash(&self, name: &str) -> Option<(UserId, &str)> {
        self.users
            .values()
            .find(|(u, _)| u.name == name)
            .map(|(u, hash)| (u.id, hash as &str))
    }

    pub fn user(&self, u: UserId) -> Option<&User> {
        self.users.get(&u).map(|(u, _)| u)
    }

    /// Backdates an assignment, for the cleanup to have something to do
    pub fn test_set_assignment_date(&mut self, a: AssignmentId, date: Time) {
        if let Some(a) = self.assignments.get_mut(&a) {
            a.date = date;
        }
    }

    /// Makes `has_liked` answer `false` from now on, as a read racing with
    /// another request's like would
    pub fn test_stale_like_reads(&mut self) {
        self.stale_like_reads = true;
    }

    fn remove_comment(&mut self, c: CommentId) -> bool {
        if self.comments.remove(&c).is_none() {
            return false;
        }
        self.comment_likes.retain(|(liked, _)| *liked != c);
        let replies = self
            .comments
            .values()
            .filter(|r| r.parent == Some(c))
            .map(|r| r.id)
            .collect::<Vec<_>>();
        for r in replies {
            self.remove_comment(r);
        }
        true
    }

    fn remove_thread_comments(&mut self, t: Thread) {
        let comments = self
            .comments
            .values()
            .filter(|c| c.thread == t)
            .map(|c| c.id)
            .collect::<Vec<_>>();
        for c in comments {
            self.remove_comment(c);
        }
    }

    fn remove_topic(&mut self, t: TopicId) -> bool {
        if self.topics.remove(&t).is_none() {
            return false;
        }
        self.topic_likes.retain(|(liked, _)| *liked != t);
        self.remove_thread_comments(Thread::Topic(t));
        true
    }

    fn remove_rating(&mut self, r: RatingId) -> bool {
        if self.ratings.remove(&r).is_none() {
            return false;
        }
        self.scores.retain(|(rated, _), _| *rated != r);
        self.remove_thread_comments(Thread::Rating(r));
        true
    }

    fn remove_assignment(&mut self, a: AssignmentId) -> bool {
        if self.assignments.remove(&a).is_none() {
            return false;
        }
        self.completions.retain(|(_, done), _| *done != a);
        true
    }
}

#[async_trait]
impl Db for MemDb {
    async fn fetch_user(&mut self, u: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.user(u).cloned())
    }

    async fn user_name_taken(&mut self, name: &str) -> anyhow::Result<bool> {
        Ok(self.users.values().any(|(u, _)| u.name == name))
    }

    async fn list_users(&mut self, role: Role) -> anyhow::Result<Vec<User>> {
        let mut users = self
            .users
            .values()
            .filter(|(u, _)| u.role == role)
            .map(|(u, _)| u.clone())
            .collect::<Vec<_>>();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn insert_user(&mut self, u: &NewUser) -> anyhow::Result<bool> {
        if self.users.contains_key(&u.id) || self.user_name_taken(&u.name).await? {
            return Ok(false);
        }
        self.users
            .insert(u.id, (u.user(), u.initial_password_hash.clone()));
        Ok(true)
    }

    async fn delete_user(&mut self, u: UserId) -> anyhow::Result<bool> {
        if self.users.remove(&u).is_none() {
            return Ok(false);
        }
        let topics = self
            .topics
            .values()
            .filter(|t| t.author == u)
            .map(|t| t.id)
            .collect::<Vec<_>>();
        for t in topics {
            self.remove_topic(t);
        }
        let ratings = self
            .ratings
            .values()
            .filter(|r| r.author == u)
            .map(|r| r.id)
            .collect::<Vec<_>>();
        for r in ratings {
            self.remove_rating(r);
        }
        let comments = self
            .comments
            .values()
            .filter(|c| c.author == u)
            .map(|c| c.id)
            .collect::<Vec<_>>();
        for c in comments {
            self.remove_comment(c);
        }
        let assignments = self
            .assignments
            .values()
            .filter(|a| a.teacher == u)
            .map(|a| a.id)
            .collect::<Vec<_>>();
        for a in assignments {
            self.remove_assignment(a);
        }
        self.topic_likes.retain(|(_, liker)| *liker != u);
        self.comment_likes.retain(|(_, liker)| *liker != u);
        self.scores.retain(|(_, rater), _| *rater != u);
        self.completions.retain(|(student, _), _| *student != u);
        self.hidden_subjects.retain(|(hider, _)| *hider != u);
        Ok(true)
    }

    async fn fetch_topic(&mut self, t: TopicId) -> anyhow::Result<Option<Topic>> {
        Ok(self.topics.get(&t).cloned())
    }

    async fn list_topics(&mut self) -> anyhow::Result<Vec<Topic>> {
        Ok(self.topics.values().cloned().collect())
    }

    async fn insert_topic(&mut self, t: &Topic) -> anyhow::Result<bool> {
        if self.topics.contains_key(&t.id) {
            return Ok(false);
        }
        self.topics.insert(t.id, t.clone());
        Ok(true)
    }

    async fn set_topic_pinned(&mut self, t: TopicId, pinned: bool) -> anyhow::Result<()> {
        if let Some(t) = self.topics.get_mut(&t) {
            t.pinned = pinned;
        }
        Ok(())
    }

    async fn delete_topic(&mut self, t: TopicId) -> anyhow::Result<bool> {
        Ok(self.remove_topic(t))
    }

    async fn fetch_comment(&mut self, c: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.comments.get(&c).cloned())
    }

    async fn list_top_level_comments(&mut self, t: Thread) -> anyhow::Result<Vec<Comment>> {
        Ok(self
            .comments
            .values()
            .filter(|c| c.thread == t && c.parent.is_none())
            .cloned()
            .collect())
    }

    async fn list_replies(&mut self, c: CommentId) -> anyhow::Result<Vec<Comment>> {
        Ok(self
            .comments
            .values()
            .filter(|r| r.parent == Some(c))
            .cloned()
            .collect())
    }

    async fn insert_comment(&mut self, c: &Comment) -> anyhow::Result<bool> {
        if self.comments.contains_key(&c.id) {
            return Ok(false);
        }
        self.comments.insert(c.id, c.clone());
        Ok(true)
    }

    async fn delete_comment(&mut self, c: CommentId) -> anyhow::Result<bool> {
        Ok(self.remove_comment(c))
    }

    async fn count_replies(&mut self, c: CommentId) -> anyhow::Result<u64> {
        Ok(self
            .comments
            .values()
            .filter(|r| r.parent == Some(c))
            .count() as u64)
    }

    async fn count_comments(&mut self, t: Thread) -> anyhow::Result<u64> {
        Ok(self.comments.values().filter(|c| c.thread == t).count() as u64)
    }

    async fn count_likes(&mut self, t: LikeTarget) -> anyhow::Result<u64> {
        Ok(match t {
            LikeTarget::Topic(t) => self.topic_likes.iter().filter(|(l, _)| *l == t).count(),
            LikeTarget::Comment(c) => self.comment_likes.iter().filter(|(l, _)| *l == c).count(),
        } as u64)
    }

    async fn has_liked(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool> {
        if self.stale_like_reads {
            return Ok(false);
        }
        Ok(match t {
            LikeTarget::Topic(t) => self.topic_likes.contains(&(t, u)),
            LikeTarget::Comment(c) => self.comment_likes.contains(&(c, u)),
        })
    }

    async fn insert_like(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool> {
        Ok(match t {
            LikeTarget::Topic(t) => self.topic_likes.insert((t, u)),
            LikeTarget::Comment(c) => self.comment_likes.insert((c, u)),
        })
    }

    async fn delete_like(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool> {
        Ok(match t {
            LikeTarget::Topic(t) => self.topic_likes.remove(&(t, u)),
            LikeTarget::Comment(c) => self.comment_likes.remove(&(c, u)),
        })
    }

    async fn fetch_rating(&mut self, r: RatingId) -> anyhow::Result<Option<Rating>> {
        Ok(self.ratings.get(&r).cloned())
    }

    async fn list_active_ratings(&mut self) -> anyhow::Result<Vec<Rating>> {
        Ok(self.ratings.values().filter(|r| r.active).cloned().collect())
    }

    async fn insert_rating(&mut self, r: &Rating) -> anyhow::Result<bool> {
        if self.ratings.contains_key(&r.id) {
            return Ok(false);
        }
        self.ratings.insert(r.id, r.clone());
        Ok(true)
    }

    async fn set_rating_active(&mut self, r: RatingId, active: bool) -> anyhow::Result<()> {
        if let Some(r) = self.ratings.get_mut(&r) {
            r.active = active;
        }
        Ok(())
    }

    async fn delete_rating(&mut self, r: RatingId) -> anyhow::Result<bool> {
        Ok(self.remove_rating(r))
    }

    async fn upsert_user_rating(
        &mut self,
        r: RatingId,
        u: UserId,
        score: u8,
    ) -> anyhow::Result<()> {
        self.scores.insert((r, u), score);
        Ok(())
    }

    async fn user_score(&mut self, r: RatingId, u: UserId) -> anyhow::Result<Option<u8>> {
        Ok(self.scores.get(&(r, u)).copied())
    }

    async fn count_user_ratings(&mut self, r: RatingId) -> anyhow::Result<u64> {
        Ok(self.scores.keys().filter(|(rated, _)| *rated == r).count() as u64)
    }

    async fn average_score(&mut self, r: RatingId) -> anyhow::Result<Option<f64>> {
        let scores = self
            .scores
            .iter()
            .filter(|((rated, _), _)| *rated == r)
            .map(|(_, s)| f64::from(*s))
            .collect::<Vec<_>>();
        Ok(match scores.len() {
            0 => None,
            n => Some(scores.iter().sum::<f64>() / n as f64),
        })
    }

    async fn list_subjects(&mut self) -> anyhow::Result<Vec<Subject>> {
        let mut subjects = self.subjects.values().cloned().collect::<Vec<_>>();
        subjects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subjects)
    }

    async fn insert_subject(&mut self, s: &Subject) -> anyhow::Result<bool> {
        if self.subjects.contains_key(&s.id) || self.subjects.values().any(|o| o.name == s.name) {
            return Ok(false);
        }
        self.subjects.insert(s.id, s.clone());
        Ok(true)
    }

    async fn list_hidden_subjects(&mut self, u: UserId) -> anyhow::Result<Vec<SubjectId>> {
        Ok(self
            .hidden_subjects
            .iter()
            .filter(|(hider, _)| *hider == u)
            .map(|(_, s)| *s)
            .collect())
    }

    async fn set_hidden_subjects(&mut self, u: UserId, s: &[SubjectId]) -> anyhow::Result<()> {
        let hidden = s
            .iter()
            .filter(|s| self.subjects.contains_key(s))
            .map(|s| (u, *s))
            .collect::<Vec<_>>();
        self.hidden_subjects.retain(|(hider, _)| *hider != u);
        self.hidden_subjects.extend(hidden);
        Ok(())
    }

    async fn fetch_assignment(&mut self, a: AssignmentId) -> anyhow::Result<Option<Assignment>> {
        Ok(self.assignments.get(&a).cloned())
    }

    async fn list_assignments(
        &mut self,
        teacher: Option<UserId>,
    ) -> anyhow::Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .values()
            .filter(|a| teacher.map(|t| a.teacher == t).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn list_assignments_created_before(
        &mut self,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .values()
            .filter(|a| a.date.date_naive() < date)
            .cloned()
            .collect())
    }

    async fn insert_assignment(&mut self, a: &Assignment) -> anyhow::Result<bool> {
        if self.assignments.contains_key(&a.id) {
            return Ok(false);
        }
        self.assignments.insert(a.id, a.clone());
        Ok(true)
    }

    async fn update_assignment(&mut self, a: &Assignment) -> anyhow::Result<bool> {
        Ok(match self.assignments.get_mut(&a.id) {
            Some(old) => {
                *old = Assignment {
                    teacher: old.teacher,
                    date: old.date,
                    ..a.clone()
                };
                true
            }
            None => false,
        })
    }

    async fn delete_assignment(&mut self, a: AssignmentId) -> anyhow::Result<bool> {
        Ok(self.remove_assignment(a))
    }

    async fn insert_completion_record(
        &mut self,
        student: UserId,
        a: AssignmentId,
    ) -> anyhow::Result<bool> {
        if self.completions.contains_key(&(student, a)) {
            return Ok(false);
        }
        self.completions.insert((student, a), None);
        Ok(true)
    }

    async fn list_completion_records(
        &mut self,
        student: UserId,
    ) -> anyhow::Result<Vec<CompletionRecord>> {
        Ok(self
            .completions
            .iter()
            .filter(|((s, _), _)| *s == student)
            .map(|(&(student, assignment), &completed_at)| CompletionRecord {
                student,
                assignment,
                completed_at,
            })
            .collect())
    }

    async fn list_assignment_records(
        &mut self,
        a: AssignmentId,
    ) -> anyhow::Result<Vec<CompletionRecord>> {
        Ok(self
            .completions
            .iter()
            .filter(|((_, done), _)| *done == a)
            .map(|(&(student, assignment), &completed_at)| CompletionRecord {
                student,
                assignment,
                completed_at,
            })
            .collect())
    }

    async fn fetch_completion_record(
        &mut self,
        student: UserId,
        a: AssignmentId,
    ) -> anyhow::Result<Option<CompletionRecord>> {
        Ok(self
            .completions
            .get(&(student, a))
            .map(|&completed_at| CompletionRecord {
                student,
                assignment: a,
                completed_at,
            }))
    }

    async fn set_completion(
        &mut self,
        student: UserId,
        a: AssignmentId,
        completed_at: Option<Time>,
    ) -> anyhow::Result<()> {
        if let Some(c) = self.completions.get_mut(&(student, a)) {
            *c = completed_at;
        }
        Ok(())
    }

    async fn count_completions(&mut self, a: AssignmentId) -> anyhow::Result<(u64, u64)> {
        let records = self
            .completions
            .iter()
            .filter(|((_, done), _)| *done == a)
            .map(|(_, c)| c);
        let (mut completed, mut total) = (0, 0);
        for c in records {
            total += 1;
            if c.is_some() {
                completed += 1;
            }
        }
        Ok((completed, total))
    }
}
