use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use hwboard_api::{
    Assignment, AssignmentDetail, AssignmentId, AssignmentStats, AssignmentUpdate, AuthToken,
    CleanupReport, CleanupRequest, Comment, CommentId, CommentStats, CompletionRecord, Db, Error,
    Homework, LikeTarget, LikeToggle, NewAssignment, NewComment, NewRating, NewScore, NewSession,
    NewTopic, NewUser, Page, Ranked, Rating, RatingFilter, RatingId, RatingStats, RatingView,
    Role, Subject, SubjectId, Thread, Time, Topic, TopicId, TopicStats, TopicView, User, UserId,
    UserRating, Uuid,
};

mod mem_db;
pub use mem_db::MemDb;

#[cfg(test)]
mod tests;

/// Mirrors the HTTP endpoints of the server on top of [`MemDb`]
pub struct MockServer {
    pub db: MemDb,
    /// Plaintext passwords, in creation order
    passwords: BTreeMap<usize, (String, String)>,
    sessions: HashMap<AuthToken, (UserId, Device)>,
    time: Option<Time>,
}

#[derive(Debug)]
struct Device(String);

fn stored<T>(res: anyhow::Result<Result<T, Error>>) -> Result<T, Error> {
    res.expect("in-memory storage failed")
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            db: MemDb::new(),
            passwords: BTreeMap::new(),
            sessions: HashMap::new(),
            time: None,
        }
    }

    /// Freezes the clock seen by the operations
    pub fn set_time(&mut self, time: Time) {
        self.time = Some(time);
    }

    fn now(&self) -> Time {
        self.time.unwrap_or_else(Utc::now)
    }

    /// Return name & pass for user number `id`
    pub fn test_get_user_info(&self, id: usize) -> (&str, &str) {
        let (name, pass) = self
            .passwords
            .values()
            .nth(id)
            .unwrap_or_else(|| panic!("getting user {id} among {}", self.passwords.len()));
        (name, pass)
    }

    /// Return the device a session was opened from
    pub fn test_session_device(&self, tok: AuthToken) -> Option<&str> {
        self.sessions.get(&tok).map(|(_, Device(d))| d as &str)
    }

    /// Return the number of users ever created
    pub fn test_num_users(&self) -> usize {
        self.passwords.len()
    }

    /// Creates a user as the bootstrap admin would
    pub async fn admin_create_user(&mut self, u: NewUser, password: String) -> Result<User, Error> {
        let name = u.name.clone();
        let res = stored(hwboard_api::create_user(&mut self.db, &User::system_admin(), u).await);
        if res.is_ok() {
            self.passwords.insert(self.passwords.len(), (name, password));
        }
        res
    }

    pub async fn admin_seed_subjects(&mut self) -> Result<usize, Error> {
        stored(hwboard_api::seed_subjects(&mut self.db, &User::system_admin()).await)
    }

    pub async fn admin_cleanup_assignments(
        &mut self,
        req: CleanupRequest,
    ) -> Result<CleanupReport, Error> {
        let today = self.now().date_naive();
        stored(
            hwboard_api::cleanup_assignments(&mut self.db, &User::system_admin(), req, today)
                .await,
        )
    }

    pub fn auth(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        match self.db.password_hash(&s.user) {
            // tests (of which mock-server is a part of) don't actually use bcrypt
            Some((user, hash)) if hash == s.password => {
                let tok = AuthToken(Uuid::new_v4());
                self.sessions.insert(tok, (user, Device(s.device)));
                Ok(tok)
            }
            _ => Err(Error::PermissionDenied),
        }
    }

    fn resolve(&self, tok: AuthToken) -> Result<User, Error> {
        self.sessions
            .get(&tok)
            .and_then(|(u, _)| self.db.user(*u))
            .cloned()
            .ok_or(Error::PermissionDenied)
    }

    pub fn unauth(&mut self, tok: AuthToken) -> Result<(), Error> {
        self.resolve(tok)?;
        self.sessions.remove(&tok);
        Ok(())
    }

    pub fn whoami(&self, tok: AuthToken) -> Result<User, Error> {
        self.resolve(tok)
    }

    pub async fn delete_user(&mut self, tok: AuthToken, target: UserId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let res = stored(hwboard_api::delete_user(&mut self.db, &user, target).await);
        if res.is_ok() {
            self.sessions.retain(|_, (u, _)| *u != target);
        }
        res
    }

    pub async fn leaderboard(&mut self, tok: AuthToken) -> Result<Vec<Ranked<TopicStats>>, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::leaderboard(&mut self.db, &user, now).await)
    }

    pub async fn recent_topics(&mut self, tok: AuthToken, page: usize) -> Result<Page<Topic>, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::recent_topics(&mut self.db, &user, page).await)
    }

    pub async fn create_topic(&mut self, tok: AuthToken, t: NewTopic) -> Result<Topic, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::create_topic(&mut self.db, &user, t, now).await)
    }

    pub async fn topic_detail(&mut self, tok: AuthToken, t: TopicId) -> Result<TopicView, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::topic_detail(&mut self.db, &user, t, now).await)
    }

    pub async fn delete_topic(&mut self, tok: AuthToken, t: TopicId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::delete_topic(&mut self.db, &user, t).await)
    }

    pub async fn pin_topic(&mut self, tok: AuthToken, t: TopicId) -> Result<bool, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::toggle_pin(&mut self.db, &user, t).await)
    }

    pub async fn like(&mut self, tok: AuthToken, target: LikeTarget) -> Result<LikeToggle, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::toggle_like(&mut self.db, &user, target).await)
    }

    pub async fn thread_comments(
        &mut self,
        tok: AuthToken,
        thread: Thread,
        page: usize,
    ) -> Result<Page<CommentStats>, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::list_comments(&mut self.db, &user, thread, page).await)
    }

    pub async fn thread_hot_comments(
        &mut self,
        tok: AuthToken,
        thread: Thread,
    ) -> Result<Vec<Ranked<CommentStats>>, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::hot_comments(&mut self.db, &user, thread, now).await)
    }

    pub async fn create_comment(&mut self, tok: AuthToken, c: NewComment) -> Result<Comment, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::create_comment(&mut self.db, &user, c, now).await)
    }

    pub async fn comment_replies(
        &mut self,
        tok: AuthToken,
        c: CommentId,
    ) -> Result<Vec<CommentStats>, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::list_replies(&mut self.db, &user, c).await)
    }

    pub async fn delete_comment(&mut self, tok: AuthToken, c: CommentId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::delete_comment(&mut self.db, &user, c).await)
    }

    pub async fn list_ratings(
        &mut self,
        tok: AuthToken,
        filter: RatingFilter,
    ) -> Result<Page<Ranked<RatingStats>>, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::list_ratings(&mut self.db, &user, filter, now).await)
    }

    pub async fn create_rating(&mut self, tok: AuthToken, r: NewRating) -> Result<Rating, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::create_rating(&mut self.db, &user, r, now).await)
    }

    pub async fn rating_detail(&mut self, tok: AuthToken, r: RatingId) -> Result<RatingView, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::rating_detail(&mut self.db, &user, r, now).await)
    }

    pub async fn rate(
        &mut self,
        tok: AuthToken,
        r: RatingId,
        score: NewScore,
    ) -> Result<UserRating, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::rate(&mut self.db, &user, r, score).await)
    }

    pub async fn delete_rating(&mut self, tok: AuthToken, r: RatingId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::delete_rating(&mut self.db, &user, r).await)
    }

    pub async fn toggle_rating_active(&mut self, tok: AuthToken, r: RatingId) -> Result<bool, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::toggle_rating_active(&mut self.db, &user, r).await)
    }

    pub async fn list_subjects(&mut self, tok: AuthToken) -> Result<Vec<Subject>, Error> {
        self.resolve(tok)?;
        Ok(self
            .db
            .list_subjects()
            .await
            .expect("in-memory storage failed"))
    }

    pub async fn list_assignments(&mut self, tok: AuthToken) -> Result<Vec<AssignmentStats>, Error> {
        let user = self.resolve(tok)?;
        let teacher = match user.role {
            Role::Admin => None,
            _ => Some(user.id),
        };
        stored(hwboard_api::teacher_assignments(&mut self.db, &user, teacher).await)
    }

    pub async fn create_assignment(
        &mut self,
        tok: AuthToken,
        a: NewAssignment,
    ) -> Result<Assignment, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::create_assignment(&mut self.db, &user, a, now).await)
    }

    pub async fn assignment_detail(
        &mut self,
        tok: AuthToken,
        a: AssignmentId,
    ) -> Result<AssignmentDetail, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::assignment_detail(&mut self.db, &user, a).await)
    }

    pub async fn edit_assignment(
        &mut self,
        tok: AuthToken,
        a: AssignmentId,
        update: AssignmentUpdate,
    ) -> Result<Assignment, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::update_assignment(&mut self.db, &user, a, update).await)
    }

    pub async fn delete_assignment(&mut self, tok: AuthToken, a: AssignmentId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::delete_assignment(&mut self.db, &user, a).await)
    }

    pub async fn toggle_completion(
        &mut self,
        tok: AuthToken,
        a: AssignmentId,
    ) -> Result<CompletionRecord, Error> {
        let user = self.resolve(tok)?;
        let now = self.now();
        stored(hwboard_api::toggle_completion(&mut self.db, &user, a, now).await)
    }

    pub async fn homework(&mut self, tok: AuthToken) -> Result<Vec<Homework>, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::student_assignments(&mut self.db, &user).await)
    }

    pub async fn hidden_subjects(&mut self, tok: AuthToken) -> Result<Vec<SubjectId>, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::hidden_subjects(&mut self.db, &user).await)
    }

    pub async fn set_hidden_subjects(
        &mut self,
        tok: AuthToken,
        subjects: Vec<SubjectId>,
    ) -> Result<Vec<SubjectId>, Error> {
        let user = self.resolve(tok)?;
        stored(hwboard_api::set_hidden_subjects(&mut self.db, &user, subjects).await)
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}
