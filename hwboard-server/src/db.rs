use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use hwboard_api::{
    Assignment, AssignmentId, AuthToken, Comment, CommentId, CompletionRecord, LikeTarget,
    NewSession, NewUser, Rating, RatingId, Role, Subject, SubjectId, Thread, Time, Topic,
    TopicId, User, UserId, Uuid,
};
use sqlx::{postgres::PgRow, Row};

use crate::now;

pub struct PostgresDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
}

fn user_from_row(r: &PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: UserId(r.try_get("id").context("retrieving the id field")?),
        name: r.try_get("name").context("retrieving the name field")?,
        role: r
            .try_get::<String, _>("role")
            .context("retrieving the role field")?
            .parse()?,
        student_id: r
            .try_get("student_id")
            .context("retrieving the student_id field")?,
    })
}

fn topic_from_row(r: &PgRow) -> anyhow::Result<Topic> {
    Ok(Topic {
        id: TopicId(r.try_get("id").context("retrieving the id field")?),
        author: UserId(r.try_get("author_id").context("retrieving the author_id field")?),
        title: r.try_get("title").context("retrieving the title field")?,
        content: r.try_get("content").context("retrieving the content field")?,
        date: r.try_get("date").context("retrieving the date field")?,
        pinned: r.try_get("pinned").context("retrieving the pinned field")?,
        anonymous: r
            .try_get("anonymous")
            .context("retrieving the anonymous field")?,
    })
}

fn comment_from_row(r: &PgRow) -> anyhow::Result<Comment> {
    let id = CommentId(r.try_get("id").context("retrieving the id field")?);
    let topic: Option<Uuid> = r.try_get("topic_id").context("retrieving the topic_id field")?;
    let rating: Option<Uuid> = r
        .try_get("rating_id")
        .context("retrieving the rating_id field")?;
    let thread = match (topic, rating) {
        (Some(t), None) => Thread::Topic(TopicId(t)),
        (None, Some(r)) => Thread::Rating(RatingId(r)),
        _ => return Err(anyhow!("comment {id:?} does not belong to exactly one thread")),
    };
    Ok(Comment {
        id,
        thread,
        parent: r
            .try_get::<Option<Uuid>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
        author: UserId(r.try_get("author_id").context("retrieving the author_id field")?),
        content: r.try_get("content").context("retrieving the content field")?,
        date: r.try_get("date").context("retrieving the date field")?,
        anonymous: r
            .try_get("anonymous")
            .context("retrieving the anonymous field")?,
    })
}

fn rating_from_row(r: &PgRow) -> anyhow::Result<Rating> {
    Ok(Rating {
        id: RatingId(r.try_get("id").context("retrieving the id field")?),
        author: UserId(r.try_get("author_id").context("retrieving the author_id field")?),
        title: r.try_get("title").context("retrieving the title field")?,
        description: r
            .try_get("description")
            .context("retrieving the description field")?,
        date: r.try_get("date").context("retrieving the date field")?,
        active: r.try_get("active").context("retrieving the active field")?,
        anonymous: r
            .try_get("anonymous")
            .context("retrieving the anonymous field")?,
    })
}

fn assignment_from_row(r: &PgRow) -> anyhow::Result<Assignment> {
    Ok(Assignment {
        id: AssignmentId(r.try_get("id").context("retrieving the id field")?),
        title: r.try_get("title").context("retrieving the title field")?,
        description: r
            .try_get("description")
            .context("retrieving the description field")?,
        teacher: UserId(
            r.try_get("teacher_id")
                .context("retrieving the teacher_id field")?,
        ),
        subject: SubjectId(
            r.try_get("subject_id")
                .context("retrieving the subject_id field")?,
        ),
        start_date: r
            .try_get("start_date")
            .context("retrieving the start_date field")?,
        end_date: r
            .try_get("end_date")
            .context("retrieving the end_date field")?,
        date: r
            .try_get("created_at")
            .context("retrieving the created_at field")?,
    })
}

fn completion_from_row(r: &PgRow) -> anyhow::Result<CompletionRecord> {
    Ok(CompletionRecord {
        student: UserId(
            r.try_get("student_id")
                .context("retrieving the student_id field")?,
        ),
        assignment: AssignmentId(
            r.try_get("assignment_id")
                .context("retrieving the assignment_id field")?,
        ),
        completed_at: r
            .try_get("completed_at")
            .context("retrieving the completed_at field")?,
    })
}

fn count(r: PgRow) -> anyhow::Result<u64> {
    let c: i64 = r.try_get(0).context("retrieving the count")?;
    u64::try_from(c).context("count was negative")
}

const TOPIC_FIELDS: &str = "id, author_id, title, content, date, pinned, anonymous";
const COMMENT_FIELDS: &str =
    "id, topic_id, rating_id, parent_id, author_id, content, date, anonymous";
const RATING_FIELDS: &str = "id, author_id, title, description, date, active, anonymous";
const ASSIGNMENT_FIELDS: &str =
    "id, title, description, teacher_id, subject_id, start_date, end_date, created_at";

#[async_trait]
impl<'a> hwboard_api::Db for PostgresDb<'a> {
    async fn fetch_user(&mut self, u: UserId) -> anyhow::Result<Option<User>> {
        sqlx::query("SELECT id, name, role, student_id FROM users WHERE id = $1")
            .bind(u.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("fetching user {u:?}"))?
            .map(|r| user_from_row(&r))
            .transpose()
    }

    async fn user_name_taken(&mut self, name: &str) -> anyhow::Result<bool> {
        Ok(sqlx::query("SELECT 1 FROM users WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("checking whether user name {name:?} is taken"))?
            .is_some())
    }

    async fn list_users(&mut self, role: Role) -> anyhow::Result<Vec<User>> {
        sqlx::query("SELECT id, name, role, student_id FROM users WHERE role = $1 ORDER BY name")
            .bind(role.as_str())
            .fetch_all(&mut *self.conn)
            .await
            .with_context(|| format!("listing users with role {role}"))?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn insert_user(&mut self, u: &NewUser) -> anyhow::Result<bool> {
        Ok(sqlx::query(
            "
                INSERT INTO users (id, name, role, student_id, password_hash)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT DO NOTHING
            ",
        )
        .bind(u.id.0)
        .bind(&u.name)
        .bind(u.role.as_str())
        .bind(&u.student_id)
        .bind(&u.initial_password_hash)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("inserting user {:?}", u.id))?
        .rows_affected()
            == 1)
    }

    async fn delete_user(&mut self, u: UserId) -> anyhow::Result<bool> {
        Ok(sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(u.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting user {u:?}"))?
            .rows_affected()
            > 0)
    }

    async fn fetch_topic(&mut self, t: TopicId) -> anyhow::Result<Option<Topic>> {
        sqlx::query(&format!("SELECT {TOPIC_FIELDS} FROM topics WHERE id = $1"))
            .bind(t.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("fetching topic {t:?}"))?
            .map(|r| topic_from_row(&r))
            .transpose()
    }

    async fn list_topics(&mut self) -> anyhow::Result<Vec<Topic>> {
        sqlx::query(&format!("SELECT {TOPIC_FIELDS} FROM topics"))
            .fetch_all(&mut *self.conn)
            .await
            .context("listing topics")?
            .iter()
            .map(topic_from_row)
            .collect()
    }

    async fn insert_topic(&mut self, t: &Topic) -> anyhow::Result<bool> {
        Ok(sqlx::query(&format!(
            "INSERT INTO topics ({TOPIC_FIELDS}) VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT DO NOTHING"
        ))
        .bind(t.id.0)
        .bind(t.author.0)
        .bind(&t.title)
        .bind(&t.content)
        .bind(t.date)
        .bind(t.pinned)
        .bind(t.anonymous)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("inserting topic {:?}", t.id))?
        .rows_affected()
            == 1)
    }

    async fn set_topic_pinned(&mut self, t: TopicId, pinned: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE topics SET pinned = $2 WHERE id = $1")
            .bind(t.0)
            .bind(pinned)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("setting pinned flag of topic {t:?}"))?;
        Ok(())
    }

    async fn delete_topic(&mut self, t: TopicId) -> anyhow::Result<bool> {
        Ok(sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(t.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting topic {t:?}"))?
            .rows_affected()
            > 0)
    }

    async fn fetch_comment(&mut self, c: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query(&format!("SELECT {COMMENT_FIELDS} FROM comments WHERE id = $1"))
            .bind(c.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("fetching comment {c:?}"))?
            .map(|r| comment_from_row(&r))
            .transpose()
    }

    async fn list_top_level_comments(&mut self, t: Thread) -> anyhow::Result<Vec<Comment>> {
        let column = match t {
            Thread::Topic(_) => "topic_id",
            Thread::Rating(_) => "rating_id",
        };
        sqlx::query(&format!(
            "SELECT {COMMENT_FIELDS} FROM comments WHERE {column} = $1 AND parent_id IS NULL"
        ))
        .bind(t.uuid())
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing top-level comments of {t:?}"))?
        .iter()
        .map(comment_from_row)
        .collect()
    }

    async fn list_replies(&mut self, c: CommentId) -> anyhow::Result<Vec<Comment>> {
        sqlx::query(&format!(
            "SELECT {COMMENT_FIELDS} FROM comments WHERE parent_id = $1"
        ))
        .bind(c.0)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing replies to {c:?}"))?
        .iter()
        .map(comment_from_row)
        .collect()
    }

    async fn insert_comment(&mut self, c: &Comment) -> anyhow::Result<bool> {
        let (topic, rating) = match c.thread {
            Thread::Topic(t) => (Some(t.0), None),
            Thread::Rating(r) => (None, Some(r.0)),
        };
        Ok(sqlx::query(&format!(
            "INSERT INTO comments ({COMMENT_FIELDS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT DO NOTHING"
        ))
        .bind(c.id.0)
        .bind(topic)
        .bind(rating)
        .bind(c.parent.map(|p| p.0))
        .bind(c.author.0)
        .bind(&c.content)
        .bind(c.date)
        .bind(c.anonymous)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("inserting comment {:?}", c.id))?
        .rows_affected()
            == 1)
    }

    async fn delete_comment(&mut self, c: CommentId) -> anyhow::Result<bool> {
        Ok(sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(c.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting comment {c:?}"))?
            .rows_affected()
            > 0)
    }

    async fn count_replies(&mut self, c: CommentId) -> anyhow::Result<u64> {
        count(
            sqlx::query("SELECT COUNT(*) FROM comments WHERE parent_id = $1")
                .bind(c.0)
                .fetch_one(&mut *self.conn)
                .await
                .with_context(|| format!("counting replies to {c:?}"))?,
        )
    }

    async fn count_comments(&mut self, t: Thread) -> anyhow::Result<u64> {
        let query = match t {
            Thread::Topic(_) => "SELECT COUNT(*) FROM comments WHERE topic_id = $1",
            Thread::Rating(_) => "SELECT COUNT(*) FROM comments WHERE rating_id = $1",
        };
        count(
            sqlx::query(query)
                .bind(t.uuid())
                .fetch_one(&mut *self.conn)
                .await
                .with_context(|| format!("counting comments of {t:?}"))?,
        )
    }

    async fn count_likes(&mut self, t: LikeTarget) -> anyhow::Result<u64> {
        let query = match t {
            LikeTarget::Topic(_) => "SELECT COUNT(*) FROM topic_likes WHERE topic_id = $1",
            LikeTarget::Comment(_) => "SELECT COUNT(*) FROM comment_likes WHERE comment_id = $1",
        };
        count(
            sqlx::query(query)
                .bind(t.uuid())
                .fetch_one(&mut *self.conn)
                .await
                .with_context(|| format!("counting likes of {t:?}"))?,
        )
    }

    async fn has_liked(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool> {
        let query = match t {
            LikeTarget::Topic(_) => "SELECT 1 FROM topic_likes WHERE topic_id = $1 AND user_id = $2",
            LikeTarget::Comment(_) => {
                "SELECT 1 FROM comment_likes WHERE comment_id = $1 AND user_id = $2"
            }
        };
        Ok(sqlx::query(query)
            .bind(t.uuid())
            .bind(u.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("checking whether {u:?} likes {t:?}"))?
            .is_some())
    }

    async fn insert_like(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool> {
        let query = match t {
            LikeTarget::Topic(_) => {
                "INSERT INTO topic_likes (topic_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
            LikeTarget::Comment(_) => {
                "INSERT INTO comment_likes (comment_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
        };
        Ok(sqlx::query(query)
            .bind(t.uuid())
            .bind(u.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("inserting like of {u:?} on {t:?}"))?
            .rows_affected()
            == 1)
    }

    async fn delete_like(&mut self, t: LikeTarget, u: UserId) -> anyhow::Result<bool> {
        let query = match t {
            LikeTarget::Topic(_) => "DELETE FROM topic_likes WHERE topic_id = $1 AND user_id = $2",
            LikeTarget::Comment(_) => {
                "DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2"
            }
        };
        Ok(sqlx::query(query)
            .bind(t.uuid())
            .bind(u.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting like of {u:?} on {t:?}"))?
            .rows_affected()
            > 0)
    }

    async fn fetch_rating(&mut self, r: RatingId) -> anyhow::Result<Option<Rating>> {
        sqlx::query(&format!("SELECT {RATING_FIELDS} FROM ratings WHERE id = $1"))
            .bind(r.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("fetching rating {r:?}"))?
            .map(|r| rating_from_row(&r))
            .transpose()
    }

    async fn list_active_ratings(&mut self) -> anyhow::Result<Vec<Rating>> {
        sqlx::query(&format!("SELECT {RATING_FIELDS} FROM ratings WHERE active"))
            .fetch_all(&mut *self.conn)
            .await
            .context("listing active ratings")?
            .iter()
            .map(rating_from_row)
            .collect()
    }

    async fn insert_rating(&mut self, r: &Rating) -> anyhow::Result<bool> {
        Ok(sqlx::query(&format!(
            "INSERT INTO ratings ({RATING_FIELDS}) VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT DO NOTHING"
        ))
        .bind(r.id.0)
        .bind(r.author.0)
        .bind(&r.title)
        .bind(&r.description)
        .bind(r.date)
        .bind(r.active)
        .bind(r.anonymous)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("inserting rating {:?}", r.id))?
        .rows_affected()
            == 1)
    }

    async fn set_rating_active(&mut self, r: RatingId, active: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE ratings SET active = $2 WHERE id = $1")
            .bind(r.0)
            .bind(active)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("setting active flag of rating {r:?}"))?;
        Ok(())
    }

    async fn delete_rating(&mut self, r: RatingId) -> anyhow::Result<bool> {
        Ok(sqlx::query("DELETE FROM ratings WHERE id = $1")
            .bind(r.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting rating {r:?}"))?
            .rows_affected()
            > 0)
    }

    async fn upsert_user_rating(
        &mut self,
        r: RatingId,
        u: UserId,
        score: u8,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "
                INSERT INTO user_ratings (rating_id, user_id, score)
                VALUES ($1, $2, $3)
                ON CONFLICT (rating_id, user_id)
                DO UPDATE SET score = EXCLUDED.score, date = now()
            ",
        )
        .bind(r.0)
        .bind(u.0)
        .bind(i16::from(score))
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("recording score of {u:?} for {r:?}"))?;
        Ok(())
    }

    async fn user_score(&mut self, r: RatingId, u: UserId) -> anyhow::Result<Option<u8>> {
        sqlx::query("SELECT score FROM user_ratings WHERE rating_id = $1 AND user_id = $2")
            .bind(r.0)
            .bind(u.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("fetching score of {u:?} for {r:?}"))?
            .map(|row| {
                let score: i16 = row.try_get("score").context("retrieving the score field")?;
                u8::try_from(score).context("score out of range")
            })
            .transpose()
    }

    async fn count_user_ratings(&mut self, r: RatingId) -> anyhow::Result<u64> {
        count(
            sqlx::query("SELECT COUNT(*) FROM user_ratings WHERE rating_id = $1")
                .bind(r.0)
                .fetch_one(&mut *self.conn)
                .await
                .with_context(|| format!("counting scores of {r:?}"))?,
        )
    }

    async fn average_score(&mut self, r: RatingId) -> anyhow::Result<Option<f64>> {
        sqlx::query(
            "SELECT AVG(score)::DOUBLE PRECISION AS average FROM user_ratings WHERE rating_id = $1",
        )
        .bind(r.0)
        .fetch_one(&mut *self.conn)
        .await
        .with_context(|| format!("averaging scores of {r:?}"))?
        .try_get("average")
        .context("retrieving the average field")
    }

    async fn list_subjects(&mut self) -> anyhow::Result<Vec<Subject>> {
        sqlx::query("SELECT id, name FROM subjects ORDER BY name")
            .fetch_all(&mut *self.conn)
            .await
            .context("listing subjects")?
            .iter()
            .map(|r| {
                Ok(Subject {
                    id: SubjectId(r.try_get("id").context("retrieving the id field")?),
                    name: r.try_get("name").context("retrieving the name field")?,
                })
            })
            .collect()
    }

    async fn insert_subject(&mut self, s: &Subject) -> anyhow::Result<bool> {
        Ok(
            sqlx::query("INSERT INTO subjects (id, name) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(s.id.0)
                .bind(&s.name)
                .execute(&mut *self.conn)
                .await
                .with_context(|| format!("inserting subject {:?}", s.name))?
                .rows_affected()
                == 1,
        )
    }

    async fn list_hidden_subjects(&mut self, u: UserId) -> anyhow::Result<Vec<SubjectId>> {
        sqlx::query("SELECT subject_id FROM hidden_subjects WHERE user_id = $1")
            .bind(u.0)
            .fetch_all(&mut *self.conn)
            .await
            .with_context(|| format!("listing subjects hidden by {u:?}"))?
            .into_iter()
            .map(|r| {
                Ok(SubjectId(
                    r.try_get("subject_id")
                        .context("retrieving the subject_id field")?,
                ))
            })
            .collect()
    }

    async fn set_hidden_subjects(&mut self, u: UserId, s: &[SubjectId]) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM hidden_subjects WHERE user_id = $1")
            .bind(u.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("clearing subjects hidden by {u:?}"))?;
        let subjects = s.iter().map(|s| s.0).collect::<Vec<_>>();
        sqlx::query(
            "
                INSERT INTO hidden_subjects (user_id, subject_id)
                SELECT $1, id FROM subjects WHERE id = ANY($2)
                ON CONFLICT DO NOTHING
            ",
        )
        .bind(u.0)
        .bind(subjects)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("hiding subjects {s:?} for {u:?}"))?;
        Ok(())
    }

    async fn fetch_assignment(&mut self, a: AssignmentId) -> anyhow::Result<Option<Assignment>> {
        sqlx::query(&format!(
            "SELECT {ASSIGNMENT_FIELDS} FROM assignments WHERE id = $1"
        ))
        .bind(a.0)
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("fetching assignment {a:?}"))?
        .map(|r| assignment_from_row(&r))
        .transpose()
    }

    async fn list_assignments(
        &mut self,
        teacher: Option<UserId>,
    ) -> anyhow::Result<Vec<Assignment>> {
        sqlx::query(&format!(
            "SELECT {ASSIGNMENT_FIELDS} FROM assignments WHERE $1::UUID IS NULL OR teacher_id = $1"
        ))
        .bind(teacher.map(|t| t.0))
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing assignments of {teacher:?}"))?
        .iter()
        .map(assignment_from_row)
        .collect()
    }

    async fn list_assignments_created_before(
        &mut self,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        sqlx::query(&format!(
            "SELECT {ASSIGNMENT_FIELDS} FROM assignments
             WHERE (created_at AT TIME ZONE 'UTC')::DATE < $1"
        ))
        .bind(date)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing assignments created before {date}"))?
        .iter()
        .map(assignment_from_row)
        .collect()
    }

    async fn insert_assignment(&mut self, a: &Assignment) -> anyhow::Result<bool> {
        Ok(sqlx::query(&format!(
            "INSERT INTO assignments ({ASSIGNMENT_FIELDS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT DO NOTHING"
        ))
        .bind(a.id.0)
        .bind(&a.title)
        .bind(&a.description)
        .bind(a.teacher.0)
        .bind(a.subject.0)
        .bind(a.start_date)
        .bind(a.end_date)
        .bind(a.date)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("inserting assignment {:?}", a.id))?
        .rows_affected()
            == 1)
    }

    async fn update_assignment(&mut self, a: &Assignment) -> anyhow::Result<bool> {
        Ok(sqlx::query(
            "
                UPDATE assignments
                SET title = $2, description = $3, subject_id = $4, start_date = $5, end_date = $6
                WHERE id = $1
            ",
        )
        .bind(a.id.0)
        .bind(&a.title)
        .bind(&a.description)
        .bind(a.subject.0)
        .bind(a.start_date)
        .bind(a.end_date)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("updating assignment {:?}", a.id))?
        .rows_affected()
            > 0)
    }

    async fn delete_assignment(&mut self, a: AssignmentId) -> anyhow::Result<bool> {
        Ok(sqlx::query("DELETE FROM assignments WHERE id = $1")
            .bind(a.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting assignment {a:?}"))?
            .rows_affected()
            > 0)
    }

    async fn insert_completion_record(
        &mut self,
        student: UserId,
        a: AssignmentId,
    ) -> anyhow::Result<bool> {
        Ok(sqlx::query(
            "
                INSERT INTO completion_records (student_id, assignment_id, completed_at)
                VALUES ($1, $2, NULL)
                ON CONFLICT DO NOTHING
            ",
        )
        .bind(student.0)
        .bind(a.0)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("inserting completion record of {student:?} for {a:?}"))?
        .rows_affected()
            == 1)
    }

    async fn list_completion_records(
        &mut self,
        student: UserId,
    ) -> anyhow::Result<Vec<CompletionRecord>> {
        sqlx::query(
            "SELECT student_id, assignment_id, completed_at FROM completion_records
             WHERE student_id = $1",
        )
        .bind(student.0)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing completion records of {student:?}"))?
        .iter()
        .map(completion_from_row)
        .collect()
    }

    async fn list_assignment_records(
        &mut self,
        a: AssignmentId,
    ) -> anyhow::Result<Vec<CompletionRecord>> {
        sqlx::query(
            "SELECT student_id, assignment_id, completed_at FROM completion_records
             WHERE assignment_id = $1",
        )
        .bind(a.0)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing completion records for {a:?}"))?
        .iter()
        .map(completion_from_row)
        .collect()
    }

    async fn fetch_completion_record(
        &mut self,
        student: UserId,
        a: AssignmentId,
    ) -> anyhow::Result<Option<CompletionRecord>> {
        sqlx::query(
            "SELECT student_id, assignment_id, completed_at FROM completion_records
             WHERE student_id = $1 AND assignment_id = $2",
        )
        .bind(student.0)
        .bind(a.0)
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("fetching completion record of {student:?} for {a:?}"))?
        .map(|r| completion_from_row(&r))
        .transpose()
    }

    async fn set_completion(
        &mut self,
        student: UserId,
        a: AssignmentId,
        completed_at: Option<Time>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE completion_records SET completed_at = $3
             WHERE student_id = $1 AND assignment_id = $2",
        )
        .bind(student.0)
        .bind(a.0)
        .bind(completed_at)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("setting completion of {student:?} for {a:?}"))?;
        Ok(())
    }

    async fn count_completions(&mut self, a: AssignmentId) -> anyhow::Result<(u64, u64)> {
        let r = sqlx::query(
            "
                SELECT
                    COUNT(*) FILTER (WHERE completed_at IS NOT NULL) AS completed,
                    COUNT(*) AS total
                FROM completion_records
                WHERE assignment_id = $1
            ",
        )
        .bind(a.0)
        .fetch_one(&mut *self.conn)
        .await
        .with_context(|| format!("counting completions of {a:?}"))?;
        let completed: i64 = r.try_get("completed").context("retrieving the completed field")?;
        let total: i64 = r.try_get("total").context("retrieving the total field")?;
        Ok((
            u64::try_from(completed).context("completed count was negative")?,
            u64::try_from(total).context("total count was negative")?,
        ))
    }
}

fn password_matches(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(ok) => ok,
        // tests store plaintext passwords to skip hashing
        #[cfg(test)]
        Err(_) => password == hash,
        #[cfg(not(test))]
        Err(err) => {
            tracing::warn!(?err, "stored password hash could not be parsed");
            false
        }
    }
}

pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    s: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let Some(row) = sqlx::query("SELECT id, password_hash FROM users WHERE name = $1")
        .bind(&s.user)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching password hash for {:?}", s.user))?
    else {
        return Ok(None);
    };
    let user: Uuid = row.try_get("id").context("retrieving the id field")?;
    let hash: String = row
        .try_get("password_hash")
        .context("retrieving the password_hash field")?;
    if !password_matches(&s.password, &hash) {
        return Ok(None);
    }

    let token = AuthToken(Uuid::new_v4());
    let now = now();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, device, login_time, last_active)
         VALUES ($1, $2, $3, $4, $4)",
    )
    .bind(token.0)
    .bind(user)
    .bind(&s.device)
    .bind(now)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting new session for user {user:?}"))?;
    tracing::info!(user = ?UserId(user), device = ?s.device, "new session");
    Ok(Some(token))
}

pub async fn logout_user(conn: &mut sqlx::PgConnection, token: &AuthToken) -> anyhow::Result<bool> {
    Ok(sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(&mut *conn)
        .await
        .context("deleting session")?
        .rows_affected()
        == 1)
}

/// Returns the user owning the session, bumping its last activity
pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> anyhow::Result<Option<User>> {
    sqlx::query(
        "
            UPDATE sessions SET last_active = $2
            FROM users
            WHERE sessions.id = $1 AND users.id = sessions.user_id
            RETURNING users.id, users.name, users.role, users.student_id
        ",
    )
    .bind(token.0)
    .bind(now())
    .fetch_optional(&mut *conn)
    .await
    .context("recovering session")?
    .map(|r| user_from_row(&r))
    .transpose()
}
