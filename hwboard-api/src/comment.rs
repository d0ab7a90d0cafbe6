use uuid::Uuid;

use crate::{
    policy::{self, Action},
    rank::{self, Page, Ranked},
    CommentStats, Db, Error, LikeTarget, RatingId, Time, TopicId, User, UserId,
    STUB_UUID,
};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

/// What a comment is attached to
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum Thread {
    Topic(TopicId),
    Rating(RatingId),
}

impl Thread {
    pub fn uuid(&self) -> Uuid {
        match self {
            Thread::Topic(t) => t.0,
            Thread::Rating(r) => r.0,
        }
    }

    /// How many comments are highlighted as hot under this thread
    pub fn hot_comment_count(&self) -> usize {
        match self {
            Thread::Topic(_) => rank::TOPIC_HOT_COMMENTS,
            Thread::Rating(_) => rank::RATING_HOT_COMMENTS,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub thread: Thread,

    /// Top-level comments have no parent; replies point to a top-level comment
    pub parent: Option<CommentId>,

    pub author: UserId,
    pub content: String,
    pub date: Time,
    pub anonymous: bool,
}

impl Comment {
    pub fn redact_for(&mut self, viewer: &User) {
        if !policy::author_visible(viewer, self.author, self.anonymous) {
            self.author = UserId::stub();
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub id: CommentId,
    pub thread: Thread,
    pub parent: Option<CommentId>,
    pub content: String,
    pub anonymous: bool,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.content)?;
        if self.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        Ok(())
    }
}

/// Fails with `NotFound` for a missing thread and `InactiveRating` for a
/// closed rating
pub(crate) async fn ensure_thread_open<D: Db>(
    db: &mut D,
    thread: Thread,
) -> anyhow::Result<Result<(), Error>> {
    match thread {
        Thread::Topic(t) => {
            if db.fetch_topic(t).await?.is_none() {
                return Ok(Err(Error::NotFound(t.0)));
            }
        }
        Thread::Rating(r) => {
            api_try!(crate::rating::fetch_active(db, r).await?);
        }
    }
    Ok(Ok(()))
}

pub async fn comment_stats<D: Db>(db: &mut D, comment: Comment) -> anyhow::Result<CommentStats> {
    let likes = db.count_likes(LikeTarget::Comment(comment.id)).await?;
    let replies = db.count_replies(comment.id).await?;
    Ok(CommentStats {
        comment,
        likes,
        replies,
    })
}

/// Adds a comment to a topic or an active rating.
///
/// Replies to a reply are attached to the top-level comment of the
/// conversation, keeping reply trees two levels deep.
pub async fn create_comment<D: Db>(
    db: &mut D,
    actor: &User,
    c: NewComment,
    now: Time,
) -> anyhow::Result<Result<Comment, Error>> {
    ensure_allowed!(actor, Action::Comment);
    api_try!(c.validate());
    api_try!(ensure_thread_open(db, c.thread).await?);
    let parent = match c.parent {
        None => None,
        Some(p) => {
            let parent = api_try!(db.fetch_comment(p).await?.ok_or(Error::NotFound(p.0)));
            if parent.thread != c.thread {
                return Ok(Err(Error::ParentNotInThread(p.0)));
            }
            Some(parent.parent.unwrap_or(parent.id))
        }
    };
    let comment = Comment {
        id: c.id,
        thread: c.thread,
        parent,
        author: actor.id,
        content: String::from(c.content.trim()),
        date: now,
        anonymous: c.anonymous,
    };
    if !db.insert_comment(&comment).await? {
        return Ok(Err(Error::UuidAlreadyUsed(comment.id.0)));
    }
    tracing::info!(comment = ?comment.id, thread = ?comment.thread, "created comment");
    Ok(Ok(comment))
}

/// Deletes a comment along with all its replies
pub async fn delete_comment<D: Db>(
    db: &mut D,
    actor: &User,
    c: CommentId,
) -> anyhow::Result<Result<(), Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let comment = api_try!(db.fetch_comment(c).await?.ok_or(Error::NotFound(c.0)));
    ensure_allowed!(
        actor,
        Action::DeleteComment {
            author: comment.author
        }
    );
    db.delete_comment(c).await?;
    tracing::info!(comment = ?c, by = ?actor.id, "deleted comment");
    Ok(Ok(()))
}

pub async fn hot_comments<D: Db>(
    db: &mut D,
    actor: &User,
    thread: Thread,
    now: Time,
) -> anyhow::Result<Result<Vec<Ranked<CommentStats>>, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    api_try!(ensure_thread_open(db, thread).await?);
    let mut stats = Vec::new();
    for c in db.list_top_level_comments(thread).await? {
        stats.push(comment_stats(db, c).await?);
    }
    let mut hot = rank::hot_comments(stats, thread.hot_comment_count(), now);
    for c in hot.iter_mut() {
        c.item.comment.redact_for(actor);
    }
    Ok(Ok(hot))
}

/// Top-level comments of a thread, newest first
pub async fn list_comments<D: Db>(
    db: &mut D,
    actor: &User,
    thread: Thread,
    page: usize,
) -> anyhow::Result<Result<Page<CommentStats>, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    api_try!(ensure_thread_open(db, thread).await?);
    let mut comments = db.list_top_level_comments(thread).await?;
    comments.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    let page = rank::paginate(comments, page, rank::PAGE_SIZE);
    let mut items = Vec::with_capacity(page.items.len());
    for mut c in page.items {
        c.redact_for(actor);
        items.push(comment_stats(db, c).await?);
    }
    Ok(Ok(Page {
        items,
        page: page.page,
        num_pages: page.num_pages,
        total: page.total,
    }))
}

/// Replies to a comment, oldest first
pub async fn list_replies<D: Db>(
    db: &mut D,
    actor: &User,
    c: CommentId,
) -> anyhow::Result<Result<Vec<CommentStats>, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let comment = api_try!(db.fetch_comment(c).await?.ok_or(Error::NotFound(c.0)));
    api_try!(ensure_thread_open(db, comment.thread).await?);
    let mut replies = db.list_replies(c).await?;
    replies.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    let mut res = Vec::with_capacity(replies.len());
    for mut r in replies {
        r.redact_for(actor);
        res.push(comment_stats(db, r).await?);
    }
    Ok(Ok(res))
}
