use uuid::Uuid;

use crate::{
    comment,
    heat::Heat,
    policy::{self, Action},
    rank::{self, Page, Ranked},
    CommentStats, Db, Error, LikeTarget, Thread, Time, TopicStats, User, UserId, STUB_UUID,
};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct TopicId(pub Uuid);

impl TopicId {
    pub fn stub() -> TopicId {
        TopicId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Topic {
    pub id: TopicId,
    pub author: UserId,
    pub title: String,
    pub content: String,
    pub date: Time,
    pub pinned: bool,
    pub anonymous: bool,
}

impl Topic {
    /// Hides the author behind `UserId::stub()` if `viewer` may not see it
    pub fn redact_for(&mut self, viewer: &User) {
        if !policy::author_visible(viewer, self.author, self.anonymous) {
            self.author = UserId::stub();
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewTopic {
    pub id: TopicId,
    pub title: String,
    pub content: String,
    pub anonymous: bool,
}

impl NewTopic {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.title)?;
        crate::validate_string(&self.content)?;
        if self.title.trim().is_empty() {
            return Err(Error::EmptyTitle);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TopicView {
    pub topic: Topic,
    pub likes: u64,
    /// Whether the viewer likes this topic
    pub liked: bool,
    pub heat: f64,
    pub hot_comments: Vec<Ranked<CommentStats>>,
}

/// Gathers the engagement snapshot of a topic: its likes and the stats of
/// each of its top-level comments.
pub async fn topic_stats<D: Db>(db: &mut D, topic: Topic) -> anyhow::Result<TopicStats> {
    let likes = db.count_likes(LikeTarget::Topic(topic.id)).await?;
    let mut comments = Vec::new();
    for c in db.list_top_level_comments(Thread::Topic(topic.id)).await? {
        comments.push(comment::comment_stats(db, c).await?);
    }
    Ok(TopicStats {
        topic,
        likes,
        comments,
    })
}

pub async fn create_topic<D: Db>(
    db: &mut D,
    actor: &User,
    t: NewTopic,
    now: Time,
) -> anyhow::Result<Result<Topic, Error>> {
    ensure_allowed!(actor, Action::CreateTopic);
    api_try!(t.validate());
    let topic = Topic {
        id: t.id,
        author: actor.id,
        title: String::from(t.title.trim()),
        content: String::from(t.content.trim()),
        date: now,
        pinned: false,
        anonymous: t.anonymous,
    };
    if !db.insert_topic(&topic).await? {
        return Ok(Err(Error::UuidAlreadyUsed(topic.id.0)));
    }
    tracing::info!(topic = ?topic.id, author = ?actor.id, "created topic");
    Ok(Ok(topic))
}

pub async fn delete_topic<D: Db>(
    db: &mut D,
    actor: &User,
    t: TopicId,
) -> anyhow::Result<Result<(), Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let topic = api_try!(db.fetch_topic(t).await?.ok_or(Error::NotFound(t.0)));
    ensure_allowed!(
        actor,
        Action::DeleteTopic {
            author: topic.author
        }
    );
    db.delete_topic(t).await?;
    tracing::info!(topic = ?t, by = ?actor.id, "deleted topic");
    Ok(Ok(()))
}

/// Returns whether the topic is pinned after the toggle
pub async fn toggle_pin<D: Db>(
    db: &mut D,
    actor: &User,
    t: TopicId,
) -> anyhow::Result<Result<bool, Error>> {
    ensure_allowed!(actor, Action::PinTopic);
    let topic = api_try!(db.fetch_topic(t).await?.ok_or(Error::NotFound(t.0)));
    let pinned = !topic.pinned;
    db.set_topic_pinned(t, pinned).await?;
    Ok(Ok(pinned))
}

pub async fn topic_detail<D: Db>(
    db: &mut D,
    actor: &User,
    t: TopicId,
    now: Time,
) -> anyhow::Result<Result<TopicView, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let topic = api_try!(db.fetch_topic(t).await?.ok_or(Error::NotFound(t.0)));
    let liked = db.has_liked(LikeTarget::Topic(t), actor.id).await?;
    let stats = topic_stats(db, topic).await?;
    let heat = stats.heat(now);
    let TopicStats {
        mut topic,
        likes,
        comments,
    } = stats;
    topic.redact_for(actor);
    let mut hot_comments = rank::hot_comments(comments, rank::TOPIC_HOT_COMMENTS, now);
    for c in hot_comments.iter_mut() {
        c.item.comment.redact_for(actor);
    }
    Ok(Ok(TopicView {
        topic,
        likes,
        liked,
        heat,
        hot_comments,
    }))
}

/// The hottest topics, pinned ones first
pub async fn leaderboard<D: Db>(
    db: &mut D,
    actor: &User,
    now: Time,
) -> anyhow::Result<Result<Vec<Ranked<TopicStats>>, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let mut all = Vec::new();
    for t in db.list_topics().await? {
        all.push(topic_stats(db, t).await?);
    }
    let mut board = rank::leaderboard(all, now);
    for t in board.iter_mut() {
        t.item.topic.redact_for(actor);
        for c in t.item.comments.iter_mut() {
            c.comment.redact_for(actor);
        }
    }
    Ok(Ok(board))
}

/// Topics newest first
pub async fn recent_topics<D: Db>(
    db: &mut D,
    actor: &User,
    page: usize,
) -> anyhow::Result<Result<Page<Topic>, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let mut topics = db.list_topics().await?;
    topics.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    for t in topics.iter_mut() {
        t.redact_for(actor);
    }
    Ok(Ok(rank::paginate(topics, page, rank::PAGE_SIZE)))
}
