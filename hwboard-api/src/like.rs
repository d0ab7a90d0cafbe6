use uuid::Uuid;

use crate::{policy::Action, CommentId, Db, Error, TopicId, User};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum LikeTarget {
    Topic(TopicId),
    Comment(CommentId),
}

impl LikeTarget {
    pub fn uuid(&self) -> Uuid {
        match self {
            LikeTarget::Topic(t) => t.0,
            LikeTarget::Comment(c) => c.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LikeToggle {
    /// Whether the actor likes the target after the toggle
    pub liked: bool,
    pub likes: u64,
}

/// Likes `target` if the actor did not like it yet, unlikes it otherwise.
///
/// Two concurrent likes by the same user can both find no existing like;
/// the loser's insert is refused by the uniqueness constraint and the
/// toggle still reports the target as liked.
pub async fn toggle_like<D: Db>(
    db: &mut D,
    actor: &User,
    target: LikeTarget,
) -> anyhow::Result<Result<LikeToggle, Error>> {
    ensure_allowed!(actor, Action::Like);
    match target {
        LikeTarget::Topic(t) => {
            if db.fetch_topic(t).await?.is_none() {
                return Ok(Err(Error::NotFound(t.0)));
            }
        }
        LikeTarget::Comment(c) => {
            let comment = api_try!(db.fetch_comment(c).await?.ok_or(Error::NotFound(c.0)));
            api_try!(crate::comment::ensure_thread_open(db, comment.thread).await?);
        }
    }
    let liked = if db.has_liked(target, actor.id).await? {
        db.delete_like(target, actor.id).await?;
        false
    } else {
        if !db.insert_like(target, actor.id).await? {
            tracing::debug!(?target, user = ?actor.id, "like already recorded concurrently");
        }
        true
    };
    let likes = db.count_likes(target).await?;
    Ok(Ok(LikeToggle { liked, likes }))
}
