use uuid::Uuid;

use crate::{
    comment,
    heat::Heat,
    policy::{self, Action},
    rank::{self, Page, Ranked, RatingOrder},
    CommentStats, Db, Error, RatingStats, Thread, Time, User, UserId, STUB_UUID,
};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct RatingId(pub Uuid);

impl RatingId {
    pub fn stub() -> RatingId {
        RatingId(STUB_UUID)
    }
}

/// Something students give scores to, e.g. a canteen dish or a course
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Rating {
    pub id: RatingId,
    pub author: UserId,
    pub title: String,
    pub description: String,
    pub date: Time,

    /// Closed ratings are hidden from listings, and neither they nor
    /// their comments take any more engagement
    pub active: bool,

    pub anonymous: bool,
}

impl Rating {
    pub fn redact_for(&mut self, viewer: &User) {
        if !policy::author_visible(viewer, self.author, self.anonymous) {
            self.author = UserId::stub();
        }
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewRating {
    pub id: RatingId,
    pub title: String,
    pub description: String,
    pub anonymous: bool,
}

impl NewRating {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.title)?;
        crate::validate_string(&self.description)?;
        if self.title.trim().is_empty() {
            return Err(Error::EmptyTitle);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewScore {
    pub score: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserRating {
    pub rating: RatingId,
    pub user: UserId,
    pub score: u8,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct RatingFilter {
    pub order: RatingOrder,
    /// Case-insensitive substring of the title or the description
    pub query: Option<String>,
    pub page: usize,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RatingView {
    pub rating: Rating,
    pub user_ratings: u64,
    pub average: Option<f64>,
    /// The viewer's own score, if any
    pub my_score: Option<u8>,
    pub heat: f64,
    pub hot_comments: Vec<Ranked<CommentStats>>,
}

pub async fn rating_stats<D: Db>(db: &mut D, rating: Rating) -> anyhow::Result<RatingStats> {
    let user_ratings = db.count_user_ratings(rating.id).await?;
    let comments = db.count_comments(Thread::Rating(rating.id)).await?;
    let average = db.average_score(rating.id).await?;
    Ok(RatingStats {
        rating,
        user_ratings,
        comments,
        average,
    })
}

pub(crate) async fn fetch_active<D: Db>(db: &mut D, r: RatingId) -> anyhow::Result<Result<Rating, Error>> {
    let rating = api_try!(db.fetch_rating(r).await?.ok_or(Error::NotFound(r.0)));
    if !rating.active {
        return Ok(Err(Error::InactiveRating(r.0)));
    }
    Ok(Ok(rating))
}

pub async fn create_rating<D: Db>(
    db: &mut D,
    actor: &User,
    r: NewRating,
    now: Time,
) -> anyhow::Result<Result<Rating, Error>> {
    ensure_allowed!(actor, Action::CreateRating);
    api_try!(r.validate());
    let rating = Rating {
        id: r.id,
        author: actor.id,
        title: String::from(r.title.trim()),
        description: String::from(r.description.trim()),
        date: now,
        active: true,
        anonymous: r.anonymous,
    };
    if !db.insert_rating(&rating).await? {
        return Ok(Err(Error::UuidAlreadyUsed(rating.id.0)));
    }
    tracing::info!(rating = ?rating.id, author = ?actor.id, "created rating");
    Ok(Ok(rating))
}

/// Deletes the rating along with its scores, comments and their likes
pub async fn delete_rating<D: Db>(
    db: &mut D,
    actor: &User,
    r: RatingId,
) -> anyhow::Result<Result<(), Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let rating = api_try!(db.fetch_rating(r).await?.ok_or(Error::NotFound(r.0)));
    ensure_allowed!(
        actor,
        Action::DeleteRating {
            author: rating.author
        }
    );
    db.delete_rating(r).await?;
    tracing::info!(rating = ?r, by = ?actor.id, "deleted rating");
    Ok(Ok(()))
}

/// Closes an open rating or reopens a closed one. Returns whether the
/// rating is open after the toggle.
pub async fn toggle_rating_active<D: Db>(
    db: &mut D,
    actor: &User,
    r: RatingId,
) -> anyhow::Result<Result<bool, Error>> {
    ensure_allowed!(actor, Action::CloseRating);
    let rating = api_try!(db.fetch_rating(r).await?.ok_or(Error::NotFound(r.0)));
    let active = !rating.active;
    db.set_rating_active(r, active).await?;
    tracing::info!(rating = ?r, by = ?actor.id, active, "toggled rating");
    Ok(Ok(active))
}

/// Gives `score` to the rating, overwriting any previous score by the actor
pub async fn rate<D: Db>(
    db: &mut D,
    actor: &User,
    r: RatingId,
    s: NewScore,
) -> anyhow::Result<Result<UserRating, Error>> {
    ensure_allowed!(actor, Action::Rate);
    if !(1..=5).contains(&s.score) {
        return Ok(Err(Error::InvalidScore(s.score)));
    }
    api_try!(fetch_active(db, r).await?);
    db.upsert_user_rating(r, actor.id, s.score).await?;
    Ok(Ok(UserRating {
        rating: r,
        user: actor.id,
        score: s.score,
    }))
}

pub async fn rating_detail<D: Db>(
    db: &mut D,
    actor: &User,
    r: RatingId,
    now: Time,
) -> anyhow::Result<Result<RatingView, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let rating = api_try!(fetch_active(db, r).await?);
    let my_score = db.user_score(r, actor.id).await?;
    let stats = rating_stats(db, rating).await?;
    let heat = stats.heat(now);
    let mut comments = Vec::new();
    for c in db.list_top_level_comments(Thread::Rating(r)).await? {
        comments.push(comment::comment_stats(db, c).await?);
    }
    let mut hot_comments = rank::hot_comments(comments, rank::RATING_HOT_COMMENTS, now);
    for c in hot_comments.iter_mut() {
        c.item.comment.redact_for(actor);
    }
    let RatingStats {
        mut rating,
        user_ratings,
        average,
        ..
    } = stats;
    rating.redact_for(actor);
    Ok(Ok(RatingView {
        rating,
        user_ratings,
        average,
        my_score,
        heat,
        hot_comments,
    }))
}

pub async fn list_ratings<D: Db>(
    db: &mut D,
    actor: &User,
    filter: RatingFilter,
    now: Time,
) -> anyhow::Result<Result<Page<Ranked<RatingStats>>, Error>> {
    ensure_allowed!(actor, Action::ViewBoard);
    let query = filter
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());
    let mut all = Vec::new();
    for r in db.list_active_ratings().await? {
        if query.map(|q| r.matches(q)).unwrap_or(true) {
            all.push(rating_stats(db, r).await?);
        }
    }
    let mut ranked = rank::rank_ratings(all, filter.order, now);
    for r in ranked.iter_mut() {
        r.item.rating.redact_for(actor);
    }
    Ok(Ok(rank::paginate(ranked, filter.page, rank::PAGE_SIZE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heat::tests::{now, rating};

    #[test]
    fn filter_is_case_insensitive() {
        let mut r = rating(now());
        r.title = String::from("Canteen Noodles");
        r.description = String::from("Second floor, window 3");
        assert!(r.matches("noodles"));
        assert!(r.matches("FLOOR"));
        assert!(!r.matches("rice"));
    }

    #[test]
    fn empty_filter_defaults() {
        let f: RatingFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(f.order, RatingOrder::Heat);
        assert_eq!(f.query, None);
        let f: RatingFilter = serde_json::from_str(r#"{"order": "score"}"#).unwrap();
        assert_eq!(f.order, RatingOrder::Score);
    }

    #[test]
    fn blank_titles_are_refused() {
        let r = NewRating {
            id: RatingId(Uuid::new_v4()),
            title: String::from("   "),
            description: String::new(),
            anonymous: false,
        };
        assert_eq!(r.validate(), Err(Error::EmptyTitle));
    }
}
