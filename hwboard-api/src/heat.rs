//! Time-decayed popularity ("heat") of board content.
//!
//! Every kind of content is scored as
//! `(base + likes + secondary) * exp(rate * age_days)`, where the base,
//! the decay rate and the secondary engagement depend on the kind. Scores
//! are never stored: they are recomputed from an engagement snapshot and
//! the current time on every read.

use crate::{Comment, Rating, Time, Topic};

const SECS_PER_DAY: i64 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decay {
    /// Added to every score so that fresh, unengaged content is still ordered
    pub base: f64,

    /// Negative: higher magnitude means the content goes cold faster
    pub rate: f64,
}

pub const TOPIC: Decay = Decay {
    base: 5.0,
    rate: -0.1,
};

pub const COMMENT: Decay = Decay {
    base: 1.0,
    rate: -0.15,
};

pub const RATING: Decay = Decay {
    base: 10.0,
    rate: -0.05,
};

/// Weight of each comment in a rating's secondary engagement
pub const RATING_COMMENT_WEIGHT: f64 = 2.0;

impl Decay {
    pub fn score(&self, engagement: f64, age_days: f64) -> f64 {
        (self.base + engagement) * (self.rate * age_days).exp()
    }
}

/// Age in fractional days: whole days plus the remaining seconds over 86400.
///
/// Whole days are floored, so content dated in the future gets a negative age.
pub fn age_days(created: Time, now: Time) -> f64 {
    let secs = (now - created).num_seconds();
    secs.div_euclid(SECS_PER_DAY) as f64
        + secs.rem_euclid(SECS_PER_DAY) as f64 / SECS_PER_DAY as f64
}

pub trait Heat {
    fn heat(&self, now: Time) -> f64;
}

/// Engagement snapshot of a comment
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentStats {
    pub comment: Comment,
    pub likes: u64,
    pub replies: u64,
}

impl Heat for CommentStats {
    fn heat(&self, now: Time) -> f64 {
        COMMENT.score(
            self.likes as f64 + self.replies as f64,
            age_days(self.comment.date, now),
        )
    }
}

/// Engagement snapshot of a topic, along with its top-level comments
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TopicStats {
    pub topic: Topic,
    pub likes: u64,
    pub comments: Vec<CommentStats>,
}

impl Heat for TopicStats {
    fn heat(&self, now: Time) -> f64 {
        // comments are leaves: score each of them first, then fold the sum in
        let comments: f64 = self.comments.iter().map(|c| c.heat(now)).sum();
        TOPIC.score(
            self.likes as f64 + comments,
            age_days(self.topic.date, now),
        )
    }
}

/// Engagement snapshot of a rating
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RatingStats {
    pub rating: Rating,
    pub user_ratings: u64,
    pub comments: u64,
    pub average: Option<f64>,
}

impl Heat for RatingStats {
    fn heat(&self, now: Time) -> f64 {
        RATING.score(
            self.user_ratings as f64 + RATING_COMMENT_WEIGHT * self.comments as f64,
            age_days(self.rating.date, now),
        )
    }
}
