//! Ordering of scored content for display.
//!
//! Everything here recomputes the heat of every candidate on each call.
//! Equal scores are ordered by id so that the result does not depend on
//! the input order.

use std::cmp::Ordering;

use crate::{heat::Heat, CommentStats, RatingStats, Time, TopicStats};

pub const LEADERBOARD_LEN: usize = 10;
pub const TOPIC_HOT_COMMENTS: usize = 5;
pub const RATING_HOT_COMMENTS: usize = 3;
pub const PAGE_SIZE: usize = 10;

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Ranked<T> {
    pub item: T,
    pub heat: f64,
}

fn score_all<T: Heat>(items: Vec<T>, now: Time) -> Vec<Ranked<T>> {
    items
        .into_iter()
        .map(|item| Ranked {
            heat: item.heat(now),
            item,
        })
        .collect()
}

fn hotter_first(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Pinned topics first, then by decreasing heat
pub fn rank_topics(topics: Vec<TopicStats>, now: Time) -> Vec<Ranked<TopicStats>> {
    let mut ranked = score_all(topics, now);
    ranked.sort_by(|a, b| {
        b.item
            .topic
            .pinned
            .cmp(&a.item.topic.pinned)
            .then_with(|| hotter_first(a.heat, b.heat))
            .then_with(|| a.item.topic.id.cmp(&b.item.topic.id))
    });
    ranked
}

pub fn leaderboard(topics: Vec<TopicStats>, now: Time) -> Vec<Ranked<TopicStats>> {
    let mut ranked = rank_topics(topics, now);
    ranked.truncate(LEADERBOARD_LEN);
    ranked
}

/// The `k` hottest top-level comments; replies never make the cut
pub fn hot_comments(comments: Vec<CommentStats>, k: usize, now: Time) -> Vec<Ranked<CommentStats>> {
    let top_level = comments
        .into_iter()
        .filter(|c| c.comment.parent.is_none())
        .collect();
    let mut ranked = score_all(top_level, now);
    ranked.sort_by(|a, b| {
        hotter_first(a.heat, b.heat).then_with(|| a.item.comment.id.cmp(&b.item.comment.id))
    });
    ranked.truncate(k);
    ranked
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingOrder {
    #[default]
    Heat,
    /// Highest average score first, unrated last
    Score,
}

pub fn rank_ratings(
    ratings: Vec<RatingStats>,
    order: RatingOrder,
    now: Time,
) -> Vec<Ranked<RatingStats>> {
    let mut ranked = score_all(ratings, now);
    ranked.sort_by(|a, b| {
        let primary = match order {
            RatingOrder::Heat => hotter_first(a.heat, b.heat),
            RatingOrder::Score => match (a.item.average, b.item.average) {
                (Some(a), Some(b)) => hotter_first(a, b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| a.item.rating.id.cmp(&b.item.rating.id))
    });
    ranked
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based
    pub page: usize,
    pub num_pages: usize,
    pub total: usize,
}

/// Cuts page number `page` out of `items`. Out-of-range pages fall back to
/// the first one, and there is always at least one (possibly empty) page.
pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total = items.len();
    let num_pages = ((total + per_page - 1) / per_page).max(1);
    let page = if (1..=num_pages).contains(&page) {
        page
    } else {
        1
    };
    let items = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();
    Page {
        items,
        page,
        num_pages,
        total,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{
        heat::tests::{comment, now, rating, topic},
        CommentId,
    };

    fn topic_stats(pinned: bool, likes: u64) -> TopicStats {
        TopicStats {
            topic: topic(now(), pinned),
            likes,
            comments: vec![],
        }
    }

    fn comment_stats(parent: Option<CommentId>, likes: u64) -> CommentStats {
        CommentStats {
            comment: comment(now(), parent),
            likes,
            replies: 0,
        }
    }

    #[test]
    fn pinned_topics_come_first() {
        let pinned = topic_stats(true, 0);
        let popular = topic_stats(false, 95);
        let ranked = rank_topics(vec![popular.clone(), pinned.clone()], now());
        assert_eq!(ranked[0].item, pinned);
        assert_eq!(ranked[1].item, popular);
        assert!(ranked[0].heat < ranked[1].heat);
    }

    #[test]
    fn topics_by_heat_within_partitions() {
        let cold = topic_stats(false, 1);
        let warm = topic_stats(false, 3);
        let pinned_cold = topic_stats(true, 0);
        let pinned_warm = topic_stats(true, 7);
        let ranked = rank_topics(
            vec![cold.clone(), pinned_cold.clone(), warm.clone(), pinned_warm.clone()],
            now(),
        );
        let order: Vec<_> = ranked.into_iter().map(|r| r.item).collect();
        assert_eq!(order, vec![pinned_warm, pinned_cold, warm, cold]);
    }

    #[test]
    fn ties_are_broken_by_id() {
        let a = topic_stats(false, 2);
        let b = topic_stats(false, 2);
        let one = rank_topics(vec![a.clone(), b.clone()], now());
        let other = rank_topics(vec![b, a], now());
        assert_eq!(one, other);
        assert!(one[0].item.topic.id < one[1].item.topic.id);
    }

    #[test]
    fn leaderboard_is_capped() {
        let topics = (0..25).map(|i| topic_stats(i % 7 == 0, i)).collect();
        assert_eq!(leaderboard(topics, now()).len(), LEADERBOARD_LEN);
        assert!(leaderboard(vec![], now()).is_empty());
    }

    #[test]
    fn hot_comments_skip_replies_and_respect_k() {
        let root = comment_stats(None, 0);
        let reply = comment_stats(Some(root.comment.id), 50);
        let mut comments = vec![root.clone(), reply];
        comments.extend((0..6).map(|i| comment_stats(None, i)));
        for k in [0, 1, 3, 5, 10] {
            let hot = hot_comments(comments.clone(), k, now());
            assert!(hot.len() <= k);
            assert!(hot.iter().all(|c| c.item.comment.parent.is_none()));
        }
        let hot = hot_comments(comments, 3, now());
        assert_eq!(
            hot.iter().map(|c| c.item.likes).collect::<Vec<_>>(),
            vec![5, 4, 3]
        );
    }

    #[test]
    fn older_comments_cool_down() {
        let fresh = comment_stats(None, 1);
        let mut old = comment_stats(None, 1);
        old.comment.date = now() - Duration::days(3);
        let hot = hot_comments(vec![old.clone(), fresh.clone()], 1, now());
        assert_eq!(hot[0].item, fresh);
    }

    #[test]
    fn ratings_by_score_put_unrated_last() {
        let stats = |average| RatingStats {
            rating: rating(now()),
            user_ratings: 1,
            comments: 0,
            average,
        };
        let unrated = stats(None);
        let good = stats(Some(4.5));
        let meh = stats(Some(2.0));
        let ranked = rank_ratings(
            vec![unrated.clone(), meh.clone(), good.clone()],
            RatingOrder::Score,
            now(),
        );
        let order: Vec<_> = ranked.into_iter().map(|r| r.item).collect();
        assert_eq!(order, vec![good, meh, unrated]);
    }

    #[test]
    fn ratings_by_heat() {
        let mut busy = RatingStats {
            rating: rating(now()),
            user_ratings: 2,
            comments: 4,
            average: Some(1.0),
        };
        let quiet = RatingStats {
            rating: rating(now()),
            user_ratings: 5,
            comments: 0,
            average: Some(5.0),
        };
        let ranked = rank_ratings(vec![quiet.clone(), busy.clone()], RatingOrder::Heat, now());
        assert_eq!(ranked[0].item, busy);
        busy.rating.date = now() - Duration::days(60);
        let ranked = rank_ratings(vec![busy, quiet.clone()], RatingOrder::Heat, now());
        assert_eq!(ranked[0].item, quiet);
    }

    #[test]
    fn pagination() {
        let p = paginate((1..=25).collect::<Vec<_>>(), 2, 10);
        assert_eq!(p.items, (11..=20).collect::<Vec<_>>());
        assert_eq!((p.page, p.num_pages, p.total), (2, 3, 25));
        let p = paginate((1..=25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(p.items, vec![21, 22, 23, 24, 25]);
        let p = paginate((1..=25).collect::<Vec<_>>(), 9, 10);
        assert_eq!(p.page, 1);
        assert_eq!(p.items.len(), 10);
        let p = paginate(Vec::<u8>::new(), 0, 10);
        assert_eq!((p.page, p.num_pages, p.total), (1, 1, 0));
        assert!(p.items.is_empty());
    }
}
