use chrono::{Duration, NaiveDate, TimeZone};
use hwboard_api::{SubjectId, NO_DESCRIPTION};

use super::*;

fn t0() -> Time {
    Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap()
}

fn server() -> MockServer {
    let mut s = MockServer::new();
    s.set_time(t0());
    s
}

async fn login(s: &mut MockServer, name: &str, role: Role) -> AuthToken {
    let u = NewUser {
        id: UserId(Uuid::new_v4()),
        name: String::from(name),
        role,
        student_id: None,
        initial_password_hash: String::from("pass"),
    };
    s.admin_create_user(u, String::from("pass")).await.unwrap();
    s.auth(NewSession {
        user: String::from(name),
        password: String::from("pass"),
        device: String::from("test"),
    })
    .unwrap()
}

async fn topic(s: &mut MockServer, tok: AuthToken, title: &str) -> TopicId {
    s.create_topic(
        tok,
        NewTopic {
            id: TopicId(Uuid::new_v4()),
            title: String::from(title),
            content: String::from("..."),
            anonymous: false,
        },
    )
    .await
    .unwrap()
    .id
}

async fn comment(
    s: &mut MockServer,
    tok: AuthToken,
    thread: Thread,
    parent: Option<CommentId>,
) -> Result<Comment, Error> {
    s.create_comment(
        tok,
        NewComment {
            id: CommentId(Uuid::new_v4()),
            thread,
            parent,
            content: String::from("me too"),
            anonymous: false,
        },
    )
    .await
}

async fn rating(s: &mut MockServer, tok: AuthToken, title: &str) -> RatingId {
    s.create_rating(
        tok,
        NewRating {
            id: RatingId(Uuid::new_v4()),
            title: String::from(title),
            description: String::from("canteen"),
            anonymous: false,
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn login_and_logout() {
    let mut s = server();
    let tok = login(&mut s, "alice", Role::Student).await;
    assert_eq!(s.whoami(tok).unwrap().name, "alice");
    let bad = s.auth(NewSession {
        user: String::from("alice"),
        password: String::from("wrong"),
        device: String::from("test"),
    });
    assert_eq!(bad, Err(Error::PermissionDenied));
    assert_eq!(s.test_session_device(tok), Some("test"));
    s.unauth(tok).unwrap();
    assert_eq!(s.whoami(tok), Err(Error::PermissionDenied));
    assert_eq!(s.test_session_device(tok), None);
}

#[tokio::test]
async fn double_toggle_restores_likes() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let t = topic(&mut s, alice, "exam tomorrow?").await;
    let target = LikeTarget::Topic(t);
    s.like(bob, target).await.unwrap();
    let before = s.topic_detail(alice, t).await.unwrap();
    assert_eq!((before.likes, before.liked), (1, false));

    let first = s.like(alice, target).await.unwrap();
    assert_eq!(first, LikeToggle { liked: true, likes: 2 });
    let second = s.like(alice, target).await.unwrap();
    assert_eq!(second, LikeToggle { liked: false, likes: 1 });
    let after = s.topic_detail(alice, t).await.unwrap();
    assert_eq!((after.likes, after.liked), (before.likes, before.liked));

    let missing = LikeTarget::Comment(CommentId(Uuid::new_v4()));
    assert_eq!(s.like(alice, missing).await, Err(Error::NotFound(missing.uuid())));
}

#[tokio::test]
async fn like_recorded_by_a_concurrent_request() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let t = topic(&mut s, alice, "exam tomorrow?").await;
    let target = LikeTarget::Topic(t);
    s.like(alice, target).await.unwrap();
    s.db.test_stale_like_reads();
    assert_eq!(
        s.like(alice, target).await,
        Ok(LikeToggle { liked: true, likes: 1 })
    );
}

#[tokio::test]
async fn deleting_a_comment_removes_its_replies_only() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let t = Thread::Topic(topic(&mut s, alice, "lunch").await);
    let root = comment(&mut s, alice, t, None).await.unwrap();
    let other = comment(&mut s, bob, t, None).await.unwrap();
    let reply = comment(&mut s, bob, t, Some(root.id)).await.unwrap();
    let other_reply = comment(&mut s, alice, t, Some(other.id)).await.unwrap();
    s.like(alice, LikeTarget::Comment(reply.id)).await.unwrap();

    assert_eq!(
        s.delete_comment(bob, root.id).await,
        Err(Error::PermissionDenied)
    );
    s.delete_comment(alice, root.id).await.unwrap();
    assert_eq!(s.db.fetch_comment(root.id).await.unwrap(), None);
    assert_eq!(s.db.fetch_comment(reply.id).await.unwrap(), None);
    assert_eq!(
        s.db.count_likes(LikeTarget::Comment(reply.id)).await.unwrap(),
        0
    );
    assert_eq!(s.db.fetch_comment(other.id).await.unwrap(), Some(other));
    assert_eq!(
        s.db.fetch_comment(other_reply.id).await.unwrap(),
        Some(other_reply)
    );
}

#[tokio::test]
async fn replies_stay_two_levels_deep() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let t = Thread::Topic(topic(&mut s, alice, "lunch").await);
    let root = comment(&mut s, alice, t, None).await.unwrap();
    s.set_time(t0() + Duration::minutes(1));
    let reply = comment(&mut s, alice, t, Some(root.id)).await.unwrap();
    s.set_time(t0() + Duration::minutes(2));
    let nested = comment(&mut s, alice, t, Some(reply.id)).await.unwrap();
    assert_eq!(nested.parent, Some(root.id));
    let replies = s.comment_replies(alice, root.id).await.unwrap();
    assert_eq!(
        replies.iter().map(|r| r.comment.id).collect::<Vec<_>>(),
        vec![reply.id, nested.id]
    );

    let elsewhere = Thread::Topic(topic(&mut s, alice, "dinner").await);
    assert_eq!(
        comment(&mut s, alice, elsewhere, Some(root.id)).await,
        Err(Error::ParentNotInThread(root.id.0))
    );
}

#[tokio::test]
async fn hot_comments_exclude_replies() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let t = Thread::Topic(topic(&mut s, alice, "sports day").await);
    let mut roots = Vec::new();
    for _ in 0..7 {
        roots.push(comment(&mut s, alice, t, None).await.unwrap());
    }
    for _ in 0..3 {
        let r = comment(&mut s, bob, t, Some(roots[0].id)).await.unwrap();
        s.like(alice, LikeTarget::Comment(r.id)).await.unwrap();
        s.like(bob, LikeTarget::Comment(r.id)).await.unwrap();
    }
    let hot = s.thread_hot_comments(alice, t).await.unwrap();
    assert_eq!(hot.len(), 5);
    assert!(hot.iter().all(|c| c.item.comment.parent.is_none()));
    assert_eq!(hot[0].item.comment.id, roots[0].id);
    assert_eq!(hot[0].item.replies, 3);
}

#[tokio::test]
async fn topic_heat_after_one_day() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let t = topic(&mut s, alice, "heat").await;
    comment(&mut s, bob, Thread::Topic(t), None).await.unwrap();
    s.like(alice, LikeTarget::Topic(t)).await.unwrap();
    s.like(bob, LikeTarget::Topic(t)).await.unwrap();
    s.set_time(t0() + Duration::days(1));
    let view = s.topic_detail(alice, t).await.unwrap();
    assert!((view.heat - 7.11).abs() < 0.01, "got {}", view.heat);
    let board = s.leaderboard(alice).await.unwrap();
    assert_eq!(board.len(), 1);
    assert!((board[0].heat - view.heat).abs() < 1e-9);
}

#[tokio::test]
async fn rating_heat_after_one_day() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let carol = login(&mut s, "carol", Role::Student).await;
    let r = rating(&mut s, alice, "noodles").await;
    for (tok, score) in [(alice, 5), (bob, 4), (carol, 3)] {
        s.rate(tok, r, NewScore { score }).await.unwrap();
    }
    let root = comment(&mut s, bob, Thread::Rating(r), None).await.unwrap();
    comment(&mut s, carol, Thread::Rating(r), Some(root.id))
        .await
        .unwrap();
    s.set_time(t0() + Duration::days(1));
    let view = s.rating_detail(bob, r).await.unwrap();
    assert_eq!(view.user_ratings, 3);
    assert_eq!(view.average, Some(4.0));
    assert_eq!(view.my_score, Some(4));
    assert!((view.heat - 16.17).abs() < 0.01, "got {}", view.heat);
    assert_eq!(view.hot_comments.len(), 1);
}

#[tokio::test]
async fn rerating_overwrites() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let r = rating(&mut s, alice, "noodles").await;
    s.rate(alice, r, NewScore { score: 1 }).await.unwrap();
    s.rate(alice, r, NewScore { score: 5 }).await.unwrap();
    let view = s.rating_detail(alice, r).await.unwrap();
    assert_eq!((view.user_ratings, view.average), (1, Some(5.0)));
    assert_eq!(
        s.rate(alice, r, NewScore { score: 6 }).await,
        Err(Error::InvalidScore(6))
    );
    assert_eq!(
        s.rate(alice, r, NewScore { score: 0 }).await,
        Err(Error::InvalidScore(0))
    );
}

#[tokio::test]
async fn deleting_a_rating_cascades() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let kept = rating(&mut s, alice, "Rice bowl").await;
    let gone = rating(&mut s, alice, "Noodle soup").await;
    s.rate(bob, gone, NewScore { score: 2 }).await.unwrap();
    let root = comment(&mut s, bob, Thread::Rating(gone), None).await.unwrap();
    let reply = comment(&mut s, alice, Thread::Rating(gone), Some(root.id))
        .await
        .unwrap();

    assert_eq!(s.delete_rating(bob, gone).await, Err(Error::PermissionDenied));
    s.delete_rating(alice, gone).await.unwrap();
    let listed = s.list_ratings(bob, RatingFilter::default()).await.unwrap();
    assert_eq!(
        listed.items.iter().map(|r| r.item.rating.id).collect::<Vec<_>>(),
        vec![kept]
    );
    let thread = Thread::Rating(gone);
    assert_eq!(
        s.thread_hot_comments(bob, thread).await,
        Err(Error::NotFound(gone.0))
    );
    assert_eq!(
        s.thread_comments(bob, thread, 1).await,
        Err(Error::NotFound(gone.0))
    );
    assert_eq!(
        s.like(bob, LikeTarget::Comment(root.id)).await,
        Err(Error::NotFound(root.id.0))
    );
    assert_eq!(
        s.comment_replies(bob, root.id).await,
        Err(Error::NotFound(root.id.0))
    );
    assert_eq!(
        comment(&mut s, bob, thread, None).await,
        Err(Error::NotFound(gone.0))
    );
    assert_eq!(s.db.fetch_rating(gone).await.unwrap(), None);
    assert_eq!(s.db.fetch_comment(root.id).await.unwrap(), None);
    assert_eq!(s.db.fetch_comment(reply.id).await.unwrap(), None);
    assert_eq!(s.db.count_user_ratings(gone).await.unwrap(), 0);
    assert_eq!(s.delete_rating(alice, gone).await, Err(Error::NotFound(gone.0)));

    let filter = RatingFilter {
        query: Some(String::from("RICE")),
        ..RatingFilter::default()
    };
    assert_eq!(s.list_ratings(bob, filter).await.unwrap().total, 1);
}

#[tokio::test]
async fn closed_ratings_take_no_engagement() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let admin = login(&mut s, "admin", Role::Admin).await;
    let r = rating(&mut s, alice, "Noodle soup").await;
    let thread = Thread::Rating(r);
    let root = comment(&mut s, alice, thread, None).await.unwrap();

    assert_eq!(s.toggle_rating_active(alice, r).await, Err(Error::PermissionDenied));
    assert_eq!(s.toggle_rating_active(admin, r).await, Ok(false));
    let closed = Err(Error::InactiveRating(r.0));
    assert_eq!(comment(&mut s, alice, thread, None).await.map(|_| ()), closed);
    assert_eq!(
        s.like(alice, LikeTarget::Comment(root.id)).await.map(|_| ()),
        closed
    );
    assert_eq!(s.rate(alice, r, NewScore { score: 4 }).await.map(|_| ()), closed);
    assert_eq!(s.thread_comments(alice, thread, 1).await.map(|_| ()), closed);
    assert_eq!(s.comment_replies(alice, root.id).await.map(|_| ()), closed);
    let listed = s.list_ratings(alice, RatingFilter::default()).await.unwrap();
    assert_eq!(listed.total, 0);

    assert_eq!(s.toggle_rating_active(admin, r).await, Ok(true));
    comment(&mut s, alice, thread, Some(root.id)).await.unwrap();
    s.like(alice, LikeTarget::Comment(root.id)).await.unwrap();
    s.rate(alice, r, NewScore { score: 4 }).await.unwrap();
    assert_eq!(s.thread_comments(alice, thread, 1).await.unwrap().total, 1);
}

#[tokio::test]
async fn roles_are_enforced() {
    let mut s = server();
    let student = login(&mut s, "student", Role::Student).await;
    let other = login(&mut s, "other", Role::Student).await;
    let teacher = login(&mut s, "teacher", Role::Teacher).await;
    let admin = login(&mut s, "admin", Role::Admin).await;

    let t = topic(&mut s, student, "pinned?").await;
    let denied = NewTopic {
        id: TopicId(Uuid::new_v4()),
        title: String::from("teachers do not post"),
        content: String::new(),
        anonymous: false,
    };
    assert_eq!(
        s.create_topic(teacher, denied).await,
        Err(Error::PermissionDenied)
    );
    assert_eq!(s.pin_topic(student, t).await, Err(Error::PermissionDenied));
    assert_eq!(s.delete_topic(other, t).await, Err(Error::PermissionDenied));

    let late = topic(&mut s, other, "newer").await;
    assert_eq!(s.pin_topic(admin, t).await, Ok(true));
    let board = s.leaderboard(student).await.unwrap();
    assert_eq!(board[0].item.topic.id, t);
    assert_eq!(board[1].item.topic.id, late);
    s.delete_topic(admin, t).await.unwrap();

    let me = s.whoami(admin).unwrap().id;
    assert_eq!(s.delete_user(admin, me).await, Err(Error::CannotDeleteSelf));
}

#[tokio::test]
async fn refusals_do_not_reveal_which_ids_exist() {
    let mut s = server();
    s.admin_seed_subjects().await.unwrap();
    let student = login(&mut s, "student", Role::Student).await;
    let teacher = login(&mut s, "teacher", Role::Teacher).await;
    let t = topic(&mut s, student, "lunch").await;
    let c = comment(&mut s, student, Thread::Topic(t), None).await.unwrap();
    let r = rating(&mut s, student, "noodles").await;
    let subject = s.list_subjects(teacher).await.unwrap()[0].id;
    let a = assignment(&mut s, teacher, subject, "").await.unwrap();
    let missing = Uuid::new_v4();

    let denied = Err(Error::PermissionDenied);
    assert_eq!(s.delete_topic(teacher, t).await, denied);
    assert_eq!(s.delete_topic(teacher, TopicId(missing)).await, denied);
    assert_eq!(s.delete_comment(teacher, c.id).await, denied);
    assert_eq!(s.delete_comment(teacher, CommentId(missing)).await, denied);
    assert_eq!(s.delete_rating(teacher, r).await, denied);
    assert_eq!(s.delete_rating(teacher, RatingId(missing)).await, denied);
    assert_eq!(s.assignment_detail(student, a.id).await.map(|_| ()), denied);
    assert_eq!(
        s.assignment_detail(student, AssignmentId(missing)).await.map(|_| ()),
        denied
    );
}

#[tokio::test]
async fn anonymous_authors_are_hidden() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let admin = login(&mut s, "admin", Role::Admin).await;
    let t = s
        .create_topic(
            alice,
            NewTopic {
                id: TopicId(Uuid::new_v4()),
                title: String::from("confession"),
                content: String::new(),
                anonymous: true,
            },
        )
        .await
        .unwrap();
    let alice_id = s.whoami(alice).unwrap().id;
    assert_eq!(s.topic_detail(bob, t.id).await.unwrap().topic.author, UserId::stub());
    assert_eq!(s.topic_detail(alice, t.id).await.unwrap().topic.author, alice_id);
    assert_eq!(s.topic_detail(admin, t.id).await.unwrap().topic.author, alice_id);
    let recent = s.recent_topics(bob, 1).await.unwrap();
    assert_eq!(recent.items[0].author, UserId::stub());
}

#[tokio::test]
async fn deleting_a_user_cascades() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let admin = login(&mut s, "admin", Role::Admin).await;
    let t = topic(&mut s, alice, "mine").await;
    let kept = topic(&mut s, bob, "bob's").await;
    comment(&mut s, bob, Thread::Topic(t), None).await.unwrap();
    let c = comment(&mut s, alice, Thread::Topic(kept), None)
        .await
        .unwrap();
    s.like(alice, LikeTarget::Topic(kept)).await.unwrap();

    let alice_id = s.whoami(alice).unwrap().id;
    s.delete_user(admin, alice_id).await.unwrap();
    assert_eq!(s.whoami(alice), Err(Error::PermissionDenied));
    assert_eq!(s.db.fetch_topic(t).await.unwrap(), None);
    assert_eq!(s.db.fetch_comment(c.id).await.unwrap(), None);
    let view = s.topic_detail(bob, kept).await.unwrap();
    assert_eq!(view.likes, 0);
    assert_eq!(s.db.count_comments(Thread::Topic(t)).await.unwrap(), 0);
    assert_eq!(
        s.delete_user(admin, alice_id).await,
        Err(Error::NotFound(alice_id.0))
    );
}

#[tokio::test]
async fn pagination_of_recent_topics() {
    let mut s = server();
    let alice = login(&mut s, "alice", Role::Student).await;
    let mut ids = Vec::new();
    for i in 0..23 {
        s.set_time(t0() + Duration::minutes(i));
        ids.push(topic(&mut s, alice, &format!("topic {i}")).await);
    }
    ids.reverse();
    let p = s.recent_topics(alice, 3).await.unwrap();
    assert_eq!((p.page, p.num_pages, p.total), (3, 3, 23));
    assert_eq!(p.items.iter().map(|t| t.id).collect::<Vec<_>>(), ids[20..]);
    let p = s.recent_topics(alice, 42).await.unwrap();
    assert_eq!(p.page, 1);
    assert_eq!(p.items.iter().map(|t| t.id).collect::<Vec<_>>(), ids[..10]);
}

#[tokio::test]
async fn seeding_subjects_is_idempotent() {
    let mut s = server();
    let n = hwboard_api::DEFAULT_SUBJECTS.len();
    assert_eq!(s.admin_seed_subjects().await, Ok(n));
    assert_eq!(s.admin_seed_subjects().await, Ok(0));
    let alice = login(&mut s, "alice", Role::Student).await;
    assert_eq!(s.list_subjects(alice).await.unwrap().len(), n);
}

async fn assignment(
    s: &mut MockServer,
    teacher: AuthToken,
    subject: SubjectId,
    description: &str,
) -> Result<Assignment, Error> {
    s.create_assignment(
        teacher,
        NewAssignment {
            id: AssignmentId(Uuid::new_v4()),
            title: String::from("exercises 1-10"),
            description: String::from(description),
            subject,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        },
    )
    .await
}

#[tokio::test]
async fn homework_completion() {
    let mut s = server();
    s.admin_seed_subjects().await.unwrap();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let teacher = login(&mut s, "teacher", Role::Teacher).await;
    let other_teacher = login(&mut s, "other", Role::Teacher).await;
    let subject = s.list_subjects(alice).await.unwrap()[0].id;

    let a = assignment(&mut s, teacher, subject, "  ").await.unwrap();
    assert_eq!(a.description, NO_DESCRIPTION);
    assert_eq!(
        assignment(&mut s, alice, subject, "").await,
        Err(Error::PermissionDenied)
    );

    let record = s.toggle_completion(alice, a.id).await.unwrap();
    assert_eq!(record.completed_at, Some(t0()));
    let stats = s.list_assignments(teacher).await.unwrap();
    assert_eq!(
        (stats[0].completed, stats[0].total, stats[0].percentage),
        (1, 2, 50)
    );
    assert!(s.list_assignments(other_teacher).await.unwrap().is_empty());
    let homework = s.homework(bob).await.unwrap();
    assert_eq!(homework.len(), 1);
    assert_eq!(homework[0].completed_at, None);

    let record = s.toggle_completion(alice, a.id).await.unwrap();
    assert_eq!(record.completed_at, None);
    assert_eq!(
        s.toggle_completion(teacher, a.id).await,
        Err(Error::PermissionDenied)
    );
}

#[tokio::test]
async fn cleanup_of_old_assignments() {
    let mut s = server();
    s.admin_seed_subjects().await.unwrap();
    let teacher = login(&mut s, "teacher", Role::Teacher).await;
    let _student = login(&mut s, "student", Role::Student).await;
    let subject = s.list_subjects(teacher).await.unwrap()[0].id;
    let old = assignment(&mut s, teacher, subject, "old").await.unwrap();
    let borderline = assignment(&mut s, teacher, subject, "borderline").await.unwrap();
    let fresh = assignment(&mut s, teacher, subject, "fresh").await.unwrap();
    let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 8, 0, 0).unwrap();
    s.db.test_set_assignment_date(old.id, day(1) - Duration::days(1));
    s.db.test_set_assignment_date(borderline.id, day(1));

    assert_eq!(
        s.admin_cleanup_assignments(CleanupRequest {
            days: 0,
            dry_run: false
        })
        .await,
        Err(Error::InvalidDays(0))
    );

    let report = s
        .admin_cleanup_assignments(CleanupRequest {
            days: 90,
            dry_run: true,
        })
        .await
        .unwrap();
    assert_eq!(report.cutoff, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(report.assignments.len(), 1);
    assert_eq!(report.assignments[0].assignment.id, old.id);
    assert_eq!(report.assignments[0].total, 1);
    assert!(s.db.fetch_assignment(old.id).await.unwrap().is_some());

    let report = s
        .admin_cleanup_assignments(CleanupRequest {
            days: 90,
            dry_run: false,
        })
        .await
        .unwrap();
    assert_eq!(report.assignments.len(), 1);
    assert_eq!(s.db.fetch_assignment(old.id).await.unwrap(), None);
    assert_eq!(s.db.count_completions(old.id).await.unwrap(), (0, 0));
    assert!(s.db.fetch_assignment(borderline.id).await.unwrap().is_some());
    assert!(s.db.fetch_assignment(fresh.id).await.unwrap().is_some());
}

fn update(subject: SubjectId, title: &str, description: &str) -> AssignmentUpdate {
    AssignmentUpdate {
        title: String::from(title),
        description: String::from(description),
        subject,
        start_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
    }
}

#[tokio::test]
async fn editing_assignments() {
    let mut s = server();
    s.admin_seed_subjects().await.unwrap();
    let alice = login(&mut s, "alice", Role::Student).await;
    let teacher = login(&mut s, "teacher", Role::Teacher).await;
    let other_teacher = login(&mut s, "other", Role::Teacher).await;
    let admin = login(&mut s, "admin", Role::Admin).await;
    let subjects = s.list_subjects(teacher).await.unwrap();
    let a = assignment(&mut s, teacher, subjects[0].id, "read").await.unwrap();
    s.toggle_completion(alice, a.id).await.unwrap();

    let edited = s
        .edit_assignment(teacher, a.id, update(subjects[1].id, " chapter 2 ", ""))
        .await
        .unwrap();
    assert_eq!(edited.title, "chapter 2");
    assert_eq!(edited.description, NO_DESCRIPTION);
    assert_eq!((edited.teacher, edited.date), (a.teacher, a.date));
    assert_eq!(s.db.fetch_assignment(a.id).await.unwrap(), Some(edited));
    assert_eq!(s.homework(alice).await.unwrap()[0].completed_at, Some(t0()));

    assert_eq!(
        s.edit_assignment(other_teacher, a.id, update(subjects[0].id, "mine", ""))
            .await,
        Err(Error::PermissionDenied)
    );
    assert_eq!(
        s.edit_assignment(alice, a.id, update(subjects[0].id, "mine", ""))
            .await,
        Err(Error::PermissionDenied)
    );
    let mut backwards = update(subjects[0].id, "chapter 3", "");
    backwards.end_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    assert_eq!(
        s.edit_assignment(teacher, a.id, backwards).await,
        Err(Error::InvalidDateRange)
    );
    let unknown = SubjectId(Uuid::new_v4());
    assert_eq!(
        s.edit_assignment(teacher, a.id, update(unknown, "chapter 3", ""))
            .await,
        Err(Error::NotFound(unknown.0))
    );
    let missing = AssignmentId(Uuid::new_v4());
    assert_eq!(
        s.edit_assignment(teacher, missing, update(subjects[0].id, "x", ""))
            .await,
        Err(Error::NotFound(missing.0))
    );

    let edited = s
        .edit_assignment(admin, a.id, update(subjects[0].id, "chapter 3", "all of it"))
        .await
        .unwrap();
    assert_eq!(edited.description, "all of it");
    assert_eq!(edited.teacher, a.teacher);
}

#[tokio::test]
async fn assignment_detail_lists_every_student() {
    let mut s = server();
    s.admin_seed_subjects().await.unwrap();
    let bob = login(&mut s, "bob", Role::Student).await;
    let alice = login(&mut s, "alice", Role::Student).await;
    let teacher = login(&mut s, "teacher", Role::Teacher).await;
    let other_teacher = login(&mut s, "other", Role::Teacher).await;
    let admin = login(&mut s, "admin", Role::Admin).await;
    let subject = s.list_subjects(teacher).await.unwrap()[0].id;
    let a = assignment(&mut s, teacher, subject, "").await.unwrap();
    s.toggle_completion(bob, a.id).await.unwrap();

    let detail = s.assignment_detail(teacher, a.id).await.unwrap();
    assert_eq!(
        (detail.stats.completed, detail.stats.total, detail.stats.percentage),
        (1, 2, 50)
    );
    assert_eq!(
        detail
            .records
            .iter()
            .map(|r| (r.student.name.as_str(), r.completed_at))
            .collect::<Vec<_>>(),
        vec![("alice", None), ("bob", Some(t0()))]
    );
    assert_eq!(s.assignment_detail(admin, a.id).await, Ok(detail));
    assert_eq!(
        s.assignment_detail(other_teacher, a.id).await.map(|_| ()),
        Err(Error::PermissionDenied)
    );
    let missing = AssignmentId(Uuid::new_v4());
    assert_eq!(
        s.assignment_detail(teacher, missing).await.map(|_| ()),
        Err(Error::NotFound(missing.0))
    );
}

#[tokio::test]
async fn hidden_subjects_leave_the_homework_list() {
    let mut s = server();
    s.admin_seed_subjects().await.unwrap();
    let alice = login(&mut s, "alice", Role::Student).await;
    let bob = login(&mut s, "bob", Role::Student).await;
    let teacher = login(&mut s, "teacher", Role::Teacher).await;
    let subjects = s.list_subjects(alice).await.unwrap();
    let (math, art) = (subjects[0].id, subjects[1].id);
    assignment(&mut s, teacher, math, "").await.unwrap();
    let kept = assignment(&mut s, teacher, art, "").await.unwrap();

    assert_eq!(s.set_hidden_subjects(alice, vec![math, math]).await, Ok(vec![math]));
    assert_eq!(s.hidden_subjects(alice).await, Ok(vec![math]));
    let homework = s.homework(alice).await.unwrap();
    assert_eq!(
        homework.iter().map(|h| h.assignment.id).collect::<Vec<_>>(),
        vec![kept.id]
    );
    assert_eq!(s.homework(bob).await.unwrap().len(), 2);

    let unknown = SubjectId(Uuid::new_v4());
    assert_eq!(
        s.set_hidden_subjects(alice, vec![art, unknown]).await,
        Err(Error::NotFound(unknown.0))
    );
    assert_eq!(s.hidden_subjects(alice).await, Ok(vec![math]));
    assert_eq!(
        s.set_hidden_subjects(teacher, vec![math]).await,
        Err(Error::PermissionDenied)
    );

    s.set_hidden_subjects(alice, Vec::new()).await.unwrap();
    assert_eq!(s.homework(alice).await.unwrap().len(), 2);
}
