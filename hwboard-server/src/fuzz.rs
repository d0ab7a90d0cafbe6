#![cfg(test)]

use async_recursion::async_recursion;
use bolero::generator::TypeGenerator;
use axum::{
    extract::FromRequestParts,
    http::{self, request},
};
use hwboard_api::{
    Comment, CommentId, CommentStats, Error as ApiError, LikeTarget, LikeToggle, NewComment,
    NewRating, NewScore, NewSession, NewTopic, NewUser, Page, Ranked, Rating, RatingId,
    RatingView, Role, Thread, Topic, TopicId, TopicStats, TopicView, User, UserId, UserRating,
};
use hwboard_mock_server::MockServer;
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn build_pg_cluster(data: &Path) -> Option<postgresfixture::cluster::Cluster> {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    Some(postgresfixture::cluster::Cluster::new(data, runtime?))
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let Some(cluster) = build_pg_cluster(datadir_path) else {
                eprintln!("postgresql is not installed in path, skipping {}", stringify!($name));
                return;
            };
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                // create test db
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!("postgresql://?host={}&dbname=test_db", datadir_path)).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            // cleanup
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        // resume the panics
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::PermissionDenied)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

/// Ids are picked among a handful of values, for operations to hit the
/// same objects often
#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        role: u8,
        name: u8,
    },
    Auth {
        uid: usize,
        device: u8,
    },
    Unauth {
        sid: usize,
    },
    CreateTopic {
        sid: usize,
        id: u8,
        anonymous: bool,
        empty_title: bool,
    },
    DeleteTopic {
        sid: usize,
        id: u8,
    },
    PinTopic {
        sid: usize,
        id: u8,
    },
    LikeTopic {
        sid: usize,
        id: u8,
    },
    CreateComment {
        sid: usize,
        id: u8,
        on_rating: bool,
        thread: u8,
        parent: Option<u8>,
        empty: bool,
    },
    DeleteComment {
        sid: usize,
        id: u8,
    },
    LikeComment {
        sid: usize,
        id: u8,
    },
    CreateRating {
        sid: usize,
        id: u8,
        anonymous: bool,
    },
    Rate {
        sid: usize,
        id: u8,
        score: u8,
    },
    DeleteRating {
        sid: usize,
        id: u8,
    },
    ToggleRatingActive {
        sid: usize,
        id: u8,
    },
    CheckTopic {
        sid: usize,
        id: u8,
    },
    CheckRating {
        sid: usize,
        id: u8,
    },
    CheckComments {
        sid: usize,
        on_rating: bool,
        thread: u8,
    },
    CheckLeaderboard {
        sid: usize,
    },
}

fn small_uuid(prefix: u128, id: u8) -> Uuid {
    Uuid::from_u128((prefix << 64) | u128::from(id % 8))
}

fn topic_id(id: u8) -> TopicId {
    TopicId(small_uuid(1, id))
}

fn comment_id(id: u8) -> CommentId {
    CommentId(small_uuid(2, id))
}

fn rating_id(id: u8) -> RatingId {
    RatingId(small_uuid(3, id))
}

fn thread(on_rating: bool, id: u8) -> Thread {
    match on_rating {
        false => Thread::Topic(topic_id(id)),
        true => Thread::Rating(rating_id(id)),
    }
}

fn thread_path(thread: Thread) -> String {
    match thread {
        Thread::Topic(t) => format!("/api/threads/topic/{}", t.0),
        Thread::Rating(r) => format!("/api/threads/rating/{}", r.0),
    }
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        if std::any::TypeId::of::<Resp>() == std::any::TypeId::of::<()>() {
            // the server returns an empty string in this situation, which does not parse properly with serde_json
            return Ok(serde_json::from_slice(b"null").unwrap());
        } else {
            return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
                panic!(
                    r#"
                        Failed parsing resp body!

                        The error is the following:
                        ---
                        {err}
                        ---

                        Response body is:
                        ---
                        {body:?}
                        ---

                        Request was:
                        ---
                        {req_body:?}
                        ---
                    "#
                )
            }));
        }
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

/// Averages go through a float conversion in postgres
fn rounded(average: Option<f64>) -> Option<i64> {
    average.map(|a| (a * 1000.0).round() as i64)
}

/// What the topic leaderboard shows that does not depend on the clock
fn board_summary(board: Vec<Ranked<TopicStats>>) -> (usize, Vec<(TopicId, bool)>) {
    let len = board.len();
    let mut topics = board
        .into_iter()
        .map(|t| (t.item.topic.id, t.item.topic.pinned))
        .collect::<Vec<_>>();
    topics.sort();
    // with more topics, which ones make it depends on their age
    if len >= 10 {
        topics.retain(|(_, pinned)| *pinned);
    }
    (len, topics)
}

#[derive(Clone, Copy)]
struct Session {
    app: AuthToken,
    mock: AuthToken,
}

struct ComparativeFuzzer {
    admin_token: Uuid,
    app: Router,
    mock: MockServer,
    sessions: Vec<Session>,
}

impl ComparativeFuzzer {
    async fn new(pool: PgPool) -> ComparativeFuzzer {
        let admin_token = Uuid::new_v4();
        let app = app(pool, Some(AuthToken(admin_token))).await;
        let mock = MockServer::new();
        let sessions = Vec::new();
        ComparativeFuzzer {
            admin_token,
            app,
            mock,
            sessions,
        }
    }

    /// Returns a session, logging a user in first if there is none yet
    async fn session(&mut self, sid: usize) -> Option<Session> {
        if self.sessions.is_empty() {
            self.execute_fuzz_op(FuzzOp::Auth { uid: 0, device: 0 })
                .await;
        }
        resize_int(sid, ..self.sessions.len()).map(|sid| self.sessions[sid])
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser { role, name } => {
                let role = match role % 3 {
                    0 => Role::Student,
                    1 => Role::Teacher,
                    _ => Role::Admin,
                };
                let new_user = NewUser {
                    id: UserId(Uuid::new_v4()),
                    name: format!("user{}", name % 16),
                    role,
                    student_id: None,
                    // no hashing for tests
                    initial_password_hash: String::from("password"),
                };
                let pass = new_user.initial_password_hash.clone();
                compare::<User>(
                    "CreateUser",
                    run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-user",
                        Some(self.admin_token),
                        &new_user,
                    )
                    .await,
                    self.mock.admin_create_user(new_user, pass).await,
                )
            }
            FuzzOp::Auth { uid, device } => {
                if let Some(uid) = resize_int(uid, ..self.mock.test_num_users()) {
                    let (user, password) = self.mock.test_get_user_info(uid);
                    let session = NewSession {
                        user: String::from(user),
                        password: String::from(password),
                        device: format!("device{device}"),
                    };
                    let app_tok =
                        run_on_app(&mut self.app, "POST", "/api/auth", None, &session).await;
                    let mock_tok = self.mock.auth(session);
                    if let (&Ok(app), &Ok(mock)) = (&app_tok, &mock_tok) {
                        self.sessions.push(Session { app, mock });
                    }
                    compare("Auth", app_tok.map(|_| ()), mock_tok.map(|_| ()));
                } else {
                    self.execute_fuzz_op(FuzzOp::CreateUser { role: 0, name: 0 })
                        .await;
                    if self.mock.test_num_users() > 0 {
                        self.execute_fuzz_op(FuzzOp::Auth { uid, device }).await;
                    }
                }
            }
            FuzzOp::Unauth { sid } => {
                if let Some(sid) = resize_int(sid, ..self.sessions.len()) {
                    let Session { app, mock } = self.sessions.remove(sid);
                    compare::<()>(
                        "Unauth",
                        run_on_app(&mut self.app, "POST", "/api/unauth", Some(app.0), &()).await,
                        self.mock.unauth(mock),
                    );
                }
            }
            FuzzOp::CreateTopic {
                sid,
                id,
                anonymous,
                empty_title,
            } => {
                let Some(s) = self.session(sid).await else { return };
                let t = NewTopic {
                    id: topic_id(id),
                    title: match empty_title {
                        true => String::from(" "),
                        false => format!("topic {id}"),
                    },
                    content: String::from("fuzzed"),
                    anonymous,
                };
                let app: Result<Topic, _> =
                    run_on_app(&mut self.app, "POST", "/api/topics", Some(s.app.0), &t).await;
                let mock = self.mock.create_topic(s.mock, t).await;
                compare(
                    "CreateTopic",
                    app.map(|t| (t.id, t.author, t.title, t.pinned)),
                    mock.map(|t| (t.id, t.author, t.title, t.pinned)),
                );
            }
            FuzzOp::DeleteTopic { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let t = topic_id(id);
                let uri = format!("/api/topics/{}/delete", t.0);
                compare::<()>(
                    "DeleteTopic",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &()).await,
                    self.mock.delete_topic(s.mock, t).await,
                );
            }
            FuzzOp::PinTopic { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let t = topic_id(id);
                let uri = format!("/api/topics/{}/pin", t.0);
                compare::<bool>(
                    "PinTopic",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &()).await,
                    self.mock.pin_topic(s.mock, t).await,
                );
            }
            FuzzOp::LikeTopic { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let t = topic_id(id);
                let uri = format!("/api/topics/{}/like", t.0);
                compare::<LikeToggle>(
                    "LikeTopic",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &()).await,
                    self.mock.like(s.mock, LikeTarget::Topic(t)).await,
                );
            }
            FuzzOp::CreateComment {
                sid,
                id,
                on_rating,
                thread: thread_id,
                parent,
                empty,
            } => {
                let Some(s) = self.session(sid).await else { return };
                let c = NewComment {
                    id: comment_id(id),
                    thread: thread(on_rating, thread_id),
                    parent: parent.map(comment_id),
                    content: match empty {
                        true => String::new(),
                        false => format!("comment {id}"),
                    },
                    anonymous: false,
                };
                let app: Result<Comment, _> =
                    run_on_app(&mut self.app, "POST", "/api/comments", Some(s.app.0), &c).await;
                let mock = self.mock.create_comment(s.mock, c).await;
                compare(
                    "CreateComment",
                    app.map(|c| (c.id, c.thread, c.parent, c.author)),
                    mock.map(|c| (c.id, c.thread, c.parent, c.author)),
                );
            }
            FuzzOp::DeleteComment { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let c = comment_id(id);
                let uri = format!("/api/comments/{}/delete", c.0);
                compare::<()>(
                    "DeleteComment",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &()).await,
                    self.mock.delete_comment(s.mock, c).await,
                );
            }
            FuzzOp::LikeComment { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let c = comment_id(id);
                let uri = format!("/api/comments/{}/like", c.0);
                compare::<LikeToggle>(
                    "LikeComment",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &()).await,
                    self.mock.like(s.mock, LikeTarget::Comment(c)).await,
                );
            }
            FuzzOp::CreateRating { sid, id, anonymous } => {
                let Some(s) = self.session(sid).await else { return };
                let r = NewRating {
                    id: rating_id(id),
                    title: format!("dish {id}"),
                    description: String::from("fuzzed"),
                    anonymous,
                };
                let app: Result<Rating, _> =
                    run_on_app(&mut self.app, "POST", "/api/ratings", Some(s.app.0), &r).await;
                let mock = self.mock.create_rating(s.mock, r).await;
                compare(
                    "CreateRating",
                    app.map(|r| (r.id, r.author, r.active)),
                    mock.map(|r| (r.id, r.author, r.active)),
                );
            }
            FuzzOp::Rate { sid, id, score } => {
                let Some(s) = self.session(sid).await else { return };
                let r = rating_id(id);
                let score = NewScore { score: score % 7 };
                let uri = format!("/api/ratings/{}/rate", r.0);
                compare::<UserRating>(
                    "Rate",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &score).await,
                    self.mock.rate(s.mock, r, score).await,
                );
            }
            FuzzOp::DeleteRating { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let r = rating_id(id);
                let uri = format!("/api/ratings/{}/delete", r.0);
                compare::<()>(
                    "DeleteRating",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &()).await,
                    self.mock.delete_rating(s.mock, r).await,
                );
            }
            FuzzOp::ToggleRatingActive { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let r = rating_id(id);
                let uri = format!("/api/ratings/{}/toggle-active", r.0);
                compare::<bool>(
                    "ToggleRatingActive",
                    run_on_app(&mut self.app, "POST", &uri, Some(s.app.0), &()).await,
                    self.mock.toggle_rating_active(s.mock, r).await,
                );
            }
            FuzzOp::CheckTopic { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let t = topic_id(id);
                let uri = format!("/api/topics/{}", t.0);
                let app: Result<TopicView, _> =
                    run_on_app(&mut self.app, "GET", &uri, Some(s.app.0), &()).await;
                let mock = self.mock.topic_detail(s.mock, t).await;
                let summary = |v: TopicView| {
                    (
                        v.topic.author,
                        v.topic.pinned,
                        v.likes,
                        v.liked,
                        v.hot_comments.len(),
                    )
                };
                compare("CheckTopic", app.map(summary), mock.map(summary));
            }
            FuzzOp::CheckRating { sid, id } => {
                let Some(s) = self.session(sid).await else { return };
                let r = rating_id(id);
                let uri = format!("/api/ratings/{}", r.0);
                let app: Result<RatingView, _> =
                    run_on_app(&mut self.app, "GET", &uri, Some(s.app.0), &()).await;
                let mock = self.mock.rating_detail(s.mock, r).await;
                let summary = |v: RatingView| {
                    (
                        v.rating.author,
                        v.rating.active,
                        v.user_ratings,
                        rounded(v.average),
                        v.my_score,
                        v.hot_comments.len(),
                    )
                };
                compare("CheckRating", app.map(summary), mock.map(summary));
            }
            FuzzOp::CheckComments {
                sid,
                on_rating,
                thread: thread_id,
            } => {
                let Some(s) = self.session(sid).await else { return };
                let t = thread(on_rating, thread_id);
                let uri = format!("{}/comments", thread_path(t));
                let app: Result<Page<CommentStats>, _> =
                    run_on_app(&mut self.app, "GET", &uri, Some(s.app.0), &()).await;
                let mock = self.mock.thread_comments(s.mock, t, 1).await;
                let summary = |p: Page<CommentStats>| {
                    let mut ids = p
                        .items
                        .iter()
                        .map(|c| (c.comment.id, c.likes, c.replies))
                        .collect::<Vec<_>>();
                    ids.sort();
                    (p.total, p.num_pages, ids)
                };
                compare("CheckComments", app.map(summary), mock.map(summary));
            }
            FuzzOp::CheckLeaderboard { sid } => {
                let Some(s) = self.session(sid).await else { return };
                let app: Result<Vec<Ranked<TopicStats>>, _> =
                    run_on_app(&mut self.app, "GET", "/api/topics", Some(s.app.0), &()).await;
                let mock = self.mock.leaderboard(s.mock).await;
                compare(
                    "CheckLeaderboard",
                    app.map(board_summary),
                    mock.map(board_summary),
                );
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..100usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
