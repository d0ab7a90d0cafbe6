use anyhow::Context;
use axum::{
    extract::{Path, Query},
    Json,
};
use hwboard_api::{
    AssignmentDetail, AssignmentId, AssignmentStats, AssignmentUpdate, AuthToken, CleanupReport,
    CleanupRequest, Comment, CommentId, CommentStats, CompletionRecord, Db, Homework, LikeTarget,
    LikeToggle, NewAssignment, NewComment, NewRating, NewScore, NewSession, NewTopic, NewUser,
    Page, Ranked, Rating, RatingFilter, RatingId, RatingStats, RatingView, Subject, SubjectId,
    Thread, Topic, TopicId, TopicStats, TopicView, User, UserId, UserRating, Uuid,
};

use crate::{db, extractors::*, now, Error};

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PageQuery {
    page: usize,
}

fn thread(kind: &str, id: Uuid) -> Result<Thread, Error> {
    match kind {
        "topic" => Ok(Thread::Topic(TopicId(id))),
        "rating" => Ok(Thread::Rating(RatingId(id))),
        _ => Err(Error::not_found(id)),
    }
}

pub async fn auth(
    mut conn: PgConn,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn unauth(user: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::permission_denied()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<User> {
    Json(user)
}

pub async fn admin_create_user(
    AdminAuth(admin): AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewUser>,
) -> Result<Json<User>, Error> {
    Ok(Json(
        hwboard_api::create_user(&mut conn.db(), &admin, data).await??,
    ))
}

pub async fn admin_seed_subjects(
    AdminAuth(admin): AdminAuth,
    mut conn: PgConn,
) -> Result<Json<usize>, Error> {
    Ok(Json(
        hwboard_api::seed_subjects(&mut conn.db(), &admin).await??,
    ))
}

pub async fn admin_cleanup_assignments(
    AdminAuth(admin): AdminAuth,
    mut conn: PgConn,
    Json(req): Json<CleanupRequest>,
) -> Result<Json<CleanupReport>, Error> {
    Ok(Json(
        hwboard_api::cleanup_assignments(&mut conn.db(), &admin, req, now().date_naive())
            .await??,
    ))
}

pub async fn delete_user(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(target): Json<UserId>,
) -> Result<(), Error> {
    Ok(hwboard_api::delete_user(&mut conn.db(), &user, target).await??)
}

pub async fn leaderboard(
    Auth(user): Auth,
    mut conn: PgConn,
) -> Result<Json<Vec<Ranked<TopicStats>>>, Error> {
    Ok(Json(
        hwboard_api::leaderboard(&mut conn.db(), &user, now()).await??,
    ))
}

pub async fn recent_topics(
    Auth(user): Auth,
    mut conn: PgConn,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<Topic>>, Error> {
    Ok(Json(
        hwboard_api::recent_topics(&mut conn.db(), &user, q.page).await??,
    ))
}

pub async fn create_topic(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(t): Json<NewTopic>,
) -> Result<Json<Topic>, Error> {
    Ok(Json(
        hwboard_api::create_topic(&mut conn.db(), &user, t, now()).await??,
    ))
}

pub async fn topic_detail(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<TopicView>, Error> {
    Ok(Json(
        hwboard_api::topic_detail(&mut conn.db(), &user, TopicId(id), now()).await??,
    ))
}

pub async fn delete_topic(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    Ok(hwboard_api::delete_topic(&mut conn.db(), &user, TopicId(id)).await??)
}

pub async fn pin_topic(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<bool>, Error> {
    Ok(Json(
        hwboard_api::toggle_pin(&mut conn.db(), &user, TopicId(id)).await??,
    ))
}

pub async fn like_topic(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeToggle>, Error> {
    Ok(Json(
        hwboard_api::toggle_like(&mut conn.db(), &user, LikeTarget::Topic(TopicId(id))).await??,
    ))
}

pub async fn thread_comments(
    Auth(user): Auth,
    mut conn: PgConn,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<CommentStats>>, Error> {
    let thread = thread(&kind, id)?;
    Ok(Json(
        hwboard_api::list_comments(&mut conn.db(), &user, thread, q.page).await??,
    ))
}

pub async fn thread_hot_comments(
    Auth(user): Auth,
    mut conn: PgConn,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<Ranked<CommentStats>>>, Error> {
    let thread = thread(&kind, id)?;
    Ok(Json(
        hwboard_api::hot_comments(&mut conn.db(), &user, thread, now()).await??,
    ))
}

pub async fn create_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(c): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(
        hwboard_api::create_comment(&mut conn.db(), &user, c, now()).await??,
    ))
}

pub async fn comment_replies(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentStats>>, Error> {
    Ok(Json(
        hwboard_api::list_replies(&mut conn.db(), &user, CommentId(id)).await??,
    ))
}

pub async fn delete_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    Ok(hwboard_api::delete_comment(&mut conn.db(), &user, CommentId(id)).await??)
}

pub async fn like_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeToggle>, Error> {
    Ok(Json(
        hwboard_api::toggle_like(&mut conn.db(), &user, LikeTarget::Comment(CommentId(id)))
            .await??,
    ))
}

pub async fn list_ratings(
    Auth(user): Auth,
    mut conn: PgConn,
    Query(filter): Query<RatingFilter>,
) -> Result<Json<Page<Ranked<RatingStats>>>, Error> {
    Ok(Json(
        hwboard_api::list_ratings(&mut conn.db(), &user, filter, now()).await??,
    ))
}

pub async fn create_rating(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(r): Json<NewRating>,
) -> Result<Json<Rating>, Error> {
    Ok(Json(
        hwboard_api::create_rating(&mut conn.db(), &user, r, now()).await??,
    ))
}

pub async fn rating_detail(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<RatingView>, Error> {
    Ok(Json(
        hwboard_api::rating_detail(&mut conn.db(), &user, RatingId(id), now()).await??,
    ))
}

pub async fn rate(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
    Json(score): Json<NewScore>,
) -> Result<Json<UserRating>, Error> {
    Ok(Json(
        hwboard_api::rate(&mut conn.db(), &user, RatingId(id), score).await??,
    ))
}

pub async fn delete_rating(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    Ok(hwboard_api::delete_rating(&mut conn.db(), &user, RatingId(id)).await??)
}

pub async fn toggle_rating_active(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<bool>, Error> {
    Ok(Json(
        hwboard_api::toggle_rating_active(&mut conn.db(), &user, RatingId(id)).await??,
    ))
}

pub async fn list_subjects(
    Auth(_user): Auth,
    mut conn: PgConn,
) -> Result<Json<Vec<Subject>>, Error> {
    Ok(Json(conn.db().list_subjects().await?))
}

pub async fn list_assignments(
    Auth(user): Auth,
    mut conn: PgConn,
) -> Result<Json<Vec<AssignmentStats>>, Error> {
    let teacher = match user.role {
        hwboard_api::Role::Admin => None,
        _ => Some(user.id),
    };
    Ok(Json(
        hwboard_api::teacher_assignments(&mut conn.db(), &user, teacher).await??,
    ))
}

pub async fn create_assignment(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(a): Json<NewAssignment>,
) -> Result<Json<hwboard_api::Assignment>, Error> {
    Ok(Json(
        hwboard_api::create_assignment(&mut conn.db(), &user, a, now()).await??,
    ))
}

pub async fn assignment_detail(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentDetail>, Error> {
    Ok(Json(
        hwboard_api::assignment_detail(&mut conn.db(), &user, AssignmentId(id)).await??,
    ))
}

pub async fn edit_assignment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
    Json(update): Json<AssignmentUpdate>,
) -> Result<Json<hwboard_api::Assignment>, Error> {
    Ok(Json(
        hwboard_api::update_assignment(&mut conn.db(), &user, AssignmentId(id), update).await??,
    ))
}

pub async fn delete_assignment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    Ok(hwboard_api::delete_assignment(&mut conn.db(), &user, AssignmentId(id)).await??)
}

pub async fn toggle_completion(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionRecord>, Error> {
    Ok(Json(
        hwboard_api::toggle_completion(&mut conn.db(), &user, AssignmentId(id), now()).await??,
    ))
}

pub async fn homework(
    Auth(user): Auth,
    mut conn: PgConn,
) -> Result<Json<Vec<Homework>>, Error> {
    Ok(Json(
        hwboard_api::student_assignments(&mut conn.db(), &user).await??,
    ))
}

pub async fn hidden_subjects(
    Auth(user): Auth,
    mut conn: PgConn,
) -> Result<Json<Vec<SubjectId>>, Error> {
    Ok(Json(
        hwboard_api::hidden_subjects(&mut conn.db(), &user).await??,
    ))
}

pub async fn set_hidden_subjects(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(subjects): Json<Vec<SubjectId>>,
) -> Result<Json<Vec<SubjectId>>, Error> {
    Ok(Json(
        hwboard_api::set_hidden_subjects(&mut conn.db(), &user, subjects).await??,
    ))
}
