use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::{policy::Action, Db, Error, Role, SubjectId, Time, User, UserId};

/// Stored in place of an empty assignment description
pub const NO_DESCRIPTION: &str = "暂无";

/// Cleanups further back than this many days all behave the same
const MAX_CLEANUP_DAYS: i64 = 1_000_000;

pub const DEFAULT_CLEANUP_DAYS: i64 = 90;

fn default_cleanup_days() -> i64 {
    DEFAULT_CLEANUP_DAYS
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct AssignmentId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub title: String,
    pub description: String,
    pub teacher: UserId,
    pub subject: SubjectId,
    pub start_date: NaiveDate,
    /// Inclusive: the assignment is due at the end of this day
    pub end_date: NaiveDate,
    /// Creation time
    pub date: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewAssignment {
    pub id: AssignmentId,
    pub title: String,
    pub description: String,
    pub subject: SubjectId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl NewAssignment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_fields(&self.title, &self.description, self.start_date, self.end_date)
    }
}

/// New contents for an existing assignment
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AssignmentUpdate {
    pub title: String,
    pub description: String,
    pub subject: SubjectId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl AssignmentUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_fields(&self.title, &self.description, self.start_date, self.end_date)
    }
}

fn validate_fields(
    title: &str,
    description: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<(), Error> {
    crate::validate_string(title)?;
    crate::validate_string(description)?;
    if title.trim().is_empty() {
        return Err(Error::EmptyTitle);
    }
    if end_date < start_date {
        return Err(Error::InvalidDateRange);
    }
    Ok(())
}

fn description_or_placeholder(description: &str) -> String {
    match description.trim() {
        "" => String::from(NO_DESCRIPTION),
        d => String::from(d),
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CompletionRecord {
    pub student: UserId,
    pub assignment: AssignmentId,
    pub completed_at: Option<Time>,
}

impl CompletionRecord {
    pub fn completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AssignmentStats {
    pub assignment: Assignment,
    pub completed: u64,
    pub total: u64,
    /// Rounded down, 0 when no student has a record
    pub percentage: u8,
}

impl AssignmentStats {
    fn new(assignment: Assignment, completed: u64, total: u64) -> AssignmentStats {
        let percentage = match total {
            0 => 0,
            _ => u8::try_from(completed.min(total) * 100 / total).unwrap_or(100),
        };
        AssignmentStats {
            assignment,
            completed,
            total,
            percentage,
        }
    }
}

/// An assignment as seen by a student
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Homework {
    pub assignment: Assignment,
    pub completed_at: Option<Time>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CleanupRequest {
    #[serde(default = "default_cleanup_days")]
    pub days: i64,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CleanupReport {
    /// Assignments created before this day are (or would be) deleted
    pub cutoff: NaiveDate,
    pub dry_run: bool,
    pub assignments: Vec<AssignmentStats>,
}

/// Creates an assignment and an open completion record for every student
pub async fn create_assignment<D: Db>(
    db: &mut D,
    actor: &User,
    a: NewAssignment,
    now: Time,
) -> anyhow::Result<Result<Assignment, Error>> {
    ensure_allowed!(actor, Action::CreateAssignment);
    api_try!(a.validate());
    if !db.list_subjects().await?.iter().any(|s| s.id == a.subject) {
        return Ok(Err(Error::NotFound(a.subject.0)));
    }
    let assignment = Assignment {
        id: a.id,
        title: String::from(a.title.trim()),
        description: description_or_placeholder(&a.description),
        teacher: actor.id,
        subject: a.subject,
        start_date: a.start_date,
        end_date: a.end_date,
        date: now,
    };
    if !db.insert_assignment(&assignment).await? {
        return Ok(Err(Error::UuidAlreadyUsed(assignment.id.0)));
    }
    let students = db.list_users(Role::Student).await?;
    for s in students.iter() {
        db.insert_completion_record(s.id, assignment.id).await?;
    }
    tracing::info!(
        assignment = ?assignment.id,
        teacher = ?actor.id,
        students = students.len(),
        "created assignment"
    );
    Ok(Ok(assignment))
}

async fn assignment_stats<D: Db>(db: &mut D, a: Assignment) -> anyhow::Result<AssignmentStats> {
    let (completed, total) = db.count_completions(a.id).await?;
    Ok(AssignmentStats::new(a, completed, total))
}

/// Assignments of `teacher` (or of everyone for `None`), newest first,
/// with their completion statistics
pub async fn teacher_assignments<D: Db>(
    db: &mut D,
    actor: &User,
    teacher: Option<UserId>,
) -> anyhow::Result<Result<Vec<AssignmentStats>, Error>> {
    match teacher {
        Some(teacher) => ensure_allowed!(actor, Action::ViewAssignments { teacher }),
        None => ensure_allowed!(actor, Action::ViewAllAssignments),
    }
    let mut assignments = db.list_assignments(teacher).await?;
    assignments.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    let mut res = Vec::with_capacity(assignments.len());
    for a in assignments {
        res.push(assignment_stats(db, a).await?);
    }
    Ok(Ok(res))
}

/// The actor's own assignments, soonest due first, leaving out the
/// subjects they hid
pub async fn student_assignments<D: Db>(
    db: &mut D,
    actor: &User,
) -> anyhow::Result<Result<Vec<Homework>, Error>> {
    ensure_allowed!(actor, Action::ViewHomework);
    let hidden = db.list_hidden_subjects(actor.id).await?;
    let mut res = Vec::new();
    for r in db.list_completion_records(actor.id).await? {
        if let Some(assignment) = db.fetch_assignment(r.assignment).await? {
            if hidden.contains(&assignment.subject) {
                continue;
            }
            res.push(Homework {
                assignment,
                completed_at: r.completed_at,
            });
        }
    }
    res.sort_by(|a, b| {
        (a.assignment.end_date.cmp(&b.assignment.end_date))
            .then_with(|| b.assignment.date.cmp(&a.assignment.date))
            .then_with(|| a.assignment.id.cmp(&b.assignment.id))
    });
    Ok(Ok(res))
}

/// One student's line in an assignment's detail
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StudentRecord {
    pub student: User,
    pub completed_at: Option<Time>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AssignmentDetail {
    pub stats: AssignmentStats,
    /// Ordered by student name
    pub records: Vec<StudentRecord>,
}

/// Fetches an assignment the actor may manage. Students are refused
/// before the lookup, so they cannot tell which ids exist.
async fn fetch_managed<D: Db>(
    db: &mut D,
    actor: &User,
    a: AssignmentId,
    action: fn(UserId) -> Action,
) -> anyhow::Result<Result<Assignment, Error>> {
    ensure_allowed!(actor, action(actor.id));
    let assignment = api_try!(db.fetch_assignment(a).await?.ok_or(Error::NotFound(a.0)));
    ensure_allowed!(actor, action(assignment.teacher));
    Ok(Ok(assignment))
}

/// Rewrites an assignment. Its teacher, creation time and completion
/// records are kept.
pub async fn update_assignment<D: Db>(
    db: &mut D,
    actor: &User,
    a: AssignmentId,
    update: AssignmentUpdate,
) -> anyhow::Result<Result<Assignment, Error>> {
    let old = api_try!(fetch_managed(db, actor, a, |teacher| Action::EditAssignment { teacher }).await?);
    api_try!(update.validate());
    if !db.list_subjects().await?.iter().any(|s| s.id == update.subject) {
        return Ok(Err(Error::NotFound(update.subject.0)));
    }
    let assignment = Assignment {
        title: String::from(update.title.trim()),
        description: description_or_placeholder(&update.description),
        subject: update.subject,
        start_date: update.start_date,
        end_date: update.end_date,
        ..old
    };
    if !db.update_assignment(&assignment).await? {
        // deleted concurrently
        return Ok(Err(Error::NotFound(a.0)));
    }
    tracing::info!(assignment = ?a, by = ?actor.id, "updated assignment");
    Ok(Ok(assignment))
}

/// Completion statistics of an assignment along with every student's record
pub async fn assignment_detail<D: Db>(
    db: &mut D,
    actor: &User,
    a: AssignmentId,
) -> anyhow::Result<Result<AssignmentDetail, Error>> {
    let assignment = api_try!(
        fetch_managed(db, actor, a, |teacher| Action::ViewAssignments { teacher }).await?
    );
    let stats = assignment_stats(db, assignment).await?;
    let mut records = Vec::new();
    for r in db.list_assignment_records(a).await? {
        if let Some(student) = db.fetch_user(r.student).await? {
            records.push(StudentRecord {
                student,
                completed_at: r.completed_at,
            });
        }
    }
    records.sort_by(|a, b| {
        (a.student.name.cmp(&b.student.name)).then_with(|| a.student.id.cmp(&b.student.id))
    });
    Ok(Ok(AssignmentDetail { stats, records }))
}

/// Flips the actor's completion of the assignment and returns the new record
pub async fn toggle_completion<D: Db>(
    db: &mut D,
    actor: &User,
    a: AssignmentId,
    now: Time,
) -> anyhow::Result<Result<CompletionRecord, Error>> {
    ensure_allowed!(actor, Action::ToggleCompletion);
    let record = api_try!(db
        .fetch_completion_record(actor.id, a)
        .await?
        .ok_or(Error::NotFound(a.0)));
    let completed_at = match record.completed() {
        true => None,
        false => Some(now),
    };
    db.set_completion(actor.id, a, completed_at).await?;
    tracing::debug!(student = ?actor.id, assignment = ?a, completed = completed_at.is_some(), "toggled completion");
    Ok(Ok(CompletionRecord {
        completed_at,
        ..record
    }))
}

pub async fn delete_assignment<D: Db>(
    db: &mut D,
    actor: &User,
    a: AssignmentId,
) -> anyhow::Result<Result<(), Error>> {
    ensure_allowed!(actor, Action::DeleteAssignment);
    if !db.delete_assignment(a).await? {
        return Ok(Err(Error::NotFound(a.0)));
    }
    tracing::info!(assignment = ?a, by = ?actor.id, "deleted assignment");
    Ok(Ok(()))
}

/// Day before which assignments are old enough to be cleaned up
pub fn cleanup_cutoff(today: NaiveDate, days: i64) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(days.min(MAX_CLEANUP_DAYS)))
        .unwrap_or(NaiveDate::MIN)
}

/// Deletes the assignments created strictly before `today - days`, along
/// with their completion records. With `dry_run`, only reports them.
pub async fn cleanup_assignments<D: Db>(
    db: &mut D,
    actor: &User,
    req: CleanupRequest,
    today: NaiveDate,
) -> anyhow::Result<Result<CleanupReport, Error>> {
    ensure_allowed!(actor, Action::CleanupAssignments);
    if req.days <= 0 {
        return Ok(Err(Error::InvalidDays(req.days)));
    }
    let cutoff = cleanup_cutoff(today, req.days);
    let mut assignments = Vec::new();
    for a in db.list_assignments_created_before(cutoff).await? {
        assignments.push(assignment_stats(db, a).await?);
    }
    assignments.sort_by(|a, b| {
        (a.assignment.date.cmp(&b.assignment.date))
            .then_with(|| a.assignment.id.cmp(&b.assignment.id))
    });
    if !req.dry_run {
        for a in assignments.iter() {
            db.delete_assignment(a.assignment.id).await?;
        }
    }
    tracing::info!(
        %cutoff,
        dry_run = req.dry_run,
        count = assignments.len(),
        "cleaned up old assignments"
    );
    Ok(Ok(CleanupReport {
        cutoff,
        dry_run: req.dry_run,
        assignments,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn percentage_rounds_down() {
        let a = Assignment {
            id: AssignmentId(Uuid::new_v4()),
            title: String::from("exercises"),
            description: String::from(NO_DESCRIPTION),
            teacher: UserId::stub(),
            subject: SubjectId(Uuid::new_v4()),
            start_date: date(2024, 3, 1),
            end_date: date(2024, 3, 2),
            date: chrono::Utc::now(),
        };
        assert_eq!(AssignmentStats::new(a.clone(), 0, 0).percentage, 0);
        assert_eq!(AssignmentStats::new(a.clone(), 2, 3).percentage, 66);
        assert_eq!(AssignmentStats::new(a, 3, 3).percentage, 100);
    }

    #[test]
    fn updates_are_validated_like_new_assignments() {
        let mut u = AssignmentUpdate {
            title: String::from("  "),
            description: String::new(),
            subject: SubjectId(Uuid::new_v4()),
            start_date: date(2024, 3, 1),
            end_date: date(2024, 3, 4),
        };
        assert_eq!(u.validate(), Err(Error::EmptyTitle));
        u.title = String::from("read chapter 4");
        assert_eq!(u.validate(), Ok(()));
        u.end_date = date(2024, 2, 29);
        assert_eq!(u.validate(), Err(Error::InvalidDateRange));
        assert_eq!(description_or_placeholder(" \n"), NO_DESCRIPTION);
    }

    #[test]
    fn cleanup_days_default_to_ninety() {
        let req: CleanupRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(
            req,
            CleanupRequest {
                days: 90,
                dry_run: false
            }
        );
        let req: CleanupRequest = serde_json::from_str(r#"{"days": 7, "dry_run": true}"#).unwrap();
        assert_eq!(req.days, 7);
    }

    #[test]
    fn cutoff() {
        assert_eq!(cleanup_cutoff(date(2024, 3, 31), 90), date(2024, 1, 1));
        assert_eq!(cleanup_cutoff(date(2024, 3, 31), 1), date(2024, 3, 30));
        assert!(cleanup_cutoff(date(2024, 3, 31), i64::MAX) < date(0, 1, 1));
    }

    #[test]
    fn date_range() {
        let mut a = NewAssignment {
            id: AssignmentId(Uuid::new_v4()),
            title: String::from("read chapter 3"),
            description: String::new(),
            subject: SubjectId(Uuid::new_v4()),
            start_date: date(2024, 3, 1),
            end_date: date(2024, 3, 1),
        };
        assert_eq!(a.validate(), Ok(()));
        a.end_date = date(2024, 2, 28);
        assert_eq!(a.validate(), Err(Error::InvalidDateRange));
    }
}
