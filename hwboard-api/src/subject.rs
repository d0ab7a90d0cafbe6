use uuid::Uuid;

use crate::{policy::Action, Db, Error, User};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct SubjectId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

pub const DEFAULT_SUBJECTS: &[&str] = &[
    "语文", "数学", "英语", "历史", "地理", "政治", "物理", "化学", "生物", "其他",
];

/// Inserts the default subjects that do not exist yet and returns how many
/// were inserted. Running it again is a no-op.
pub async fn seed_subjects<D: Db>(db: &mut D, actor: &User) -> anyhow::Result<Result<usize, Error>> {
    ensure_allowed!(actor, Action::SeedSubjects);
    let existing = db.list_subjects().await?;
    let mut inserted = 0;
    for name in DEFAULT_SUBJECTS {
        if existing.iter().any(|s| s.name == *name) {
            continue;
        }
        let subject = Subject {
            id: SubjectId(Uuid::new_v4()),
            name: String::from(*name),
        };
        if db.insert_subject(&subject).await? {
            inserted += 1;
        }
    }
    tracing::info!(inserted, "seeded default subjects");
    Ok(Ok(inserted))
}

/// Subjects whose assignments the actor left out of their homework list
pub async fn hidden_subjects<D: Db>(
    db: &mut D,
    actor: &User,
) -> anyhow::Result<Result<Vec<SubjectId>, Error>> {
    ensure_allowed!(actor, Action::HideSubjects);
    let mut hidden = db.list_hidden_subjects(actor.id).await?;
    hidden.sort();
    Ok(Ok(hidden))
}

/// Replaces the set of subjects the actor hides from their homework list
pub async fn set_hidden_subjects<D: Db>(
    db: &mut D,
    actor: &User,
    mut subjects: Vec<SubjectId>,
) -> anyhow::Result<Result<Vec<SubjectId>, Error>> {
    ensure_allowed!(actor, Action::HideSubjects);
    subjects.sort();
    subjects.dedup();
    let existing = db.list_subjects().await?;
    if let Some(s) = subjects.iter().find(|s| !existing.iter().any(|e| e.id == **s)) {
        return Ok(Err(Error::NotFound(s.0)));
    }
    db.set_hidden_subjects(actor.id, &subjects).await?;
    tracing::debug!(user = ?actor.id, hidden = subjects.len(), "saved hidden subjects");
    Ok(Ok(subjects))
}
