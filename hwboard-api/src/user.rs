use std::{fmt, str::FromStr};

use anyhow::anyhow;
use uuid::Uuid;

use crate::{policy::Action, Db, Error, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Role> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            _ => Err(anyhow!("unknown role {s:?}")),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub student_id: Option<String>,
}

impl User {
    /// The identity used for requests authenticated with the admin token
    /// rather than with a session.
    pub fn system_admin() -> User {
        User {
            id: UserId::stub(),
            name: String::from("admin-token"),
            role: Role::Admin,
            student_id: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub initial_password_hash: String,
}

impl NewUser {
    pub fn new(
        id: UserId,
        name: String,
        role: Role,
        student_id: Option<String>,
        initial_password: String,
    ) -> NewUser {
        let initial_password_hash = bcrypt::hash(initial_password, bcrypt::DEFAULT_COST)
            .expect("failed hashing password");
        NewUser {
            id,
            name,
            role,
            student_id,
            initial_password_hash,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.name)?;
        crate::validate_string(&self.initial_password_hash)?;
        if self.name.is_empty()
            || self.name.chars().count() > 150
            || !self
                .name
                .chars()
                .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
        {
            return Err(Error::InvalidName(self.name.clone()));
        }
        if let Some(sid) = &self.student_id {
            crate::validate_string(sid)?;
            if sid.is_empty() || sid.len() > 10 || !sid.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::InvalidStudentId(sid.clone()));
            }
        }
        Ok(())
    }

    pub fn user(&self) -> User {
        User {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            student_id: self.student_id.clone(),
        }
    }
}

pub async fn create_user<D: Db>(
    db: &mut D,
    actor: &User,
    u: NewUser,
) -> anyhow::Result<Result<User, Error>> {
    ensure_allowed!(actor, Action::CreateUser);
    api_try!(u.validate());
    if db.user_name_taken(&u.name).await? {
        return Ok(Err(Error::NameAlreadyUsed(u.name)));
    }
    if !db.insert_user(&u).await? {
        return Ok(Err(Error::UuidAlreadyUsed(u.id.0)));
    }
    tracing::info!(user = ?u.id, role = %u.role, "created user");
    Ok(Ok(u.user()))
}

pub async fn delete_user<D: Db>(
    db: &mut D,
    actor: &User,
    target: UserId,
) -> anyhow::Result<Result<(), Error>> {
    if target == actor.id {
        return Ok(Err(Error::CannotDeleteSelf));
    }
    ensure_allowed!(actor, Action::DeleteUser { target });
    if !db.delete_user(target).await? {
        return Ok(Err(Error::NotFound(target.0)));
    }
    tracing::info!(user = ?target, by = ?actor.id, "deleted user");
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, student_id: Option<&str>) -> NewUser {
        NewUser {
            id: UserId(Uuid::new_v4()),
            name: String::from(name),
            role: Role::Student,
            student_id: student_id.map(String::from),
            initial_password_hash: String::from("hash"),
        }
    }

    #[test]
    fn names() {
        assert_eq!(new_user("alice_01", None).validate(), Ok(()));
        assert_eq!(new_user("张三", None).validate(), Ok(()));
        assert_eq!(
            new_user("has space", None).validate(),
            Err(Error::InvalidName(String::from("has space")))
        );
        assert_eq!(
            new_user("", None).validate(),
            Err(Error::InvalidName(String::new()))
        );
    }

    #[test]
    fn student_ids() {
        assert_eq!(new_user("bob", Some("2023001")).validate(), Ok(()));
        assert_eq!(
            new_user("bob", Some("20a3")).validate(),
            Err(Error::InvalidStudentId(String::from("20a3")))
        );
        assert_eq!(
            new_user("bob", Some("12345678901")).validate(),
            Err(Error::InvalidStudentId(String::from("12345678901")))
        );
    }

    #[test]
    fn roles_parse_back() {
        for r in [Role::Admin, Role::Teacher, Role::Student] {
            assert_eq!(r.as_str().parse::<Role>().unwrap(), r);
        }
        assert!("janitor".parse::<Role>().is_err());
    }
}
