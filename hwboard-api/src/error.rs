use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found {0}")]
    NotFound(Uuid),

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Invalid student id {0:?}")]
    InvalidStudentId(String),

    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Content must not be empty")]
    EmptyContent,

    #[error("Score must be between 1 and 5, got {0}")]
    InvalidScore(u8),

    #[error("Parent comment {0} is not in the same thread")]
    ParentNotInThread(Uuid),

    #[error("Number of days must be positive, got {0}")]
    InvalidDays(i64),

    #[error("End date is before start date")]
    InvalidDateRange,

    #[error("Cannot delete the currently logged-in user")]
    CannotDeleteSelf,

    #[error("Rating {0} is no longer active")]
    InactiveRating(Uuid),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::InvalidStudentId(_) => StatusCode::BAD_REQUEST,
            Error::EmptyTitle => StatusCode::BAD_REQUEST,
            Error::EmptyContent => StatusCode::BAD_REQUEST,
            Error::InvalidScore(_) => StatusCode::BAD_REQUEST,
            Error::ParentNotInThread(_) => StatusCode::BAD_REQUEST,
            Error::InvalidDays(_) => StatusCode::BAD_REQUEST,
            Error::InvalidDateRange => StatusCode::BAD_REQUEST,
            Error::CannotDeleteSelf => StatusCode::BAD_REQUEST,
            Error::InactiveRating(_) => StatusCode::GONE,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound(u) => json!({
                "message": "not found",
                "type": "not-found",
                "uuid": u,
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": "conflict-uuid",
                "uuid": u,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a user name",
                "type": "invalid-name",
                "name": n,
            }),
            Error::InvalidStudentId(s) => json!({
                "message": "student ids are 1 to 10 digits",
                "type": "invalid-student-id",
                "string": s,
            }),
            Error::EmptyTitle => json!({
                "message": "title must not be empty",
                "type": "empty-title",
            }),
            Error::EmptyContent => json!({
                "message": "content must not be empty",
                "type": "empty-content",
            }),
            Error::InvalidScore(s) => json!({
                "message": "score must be between 1 and 5",
                "type": "invalid-score",
                "score": s,
            }),
            Error::ParentNotInThread(u) => json!({
                "message": "parent comment belongs to another thread",
                "type": "parent-not-in-thread",
                "uuid": u,
            }),
            Error::InvalidDays(d) => json!({
                "message": "number of days must be positive",
                "type": "invalid-days",
                "days": d,
            }),
            Error::InvalidDateRange => json!({
                "message": "end date is before start date",
                "type": "invalid-date-range",
            }),
            Error::CannotDeleteSelf => json!({
                "message": "cannot delete the currently logged-in user",
                "type": "cannot-delete-self",
            }),
            Error::InactiveRating(u) => json!({
                "message": "rating is no longer active",
                "type": "inactive-rating",
                "uuid": u,
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let uuid = |what: &str| {
            data.get("uuid")
                .and_then(|uuid| uuid.as_str())
                .and_then(|uuid| Uuid::from_str(uuid).ok())
                .ok_or_else(|| anyhow!("error is {what} without a proper uuid"))
        };
        let string = |field: &str, what: &str| {
            data.get(field)
                .and_then(|s| s.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error is {what} without a {field}"))
        };
        let int = |field: &str, what: &str| {
            data.get(field)
                .and_then(|s| s.as_i64())
                .ok_or_else(|| anyhow!("error is {what} without a {field}"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound(uuid("a not-found")?),
                "conflict-uuid" => Error::UuidAlreadyUsed(uuid("a uuid conflict")?),
                "conflict-name" => Error::NameAlreadyUsed(string("name", "a name conflict")?),
                "null-byte" => {
                    Error::NullByteInString(string("string", "a null-byte-in-string")?)
                }
                "invalid-name" => Error::InvalidName(string("name", "an invalid name")?),
                "invalid-student-id" => {
                    Error::InvalidStudentId(string("string", "an invalid student id")?)
                }
                "empty-title" => Error::EmptyTitle,
                "empty-content" => Error::EmptyContent,
                "invalid-score" => Error::InvalidScore(
                    u8::try_from(int("score", "an invalid score")?)
                        .context("invalid score does not fit in a u8")?,
                ),
                "parent-not-in-thread" => {
                    Error::ParentNotInThread(uuid("a parent-not-in-thread")?)
                }
                "invalid-days" => Error::InvalidDays(int("days", "an invalid day count")?),
                "invalid-date-range" => Error::InvalidDateRange,
                "cannot-delete-self" => Error::CannotDeleteSelf,
                "inactive-rating" => Error::InactiveRating(uuid("an inactive rating")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_survive_the_wire() {
        let u = Uuid::new_v4();
        for err in [
            Error::PermissionDenied,
            Error::NotFound(u),
            Error::NameAlreadyUsed(String::from("alice")),
            Error::InvalidScore(9),
            Error::InvalidDays(-3),
            Error::InactiveRating(u),
        ] {
            assert_eq!(Error::parse(&err.contents()).unwrap(), err);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Error::parse(br#"{"type": "nope"}"#).is_err());
        assert!(Error::parse(b"not json").is_err());
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            Error::NotFound(Uuid::nil()).status_code(),
            http::StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::PermissionDenied.status_code(),
            http::StatusCode::FORBIDDEN
        );
    }
}
