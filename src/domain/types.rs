//! Shared domain enumerations and the request principal.

use serde::{Deserialize, Serialize};

use crate::domain::entities::UserRecord;

/// Background job kinds accepted by the worker pool. Cron-driven work
/// (the session sweep) never passes through the queue and is not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    PurgeAll,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::PurgeAll => "purge_all",
        }
    }
}

impl TryFrom<&str> for JobType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "purge_all" => Ok(JobType::PurgeAll),
            _ => Err(()),
        }
    }
}

/// The visitor attached to a request after session resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Anonymous,
    User(UserRecord),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Principal::Anonymous => None,
            Principal::User(user) => Some(user),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.user().map(|user| user.email.as_str())
    }
}
