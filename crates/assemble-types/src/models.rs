use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of lifecycle event captured in a project's activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Created,
    Edited,
    Deleted,
    Completed,
    Uncompleted,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        Self::Created,
        Self::Edited,
        Self::Deleted,
        Self::Completed,
        Self::Uncompleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Edited => "edited",
            Self::Deleted => "deleted",
            Self::Completed => "completed",
            Self::Uncompleted => "uncompleted",
        }
    }

    /// `Completed` for `true`, `Uncompleted` for `false`.
    pub fn for_completion(completed: bool) -> Self {
        if completed {
            Self::Completed
        } else {
            Self::Uncompleted
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown activity kind '{0}'")]
pub struct UnknownActivityKind(pub String);

impl FromStr for ActivityKind {
    type Err = UnknownActivityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownActivityKind(s.to_string()))
    }
}

/// One rendered line of a project's history feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub display_time: String,
}
