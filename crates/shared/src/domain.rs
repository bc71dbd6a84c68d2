use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(LeadId);
id_newtype!(AgentId);
id_newtype!(TagId);
id_newtype!(CommentId);

pub const UNASSIGNED_AGENT: &str = "Unassigned";
pub const DEFAULT_AGENT_ROLE: &str = "Sales Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Lead,
    Agent,
    Tag,
    Comment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lead => "lead",
            Self::Agent => "agent",
            Self::Tag => "tag",
            Self::Comment => "comment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! display_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let trimmed = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: value.to_string(),
                    })
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeadSource {
    Referral,
    Website,
    #[serde(rename = "Cold Call")]
    ColdCall,
    Advertisement,
    Email,
    Other,
}

display_enum!(LeadSource, "lead source", {
    Referral => "Referral",
    Website => "Website",
    ColdCall => "Cold Call",
    Advertisement => "Advertisement",
    Email => "Email",
    Other => "Other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    #[serde(rename = "Proposal Sent")]
    ProposalSent,
    Closed,
}

display_enum!(LeadStatus, "lead status", {
    New => "New",
    Contacted => "Contacted",
    Qualified => "Qualified",
    ProposalSent => "Proposal Sent",
    Closed => "Closed",
});

impl LeadStatus {
    /// Position used when ordering leads by status.
    pub fn rank(&self) -> u8 {
        match self {
            Self::New => 1,
            Self::Qualified => 2,
            Self::Contacted => 3,
            Self::ProposalSent => 4,
            Self::Closed => 5,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeadPriority {
    High,
    Medium,
    Low,
}

display_enum!(LeadPriority, "lead priority", {
    High => "High",
    Medium => "Medium",
    Low => "Low",
});

impl LeadPriority {
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    #[serde(rename = "_id", alias = "id")]
    pub id: LeadId,
    pub name: String,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub time_to_close: u32,
    #[serde(default, deserialize_with = "reference::optional")]
    pub sales_agent: Option<AgentId>,
    #[serde(default, deserialize_with = "reference::many")]
    pub tags: Vec<TagId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(rename = "_id", alias = "id")]
    pub id: AgentId,
    pub name: String,
    pub email: String,
    #[serde(default = "default_agent_role")]
    pub role: String,
    pub created_at: DateTime<Utc>,
}

fn default_agent_role() -> String {
    DEFAULT_AGENT_ROLE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "_id", alias = "id")]
    pub id: TagId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id", alias = "id")]
    pub id: CommentId,
    #[serde(alias = "lead")]
    pub lead_id: LeadId,
    #[serde(deserialize_with = "reference::required")]
    pub author: AgentId,
    #[serde(alias = "text")]
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
}

/// Reference fields arrive either as a bare id or as a populated document.
mod reference {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reference {
        Id(String),
        Populated {
            #[serde(rename = "_id", alias = "id")]
            id: String,
        },
    }

    impl Reference {
        fn into_id<T: From<String>>(self) -> T {
            match self {
                Reference::Id(id) | Reference::Populated { id } => T::from(id),
            }
        }
    }

    pub fn required<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: From<String>,
    {
        Reference::deserialize(deserializer).map(Reference::into_id)
    }

    pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: From<String>,
    {
        Ok(Option::<Reference>::deserialize(deserializer)?.map(Reference::into_id))
    }

    pub fn many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: From<String>,
    {
        Ok(Option::<Vec<Reference>>::deserialize(deserializer)?
            .unwrap_or_default()
            .into_iter()
            .map(Reference::into_id)
            .collect())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<String> for TagId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
