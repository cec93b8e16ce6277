use crate::tokenizer::tokenize;
use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub type UserId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Alumni,
    Faculty,
}

impl Role {
    /// The literal token a role is indexed under.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Alumni => "alumni",
            Role::Faculty => "faculty",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "alumni" => Ok(Role::Alumni),
            "faculty" => Ok(Role::Faculty),
            other => Err(anyhow!("unknown role: {other:?}")),
        }
    }
}

/// Read-only projection of a directory user, as far as search is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableRecord {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub batch_year: Option<i32>,
    /// Free text, comma or space separated.
    #[serde(default)]
    pub skills: Option<String>,
}

/// Token -> user ids. A user appears once per occurrence, so a skill listed
/// twice yields two postings under the same token.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<UserId>>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, token: impl Into<String>, id: UserId) {
        self.postings.entry(token.into()).or_default().push(id);
    }

    /// Postings for `token`, empty if the token was never indexed.
    pub fn postings(&self, token: &str) -> &[UserId] {
        self.postings.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize { self.postings.len() }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[UserId])> {
        self.postings.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Build a fresh index over `records`, visiting them in the order given.
///
/// Per record: batch year as a single decimal token, every skills token,
/// the literal role, then every username token.
pub fn build_index<'a, I>(records: I) -> InvertedIndex
where
    I: IntoIterator<Item = &'a SearchableRecord>,
{
    let mut index = InvertedIndex::new();
    for record in records {
        let id = record.id;
        if let Some(year) = record.batch_year.filter(|y| *y != 0) {
            index.insert(year.to_string(), id);
        }
        if let Some(skills) = &record.skills {
            for token in tokenize(skills) {
                index.insert(token, id);
            }
        }
        index.insert(record.role.as_str(), id);
        for token in tokenize(&record.username) {
            index.insert(token, id);
        }
    }
    index
}
