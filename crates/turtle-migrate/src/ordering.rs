use std::collections::HashMap;

use crate::migration::Migration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

impl SortOrder {
    /// `"desc"` sorts descending. Every other token, including unknown ones,
    /// sorts ascending.
    pub fn from_token(token: &str) -> Self {
        match token {
            "desc" => Self::Descending,
            _ => Self::Ascending,
        }
    }
}

impl From<&str> for SortOrder {
    fn from(token: &str) -> Self {
        Self::from_token(token)
    }
}

/// Order migrations by plain string comparison of their ids.
pub fn sort_migrations(
    migrations: HashMap<String, Migration>,
    order: impl Into<SortOrder>,
) -> Vec<Migration> {
    let mut sorted: Vec<Migration> = migrations.into_values().collect();
    match order.into() {
        SortOrder::Ascending => sorted.sort_by(|a, b| a.id.cmp(&b.id)),
        SortOrder::Descending => sorted.sort_by(|a, b| b.id.cmp(&a.id)),
    }
    sorted
}
