//! Core data models used throughout desklens.
//!
//! These types represent the tickets, comments, and timesheet entries that
//! flow through the import, backfill, and retrieval pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Support tier assigned to a ticket by the keyword classifier.
///
/// `L1` is first-line (password resets, how-to questions), `L2` is
/// second-line (configuration, infrastructure), `L3` is third-line
/// (engineering escalations, vendor bugs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    L1,
    L2,
    L3,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::L1 => "L1",
            Tier::L2 => "L2",
            Tier::L3 => "L3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L1" => Ok(Tier::L1),
            "L2" => Ok(Tier::L2),
            "L3" => Ok(Tier::L3),
            other => anyhow::bail!("unknown tier: '{}'. Must be L1, L2, or L3.", other),
        }
    }
}

/// Raw ticket row parsed from a CSV export before normalization.
#[derive(Debug, Clone)]
pub struct TicketRow {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub account: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub assignee: Option<String>,
    pub root_cause: Option<String>,
    pub description: String,
    pub resolution: Option<String>,
}

impl TicketRow {
    /// Concatenated text fields used by the tier classifier and the
    /// embedding index. Field order is fixed so hashes stay stable.
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.title);
        text.push_str("\n\n");
        text.push_str(&self.description);
        if let Some(ref res) = self.resolution {
            text.push_str("\n\n");
            text.push_str(res);
        }
        if let Some(ref rc) = self.root_cause {
            text.push_str("\n\n");
            text.push_str(rc);
        }
        text
    }
}

/// Whether a comment is visible to the customer or internal-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Internal => "internal",
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" | "customer" | "external" => Ok(Visibility::Public),
            "internal" | "private" => Ok(Visibility::Internal),
            other => anyhow::bail!("unknown visibility: '{}'", other),
        }
    }
}

/// A support comment attached to a ticket.
#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub ticket_id: String,
    pub author: Option<String>,
    pub body: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

/// A timesheet entry booked against a ticket.
#[derive(Debug, Clone)]
pub struct TimesheetRow {
    pub id: String,
    pub ticket_id: String,
    pub user: String,
    pub hours: f64,
    pub entry_date: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A quality verdict produced by the LLM scorer for one comment.
///
/// All rubric dimensions are integers in `1..=5`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub clarity: i64,
    pub empathy: i64,
    pub completeness: i64,
    pub overall: i64,
    #[serde(default)]
    pub notes: String,
}

/// A search result returned from the retrieval engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub status: String,
    pub tier: Option<String>,
    pub updated_at: i64,
    pub score: f64,
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_roundtrip() {
        for tier in [Tier::L1, Tier::L2, Tier::L3] {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_tier_rejects_unknown() {
        assert!("L4".parse::<Tier>().is_err());
        assert!("l1".parse::<Tier>().is_err());
    }

    #[test]
    fn test_visibility_aliases() {
        assert_eq!(
            "customer".parse::<Visibility>().unwrap(),
            Visibility::Public
        );
        assert_eq!(
            "private".parse::<Visibility>().unwrap(),
            Visibility::Internal
        );
    }

    #[test]
    fn test_searchable_text_skips_missing_fields() {
        let row = TicketRow {
            id: "T-1".into(),
            title: "VPN down".into(),
            category: "Network".into(),
            status: "Open".into(),
            account: "Acme".into(),
            created_at: Utc::now(),
            closed_at: None,
            assignee: None,
            root_cause: None,
            description: "Cannot connect to VPN.".into(),
            resolution: None,
        };
        let text = row.searchable_text();
        assert!(text.starts_with("VPN down"));
        assert!(text.contains("Cannot connect"));
        assert!(!text.ends_with("\n\n"));
    }
}
