use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Layout of a generated code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FormatKind {
    /// `PREFIX` + `CAT-0001` + `SUFFIX`
    #[default]
    CategoryNumber,
    /// `PREFIX` + `0001` + `SUFFIX`
    NumberOnly,
    /// `PREFIX` + `ITM-CAT-0001` + `SUFFIX`
    Custom,
}

impl FormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CategoryNumber => "category-number",
            Self::NumberOnly => "number-only",
            Self::Custom => "custom",
        }
    }

    /// Parse a stored token, falling back to `CategoryNumber` for anything
    /// unrecognized.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for FormatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category-number" => Ok(Self::CategoryNumber),
            "number-only" => Ok(Self::NumberOnly),
            "custom" => Ok(Self::Custom),
            _ => Err(format!(
                "Invalid format '{}'. Valid values: category-number, number-only, custom",
                s
            )),
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The allocation settings, loaded once per operation and passed down.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkuSettings {
    pub prefix: String,
    pub suffix: String,
    pub format: FormatKind,
}

/// What `generate` should allocate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationTarget {
    Item { id: i64, force: bool },
    AllMissing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignedCode {
    pub item_id: i64,
    pub item_name: String,
    pub code: String,
}

/// Successful result of an allocation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AllocationOutcome {
    Assigned { item_id: i64, code: String },
    Backfilled { count: usize, codes: Vec<AssignedCode> },
    /// Backfill found no items lacking a code. Informational, not an error.
    NothingToDo,
}

impl AllocationOutcome {
    pub fn summary(&self) -> String {
        match self {
            Self::Assigned { item_id, code } => {
                format!("Assigned {} to item {}", code, item_id)
            }
            Self::Backfilled { count, .. } => format!("Generated {} SKU code(s)", count),
            Self::NothingToDo => "All items already have SKU codes; nothing to do".to_string(),
        }
    }
}
