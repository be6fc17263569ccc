//! Service categories that partition appointments into separate tables.
//!
//! Every category owns one record collection on the backend. Fan-out code
//! iterates [`Category::ALL`] instead of naming tables one by one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the fixed social-services categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Persons with disability.
    Pwd,
    /// Senior citizens.
    SeniorCitizens,
    /// Solo parents.
    SoloParents,
    /// Financial assistance requests.
    FinancialAssistance,
    /// Early-childhood care and development.
    EarlyChildhood,
    /// Youth sector.
    Youth,
    /// Women's sector.
    WomensSector,
}

impl Category {
    /// All categories in fan-out order.
    pub const ALL: [Self; 7] = [
        Self::Pwd,
        Self::SeniorCitizens,
        Self::SoloParents,
        Self::FinancialAssistance,
        Self::EarlyChildhood,
        Self::Youth,
        Self::WomensSector,
    ];

    /// Name of the backend table holding this category's appointments.
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Pwd => "pwd",
            Self::SeniorCitizens => "senior_citizens",
            Self::SoloParents => "solo_parents",
            Self::FinancialAssistance => "financial_assistance",
            Self::EarlyChildhood => "early_childhood",
            Self::Youth => "youth",
            Self::WomensSector => "womens_sector",
        }
    }

    /// Human-readable label for tables and summaries.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pwd => "PWD",
            Self::SeniorCitizens => "Senior Citizens",
            Self::SoloParents => "Solo Parents",
            Self::FinancialAssistance => "Financial Assistance",
            Self::EarlyChildhood => "Early Childhood",
            Self::Youth => "Youth",
            Self::WomensSector => "Women's Sector",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Raised when a table name does not belong to any category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category table: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.table_name() == value)
            .ok_or_else(|| UnknownCategory(value.to_owned()))
    }
}
