//! Loan model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

use super::{Book, Member};

/// Loan lifecycle state. `Borrowed` is initial, `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "returned" => Ok(LoanStatus::Returned),
            other => Err(AppError::Internal(format!("Unknown loan status: {}", other))),
        }
    }
}

/// Loan model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: i64,
    pub book_id: i64,
    pub member_id: i64,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    /// Fine in minor currency units, zero until returned
    pub fine: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_returned(&self) -> bool {
        self.status == LoanStatus::Returned
    }

    /// A borrowed loan past its due date. Never stored.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Borrowed && self.due_date < now
    }
}

/// Loan as returned to API clients, with the derived overdue flag and a
/// snapshot of the book and member it refers to
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub is_overdue: bool,
    /// Absent once the book has been removed from the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<Book>,
    /// Absent once the member has been deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,
}

impl LoanDetails {
    pub fn at(loan: Loan, now: DateTime<Utc>) -> Self {
        let is_overdue = loan.is_overdue(now);
        Self {
            loan,
            is_overdue,
            book: None,
            member: None,
        }
    }
}

/// Fields required to insert a loan
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub book_id: i64,
    pub member_id: i64,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Create loan request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub book_id: i64,
    pub member_id: i64,
    /// Due date (ISO 8601), must be in the future
    pub due_date: DateTime<Utc>,
    #[validate(length(max = 2000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

/// Store-level loan filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanFilter {
    pub book_id: Option<i64>,
    pub member_id: Option<i64>,
    pub status: Option<LoanStatus>,
    /// Only loans due strictly before this instant
    pub due_before: Option<DateTime<Utc>>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.book_id.map_or(true, |id| loan.book_id == id)
            && self.member_id.map_or(true, |id| loan.member_id == id)
            && self.status.map_or(true, |status| loan.status == status)
            && self.due_before.map_or(true, |at| loan.due_date < at)
    }

    /// Borrowed loans whose due date has passed at `now`
    pub fn overdue(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(LoanStatus::Borrowed),
            due_before: Some(now),
            ..Default::default()
        }
    }
}

/// Loan list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub status: Option<LoanStatus>,
    pub member_id: Option<i64>,
    pub book_id: Option<i64>,
    /// Only borrowed loans past their due date
    pub overdue: Option<bool>,
}
