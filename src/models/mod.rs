//! Data models for the circulation server

pub mod book;
pub mod loan;
pub mod member;

// Re-export commonly used types
pub use book::{Book, NewBook};
pub use loan::{Loan, LoanDetails, LoanFilter, LoanStatus, NewLoan};
pub use member::{Member, NewMember};
