//! Record store ports and their implementations
//!
//! Services talk to storage only through [`RecordStore`]. Multi-entity writes
//! go through a [`UnitOfWork`]: rows are locked as they are read, writes are
//! applied on [`UnitOfWork::commit`], and dropping an uncommitted unit of work
//! discards everything it staged.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{Book, Loan, LoanFilter, Member, NewBook, NewLoan, NewMember},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a transactional unit of work
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;

    /// Check that the store is reachable
    async fn ping(&self) -> AppResult<()>;

    // Books. Soft-deleted books are invisible to these reads.
    async fn get_book(&self, id: i64) -> AppResult<Book>;
    async fn find_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;
    async fn list_books(&self) -> AppResult<Vec<Book>>;
    async fn create_book(&self, book: NewBook) -> AppResult<Book>;

    // Members. Soft-deleted members are invisible to these reads.
    async fn get_member(&self, id: i64) -> AppResult<Member>;
    async fn find_member_by_email(&self, email: &str) -> AppResult<Option<Member>>;
    async fn find_member_by_code(&self, code: &str) -> AppResult<Option<Member>>;
    /// Whether any member row holds `code`, soft-deleted ones included
    async fn member_code_exists(&self, code: &str) -> AppResult<bool>;
    async fn list_members(&self) -> AppResult<Vec<Member>>;
    async fn create_member(&self, member: NewMember) -> AppResult<Member>;
    async fn update_member(&self, member: &Member) -> AppResult<Member>;
    async fn delete_member(&self, id: i64) -> AppResult<()>;

    // Loans
    async fn get_loan(&self, id: i64) -> AppResult<Loan>;
    async fn list_loans(&self, filter: &LoanFilter) -> AppResult<Vec<Loan>>;
}

/// A single atomic commit across book and loan rows.
///
/// Locks are taken loan first, then book. Implementations hold every lock
/// until the unit of work is committed or dropped.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock a book row, including soft-deleted ones
    async fn lock_book(&mut self, id: i64) -> AppResult<Book>;
    async fn lock_loan(&mut self, id: i64) -> AppResult<Loan>;
    async fn insert_loan(&mut self, loan: NewLoan) -> AppResult<Loan>;
    /// Stage a write to a book previously returned by `lock_book`
    async fn save_book(&mut self, book: &Book) -> AppResult<Book>;
    /// Stage a write to a loan previously returned by `lock_loan`
    async fn save_loan(&mut self, loan: &Loan) -> AppResult<Loan>;
    async fn commit(self: Box<Self>) -> AppResult<()>;
}
