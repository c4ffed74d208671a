//! Embedded record store
//!
//! Every book and loan lives behind its own `tokio::sync::Mutex`. A unit of
//! work takes owned guards on the rows it touches and keeps them until it is
//! committed or dropped, which serializes concurrent borrows and returns per
//! row without a store-wide lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    error::{AppError, AppResult},
    models::{Book, Loan, LoanFilter, LoanStatus, Member, NewBook, NewLoan, NewMember},
};

use super::{RecordStore, UnitOfWork};

type Row<T> = Arc<Mutex<T>>;

#[derive(Default)]
struct Inner {
    books: RwLock<HashMap<i64, Row<Book>>>,
    isbn_index: Mutex<HashMap<String, i64>>,
    members: RwLock<HashMap<i64, Member>>,
    loans: RwLock<HashMap<i64, Row<Loan>>>,
    next_book_id: AtomicI64,
    next_member_id: AtomicI64,
    next_loan_id: AtomicI64,
}

impl Inner {
    fn next_id(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn book_row(&self, id: i64) -> AppResult<Row<Book>> {
        self.books
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn loan_row(&self, id: i64) -> AppResult<Row<Loan>> {
        self.loans
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }
}

/// In-process record store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork::new(self.inner.clone())))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_book(&self, id: i64) -> AppResult<Book> {
        let row = self.inner.book_row(id).await?;
        let book = row.lock().await.clone();
        if book.is_deleted() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(book)
    }

    async fn find_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let id = self.inner.isbn_index.lock().await.get(isbn).copied();
        match id {
            Some(id) => match self.get_book(id).await {
                Ok(book) => Ok(Some(book)),
                Err(AppError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let rows: Vec<Row<Book>> = self.inner.books.read().await.values().cloned().collect();

        let mut books = Vec::with_capacity(rows.len());
        for row in rows {
            let book = row.lock().await.clone();
            if !book.is_deleted() {
                books.push(book);
            }
        }
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    async fn create_book(&self, book: NewBook) -> AppResult<Book> {
        let mut index = self.inner.isbn_index.lock().await;
        if index.contains_key(&book.isbn) {
            return Err(AppError::Conflict(format!(
                "Book with ISBN {} already exists",
                book.isbn
            )));
        }

        let now = Utc::now();
        let created = Book {
            id: Inner::next_id(&self.inner.next_book_id),
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            publisher: book.publisher,
            year: book.year,
            category: book.category,
            description: book.description,
            stock: book.stock,
            available: book.stock,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        index.insert(created.isbn.clone(), created.id);
        self.inner
            .books
            .write()
            .await
            .insert(created.id, Arc::new(Mutex::new(created.clone())));

        Ok(created)
    }

    async fn get_member(&self, id: i64) -> AppResult<Member> {
        self.inner
            .members
            .read()
            .await
            .get(&id)
            .filter(|m| !m.is_deleted())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    async fn find_member_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        Ok(self
            .inner
            .members
            .read()
            .await
            .values()
            .find(|m| !m.is_deleted() && m.email == email)
            .cloned())
    }

    async fn find_member_by_code(&self, code: &str) -> AppResult<Option<Member>> {
        Ok(self
            .inner
            .members
            .read()
            .await
            .values()
            .find(|m| !m.is_deleted() && m.member_code == code)
            .cloned())
    }

    async fn member_code_exists(&self, code: &str) -> AppResult<bool> {
        Ok(self
            .inner
            .members
            .read()
            .await
            .values()
            .any(|m| m.member_code == code))
    }

    async fn list_members(&self) -> AppResult<Vec<Member>> {
        let mut members: Vec<Member> = self
            .inner
            .members
            .read()
            .await
            .values()
            .filter(|m| !m.is_deleted())
            .cloned()
            .collect();
        members.sort_by_key(|m| m.id);
        Ok(members)
    }

    async fn create_member(&self, member: NewMember) -> AppResult<Member> {
        let mut members = self.inner.members.write().await;

        if members.values().any(|m| m.email == member.email) {
            return Err(AppError::Conflict(format!(
                "Member with email {} already exists",
                member.email
            )));
        }
        if members.values().any(|m| m.member_code == member.member_code) {
            return Err(AppError::Conflict(format!(
                "Member code {} already in use",
                member.member_code
            )));
        }

        let now = Utc::now();
        let created = Member {
            id: Inner::next_id(&self.inner.next_member_id),
            name: member.name,
            email: member.email,
            phone: member.phone,
            address: member.address,
            member_code: member.member_code,
            status: member.status,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        members.insert(created.id, created.clone());

        Ok(created)
    }

    async fn update_member(&self, member: &Member) -> AppResult<Member> {
        let mut members = self.inner.members.write().await;

        if members
            .values()
            .any(|m| m.id != member.id && m.email == member.email)
        {
            return Err(AppError::Conflict(format!(
                "Member with email {} already exists",
                member.email
            )));
        }

        let stored = members
            .get_mut(&member.id)
            .filter(|m| !m.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", member.id)))?;

        stored.name = member.name.clone();
        stored.email = member.email.clone();
        stored.phone = member.phone.clone();
        stored.address = member.address.clone();
        stored.status = member.status.clone();
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn delete_member(&self, id: i64) -> AppResult<()> {
        let mut members = self.inner.members.write().await;
        let stored = members
            .get_mut(&id)
            .filter(|m| !m.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))?;

        stored.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn get_loan(&self, id: i64) -> AppResult<Loan> {
        let row = self.inner.loan_row(id).await?;
        let loan = row.lock().await.clone();
        Ok(loan)
    }

    async fn list_loans(&self, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let rows: Vec<Row<Loan>> = self.inner.loans.read().await.values().cloned().collect();

        let mut loans = Vec::new();
        for row in rows {
            let loan = row.lock().await.clone();
            if filter.matches(&loan) {
                loans.push(loan);
            }
        }
        loans.sort_by_key(|l| l.id);
        Ok(loans)
    }
}

/// Unit of work over [`MemoryStore`]. Writes are staged and only reach the
/// locked rows on commit.
pub struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    books: HashMap<i64, OwnedMutexGuard<Book>>,
    loans: HashMap<i64, OwnedMutexGuard<Loan>>,
    staged_books: HashMap<i64, Book>,
    staged_loans: HashMap<i64, Loan>,
    inserted: Vec<Loan>,
}

impl MemoryUnitOfWork {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            books: HashMap::new(),
            loans: HashMap::new(),
            staged_books: HashMap::new(),
            staged_loans: HashMap::new(),
            inserted: Vec::new(),
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_book(&mut self, id: i64) -> AppResult<Book> {
        if let Some(book) = self.staged_books.get(&id) {
            return Ok(book.clone());
        }
        if let Some(guard) = self.books.get(&id) {
            return Ok((**guard).clone());
        }

        let row = self.inner.book_row(id).await?;
        let guard = row.lock_owned().await;
        let book = (*guard).clone();
        self.books.insert(id, guard);
        Ok(book)
    }

    async fn lock_loan(&mut self, id: i64) -> AppResult<Loan> {
        if let Some(loan) = self.staged_loans.get(&id) {
            return Ok(loan.clone());
        }
        if let Some(guard) = self.loans.get(&id) {
            return Ok((**guard).clone());
        }
        if let Some(loan) = self.inserted.iter().find(|l| l.id == id) {
            return Ok(loan.clone());
        }

        let row = self.inner.loan_row(id).await?;
        let guard = row.lock_owned().await;
        let loan = (*guard).clone();
        self.loans.insert(id, guard);
        Ok(loan)
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> AppResult<Loan> {
        let now = Utc::now();
        let created = Loan {
            id: Inner::next_id(&self.inner.next_loan_id),
            book_id: loan.book_id,
            member_id: loan.member_id,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            return_date: None,
            status: LoanStatus::Borrowed,
            fine: 0,
            notes: loan.notes,
            created_at: now,
            updated_at: now,
        };
        self.inserted.push(created.clone());
        Ok(created)
    }

    async fn save_book(&mut self, book: &Book) -> AppResult<Book> {
        if !self.books.contains_key(&book.id) {
            return Err(AppError::Internal(format!(
                "Book {} saved without holding its lock",
                book.id
            )));
        }

        let mut staged = book.clone();
        staged.updated_at = Utc::now();
        self.staged_books.insert(book.id, staged.clone());
        Ok(staged)
    }

    async fn save_loan(&mut self, loan: &Loan) -> AppResult<Loan> {
        let mut staged = loan.clone();
        staged.updated_at = Utc::now();

        if let Some(pending) = self.inserted.iter_mut().find(|l| l.id == loan.id) {
            *pending = staged.clone();
            return Ok(staged);
        }
        if !self.loans.contains_key(&loan.id) {
            return Err(AppError::Internal(format!(
                "Loan {} saved without holding its lock",
                loan.id
            )));
        }

        self.staged_loans.insert(loan.id, staged.clone());
        Ok(staged)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut this = *self;

        // ISBN changes are checked before any row is touched so a conflict
        // leaves the store as it was.
        let renamed: Vec<(i64, String, String)> = this
            .staged_books
            .iter()
            .filter_map(|(id, staged)| {
                let current = this.books.get(id)?;
                (current.isbn != staged.isbn).then(|| (*id, current.isbn.clone(), staged.isbn.clone()))
            })
            .collect();

        if !renamed.is_empty() {
            let mut index = this.inner.isbn_index.lock().await;
            for (id, _, new_isbn) in &renamed {
                if index.get(new_isbn).is_some_and(|owner| owner != id) {
                    return Err(AppError::Conflict(format!(
                        "Book with ISBN {} already exists",
                        new_isbn
                    )));
                }
            }
            for (id, old_isbn, new_isbn) in renamed {
                index.remove(&old_isbn);
                index.insert(new_isbn, id);
            }
        }

        for (id, staged) in this.staged_books.drain() {
            if let Some(guard) = this.books.get_mut(&id) {
                **guard = staged;
            }
        }
        for (id, staged) in this.staged_loans.drain() {
            if let Some(guard) = this.loans.get_mut(&id) {
                **guard = staged;
            }
        }

        if !this.inserted.is_empty() {
            let mut loans = this.inner.loans.write().await;
            for loan in this.inserted.drain(..) {
                loans.insert(loan.id, Arc::new(Mutex::new(loan)));
            }
        }

        Ok(())
    }
}
