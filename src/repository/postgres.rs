//! PostgreSQL record store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{Book, Loan, LoanFilter, Member, NewBook, NewLoan, NewMember},
};

use super::{RecordStore, UnitOfWork};

/// Loan row as stored; `status` is plain text in the database
#[derive(Debug, FromRow)]
struct LoanRow {
    id: i64,
    book_id: i64,
    member_id: i64,
    loan_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: String,
    fine: i64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(row: LoanRow) -> AppResult<Self> {
        Ok(Loan {
            id: row.id,
            book_id: row.book_id,
            member_id: row.member_id,
            loan_date: row.loan_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: row.status.parse()?,
            fine: row.fine,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Map unique-constraint violations to `Conflict`, everything else is opaque
fn map_unique(err: sqlx::Error, what: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{} already exists", what))
        }
        _ => AppError::Storage(err),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_book(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn find_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE isbn = $1 AND deleted_at IS NULL",
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE deleted_at IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn create_book(&self, book: NewBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, publisher, year, category, description, stock, available)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.year)
        .bind(&book.category)
        .bind(&book.description)
        .bind(book.stock)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, &format!("Book with ISBN {}", book.isbn)))
    }

    async fn get_member(&self, id: i64) -> AppResult<Member> {
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    async fn find_member_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE email = $1 AND deleted_at IS NULL",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn find_member_by_code(&self, code: &str) -> AppResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE member_code = $1 AND deleted_at IS NULL",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn member_code_exists(&self, code: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM members WHERE member_code = $1)")
                .bind(code)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn list_members(&self) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(
            "SELECT * FROM members WHERE deleted_at IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn create_member(&self, member: NewMember) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (name, email, phone, address, member_code, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(&member.address)
        .bind(&member.member_code)
        .bind(&member.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "Member with this email or code"))
    }

    async fn update_member(&self, member: &Member) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            UPDATE members
            SET name = $1, email = $2, phone = $3, address = $4, status = $5, updated_at = NOW()
            WHERE id = $6 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(&member.address)
        .bind(&member.status)
        .bind(member.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique(e, &format!("Member with email {}", member.email)))?
        .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", member.id)))
    }

    async fn delete_member(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE members SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Member with id {} not found", id)));
        }
        Ok(())
    }

    async fn get_loan(&self, id: i64) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?
            .try_into()
    }

    async fn list_loans(&self, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM loans WHERE TRUE");

        if let Some(book_id) = filter.book_id {
            query.push(" AND book_id = ").push_bind(book_id);
        }
        if let Some(member_id) = filter.member_id {
            query.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(due_before) = filter.due_before {
            query.push(" AND due_date < ").push_bind(due_before);
        }
        query.push(" ORDER BY id");

        let rows = query
            .build_query_as::<LoanRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Loan::try_from).collect()
    }
}

/// Unit of work backed by a database transaction. Rows are locked with
/// `SELECT ... FOR UPDATE`; dropping the transaction rolls it back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_book(&mut self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn lock_loan(&mut self, id: i64) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?
            .try_into()
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>(
            r#"
            INSERT INTO loans (book_id, member_id, loan_date, due_date, status, fine, notes)
            VALUES ($1, $2, $3, $4, 'borrowed', 0, $5)
            RETURNING *
            "#,
        )
        .bind(loan.book_id)
        .bind(loan.member_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(&loan.notes)
        .fetch_one(&mut *self.tx)
        .await?
        .try_into()
    }

    async fn save_book(&mut self, book: &Book) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET title = $1, author = $2, isbn = $3, publisher = $4, year = $5,
                category = $6, description = $7, stock = $8, available = $9,
                deleted_at = $10, updated_at = NOW()
            WHERE id = $11
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.year)
        .bind(&book.category)
        .bind(&book.description)
        .bind(book.stock)
        .bind(book.available)
        .bind(book.deleted_at)
        .bind(book.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, &format!("Book with ISBN {}", book.isbn)))
    }

    async fn save_loan(&mut self, loan: &Loan) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>(
            r#"
            UPDATE loans
            SET due_date = $1, return_date = $2, status = $3, fine = $4, notes = $5, updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.status.as_str())
        .bind(loan.fine)
        .bind(&loan.notes)
        .bind(loan.id)
        .fetch_one(&mut *self.tx)
        .await?
        .try_into()
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
