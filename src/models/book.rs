//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Book model from the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Total copies owned
    pub stock: i32,
    /// Copies currently on the shelf
    pub available: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Book {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check `0 <= available <= stock`
    pub fn check_counters(&self) -> AppResult<()> {
        if self.available < 0 || self.available > self.stock {
            return Err(AppError::Internal(format!(
                "Book {} counters out of range (available {}, stock {})",
                self.id, self.available, self.stock
            )));
        }
        Ok(())
    }
}

/// Fields required to insert a book
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub stock: i32,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

impl From<CreateBook> for NewBook {
    fn from(book: CreateBook) -> Self {
        Self {
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            publisher: book.publisher,
            year: book.year,
            category: book.category,
            description: book.description,
            stock: book.stock,
        }
    }
}

/// Update book request, absent fields are left untouched
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    #[validate(length(min = 1, message = "ISBN cannot be empty"))]
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
}

/// Stock adjustment request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStock {
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}
