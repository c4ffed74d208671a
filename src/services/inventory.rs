//! Inventory ledger: a book's `stock` and `available` counters

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::Book,
    repository::{RecordStore, UnitOfWork},
};

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn RecordStore>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Take one copy off the shelf in its own transaction
    pub async fn reserve_copy(&self, book_id: i64) -> AppResult<Book> {
        let mut uow = self.store.begin().await?;
        let book = self.reserve_copy_in(uow.as_mut(), book_id).await?;
        uow.commit().await?;
        Ok(book)
    }

    /// Put one copy back on the shelf in its own transaction
    pub async fn release_copy(&self, book_id: i64) -> AppResult<Book> {
        let mut uow = self.store.begin().await?;
        let book = self.release_copy_in(uow.as_mut(), book_id).await?;
        uow.commit().await?;
        Ok(book)
    }

    /// Change the number of owned copies, shifting `available` by the same amount
    pub async fn adjust_stock(&self, book_id: i64, new_stock: i32) -> AppResult<Book> {
        let mut uow = self.store.begin().await?;

        let mut book = uow.lock_book(book_id).await?;
        if book.is_deleted() {
            return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
        }

        let old_stock = book.stock;
        apply_stock(&mut book, new_stock)?;
        let book = uow.save_book(&book).await?;
        uow.commit().await?;

        tracing::info!(
            book_id,
            old_stock,
            new_stock,
            available = book.available,
            "Stock adjusted"
        );
        Ok(book)
    }

    /// Decrement `available` under the book's lock held by `uow`
    pub async fn reserve_copy_in(&self, uow: &mut dyn UnitOfWork, book_id: i64) -> AppResult<Book> {
        let mut book = uow.lock_book(book_id).await?;
        if book.is_deleted() {
            return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
        }
        if book.available <= 0 {
            return Err(AppError::OutOfStock(format!(
                "No copies of \"{}\" are available",
                book.title
            )));
        }

        book.available -= 1;
        book.check_counters()?;
        uow.save_book(&book).await
    }

    /// Increment `available` under the book's lock held by `uow`, never past `stock`
    pub async fn release_copy_in(&self, uow: &mut dyn UnitOfWork, book_id: i64) -> AppResult<Book> {
        let mut book = uow.lock_book(book_id).await?;

        if book.available >= book.stock {
            tracing::warn!(
                book_id,
                stock = book.stock,
                available = book.available,
                "Released copy would exceed stock, clamping"
            );
            return Ok(book);
        }

        book.available += 1;
        uow.save_book(&book).await
    }
}

/// Set `stock` to `new_stock` and move `available` by the same delta, floored at zero.
///
/// Shrinking stock below the number of outstanding loans loses availability
/// instead of failing.
pub fn apply_stock(book: &mut Book, new_stock: i32) -> AppResult<()> {
    if new_stock < 0 {
        return Err(AppError::Validation("Stock cannot be negative".to_string()));
    }

    let delta = new_stock - book.stock;
    book.stock = new_stock;
    book.available = (book.available + delta).max(0);
    book.check_counters()
}
