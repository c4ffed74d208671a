//! Catalog service: book entries and their stock

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{CreateBook, UpdateBook},
        Book,
    },
    repository::RecordStore,
};

use super::inventory::{apply_stock, InventoryLedger};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn RecordStore>,
    inventory: InventoryLedger,
}

impl CatalogService {
    pub fn new(store: Arc<dyn RecordStore>, inventory: InventoryLedger) -> Self {
        Self { store, inventory }
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.store.list_books().await
    }

    pub async fn get_book(&self, id: i64) -> AppResult<Book> {
        self.store.get_book(id).await
    }

    pub async fn get_book_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        self.store
            .find_book_by_isbn(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with ISBN {} not found", isbn)))
    }

    /// Add a book to the catalog, all copies available
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        if self.store.find_book_by_isbn(&book.isbn).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Book with ISBN {} already exists",
                book.isbn
            )));
        }

        let created = self.store.create_book(book.into()).await?;
        tracing::info!(book_id = created.id, isbn = %created.isbn, stock = created.stock, "Book created");
        Ok(created)
    }

    /// Update catalog fields; a stock change shifts availability with it
    pub async fn update_book(&self, id: i64, update: UpdateBook) -> AppResult<Book> {
        if let Some(ref isbn) = update.isbn {
            if let Some(existing) = self.store.find_book_by_isbn(isbn).await? {
                if existing.id != id {
                    return Err(AppError::Conflict(format!(
                        "Book with ISBN {} already exists",
                        isbn
                    )));
                }
            }
        }

        let mut uow = self.store.begin().await?;
        let mut book = uow.lock_book(id).await?;
        if book.is_deleted() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        if let Some(title) = update.title {
            book.title = title;
        }
        if let Some(author) = update.author {
            book.author = author;
        }
        if let Some(isbn) = update.isbn {
            book.isbn = isbn;
        }
        if update.publisher.is_some() {
            book.publisher = update.publisher;
        }
        if update.year.is_some() {
            book.year = update.year;
        }
        if update.category.is_some() {
            book.category = update.category;
        }
        if update.description.is_some() {
            book.description = update.description;
        }
        if let Some(stock) = update.stock {
            apply_stock(&mut book, stock)?;
        }

        let book = uow.save_book(&book).await?;
        uow.commit().await?;

        tracing::info!(book_id = book.id, "Book updated");
        Ok(book)
    }

    /// Change the number of owned copies
    pub async fn adjust_stock(&self, id: i64, new_stock: i32) -> AppResult<Book> {
        self.inventory.adjust_stock(id, new_stock).await
    }

    /// Soft delete; loan history keeps pointing at the row
    pub async fn delete_book(&self, id: i64) -> AppResult<()> {
        let mut uow = self.store.begin().await?;
        let mut book = uow.lock_book(id).await?;
        if book.is_deleted() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        book.deleted_at = Some(Utc::now());
        uow.save_book(&book).await?;
        uow.commit().await?;

        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn service() -> CatalogService {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        CatalogService::new(store.clone(), InventoryLedger::new(store))
    }

    fn create(isbn: &str, stock: i32) -> CreateBook {
        CreateBook {
            title: "Solaris".to_string(),
            author: "Stanisław Lem".to_string(),
            isbn: isbn.to_string(),
            publisher: Some("Faber".to_string()),
            year: Some(1961),
            category: Some("Fiction".to_string()),
            description: None,
            stock,
        }
    }

    #[tokio::test]
    async fn test_update_keeps_untouched_fields() {
        let catalog = service();
        let book = catalog.create_book(create("isbn-1", 3)).await.unwrap();

        let updated = catalog
            .update_book(
                book.id,
                UpdateBook {
                    title: Some("Solaris (2nd ed.)".to_string()),
                    stock: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Solaris (2nd ed.)");
        assert_eq!(updated.publisher.as_deref(), Some("Faber"));
        assert_eq!((updated.stock, updated.available), (5, 5));
    }

    #[tokio::test]
    async fn test_isbn_collisions() {
        let catalog = service();
        let first = catalog.create_book(create("isbn-1", 1)).await.unwrap();
        catalog.create_book(create("isbn-2", 1)).await.unwrap();

        assert!(matches!(
            catalog.create_book(create("isbn-1", 1)).await,
            Err(AppError::Conflict(_))
        ));

        let err = catalog
            .update_book(
                first.id,
                UpdateBook {
                    isbn: Some("isbn-2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Re-sending the current ISBN is not a collision
        catalog
            .update_book(
                first.id,
                UpdateBook {
                    isbn: Some("isbn-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deleted_book_disappears() {
        let catalog = service();
        let book = catalog.create_book(create("isbn-1", 1)).await.unwrap();

        catalog.delete_book(book.id).await.unwrap();

        assert!(matches!(catalog.get_book(book.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(catalog.delete_book(book.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(catalog.adjust_stock(book.id, 4).await, Err(AppError::NotFound(_))));
        assert!(catalog.list_books().await.unwrap().is_empty());
    }
}
