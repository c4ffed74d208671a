//! Record store tests against a live PostgreSQL database
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test postgres_store -- --ignored

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;

use circulation_server::{
    clock::SystemClock,
    config::LoansConfig,
    models::{book::CreateBook, loan::CreateLoan, member::CreateMember, LoanFilter, LoanStatus},
    repository::{PgStore, RecordStore},
    services::Services,
    AppError,
};

async fn store() -> Arc<PgStore> {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    Arc::new(PgStore::new(pool))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn seed(services: &Services, stock: i32) -> (i64, i64) {
    let book = services
        .catalog
        .create_book(CreateBook {
            title: "A Wizard of Earthsea".to_string(),
            author: "Ursula K. Le Guin".to_string(),
            isbn: unique("isbn"),
            publisher: None,
            year: Some(1968),
            category: None,
            description: None,
            stock,
        })
        .await
        .unwrap();
    let member = services
        .members
        .enroll(CreateMember {
            name: "Ged".to_string(),
            email: format!("{}@example.org", unique("ged")),
            phone: None,
            address: None,
        })
        .await
        .unwrap();
    (book.id, member.id)
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_round_trip() {
    let store = store().await;
    let services = Services::new(store.clone(), &LoansConfig::default(), Arc::new(SystemClock));
    let (book_id, member_id) = seed(&services, 1).await;

    let loan = services
        .loans
        .create_loan(CreateLoan {
            book_id,
            member_id,
            due_date: Utc::now() + Duration::days(7),
            notes: Some("desk copy".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(store.get_book(book_id).await.unwrap().available, 0);

    let returned = services.loans.return_loan(loan.id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.fine, 0);
    assert_eq!(store.get_book(book_id).await.unwrap().available, 1);

    let err = services.loans.return_loan(loan.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyReturned(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_borrows_of_last_copy() {
    let store = store().await;
    let services = Services::new(store.clone(), &LoansConfig::default(), Arc::new(SystemClock));
    let (book_id, member_id) = seed(&services, 1).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let loans = services.loans.clone();
        handles.push(tokio::spawn(async move {
            loans
                .create_loan(CreateLoan {
                    book_id,
                    member_id,
                    due_date: Utc::now() + Duration::days(7),
                    notes: None,
                })
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::OutOfStock(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);

    let book = store.get_book(book_id).await.unwrap();
    assert_eq!(book.available, 0);

    let borrowed = store
        .list_loans(&LoanFilter {
            book_id: Some(book_id),
            status: Some(LoanStatus::Borrowed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(borrowed.len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_dropped_unit_of_work_rolls_back() {
    let store = store().await;
    let services = Services::new(store.clone(), &LoansConfig::default(), Arc::new(SystemClock));
    let (book_id, _) = seed(&services, 2).await;

    {
        let mut uow = store.begin().await.unwrap();
        let mut book = uow.lock_book(book_id).await.unwrap();
        book.available -= 1;
        uow.save_book(&book).await.unwrap();
    }

    assert_eq!(store.get_book(book_id).await.unwrap().available, 2);
}
