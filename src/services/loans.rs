//! Loan ledger: the borrow/return state machine

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoan, LoanQuery},
        Book, Loan, LoanDetails, LoanFilter, LoanStatus, Member, NewLoan,
    },
    repository::RecordStore,
};

use super::{fines::FineCalculator, inventory::InventoryLedger, membership::MembershipGate};

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn RecordStore>,
    inventory: InventoryLedger,
    membership: MembershipGate,
    fines: FineCalculator,
    clock: Arc<dyn Clock>,
}

impl LoansService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        inventory: InventoryLedger,
        membership: MembershipGate,
        fines: FineCalculator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            inventory,
            membership,
            fines,
            clock,
        }
    }

    /// Create a new loan (borrow a book)
    pub async fn create_loan(&self, request: CreateLoan) -> AppResult<Loan> {
        let book = self.store.get_book(request.book_id).await?;
        if book.available <= 0 {
            return Err(AppError::OutOfStock(format!(
                "\"{}\" is not available for loan",
                book.title
            )));
        }

        let member = self.membership.check_eligible(request.member_id).await?;

        let now = self.clock.now();
        if request.due_date <= now {
            return Err(AppError::InvalidDueDate(
                "Due date must be in the future".to_string(),
            ));
        }

        // The book row is locked before the loan row references it.
        // Reservation and insert commit together or not at all.
        let mut uow = self.store.begin().await?;
        let book = self.inventory.reserve_copy_in(uow.as_mut(), book.id).await?;
        let loan = uow
            .insert_loan(NewLoan {
                book_id: book.id,
                member_id: member.id,
                loan_date: now,
                due_date: request.due_date,
                notes: request.notes,
            })
            .await?;
        uow.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            book_id = book.id,
            member_id = member.id,
            available = book.available,
            "Loan created"
        );
        Ok(loan)
    }

    /// Return a borrowed book, settling its fine
    pub async fn return_loan(&self, loan_id: i64) -> AppResult<Loan> {
        let mut uow = self.store.begin().await?;

        let mut loan = uow.lock_loan(loan_id).await?;
        if loan.is_returned() {
            return Err(AppError::AlreadyReturned(format!(
                "Loan {} was already returned",
                loan_id
            )));
        }

        let now = self.clock.now();
        loan.fine = self.fines.compute_fine(loan.due_date, now);
        loan.return_date = Some(now);
        loan.status = LoanStatus::Returned;

        let loan = uow.save_loan(&loan).await?;
        let book = self.inventory.release_copy_in(uow.as_mut(), loan.book_id).await?;
        uow.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            book_id = book.id,
            fine = loan.fine,
            available = book.available,
            "Loan returned"
        );
        Ok(loan)
    }

    /// Loan views with their overdue flag and the referenced book and member
    pub async fn details(&self, loans: Vec<Loan>) -> AppResult<Vec<LoanDetails>> {
        let now = self.clock.now();
        let mut books: HashMap<i64, Option<Book>> = HashMap::new();
        let mut members: HashMap<i64, Option<Member>> = HashMap::new();

        let mut details = Vec::with_capacity(loans.len());
        for loan in loans {
            if !books.contains_key(&loan.book_id) {
                let book = present(self.store.get_book(loan.book_id).await)?;
                books.insert(loan.book_id, book);
            }
            if !members.contains_key(&loan.member_id) {
                let member = present(self.store.get_member(loan.member_id).await)?;
                members.insert(loan.member_id, member);
            }

            let book = books.get(&loan.book_id).cloned().flatten();
            let member = members.get(&loan.member_id).cloned().flatten();
            details.push(LoanDetails {
                book,
                member,
                ..LoanDetails::at(loan, now)
            });
        }
        Ok(details)
    }

    /// Get loan by ID
    pub async fn get_loan(&self, loan_id: i64) -> AppResult<Loan> {
        self.store.get_loan(loan_id).await
    }

    /// List loans matching the query
    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<Loan>> {
        let mut filter = if query.overdue.unwrap_or(false) {
            LoanFilter::overdue(self.clock.now())
        } else {
            LoanFilter::default()
        };
        filter.book_id = query.book_id;
        filter.member_id = query.member_id;
        if let Some(status) = query.status {
            if filter.status.is_some_and(|s| s != status) {
                return Ok(Vec::new());
            }
            filter.status = Some(status);
        }

        self.store.list_loans(&filter).await
    }

    /// Get loans for a member
    pub async fn get_member_loans(&self, member_id: i64) -> AppResult<Vec<Loan>> {
        self.store.get_member(member_id).await?;
        self.store
            .list_loans(&LoanFilter {
                member_id: Some(member_id),
                ..Default::default()
            })
            .await
    }

    /// Get loans of a book
    pub async fn get_book_loans(&self, book_id: i64) -> AppResult<Vec<Loan>> {
        self.store.get_book(book_id).await?;
        self.store
            .list_loans(&LoanFilter {
                book_id: Some(book_id),
                ..Default::default()
            })
            .await
    }

    /// Borrowed loans past their due date
    pub async fn get_overdue_loans(&self) -> AppResult<Vec<Loan>> {
        self.store
            .list_loans(&LoanFilter::overdue(self.clock.now()))
            .await
    }
}

/// Deleted rows read as absent
fn present<T>(result: AppResult<T>) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::MockClock,
        models::{NewBook, NewMember},
        repository::MemoryStore,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    /// Clock answering `times` in order
    fn clock(times: Vec<DateTime<Utc>>) -> Arc<dyn Clock> {
        let mut mock = MockClock::new();
        let mut seq = mockall::Sequence::new();
        for t in times {
            mock.expect_now().times(1).in_sequence(&mut seq).return_const(t);
        }
        Arc::new(mock)
    }

    async fn fixture(stock: i32, status: &str, clock: Arc<dyn Clock>) -> (LoansService, Arc<MemoryStore>, i64, i64) {
        let store = Arc::new(MemoryStore::new());
        let book = store
            .create_book(NewBook {
                title: "Parable of the Sower".to_string(),
                author: "Octavia E. Butler".to_string(),
                isbn: "9781538732182".to_string(),
                publisher: None,
                year: Some(1993),
                category: None,
                description: None,
                stock,
            })
            .await
            .unwrap();
        let member = store
            .create_member(NewMember {
                name: "Lauren".to_string(),
                email: "lauren@example.org".to_string(),
                phone: None,
                address: None,
                member_code: "MEM000042".to_string(),
                status: status.to_string(),
            })
            .await
            .unwrap();

        let dyn_store: Arc<dyn RecordStore> = store.clone();
        let service = LoansService::new(
            dyn_store.clone(),
            InventoryLedger::new(dyn_store.clone()),
            MembershipGate::new(dyn_store),
            FineCalculator::default(),
            clock,
        );
        (service, store, book.id, member.id)
    }

    fn request(book_id: i64, member_id: i64, due_date: DateTime<Utc>) -> CreateLoan {
        CreateLoan {
            book_id,
            member_id,
            due_date,
            notes: Some("front desk".to_string()),
        }
    }

    #[tokio::test]
    async fn test_late_return_charges_whole_days() {
        let due = t0() + Duration::days(14);
        let returned = due + Duration::hours(24) + Duration::minutes(1);
        let (service, store, book_id, member_id) =
            fixture(1, "active", clock(vec![t0(), returned])).await;

        let loan = service.create_loan(request(book_id, member_id, due)).await.unwrap();
        assert_eq!(loan.loan_date, t0());
        assert_eq!(loan.fine, 0);

        let returned_loan = service.return_loan(loan.id).await.unwrap();
        assert_eq!(returned_loan.status, LoanStatus::Returned);
        assert_eq!(returned_loan.return_date, Some(returned));
        assert_eq!(returned_loan.fine, 1000);
        assert_eq!(store.get_book(book_id).await.unwrap().available, 1);
    }

    #[tokio::test]
    async fn test_due_date_must_be_strictly_future() {
        let (service, store, book_id, member_id) =
            fixture(1, "active", clock(vec![t0(), t0()])).await;

        let err = service
            .create_loan(request(book_id, member_id, t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDueDate(_)));

        let err = service
            .create_loan(request(book_id, member_id, t0() - Duration::hours(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDueDate(_)));

        assert_eq!(store.get_book(book_id).await.unwrap().available, 1);
        assert!(store.list_loans(&LoanFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ineligible_member_checked_before_due_date() {
        let (service, store, book_id, member_id) =
            fixture(1, "suspended", Arc::new(MockClock::new())).await;

        let err = service
            .create_loan(request(book_id, member_id, t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ineligible(_)));
        assert_eq!(store.get_book(book_id).await.unwrap().available, 1);
    }

    #[tokio::test]
    async fn test_unknown_book_and_member() {
        let (service, _store, book_id, _member_id) =
            fixture(1, "active", Arc::new(MockClock::new())).await;

        let err = service
            .create_loan(request(999, 1, t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = service
            .create_loan(request(book_id, 999, t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        assert!(matches!(service.return_loan(999).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_overdue_listing_uses_clock() {
        let due = t0() + Duration::days(1);
        let (service, _store, book_id, member_id) = fixture(
            2,
            "active",
            clock(vec![t0(), t0(), due + Duration::minutes(1)]),
        )
        .await;

        let loan = service.create_loan(request(book_id, member_id, due)).await.unwrap();

        assert!(service.get_overdue_loans().await.unwrap().is_empty());
        let overdue = service.get_overdue_loans().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, loan.id);
    }

    #[tokio::test]
    async fn test_details_carry_book_and_member() {
        let due = t0() + Duration::days(7);
        let (service, store, book_id, member_id) =
            fixture(1, "active", clock(vec![t0(), t0(), t0()])).await;

        let loan = service.create_loan(request(book_id, member_id, due)).await.unwrap();

        let details = service.details(vec![loan.clone()]).await.unwrap();
        assert_eq!(details.len(), 1);
        assert!(!details[0].is_overdue);
        assert_eq!(details[0].book.as_ref().map(|b| b.id), Some(book_id));
        assert_eq!(
            details[0].member.as_ref().map(|m| m.member_code.as_str()),
            Some("MEM000042")
        );

        store.delete_member(member_id).await.unwrap();
        let details = service.details(vec![loan]).await.unwrap();
        assert!(details[0].member.is_none());
        assert!(details[0].book.is_some());
    }
}
