//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoan, LoanQuery},
        Loan, LoanDetails,
    },
    AppState,
};

use super::AuthenticatedUser;

async fn detail(state: &AppState, loan: Loan) -> AppResult<LoanDetails> {
    let mut details = state.services.loans.details(vec![loan]).await?;
    details
        .pop()
        .ok_or_else(|| AppError::Internal("Loan details missing".to_string()))
}

/// List loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans matching the filters", body = Vec<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.list_loans(&query).await?;
    Ok(Json(state.services.loans.details(loans).await?))
}

/// Get loan details by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(id).await?;
    Ok(Json(detail(&state, loan).await?))
}

/// Get loans for a specific member
#[utoipa::path(
    get,
    path = "/members/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Member's loans", body = Vec<LoanDetails>),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member_loans(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(member_id): Path<i64>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.get_member_loans(member_id).await?;
    Ok(Json(state.services.loans.details(loans).await?))
}

/// Get loan history of a book
#[utoipa::path(
    get,
    path = "/books/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book's loans", body = Vec<LoanDetails>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_loans(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(book_id): Path<i64>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.get_book_loans(book_id).await?;
    Ok(Json(state.services.loans.details(loans).await?))
}

/// Create a new loan (borrow a book)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 400, description = "Invalid request or due date"),
        (status = 404, description = "Book or member not found"),
        (status = 409, description = "No copies available"),
        (status = 422, description = "Member not active")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    request.validate()?;

    tracing::debug!(
        "{} lends book {} to member {}",
        user.username,
        request.book_id,
        request.member_id
    );
    let loan = state.services.loans.create_loan(request).await?;
    Ok((StatusCode::CREATED, Json(detail(&state, loan).await?)))
}

/// Return a borrowed book
#[utoipa::path(
    put,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Book returned, fine settled", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    tracing::debug!("{} returns loan {}", user.username, loan_id);
    let loan = state.services.loans.return_loan(loan_id).await?;
    Ok(Json(detail(&state, loan).await?))
}
