//! Borrowing eligibility

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::Member,
    repository::RecordStore,
};

#[derive(Clone)]
pub struct MembershipGate {
    store: Arc<dyn RecordStore>,
}

impl MembershipGate {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Load a member and make sure they may receive a new loan
    pub async fn check_eligible(&self, member_id: i64) -> AppResult<Member> {
        let member = self.store.get_member(member_id).await?;
        Self::check(&member)?;
        Ok(member)
    }

    /// Only `active` members may borrow.
    pub fn check(member: &Member) -> AppResult<()> {
        if member.is_active() {
            Ok(())
        } else {
            Err(AppError::Ineligible(format!(
                "Member {} is not active (status: {})",
                member.member_code, member.status
            )))
        }
    }
}
