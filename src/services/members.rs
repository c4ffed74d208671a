//! Member enrollment and administration

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        member::{generate_member_code, CreateMember, UpdateMember, STATUS_ACTIVE},
        Member, NewMember,
    },
    repository::RecordStore,
};

/// Attempts at drawing an unused member code before giving up
const MAX_CODE_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct MembersService {
    store: Arc<dyn RecordStore>,
}

impl MembersService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn list_members(&self) -> AppResult<Vec<Member>> {
        self.store.list_members().await
    }

    pub async fn get_member(&self, id: i64) -> AppResult<Member> {
        self.store.get_member(id).await
    }

    pub async fn get_member_by_email(&self, email: &str) -> AppResult<Member> {
        self.store
            .find_member_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with email {} not found", email)))
    }

    pub async fn get_member_by_code(&self, code: &str) -> AppResult<Member> {
        self.store
            .find_member_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with code {} not found", code)))
    }

    /// Enroll a new member with a fresh member code
    pub async fn enroll(&self, request: CreateMember) -> AppResult<Member> {
        self.enroll_drawing(request, || generate_member_code(&mut rand::thread_rng()))
            .await
    }

    async fn enroll_drawing<F>(&self, request: CreateMember, mut draw: F) -> AppResult<Member>
    where
        F: FnMut() -> String + Send,
    {
        if self.store.find_member_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Member with email {} already exists",
                request.email
            )));
        }

        for _ in 0..MAX_CODE_ATTEMPTS {
            // Codes of deleted members stay reserved
            let member_code = draw();
            if self.store.member_code_exists(&member_code).await? {
                tracing::debug!("Member code {} already taken, drawing again", member_code);
                continue;
            }

            let created = self
                .store
                .create_member(NewMember {
                    name: request.name.clone(),
                    email: request.email.clone(),
                    phone: request.phone.clone(),
                    address: request.address.clone(),
                    member_code: member_code.clone(),
                    status: STATUS_ACTIVE.to_string(),
                })
                .await;

            match created {
                Ok(member) => {
                    tracing::info!(member_id = member.id, member_code = %member.member_code, "Member enrolled");
                    return Ok(member);
                }
                Err(AppError::Conflict(msg)) => {
                    // Lost a race for the same code, otherwise the email clashed
                    if !self.store.member_code_exists(&member_code).await? {
                        return Err(AppError::Conflict(msg));
                    }
                    tracing::debug!("Member code {} taken concurrently, drawing again", member_code);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Internal(
            "Could not allocate an unused member code".to_string(),
        ))
    }

    /// Update member fields, including `status`
    pub async fn update_member(&self, id: i64, update: UpdateMember) -> AppResult<Member> {
        let mut member = self.store.get_member(id).await?;

        if let Some(email) = update.email {
            if email != member.email {
                if self.store.find_member_by_email(&email).await?.is_some() {
                    return Err(AppError::Conflict(format!(
                        "Member with email {} already exists",
                        email
                    )));
                }
                member.email = email;
            }
        }
        if let Some(name) = update.name {
            member.name = name;
        }
        if update.phone.is_some() {
            member.phone = update.phone;
        }
        if update.address.is_some() {
            member.address = update.address;
        }
        if let Some(status) = update.status {
            if status != member.status {
                tracing::info!(member_id = id, from = %member.status, to = %status, "Member status changed");
            }
            member.status = status;
        }

        self.store.update_member(&member).await
    }

    pub async fn delete_member(&self, id: i64) -> AppResult<()> {
        self.store.delete_member(id).await?;
        tracing::info!(member_id = id, "Member deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn service() -> MembersService {
        MembersService::new(Arc::new(MemoryStore::new()))
    }

    fn enrollment(email: &str) -> CreateMember {
        CreateMember {
            name: "Katherine Johnson".to_string(),
            email: email.to_string(),
            phone: None,
            address: Some("1 Langley Way".to_string()),
        }
    }

    #[tokio::test]
    async fn test_enroll_generates_code_and_activates() {
        let members = service();
        let member = members.enroll(enrollment("kj@example.org")).await.unwrap();

        assert!(member.is_active());
        assert!(member.member_code.starts_with("MEM"));
        assert_eq!(member.member_code.len(), 9);
        assert_eq!(
            members.get_member_by_code(&member.member_code).await.unwrap().id,
            member.id
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let members = service();
        members.enroll(enrollment("kj@example.org")).await.unwrap();

        assert!(matches!(
            members.enroll(enrollment("kj@example.org")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_suspend_member() {
        let members = service();
        let member = members.enroll(enrollment("kj@example.org")).await.unwrap();

        let updated = members
            .update_member(
                member.id,
                UpdateMember {
                    status: Some("suspended".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.is_active());
        assert_eq!(updated.address.as_deref(), Some("1 Langley Way"));
    }

    #[tokio::test]
    async fn test_deleted_member_is_gone() {
        let members = service();
        let member = members.enroll(enrollment("kj@example.org")).await.unwrap();

        members.delete_member(member.id).await.unwrap();
        assert!(matches!(members.get_member(member.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            members.get_member_by_email("kj@example.org").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_code_of_deleted_member_is_drawn_again() {
        let store = Arc::new(MemoryStore::new());
        let old = store
            .create_member(NewMember {
                name: "Dorothy Vaughan".to_string(),
                email: "dv@example.org".to_string(),
                phone: None,
                address: None,
                member_code: "MEM000001".to_string(),
                status: STATUS_ACTIVE.to_string(),
            })
            .await
            .unwrap();
        store.delete_member(old.id).await.unwrap();

        let members = MembersService::new(store);
        let mut codes = vec!["MEM000001", "MEM000002"].into_iter();
        let member = members
            .enroll_drawing(enrollment("kj@example.org"), move || {
                codes.next().unwrap().to_string()
            })
            .await
            .unwrap();

        assert_eq!(member.member_code, "MEM000002");
    }

    #[tokio::test]
    async fn test_gives_up_when_every_code_is_taken() {
        let members = service();
        members
            .enroll_drawing(enrollment("kj@example.org"), || "MEM000007".to_string())
            .await
            .unwrap();

        let err = members
            .enroll_drawing(enrollment("mj@example.org"), || "MEM000007".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
