//! Business logic services

pub mod auth;
pub mod catalog;
pub mod fines;
pub mod inventory;
pub mod loans;
pub mod members;
pub mod membership;

use std::sync::Arc;

use crate::{clock::Clock, config::LoansConfig, repository::RecordStore};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub members: members::MembersService,
    pub loans: loans::LoansService,
    pub inventory: inventory::InventoryLedger,
    store: Arc<dyn RecordStore>,
}

impl Services {
    /// Create all services on top of the given record store
    pub fn new(store: Arc<dyn RecordStore>, loans_config: &LoansConfig, clock: Arc<dyn Clock>) -> Self {
        let inventory = inventory::InventoryLedger::new(store.clone());
        let membership = membership::MembershipGate::new(store.clone());
        let fines = fines::FineCalculator::new(loans_config.fine_per_day);

        Self {
            catalog: catalog::CatalogService::new(store.clone(), inventory.clone()),
            members: members::MembersService::new(store.clone()),
            loans: loans::LoansService::new(store.clone(), inventory.clone(), membership, fines, clock),
            inventory,
            store,
        }
    }

    /// Check that the record store answers
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        self.store.ping().await
    }
}
