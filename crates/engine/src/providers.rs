//! External collaborators the engine depends on. Production wiring
//! adapts the tenant directory, consent ledger, and roster service
//! behind these traits; tests use the in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use leadpath_core::domain::lead::{ConsentState, LeadId, TenantId};
use leadpath_core::errors::ApplicationError;
use leadpath_core::quiet_hours::TenantContext;
use leadpath_core::snapshot::{RosterMember, TourRecord};

#[async_trait]
pub trait TenantContextProvider: Send + Sync {
    /// Unknown tenants are fatal for the calling operation.
    async fn tenant_context(&self, tenant_id: &TenantId)
        -> Result<TenantContext, ApplicationError>;
}

#[async_trait]
pub trait ConsentProvider: Send + Sync {
    /// Per-channel consent for the lead; unknown leads report the
    /// default (all channels unknown) rather than an error.
    async fn consent_state(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<ConsentState, ApplicationError>;
}

#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn roster(&self, tenant_id: &TenantId) -> Result<Vec<RosterMember>, ApplicationError>;

    /// Tour history inside the provider's lookback window.
    async fn tour_history(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TourRecord>, ApplicationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryTenantDirectory {
    tenants: Arc<RwLock<HashMap<String, TenantContext>>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, tenant_id: TenantId, context: TenantContext) {
        let mut tenants = self.tenants.write().await;
        tenants.insert(tenant_id.0, context);
    }
}

#[async_trait]
impl TenantContextProvider for InMemoryTenantDirectory {
    async fn tenant_context(
        &self,
        tenant_id: &TenantId,
    ) -> Result<TenantContext, ApplicationError> {
        let tenants = self.tenants.read().await;
        tenants
            .get(&tenant_id.0)
            .cloned()
            .ok_or_else(|| ApplicationError::UnknownTenant(tenant_id.0.clone()))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryConsentDirectory {
    states: Arc<RwLock<HashMap<(String, String), ConsentState>>>,
}

impl InMemoryConsentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, tenant_id: &TenantId, lead_id: &LeadId, state: ConsentState) {
        let mut states = self.states.write().await;
        states.insert((tenant_id.0.clone(), lead_id.0.clone()), state);
    }
}

#[async_trait]
impl ConsentProvider for InMemoryConsentDirectory {
    async fn consent_state(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<ConsentState, ApplicationError> {
        let states = self.states.read().await;
        Ok(states
            .get(&(tenant_id.0.clone(), lead_id.0.clone()))
            .copied()
            .unwrap_or_default())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRoster {
    members: Arc<RwLock<HashMap<String, Vec<RosterMember>>>>,
    tours: Arc<RwLock<HashMap<String, Vec<TourRecord>>>>,
}

impl InMemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_roster(&self, tenant_id: &TenantId, roster: Vec<RosterMember>) {
        let mut members = self.members.write().await;
        members.insert(tenant_id.0.clone(), roster);
    }

    pub async fn set_tours(&self, tenant_id: &TenantId, tours: Vec<TourRecord>) {
        let mut history = self.tours.write().await;
        history.insert(tenant_id.0.clone(), tours);
    }
}

#[async_trait]
impl RosterProvider for InMemoryRoster {
    async fn roster(&self, tenant_id: &TenantId) -> Result<Vec<RosterMember>, ApplicationError> {
        let members = self.members.read().await;
        Ok(members.get(&tenant_id.0).cloned().unwrap_or_default())
    }

    async fn tour_history(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TourRecord>, ApplicationError> {
        let tours = self.tours.read().await;
        Ok(tours.get(&tenant_id.0).cloned().unwrap_or_default())
    }
}
