//! Read-only access to a tenant's bookkeeping data.
//!
//! Implementors supply the raw record reads; the aggregate operations are
//! provided on top of them and are identical for every backend.

pub mod aggregates;
pub mod memory;

pub use aggregates::{
    BankBalance, BankView, BucketTotal, CashFlow, ContractsView, Deficit, FlowBucket,
    GroupBreakdown, IncomeStatement, Kpis, LedgerFilter, LedgerRow, LedgerTotals,
    ManagementSnapshot, MonthAverage, MonthFlow, Projection, Seasonality, StatusTotal,
    TenantData, TitleTable, TitlesView,
};
pub use memory::InMemoryGateway;

use crate::error::{AssistantError, Result};
use crate::llm::ProviderConfig;
use crate::schema::{Contract, DateWindow, Group, GroupId, Investment, LedgerEntry, Subgroup, Title};
use chrono::NaiveDate;
use log::debug;

pub fn check_tenant(tenant: &str) -> Result<()> {
    if tenant.trim().is_empty() {
        return Err(AssistantError::GatewayInvalid(
            "Tenant id is missing".to_string(),
        ));
    }
    Ok(())
}

pub trait DataGateway: Send + Sync {
    fn ledger_entries(&self, tenant: &str) -> Result<Vec<LedgerEntry>>;
    fn receivables(&self, tenant: &str) -> Result<Vec<Title>>;
    fn payables(&self, tenant: &str) -> Result<Vec<Title>>;
    fn contracts(&self, tenant: &str) -> Result<Vec<Contract>>;
    fn groups(&self, tenant: &str) -> Result<Vec<Group>>;
    fn subgroups(&self, tenant: &str) -> Result<Vec<Subgroup>>;
    fn investments(&self, tenant: &str) -> Result<Vec<Investment>>;

    /// The persisted provider configuration records visible to `tenant`.
    fn provider_configs(&self, tenant: &str) -> Result<Vec<ProviderConfig>> {
        check_tenant(tenant)?;
        Ok(Vec::new())
    }

    fn load(&self, tenant: &str) -> Result<TenantData> {
        check_tenant(tenant)?;
        let data = TenantData {
            ledger: self.ledger_entries(tenant)?,
            receivables: self.receivables(tenant)?,
            payables: self.payables(tenant)?,
            contracts: self.contracts(tenant)?,
            groups: self.groups(tenant)?,
            subgroups: self.subgroups(tenant)?,
            investments: self.investments(tenant)?,
        };
        debug!(
            "Loaded tenant {}: {} ledger entries, {} receivables, {} payables, {} contracts",
            tenant,
            data.ledger.len(),
            data.receivables.len(),
            data.payables.len(),
            data.contracts.len()
        );
        Ok(data)
    }

    fn list_ledger(
        &self,
        tenant: &str,
        window: &DateWindow,
        filter: &LedgerFilter,
    ) -> Result<Vec<LedgerRow>> {
        window.validate()?;
        Ok(self.load(tenant)?.list_ledger(window, filter))
    }

    fn aggregate_ledger(
        &self,
        tenant: &str,
        window: &DateWindow,
        filter: &LedgerFilter,
    ) -> Result<LedgerTotals> {
        window.validate()?;
        Ok(self.load(tenant)?.aggregate_ledger(window, filter))
    }

    fn income_statement(&self, tenant: &str, window: &DateWindow) -> Result<IncomeStatement> {
        window.validate()?;
        Ok(self.load(tenant)?.income_statement(window))
    }

    fn cash_flow(
        &self,
        tenant: &str,
        window: &DateWindow,
        group: Option<GroupId>,
    ) -> Result<CashFlow> {
        window.validate()?;
        Ok(self.load(tenant)?.cash_flow(window, group))
    }

    fn cash_flow_projection(&self, tenant: &str, future_window: &DateWindow) -> Result<Projection> {
        future_window.validate()?;
        Ok(self.load(tenant)?.cash_flow_projection(future_window))
    }

    fn seasonality(&self, tenant: &str) -> Result<Seasonality> {
        Ok(self.load(tenant)?.seasonality())
    }

    fn kpis(&self, tenant: &str, window: &DateWindow) -> Result<Kpis> {
        window.validate()?;
        Ok(self.load(tenant)?.kpis(window))
    }

    fn bank_view(
        &self,
        tenant: &str,
        window: &DateWindow,
        filter: &LedgerFilter,
    ) -> Result<BankView> {
        window.validate()?;
        Ok(self.load(tenant)?.bank_view(window, filter))
    }

    fn bank_balances(&self, tenant: &str, end: NaiveDate) -> Result<Vec<BankBalance>> {
        Ok(self.load(tenant)?.bank_balances(end))
    }

    fn contracts_view(&self, tenant: &str, window: &DateWindow) -> Result<ContractsView> {
        window.validate()?;
        Ok(self.load(tenant)?.contracts_view(window))
    }

    fn titles_view(&self, tenant: &str, window: &DateWindow) -> Result<TitlesView> {
        window.validate()?;
        Ok(self.load(tenant)?.titles_view(window))
    }

    fn management_snapshot(
        &self,
        tenant: &str,
        window: &DateWindow,
        horizon_months: u32,
    ) -> Result<ManagementSnapshot> {
        window.validate()?;
        Ok(self.load(tenant)?.management_snapshot(window, horizon_months))
    }
}
