use super::{check_tenant, DataGateway, TenantData};
use crate::error::{AssistantError, Result};
use crate::llm::ProviderConfig;
use crate::schema::{Contract, Group, Investment, LedgerEntry, Subgroup, Title};
use std::collections::HashMap;

/// Fixture gateway holding every tenant's records in memory. Unknown
/// tenants read as empty.
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    tenants: HashMap<String, TenantData>,
    provider_configs: Vec<ProviderConfig>,
    grace_days: i64,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            tenants: HashMap::new(),
            provider_configs: Vec::new(),
            grace_days: 90,
        }
    }

    pub fn with_grace_days(mut self, days: i64) -> Self {
        self.grace_days = days;
        self
    }

    /// Replaces the tenant's data after checking every record's invariants.
    pub fn with_tenant(mut self, tenant: &str, data: TenantData) -> Result<Self> {
        self.insert_tenant(tenant, data)?;
        Ok(self)
    }

    pub fn with_provider(mut self, config: ProviderConfig) -> Self {
        self.provider_configs.push(config);
        self
    }

    pub fn insert_tenant(&mut self, tenant: &str, data: TenantData) -> Result<()> {
        check_tenant(tenant)?;
        validate(&data, self.grace_days)?;
        self.tenants.insert(tenant.to_string(), data);
        Ok(())
    }

    pub fn push_ledger(&mut self, tenant: &str, entry: LedgerEntry) -> Result<()> {
        check_tenant(tenant)?;
        let data = self.tenants.entry(tenant.to_string()).or_default();
        entry.validate(&data.subgroups)?;
        data.ledger.push(entry);
        Ok(())
    }

    pub fn set_provider_configs(&mut self, configs: Vec<ProviderConfig>) {
        self.provider_configs = configs;
    }

    fn read<T: Clone>(&self, tenant: &str, pick: impl Fn(&TenantData) -> &Vec<T>) -> Result<Vec<T>> {
        check_tenant(tenant)?;
        Ok(self.tenants.get(tenant).map(|d| pick(d).clone()).unwrap_or_default())
    }
}

fn validate(data: &TenantData, grace_days: i64) -> Result<()> {
    for entry in &data.ledger {
        entry.validate(&data.subgroups)?;
    }
    for title in data.receivables.iter().chain(&data.payables) {
        title.validate(grace_days)?;
    }
    for contract in &data.contracts {
        contract.validate()?;
    }
    for sub in &data.subgroups {
        if !data.groups.iter().any(|g| g.id == sub.group_id) {
            return Err(AssistantError::InvalidRecord(format!(
                "Subgroup '{}' references unknown group {}",
                sub.name, sub.group_id
            )));
        }
    }
    let mut names: Vec<String> = data.groups.iter().map(|g| crate::locale::fold(&g.name)).collect();
    names.sort();
    if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
        return Err(AssistantError::InvalidRecord(format!(
            "Group name '{}' is not unique",
            pair[0]
        )));
    }
    Ok(())
}

impl DataGateway for InMemoryGateway {
    fn ledger_entries(&self, tenant: &str) -> Result<Vec<LedgerEntry>> {
        self.read(tenant, |d| &d.ledger)
    }

    fn receivables(&self, tenant: &str) -> Result<Vec<Title>> {
        self.read(tenant, |d| &d.receivables)
    }

    fn payables(&self, tenant: &str) -> Result<Vec<Title>> {
        self.read(tenant, |d| &d.payables)
    }

    fn contracts(&self, tenant: &str) -> Result<Vec<Contract>> {
        self.read(tenant, |d| &d.contracts)
    }

    fn groups(&self, tenant: &str) -> Result<Vec<Group>> {
        self.read(tenant, |d| &d.groups)
    }

    fn subgroups(&self, tenant: &str) -> Result<Vec<Subgroup>> {
        self.read(tenant, |d| &d.subgroups)
    }

    fn investments(&self, tenant: &str) -> Result<Vec<Investment>> {
        self.read(tenant, |d| &d.investments)
    }

    fn provider_configs(&self, tenant: &str) -> Result<Vec<ProviderConfig>> {
        check_tenant(tenant)?;
        Ok(self.provider_configs.clone())
    }

    fn load(&self, tenant: &str) -> Result<TenantData> {
        check_tenant(tenant)?;
        Ok(self.tenants.get(tenant).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::LedgerFilter;
    use crate::schema::{DateWindow, Direction};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_missing_tenant_and_inverted_window_are_invalid() {
        let gateway = InMemoryGateway::new();
        let window = DateWindow::single_day(d(2024, 1, 1));
        let err = gateway.income_statement("", &window).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayInvalid);

        let inverted = DateWindow {
            start: d(2024, 2, 1),
            end: d(2024, 1, 1),
        };
        let err = gateway
            .list_ledger("acme", &inverted, &LedgerFilter::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayInvalid);
    }

    #[test]
    fn test_unknown_tenant_reads_empty() {
        let gateway = InMemoryGateway::new();
        let window = DateWindow::single_day(d(2024, 1, 1));
        let totals = gateway
            .aggregate_ledger("ninguem", &window, &LedgerFilter::default())
            .unwrap();
        assert_eq!(totals.count, 0);
        assert!(gateway.seasonality("ninguem").unwrap().by_year.is_empty());
    }

    #[test]
    fn test_invalid_records_are_rejected() {
        let data = TenantData {
            ledger: vec![LedgerEntry::new(d(2024, 1, 1), "x", dec!(-5), Direction::Entrada)],
            ..Default::default()
        };
        assert!(InMemoryGateway::new().with_tenant("acme", data).is_err());

        let duplicated = TenantData {
            groups: vec![
                Group { id: 1, name: "Receitas".into() },
                Group { id: 2, name: "RECEITAS".into() },
            ],
            ..Default::default()
        };
        assert!(InMemoryGateway::new().with_tenant("acme", duplicated).is_err());
    }

    #[test]
    fn test_push_ledger_is_visible() {
        let mut gateway = InMemoryGateway::new();
        gateway
            .push_ledger("acme", LedgerEntry::new(d(2024, 1, 2), "x", dec!(5), Direction::Entrada))
            .unwrap();
        assert_eq!(gateway.ledger_entries("acme").unwrap().len(), 1);
    }
}
