use crate::error::{AssistantError, Result};
use crate::utils::{month_key, month_keys_between, shift_years};
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type GroupId = u64;
pub type SubgroupId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[schemars(description = "Money coming in (receita, crédito, recebimento)")]
    Entrada,
    #[schemars(description = "Money going out (despesa, débito, pagamento)")]
    Saida,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entrada => "entrada",
            Self::Saida => "saida",
        }
    }

    /// Accepts the canonical tags plus the usual pt-BR synonyms.
    pub fn from_tag(raw: &str) -> Option<Self> {
        match crate::locale::fold(raw.trim()).as_str() {
            "entrada" | "entradas" | "receita" | "receitas" | "credito" | "c" | "e" | "in"
            | "inflow" | "income" => Some(Self::Entrada),
            "saida" | "saidas" | "despesa" | "despesas" | "debito" | "d" | "s" | "out"
            | "outflow" | "expense" => Some(Self::Saida),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    #[default]
    Manual,
    Imported,
    BankStatement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub description: String,
    pub value: Decimal,
    pub direction: Direction,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub subgroup_id: Option<SubgroupId>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub source: EntrySource,
    #[serde(default)]
    pub origin_file: Option<String>,
}

impl LedgerEntry {
    pub fn new(
        date: NaiveDate,
        description: impl Into<String>,
        value: Decimal,
        direction: Direction,
    ) -> Self {
        Self {
            date,
            description: description.into(),
            value,
            direction,
            category: None,
            group_id: None,
            subgroup_id: None,
            account: None,
            bank_name: None,
            source: EntrySource::Manual,
            origin_file: None,
        }
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_subgroup(mut self, group_id: GroupId, subgroup_id: SubgroupId) -> Self {
        self.group_id = Some(group_id);
        self.subgroup_id = Some(subgroup_id);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn from_bank(mut self, bank_name: impl Into<String>) -> Self {
        self.source = EntrySource::BankStatement;
        self.bank_name = Some(bank_name.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Checks `value >= 0` and the group/subgroup tree invariant.
    pub fn validate(&self, subgroups: &[Subgroup]) -> Result<()> {
        if self.value < Decimal::ZERO {
            return Err(AssistantError::InvalidRecord(format!(
                "Ledger entry '{}' on {} has negative value {}",
                self.description, self.date, self.value
            )));
        }
        match (self.group_id, self.subgroup_id) {
            (None, Some(sub)) => Err(AssistantError::InvalidRecord(format!(
                "Ledger entry '{}' has subgroup {} without a group",
                self.description, sub
            ))),
            (Some(group), Some(sub)) => match subgroups.iter().find(|s| s.id == sub) {
                Some(found) if found.group_id != group => {
                    Err(AssistantError::InvalidRecord(format!(
                        "Subgroup {} belongs to group {}, not {}",
                        sub, found.group_id, group
                    )))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// A receivable or payable installment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Title {
    pub counterparty: String,
    pub due_date: NaiveDate,
    pub value: Decimal,
    #[serde(default)]
    pub settled: bool,
    #[serde(default)]
    pub settlement_date: Option<NaiveDate>,
    #[serde(default)]
    pub installment_no: Option<u32>,
    #[serde(default)]
    pub total_installments: Option<u32>,
    pub month_ref: String,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub subgroup_id: Option<SubgroupId>,
    #[serde(default)]
    pub description: Option<String>,
}

pub type Receivable = Title;
pub type Payable = Title;

impl Title {
    pub fn new(counterparty: impl Into<String>, due_date: NaiveDate, value: Decimal) -> Self {
        Self {
            counterparty: counterparty.into(),
            due_date,
            value,
            settled: false,
            settlement_date: None,
            installment_no: None,
            total_installments: None,
            month_ref: month_key(due_date),
            group_id: None,
            subgroup_id: None,
            description: None,
        }
    }

    pub fn settled_on(mut self, date: NaiveDate) -> Self {
        self.settled = true;
        self.settlement_date = Some(date);
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_installment(mut self, number: u32, total: u32) -> Self {
        self.installment_no = Some(number);
        self.total_installments = Some(total);
        self
    }

    /// Date the title hits the cash position: settlement when settled,
    /// otherwise the due date.
    pub fn effective_date(&self) -> NaiveDate {
        if self.settled {
            self.settlement_date.unwrap_or(self.due_date)
        } else {
            self.due_date
        }
    }

    pub fn validate(&self, grace_days: i64) -> Result<()> {
        if self.value <= Decimal::ZERO {
            return Err(AssistantError::InvalidRecord(format!(
                "Title for '{}' due {} must have a positive value",
                self.counterparty, self.due_date
            )));
        }
        if self.month_ref != month_key(self.due_date) {
            return Err(AssistantError::InvalidRecord(format!(
                "Title month_ref {} does not match due date {}",
                self.month_ref, self.due_date
            )));
        }
        if self.settled {
            let settled_on = self.settlement_date.ok_or_else(|| {
                AssistantError::InvalidRecord(format!(
                    "Settled title for '{}' has no settlement date",
                    self.counterparty
                ))
            })?;
            if settled_on < self.due_date - Duration::days(grace_days) {
                return Err(AssistantError::InvalidRecord(format!(
                    "Title for '{}' settled on {} more than {} days before its due date {}",
                    self.counterparty, settled_on, grace_days, self.due_date
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Pendente,
    EmAndamento,
    Concluido,
    Cancelado,
}

impl ContractStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pendente | Self::EmAndamento)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pendente => "pendente",
            Self::EmAndamento => "em_andamento",
            Self::Concluido => "concluido",
            Self::Cancelado => "cancelado",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    pub counterparty: String,
    pub contract_start: NaiveDate,
    pub event_date: NaiveDate,
    pub service_value: Decimal,
    #[serde(default)]
    pub displacement_value: Decimal,
    pub status: ContractStatus,
}

impl Contract {
    pub fn total_value(&self) -> Decimal {
        self.service_value + self.displacement_value
    }

    pub fn validate(&self) -> Result<()> {
        if self.contract_start > self.event_date {
            return Err(AssistantError::InvalidRecord(format!(
                "Contract with '{}' starts {} after its event date {}",
                self.counterparty, self.contract_start, self.event_date
            )));
        }
        if self.service_value < Decimal::ZERO || self.displacement_value < Decimal::ZERO {
            return Err(AssistantError::InvalidRecord(format!(
                "Contract with '{}' has a negative value",
                self.counterparty
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subgroup {
    pub id: SubgroupId,
    pub group_id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Investment {
    pub name: String,
    #[serde(default)]
    pub institution: Option<String>,
    pub balance: Decimal,
    pub as_of: NaiveDate,
}

/// Inclusive civil-date window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(AssistantError::GatewayInvalid(format!(
                "Window is inverted: {} is after {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The same-length window ending the day before this one starts.
    pub fn previous(&self) -> Self {
        let end = self.start - Duration::days(1);
        Self {
            start: end - Duration::days(self.days() - 1),
            end,
        }
    }

    pub fn shift_years(&self, years: i32) -> Self {
        Self {
            start: shift_years(self.start, years),
            end: shift_years(self.end, years),
        }
    }

    /// January 1st of the end's year through the end.
    pub fn year_to_date(&self) -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(self.end.year(), 1, 1).unwrap_or(self.start),
            end: self.end,
        }
    }

    pub fn months(&self) -> Vec<String> {
        month_keys_between(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_window_rejects_inversion() {
        assert!(DateWindow::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
        let single = DateWindow::new(d(2024, 2, 1), d(2024, 2, 1)).unwrap();
        assert_eq!(single.days(), 1);
        assert!(single.contains(d(2024, 2, 1)));
    }

    #[test]
    fn test_previous_window_has_same_length() {
        let window = DateWindow::new(d(2024, 3, 1), d(2024, 3, 31)).unwrap();
        let prior = window.previous();
        assert_eq!(prior.end, d(2024, 2, 29));
        assert_eq!(prior.days(), 31);
        assert_eq!(prior.start, d(2024, 1, 30));
    }

    #[test]
    fn test_year_to_date_and_shift() {
        let window = DateWindow::new(d(2024, 10, 1), d(2024, 10, 31)).unwrap();
        assert_eq!(window.year_to_date().start, d(2024, 1, 1));
        let last_year = window.shift_years(-1);
        assert_eq!(last_year.start, d(2023, 10, 1));
        assert_eq!(last_year.end, d(2023, 10, 31));
    }

    #[test]
    fn test_title_month_ref_and_settlement_grace() {
        let title = Title::new("Cliente", d(2024, 5, 10), dec!(100));
        assert_eq!(title.month_ref, "2024-05");
        assert!(title.validate(90).is_ok());

        let early = title.clone().settled_on(d(2024, 1, 1));
        assert!(early.validate(90).is_err());

        let on_time = title.settled_on(d(2024, 5, 12));
        assert!(on_time.validate(90).is_ok());
        assert_eq!(on_time.effective_date(), d(2024, 5, 12));
    }

    #[test]
    fn test_ledger_entry_tree_invariant() {
        let subgroups = vec![Subgroup {
            id: 7,
            group_id: 1,
            name: "Aluguel".to_string(),
        }];
        let ok = LedgerEntry::new(d(2024, 1, 1), "x", dec!(10), Direction::Saida).with_subgroup(1, 7);
        assert!(ok.validate(&subgroups).is_ok());

        let mismatched =
            LedgerEntry::new(d(2024, 1, 1), "x", dec!(10), Direction::Saida).with_subgroup(2, 7);
        assert!(mismatched.validate(&subgroups).is_err());

        let mut orphan = LedgerEntry::new(d(2024, 1, 1), "x", dec!(10), Direction::Saida);
        orphan.subgroup_id = Some(7);
        assert!(orphan.validate(&subgroups).is_err());

        let negative = LedgerEntry::new(d(2024, 1, 1), "x", dec!(-1), Direction::Saida);
        assert!(negative.validate(&subgroups).is_err());
    }

    #[test]
    fn test_direction_synonyms() {
        assert_eq!(Direction::from_tag("Receita"), Some(Direction::Entrada));
        assert_eq!(Direction::from_tag("DÉBITO"), Some(Direction::Saida));
        assert_eq!(Direction::from_tag("talvez"), None);
        assert_eq!(serde_json::to_string(&Direction::Saida).unwrap(), "\"saida\"");
    }

    #[test]
    fn test_contract_validation() {
        let contract = Contract {
            counterparty: "Noivos".to_string(),
            contract_start: d(2024, 6, 1),
            event_date: d(2024, 5, 1),
            service_value: dec!(1000),
            displacement_value: dec!(0),
            status: ContractStatus::Pendente,
        };
        assert!(contract.validate().is_err());
    }
}
