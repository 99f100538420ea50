//! Deterministic aggregations over one tenant's data. Every function here is
//! pure: no I/O, no clock, empty input yields zeroed output.

use crate::locale::{contains_folded, fold};
use crate::schema::{
    Contract, ContractStatus, DateWindow, Direction, EntrySource, Group, GroupId, Investment,
    LedgerEntry, Subgroup, SubgroupId, Title,
};
use crate::utils::{month_end, month_key, shift_month_start};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNKNOWN_BANK: &str = "Banco não informado";
pub const UNGROUPED: &str = "Sem grupo";
pub const UNCATEGORIZED: &str = "Sem categoria";

/// Everything the gateway knows about one tenant, loaded for one operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantData {
    pub ledger: Vec<LedgerEntry>,
    pub receivables: Vec<Title>,
    pub payables: Vec<Title>,
    pub contracts: Vec<Contract>,
    pub groups: Vec<Group>,
    pub subgroups: Vec<Subgroup>,
    pub investments: Vec<Investment>,
}

/// Filters in id form; the executor resolves names before calling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub group_id: Option<GroupId>,
    pub subgroup_id: Option<SubgroupId>,
    pub category: Option<String>,
    pub direction: Option<Direction>,
}

impl LedgerFilter {
    pub fn is_empty(&self) -> bool {
        self.group_id.is_none()
            && self.subgroup_id.is_none()
            && self.category.is_none()
            && self.direction.is_none()
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if self.group_id.is_some() && entry.group_id != self.group_id {
            return false;
        }
        if self.subgroup_id.is_some() && entry.subgroup_id != self.subgroup_id {
            return false;
        }
        if let Some(direction) = self.direction {
            if entry.direction != direction {
                return false;
            }
        }
        match (&self.category, &entry.category) {
            (Some(wanted), Some(actual)) => contains_folded(actual, wanted),
            (Some(_), None) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerRow {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerTotals {
    #[serde(rename = "total_entradas")]
    pub total_in: Decimal,
    #[serde(rename = "total_saidas")]
    pub total_out: Decimal,
    #[serde(rename = "saldo")]
    pub balance: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketTotal {
    pub name: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IncomeStatement {
    pub revenues: Decimal,
    pub expenses: Decimal,
    pub net: Decimal,
    pub margin_pct: Decimal,
    pub revenues_by_group: Vec<BucketTotal>,
    pub expenses_by_group: Vec<BucketTotal>,
    pub revenues_by_subgroup: Vec<BucketTotal>,
    pub expenses_by_subgroup: Vec<BucketTotal>,
    pub revenues_by_category: Vec<BucketTotal>,
    pub expenses_by_category: Vec<BucketTotal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthFlow {
    pub month: String,
    #[serde(rename = "in")]
    pub inflow: Decimal,
    #[serde(rename = "out")]
    pub outflow: Decimal,
    pub net: Decimal,
    pub running: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowBucket {
    pub name: String,
    #[serde(rename = "in")]
    pub inflow: Decimal,
    #[serde(rename = "out")]
    pub outflow: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CashFlow {
    pub per_month: Vec<MonthFlow>,
    pub final_balance: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_group: Option<Vec<FlowBucket>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deficit {
    pub month: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    pub per_month: Vec<MonthFlow>,
    pub final_balance: Decimal,
    pub deficits: Vec<Deficit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthAverage {
    pub month: u32,
    pub avg: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Seasonality {
    pub by_year: BTreeMap<i32, BTreeMap<u32, Decimal>>,
    pub month_average: Vec<MonthAverage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Kpis {
    #[serde(flatten)]
    pub income: IncomeStatement,
    pub pending_payables: Decimal,
    pub pending_receivables: Decimal,
    pub active_contracts: usize,
    pub active_contracts_value: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BankView {
    pub per_bank: Vec<FlowBucket>,
    pub per_month: Vec<MonthFlow>,
    pub rows: Vec<LedgerRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankBalance {
    pub bank: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusTotal {
    pub status: ContractStatus,
    pub count: usize,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractsView {
    pub rows: Vec<Contract>,
    pub count: usize,
    pub total_value: Decimal,
    pub by_status: Vec<StatusTotal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TitleTable {
    pub rows: Vec<Title>,
    pub count: usize,
    pub total: Decimal,
    pub settled: Decimal,
    pub pending: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TitlesView {
    pub receivables: TitleTable,
    pub payables: TitleTable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupBreakdown {
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup: Option<String>,
    #[serde(rename = "in")]
    pub inflow: Decimal,
    #[serde(rename = "out")]
    pub outflow: Decimal,
}

/// The data a management report is written from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagementSnapshot {
    pub window: DateWindow,
    pub prior_window: DateWindow,
    pub income: IncomeStatement,
    pub prior_income: IncomeStatement,
    pub ytd_income: IncomeStatement,
    pub cash_flow: CashFlow,
    pub projection_window: DateWindow,
    pub projection: Projection,
    pub bank_balances: Vec<BankBalance>,
    pub investments: Vec<Investment>,
    pub receivables_pending: TitleTable,
    pub receivables_future: TitleTable,
    pub payables_pending: TitleTable,
    pub payables_future: TitleTable,
    pub breakdown: Vec<GroupBreakdown>,
    pub active_contracts: ContractsView,
}

/// One realized money movement, whatever family it came from.
struct Movement<'a> {
    date: NaiveDate,
    value: Decimal,
    direction: Direction,
    group_id: Option<GroupId>,
    subgroup_id: Option<SubgroupId>,
    category: &'a str,
}

pub fn percent(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        (numerator / denominator * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

impl TenantData {
    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
            && self.receivables.is_empty()
            && self.payables.is_empty()
            && self.contracts.is_empty()
    }

    pub fn group_name(&self, id: GroupId) -> String {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.clone())
            .unwrap_or_else(|| format!("Grupo {}", id))
    }

    pub fn subgroup_name(&self, id: SubgroupId) -> String {
        self.subgroups
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("Subgrupo {}", id))
    }

    /// First group whose name contains `needle`, ignoring case and accents.
    pub fn find_group(&self, needle: &str) -> Option<&Group> {
        let needle = fold(needle.trim());
        if needle.is_empty() {
            return None;
        }
        self.groups.iter().find(|g| fold(&g.name).contains(&needle))
    }

    pub fn find_subgroup(&self, needle: &str, group: Option<GroupId>) -> Option<&Subgroup> {
        let needle = fold(needle.trim());
        if needle.is_empty() {
            return None;
        }
        self.subgroups
            .iter()
            .filter(|s| group.is_none_or(|g| s.group_id == g))
            .find(|s| fold(&s.name).contains(&needle))
    }

    fn row(&self, entry: &LedgerEntry) -> LedgerRow {
        LedgerRow {
            entry: entry.clone(),
            group: entry.group_id.map(|id| self.group_name(id)),
            subgroup: entry.subgroup_id.map(|id| self.subgroup_name(id)),
        }
    }

    /// Ledger rows in the window matching `filter`, newest first.
    pub fn list_ledger(&self, window: &DateWindow, filter: &LedgerFilter) -> Vec<LedgerRow> {
        let mut rows: Vec<LedgerRow> = self
            .ledger
            .iter()
            .filter(|e| window.contains(e.date) && filter.matches(e))
            .map(|e| self.row(e))
            .collect();
        rows.sort_by(|a, b| b.entry.date.cmp(&a.entry.date));
        rows
    }

    pub fn aggregate_ledger(&self, window: &DateWindow, filter: &LedgerFilter) -> LedgerTotals {
        let mut totals = LedgerTotals::default();
        for entry in self
            .ledger
            .iter()
            .filter(|e| window.contains(e.date) && filter.matches(e))
        {
            match entry.direction {
                Direction::Entrada => totals.total_in += entry.value,
                Direction::Saida => totals.total_out += entry.value,
            }
            totals.count += 1;
        }
        totals.balance = totals.total_in - totals.total_out;
        totals
    }

    /// Ledger entries, completed contracts and settled titles that hit the
    /// cash position inside `window`.
    fn realized(&self, window: &DateWindow) -> Vec<Movement<'_>> {
        let ledger = self
            .ledger
            .iter()
            .filter(|e| window.contains(e.date))
            .map(|e| Movement {
                date: e.date,
                value: e.value,
                direction: e.direction,
                group_id: e.group_id,
                subgroup_id: e.subgroup_id,
                category: e.category.as_deref().unwrap_or(UNCATEGORIZED),
            });

        let contracts = self
            .contracts
            .iter()
            .filter(|c| c.status == ContractStatus::Concluido && window.contains(c.event_date))
            .map(|c| Movement {
                date: c.event_date,
                value: c.total_value(),
                direction: Direction::Entrada,
                group_id: None,
                subgroup_id: None,
                category: "Contratos",
            });

        ledger
            .chain(contracts)
            .chain(settled_movements(&self.receivables, *window, Direction::Entrada, "Recebimentos"))
            .chain(settled_movements(&self.payables, *window, Direction::Saida, "Pagamentos"))
            .collect()
    }

    pub fn income_statement(&self, window: &DateWindow) -> IncomeStatement {
        let mut revenues = Decimal::ZERO;
        let mut expenses = Decimal::ZERO;
        let mut buckets: [BTreeMap<String, Decimal>; 6] = Default::default();

        for movement in self.realized(window) {
            let offset = match movement.direction {
                Direction::Entrada => {
                    revenues += movement.value;
                    0
                }
                Direction::Saida => {
                    expenses += movement.value;
                    1
                }
            };
            match movement.group_id {
                Some(group) => {
                    *buckets[offset].entry(self.group_name(group)).or_default() += movement.value;
                    if let Some(sub) = movement.subgroup_id {
                        *buckets[2 + offset].entry(self.subgroup_name(sub)).or_default() +=
                            movement.value;
                    }
                }
                None => {
                    *buckets[4 + offset]
                        .entry(movement.category.to_string())
                        .or_default() += movement.value;
                }
            }
        }

        let [rg, eg, rs, es, rc, ec] = buckets.map(ranked);
        let net = revenues - expenses;
        IncomeStatement {
            revenues,
            expenses,
            net,
            margin_pct: percent(net, revenues),
            revenues_by_group: rg,
            expenses_by_group: eg,
            revenues_by_subgroup: rs,
            expenses_by_subgroup: es,
            revenues_by_category: rc,
            expenses_by_category: ec,
        }
    }

    pub fn cash_flow(&self, window: &DateWindow, group: Option<GroupId>) -> CashFlow {
        let movements: Vec<Movement<'_>> = self
            .realized(window)
            .into_iter()
            .filter(|m| group.is_none() || m.group_id == group)
            .collect();

        let per_month = monthly(
            window,
            movements.iter().map(|m| (m.date, m.direction, m.value)),
        );
        let final_balance = per_month.last().map(|m| m.running).unwrap_or_default();

        let per_group = group.is_none().then(|| {
            let mut by_group: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
            for m in &movements {
                let name = m
                    .group_id
                    .map(|g| self.group_name(g))
                    .unwrap_or_else(|| UNGROUPED.to_string());
                accumulate(by_group.entry(name).or_default(), m.direction, m.value);
            }
            flow_buckets(by_group)
        });

        CashFlow {
            per_month,
            final_balance,
            per_group,
        }
    }

    /// Forward cash position from open titles due inside `window`, starting
    /// from zero.
    pub fn cash_flow_projection(&self, window: &DateWindow) -> Projection {
        let open = |titles: &[Title], direction: Direction| {
            titles
                .iter()
                .filter(|t| !t.settled && window.contains(t.due_date))
                .map(move |t| (t.due_date, direction, t.value))
                .collect::<Vec<_>>()
        };
        let per_month = monthly(
            window,
            open(&self.receivables, Direction::Entrada)
                .into_iter()
                .chain(open(&self.payables, Direction::Saida)),
        );

        // A month is a deficit when it closes negative and its own movement
        // pushed the balance down.
        let deficits = per_month
            .iter()
            .filter(|m| m.running < Decimal::ZERO && m.net < Decimal::ZERO)
            .map(|m| Deficit {
                month: m.month.clone(),
                balance: m.running,
            })
            .collect();

        Projection {
            final_balance: per_month.last().map(|m| m.running).unwrap_or_default(),
            per_month,
            deficits,
        }
    }

    /// Revenue per calendar month across every year with data.
    pub fn seasonality(&self) -> Seasonality {
        let all_time = DateWindow {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
        };
        let mut by_year: BTreeMap<i32, BTreeMap<u32, Decimal>> = BTreeMap::new();
        for m in self
            .realized(&all_time)
            .into_iter()
            .filter(|m| m.direction == Direction::Entrada)
        {
            *by_year
                .entry(m.date.year())
                .or_default()
                .entry(m.date.month())
                .or_default() += m.value;
        }

        // A year without revenue in a month does not count as a zero for it.
        let month_average = if by_year.is_empty() {
            Vec::new()
        } else {
            (1..=12)
                .map(|month| {
                    let values: Vec<Decimal> = by_year
                        .values()
                        .filter_map(|months| months.get(&month))
                        .copied()
                        .collect();
                    let avg = if values.is_empty() {
                        Decimal::ZERO
                    } else {
                        let sum: Decimal = values.iter().sum();
                        (sum / Decimal::from(values.len())).round_dp(2)
                    };
                    MonthAverage { month, avg }
                })
                .collect()
        };

        Seasonality {
            by_year,
            month_average,
        }
    }

    pub fn kpis(&self, window: &DateWindow) -> Kpis {
        let pending = |titles: &[Title]| -> Decimal {
            titles
                .iter()
                .filter(|t| !t.settled && window.contains(t.due_date))
                .map(|t| t.value)
                .sum()
        };
        let active: Vec<&Contract> = self
            .contracts
            .iter()
            .filter(|c| c.status.is_active())
            .collect();
        Kpis {
            income: self.income_statement(window),
            pending_payables: pending(&self.payables),
            pending_receivables: pending(&self.receivables),
            active_contracts: active.len(),
            active_contracts_value: active.iter().map(|c| c.total_value()).sum(),
        }
    }

    pub fn bank_view(&self, window: &DateWindow, filter: &LedgerFilter) -> BankView {
        let entries: Vec<&LedgerEntry> = self
            .ledger
            .iter()
            .filter(|e| {
                e.source == EntrySource::BankStatement && window.contains(e.date) && filter.matches(e)
            })
            .collect();

        let mut per_bank: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
        for e in &entries {
            let bank = e.bank_name.clone().unwrap_or_else(|| UNKNOWN_BANK.to_string());
            accumulate(per_bank.entry(bank).or_default(), e.direction, e.value);
        }

        let mut rows: Vec<LedgerRow> = entries.iter().map(|e| self.row(e)).collect();
        rows.sort_by(|a, b| b.entry.date.cmp(&a.entry.date));

        BankView {
            per_bank: flow_buckets(per_bank),
            per_month: monthly(window, entries.iter().map(|e| (e.date, e.direction, e.value))),
            rows,
        }
    }

    /// Running balance per bank account of every ledger entry up to `end`,
    /// keyed by bank and account. Entries with neither a bank nor an account
    /// are not part of any balance.
    pub fn bank_balances(&self, end: NaiveDate) -> Vec<BankBalance> {
        let mut balances: BTreeMap<(String, Option<String>), Decimal> = BTreeMap::new();
        for e in self.ledger.iter().filter(|e| e.date <= end) {
            let Some(bank) = e.bank_name.as_ref().or(e.account.as_ref()) else {
                continue;
            };
            let signed = match e.direction {
                Direction::Entrada => e.value,
                Direction::Saida => -e.value,
            };
            *balances
                .entry((bank.clone(), e.account.clone()))
                .or_default() += signed;
        }
        balances
            .into_iter()
            .map(|((bank, account), balance)| BankBalance {
                bank,
                account,
                balance,
            })
            .collect()
    }

    /// Contracts whose event falls inside the window.
    pub fn contracts_view(&self, window: &DateWindow) -> ContractsView {
        summarize_contracts(
            self.contracts
                .iter()
                .filter(|c| window.contains(c.event_date))
                .cloned()
                .collect(),
        )
    }

    pub fn active_contracts(&self) -> ContractsView {
        summarize_contracts(
            self.contracts
                .iter()
                .filter(|c| c.status.is_active())
                .cloned()
                .collect(),
        )
    }

    /// Receivables and payables due inside the window.
    pub fn titles_view(&self, window: &DateWindow) -> TitlesView {
        TitlesView {
            receivables: title_table(&self.receivables, |t| window.contains(t.due_date)),
            payables: title_table(&self.payables, |t| window.contains(t.due_date)),
        }
    }

    /// Entries and exits of the window per group and subgroup.
    pub fn breakdown(&self, window: &DateWindow) -> Vec<GroupBreakdown> {
        let mut map: BTreeMap<(String, Option<String>), (Decimal, Decimal)> = BTreeMap::new();
        for m in self.realized(window) {
            let Some(group) = m.group_id else { continue };
            let key = (
                self.group_name(group),
                m.subgroup_id.map(|s| self.subgroup_name(s)),
            );
            accumulate(map.entry(key).or_default(), m.direction, m.value);
        }
        map.into_iter()
            .map(|((group, subgroup), (inflow, outflow))| GroupBreakdown {
                group,
                subgroup,
                inflow,
                outflow,
            })
            .collect()
    }

    pub fn management_snapshot(&self, window: &DateWindow, horizon_months: u32) -> ManagementSnapshot {
        let prior_window = window.previous();
        let projection_window = DateWindow {
            start: shift_month_start(window.end, 1),
            end: month_end(shift_month_start(window.end, horizon_months.max(1) as i32)),
        };
        let end = window.end;

        ManagementSnapshot {
            window: *window,
            prior_window,
            income: self.income_statement(window),
            prior_income: self.income_statement(&prior_window),
            ytd_income: self.income_statement(&window.year_to_date()),
            cash_flow: self.cash_flow(window, None),
            projection: self.cash_flow_projection(&projection_window),
            projection_window,
            bank_balances: self.bank_balances(end),
            investments: self
                .investments
                .iter()
                .filter(|i| i.as_of <= end)
                .cloned()
                .collect(),
            receivables_pending: title_table(&self.receivables, |t| !t.settled && t.due_date <= end),
            receivables_future: title_table(&self.receivables, |t| !t.settled && t.due_date > end),
            payables_pending: title_table(&self.payables, |t| !t.settled && t.due_date <= end),
            payables_future: title_table(&self.payables, |t| !t.settled && t.due_date > end),
            breakdown: self.breakdown(window),
            active_contracts: self.active_contracts(),
        }
    }
}

fn settled_movements<'a>(
    titles: &'a [Title],
    window: DateWindow,
    direction: Direction,
    category: &'static str,
) -> impl Iterator<Item = Movement<'a>> {
    titles
        .iter()
        .filter(move |t| t.settled && window.contains(t.effective_date()))
        .map(move |t| Movement {
            date: t.effective_date(),
            value: t.value,
            direction,
            group_id: t.group_id,
            subgroup_id: t.group_id.and(t.subgroup_id),
            category,
        })
}

fn accumulate(slot: &mut (Decimal, Decimal), direction: Direction, value: Decimal) {
    match direction {
        Direction::Entrada => slot.0 += value,
        Direction::Saida => slot.1 += value,
    }
}

fn flow_buckets(map: BTreeMap<String, (Decimal, Decimal)>) -> Vec<FlowBucket> {
    map.into_iter()
        .map(|(name, (inflow, outflow))| FlowBucket {
            name,
            inflow,
            outflow,
            net: inflow - outflow,
        })
        .collect()
}

/// Largest first; ties by name.
fn ranked(map: BTreeMap<String, Decimal>) -> Vec<BucketTotal> {
    let mut buckets: Vec<BucketTotal> = map
        .into_iter()
        .map(|(name, total)| BucketTotal { name, total })
        .collect();
    buckets.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    buckets
}

/// Contiguous months of the window with a left-to-right running balance.
fn monthly(
    window: &DateWindow,
    movements: impl IntoIterator<Item = (NaiveDate, Direction, Decimal)>,
) -> Vec<MonthFlow> {
    let mut per_month: BTreeMap<String, (Decimal, Decimal)> = window
        .months()
        .into_iter()
        .map(|key| (key, (Decimal::ZERO, Decimal::ZERO)))
        .collect();
    for (date, direction, value) in movements {
        accumulate(per_month.entry(month_key(date)).or_default(), direction, value);
    }

    let mut running = Decimal::ZERO;
    per_month
        .into_iter()
        .map(|(month, (inflow, outflow))| {
            let net = inflow - outflow;
            running += net;
            MonthFlow {
                month,
                inflow,
                outflow,
                net,
                running,
            }
        })
        .collect()
}

fn title_table(titles: &[Title], keep: impl Fn(&Title) -> bool) -> TitleTable {
    let rows: Vec<Title> = titles.iter().filter(|t| keep(t)).cloned().collect();
    let settled: Decimal = rows.iter().filter(|t| t.settled).map(|t| t.value).sum();
    let total: Decimal = rows.iter().map(|t| t.value).sum();
    TitleTable {
        count: rows.len(),
        pending: total - settled,
        settled,
        total,
        rows,
    }
}

fn summarize_contracts(mut rows: Vec<Contract>) -> ContractsView {
    rows.sort_by(|a, b| a.event_date.cmp(&b.event_date));
    let mut by_status: BTreeMap<ContractStatus, (usize, Decimal)> = BTreeMap::new();
    for c in &rows {
        let slot = by_status.entry(c.status).or_default();
        slot.0 += 1;
        slot.1 += c.total_value();
    }
    ContractsView {
        count: rows.len(),
        total_value: rows.iter().map(|c| c.total_value()).sum(),
        by_status: by_status
            .into_iter()
            .map(|(status, (count, total))| StatusTotal {
                status,
                count,
                total,
            })
            .collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn window(start: NaiveDate, end: NaiveDate) -> DateWindow {
        DateWindow::new(start, end).unwrap()
    }

    fn entry(date: NaiveDate, value: Decimal, direction: Direction) -> LedgerEntry {
        LedgerEntry::new(date, "lançamento", value, direction)
    }

    fn classified() -> TenantData {
        TenantData {
            groups: vec![
                Group { id: 1, name: "Receitas".into() },
                Group { id: 2, name: "Operacional".into() },
            ],
            ledger: vec![
                entry(d(2024, 10, 2), dec!(1000), Direction::Entrada).with_group(1),
                entry(d(2024, 10, 3), dec!(200), Direction::Entrada).with_category("Outros"),
                entry(d(2024, 10, 4), dec!(300), Direction::Saida).with_group(2),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_income_statement_category_is_fallback_only() {
        let data = classified();
        let dre = data.income_statement(&window(d(2024, 10, 1), d(2024, 10, 31)));
        assert_eq!(dre.revenues, dec!(1200));
        assert_eq!(dre.expenses, dec!(300));
        assert_eq!(dre.net, dec!(900));
        assert_eq!(dre.margin_pct, dec!(75));
        assert_eq!(
            dre.revenues_by_group,
            vec![BucketTotal { name: "Receitas".into(), total: dec!(1000) }]
        );
        assert_eq!(
            dre.revenues_by_category,
            vec![BucketTotal { name: "Outros".into(), total: dec!(200) }]
        );
        let bucketed: Decimal = dre
            .revenues_by_group
            .iter()
            .chain(&dre.revenues_by_category)
            .map(|b| b.total)
            .sum();
        assert_eq!(bucketed, dre.revenues);
    }

    #[test]
    fn test_income_statement_includes_contracts_and_settled_titles() {
        let data = TenantData {
            contracts: vec![
                Contract {
                    counterparty: "Evento".into(),
                    contract_start: d(2024, 1, 1),
                    event_date: d(2024, 10, 20),
                    service_value: dec!(500),
                    displacement_value: dec!(50),
                    status: ContractStatus::Concluido,
                },
                Contract {
                    counterparty: "Futuro".into(),
                    contract_start: d(2024, 1, 1),
                    event_date: d(2024, 10, 21),
                    service_value: dec!(999),
                    displacement_value: dec!(0),
                    status: ContractStatus::Pendente,
                },
            ],
            receivables: vec![
                Title::new("Cliente", d(2024, 10, 10), dec!(100)).settled_on(d(2024, 10, 11)),
                Title::new("Aberto", d(2024, 10, 10), dec!(700)),
            ],
            payables: vec![Title::new("Fornecedor", d(2024, 9, 30), dec!(80)).settled_on(d(2024, 10, 2))],
            ..Default::default()
        };
        let dre = data.income_statement(&window(d(2024, 10, 1), d(2024, 10, 31)));
        assert_eq!(dre.revenues, dec!(650));
        assert_eq!(dre.expenses, dec!(80));
        let names: Vec<&str> = dre.revenues_by_category.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Contratos", "Recebimentos"]);
    }

    #[test]
    fn test_empty_tenant_yields_zeroes() {
        let data = TenantData::default();
        let w = window(d(2024, 1, 1), d(2024, 1, 1));
        let dre = data.income_statement(&w);
        assert_eq!(dre.margin_pct, Decimal::ZERO);
        assert_eq!(dre.net, Decimal::ZERO);
        assert_eq!(data.aggregate_ledger(&w, &LedgerFilter::default()).count, 0);
        let flow = data.cash_flow(&w, None);
        assert_eq!(flow.per_month.len(), 1);
        assert_eq!(flow.final_balance, Decimal::ZERO);
        assert!(data.seasonality().month_average.is_empty());
    }

    #[test]
    fn test_cash_flow_running_balance() {
        let data = TenantData {
            ledger: vec![
                entry(d(2024, 1, 5), dec!(100), Direction::Entrada),
                entry(d(2024, 2, 5), dec!(40), Direction::Saida),
                entry(d(2024, 3, 5), dec!(50), Direction::Entrada),
                entry(d(2024, 3, 6), dec!(30), Direction::Saida),
            ],
            ..Default::default()
        };
        let flow = data.cash_flow(&window(d(2024, 1, 1), d(2024, 3, 31)), None);
        let months: Vec<&str> = flow.per_month.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        let running: Vec<Decimal> = flow.per_month.iter().map(|m| m.running).collect();
        assert_eq!(running, vec![dec!(100), dec!(60), dec!(80)]);
        assert_eq!(flow.final_balance, dec!(80));
        let groups = flow.per_group.unwrap();
        assert_eq!(groups[0].name, UNGROUPED);
        assert_eq!(groups[0].net, dec!(80));
    }

    #[test]
    fn test_cash_flow_group_filter_omits_per_group() {
        let data = classified();
        let flow = data.cash_flow(&window(d(2024, 10, 1), d(2024, 10, 31)), Some(2));
        assert!(flow.per_group.is_none());
        assert_eq!(flow.final_balance, dec!(-300));
    }

    #[test]
    fn test_projection_flags_deficit_month() {
        let data = TenantData {
            payables: vec![Title::new("Fornecedor", d(2024, 12, 10), dec!(500))],
            receivables: vec![Title::new("Pago", d(2024, 12, 1), dec!(900)).settled_on(d(2024, 11, 30))],
            ..Default::default()
        };
        let projection = data.cash_flow_projection(&window(d(2024, 12, 1), d(2025, 2, 28)));
        assert_eq!(projection.per_month.len(), 3);
        assert_eq!(projection.per_month[0].net, dec!(-500));
        assert_eq!(
            projection.deficits,
            vec![Deficit { month: "2024-12".into(), balance: dec!(-500) }]
        );
        assert_eq!(projection.final_balance, dec!(-500));
    }

    #[test]
    fn test_seasonality_averages_over_years_with_data() {
        let data = TenantData {
            ledger: vec![
                entry(d(2023, 1, 5), dec!(100), Direction::Entrada),
                entry(d(2024, 1, 5), dec!(300), Direction::Entrada),
                entry(d(2024, 2, 5), dec!(50), Direction::Entrada),
                entry(d(2024, 2, 6), dec!(999), Direction::Saida),
            ],
            ..Default::default()
        };
        let season = data.seasonality();
        assert_eq!(season.by_year.len(), 2);
        assert_eq!(season.by_year[&2024][&2], dec!(50));
        assert_eq!(season.month_average[0].avg, dec!(200));
        assert_eq!(season.month_average[1].avg, dec!(50));
        assert_eq!(season.month_average[2].avg, dec!(0));
        assert_eq!(season.month_average.len(), 12);
    }

    #[test]
    fn test_ledger_listing_filters_and_order() {
        let data = classified();
        let w = window(d(2024, 10, 1), d(2024, 10, 31));
        let rows = data.list_ledger(&w, &LedgerFilter::default());
        assert_eq!(rows[0].entry.date, d(2024, 10, 4));
        assert_eq!(rows[0].group.as_deref(), Some("Operacional"));

        let only_in = LedgerFilter {
            direction: Some(Direction::Entrada),
            ..Default::default()
        };
        let totals = data.aggregate_ledger(&w, &only_in);
        assert_eq!((totals.total_in, totals.total_out, totals.count), (dec!(1200), dec!(0), 2));

        let by_category = LedgerFilter {
            category: Some("outr".into()),
            ..Default::default()
        };
        assert_eq!(data.list_ledger(&w, &by_category).len(), 1);
    }

    #[test]
    fn test_single_day_window_is_inclusive() {
        let data = classified();
        let totals = data.aggregate_ledger(&DateWindow::single_day(d(2024, 10, 3)), &LedgerFilter::default());
        assert_eq!(totals.count, 1);
        assert_eq!(totals.balance, dec!(200));
    }

    #[test]
    fn test_bank_view_and_balances() {
        let data = TenantData {
            ledger: vec![
                entry(d(2024, 10, 1), dec!(100), Direction::Entrada).from_bank("Itaú"),
                entry(d(2024, 10, 2), dec!(30), Direction::Saida).from_bank("Itaú"),
                LedgerEntry {
                    source: EntrySource::BankStatement,
                    ..entry(d(2024, 10, 3), dec!(10), Direction::Entrada)
                },
                entry(d(2024, 10, 4), dec!(999), Direction::Entrada),
            ],
            ..Default::default()
        };
        let view = data.bank_view(&window(d(2024, 10, 1), d(2024, 10, 31)), &LedgerFilter::default());
        assert_eq!(view.rows.len(), 3);
        let names: Vec<&str> = view.per_bank.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec![UNKNOWN_BANK, "Itaú"]);

        let balances = data.bank_balances(d(2024, 10, 31));
        assert_eq!(
            balances,
            vec![BankBalance { bank: "Itaú".into(), account: None, balance: dec!(70) }]
        );
    }

    #[test]
    fn test_bank_balances_split_accounts_at_one_bank() {
        let data = TenantData {
            ledger: vec![
                entry(d(2024, 10, 1), dec!(100), Direction::Entrada)
                    .from_bank("Itau")
                    .with_account("0001"),
                entry(d(2024, 10, 2), dec!(40), Direction::Entrada)
                    .from_bank("Itau")
                    .with_account("0002"),
                entry(d(2024, 10, 3), dec!(15), Direction::Saida).with_account("0003"),
            ],
            ..Default::default()
        };
        let balances = data.bank_balances(d(2024, 10, 31));
        assert_eq!(balances.len(), 3);
        assert_eq!(balances[0].account.as_deref(), Some("0003"));
        assert_eq!(balances[0].balance, dec!(-15));
        assert_eq!(
            balances[1],
            BankBalance { bank: "Itau".into(), account: Some("0001".into()), balance: dec!(100) }
        );
        assert_eq!(
            balances[2],
            BankBalance { bank: "Itau".into(), account: Some("0002".into()), balance: dec!(40) }
        );
    }

    #[test]
    fn test_titles_view_subtotals() {
        let data = TenantData {
            receivables: vec![
                Title::new("A", d(2024, 10, 5), dec!(100)).settled_on(d(2024, 10, 5)),
                Title::new("B", d(2024, 10, 6), dec!(50)),
                Title::new("C", d(2024, 11, 6), dec!(70)),
            ],
            ..Default::default()
        };
        let view = data.titles_view(&window(d(2024, 10, 1), d(2024, 10, 31)));
        assert_eq!(view.receivables.count, 2);
        assert_eq!(view.receivables.total, dec!(150));
        assert_eq!(view.receivables.settled, dec!(100));
        assert_eq!(view.receivables.pending, dec!(50));
        assert_eq!(view.payables.count, 0);
    }

    #[test]
    fn test_name_lookup_is_accent_insensitive() {
        let data = TenantData {
            groups: vec![Group { id: 3, name: "Manutenção".into() }],
            subgroups: vec![Subgroup { id: 9, group_id: 3, name: "Veículos".into() }],
            ..Default::default()
        };
        assert_eq!(data.find_group("manutencao").map(|g| g.id), Some(3));
        assert_eq!(data.find_subgroup("VEICULO", Some(3)).map(|s| s.id), Some(9));
        assert!(data.find_subgroup("veiculo", Some(4)).is_none());
        assert!(data.find_group("").is_none());
    }
}
