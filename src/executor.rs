use crate::error::{AssistantError, Result};
use crate::gateway::{
    BankView, CashFlow, ContractsView, DataGateway, IncomeStatement, Kpis, LedgerFilter,
    LedgerRow, LedgerTotals, Projection, Seasonality, TenantData, TitlesView,
};
use crate::plan::{Baseline, DataType, Intent, Plan, ResolvedPeriod};
use crate::report::{ManagementData, ReportGenerator};
use crate::schema::{DateWindow, GroupId, SubgroupId};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerResult {
    #[serde(flatten)]
    pub totals: LedgerTotals,
    pub rows: Vec<LedgerRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup_id: Option<SubgroupId>,
}

/// The typed payload of a result, tagged by `type` with its body in `data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ResultData {
    Transacoes(LedgerResult),
    Contratos(ContractsView),
    Contas(TitlesView),
    Dre(IncomeStatement),
    Dfc(CashFlow),
    Projecao(Projection),
    Sazonalidade(Seasonality),
    Kpis(Kpis),
    Extratos(BankView),
    RelatorioGerencial(Box<ManagementData>),
}

impl ResultData {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Transacoes(_) => "transacoes",
            Self::Contratos(_) => "contratos",
            Self::Contas(_) => "contas",
            Self::Dre(_) => "dre",
            Self::Dfc(_) => "dfc",
            Self::Projecao(_) => "projecao",
            Self::Sazonalidade(_) => "sazonalidade",
            Self::Kpis(_) => "kpis",
            Self::Extratos(_) => "extratos",
            Self::RelatorioGerencial(_) => "relatorio_gerencial",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Transacoes(_) => "Transações",
            Self::Contratos(_) => "Contratos",
            Self::Contas(_) => "Contas a receber e a pagar",
            Self::Dre(_) => "Demonstração de resultado (DRE)",
            Self::Dfc(_) => "Fluxo de caixa (DFC)",
            Self::Projecao(_) => "Projeção de caixa",
            Self::Sazonalidade(_) => "Sazonalidade da receita",
            Self::Kpis(_) => "Indicadores",
            Self::Extratos(_) => "Extratos bancários",
            Self::RelatorioGerencial(_) => "Apuração financeira",
        }
    }

    /// True when the aggregate carries nothing but zeroes.
    pub fn is_empty(&self) -> bool {
        let flat = |months: &[crate::gateway::MonthFlow]| {
            months
                .iter()
                .all(|m| m.inflow.is_zero() && m.outflow.is_zero())
        };
        match self {
            Self::Transacoes(r) => r.rows.is_empty(),
            Self::Contratos(c) => c.count == 0,
            Self::Contas(t) => t.receivables.count == 0 && t.payables.count == 0,
            Self::Dre(i) => i.revenues.is_zero() && i.expenses.is_zero(),
            Self::Dfc(c) => flat(&c.per_month),
            Self::Projecao(p) => flat(&p.per_month),
            Self::Sazonalidade(s) => s.by_year.is_empty(),
            Self::Kpis(k) => {
                k.income.revenues.is_zero()
                    && k.income.expenses.is_zero()
                    && k.pending_payables.is_zero()
                    && k.pending_receivables.is_zero()
                    && k.active_contracts == 0
            }
            Self::Extratos(b) => b.rows.is_empty(),
            Self::RelatorioGerencial(m) => {
                let s = &m.snapshot;
                s.income.revenues.is_zero()
                    && s.income.expenses.is_zero()
                    && s.bank_balances.is_empty()
                    && s.investments.is_empty()
                    && s.receivables_pending.count == 0
                    && s.payables_pending.count == 0
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultBundle {
    #[serde(flatten)]
    pub result: ResultData,
    pub period: ResolvedPeriod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_baseline: Option<Baseline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ResultData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ResultBundle {
    pub fn new(result: ResultData, period: ResolvedPeriod) -> Self {
        Self {
            result,
            period,
            comparison_baseline: None,
            comparison: None,
            notes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

/// Runs a [`Plan`] against the gateway. Deterministic for a fixed gateway
/// snapshot and plan.
pub struct QueryExecutor<'g> {
    gateway: &'g dyn DataGateway,
    horizon_months: u32,
}

impl<'g> QueryExecutor<'g> {
    pub fn new(gateway: &'g dyn DataGateway) -> Self {
        Self {
            gateway,
            horizon_months: 3,
        }
    }

    pub fn with_horizon(mut self, months: u32) -> Self {
        self.horizon_months = months;
        self
    }

    pub fn execute(&self, tenant: &str, plan: &Plan) -> Result<ResultBundle> {
        if plan.intent == Intent::Error {
            plan.clone().into_result()?;
            return Err(AssistantError::format("Cannot execute an error plan"));
        }
        let window = plan.window();
        window.validate()?;
        info!(
            "Executing {:?}/{:?} for tenant {} over {}..{}",
            plan.intent, plan.data_type, tenant, window.start, window.end
        );

        if plan.is_management_report() {
            let data = ReportGenerator::new(self.gateway)
                .with_horizon(self.horizon_months)
                .collect(tenant, &window)?;
            return Ok(ResultBundle::new(
                ResultData::RelatorioGerencial(Box::new(data)),
                plan.period,
            ));
        }

        let (filter, notes) = self.resolve_filters(tenant, plan)?;
        let result = self.run(tenant, plan.data_type, &window, &filter)?;
        let mut bundle = ResultBundle::new(result, plan.period);
        bundle.notes = notes;

        if plan.wants_comparison() && supports_comparison(plan.data_type) {
            let baseline = plan.comparison.baseline;
            let baseline_window = baseline.window_for(&window);
            info!(
                "Comparing against {:?} window {}..{}",
                baseline, baseline_window.start, baseline_window.end
            );
            bundle.comparison = Some(self.run(tenant, plan.data_type, &baseline_window, &filter)?);
            bundle.comparison_baseline = Some(baseline);
        }
        Ok(bundle)
    }

    fn run(
        &self,
        tenant: &str,
        data_type: DataType,
        window: &DateWindow,
        filter: &LedgerFilter,
    ) -> Result<ResultData> {
        let g = self.gateway;
        Ok(match data_type {
            DataType::Transacoes => ResultData::Transacoes(LedgerResult {
                totals: g.aggregate_ledger(tenant, window, filter)?,
                rows: g.list_ledger(tenant, window, filter)?,
                group_id: filter.group_id,
                subgroup_id: filter.subgroup_id,
            }),
            DataType::Contratos => ResultData::Contratos(g.contracts_view(tenant, window)?),
            DataType::Contas => ResultData::Contas(g.titles_view(tenant, window)?),
            DataType::Dre => ResultData::Dre(g.income_statement(tenant, window)?),
            DataType::Dfc => ResultData::Dfc(g.cash_flow(tenant, window, filter.group_id)?),
            DataType::Projecao => ResultData::Projecao(g.cash_flow_projection(tenant, window)?),
            DataType::Sazonalidade => ResultData::Sazonalidade(g.seasonality(tenant)?),
            DataType::Kpis => ResultData::Kpis(g.kpis(tenant, window)?),
            DataType::Extratos => ResultData::Extratos(g.bank_view(tenant, window, filter)?),
            DataType::RelatorioGerencial => {
                let data = ReportGenerator::new(g)
                    .with_horizon(self.horizon_months)
                    .collect(tenant, window)?;
                ResultData::RelatorioGerencial(Box::new(data))
            }
        })
    }

    /// Group and subgroup names become ids by accent- and case-insensitive
    /// substring match; a name that matches nothing is dropped.
    pub fn resolve_filters(&self, tenant: &str, plan: &Plan) -> Result<(LedgerFilter, Vec<String>)> {
        let wanted = &plan.filters;
        let mut notes = Vec::new();
        let mut filter = LedgerFilter {
            category: wanted.category.clone(),
            direction: wanted.direction,
            ..Default::default()
        };
        if wanted.group.is_none() && wanted.subgroup.is_none() {
            return Ok((filter, notes));
        }

        let tree = TenantData {
            groups: self.gateway.groups(tenant)?,
            subgroups: self.gateway.subgroups(tenant)?,
            ..Default::default()
        };

        if let Some(name) = &wanted.group {
            match tree.find_group(name) {
                Some(group) => filter.group_id = Some(group.id),
                None => {
                    warn!("Group filter '{}' matches no group; ignoring it", name);
                    notes.push(format!("Grupo '{}' não encontrado; filtro ignorado", name));
                }
            }
        }
        if let Some(name) = &wanted.subgroup {
            match tree.find_subgroup(name, filter.group_id) {
                Some(sub) => {
                    filter.subgroup_id = Some(sub.id);
                    filter.group_id = Some(sub.group_id);
                }
                None => {
                    warn!("Subgroup filter '{}' matches no subgroup; ignoring it", name);
                    notes.push(format!("Subgrupo '{}' não encontrado; filtro ignorado", name));
                }
            }
        }
        Ok((filter, notes))
    }
}

fn supports_comparison(data_type: DataType) -> bool {
    !matches!(
        data_type,
        DataType::Sazonalidade | DataType::RelatorioGerencial
    )
}

/// Percentage change between two magnitudes; `None` when the baseline is zero.
pub fn variation_pct(current: Decimal, baseline: Decimal) -> Option<Decimal> {
    if baseline.is_zero() {
        None
    } else {
        Some(((current - baseline) / baseline * Decimal::ONE_HUNDRED).round_dp(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::InMemoryGateway;
    use crate::plan::{Comparison, OutputFormat, PeriodKind, PlanFilters};
    use crate::schema::{Direction, Group, LedgerEntry, Subgroup};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn gateway() -> InMemoryGateway {
        let data = TenantData {
            groups: vec![
                Group { id: 1, name: "Receitas".into() },
                Group { id: 2, name: "Despesas Operacionais".into() },
            ],
            subgroups: vec![Subgroup { id: 20, group_id: 2, name: "Aluguel".into() }],
            ledger: vec![
                LedgerEntry::new(d(2024, 10, 3), "A", dec!(100), Direction::Entrada).with_group(1),
                LedgerEntry::new(d(2024, 10, 5), "B", dec!(40), Direction::Saida).with_subgroup(2, 20),
                LedgerEntry::new(d(2024, 9, 5), "C", dec!(10), Direction::Saida).with_group(2),
            ],
            ..Default::default()
        };
        InMemoryGateway::new().with_tenant("acme", data).unwrap()
    }

    fn plan(data_type: DataType, filters: PlanFilters) -> Plan {
        Plan {
            intent: Intent::Consulta,
            data_type,
            period: ResolvedPeriod {
                start: d(2024, 10, 1),
                end: d(2024, 10, 31),
                kind: PeriodKind::MesEspecifico,
            },
            filters,
            output_format: OutputFormat::Resumo,
            comparison: Comparison::default(),
            error: None,
        }
    }

    #[test]
    fn test_transactions_bundle_shape() {
        let gateway = gateway();
        let bundle = QueryExecutor::new(&gateway)
            .execute("acme", &plan(DataType::Transacoes, PlanFilters::default()))
            .unwrap();
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["type"], "transacoes");
        assert_eq!(json["data"]["count"], 2);
        assert_eq!(json["data"]["saldo"].as_f64(), Some(60.0));
        assert_eq!(json["period"]["start"], "2024-10-01");
    }

    #[test]
    fn test_filter_names_resolve_to_ids() {
        let gateway = gateway();
        let filters = PlanFilters {
            subgroup: Some("aluguel".into()),
            ..Default::default()
        };
        let bundle = QueryExecutor::new(&gateway)
            .execute("acme", &plan(DataType::Transacoes, filters))
            .unwrap();
        match bundle.result {
            ResultData::Transacoes(r) => {
                assert_eq!(r.group_id, Some(2));
                assert_eq!(r.subgroup_id, Some(20));
                assert_eq!(r.totals.count, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_group_filter_is_dropped() {
        let gateway = gateway();
        let filters = PlanFilters {
            group: Some("Marketing".into()),
            ..Default::default()
        };
        let bundle = QueryExecutor::new(&gateway)
            .execute("acme", &plan(DataType::Transacoes, filters))
            .unwrap();
        assert_eq!(bundle.notes.len(), 1);
        match bundle.result {
            ResultData::Transacoes(r) => assert_eq!(r.totals.count, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_comparison_uses_baseline_window() {
        let gateway = gateway();
        let mut compared = plan(DataType::Dre, PlanFilters::default());
        compared.intent = Intent::Comparacao;
        let bundle = QueryExecutor::new(&gateway).execute("acme", &compared).unwrap();
        assert_eq!(bundle.comparison_baseline, Some(Baseline::PeriodoAnterior));
        match bundle.comparison {
            Some(ResultData::Dre(prior)) => assert_eq!(prior.expenses, dec!(10)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_execution_is_deterministic() {
        let gateway = gateway();
        let executor = QueryExecutor::new(&gateway);
        let p = plan(DataType::Dfc, PlanFilters::default());
        assert_eq!(executor.execute("acme", &p).unwrap(), executor.execute("acme", &p).unwrap());
    }

    #[test]
    fn test_error_plan_and_missing_tenant() {
        let gateway = gateway();
        let executor = QueryExecutor::new(&gateway);
        let failed = Plan::failed(
            &AssistantError::ProviderUnavailable("down".into()),
            plan(DataType::Transacoes, PlanFilters::default()).period,
        );
        assert_eq!(
            executor.execute("acme", &failed).unwrap_err().kind(),
            ErrorKind::ProviderUnavailable
        );
        let err = executor
            .execute("", &plan(DataType::Kpis, PlanFilters::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayInvalid);
    }

    #[test]
    fn test_empty_results_are_detected() {
        let gateway = InMemoryGateway::new();
        let executor = QueryExecutor::new(&gateway);
        for data_type in [DataType::Transacoes, DataType::Dre, DataType::Dfc, DataType::Kpis] {
            let bundle = executor
                .execute("vazio", &plan(data_type, PlanFilters::default()))
                .unwrap();
            assert!(bundle.is_empty(), "{:?} should be empty", data_type);
        }
    }

    #[test]
    fn test_variation_pct() {
        assert_eq!(variation_pct(dec!(10000), dec!(8000)), Some(dec!(25)));
        assert_eq!(variation_pct(dec!(1), dec!(0)), None);
    }
}
