//! Chart-ready data tables. Descriptors carry labels and numbers only; the
//! UI decides how to draw them.

use crate::executor::ResultData;
use crate::gateway::{BucketTotal, IncomeStatement, ManagementSnapshot, MonthFlow};
use crate::locale::month_label;
use crate::report::ManagementKpis;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    HorizontalBar,
    Donut,
    Combo,
    Line,
    Gauge,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
    pub id: String,
    pub kind: ChartKind,
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
}

impl ChartSeries {
    fn new(id: &str, kind: ChartKind, title: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            title: title.to_string(),
            labels: Vec::new(),
            series: Vec::new(),
        }
    }

    fn labels<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    fn series(mut self, name: &str, values: Vec<Decimal>) -> Self {
        self.series.push(Series {
            name: name.to_string(),
            values,
        });
        self
    }
}

fn monthly_combo(id: &str, title: &str, months: &[MonthFlow], line_name: &str) -> ChartSeries {
    ChartSeries::new(id, ChartKind::Combo, title)
        .labels(months.iter().map(|m| m.month.clone()))
        .series("Entradas", months.iter().map(|m| m.inflow).collect())
        .series("Saídas", months.iter().map(|m| m.outflow).collect())
        .series(line_name, months.iter().map(|m| m.running).collect())
}

fn top_buckets(id: &str, title: &str, buckets: Vec<&BucketTotal>) -> ChartSeries {
    let mut buckets = buckets;
    buckets.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    buckets.truncate(TOP_N);
    ChartSeries::new(id, ChartKind::HorizontalBar, title)
        .labels(buckets.iter().map(|b| b.name.clone()))
        .series("Valor", buckets.iter().map(|b| b.total).collect())
}

/// Group buckets plus the category fallback; the two never overlap.
fn classified<'a>(groups: &'a [BucketTotal], categories: &'a [BucketTotal]) -> Vec<&'a BucketTotal> {
    groups.iter().chain(categories).collect()
}

fn income_charts(income: &IncomeStatement) -> Vec<ChartSeries> {
    vec![
        ChartSeries::new("receitas_despesas", ChartKind::Donut, "Receitas x Despesas")
            .labels(["Receitas", "Despesas"])
            .series("Valor", vec![income.revenues, income.expenses]),
        top_buckets(
            "top_receitas",
            "Maiores receitas",
            classified(&income.revenues_by_group, &income.revenues_by_category),
        ),
        top_buckets(
            "top_despesas",
            "Maiores despesas",
            classified(&income.expenses_by_group, &income.expenses_by_category),
        ),
    ]
}

fn margin_gauge(margin: Decimal) -> ChartSeries {
    ChartSeries::new("margem", ChartKind::Gauge, "Margem operacional (%)")
        .labels(["Margem"])
        .series("Margem", vec![margin])
}

/// Descriptors for an ordinary query result.
pub fn for_result(result: &ResultData) -> Vec<ChartSeries> {
    match result {
        ResultData::Transacoes(r) => vec![ChartSeries::new(
            "entradas_saidas",
            ChartKind::Bar,
            "Entradas x Saídas",
        )
        .labels(["Entradas", "Saídas"])
        .series("Valor", vec![r.totals.total_in, r.totals.total_out])],
        ResultData::Contratos(c) => vec![ChartSeries::new(
            "contratos_status",
            ChartKind::Donut,
            "Contratos por status",
        )
        .labels(c.by_status.iter().map(|s| s.status.label()))
        .series("Valor", c.by_status.iter().map(|s| s.total).collect())],
        ResultData::Contas(t) => vec![ChartSeries::new(
            "contas",
            ChartKind::Bar,
            "Contas a receber x a pagar",
        )
        .labels(["A receber", "A pagar"])
        .series("Liquidado", vec![t.receivables.settled, t.payables.settled])
        .series("Pendente", vec![t.receivables.pending, t.payables.pending])],
        ResultData::Dre(income) => {
            let mut charts = income_charts(income);
            charts.push(margin_gauge(income.margin_pct));
            charts
        }
        ResultData::Dfc(flow) => vec![monthly_combo(
            "fluxo_caixa",
            "Fluxo de caixa mensal",
            &flow.per_month,
            "Saldo acumulado",
        )],
        ResultData::Projecao(p) => vec![monthly_combo(
            "projecao_caixa",
            "Projeção de caixa",
            &p.per_month,
            "Saldo projetado",
        )],
        ResultData::Sazonalidade(s) => {
            let chart = ChartSeries::new("sazonalidade", ChartKind::Line, "Receita por mês")
                .labels((1..=12u32).map(month_label));
            vec![s.by_year.iter().fold(chart, |chart, (year, months)| {
                chart.series(
                    &year.to_string(),
                    (1..=12u32)
                        .map(|m| months.get(&m).copied().unwrap_or_default())
                        .collect(),
                )
            })]
        }
        ResultData::Kpis(k) => vec![
            margin_gauge(k.income.margin_pct),
            ChartSeries::new("pendencias", ChartKind::Bar, "Pendências no período")
                .labels(["A receber", "A pagar"])
                .series("Valor", vec![k.pending_receivables, k.pending_payables]),
        ],
        ResultData::Extratos(b) => vec![ChartSeries::new(
            "extratos_bancos",
            ChartKind::Bar,
            "Movimentação por banco",
        )
        .labels(b.per_bank.iter().map(|f| f.name.clone()))
        .series("Entradas", b.per_bank.iter().map(|f| f.inflow).collect())
        .series("Saídas", b.per_bank.iter().map(|f| f.outflow).collect())],
        ResultData::RelatorioGerencial(m) => management(&m.snapshot, &m.kpis),
    }
}

/// The seven management-report descriptors.
pub fn management(snapshot: &ManagementSnapshot, kpis: &ManagementKpis) -> Vec<ChartSeries> {
    let mut charts = vec![ChartSeries::new(
        "disponivel_obrigacoes",
        ChartKind::Bar,
        "Disponível x Obrigações",
    )
    .labels(["Disponível", "Obrigações"])
    .series("Valor", vec![kpis.total_available, kpis.total_obligations])];
    charts.extend(income_charts(&snapshot.income));
    charts.push(monthly_combo(
        "fluxo_caixa",
        "Fluxo de caixa mensal",
        &snapshot.cash_flow.per_month,
        "Saldo acumulado",
    ));
    charts.push(monthly_combo(
        "projecao_caixa",
        "Projeção de caixa (3 meses)",
        &snapshot.projection.per_month,
        "Saldo projetado",
    ));
    charts.push(margin_gauge(kpis.operating_margin_pct));
    charts
}
