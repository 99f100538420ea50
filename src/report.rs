//! The "Apuração Financeira" management report.
//!
//! The generator collects a [`ManagementSnapshot`], computes the report's
//! indicators, and asks the model for the prose of each section as a JSON
//! object. The Markdown itself, section order included, is assembled here.
//! There is no templated substitute: without a model the report fails.

use crate::charts::{self, ChartSeries};
use crate::error::{AssistantError, ErrorKind, Result};
use crate::executor::variation_pct;
use crate::gateway::aggregates::percent;
use crate::gateway::{DataGateway, ManagementSnapshot};
use crate::json_repair::extract_json;
use crate::llm::prompts::REPORT_SYSTEM_PROMPT;
use crate::llm::{complete, CompletionOptions, LlmProvider};
use crate::locale::{fold, format_brl, format_date_br, format_percent};
use crate::schema::DateWindow;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const REPORT_TITLE: &str = "APURAÇÃO FINANCEIRA";
pub const MISSING_SECTION: &str = "_Seção não disponível nesta apuração._";

/// A narrative section: JSON key, header, and what the model should cover.
pub struct Section {
    pub key: &'static str,
    pub header: &'static str,
    pub guidance: &'static str,
}

/// Narrative sections in their mandated order, after the fixed header.
pub const SECTIONS: [Section; 8] = [
    Section {
        key: "diagnostico",
        header: "Diagnóstico",
        guidance: "visão geral da saúde financeira no período e os principais destaques",
    },
    Section {
        key: "disponiveis",
        header: "Disponíveis Financeiros",
        guidance: "saldos por banco, aplicações e o total disponível",
    },
    Section {
        key: "obrigacoes",
        header: "Obrigações",
        guidance: "contas a pagar pendentes e futuras, comparadas ao disponível",
    },
    Section {
        key: "resultados",
        header: "Resultados",
        guidance: "receitas e despesas por grupo e subgrupo, comparadas ao período anterior",
    },
    Section {
        key: "lucro_prejuizo",
        header: "Lucro / Prejuízo",
        guidance: "resultado do período, margem operacional, acumulado do ano e ponto de equilíbrio",
    },
    Section {
        key: "projecoes_faturamento",
        header: "Projeções de Faturamento",
        guidance: "recebíveis futuros e contratos ativos",
    },
    Section {
        key: "projecao_caixa",
        header: "Projeção de Caixa",
        guidance: "saldo projetado dos próximos meses e meses com déficit",
    },
    Section {
        key: "conclusoes",
        header: "Conclusões e Estratégias",
        guidance: "recomendações práticas, em ordem de prioridade",
    },
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManagementKpis {
    pub operating_margin_pct: Decimal,
    #[serde(default)]
    pub revenue_growth_pct: Option<Decimal>,
    pub cost_over_revenue_pct: Decimal,
    pub expense_over_revenue_pct: Decimal,
    pub year_accumulated_result: Decimal,
    pub break_even_revenue: Decimal,
    pub projected_next_month_balance: Decimal,
    pub total_available: Decimal,
    pub total_obligations: Decimal,
    pub costs: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagementData {
    pub snapshot: ManagementSnapshot,
    pub kpis: ManagementKpis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagementReport {
    pub report_markdown: String,
    pub snapshot: ManagementSnapshot,
    pub kpis: ManagementKpis,
    pub chart_series: Vec<ChartSeries>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_sections: Vec<String>,
}

pub fn compute_kpis(s: &ManagementSnapshot) -> ManagementKpis {
    let revenues = s.income.revenues;
    let expenses = s.income.expenses;
    let costs: Decimal = s
        .income
        .expenses_by_group
        .iter()
        .filter(|b| fold(&b.name).contains("custo"))
        .map(|b| b.total)
        .sum();

    let break_even = if revenues.is_zero() {
        expenses
    } else {
        let cost_ratio = costs / revenues;
        if cost_ratio >= Decimal::ONE {
            expenses
        } else {
            (expenses - costs) / (Decimal::ONE - cost_ratio)
        }
    };

    let bank_total: Decimal = s.bank_balances.iter().map(|b| b.balance).sum();
    let invested: Decimal = s.investments.iter().map(|i| i.balance).sum();
    let next_month_net = s
        .projection
        .per_month
        .first()
        .map(|m| m.net)
        .unwrap_or_default();

    ManagementKpis {
        operating_margin_pct: percent(s.income.net, revenues),
        revenue_growth_pct: variation_pct(revenues, s.prior_income.revenues),
        cost_over_revenue_pct: percent(costs, revenues),
        expense_over_revenue_pct: percent(expenses, revenues),
        year_accumulated_result: s.ytd_income.net.round_dp(2),
        break_even_revenue: break_even.round_dp(2),
        projected_next_month_balance: (bank_total + next_month_net).round_dp(2),
        total_available: (bank_total + invested).round_dp(2),
        total_obligations: (s.payables_pending.total + s.payables_future.total).round_dp(2),
        costs: costs.round_dp(2),
    }
}

pub struct ReportGenerator<'g> {
    gateway: &'g dyn DataGateway,
    options: CompletionOptions,
    horizon_months: u32,
}

impl<'g> ReportGenerator<'g> {
    pub fn new(gateway: &'g dyn DataGateway) -> Self {
        Self {
            gateway,
            options: CompletionOptions::report(),
            horizon_months: 3,
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_horizon(mut self, months: u32) -> Self {
        self.horizon_months = months;
        self
    }

    pub fn collect(&self, tenant: &str, window: &DateWindow) -> Result<ManagementData> {
        let snapshot = self
            .gateway
            .management_snapshot(tenant, window, self.horizon_months)?;
        let kpis = compute_kpis(&snapshot);
        Ok(ManagementData { snapshot, kpis })
    }

    pub async fn generate(
        &self,
        provider: Option<&dyn LlmProvider>,
        tenant: &str,
        window: &DateWindow,
    ) -> Result<ManagementReport> {
        let provider = provider.ok_or_else(|| {
            AssistantError::ReportUnavailable("No LLM provider is configured".to_string())
        })?;
        let data = self.collect(tenant, window)?;
        self.write(provider, tenant, data).await
    }

    /// Narrates already-collected data.
    pub async fn write(
        &self,
        provider: &dyn LlmProvider,
        tenant: &str,
        data: ManagementData,
    ) -> Result<ManagementReport> {
        info!(
            "Writing management report for {} over {}..{}",
            tenant, data.snapshot.window.start, data.snapshot.window.end
        );
        let raw = complete(
            provider,
            &system_prompt(),
            &build_prompt(tenant, &data),
            &self.options,
        )
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::ProviderUnavailable => AssistantError::ReportUnavailable(e.detail()),
            _ => e,
        })?;

        let sections = extract_json(&raw)?.value;
        if !sections.is_object() {
            return Err(AssistantError::format(
                "Report sections must be a JSON object",
            ));
        }
        let (report_markdown, missing_sections) = assemble(tenant, &data, &sections);
        if !missing_sections.is_empty() {
            warn!("Report is missing sections: {}", missing_sections.join(", "));
        }

        Ok(ManagementReport {
            report_markdown,
            chart_series: charts::management(&data.snapshot, &data.kpis),
            snapshot: data.snapshot,
            kpis: data.kpis,
            missing_sections,
        })
    }
}

pub fn system_prompt() -> String {
    let sections = SECTIONS
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {} (\"{}\"): {}", i + 1, s.header, s.key, s.guidance))
        .collect::<Vec<_>>()
        .join("\n");
    let keys = SECTIONS
        .iter()
        .map(|s| format!("\"{}\"", s.key))
        .collect::<Vec<_>>()
        .join(", ");
    REPORT_SYSTEM_PROMPT
        .replace("{sections}", &sections)
        .replace("{keys}", &keys)
}

/// The data blob sent with the report request, with the headline figures
/// pre-formatted in pt-BR.
pub fn build_prompt(tenant: &str, data: &ManagementData) -> String {
    let s = &data.snapshot;
    let k = &data.kpis;
    let formatted = json!({
        "receitas": format_brl(s.income.revenues),
        "despesas": format_brl(s.income.expenses),
        "resultado": format_brl(s.income.net),
        "receitas_periodo_anterior": format_brl(s.prior_income.revenues),
        "margem_operacional": format_percent(k.operating_margin_pct, false),
        "crescimento_receita": k.revenue_growth_pct.map(|g| format_percent(g, true)),
        "custos_sobre_receita": format_percent(k.cost_over_revenue_pct, false),
        "despesas_sobre_receita": format_percent(k.expense_over_revenue_pct, false),
        "resultado_acumulado_ano": format_brl(k.year_accumulated_result),
        "ponto_equilibrio": format_brl(k.break_even_revenue),
        "saldo_projetado_proximo_mes": format_brl(k.projected_next_month_balance),
        "total_disponivel": format_brl(k.total_available),
        "total_obrigacoes": format_brl(k.total_obligations),
    });
    let blob = json!({
        "empresa": tenant,
        "periodo": {
            "inicio": format_date_br(s.window.start),
            "fim": format_date_br(s.window.end),
        },
        "valores_formatados": formatted,
        "indicadores": k,
        "snapshot": s,
    });
    format!(
        "Redija a apuração financeira com base nos dados abaixo.\n\n{}",
        serde_json::to_string_pretty(&blob).unwrap_or_default()
    )
}

fn header(tenant: &str, data: &ManagementData) -> String {
    let s = &data.snapshot;
    let k = &data.kpis;
    let rows = [
        ("Receitas", format_brl(s.income.revenues)),
        ("Despesas", format_brl(s.income.expenses)),
        ("Resultado do período", format_brl(s.income.net)),
        ("Margem operacional", format_percent(k.operating_margin_pct, false)),
        (
            "Crescimento da receita",
            k.revenue_growth_pct
                .map(|g| format_percent(g, true))
                .unwrap_or_else(|| "n/d".to_string()),
        ),
        ("Custos sobre receita", format_percent(k.cost_over_revenue_pct, false)),
        ("Despesas sobre receita", format_percent(k.expense_over_revenue_pct, false)),
        ("Resultado acumulado no ano", format_brl(k.year_accumulated_result)),
        ("Ponto de equilíbrio", format_brl(k.break_even_revenue)),
        ("Saldo projetado para o próximo mês", format_brl(k.projected_next_month_balance)),
        ("Total disponível", format_brl(k.total_available)),
        ("Total de obrigações", format_brl(k.total_obligations)),
    ];
    let table = rows
        .iter()
        .map(|(label, value)| format!("| {} | {} |", label, value))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "# {}\n\n**Empresa:** {}  \n**Período:** {} a {}\n\n| Indicador | Valor |\n|---|---|\n{}\n",
        REPORT_TITLE,
        tenant,
        format_date_br(s.window.start),
        format_date_br(s.window.end),
        table
    )
}

fn section_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => format!("- {}", s),
                other => format!("- {}", other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => return None,
        other => other.to_string(),
    };
    // Headers are ours; drop any the model added.
    let body = text
        .lines()
        .skip_while(|line| line.trim_start().starts_with('#') || line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim().to_string();
    (!body.is_empty()).then_some(body)
}

/// Builds the final Markdown. Returns it with the keys of sections the model
/// left out.
pub fn assemble(tenant: &str, data: &ManagementData, sections: &Value) -> (String, Vec<String>) {
    let mut markdown = header(tenant, data);
    let mut missing = Vec::new();
    for (i, section) in SECTIONS.iter().enumerate() {
        let body = section_text(sections.get(section.key)).unwrap_or_else(|| {
            missing.push(section.key.to_string());
            MISSING_SECTION.to_string()
        });
        markdown.push_str(&format!("\n## {}. {}\n\n{}\n", i + 1, section.header, body));
    }
    (markdown, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{BankBalance, BucketTotal, TenantData};
    use crate::schema::{Direction, Group, Investment, LedgerEntry, Title};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn data() -> TenantData {
        TenantData {
            groups: vec![
                Group { id: 1, name: "Vendas".into() },
                Group { id: 2, name: "Custos Diretos".into() },
                Group { id: 3, name: "Administrativo".into() },
            ],
            ledger: vec![
                LedgerEntry::new(d(2024, 10, 5), "venda", dec!(10000), Direction::Entrada)
                    .with_group(1)
                    .from_bank("Itaú"),
                LedgerEntry::new(d(2024, 10, 6), "insumos", dec!(4000), Direction::Saida)
                    .with_group(2)
                    .from_bank("Itaú"),
                LedgerEntry::new(d(2024, 10, 7), "aluguel", dec!(3000), Direction::Saida)
                    .with_group(3)
                    .from_bank("Itaú"),
                LedgerEntry::new(d(2024, 9, 10), "venda", dec!(8000), Direction::Entrada).with_group(1),
            ],
            payables: vec![Title::new("Fornecedor", d(2024, 11, 10), dec!(1000))],
            investments: vec![Investment {
                name: "CDB".into(),
                institution: None,
                balance: dec!(500),
                as_of: d(2024, 10, 1),
            }],
            ..Default::default()
        }
    }

    fn window() -> DateWindow {
        DateWindow::new(d(2024, 10, 1), d(2024, 10, 31)).unwrap()
    }

    #[test]
    fn test_kpi_laws() {
        let snapshot = data().management_snapshot(&window(), 3);
        let k = compute_kpis(&snapshot);
        assert_eq!(k.operating_margin_pct, dec!(30));
        assert_eq!(k.revenue_growth_pct, Some(dec!(25)));
        assert_eq!(k.costs, dec!(4000));
        assert_eq!(k.cost_over_revenue_pct, dec!(40));
        assert_eq!(k.expense_over_revenue_pct, dec!(70));
        // fixed 3000 / (1 - 0.4)
        assert_eq!(k.break_even_revenue, dec!(5000));
        assert_eq!(k.year_accumulated_result, dec!(11000));
        assert_eq!(snapshot.bank_balances, vec![BankBalance { bank: "Itaú".into(), account: None, balance: dec!(3000) }]);
        assert_eq!(k.total_available, dec!(3500));
        assert_eq!(k.total_obligations, dec!(1000));
        assert_eq!(k.projected_next_month_balance, dec!(2000));
    }

    #[test]
    fn test_growth_absent_without_prior_revenue() {
        let mut snapshot = data().management_snapshot(&window(), 3);
        snapshot.prior_income.revenues = Decimal::ZERO;
        snapshot.income.expenses_by_group = vec![BucketTotal { name: "Custo".into(), total: dec!(1) }];
        assert_eq!(compute_kpis(&snapshot).revenue_growth_pct, None);
    }

    #[test]
    fn test_break_even_falls_back_to_expenses() {
        let empty = TenantData::default().management_snapshot(&window(), 3);
        let k = compute_kpis(&empty);
        assert_eq!(k.break_even_revenue, Decimal::ZERO);
        assert_eq!(k.operating_margin_pct, Decimal::ZERO);
        assert_eq!(k.revenue_growth_pct, None);
    }

    #[test]
    fn test_assemble_keeps_mandated_order() {
        let snapshot = data().management_snapshot(&window(), 3);
        let kpis = compute_kpis(&snapshot);
        let managed = ManagementData { snapshot, kpis };
        // Keys deliberately out of order, one missing, one with its own header.
        let sections = json!({
            "conclusoes": "Reduzir custos.",
            "diagnostico": "## Diagnóstico\nEmpresa lucrativa.",
            "resultados": ["Receita cresceu", "Custos estáveis"],
            "disponiveis": "Saldo em banco.",
            "obrigacoes": "Uma conta a pagar.",
            "lucro_prejuizo": "Lucro no período.",
            "projecao_caixa": "Sem déficit."
        });
        let (markdown, missing) = assemble("acme", &managed, &sections);
        assert_eq!(missing, vec!["projecoes_faturamento".to_string()]);
        assert!(markdown.starts_with("# APURAÇÃO FINANCEIRA"));
        assert!(markdown.contains("| Margem operacional | 30,0% |"));
        assert!(markdown.contains("| Crescimento da receita | +25,0% |"));
        assert!(markdown.contains("| Receitas | R$ 10.000,00 |"));
        assert!(markdown.contains(MISSING_SECTION));
        assert!(markdown.contains("- Receita cresceu"));
        assert_eq!(markdown.matches("Diagnóstico").count(), 1);

        let mut last = 0;
        for section in SECTIONS.iter() {
            let at = markdown.find(&format!(". {}\n", section.header)).unwrap();
            assert!(at > last, "{} out of order", section.header);
            last = at;
        }
    }

    #[test]
    fn test_prompt_carries_keys_and_formatted_values() {
        let prompt = system_prompt();
        for section in SECTIONS.iter() {
            assert!(prompt.contains(section.key));
        }
        let snapshot = data().management_snapshot(&window(), 3);
        let kpis = compute_kpis(&snapshot);
        let user = build_prompt("acme", &ManagementData { snapshot, kpis });
        assert!(user.contains("R$ 10.000,00"));
        assert!(user.contains("+25,0%"));
    }
}
