use crate::config::AssistantOptions;
use crate::executor::{ResultBundle, ResultData};
use crate::gateway::{BucketTotal, IncomeStatement, MonthFlow, TitleTable};
use crate::json_repair::strip_fences;
use crate::llm::prompts::NARRATOR_SYSTEM_PROMPT;
use crate::llm::{complete, CompletionOptions, LlmProvider};
use crate::locale::month_label;
use crate::plan::{Baseline, Plan};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Rows listed by the fallback card before it stops.
const FALLBACK_ROW_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NarrationSource {
    Model,
    Fallback,
    NoData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Narration {
    pub markdown: String,
    pub source: NarrationSource,
    /// Why the fallback was used, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Describes a [`ResultBundle`] in Markdown. Falls back to a deterministic
/// card when the model cannot be reached.
#[derive(Debug, Clone)]
pub struct Narrator {
    options: CompletionOptions,
    data_cap: usize,
}

impl Default for Narrator {
    fn default() -> Self {
        Self::from_options(&AssistantOptions::default())
    }
}

impl Narrator {
    pub fn from_options(options: &AssistantOptions) -> Self {
        Self {
            options: options.narration(),
            data_cap: options.narration_data_cap,
        }
    }

    pub fn build_prompt(&self, bundle: &ResultBundle, plan: &Plan, question: &str) -> String {
        let data = serde_json::to_string_pretty(bundle).unwrap_or_default();
        let data = if data.chars().count() > self.data_cap {
            let mut cut: String = data.chars().take(self.data_cap).collect();
            cut.push_str("\n... (dados truncados)");
            cut
        } else {
            data
        };

        let mut prompt = format!(
            "Pergunta do usuário: \"{}\"\n\nTipo de resultado: {} ({})\nPeríodo: {} a {}\n",
            question.trim(),
            bundle.result.label(),
            bundle.result.type_tag(),
            bundle.period.start,
            bundle.period.end,
        );
        if let Some(baseline) = bundle.comparison_baseline {
            let _ = writeln!(prompt, "Comparação com: {}", baseline_label(baseline));
        }
        if let Some(group) = &plan.filters.group {
            let _ = writeln!(prompt, "Filtro de grupo: {}", group);
        }
        let _ = write!(prompt, "\nDados (JSON):\n```json\n{}\n```\n", data);
        prompt
    }

    pub async fn narrate(
        &self,
        provider: Option<&dyn LlmProvider>,
        bundle: &ResultBundle,
        plan: &Plan,
        question: &str,
    ) -> Narration {
        if bundle.is_empty() {
            return Narration {
                markdown: no_data(bundle),
                source: NarrationSource::NoData,
                warning: None,
            };
        }

        let Some(provider) = provider else {
            return self.fallback(bundle, "no LLM provider configured".to_string());
        };

        let prompt = self.build_prompt(bundle, plan, question);
        match complete(provider, NARRATOR_SYSTEM_PROMPT.trim(), &prompt, &self.options).await {
            Ok(text) => {
                let text = strip_fences(&text);
                if text.is_empty() {
                    self.fallback(bundle, "model returned no prose".to_string())
                } else {
                    debug!("Narration from {} ({} chars)", provider.name(), text.len());
                    Narration {
                        markdown: text.to_string(),
                        source: NarrationSource::Model,
                        warning: None,
                    }
                }
            }
            Err(err) => self.fallback(bundle, err.to_string()),
        }
    }

    fn fallback(&self, bundle: &ResultBundle, reason: String) -> Narration {
        warn!("Using fallback narration: {}", reason);
        Narration {
            markdown: render_fallback(bundle),
            source: NarrationSource::Fallback,
            warning: Some(reason),
        }
    }
}

fn baseline_label(baseline: Baseline) -> &'static str {
    match baseline {
        Baseline::PeriodoAnterior => "período anterior",
        Baseline::AnoAnterior => "mesmo período do ano anterior",
    }
}

pub fn no_data(bundle: &ResultBundle) -> String {
    format!(
        "## {}\n\nNão foram encontrados dados para o período {} a {}.\n",
        bundle.result.label(),
        bundle.period.start,
        bundle.period.end
    )
}

/// Numbers are written exactly as the serialized result writes them, so
/// every figure in the card can be found in the bundle's JSON.
fn num(value: Decimal) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| value.to_string())
}

/// The deterministic summary card: one subsection per result type, plus the
/// comparison when present.
pub fn render_fallback(bundle: &ResultBundle) -> String {
    let mut out = format!(
        "## {}\n\nPeríodo: {} a {}\n",
        bundle.result.label(),
        bundle.period.start,
        bundle.period.end
    );
    render_result(&mut out, &bundle.result);

    if let (Some(baseline), Some(comparison)) = (bundle.comparison_baseline, &bundle.comparison) {
        let _ = write!(out, "\n## Comparação: {}\n", baseline_label(baseline));
        render_result(&mut out, comparison);
    }
    if !bundle.notes.is_empty() {
        out.push_str("\n### Observações\n\n");
        for note in &bundle.notes {
            let _ = writeln!(out, "- {}", note);
        }
    }
    out
}

fn line(out: &mut String, label: &str, value: Decimal) {
    let _ = writeln!(out, "- {}: {}", label, num(value));
}

fn buckets(out: &mut String, title: &str, list: &[BucketTotal]) {
    if list.is_empty() {
        return;
    }
    let _ = write!(out, "\n**{}**\n\n", title);
    for bucket in list {
        line(out, &bucket.name, bucket.total);
    }
}

fn income(out: &mut String, statement: &IncomeStatement) {
    line(out, "Receitas", statement.revenues);
    line(out, "Despesas", statement.expenses);
    line(out, "Resultado", statement.net);
    let _ = writeln!(out, "- Margem: {}%", num(statement.margin_pct));
    buckets(out, "Receitas por grupo", &statement.revenues_by_group);
    buckets(out, "Receitas por categoria", &statement.revenues_by_category);
    buckets(out, "Despesas por grupo", &statement.expenses_by_group);
    buckets(out, "Despesas por categoria", &statement.expenses_by_category);
}

fn months(out: &mut String, per_month: &[MonthFlow], running_label: &str) {
    for m in per_month {
        let _ = writeln!(
            out,
            "- {}: entradas {}, saídas {}, líquido {}, {} {}",
            m.month,
            num(m.inflow),
            num(m.outflow),
            num(m.net),
            running_label,
            num(m.running)
        );
    }
}

fn titles(out: &mut String, title: &str, table: &TitleTable) {
    let _ = write!(out, "\n**{}**\n\n", title);
    let _ = writeln!(out, "- Títulos: {}", table.count);
    line(out, "Total", table.total);
    line(out, "Liquidado", table.settled);
    line(out, "Pendente", table.pending);
}

fn render_result(out: &mut String, result: &ResultData) {
    out.push_str("\n### Resumo\n\n");
    match result {
        ResultData::Transacoes(r) => {
            line(out, "Entradas", r.totals.total_in);
            line(out, "Saídas", r.totals.total_out);
            line(out, "Saldo", r.totals.balance);
            let _ = writeln!(out, "- Lançamentos: {}", r.totals.count);
            if !r.rows.is_empty() {
                out.push_str("\n**Lançamentos**\n\n");
                for row in r.rows.iter().take(FALLBACK_ROW_LIMIT) {
                    let _ = writeln!(
                        out,
                        "- {} · {} · {} · {}",
                        row.entry.date,
                        row.entry.description,
                        row.entry.direction.as_str(),
                        num(row.entry.value)
                    );
                }
                if r.rows.len() > FALLBACK_ROW_LIMIT {
                    out.push_str("- (lista parcial)\n");
                }
            }
        }
        ResultData::Contratos(c) => {
            let _ = writeln!(out, "- Contratos: {}", c.count);
            line(out, "Valor total", c.total_value);
            for status in &c.by_status {
                let _ = writeln!(
                    out,
                    "- {}: {} contrato(s), {}",
                    status.status.label(),
                    status.count,
                    num(status.total)
                );
            }
        }
        ResultData::Contas(t) => {
            titles(out, "Contas a receber", &t.receivables);
            titles(out, "Contas a pagar", &t.payables);
        }
        ResultData::Dre(statement) => income(out, statement),
        ResultData::Dfc(flow) => {
            months(out, &flow.per_month, "acumulado");
            line(out, "Saldo final", flow.final_balance);
        }
        ResultData::Projecao(p) => {
            months(out, &p.per_month, "saldo projetado");
            line(out, "Saldo final projetado", p.final_balance);
            if !p.deficits.is_empty() {
                out.push_str("\n**Meses com déficit**\n\n");
                for deficit in &p.deficits {
                    line(out, &deficit.month, deficit.balance);
                }
            }
        }
        ResultData::Sazonalidade(s) => {
            out.push_str("Média de receita por mês:\n\n");
            for avg in &s.month_average {
                line(out, month_label(avg.month), avg.avg);
            }
        }
        ResultData::Kpis(k) => {
            income(out, &k.income);
            line(out, "A receber no período", k.pending_receivables);
            line(out, "A pagar no período", k.pending_payables);
            let _ = writeln!(out, "- Contratos ativos: {}", k.active_contracts);
            line(out, "Valor dos contratos ativos", k.active_contracts_value);
        }
        ResultData::Extratos(b) => {
            for bank in &b.per_bank {
                let _ = writeln!(
                    out,
                    "- {}: entradas {}, saídas {}, líquido {}",
                    bank.name,
                    num(bank.inflow),
                    num(bank.outflow),
                    num(bank.net)
                );
            }
        }
        ResultData::RelatorioGerencial(m) => {
            income(out, &m.snapshot.income);
            line(out, "Total disponível", m.kpis.total_available);
            line(out, "Total de obrigações", m.kpis.total_obligations);
            line(out, "Resultado acumulado no ano", m.kpis.year_accumulated_result);
        }
    }
}
