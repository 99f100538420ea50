use crate::error::{AssistantError, Result};
use crate::json_repair::extract_json;
use crate::llm::prompts::PLANNER_SYSTEM_PROMPT;
use crate::llm::{complete, CompletionOptions, LlmProvider};
use crate::locale::contains_folded;
use crate::period::PeriodResolver;
use crate::plan::{
    Baseline, Comparison, DataType, Intent, OutputFormat, PeriodKind, Plan, PlanFilters, RawPlan,
};
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::schema_for;
use serde_json::Value;

const MANAGEMENT_REPORT_PHRASES: [&str; 3] =
    ["relatorio gerencial", "apuracao financeira", "apuracao gerencial"];

/// Turns a question into a [`Plan`] with one model call.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    resolver: PeriodResolver,
    options: CompletionOptions,
}

impl QueryPlanner {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            resolver: PeriodResolver::new(today),
            options: CompletionOptions::planning(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_horizon(mut self, months: u32) -> Self {
        self.resolver = self.resolver.with_horizon(months);
        self
    }

    pub fn system_prompt(&self) -> String {
        let data_types = DataType::TAGS
            .iter()
            .map(|(tag, description)| format!("- {}: {}", tag, description))
            .collect::<Vec<_>>()
            .join("\n");
        let schema = serde_json::to_string_pretty(&schema_for!(RawPlan)).unwrap_or_default();

        PLANNER_SYSTEM_PROMPT
            .replace("{today}", &self.resolver.today().to_string())
            .replace("{data_types}", &data_types)
            .replace("{intents}", &Intent::TAGS.join(", "))
            .replace("{period_kinds}", &PeriodKind::TAGS.join(", "))
            .replace("{schema}", &schema)
    }

    pub fn user_prompt(question: &str) -> String {
        format!("Pergunta do usuário:\n\"{}\"\n\nRetorne o plano em JSON.", question.trim())
    }

    /// Never fails: provider and format failures come back as an
    /// `intent=error` plan.
    pub async fn plan(&self, provider: Option<&dyn LlmProvider>, question: &str) -> Plan {
        match self.try_plan(provider, question).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!("Planning failed: {}", err);
                Plan::failed(&err, self.resolver.resolve(None, Some(question)))
            }
        }
    }

    async fn try_plan(&self, provider: Option<&dyn LlmProvider>, question: &str) -> Result<Plan> {
        let provider = provider.ok_or_else(|| {
            AssistantError::ProviderUnavailable("No LLM provider configured".to_string())
        })?;
        let raw = complete(
            provider,
            &self.system_prompt(),
            &Self::user_prompt(question),
            &self.options,
        )
        .await?;
        self.plan_from_response(&raw, question)
    }

    pub fn plan_from_response(&self, raw: &str, question: &str) -> Result<Plan> {
        let extracted = extract_json(raw)?;
        if extracted.is_partial() {
            warn!("Planner output needed salvage: {:?}", extracted.issues);
        }
        Ok(self.plan_from_value(&extracted.value, question))
    }

    /// Coerces the model's loosely-typed plan into a closed [`Plan`].
    pub fn plan_from_value(&self, value: &Value, question: &str) -> Plan {
        let text = |key: &str| value.get(key).and_then(Value::as_str);

        let mut intent = Intent::coerce(text("intent"));
        let mut data_type = DataType::coerce(text("data_type"));
        let mut output_format = OutputFormat::coerce(text("output_format"));

        if is_management_request(question) {
            intent = Intent::RelatorioGerencial;
            data_type = DataType::RelatorioGerencial;
        }
        if intent == Intent::RelatorioGerencial || data_type == DataType::RelatorioGerencial {
            intent = Intent::RelatorioGerencial;
            data_type = DataType::RelatorioGerencial;
            output_format = OutputFormat::RelatorioGerencial;
        }

        let mut period = self.resolver.resolve(value.get("period"), Some(question));
        if data_type == DataType::Projecao && period.end <= self.resolver.today() {
            period = self.resolver.resolve_kind(PeriodKind::ProximosMeses);
        }

        let comparison = value
            .get("comparison")
            .map(|c| Comparison {
                enabled: match c.get("enabled") {
                    Some(Value::Bool(b)) => *b,
                    Some(Value::String(s)) => matches!(s.trim(), "true" | "sim" | "1"),
                    _ => false,
                },
                baseline: Baseline::coerce(c.get("baseline").and_then(Value::as_str)),
            })
            .unwrap_or_default();

        let plan = Plan {
            intent,
            data_type,
            period,
            filters: PlanFilters::from_value(value.get("filters")),
            output_format,
            comparison,
            error: None,
        };
        debug!(
            "Plan: intent={:?} data_type={:?} period={}..{} ({:?}) format={:?}",
            plan.intent,
            plan.data_type,
            plan.period.start,
            plan.period.end,
            plan.period.kind,
            plan.output_format
        );
        plan
    }
}

pub fn is_management_request(question: &str) -> bool {
    MANAGEMENT_REPORT_PHRASES
        .iter()
        .any(|phrase| contains_folded(question, phrase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::Direction;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn planner() -> QueryPlanner {
        QueryPlanner::new(d(2024, 11, 15))
    }

    #[test]
    fn test_prompt_lists_tags_and_schema() {
        let prompt = planner().system_prompt();
        for (tag, _) in DataType::TAGS {
            assert!(prompt.contains(tag), "missing {}", tag);
        }
        assert!(prompt.contains("2024-11-15"));
        assert!(prompt.contains("relatorio_gerencial"));
        assert!(prompt.contains("\"data_type\""));
        assert!(!prompt.contains("{schema}"));
    }

    #[test]
    fn test_fenced_plan_is_parsed_and_coerced() {
        let raw = "```json\n{\"intent\": \"consulta\", \"data_type\": \"balancete\", \"period\": {\"month\": \"outubro\", \"year\": 2024}}\n```";
        let plan = planner().plan_from_response(raw, "quais transações em outubro 2024?").unwrap();
        assert_eq!(plan.intent, Intent::Consulta);
        assert_eq!(plan.data_type, DataType::Transacoes);
        assert_eq!((plan.period.start, plan.period.end), (d(2024, 10, 1), d(2024, 10, 31)));
        assert_eq!(plan.filters, PlanFilters::default());
        assert!(!plan.comparison.enabled);
        assert_eq!(plan.output_format, OutputFormat::Resumo);
    }

    #[test]
    fn test_management_phrase_forces_report() {
        let plan = planner().plan_from_value(
            &json!({"intent": "consulta", "data_type": "dre"}),
            "Quero a Apuração Financeira do mês",
        );
        assert_eq!(plan.intent, Intent::RelatorioGerencial);
        assert_eq!(plan.data_type, DataType::RelatorioGerencial);
        assert_eq!(plan.output_format, OutputFormat::RelatorioGerencial);
        assert!(plan.is_management_report());
    }

    #[test]
    fn test_comparison_and_filters() {
        let plan = planner().plan_from_value(
            &json!({
                "intent": "comparacao",
                "data_type": "dre",
                "period": {"kind": "ultimo_mes"},
                "filters": {"group": "Operacional", "direction": "saida"},
                "comparison": {"enabled": true, "baseline": "ano_anterior"}
            }),
            "compare as despesas operacionais com o ano passado",
        );
        assert!(plan.wants_comparison());
        assert_eq!(plan.comparison.baseline, Baseline::AnoAnterior);
        assert_eq!(plan.filters.group.as_deref(), Some("Operacional"));
        assert_eq!(plan.filters.direction, Some(Direction::Saida));
    }

    #[test]
    fn test_projection_moves_to_future_window() {
        let plan = planner().plan_from_value(&json!({"data_type": "projecao"}), "projeção de caixa");
        assert_eq!(plan.data_type, DataType::Projecao);
        assert_eq!(plan.period.kind, PeriodKind::ProximosMeses);
        assert_eq!(plan.period.start, d(2024, 12, 1));
    }

    #[tokio::test]
    async fn test_missing_provider_yields_error_plan() {
        let plan = planner().plan(None, "DRE do último mês").await;
        assert_eq!(plan.intent, Intent::Error);
        let failure = plan.error.clone().unwrap();
        assert_eq!(failure.kind, ErrorKind::ProviderUnavailable);
        assert!(plan.period.start <= plan.period.end);
        assert!(plan.into_result().is_err());
    }

    #[test]
    fn test_garbage_response_is_format_error() {
        let err = planner().plan_from_response("não sei", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderFormat);
    }
}
