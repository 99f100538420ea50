//! The three entry points a UI calls: `ask`, `report` and `extract`.

use crate::charts::{self, ChartSeries};
use crate::config::AssistantOptions;
use crate::error::{AssistantError, ErrorKind, Result};
use crate::executor::{QueryExecutor, ResultBundle, ResultData};
use crate::gateway::{check_tenant, DataGateway};
use crate::ingestion::{BulkExtractor, ExtractionOutcome, ImportType, PdfContext, RowTable};
use crate::llm::{build_provider, select_enabled, LlmProvider};
use crate::narrator::{NarrationSource, Narrator};
use crate::plan::Plan;
use crate::planner::QueryPlanner;
use crate::report::{ManagementData, ManagementReport, ReportGenerator};
use crate::schema::DateWindow;
use chrono::{Local, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the LLM for a request comes from.
#[derive(Clone)]
pub enum ProviderSource {
    /// Read the enabled configuration record from the gateway on every call.
    Gateway,
    Fixed(Arc<dyn LlmProvider>),
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub markdown: String,
    pub result_bundle: ResultBundle,
    pub chart_series: Vec<ChartSeries>,
    pub plan: Plan,
    pub narration: NarrationSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct FinancialAssistant {
    gateway: Arc<dyn DataGateway>,
    provider: ProviderSource,
    options: AssistantOptions,
    today: Option<NaiveDate>,
}

impl FinancialAssistant {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            gateway,
            provider: ProviderSource::Gateway,
            options: AssistantOptions::default(),
            today: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = ProviderSource::Fixed(provider);
        self
    }

    pub fn without_provider(mut self) -> Self {
        self.provider = ProviderSource::Disabled;
        self
    }

    pub fn with_options(mut self, options: AssistantOptions) -> Self {
        self.options = options;
        self
    }

    /// Pins "today" for period resolution.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn provider(&self, tenant: &str) -> Result<Arc<dyn LlmProvider>> {
        match &self.provider {
            ProviderSource::Fixed(provider) => Ok(Arc::clone(provider)),
            ProviderSource::Disabled => Err(AssistantError::ProviderUnavailable(
                "LLM access is disabled".to_string(),
            )),
            ProviderSource::Gateway => {
                let configs = self.gateway.provider_configs(tenant)?;
                build_provider(select_enabled(&configs)?)
            }
        }
    }

    fn report_generator(&self) -> ReportGenerator<'_> {
        ReportGenerator::new(self.gateway.as_ref())
            .with_options(self.options.report())
            .with_horizon(self.options.projection_horizon_months)
    }

    pub async fn ask(&self, tenant: &str, question: &str) -> Result<Answer> {
        check_tenant(tenant)?;
        let provider = match self.provider(tenant) {
            Ok(provider) => Some(provider),
            Err(err) if err.kind() == ErrorKind::ProviderUnavailable => {
                warn!("No provider for {}: {}", tenant, err);
                None
            }
            Err(err) => return Err(err),
        };

        let planner = QueryPlanner::new(self.today())
            .with_options(self.options.planning())
            .with_horizon(self.options.projection_horizon_months);
        let plan = planner.plan(provider.as_deref(), question).await;
        let plan = plan.into_result()?;
        info!(
            "Answering {:?} over {}..{} for {}",
            plan.data_type, plan.period.start, plan.period.end, tenant
        );

        if plan.is_management_report() {
            let provider = provider.ok_or_else(|| {
                AssistantError::ReportUnavailable("No LLM provider is configured".to_string())
            })?;
            let generator = self.report_generator();
            let data = generator.collect(tenant, &plan.window())?;
            let report = generator.write(provider.as_ref(), tenant, data).await?;
            let warnings = report
                .missing_sections
                .iter()
                .map(|s| format!("Seção ausente no relatório: {}", s))
                .collect();
            let result = ResultData::RelatorioGerencial(Box::new(ManagementData {
                snapshot: report.snapshot,
                kpis: report.kpis,
            }));
            return Ok(Answer {
                markdown: report.report_markdown,
                result_bundle: ResultBundle::new(result, plan.period),
                chart_series: report.chart_series,
                plan,
                narration: NarrationSource::Model,
                warnings,
            });
        }

        let bundle = QueryExecutor::new(self.gateway.as_ref())
            .with_horizon(self.options.projection_horizon_months)
            .execute(tenant, &plan)?;
        let narration = Narrator::from_options(&self.options)
            .narrate(provider.as_deref(), &bundle, &plan, question)
            .await;
        let chart_series = if plan.output_format.wants_charts() && !bundle.is_empty() {
            charts::for_result(&bundle.result)
        } else {
            Vec::new()
        };

        Ok(Answer {
            markdown: narration.markdown,
            result_bundle: bundle,
            chart_series,
            plan,
            narration: narration.source,
            warnings: narration.warning.into_iter().collect(),
        })
    }

    /// The management report. There is no templated substitute: without a
    /// working provider this fails with `report_unavailable`.
    pub async fn report(&self, tenant: &str, window: &DateWindow) -> Result<ManagementReport> {
        check_tenant(tenant)?;
        window.validate()?;
        let provider = self.provider(tenant).map_err(|err| match err.kind() {
            ErrorKind::ProviderUnavailable => AssistantError::ReportUnavailable(err.detail()),
            _ => err,
        })?;
        self.report_generator()
            .generate(Some(provider.as_ref()), tenant, window)
            .await
    }

    pub async fn extract(
        &self,
        tenant: &str,
        import_type: ImportType,
        sample: &RowTable,
        pdf: Option<&PdfContext>,
    ) -> Result<ExtractionOutcome> {
        check_tenant(tenant)?;
        let provider = self.provider(tenant)?;
        BulkExtractor::new(self.gateway.as_ref())
            .with_options(self.options.extraction())
            .with_grace_days(self.options.grace_days)
            .extract(provider.as_ref(), tenant, import_type, sample, pdf, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryGateway, TenantData};
    use crate::llm::{CompletionOptions, ProviderConfig, ProviderKind};
    use crate::schema::{Direction, LedgerEntry};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn gateway() -> InMemoryGateway {
        let data = TenantData {
            ledger: vec![LedgerEntry::new(d(2024, 10, 3), "A", dec!(100), Direction::Entrada)],
            ..Default::default()
        };
        InMemoryGateway::new().with_tenant("acme", data).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_provider_surfaces_on_ask() {
        let assistant = FinancialAssistant::new(Arc::new(gateway()))
            .without_provider()
            .with_today(d(2024, 11, 15));
        let err = assistant.ask("acme", "transações de outubro").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }

    #[tokio::test]
    async fn test_report_without_enabled_config_is_unavailable() {
        let gateway = gateway().with_provider(ProviderConfig::new(ProviderKind::Ollama, "llama3").disabled());
        let assistant = FinancialAssistant::new(Arc::new(gateway));
        let window = DateWindow::new(d(2024, 10, 1), d(2024, 10, 31)).unwrap();
        let err = assistant.report("acme", &window).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReportUnavailable);
    }

    struct Reply(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for Reply {
        fn name(&self) -> &str {
            "reply"
        }

        async fn complete(&self, _: &str, _: &str, _: &CompletionOptions) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_extract_applies_configured_grace() {
        let table = RowTable::new(
            vec!["Vencimento".into(), "Valor".into()],
            vec![vec!["10/01/2024".into(), "1.500,00".into()]],
        );
        let provider = Arc::new(Reply(
            r#"{"processed_data": [{"original_row": 1, "date": "2024-01-10", "value": 1500,
                "counterparty": "Cliente X", "settled": true, "settlement_date": "2023-06-01"}]}"#,
        ));

        let strict = FinancialAssistant::new(Arc::new(gateway())).with_provider(provider.clone());
        let outcome = strict
            .extract("acme", ImportType::ContasReceber, &table, None)
            .await
            .unwrap();
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.summary.skipped, 1);

        let options = AssistantOptions {
            grace_days: 365,
            ..Default::default()
        };
        let lenient = FinancialAssistant::new(Arc::new(gateway()))
            .with_provider(provider)
            .with_options(options);
        let outcome = lenient
            .extract("acme", ImportType::ContasReceber, &table, None)
            .await
            .unwrap();
        assert_eq!(outcome.titles().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_tenant_is_invalid() {
        let assistant = FinancialAssistant::new(Arc::new(gateway())).without_provider();
        let err = assistant.ask("  ", "qualquer coisa").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayInvalid);
    }
}
