//! # Ledger Assistant
//!
//! A conversational assistant over a small business's bookkeeping data. A
//! question in Portuguese is turned into a typed plan by an LLM, the plan is
//! executed deterministically against a read-only data gateway, and the
//! result is narrated back in Markdown alongside chart-ready series.
//!
//! ## Core Concepts
//!
//! - **Plan**: the closed, typed query the planner coerces the model's JSON into
//! - **Result bundle**: the tagged aggregate the executor returns; the only
//!   source of numbers for narration
//! - **Data gateway**: typed reads of ledger entries, receivables, payables,
//!   contracts, investments and the group/subgroup tree
//! - **Management report**: the fixed-layout "Apuração Financeira"
//! - **Bulk extraction**: model-assisted import of parsed rows, reconciled
//!   against the parser's own reading of dates
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_assistant::*;
//! use std::sync::Arc;
//!
//! let gateway = InMemoryGateway::new()
//!     .with_tenant("acme", TenantData::default())?
//!     .with_provider(ProviderConfig::from_env()?);
//!
//! let assistant = FinancialAssistant::new(Arc::new(gateway));
//! let answer = assistant.ask("acme", "DRE do último mês").await?;
//! println!("{}", answer.markdown);
//! ```

pub mod assistant;
pub mod charts;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod ingestion;
pub mod json_repair;
pub mod llm;
pub mod locale;
pub mod narrator;
pub mod period;
pub mod plan;
pub mod planner;
pub mod report;
pub mod schema;
pub mod utils;

pub use assistant::{Answer, FinancialAssistant, ProviderSource};
pub use charts::{ChartKind, ChartSeries, Series};
pub use config::AssistantOptions;
pub use error::{AssistantError, ErrorKind, Result};
pub use executor::{variation_pct, LedgerResult, QueryExecutor, ResultBundle, ResultData};
pub use gateway::{DataGateway, InMemoryGateway, LedgerFilter, TenantData};
pub use ingestion::{
    BulkExtractor, ExtractedRecord, ExtractionEvent, ExtractionIssue, ExtractionOutcome,
    ExtractionSummary, ImportType, IssueKind, PdfContext, RowTable,
};
pub use json_repair::{extract_json, ExtractedJson, ExtractionStage};
pub use llm::{
    build_provider, select_enabled, CompletionOptions, LlmProvider, ProviderConfig, ProviderKind,
};
pub use narrator::{Narration, NarrationSource, Narrator};
pub use period::PeriodResolver;
pub use plan::{
    Baseline, Comparison, DataType, Intent, OutputFormat, PeriodKind, Plan, PlanFilters,
    ResolvedPeriod,
};
pub use planner::QueryPlanner;
pub use report::{compute_kpis, ManagementData, ManagementKpis, ManagementReport, ReportGenerator};
pub use schema::*;
