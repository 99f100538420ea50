//! Bulk import: one model call turns a parsed sample (rows plus optional PDF
//! text) into typed records, then the parser's own reading of each row is
//! reconciled back over the model's answer.

use crate::config::AssistantOptions;
use crate::error::{AssistantError, Result};
use crate::gateway::{check_tenant, DataGateway};
use crate::json_repair::extract_json;
use crate::llm::prompts::EXTRACTOR_SYSTEM_PROMPT;
use crate::llm::{complete, CompletionOptions, LlmProvider};
use crate::locale::{contains_folded, fold, parse_date, parse_money};
use crate::schema::{
    Contract, ContractStatus, Direction, EntrySource, Group, GroupId, LedgerEntry, Subgroup,
    SubgroupId, Title,
};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tokio::sync::mpsc::Sender;

pub const ORIGINAL_INDEX: &str = "_original_index";

/// Header token prefixes that mark a column as holding the row's date.
const DATE_HEADER_PREFIXES: [&str; 3] = ["data", "date", "dt"];

/// Header tokens that mark a date column only as whole words, so that
/// "Dias em atraso" or "Diária" stay value columns.
const DATE_HEADER_WORDS: [&str; 5] = ["lancamento", "vencimento", "venc", "dia", "transacao"];

const PDF_TEXT_CAP: usize = 20_000;

const OUTFLOW_KEYWORDS: [&str; 12] = [
    "pagamento",
    "pgto",
    "pag ",
    "debito",
    "tarifa",
    "saque",
    "compra",
    "pix enviado",
    "transferencia enviada",
    "ted enviada",
    "boleto pago",
    "imposto",
];

const INFLOW_KEYWORDS: [&str; 8] = [
    "recebimento",
    "credito",
    "deposito",
    "pix recebido",
    "transferencia recebida",
    "ted recebida",
    "venda",
    "rendimento",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
    Transacoes,
    ContasReceber,
    ContasPagar,
    Contratos,
    Extrato,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transacoes => "transacoes",
            Self::ContasReceber => "contas_receber",
            Self::ContasPagar => "contas_pagar",
            Self::Contratos => "contratos",
            Self::Extrato => "extrato",
        }
    }

    pub fn from_tag(raw: &str) -> Option<Self> {
        match fold(raw.trim()).replace([' ', '-'], "_").as_str() {
            "transacoes" | "lancamentos" => Some(Self::Transacoes),
            "contas_receber" | "contas_a_receber" | "receber" => Some(Self::ContasReceber),
            "contas_pagar" | "contas_a_pagar" | "pagar" => Some(Self::ContasPagar),
            "contratos" => Some(Self::Contratos),
            "extrato" | "extrato_bancario" => Some(Self::Extrato),
            _ => None,
        }
    }

    /// Direction every record of this type carries regardless of the row.
    /// Receivables and payables become [`Title`]s.
    pub fn is_title(&self) -> bool {
        matches!(self, Self::ContasReceber | Self::ContasPagar)
    }

    pub fn fixed_direction(&self) -> Option<Direction> {
        match self {
            Self::ContasReceber | Self::Contratos => Some(Direction::Entrada),
            Self::ContasPagar => Some(Direction::Saida),
            Self::Transacoes | Self::Extrato => None,
        }
    }

    fn rules(&self) -> &'static str {
        match self {
            Self::Transacoes => {
                "Lançamentos do livro-caixa. \"date\" é a data do lançamento; \
                 informe \"direction\" de cada linha."
            }
            Self::ContasReceber => {
                "Títulos a receber. \"date\" é o vencimento; \"counterparty\" é o \
                 cliente; informe \"settled\" e \"settlement_date\" quando pago e \
                 \"installment_no\"/\"total_installments\" quando parcelado."
            }
            Self::ContasPagar => {
                "Títulos a pagar. \"date\" é o vencimento; \"counterparty\" é o \
                 fornecedor; informe \"settled\" e \"settlement_date\" quando pago e \
                 \"installment_no\"/\"total_installments\" quando parcelado."
            }
            Self::Contratos => {
                "Contratos de serviço. \"date\" é a data do evento, \
                 \"contract_start\" a data de assinatura, \"value\" o valor do \
                 serviço, \"displacement_value\" o deslocamento e \"status\" um de \
                 pendente, em_andamento, concluido, cancelado."
            }
            Self::Extrato => {
                "Extrato bancário. Débitos são \"saida\" e créditos \"entrada\"; \
                 informe \"bank_name\". Ignore linhas de saldo."
            }
        }
    }
}

/// A parsed sample: header plus string cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn index_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c == ORIGINAL_INDEX)
    }

    /// Prepends a 0-based `_original_index` column unless one is present.
    pub fn with_original_index(mut self) -> Self {
        if self.index_column().is_some() {
            return self;
        }
        self.columns.insert(0, ORIGINAL_INDEX.to_string());
        for (idx, row) in self.rows.iter_mut().enumerate() {
            row.insert(0, idx.to_string());
        }
        self
    }

    pub fn original_indices(&self) -> Vec<usize> {
        match self.index_column() {
            Some(col) => self
                .rows
                .iter()
                .filter_map(|row| row.get(col).and_then(|cell| cell.trim().parse().ok()))
                .collect(),
            None => (0..self.rows.len()).collect(),
        }
    }

    pub fn row_at(&self, original_index: usize) -> Option<&[String]> {
        let row = match self.index_column() {
            Some(col) => self.rows.iter().find(|row| {
                row.get(col)
                    .and_then(|cell| cell.trim().parse::<usize>().ok())
                    == Some(original_index)
            }),
            None => self.rows.get(original_index),
        };
        row.map(Vec::as_slice)
    }

    pub fn date_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, header)| is_date_header(header))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// The parser's date for a row: first parseable cell under a date header.
    pub fn parsed_date(&self, original_index: usize) -> Option<NaiveDate> {
        let row = self.row_at(original_index)?;
        self.date_columns()
            .into_iter()
            .find_map(|col| row.get(col).and_then(|cell| parse_date(cell)))
    }

    /// Signed amount read from the row's value-like columns.
    fn signed_amount(&self, original_index: usize) -> Option<Decimal> {
        let row = self.row_at(original_index)?;
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, header)| {
                let header = fold(header);
                ["valor", "value", "amount", "montante", "quantia"]
                    .iter()
                    .any(|k| header.contains(k))
            })
            .find_map(|(col, _)| row.get(col).and_then(|cell| parse_money(cell)))
    }

    fn to_json_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, cell)| (col.clone(), Value::String(cell.clone())))
                    .collect();
                Value::Object(object)
            })
            .collect()
    }
}

pub fn is_date_header(header: &str) -> bool {
    fold(header)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| {
            DATE_HEADER_PREFIXES.iter().any(|p| token.starts_with(p))
                || DATE_HEADER_WORDS.contains(&token)
        })
}

/// Free text extracted from a PDF alongside its table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PdfContext {
    pub text: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
}

/// What the model is asked to emit for each row. Only rendered into the
/// prompt; the answer is read leniently.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawRecord {
    /// `_original_index + 1` of the source row.
    pub original_row: usize,
    /// YYYY-MM-DD
    pub date: String,
    pub description: String,
    /// Absolute value with a dot decimal mark.
    pub value: f64,
    /// "entrada" or "saida".
    pub direction: Option<String>,
    /// Exact name from the company's group list.
    pub group: Option<String>,
    pub subgroup: Option<String>,
    /// Complementary only; never a replacement for `group`.
    pub category: Option<String>,
    pub counterparty: Option<String>,
    pub bank_name: Option<String>,
    pub settled: Option<bool>,
    pub settlement_date: Option<String>,
    pub installment_no: Option<u32>,
    pub total_installments: Option<u32>,
    pub contract_start: Option<String>,
    pub displacement_value: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRecord {
    pub original_row: usize,
    pub date: NaiveDate,
    pub description: String,
    pub value: Decimal,
    pub direction: Direction,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub subgroup: Option<String>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub subgroup_id: Option<SubgroupId>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub settled: bool,
    #[serde(default)]
    pub settlement_date: Option<NaiveDate>,
    #[serde(default)]
    pub installment_no: Option<u32>,
    #[serde(default)]
    pub total_installments: Option<u32>,
    #[serde(default)]
    pub contract_start: Option<NaiveDate>,
    #[serde(default)]
    pub displacement_value: Option<Decimal>,
    #[serde(default)]
    pub status: Option<ContractStatus>,
}

impl ExtractedRecord {
    pub fn to_ledger_entry(&self, origin_file: Option<&str>) -> LedgerEntry {
        let mut entry = LedgerEntry::new(self.date, &self.description, self.value, self.direction);
        entry.category = self.category.clone();
        entry.group_id = self.group_id;
        entry.subgroup_id = self.group_id.and(self.subgroup_id);
        entry.bank_name = self.bank_name.clone();
        entry.source = if self.bank_name.is_some() {
            EntrySource::BankStatement
        } else {
            EntrySource::Imported
        };
        entry.origin_file = origin_file.map(str::to_string);
        entry
    }

    pub fn to_title(&self) -> Title {
        let counterparty = self
            .counterparty
            .clone()
            .unwrap_or_else(|| self.description.clone());
        let mut title = Title::new(counterparty, self.date, self.value);
        if self.settled {
            title = title.settled_on(self.settlement_date.unwrap_or(self.date));
        }
        title.installment_no = self.installment_no;
        title.total_installments = self.total_installments;
        title.group_id = self.group_id;
        title.subgroup_id = self.group_id.and(self.subgroup_id);
        title.description = Some(self.description.clone());
        title
    }

    pub fn to_contract(&self) -> Result<Contract> {
        let contract = Contract {
            counterparty: self
                .counterparty
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            contract_start: self.contract_start.unwrap_or(self.date),
            event_date: self.date,
            service_value: self.value,
            displacement_value: self.displacement_value.unwrap_or_default(),
            status: self.status.unwrap_or(ContractStatus::Pendente),
        };
        contract.validate()?;
        Ok(contract)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The model's JSON was only partly recoverable.
    Partial,
    MissingDate,
    MissingValue,
    UnknownRow,
    NotReturned,
    UnknownGroup,
    CategoryOnly,
    /// A receivable or payable that breaks the settlement policy.
    InvalidTitle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_row: Option<usize>,
    pub kind: IssueKind,
    pub message: String,
}

impl ExtractionIssue {
    fn row(original_row: usize, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            original_row: Some(original_row),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSummary {
    pub import_type: ImportType,
    pub input_rows: usize,
    pub extracted: usize,
    pub skipped: usize,
    /// Records whose date was replaced by the parser's reading of the row.
    pub date_overrides: usize,
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionOutcome {
    pub rows: Vec<ExtractedRecord>,
    pub summary: ExtractionSummary,
    pub issues: Vec<ExtractionIssue>,
}

impl ExtractionOutcome {
    pub fn is_partial(&self) -> bool {
        self.summary.partial
    }

    pub fn ledger_entries(&self, origin_file: Option<&str>) -> Vec<LedgerEntry> {
        self.rows
            .iter()
            .map(|r| r.to_ledger_entry(origin_file))
            .collect()
    }

    pub fn titles(&self) -> Vec<Title> {
        self.rows.iter().map(ExtractedRecord::to_title).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    Starting { rows: usize },
    Requesting,
    Reconciling,
    Done { extracted: usize, issues: usize },
    Failed { reason: String },
}

/// Tenant classification the model must map rows onto.
struct Classification {
    groups: Vec<Group>,
    subgroups: Vec<Subgroup>,
}

impl Classification {
    fn prompt_list(&self) -> String {
        if self.groups.is_empty() {
            return "(nenhum grupo cadastrado; use \"category\")".to_string();
        }
        self.groups
            .iter()
            .map(|group| {
                let subs: Vec<&str> = self
                    .subgroups
                    .iter()
                    .filter(|s| s.group_id == group.id)
                    .map(|s| s.name.as_str())
                    .collect();
                if subs.is_empty() {
                    format!("- {}", group.name)
                } else {
                    format!("- {}: {}", group.name, subs.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Exact accent/case-insensitive match first, then containment either way.
    fn snap_group(&self, name: &str) -> Option<&Group> {
        let folded = fold(name.trim());
        self.groups
            .iter()
            .find(|g| fold(&g.name) == folded)
            .or_else(|| {
                self.groups.iter().find(|g| {
                    contains_folded(&g.name, name.trim()) || contains_folded(name.trim(), &g.name)
                })
            })
    }

    fn snap_subgroup(&self, name: &str, group: GroupId) -> Option<&Subgroup> {
        let folded = fold(name.trim());
        let candidates = || self.subgroups.iter().filter(move |s| s.group_id == group);
        candidates()
            .find(|s| fold(&s.name) == folded)
            .or_else(|| candidates().find(|s| contains_folded(&s.name, name.trim())))
    }
}

/// Runs one extraction for a tenant.
pub struct BulkExtractor<'g> {
    gateway: &'g dyn DataGateway,
    options: CompletionOptions,
    grace_days: i64,
}

impl<'g> BulkExtractor<'g> {
    pub fn new(gateway: &'g dyn DataGateway) -> Self {
        let defaults = AssistantOptions::default();
        Self {
            gateway,
            options: defaults.extraction(),
            grace_days: defaults.grace_days,
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Settlement grace applied to extracted receivables and payables.
    pub fn with_grace_days(mut self, days: i64) -> Self {
        self.grace_days = days;
        self
    }

    pub fn system_prompt(import_type: ImportType, groups: &str) -> String {
        let schema = serde_json::to_string_pretty(&schema_for!(RawRecord)).unwrap_or_default();
        EXTRACTOR_SYSTEM_PROMPT
            .replace("{import_type}", import_type.as_str())
            .replace("{import_rules}", import_type.rules())
            .replace("{groups}", groups)
            .replace("{schema}", &schema)
            .trim()
            .to_string()
    }

    pub fn user_prompt(table: &RowTable, pdf: Option<&PdfContext>) -> String {
        let rows = serde_json::to_string_pretty(&table.to_json_rows()).unwrap_or_default();
        let mut prompt = format!(
            "Tabela com {} linhas (colunas: {}):\n```json\n{}\n```\n",
            table.rows.len(),
            table.columns.join(", "),
            rows
        );
        if let Some(pdf) = pdf.filter(|p| !p.text.trim().is_empty()) {
            let text: String = pdf.text.chars().take(PDF_TEXT_CAP).collect();
            prompt.push_str("\nTexto completo do PDF");
            if let Some(name) = &pdf.file_name {
                prompt.push_str(&format!(" \"{}\"", name));
            }
            if let Some(pages) = pdf.pages {
                prompt.push_str(&format!(" ({} páginas)", pages));
            }
            prompt.push_str(&format!(":\n\"\"\"\n{}\n\"\"\"\n", text));
        }
        prompt.push_str("\nRetorne o JSON com processed_data e summary.");
        prompt
    }

    pub async fn extract(
        &self,
        provider: &dyn LlmProvider,
        tenant: &str,
        import_type: ImportType,
        sample: &RowTable,
        pdf: Option<&PdfContext>,
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<ExtractionOutcome> {
        check_tenant(tenant)?;
        let table = sample.clone().with_original_index();
        send_event(&progress, ExtractionEvent::Starting { rows: table.rows.len() }).await;

        let classification = Classification {
            groups: self.gateway.groups(tenant)?,
            subgroups: self.gateway.subgroups(tenant)?,
        };

        send_event(&progress, ExtractionEvent::Requesting).await;
        let raw = match complete(
            provider,
            &Self::system_prompt(import_type, &classification.prompt_list()),
            &Self::user_prompt(&table, pdf),
            &self.options,
        )
        .await
        {
            Ok(raw) => raw,
            Err(err) => {
                send_event(&progress, ExtractionEvent::Failed { reason: err.to_string() }).await;
                return Err(err);
            }
        };

        send_event(&progress, ExtractionEvent::Reconciling).await;
        let outcome = reconcile(&raw, import_type, &table, &classification, self.grace_days);
        match &outcome {
            Ok(o) => {
                info!(
                    "Extracted {} {} records for {} ({} issues, {} date overrides)",
                    o.rows.len(),
                    import_type.as_str(),
                    tenant,
                    o.issues.len(),
                    o.summary.date_overrides
                );
                send_event(
                    &progress,
                    ExtractionEvent::Done {
                        extracted: o.rows.len(),
                        issues: o.issues.len(),
                    },
                )
                .await;
            }
            Err(err) => {
                send_event(&progress, ExtractionEvent::Failed { reason: err.to_string() }).await;
            }
        }
        outcome
    }
}

async fn send_event(sender: &Option<Sender<ExtractionEvent>>, event: ExtractionEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event).await;
    }
}

fn reconcile(
    raw: &str,
    import_type: ImportType,
    table: &RowTable,
    classification: &Classification,
    grace_days: i64,
) -> Result<ExtractionOutcome> {
    let extracted = extract_json(raw)?;
    let mut issues: Vec<ExtractionIssue> = Vec::new();
    if extracted.is_partial() {
        warn!("Extraction output was salvaged: {:?}", extracted.issues);
        issues.extend(extracted.issues.iter().map(|message| ExtractionIssue {
            original_row: None,
            kind: IssueKind::Partial,
            message: message.clone(),
        }));
    }

    let items = match &extracted.value {
        Value::Array(items) => items.as_slice(),
        value => match value.get("processed_data") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                return Err(AssistantError::ExtractionFailed(
                    "Response has no processed_data array".to_string(),
                ))
            }
        },
    };
    let model_notes = extracted
        .value
        .get("summary")
        .and_then(|s| s.get("notes"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut rows = Vec::new();
    let mut skipped = 0;
    let mut date_overrides = 0;
    for (position, item) in items.iter().enumerate() {
        match reconcile_record(item, position, import_type, table, classification, &mut issues) {
            Some((record, overridden)) => {
                if import_type.is_title() {
                    if let Err(err) = record.to_title().validate(grace_days) {
                        warn!("Dropping extracted title from row {}: {}", record.original_row, err);
                        issues.push(ExtractionIssue::row(
                            record.original_row,
                            IssueKind::InvalidTitle,
                            err.detail(),
                        ));
                        skipped += 1;
                        continue;
                    }
                }
                date_overrides += usize::from(overridden);
                rows.push(record);
            }
            None => skipped += 1,
        }
    }

    let returned: BTreeSet<usize> = rows.iter().map(|r| r.original_row).collect();
    for index in table.original_indices() {
        if !returned.contains(&(index + 1)) && !issues.iter().any(|i| i.original_row == Some(index + 1)) {
            issues.push(ExtractionIssue::row(
                index + 1,
                IssueKind::NotReturned,
                "Linha não retornada pelo modelo",
            ));
        }
    }

    Ok(ExtractionOutcome {
        summary: ExtractionSummary {
            import_type,
            input_rows: table.rows.len(),
            extracted: rows.len(),
            skipped,
            date_overrides,
            partial: extracted.is_partial(),
            model_notes,
        },
        rows,
        issues,
    })
}

fn text_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn money_field(item: &Value, key: &str) -> Option<Decimal> {
    match item.get(key)? {
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => parse_money(s),
        _ => None,
    }
    .map(|v| v.round_dp(2))
}

fn date_field(item: &Value, key: &str) -> Option<NaiveDate> {
    match item.get(key)? {
        Value::String(s) => parse_date(s),
        Value::Number(n) => parse_date(&n.to_string()),
        _ => None,
    }
}

fn row_number(item: &Value) -> Option<usize> {
    match item.get("original_row")? {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| *n >= 1)
}

fn keyword_direction(description: &str) -> Option<Direction> {
    let folded = format!("{} ", fold(description));
    if OUTFLOW_KEYWORDS.iter().any(|k| folded.contains(k)) {
        Some(Direction::Saida)
    } else if INFLOW_KEYWORDS.iter().any(|k| folded.contains(k)) {
        Some(Direction::Entrada)
    } else {
        None
    }
}

/// Explicit field, then a negative sign in the model's value or the source
/// row, then description keywords. A positive magnitude only decides the
/// default, since the model is told to return absolute values.
fn infer_direction(
    import_type: ImportType,
    item: &Value,
    model_value: Option<Decimal>,
    row_value: Option<Decimal>,
    description: &str,
) -> Direction {
    if let Some(fixed) = import_type.fixed_direction() {
        return fixed;
    }
    if let Some(explicit) = text_field(item, "direction").and_then(|d| Direction::from_tag(&d)) {
        return explicit;
    }
    if model_value.is_some_and(|v| v.is_sign_negative() && !v.is_zero())
        || row_value.is_some_and(|v| v.is_sign_negative() && !v.is_zero())
    {
        return Direction::Saida;
    }
    keyword_direction(description).unwrap_or(Direction::Entrada)
}

fn reconcile_record(
    item: &Value,
    position: usize,
    import_type: ImportType,
    table: &RowTable,
    classification: &Classification,
    issues: &mut Vec<ExtractionIssue>,
) -> Option<(ExtractedRecord, bool)> {
    let Some(original_row) = row_number(item) else {
        issues.push(ExtractionIssue {
            original_row: None,
            kind: IssueKind::UnknownRow,
            message: format!("Registro {} sem original_row válido", position + 1),
        });
        return None;
    };
    let index = original_row - 1;
    if table.row_at(index).is_none() {
        issues.push(ExtractionIssue::row(
            original_row,
            IssueKind::UnknownRow,
            "original_row não corresponde a nenhuma linha da amostra",
        ));
        return None;
    }

    let model_date = date_field(item, "date");
    let (date, overridden) = match (table.parsed_date(index), model_date) {
        (Some(parsed), Some(model)) if parsed != model => {
            debug!(
                "Row {}: model date {} replaced by parsed {}",
                original_row, model, parsed
            );
            (parsed, true)
        }
        (Some(parsed), _) => (parsed, false),
        (None, Some(model)) => (model, false),
        (None, None) => {
            issues.push(ExtractionIssue::row(
                original_row,
                IssueKind::MissingDate,
                "Linha sem data reconhecível",
            ));
            return None;
        }
    };

    let model_value = money_field(item, "value");
    let row_value = table.signed_amount(index);
    let Some(value) = model_value.or(row_value).map(|v| v.abs()) else {
        issues.push(ExtractionIssue::row(
            original_row,
            IssueKind::MissingValue,
            "Linha sem valor reconhecível",
        ));
        return None;
    };

    let description = text_field(item, "description")
        .or_else(|| text_field(item, "counterparty"))
        .unwrap_or_default();
    let direction = infer_direction(import_type, item, model_value, row_value, &description);

    let mut group = None;
    let mut subgroup = None;
    let mut group_id = None;
    let mut subgroup_id = None;
    if let Some(name) = text_field(item, "group") {
        match classification.snap_group(&name) {
            Some(found) => {
                group = Some(found.name.clone());
                group_id = Some(found.id);
                if let Some(sub) = text_field(item, "subgroup")
                    .and_then(|s| classification.snap_subgroup(&s, found.id))
                {
                    subgroup = Some(sub.name.clone());
                    subgroup_id = Some(sub.id);
                }
            }
            None => issues.push(ExtractionIssue::row(
                original_row,
                IssueKind::UnknownGroup,
                format!("Grupo \"{}\" não existe na empresa", name),
            )),
        }
    }
    let category = text_field(item, "category");
    if group_id.is_none() && category.is_some() && !classification.groups.is_empty() {
        issues.push(ExtractionIssue::row(
            original_row,
            IssueKind::CategoryOnly,
            "Linha classificada só por categoria; atribua um grupo",
        ));
    }

    let record = ExtractedRecord {
        original_row,
        date,
        description,
        value,
        direction,
        group,
        subgroup,
        group_id,
        subgroup_id,
        category,
        counterparty: text_field(item, "counterparty"),
        bank_name: text_field(item, "bank_name"),
        settled: item
            .get("settled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        settlement_date: date_field(item, "settlement_date"),
        installment_no: item
            .get("installment_no")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        total_installments: item
            .get("total_installments")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        contract_start: date_field(item, "contract_start"),
        displacement_value: money_field(item, "displacement_value").map(|v| v.abs()),
        status: text_field(item, "status")
            .and_then(|s| serde_json::from_value(Value::String(fold(&s).replace(' ', "_"))).ok()),
    };
    Some((record, overridden))
}
