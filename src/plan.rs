use crate::error::{AssistantError, ErrorKind};
use crate::locale::fold;
use crate::schema::{DateWindow, Direction};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Consulta,
    Relatorio,
    RelatorioGerencial,
    Analise,
    Estatistica,
    Comparacao,
    Error,
}

impl Intent {
    pub const TAGS: [&'static str; 6] = [
        "consulta",
        "relatorio",
        "relatorio_gerencial",
        "analise",
        "estatistica",
        "comparacao",
    ];

    /// Unknown tags fall back to `consulta`.
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(normalize_tag).as_deref() {
            Some("relatorio") => Self::Relatorio,
            Some("relatorio_gerencial") | Some("apuracao_financeira") => Self::RelatorioGerencial,
            Some("analise") => Self::Analise,
            Some("estatistica") | Some("estatisticas") => Self::Estatistica,
            Some("comparacao") | Some("comparativo") => Self::Comparacao,
            _ => Self::Consulta,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Transacoes,
    Contratos,
    Contas,
    Dre,
    Dfc,
    Projecao,
    Sazonalidade,
    Kpis,
    Extratos,
    RelatorioGerencial,
}

impl DataType {
    pub const TAGS: [(&'static str, &'static str); 10] = [
        ("transacoes", "lançamentos do livro-caixa (entradas e saídas)"),
        ("contratos", "contratos de serviço e eventos"),
        ("contas", "contas a receber e a pagar"),
        ("dre", "demonstração de resultado (receitas, despesas, lucro, margem)"),
        ("dfc", "fluxo de caixa mensal com saldo acumulado"),
        ("projecao", "projeção de caixa futura a partir de contas em aberto"),
        ("sazonalidade", "receita por mês ao longo dos anos"),
        ("kpis", "indicadores: margem, pendências, contratos ativos"),
        ("extratos", "movimentação de extratos bancários por banco"),
        ("relatorio_gerencial", "relatório gerencial completo (apuração financeira)"),
    ];

    /// Unknown tags fall back to `transacoes`.
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(normalize_tag).as_deref() {
            Some("contratos") | Some("contrato") => Self::Contratos,
            Some("contas") | Some("contas_receber") | Some("contas_pagar") => Self::Contas,
            Some("dre") => Self::Dre,
            Some("dfc") | Some("fluxo_caixa") | Some("fluxo_de_caixa") => Self::Dfc,
            Some("projecao") | Some("projecao_caixa") => Self::Projecao,
            Some("sazonalidade") => Self::Sazonalidade,
            Some("kpis") | Some("kpi") | Some("indicadores") => Self::Kpis,
            Some("extratos") | Some("extrato") => Self::Extratos,
            Some("relatorio_gerencial") => Self::RelatorioGerencial,
            _ => Self::Transacoes,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Tabela,
    Grafico,
    Resumo,
    Completo,
    RelatorioGerencial,
}

impl OutputFormat {
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(normalize_tag).as_deref() {
            Some("tabela") => Self::Tabela,
            Some("grafico") | Some("graficos") => Self::Grafico,
            Some("completo") => Self::Completo,
            Some("relatorio_gerencial") => Self::RelatorioGerencial,
            _ => Self::Resumo,
        }
    }

    pub fn wants_charts(&self) -> bool {
        matches!(self, Self::Grafico | Self::Completo | Self::RelatorioGerencial)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    #[default]
    PeriodoAnterior,
    AnoAnterior,
}

impl Baseline {
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(normalize_tag).as_deref() {
            Some("ano_anterior") | Some("mesmo_periodo_ano_anterior") => Self::AnoAnterior,
            _ => Self::PeriodoAnterior,
        }
    }

    pub fn window_for(&self, window: &DateWindow) -> DateWindow {
        match self {
            Self::PeriodoAnterior => window.previous(),
            Self::AnoAnterior => window.shift_years(-1),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Hoje,
    UltimoMes,
    Mes,
    UltimoTrimestre,
    UltimoAno,
    AnoAtual,
    ProximosMeses,
    MesEspecifico,
    Personalizado,
}

impl PeriodKind {
    pub const TAGS: [&'static str; 7] = [
        "hoje",
        "ultimo_mes",
        "mes",
        "ultimo_trimestre",
        "ultimo_ano",
        "ano_atual",
        "proximos_meses",
    ];

    pub fn from_tag(raw: &str) -> Option<Self> {
        match normalize_tag(raw).as_str() {
            "hoje" => Some(Self::Hoje),
            "ultimo_mes" | "mes_passado" => Some(Self::UltimoMes),
            "mes" | "mes_atual" | "este_mes" => Some(Self::Mes),
            "ultimo_trimestre" | "trimestre" => Some(Self::UltimoTrimestre),
            "ultimo_ano" | "ano_passado" => Some(Self::UltimoAno),
            "ano_atual" | "este_ano" | "ano" => Some(Self::AnoAtual),
            "proximos_meses" | "proximo_trimestre" | "futuro" => Some(Self::ProximosMeses),
            "mes_especifico" => Some(Self::MesEspecifico),
            "personalizado" => Some(Self::Personalizado),
            _ => None,
        }
    }
}

/// `"Relatório Gerencial"` -> `"relatorio_gerencial"`.
fn normalize_tag(raw: &str) -> String {
    fold(raw.trim())
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub kind: PeriodKind,
}

impl ResolvedPeriod {
    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl PlanFilters {
    /// Lenient read of the model's `filters` object; blanks become `None`.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::default();
        };
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
                .map(str::to_string)
        };
        Self {
            group: text("group").or_else(|| text("grupo")),
            subgroup: text("subgroup").or_else(|| text("subgrupo")),
            category: text("category").or_else(|| text("categoria")),
            direction: text("direction")
                .or_else(|| text("tipo"))
                .and_then(|d| Direction::from_tag(&d)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comparison {
    pub enabled: bool,
    pub baseline: Baseline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub intent: Intent,
    pub data_type: DataType,
    pub period: ResolvedPeriod,
    pub filters: PlanFilters,
    pub output_format: OutputFormat,
    pub comparison: Comparison,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PlanFailure>,
}

impl Plan {
    /// An `intent=error` plan carrying the failure that produced it.
    pub fn failed(error: &AssistantError, period: ResolvedPeriod) -> Self {
        Self {
            intent: Intent::Error,
            data_type: DataType::Transacoes,
            period,
            filters: PlanFilters::default(),
            output_format: OutputFormat::Resumo,
            comparison: Comparison::default(),
            error: Some(PlanFailure {
                kind: error.kind(),
                message: error.detail(),
            }),
        }
    }

    pub fn window(&self) -> DateWindow {
        self.period.window()
    }

    pub fn is_management_report(&self) -> bool {
        self.intent == Intent::RelatorioGerencial || self.data_type == DataType::RelatorioGerencial
    }

    pub fn wants_comparison(&self) -> bool {
        self.comparison.enabled || self.intent == Intent::Comparacao
    }

    /// Turns an error plan back into the error it carries.
    pub fn into_result(self) -> crate::error::Result<Self> {
        match (&self.intent, &self.error) {
            (Intent::Error, Some(failure)) => Err(AssistantError::from_kind(
                failure.kind,
                failure.message.clone(),
            )),
            (Intent::Error, None) => Err(AssistantError::format("Planner produced an error plan")),
            _ => Ok(self),
        }
    }
}

/// The shape the planner asks the model to emit. Only used to render the
/// JSON schema into the prompt; parsing is lenient and goes through
/// [`serde_json::Value`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawPlan {
    #[schemars(
        description = "One of: consulta, relatorio, relatorio_gerencial, analise, estatistica, comparacao"
    )]
    pub intent: String,

    #[schemars(
        description = "One of: transacoes, contratos, contas, dre, dfc, projecao, sazonalidade, kpis, extratos, relatorio_gerencial"
    )]
    pub data_type: String,

    pub period: RawPeriod,

    #[serde(default)]
    pub filters: RawFilters,

    #[schemars(description = "One of: tabela, grafico, resumo, completo, relatorio_gerencial")]
    pub output_format: String,

    #[serde(default)]
    pub comparison: RawComparison,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawPeriod {
    #[schemars(
        description = "Relative period tag: hoje, ultimo_mes, mes, ultimo_trimestre, ultimo_ano, ano_atual, proximos_meses"
    )]
    pub kind: Option<String>,

    #[schemars(description = "Explicit start date, YYYY-MM-DD")]
    pub start: Option<String>,

    #[schemars(description = "Explicit end date, YYYY-MM-DD")]
    pub end: Option<String>,

    #[schemars(description = "Month name in Portuguese when the question names a month (e.g. outubro)")]
    pub month: Option<String>,

    #[schemars(description = "Four-digit year accompanying the month")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawFilters {
    #[schemars(description = "Group name mentioned in the question")]
    pub group: Option<String>,
    #[schemars(description = "Subgroup name mentioned in the question")]
    pub subgroup: Option<String>,
    #[schemars(description = "Category name, only when no group is mentioned")]
    pub category: Option<String>,
    #[schemars(description = "entrada or saida")]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawComparison {
    pub enabled: Option<bool>,
    #[schemars(description = "periodo_anterior or ano_anterior")]
    pub baseline: Option<String>,
}
