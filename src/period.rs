use crate::locale::{find_month_year, month_from_name, parse_date};
use crate::plan::{PeriodKind, ResolvedPeriod};
use crate::utils::{first_day_of_month, last_day_of_month, month_end, parse_period_string, shift_month_start};
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde_json::Value;

/// Turns the planner's loose period object into a concrete inclusive window.
/// Resolution is total: every input yields `start <= end`.
#[derive(Debug, Clone, Copy)]
pub struct PeriodResolver {
    today: NaiveDate,
    horizon_months: u32,
}

impl PeriodResolver {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            horizon_months: 3,
        }
    }

    pub fn with_horizon(mut self, months: u32) -> Self {
        self.horizon_months = months.max(1);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn resolve(&self, period: Option<&Value>, question: Option<&str>) -> ResolvedPeriod {
        let object = period.and_then(Value::as_object);
        let field = |key: &str| object.and_then(|map| map.get(key));

        if let Some(resolved) = self.explicit(field("start"), field("end")) {
            return resolved;
        }

        if let Some(month) = field("month").and_then(month_of) {
            let year = field("year").and_then(year_of);
            return self.named_month(month, year);
        }

        if let Some(kind) = field("kind")
            .or_else(|| field("type"))
            .and_then(Value::as_str)
            .and_then(PeriodKind::from_tag)
        {
            if !matches!(kind, PeriodKind::MesEspecifico | PeriodKind::Personalizado) {
                return self.resolve_kind(kind);
            }
        }

        // A bare string period such as "ultimo_trimestre" or "2024-10".
        if let Some(text) = period.and_then(Value::as_str) {
            if let Some(kind) = PeriodKind::from_tag(text) {
                return self.resolve_kind(kind);
            }
            if let Ok((start, end)) = parse_period_string(text) {
                return ordered(start, end, PeriodKind::Personalizado);
            }
        }

        if let Some((month, year)) = question.and_then(find_month_year) {
            debug!("Period taken from question text: {}/{}", month, year);
            return self.named_month(month, Some(year));
        }

        self.resolve_kind(PeriodKind::UltimoMes)
    }

    pub fn resolve_kind(&self, kind: PeriodKind) -> ResolvedPeriod {
        let today = self.today;
        let (start, end) = match kind {
            PeriodKind::Hoje => (today, today),
            PeriodKind::UltimoTrimestre => (shift_month_start(today, -3), today),
            PeriodKind::UltimoAno => (first_day_of_month(today.year() - 1, 1), today),
            PeriodKind::AnoAtual => (first_day_of_month(today.year(), 1), today),
            PeriodKind::ProximosMeses => (
                shift_month_start(today, 1),
                month_end(shift_month_start(today, self.horizon_months as i32)),
            ),
            PeriodKind::UltimoMes
            | PeriodKind::Mes
            | PeriodKind::MesEspecifico
            | PeriodKind::Personalizado => (shift_month_start(today, -1), today),
        };
        let kind = match kind {
            PeriodKind::MesEspecifico | PeriodKind::Personalizado => PeriodKind::UltimoMes,
            other => other,
        };
        ordered(start, end, kind)
    }

    /// First to last day of a month. Without a year, the most recent
    /// occurrence that does not lie in the future.
    pub fn named_month(&self, month: u32, year: Option<i32>) -> ResolvedPeriod {
        let year = year.unwrap_or_else(|| {
            if month > self.today.month() {
                self.today.year() - 1
            } else {
                self.today.year()
            }
        });
        ResolvedPeriod {
            start: first_day_of_month(year, month),
            end: last_day_of_month(year, month),
            kind: PeriodKind::MesEspecifico,
        }
    }

    fn explicit(&self, start: Option<&Value>, end: Option<&Value>) -> Option<ResolvedPeriod> {
        let start_text = start.and_then(Value::as_str)?;
        let (start, start_month_end) = parse_bound(start_text)?;
        let end = match end.and_then(Value::as_str).and_then(parse_bound) {
            Some((_, end)) => end,
            None if start_month_end != start => start_month_end,
            None => start.max(self.today),
        };
        Some(ordered(start, end, PeriodKind::Personalizado))
    }
}

/// A date bound, or a whole `YYYY-MM` month returned as (first, last) day.
fn parse_bound(raw: &str) -> Option<(NaiveDate, NaiveDate)> {
    if let Some(date) = parse_date(raw) {
        return Some((date, date));
    }
    parse_period_string(raw).ok()
}

fn ordered(a: NaiveDate, b: NaiveDate, kind: PeriodKind) -> ResolvedPeriod {
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    ResolvedPeriod { start, end, kind }
}

fn month_of(value: &Value) -> Option<u32> {
    match value {
        Value::String(text) => month_from_name(text),
        Value::Number(n) => n.as_u64().filter(|m| (1..=12).contains(m)).map(|m| m as u32),
        _ => None,
    }
}

fn year_of(value: &Value) -> Option<i32> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(n) => n.as_i64().map(|y| y as i32),
        _ => None,
    }
    .filter(|y| (1900..=2200).contains(y))
}
