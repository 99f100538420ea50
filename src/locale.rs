//! pt-BR conventions: accent folding, month names, currency and date
//! formatting, and the lenient money/date parsers used by the importer.

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const MONTHS_PT: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "marco",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

const MONTH_LABELS: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

const ABBR_PT: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

const ABBR_EN: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:$|[Tt\s])").expect("valid ISO date regex")
});

static BR_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{2}|\d{4})(?:$|[Tt\s])")
        .expect("valid dd/mm/yyyy regex")
});

static NAMED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?:\s+de\s+|[\s./-]+)([a-z]{3,9})\.?(?:\s+de\s+|[\s./-]+)(\d{2}|\d{4})$")
        .expect("valid named date regex")
});

static NAMED_DATE_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})$").expect("valid english date regex")
});

static EXCEL_SERIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{5})(?:\.0+)?$").expect("valid serial regex"));

/// Lowercases and strips diacritics: `"Relatório Gerencial"` -> `"relatorio gerencial"`.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Case- and accent-insensitive substring test.
pub fn contains_folded(haystack: &str, needle: &str) -> bool {
    fold(haystack).contains(&fold(needle))
}

/// Month number (1-12) for a pt-BR or English month name, abbreviation, or
/// numeric string.
pub fn month_from_name(raw: &str) -> Option<u32> {
    let folded = fold(raw.trim().trim_end_matches('.'));
    if let Ok(number) = folded.parse::<u32>() {
        return (1..=12).contains(&number).then_some(number);
    }
    if let Some(idx) = MONTHS_PT.iter().position(|m| *m == folded) {
        return Some(idx as u32 + 1);
    }
    if folded.len() < 3 || !folded.is_ascii() {
        return None;
    }
    let prefix = &folded[..3];
    ABBR_PT
        .iter()
        .position(|m| *m == prefix)
        .or_else(|| ABBR_EN.iter().position(|m| *m == prefix))
        .map(|idx| idx as u32 + 1)
}

pub fn month_label(month: u32) -> &'static str {
    MONTH_LABELS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("")
}

/// Finds "<mês> [de] <ano>" inside free text, e.g. "transações em outubro 2024".
pub fn find_month_year(text: &str) -> Option<(u32, i32)> {
    let folded = fold(text);
    let words: Vec<&str> = folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    for (idx, word) in words.iter().enumerate() {
        let Some(month) = MONTHS_PT.iter().position(|m| m == word) else {
            continue;
        };
        let mut next = idx + 1;
        if words.get(next) == Some(&"de") {
            next += 1;
        }
        if let Some(year) = words.get(next).and_then(|w| w.parse::<i32>().ok()) {
            if (1900..=2200).contains(&year) {
                return Some((month as u32 + 1, year));
            }
        }
    }
    None
}

/// `R$ 1.234,56`; negatives render as `-R$ 1.234,56`.
pub fn format_brl(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    format!(
        "{}R$ {},{}",
        if negative { "-" } else { "" },
        group_thousands(int_part),
        frac_part
    )
}

/// One-decimal pt-BR percentage (`30,0%`); `signed` prefixes positive values
/// with `+`.
pub fn format_percent(value: Decimal, signed: bool) -> String {
    let text = format!("{:.1}", value.round_dp(1)).replace('.', ",");
    if signed && value > Decimal::ZERO {
        format!("+{}%", text)
    } else {
        format!("{}%", text)
    }
}

pub fn format_date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}

/// Lenient money parser. Strips currency symbols and thousand separators;
/// the last `,` or `.` followed by one or two digits is the decimal mark.
/// Parentheses or a leading/trailing minus make the value negative.
pub fn parse_money(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let negative = trimmed.starts_with('-')
        || trimmed.ends_with('-')
        || trimmed.starts_with('\u{2212}')
        || (trimmed.starts_with('(') && trimmed.ends_with(')'))
        || trimmed.contains("-R$")
        || trimmed.contains("R$ -")
        || trimmed.contains("R$-");

    let kept: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match kept.rfind([',', '.']) {
        Some(idx) => {
            let decimals = kept.len() - idx - 1;
            if decimals == 1 || decimals == 2 {
                let int_part: String = kept[..idx].chars().filter(|c| c.is_ascii_digit()).collect();
                format!(
                    "{}.{}",
                    if int_part.is_empty() { "0" } else { &int_part },
                    &kept[idx + 1..]
                )
            } else {
                kept.chars().filter(|c| c.is_ascii_digit()).collect()
            }
        }
        None => kept,
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(match raw.len() {
        2 if year < 70 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

/// Locale-aware date parser: `DD/MM/YYYY`, `DD-MM-YYYY`, `DD.MM.YYYY`,
/// `YYYY-MM-DD`, two-digit years, month names (`15 de janeiro de 2024`,
/// `15-jan-24`, `Jan 15, 2024`), trailing times, and Excel serial numbers.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = fold(raw.trim());
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_DATE.captures(&text) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    if let Some(caps) = BR_DATE.captures(&text) {
        return NaiveDate::from_ymd_opt(
            expand_year(&caps[3])?,
            caps[2].parse().ok()?,
            caps[1].parse().ok()?,
        );
    }

    if let Some(caps) = NAMED_DATE.captures(&text) {
        return NaiveDate::from_ymd_opt(
            expand_year(&caps[3])?,
            month_from_name(&caps[2])?,
            caps[1].parse().ok()?,
        );
    }

    if let Some(caps) = NAMED_DATE_EN.captures(&text) {
        return NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            month_from_name(&caps[1])?,
            caps[2].parse().ok()?,
        );
    }

    if let Some(caps) = EXCEL_SERIAL.captures(&text) {
        let serial: i64 = caps[1].parse().ok()?;
        if (20_000..=80_000).contains(&serial) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            return epoch.checked_add_signed(Duration::days(serial));
        }
    }

    None
}

/// `"outubro de 2024"` style label for a month.
pub fn month_year_label(date: NaiveDate) -> String {
    format!("{} de {}", month_label(date.month()), date.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_fold_strips_accents() {
        assert_eq!(fold("Relatório Gerencial"), "relatorio gerencial");
        assert_eq!(fold("Último TRIMESTRE"), "ultimo trimestre");
        assert_eq!(fold("Lançamento"), "lancamento");
    }

    #[test]
    fn test_month_from_name() {
        assert_eq!(month_from_name("Março"), Some(3));
        assert_eq!(month_from_name("outubro"), Some(10));
        assert_eq!(month_from_name("SET"), Some(9));
        assert_eq!(month_from_name("dec."), Some(12));
        assert_eq!(month_from_name("7"), Some(7));
        assert_eq!(month_from_name("13"), None);
        assert_eq!(month_from_name("xy"), None);
    }

    #[test]
    fn test_find_month_year() {
        assert_eq!(find_month_year("quais transações em outubro 2024?"), Some((10, 2024)));
        assert_eq!(find_month_year("DRE de março de 2023"), Some((3, 2023)));
        assert_eq!(find_month_year("DRE do último mês"), None);
    }

    #[test]
    fn test_format_brl() {
        assert_eq!(format_brl(dec!(1234.56)), "R$ 1.234,56");
        assert_eq!(format_brl(dec!(0)), "R$ 0,00");
        assert_eq!(format_brl(dec!(1234567.5)), "R$ 1.234.567,50");
        assert_eq!(format_brl(dec!(-500)), "-R$ 500,00");
        assert_eq!(format_brl(dec!(999)), "R$ 999,00");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(dec!(30), false), "30,0%");
        assert_eq!(format_percent(dec!(25), true), "+25,0%");
        assert_eq!(format_percent(dec!(-12.34), true), "-12,3%");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("R$ 1.234,56"), Some(dec!(1234.56)));
        assert_eq!(parse_money("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_money("-150,00"), Some(dec!(-150.00)));
        assert_eq!(parse_money("(80,5)"), Some(dec!(-80.5)));
        assert_eq!(parse_money("1.234"), Some(dec!(1234)));
        assert_eq!(parse_money("42"), Some(dec!(42)));
        assert_eq!(parse_money("200,00-"), Some(dec!(-200.00)));
        assert_eq!(parse_money("abc"), None);
        assert_eq!(parse_money(""), None);
    }

    #[test]
    fn test_parse_money_single_trailing_digit_is_decimal() {
        // Spreadsheet exports drop the trailing zero of "1,50".
        assert_eq!(parse_money("1.5"), Some(dec!(1.5)));
        assert_eq!(parse_money("1,5"), Some(dec!(1.5)));
        assert_eq!(parse_money("1.234,5"), Some(dec!(1234.5)));
        // Three digits after the last separator are thousands.
        assert_eq!(parse_money("1.500"), Some(dec!(1500)));
        assert_eq!(parse_money("12.345.678"), Some(dec!(12345678)));
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = d(2024, 1, 15);
        for raw in [
            "15/01/2024",
            "15-01-2024",
            "15.01.2024",
            "2024-01-15",
            "2024/01/15",
            "15/01/24",
            "15 de janeiro de 2024",
            "15-jan-2024",
            "15/Jan/24",
            "Jan 15, 2024",
            "2024-01-15 00:00:00",
            "2024-01-15T10:30:00",
            "45306",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "failed on {}", raw);
        }
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date("32/01/2024"), None);
        assert_eq!(parse_date("pagamento"), None);
        assert_eq!(parse_date("150,00"), None);
        assert_eq!(parse_date("29/02/2023"), None);
    }

    #[test]
    fn test_two_digit_year_pivot() {
        assert_eq!(parse_date("01/02/99"), Some(d(1999, 2, 1)));
        assert_eq!(parse_date("01/02/05"), Some(d(2005, 2, 1)));
    }
}
