//! Entity extraction
//!
//! Pulls the filter-relevant pieces out of a question: date windows,
//! status values, quoted literals, row limits and grouping hints, plus the
//! content terms used to match tables and columns.
//!
//! Date windows use an exclusive end: `[start, end)`.

use crate::classifier::{compile, IntentPatterns, PatternError};
use crate::text;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Size of the single extracted date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGranularity {
    Day,
    Month,
    Quarter,
    Year,
    /// Several windows, or one longer than a year
    Range,
    Unknown,
}

/// Half-open date window `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,

    /// Source text or period name
    pub label: String,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    /// Window covering a single day
    pub fn day(day: NaiveDate, label: impl Into<String>) -> Self {
        Self::new(day, day + Duration::days(1), label)
    }

    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Requested sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderHint {
    Asc,
    Desc,
}

/// Aggregate functions the planner can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunc {
    Avg,
    Sum,
    Max,
    Min,
}

impl AggregateFunc {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Avg => "AVG",
            Self::Sum => "SUM",
            Self::Max => "MAX",
            Self::Min => "MIN",
        }
    }

    /// MIN and MAX also apply to dates
    pub fn accepts_temporal(&self) -> bool {
        matches!(self, Self::Max | Self::Min)
    }
}

impl std::fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Everything extracted from one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub normalized_question: String,

    /// Content words used for table and column matching
    pub terms: Vec<String>,

    pub date_ranges: Vec<DateRange>,

    pub date_granularity: DateGranularity,

    /// Status values, in canonical form
    pub statuses: Vec<String>,

    /// Quoted values, original casing
    pub literals: Vec<String>,

    pub limit: Option<u64>,

    pub order_hint: Option<OrderHint>,

    /// Words following "por" / "by" / "agrupado por"
    pub group_by_terms: Vec<String>,

    /// Aggregate function named in the question
    pub aggregate: Option<AggregateFunc>,

    pub reasons: Vec<String>,
}

impl ExtractedEntities {
    /// Entities of an empty question
    pub fn empty() -> Self {
        Self {
            normalized_question: String::new(),
            terms: Vec::new(),
            date_ranges: Vec::new(),
            date_granularity: DateGranularity::Unknown,
            statuses: Vec::new(),
            literals: Vec::new(),
            limit: None,
            order_hint: None,
            group_by_terms: Vec::new(),
            aggregate: None,
            reasons: vec!["empty_input".to_string()],
        }
    }

    pub fn wants_grouping(&self) -> bool {
        !self.group_by_terms.is_empty()
    }
}

const MONTHS: &[(&str, u32)] = &[
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    ("ene", 1),
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("abr", 4),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("ago", 8),
    ("aug", 8),
    ("sep", 9),
    ("set", 9),
    ("oct", 10),
    ("nov", 11),
    ("dic", 12),
    ("dec", 12),
];

const STATUS_VOCAB: &[&str] = &[
    "programada",
    "pendiente",
    "confirmada",
    "completada",
    "realizada",
    "cancelada",
    "rechazada",
    "reprogramada",
    "no_show",
    "ausente",
    "en_proceso",
    "pending",
    "confirmed",
    "completed",
    "cancelled",
    "canceled",
    "rejected",
];

/// Period and quantity words that never name a table or column
const NOISE_WORDS: &[&str] = &[
    "hoy", "ayer", "manana", "today", "yesterday", "tomorrow", "ano", "anos", "year", "years",
    "mes", "meses", "month", "months", "dia", "dias", "day", "days", "semana", "semanas", "week",
    "weeks", "trimestre", "quarter", "semestre", "pasado", "pasada", "proximo", "proxima", "next",
    "last", "this", "first", "top", "primeros", "primeras", "primer", "ultimos", "ultimas",
    "ultimo", "tabla", "tablas", "table", "tables", "registros", "registro", "records", "rows",
    "filas", "datos", "data", "informacion", "hasta", "desde", "al", "y", "q1", "q2", "q3", "q4",
    "cada", "each", "per", "estado", "status", "mayor", "menor",
];

const DATE_TOKEN: &str = r"(?:(?:19|20)\d{2}-\d{1,2}-\d{1,2}|\d{1,2}/\d{1,2}/(?:19|20)\d{2}|\d{1,2}\s+(?:de\s+)?[a-z]+\s+(?:del?\s+)?(?:19|20)\d{2})";

/// Compiled extraction rules
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    keywords: IntentPatterns,
    between: Regex,
    iso_date: Regex,
    dmy_date: Regex,
    day_month_year: Regex,
    quarter_short: Regex,
    quarter_long: Regex,
    month_year: Regex,
    year: Regex,
    last_n_days: Regex,
    limit: Regex,
    status_kv: Regex,
    quoted: Regex,
    grouping: Regex,
    aggregates: Vec<(Regex, AggregateFunc)>,
}

impl EntityExtractor {
    /// Build an extractor; `keywords` are excluded from content terms
    pub fn new(keywords: &IntentPatterns) -> Result<Self, PatternError> {
        let month_alt = {
            let mut names: Vec<&str> = MONTHS.iter().map(|(n, _)| *n).collect();
            names.sort_by_key(|n| std::cmp::Reverse(n.len()));
            names.join("|")
        };

        Ok(Self {
            keywords: keywords.clone(),
            between: compile(&format!(
                r"\b(?:entre|del|desde|between|from)\s+({d})\s+(?:y|al|hasta|and|to)\s+({d})\b",
                d = DATE_TOKEN
            ))?,
            iso_date: compile(r"\b((?:19|20)\d{2})-(\d{1,2})-(\d{1,2})\b")?,
            dmy_date: compile(r"\b(\d{1,2})/(\d{1,2})/((?:19|20)\d{2})\b")?,
            day_month_year: compile(r"\b(\d{1,2})\s+(?:de\s+)?([a-z]+)\s+(?:del?\s+)?((?:19|20)\d{2})\b")?,
            quarter_short: compile(r"\b[qt]\s*([1-4])\s*(?:de\s+|del\s+)?((?:19|20)\d{2})\b")?,
            quarter_long: compile(
                r"\b(?:(primer|1er|1o|segundo|2do|2o|tercer|3er|3o|cuarto|4to|4o)\s+trimestre|trimestre\s+([1-4]))\s+(?:de\s+|del\s+)?((?:19|20)\d{2})\b",
            )?,
            month_year: compile(&format!(
                r"\b({})\s+(?:de\s+|del\s+|of\s+)?((?:19|20)\d{{2}})\b",
                month_alt
            ))?,
            year: compile(r"\b(?:19|20)\d{2}\b")?,
            last_n_days: compile(r"\b(?:ultim(?:os|as)|last|past)\s+(\d{1,4})\s+(dias|days|semanas|weeks)\b")?,
            limit: compile(
                r"\b(top|primer(?:os|as)?|first|ultim(?:os|as)?|last)\s*(\d{1,5})\b(?:\s+(dias|days|semanas|weeks|meses|months))?",
            )?,
            status_kv: compile(r"\bestad(?:o|us)\s*[:=]\s*([a-z0-9_]+)\b")?,
            quoted: compile(r#""([^"]+)"|'([^']+)'"#)?,
            grouping: compile(r"\b(?:agrupad[oa]s?\s+por|group(?:ed)?\s+by|por|by|per)\s+(?:cada\s+|each\s+)?([a-z_][a-z0-9_]{2,})\b")?,
            aggregates: vec![
                (compile(r"\b(?:promedio|media|avg|average)\b")?, AggregateFunc::Avg),
                (compile(r"\b(?:max(?:imo|imum)?|mayor)\b")?, AggregateFunc::Max),
                (compile(r"\b(?:min(?:imo|imum)?|menor)\b")?, AggregateFunc::Min),
                (compile(r"\b(?:suma(?:toria)?|sum|total(?:es)?)\b")?, AggregateFunc::Sum),
            ],
        })
    }

    /// Extract entities; `today` anchors relative periods
    pub fn extract(&self, question: &str, today: NaiveDate) -> ExtractedEntities {
        let normalized = text::normalize(question);
        if normalized.is_empty() {
            return ExtractedEntities::empty();
        }

        let mut reasons = Vec::new();

        let literals: Vec<String> = self
            .quoted
            .captures_iter(question)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !literals.is_empty() {
            reasons.push(format!("literals:{}", literals.len()));
        }

        let unquoted = self.quoted.replace_all(&normalized, " ").into_owned();

        let (limit, order_hint) = self.limit_and_order(&unquoted);
        if let Some(n) = limit {
            reasons.push(format!("limit:{}", n));
        }

        let statuses = self.statuses(&unquoted);
        if !statuses.is_empty() {
            reasons.push(format!("statuses:{}", statuses.join(",")));
        }

        let date_ranges = self.date_ranges(&unquoted, today, &mut reasons);
        let date_granularity = granularity(&date_ranges);

        let group_by_terms: Vec<String> = self
            .grouping
            .captures_iter(&unquoted)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|w| !text::is_stopword(w) && !is_period_word(w))
            .fold(Vec::new(), push_unique);
        if !group_by_terms.is_empty() {
            reasons.push(format!("group_by:{}", group_by_terms.join(",")));
        }

        let aggregate = self
            .aggregates
            .iter()
            .find(|(rx, _)| rx.is_match(&unquoted))
            .map(|(_, func)| *func);

        let terms = text::tokenize(&unquoted)
            .into_iter()
            .filter(|t| self.is_content_term(t))
            .fold(Vec::new(), push_unique);

        ExtractedEntities {
            normalized_question: normalized,
            terms,
            date_ranges,
            date_granularity,
            statuses,
            literals,
            limit,
            order_hint,
            group_by_terms,
            aggregate,
            reasons,
        }
    }

    fn is_content_term(&self, token: &str) -> bool {
        token.len() > 1
            && !token.chars().all(|c| c.is_ascii_digit())
            && !text::is_stopword(token)
            && !NOISE_WORDS.contains(&token)
            && month_number(token).is_none()
            && canonical_status(token).is_none()
            && !self.keywords.is_keyword(token)
    }

    fn limit_and_order(&self, normalized: &str) -> (Option<u64>, Option<OrderHint>) {
        for caps in self.limit.captures_iter(normalized) {
            // "ultimos 7 dias" is a period, not a row limit
            if caps.get(3).is_some() {
                continue;
            }
            let n = match caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok()) {
                Some(n) if n > 0 => n,
                _ => continue,
            };
            let word = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let order = if word.starts_with("primer") || word == "first" {
                OrderHint::Asc
            } else {
                OrderHint::Desc
            };
            return (Some(n), Some(order));
        }
        (None, None)
    }

    fn statuses(&self, normalized: &str) -> Vec<String> {
        let explicit = self
            .status_kv
            .captures_iter(normalized)
            .filter_map(|c| c.get(1))
            .map(|m| canonical_status(m.as_str()).unwrap_or(m.as_str()).to_string());

        let vocabulary = text::tokenize(normalized)
            .into_iter()
            .filter_map(|t| canonical_status(&t).map(str::to_string));

        explicit.chain(vocabulary).fold(Vec::new(), push_unique)
    }

    fn date_ranges(
        &self,
        normalized: &str,
        today: NaiveDate,
        reasons: &mut Vec<String>,
    ) -> Vec<DateRange> {
        let mut found = Vec::new();
        let mut consumed: Vec<(usize, usize)> = Vec::new();
        let take = |start: usize, end: usize, consumed: &mut Vec<(usize, usize)>| {
            if consumed.iter().any(|&(s, e)| start < e && s < end) {
                false
            } else {
                consumed.push((start, end));
                true
            }
        };

        for caps in self.between.captures_iter(normalized) {
            let (Some(whole), Some(left), Some(right)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let (Some(from), Some(to)) = (self.parse_date(left.as_str()), self.parse_date(right.as_str()))
            else {
                continue;
            };
            if !take(whole.start(), whole.end(), &mut consumed) {
                continue;
            }
            let (start, last) = if to < from { (to, from) } else { (from, to) };
            found.push(DateRange::new(
                start,
                last + Duration::days(1),
                format!("{} - {}", left.as_str(), right.as_str()),
            ));
            reasons.push("date:between".to_string());
        }

        for rx in [&self.iso_date, &self.dmy_date, &self.day_month_year] {
            for m in rx.find_iter(normalized) {
                if let Some(day) = self.parse_date(m.as_str()) {
                    if take(m.start(), m.end(), &mut consumed) {
                        found.push(DateRange::day(day, m.as_str()));
                        reasons.push("date:day".to_string());
                    }
                }
            }
        }

        for caps in self.quarter_short.captures_iter(normalized) {
            let whole = caps.get(0);
            let quarter = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            let year = caps.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
            if let (Some(whole), Some(q), Some(y)) = (whole, quarter, year) {
                if let Some(range) = quarter_range(y, q) {
                    if take(whole.start(), whole.end(), &mut consumed) {
                        found.push(range);
                        reasons.push("date:quarter".to_string());
                    }
                }
            }
        }

        for caps in self.quarter_long.captures_iter(normalized) {
            let quarter = caps
                .get(1)
                .and_then(|m| ordinal_quarter(m.as_str()))
                .or_else(|| caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()));
            let year = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok());
            if let (Some(whole), Some(q), Some(y)) = (caps.get(0), quarter, year) {
                if let Some(range) = quarter_range(y, q) {
                    if take(whole.start(), whole.end(), &mut consumed) {
                        found.push(range);
                        reasons.push("date:quarter".to_string());
                    }
                }
            }
        }

        for caps in self.month_year.captures_iter(normalized) {
            let month = caps.get(1).and_then(|m| month_number(m.as_str()));
            let year = caps.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
            if let (Some(whole), Some(m), Some(y)) = (caps.get(0), month, year) {
                if let Some((start, end)) = month_bounds(y, m) {
                    if take(whole.start(), whole.end(), &mut consumed) {
                        found.push(DateRange::new(start, end, whole.as_str()));
                        reasons.push("date:month".to_string());
                    }
                }
            }
        }

        for m in self.year.find_iter(normalized) {
            if let Ok(y) = m.as_str().parse::<i32>() {
                if let Some(range) = year_range(y, m.as_str()) {
                    if take(m.start(), m.end(), &mut consumed) {
                        found.push(range);
                        reasons.push("date:year".to_string());
                    }
                }
            }
        }

        for caps in self.last_n_days.captures_iter(normalized) {
            let n = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok());
            let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("dias");
            if let Some(n) = n.filter(|n| *n > 0) {
                let days = if unit.starts_with("sem") || unit.starts_with("week") {
                    n * 7
                } else {
                    n
                };
                let end = today + Duration::days(1);
                found.push(DateRange::new(end - Duration::days(days), end, format!("last {} days", days)));
                reasons.push("date:last_n_days".to_string());
            }
        }

        for (range, reason) in relative_periods(normalized, today) {
            found.push(range);
            reasons.push(reason);
        }

        let mut unique: Vec<DateRange> = Vec::new();
        for range in found {
            if !unique.iter().any(|r| r.start == range.start && r.end == range.end) {
                unique.push(range);
            }
        }
        unique
    }

    fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        let full = |rx: &Regex| {
            rx.captures(raw)
                .filter(|c| c.get(0).map(|m| m.len() == raw.len()).unwrap_or(false))
        };

        if let Some(c) = full(&self.iso_date) {
            return safe_date(num(&c, 1)?, num(&c, 2)? as u32, num(&c, 3)? as u32);
        }
        if let Some(c) = full(&self.dmy_date) {
            return safe_date(num(&c, 3)?, num(&c, 2)? as u32, num(&c, 1)? as u32);
        }
        if let Some(c) = full(&self.day_month_year) {
            let month = month_number(c.get(2)?.as_str())?;
            return safe_date(num(&c, 3)?, month, num(&c, 1)? as u32);
        }
        None
    }
}

fn num(caps: &regex::Captures<'_>, idx: usize) -> Option<i32> {
    caps.get(idx)?.as_str().parse().ok()
}

fn push_unique(mut acc: Vec<String>, item: String) -> Vec<String> {
    if !acc.contains(&item) {
        acc.push(item);
    }
    acc
}

fn month_number(word: &str) -> Option<u32> {
    MONTHS.iter().find(|(n, _)| *n == word).map(|(_, m)| *m)
}

fn canonical_status(token: &str) -> Option<&'static str> {
    STATUS_VOCAB
        .iter()
        .find(|s| text::same_word(token, s))
        .copied()
}

fn is_period_word(word: &str) -> bool {
    NOISE_WORDS.contains(&word) || month_number(word).is_some()
}

fn ordinal_quarter(word: &str) -> Option<u32> {
    match word {
        "primer" | "1er" | "1o" => Some(1),
        "segundo" | "2do" | "2o" => Some(2),
        "tercer" | "3er" | "3o" => Some(3),
        "cuarto" | "4to" | "4o" => Some(4),
        _ => None,
    }
}

/// Clamp the day into the month, as "31/02/2025" still means late February
fn safe_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let (first, next) = month_bounds(year, month)?;
    let last_day = (next - Duration::days(1)).day();
    first.with_day(day.clamp(1, last_day))
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

fn quarter_range(year: i32, quarter: u32) -> Option<DateRange> {
    let first_month = (quarter.checked_sub(1)?) * 3 + 1;
    let start = NaiveDate::from_ymd_opt(year, first_month, 1)?;
    let (_, end) = month_bounds(year, first_month + 2)?;
    Some(DateRange::new(start, end, format!("Q{} {}", quarter, year)))
}

fn year_range(year: i32, label: &str) -> Option<DateRange> {
    Some(DateRange::new(
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?,
        label,
    ))
}

fn relative_periods(normalized: &str, today: NaiveDate) -> Vec<(DateRange, String)> {
    let has = |words: &[&str]| {
        let padded = format!(" {} ", normalized.replace(|c: char| !c.is_ascii_alphanumeric(), " "));
        words.iter().any(|w| padded.contains(&format!(" {} ", w)))
    };
    let mut out = Vec::new();

    if has(&["hoy", "today"]) {
        out.push((DateRange::day(today, "today"), "relative:today".to_string()));
    }
    if has(&["ayer", "yesterday"]) {
        out.push((DateRange::day(today - Duration::days(1), "yesterday"), "relative:yesterday".to_string()));
    }
    if has(&["manana", "tomorrow"]) {
        out.push((DateRange::day(today + Duration::days(1), "tomorrow"), "relative:tomorrow".to_string()));
    }

    let year = today.year();
    if has(&["este ano", "this year"]) {
        out.extend(year_range(year, "this year").map(|r| (r, "relative:this_year".to_string())));
    }
    if has(&["ano pasado", "last year"]) {
        out.extend(year_range(year - 1, "last year").map(|r| (r, "relative:last_year".to_string())));
    }
    if has(&["proximo ano", "next year"]) {
        out.extend(year_range(year + 1, "next year").map(|r| (r, "relative:next_year".to_string())));
    }

    let month = today.month();
    let (prev_y, prev_m) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    let (next_y, next_m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let months = [
        (&["este mes", "this month"][..], year, month, "this month"),
        (&["mes pasado", "last month"][..], prev_y, prev_m, "last month"),
        (&["proximo mes", "next month"][..], next_y, next_m, "next month"),
    ];
    for (words, y, m, label) in months {
        if has(words) {
            if let Some((start, end)) = month_bounds(y, m) {
                out.push((
                    DateRange::new(start, end, label),
                    format!("relative:{}", label.replace(' ', "_")),
                ));
            }
        }
    }

    let quarter = (month - 1) / 3 + 1;
    if has(&["este trimestre", "this quarter"]) {
        out.extend(quarter_range(year, quarter).map(|r| (r, "relative:this_quarter".to_string())));
    }
    if has(&["trimestre pasado", "last quarter"]) {
        let (y, q) = if quarter == 1 { (year - 1, 4) } else { (year, quarter - 1) };
        out.extend(quarter_range(y, q).map(|r| (r, "relative:last_quarter".to_string())));
    }

    out
}

fn granularity(ranges: &[DateRange]) -> DateGranularity {
    match ranges {
        [] => DateGranularity::Unknown,
        [single] => match single.span_days() {
            d if d <= 1 => DateGranularity::Day,
            d if d <= 32 => DateGranularity::Month,
            d if d <= 93 => DateGranularity::Quarter,
            d if d <= 370 => DateGranularity::Year,
            _ => DateGranularity::Range,
        },
        _ => DateGranularity::Range,
    }
}
