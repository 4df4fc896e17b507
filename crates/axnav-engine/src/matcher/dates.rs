//! Keyword variants for locating a date in calendar pickers.

use axnav_common::text::normalize_text;
use chrono::{Datelike, NaiveDate};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%B %d, %Y", "%B %d %Y", "%d %B %Y"];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    // Accept full timestamps by their date part.
    let candidate = trimmed.get(..10).filter(|s| s.len() == 10 && s.contains('-'));
    if let Some(date) = candidate.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()) {
        return Some(date);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

fn ordinal_suffix(day: u32) -> &'static str {
    match day {
        11..=13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    }
}

/// Lowercased spellings of `raw` as accessible names tend to show it:
/// "14 march 2026", "saturday, march 14, 2026", "3/14/2026", "14th", "14".
pub fn date_keywords(raw: &str) -> Vec<String> {
    let Some(date) = parse_date(raw) else {
        return Vec::new();
    };

    let day = date.day();
    let month = date.month();
    let year = date.year();
    let short_year = year % 100;
    let month_name = date.format("%B").to_string();
    let month_abbr = date.format("%b").to_string();
    let weekday = date.format("%A").to_string();
    let suffix = ordinal_suffix(day);

    let mut variants = vec![
        format!("{day} {month_name} {year}"),
        format!("{day} {month_abbr} {year}"),
        format!("{month_name} {day} {year}"),
        format!("{month_abbr} {day} {year}"),
        format!("{month_name} {day}, {year}"),
        format!("{weekday}, {month_name} {day}, {year}"),
        format!("{weekday}, {month_abbr} {day}, {year}"),
        format!("{weekday} {day} {month_name} {year}"),
        format!("{month_name} {day}"),
        format!("{month_abbr} {day}"),
        format!("{day} {month_name}"),
        format!("{day} {month_abbr}"),
        format!("{day}/{month}/{year}"),
        format!("{month}/{day}/{year}"),
        format!("{month}/{day}/{short_year:02}"),
        format!("{day}/{month}/{short_year:02}"),
        date.format("%Y-%m-%d").to_string(),
        format!("{day}{suffix} {month_name}"),
        format!("{day}{suffix} {month_name} {year}"),
        format!("{day}{suffix}"),
        format!("{day:02}"),
        day.to_string(),
    ];

    variants.iter_mut().for_each(|v| *v = v.to_lowercase());
    let mut seen = std::collections::HashSet::new();
    variants.retain(|v| seen.insert(v.clone()));
    variants
}

/// Day-only variants ("14", "14th") must equal the whole name; longer
/// variants may appear anywhere in it on word boundaries.
pub fn date_matches(keywords: &[String], text: &str) -> bool {
    if text.is_empty() || keywords.is_empty() {
        return false;
    }
    let name = normalize_text(text);
    keywords.iter().any(|kw| {
        if kw.len() <= 4 {
            name == *kw
        } else {
            contains_word(&name, kw)
        }
    })
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
