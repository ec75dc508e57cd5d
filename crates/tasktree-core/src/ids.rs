use std::collections::HashSet;

use chrono::{DateTime, TimeZone};
use regex::Regex;
use ulid::Ulid;

pub fn new_uid() -> String {
    Ulid::new().to_string()
}

/// `YYMMDD` stem shared by every id created on that day.
pub fn date_stem<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%y%m%d").to_string()
}

/// Bijective base-26 letters: 0 -> a, 25 -> z, 26 -> aa.
pub fn letter_suffix(mut n: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'a' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.iter().rev().collect()
}

fn suffix_index(suffix: &str) -> Option<usize> {
    let mut n: usize = 0;
    for c in suffix.chars() {
        if !c.is_ascii_lowercase() {
            return None;
        }
        n = n.checked_mul(26)?.checked_add((c as u8 - b'a') as usize + 1)?;
    }
    n.checked_sub(1)
}

pub fn used_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> HashSet<String> {
    ids.into_iter().map(|id| id.to_lowercase()).collect()
}

/// First free `stem + suffix`, starting at suffix `a`.
pub fn generate_id(stem: &str, used: &HashSet<String>) -> String {
    first_free(stem, 0, used)
}

/// Collision-avoidance for an id that already exists in a store.
///
/// Date-shaped ids (`260122a`) advance their letter suffix; anything else gets
/// a numeric `-N` suffix.
pub fn next_free_id(id: &str, used: &HashSet<String>) -> String {
    let re = Regex::new(r"^(\d{6})([a-z]+)$").expect("regex");
    let lowered = id.to_lowercase();
    if let Some(caps) = re.captures(&lowered) {
        let stem = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let start = caps
            .get(2)
            .and_then(|m| suffix_index(m.as_str()))
            .map(|n| n + 1)
            .unwrap_or(0);
        return first_free(stem, start, used);
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", id, n);
        if !used.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

fn first_free(stem: &str, start: usize, used: &HashSet<String>) -> String {
    let mut n = start;
    loop {
        let candidate = format!("{}{}", stem, letter_suffix(n));
        if !used.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}
