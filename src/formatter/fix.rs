//! Dialect fixes: rewrite common model mistakes into valid Athena SQL.
//!
//! Every rule is idempotent and runs on text whose string literals have been
//! masked, so literal contents are never rewritten.

use super::dialect;
use super::extract::quoted_end;
use super::format_log::FormatLog;
use crate::schema::{SchemaContext, TableDescriptor};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashSet;

const FUNCTION_SIMILARITY_CUTOFF: f64 = 0.85;

const IDENT: &str = r#"(?:`[^`]+`|"[^"]+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

lazy_static! {
    static ref MASKED_LITERAL: Regex = Regex::new(r"\x01(\d+)\x01").unwrap();
    static ref DESCRIBE: Regex = Regex::new(r"(?i)^(\s*)DESCRIBE\s+(?:TABLE\s+)?").unwrap();
    static ref SHOW_CREATE: Regex = Regex::new(&format!(
        r"(?i)^(\s*SHOW\s+CREATE\s+TABLE\s+)({0}(?:\s*\.\s*{0}){{0,2}})",
        IDENT
    ))
    .unwrap();
    static ref DATETIME_CALL: Regex = Regex::new(
        r"(?i)\b(CURRENT_TIMESTAMP|CURRENT_DATE|CURRENT_TIME|LOCALTIMESTAMP|LOCALTIME)\s*\(\s*\)"
    )
    .unwrap();
    static ref DATE_SHIFT: Regex = Regex::new(
        r"(?i)\b(DATE_SUB|DATE_ADD)\s*\(\s*((?:[^,()]|\([^()]*\))+?)\s*,\s*INTERVAL\s+(\S+?)\s+([A-Za-z]+)\s*\)"
    )
    .unwrap();
    static ref INTERVAL_NUMBER: Regex = Regex::new(r"(?i)\bINTERVAL\s+(-?\d+)\s+([A-Za-z]+)\b").unwrap();
    static ref CAST_OPEN: Regex = Regex::new(r"(?i)\b(?:TRY_)?CAST\s*\(").unwrap();
    static ref AS_TYPE: Regex = Regex::new(r"(?i)\bAS\s+([A-Za-z][A-Za-z0-9_]*)").unwrap();
    static ref ALIAS: Regex = Regex::new(r"(?i)\bAS\s+(?:([A-Za-z_][A-Za-z0-9_]*)|`([^`]+)`)").unwrap();
    static ref FUNCTION_CALL: Regex = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)(\s*)\(").unwrap();
    static ref DATE_DIFF_UNIT: Regex = Regex::new(r"(?i)\bDATE_DIFF\s*\(\s*([A-Za-z_]+)\s*,").unwrap();
    static ref STRAY_RAND: Regex = Regex::new(r"(\s)RAND(\s+)([^\s(])").unwrap();
    static ref TABLE_REF: Regex = Regex::new(&format!(
        r"(?i)\b(FROM|JOIN)(\s+)({0}(?:\s*\.\s*{0}){{0,2}})",
        IDENT
    ))
    .unwrap();
    static ref CTE_NAME: Regex = Regex::new(
        r#"(?i)(?:\bWITH\s+(?:RECURSIVE\s+)?|\)\s*,\s*)"?([A-Za-z_][A-Za-z0-9_]*)"?\s+AS\s*\("#
    )
    .unwrap();
}

/// Apply every dialect rule in order. `fix(fix(x)) == fix(x)`.
pub fn fix(sql: &str, schema: &SchemaContext, log: &mut FormatLog) -> String {
    let masked = mask_literals(sql);
    let mut rw = Rewriter {
        literals: masked.literals,
        log,
    };

    let mut text = masked.text;
    text = rw.describe(&text);
    text = rw.show_create_table(&text, schema);
    text = rw.datetime_literals(&text);
    text = rw.date_shift(&text);
    text = rw.interval_numbers(&text);
    text = rw.cast_types(&text);
    text = rw.aliases(&text);
    text = rw.functions(&text, schema);
    text = rw.date_diff_units(&text);
    text = rw.stray_rand(&text);
    text = rw.qualify_tables(&text, schema);

    unmask(&text, &rw.literals)
}

struct Masked {
    text: String,
    literals: Vec<String>,
}

/// Replace each `'...'` literal with a `\x01n\x01` placeholder.
fn mask_literals(sql: &str) -> Masked {
    let chars: Vec<char> = sql.chars().collect();
    let mut text = String::with_capacity(sql.len());
    let mut literals = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\'' => {
                let end = quoted_end(&chars, i);
                literals.push(chars[i..end].iter().collect::<String>());
                text.push_str(&format!("\u{1}{}\u{1}", literals.len() - 1));
                i = end;
            }
            '"' | '`' => {
                let end = quoted_end(&chars, i);
                text.extend(&chars[i..end]);
                i = end;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Masked { text, literals }
}

fn unmask(text: &str, literals: &[String]) -> String {
    MASKED_LITERAL
        .replace_all(text, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| literals.get(idx))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Canonical unit name for date arithmetic, if recognised.
fn date_unit(unit: &str) -> Option<&'static str> {
    match unit.to_lowercase().as_str() {
        "ns" | "nanosecond" | "nanoseconds" | "us" | "microsecond" | "microseconds" | "ms"
        | "millisecond" | "milliseconds" => Some("millisecond"),
        "sec" | "second" | "seconds" => Some("second"),
        "min" | "minute" | "minutes" => Some("minute"),
        "hr" | "hour" | "hours" => Some("hour"),
        "day" | "days" => Some("day"),
        "wk" | "week" | "weeks" => Some("week"),
        "mon" | "month" | "months" => Some("month"),
        "quarter" | "quarters" => Some("quarter"),
        "yr" | "year" | "years" => Some("year"),
        _ => None,
    }
}

/// Split `a . "b".c` into its unquoted parts.
fn split_path(path: &str) -> Vec<String> {
    let chars: Vec<char> = path.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '"' | '`' => {
                let end = quoted_end(&chars, i);
                current.extend(&chars[i + 1..end.saturating_sub(1).max(i + 1)]);
                i = end;
            }
            '.' => {
                parts.push(std::mem::take(&mut current));
                i += 1;
            }
            c => {
                if !c.is_whitespace() {
                    current.push(c);
                }
                i += 1;
            }
        }
    }
    parts.push(current);
    parts
}

fn resolve_table<'s>(schema: &'s SchemaContext, parts: &[String]) -> Option<&'s TableDescriptor> {
    match parts {
        [name] => schema.find(None, None, name),
        [database, name] => schema.find(None, Some(database), name),
        [catalog, database, name] => schema.find(Some(catalog), Some(database), name),
        _ => None,
    }
}

fn cte_names(text: &str) -> HashSet<String> {
    CTE_NAME
        .captures_iter(text)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Byte index of the `)` closing the paren opened just before `from`.
fn matching_paren(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (idx, b) in text.bytes().enumerate().skip(from) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn paren_depth(text: &str) -> i64 {
    text.bytes().fold(0, |depth, b| match b {
        b'(' => depth + 1,
        b')' => depth - 1,
        _ => depth,
    })
}

struct Rewriter<'a> {
    literals: Vec<String>,
    log: &'a mut FormatLog,
}

impl Rewriter<'_> {
    fn record(&mut self, rule: &'static str, before: &str, after: &str) {
        let before = unmask(before, &self.literals);
        let after = unmask(after, &self.literals);
        self.log.record(rule, &before, &after);
    }

    /// `7`, `'7'` or a masked `'7'` as a number.
    fn literal_number(&self, token: &str) -> Option<i64> {
        unmask(token, &self.literals).trim_matches('\'').trim().parse().ok()
    }

    fn describe(&mut self, text: &str) -> String {
        DESCRIBE
            .replace(text, |caps: &Captures| {
                self.record("Replacing DESCRIBE", caps[0].trim(), "SHOW CREATE TABLE");
                format!("{}SHOW CREATE TABLE ", &caps[1])
            })
            .into_owned()
    }

    fn show_create_table(&mut self, text: &str, schema: &SchemaContext) -> String {
        SHOW_CREATE
            .replace(text, |caps: &Captures| {
                let parts = split_path(&caps[2]);
                match resolve_table(schema, &parts) {
                    Some(table) => {
                        let qualified = table.qualified_name_hive();
                        self.record("Qualifying SHOW CREATE TABLE", &caps[2], &qualified);
                        format!("{}{}", &caps[1], qualified)
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn datetime_literals(&mut self, text: &str) -> String {
        DATETIME_CALL
            .replace_all(text, |caps: &Captures| {
                let after = caps[1].to_uppercase();
                self.record("Removing brackets from datetime literals", &caps[0], &after);
                after
            })
            .into_owned()
    }

    /// `DATE_SUB(d, INTERVAL n unit)` → `DATE_ADD('unit', -n, d)`.
    fn date_shift(&mut self, text: &str) -> String {
        DATE_SHIFT
            .replace_all(text, |caps: &Captures| {
                let whole = caps[0].to_string();
                let (Some(amount), Some(unit)) = (self.literal_number(&caps[3]), date_unit(&caps[4])) else {
                    return whole;
                };
                let signed = if caps[1].eq_ignore_ascii_case("DATE_SUB") {
                    amount.checked_neg()
                } else {
                    Some(amount)
                };
                let Some(signed) = signed else {
                    return whole;
                };
                let after = format!("DATE_ADD('{}', {}, {})", unit, signed, caps[2].trim());
                self.record("Rewriting interval arithmetic", &whole, &after);
                after
            })
            .into_owned()
    }

    /// `INTERVAL 7 DAY` → `INTERVAL '7' DAY`; units Athena lacks are scaled.
    fn interval_numbers(&mut self, text: &str) -> String {
        INTERVAL_NUMBER
            .replace_all(text, |caps: &Captures| {
                let whole = &caps[0];
                let (Ok(n), Some(unit)) = (caps[1].parse::<i64>(), date_unit(&caps[2])) else {
                    return whole.to_string();
                };
                let (n, unit) = match unit {
                    "week" => (n.checked_mul(7), "day"),
                    "quarter" => (n.checked_mul(3), "month"),
                    "millisecond" => return whole.to_string(),
                    other => (Some(n), other),
                };
                let Some(n) = n else {
                    return whole.to_string();
                };
                let after = format!("INTERVAL '{}' {}", n, unit.to_uppercase());
                self.record("Quoting INTERVAL values", whole, &after);
                after
            })
            .into_owned()
    }

    fn cast_types(&mut self, text: &str) -> String {
        let opens: Vec<usize> = CAST_OPEN.find_iter(text).map(|m| m.end()).collect();
        let mut out = text.to_string();

        // Right to left so earlier offsets stay valid.
        for open in opens.into_iter().rev() {
            let Some(close) = matching_paren(&out, open) else {
                continue;
            };
            let rewrite = {
                let inner = &out[open..close];
                AS_TYPE
                    .captures_iter(inner)
                    .filter_map(|c| c.get(1))
                    .filter(|m| paren_depth(&inner[..m.start()]) == 0)
                    .last()
                    .and_then(|m| {
                        dialect::datatype_conversion(m.as_str())
                            .map(|target| (open + m.start()..open + m.end(), m.as_str().to_string(), target))
                    })
            };
            if let Some((range, before, target)) = rewrite {
                self.record("Mapping CAST datatypes", &before, target);
                out.replace_range(range, target);
            }
        }

        out
    }

    fn aliases(&mut self, text: &str) -> String {
        ALIAS
            .replace_all(text, |caps: &Captures| {
                let whole = &caps[0];
                let name = match (caps.get(1), caps.get(2)) {
                    (Some(bare), _) => {
                        if dialect::is_keyword(bare.as_str()) || dialect::is_datatype(bare.as_str()) {
                            return whole.to_string();
                        }
                        bare.as_str()
                    }
                    (None, Some(backticked)) => backticked.as_str(),
                    (None, None) => return whole.to_string(),
                };
                let after = format!("AS \"{}\"", name.replace('"', "\"\""));
                self.record("Quoting aliases", whole, &after);
                after
            })
            .into_owned()
    }

    /// Map foreign functions to Athena equivalents and near misses to the closest allowed name.
    fn functions(&mut self, text: &str, schema: &SchemaContext) -> String {
        let mut skip: HashSet<String> = schema.tables().iter().map(|t| t.name.to_lowercase()).collect();
        skip.extend(cte_names(text));

        FUNCTION_CALL
            .replace_all(text, |caps: &Captures| {
                let whole = &caps[0];
                let name = &caps[1];
                let start = caps.get(0).map_or(0, |m| m.start());
                let qualified = text[..start].ends_with(['.', '"', '`']);

                if qualified
                    || skip.contains(&name.to_lowercase())
                    || dialect::is_keyword(name)
                    || dialect::is_datatype(name)
                    || dialect::is_allowed_function(name)
                {
                    return whole.to_string();
                }

                let replacement = dialect::function_conversion(name)
                    .map(str::to_string)
                    .or_else(|| dialect::closest_function(name, FUNCTION_SIMILARITY_CUTOFF).map(str::to_uppercase));
                match replacement {
                    Some(new_name) => {
                        let after = format!("{}(", new_name);
                        self.record("Replacing functions", whole, &after);
                        after
                    }
                    None => whole.to_string(),
                }
            })
            .into_owned()
    }

    fn date_diff_units(&mut self, text: &str) -> String {
        DATE_DIFF_UNIT
            .replace_all(text, |caps: &Captures| match date_unit(&caps[1]) {
                Some(unit) => {
                    let after = format!("DATE_DIFF('{}',", unit);
                    self.record("Quoting DATE_DIFF units", &caps[0], &after);
                    after
                }
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    fn stray_rand(&mut self, text: &str) -> String {
        STRAY_RAND
            .replace_all(text, |caps: &Captures| {
                self.record("Fixing RAND", "RAND", "AND");
                format!("{}AND{}{}", &caps[1], &caps[2], &caps[3])
            })
            .into_owned()
    }

    /// Fully qualify FROM/JOIN references to known tables. CTEs and
    /// `information_schema` are left alone.
    fn qualify_tables(&mut self, text: &str, schema: &SchemaContext) -> String {
        let ctes = cte_names(text);

        TABLE_REF
            .replace_all(text, |caps: &Captures| {
                let original = caps[0].to_string();
                let parts = split_path(&caps[3]);
                if parts.iter().any(|p| p.eq_ignore_ascii_case("information_schema")) {
                    return original;
                }
                if parts.len() == 1 && ctes.contains(&parts[0].to_lowercase()) {
                    return original;
                }
                match resolve_table(schema, &parts) {
                    Some(table) => {
                        let qualified = table.qualified_name();
                        self.record("Qualifying tables", &caps[3], &qualified);
                        format!("{}{}{}", &caps[1], &caps[2], qualified)
                    }
                    None => original,
                }
            })
            .into_owned()
    }
}
