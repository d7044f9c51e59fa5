//! Pull a single SQL statement out of free-form model output.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap();
    static ref LINE_START_KEYWORD: Regex = Regex::new(
        r"(?im)^[ \t]*(SELECT|WITH|SHOW|DESCRIBE|EXPLAIN|VALUES|INSERT|UPDATE|DELETE)\b"
    )
    .unwrap();
    static ref INLINE_KEYWORD: Regex =
        Regex::new(r"\b(SELECT|WITH|SHOW|DESCRIBE|EXPLAIN|VALUES|INSERT|UPDATE|DELETE)\b").unwrap();
    static ref BLANK_LINE: Regex = Regex::new(r"\n[ \t]*\r?\n").unwrap();
}

/// Words that may legitimately start a paragraph of a multi-paragraph query.
const CONTINUATION_WORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN", "INNER",
    "LEFT", "RIGHT", "FULL", "CROSS", "UNION", "EXCEPT", "INTERSECT", "AND", "OR", "ON", "WITH",
    "CASE", "WHEN", "THEN", "ELSE", "END", "AS", "WINDOW",
];

/// Returns the statement text, or `None` if nothing statement-like is present.
pub fn extract_statement(raw: &str) -> Option<String> {
    let body = match FENCED_BLOCK.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw,
    };

    let cleaned = strip_comments(body);

    // Prefer a keyword at the start of a line; fall back to an uppercase
    // keyword mid-sentence ("Here is the query: SELECT ...").
    let start = LINE_START_KEYWORD
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .or_else(|| INLINE_KEYWORD.find(&cleaned))?
        .start();

    let statement = cut_at_semicolon(&cleaned[start..]);
    let statement = drop_trailing_prose(statement).trim();

    if statement.is_empty() {
        None
    } else {
        Some(statement.to_string())
    }
}

/// Removes `--` and `/* */` comments outside string literals and quoted identifiers.
pub fn strip_comments(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = quoted_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Index one past the closing quote of the quoted run starting at `start`.
/// Doubled quotes inside the run are escapes.
pub(crate) fn quoted_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn cut_at_semicolon(sql: &str) -> &str {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let plain: Vec<char> = chars.iter().map(|(_, c)| *c).collect();
    let mut i = 0;
    while i < plain.len() {
        match plain[i] {
            '\'' | '"' | '`' => i = quoted_end(&plain, i),
            ';' => return &sql[..chars[i].0],
            _ => i += 1,
        }
    }
    sql
}

/// Keeps paragraphs while they still look like SQL.
fn drop_trailing_prose(sql: &str) -> &str {
    let mut end = sql.len();
    for m in BLANK_LINE.find_iter(sql) {
        let rest = sql[m.end()..].trim_start();
        let first_word: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        let continues = rest.starts_with(['(', ')', ',', '"'])
            || CONTINUATION_WORDS.contains(&first_word.to_uppercase().as_str());
        if !continues {
            end = m.start();
            break;
        }
    }
    &sql[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_statement_passes_through() {
        assert_eq!(
            extract_statement("SELECT COUNT(*) FROM films").as_deref(),
            Some("SELECT COUNT(*) FROM films")
        );
    }

    #[test]
    fn test_markdown_fence_and_prose() {
        let raw = "Sure! Here is the query:\n```sql\nSELECT film\nFROM films;\n```\nThis lists films.";
        assert_eq!(extract_statement(raw).as_deref(), Some("SELECT film\nFROM films"));
    }

    #[test]
    fn test_inline_statement_after_prose() {
        let raw = "The answer with counts is: SELECT COUNT(*) FROM films";
        assert_eq!(extract_statement(raw).as_deref(), Some("SELECT COUNT(*) FROM films"));
    }

    #[test]
    fn test_comments_removed_but_literals_kept() {
        let raw = "SELECT film -- the title\nFROM films /* all */ WHERE film = 'a--b;c'";
        assert_eq!(
            extract_statement(raw).as_deref(),
            Some("SELECT film \nFROM films   WHERE film = 'a--b;c'")
        );
    }

    #[test]
    fn test_trailing_explanation_dropped() {
        let raw = "SELECT film\nFROM films\n\nORDER BY film\n\nThis query returns every film.";
        assert_eq!(extract_statement(raw).as_deref(), Some("SELECT film\nFROM films\n\nORDER BY film"));
    }

    #[test]
    fn test_no_statement() {
        assert_eq!(extract_statement(""), None);
        assert_eq!(extract_statement("I cannot answer that question."), None);
        assert_eq!(extract_statement("```\n```"), None);
    }
}
