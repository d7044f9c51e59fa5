//! Cosmetic normalization: keyword case, explicit joins and a fixed layout.
//!
//! Operates on tokens, never on raw text, so literals and quoted identifiers
//! pass through untouched and the output is a fixed point.

use super::dialect;
use super::extract::quoted_end;
use super::format_log::FormatLog;

const INDENT: &str = "  ";
const LIST_INDENT: &str = "    ";

const JOIN_MODIFIERS: &[&str] = &["INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Quoted,
    Literal,
    Symbol,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    space_before: bool,
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut space_before = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            space_before = true;
            i += 1;
            continue;
        }

        let (kind, end) = match c {
            '\'' => (TokenKind::Literal, quoted_end(&chars, i)),
            '"' | '`' => (TokenKind::Quoted, quoted_end(&chars, i)),
            c if is_word_char(c) => {
                let mut end = i;
                while end < chars.len() && is_word_char(chars[end]) {
                    end += 1;
                }
                (TokenKind::Word, end)
            }
            _ => (TokenKind::Symbol, i + 1),
        };

        tokens.push(Token {
            kind,
            text: chars[i..end].iter().collect(),
            space_before,
        });
        space_before = false;
        i = end;
    }

    tokens
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Select,
    GroupBy,
    OrderBy,
    Other,
}

impl Clause {
    fn is_list(self) -> bool {
        matches!(self, Clause::Select | Clause::GroupBy | Clause::OrderBy)
    }
}

/// One parenthesis level. Only query levels (the top level and subqueries)
/// get clause line breaks.
#[derive(Debug, Clone, Copy)]
struct Level {
    query: bool,
    clause: Clause,
}

fn word_upper(token: Option<&Token>) -> Option<String> {
    token
        .filter(|t| t.kind == TokenKind::Word)
        .map(|t| t.text.to_uppercase())
}

fn is_join_modifier(word: Option<&str>) -> bool {
    word.map_or(false, |w| JOIN_MODIFIERS.contains(&w))
}

/// Clause keyword that should start a new line, and the clause it opens.
fn clause_start(upper: &str, prev: Option<&str>, next: Option<&str>, next_is_paren: bool) -> Option<Clause> {
    match upper {
        "SELECT" => Some(Clause::Select),
        "FROM" if prev != Some("DISTINCT") => Some(Clause::Other),
        "WHERE" | "HAVING" | "LIMIT" | "OFFSET" | "UNION" | "EXCEPT" | "INTERSECT" | "WINDOW" => {
            Some(Clause::Other)
        }
        "GROUP" if next == Some("BY") => Some(Clause::GroupBy),
        "ORDER" if next == Some("BY") => Some(Clause::OrderBy),
        "JOIN" if !is_join_modifier(prev) => Some(Clause::Other),
        "INNER" | "LEFT" | "RIGHT" | "FULL" | "CROSS" | "NATURAL" if !next_is_paren && !is_join_modifier(prev) => {
            Some(Clause::Other)
        }
        _ => None,
    }
}

/// `standardize(standardize(x)) == standardize(x)`.
pub fn standardize(sql: &str, log: &mut FormatLog) -> String {
    let tokens = tokenize(sql);
    let mut out = String::with_capacity(sql.len() + 32);
    let mut levels = vec![Level {
        query: true,
        clause: Clause::Other,
    }];

    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|p| tokens.get(p));
        let next = tokens.get(i + 1);
        let prev_upper = word_upper(prev);
        let next_upper = word_upper(next);
        let next_is_paren = next.map_or(false, |t| t.text == "(");
        let depth = levels.len() - 1;
        let level = levels[depth];

        let mut text = token.text.clone();
        let mut opens = None;
        let mut explicit_join = false;

        if token.kind == TokenKind::Word {
            let upper = token.text.to_uppercase();
            let is_type_after_as = prev_upper.as_deref() == Some("AS") && dialect::is_datatype(&upper);
            let is_call = next_is_paren && (dialect::is_allowed_function(&upper) || dialect::is_datatype(&upper));
            if dialect::is_keyword(&upper) || is_call || is_type_after_as {
                log.record("Uppercasing keywords", &text, &upper);
                text = upper.clone();
            }
            if level.query {
                opens = clause_start(&upper, prev_upper.as_deref(), next_upper.as_deref(), next_is_paren);
            }
            explicit_join = upper == "JOIN" && !is_join_modifier(prev_upper.as_deref());
        }

        if i > 0 {
            let after_list_comma =
                level.query && level.clause.is_list() && prev.map_or(false, |p| p.text == ",");
            if opens.is_some() {
                out.push('\n');
                out.push_str(&INDENT.repeat(depth));
            } else if after_list_comma {
                out.push('\n');
                out.push_str(&INDENT.repeat(depth));
                out.push_str(LIST_INDENT);
            } else if token.space_before {
                out.push(' ');
            }
        }

        if explicit_join {
            log.record("Making joins explicit", "JOIN", "INNER JOIN");
            out.push_str("INNER ");
        }
        out.push_str(&text);

        if let Some(clause) = opens {
            levels[depth].clause = clause;
        }
        match token.text.as_str() {
            "(" if token.kind == TokenKind::Symbol => {
                let query = matches!(next_upper.as_deref(), Some("SELECT") | Some("WITH"));
                levels.push(Level {
                    query,
                    clause: Clause::Other,
                });
            }
            ")" if token.kind == TokenKind::Symbol && levels.len() > 1 => {
                levels.pop();
            }
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(sql: &str) -> String {
        let once = standardize(sql, &mut FormatLog::new());
        let twice = standardize(&once, &mut FormatLog::new());
        assert_eq!(once, twice, "standardize is not idempotent for {:?}", sql);
        once
    }

    #[test]
    fn test_clauses_and_lists_on_their_own_lines() {
        let sql = r#"select film, count(*) as "n" from "awsdatacatalog"."pixar"."films" f join x on f.a = x.a where a = 1 group by film order by n desc limit 5"#;
        assert_eq!(
            run(sql),
            "SELECT film,\n    COUNT(*) AS \"n\"\n\
             FROM \"awsdatacatalog\".\"pixar\".\"films\" f\n\
             INNER JOIN x ON f.a = x.a\n\
             WHERE a = 1\n\
             GROUP BY film\n\
             ORDER BY n DESC\n\
             LIMIT 5"
        );
    }

    #[test]
    fn test_subquery_indented_and_in_list_inline() {
        assert_eq!(
            run("select * from (select a, b from t) where a in (1, 2)"),
            "SELECT *\nFROM (\n  SELECT a,\n      b\n  FROM t)\nWHERE a IN (1, 2)"
        );
    }

    #[test]
    fn test_window_and_function_parens_not_broken() {
        assert_eq!(
            run("select row_number() over (partition by a order by b) as rn, extract(year from d) from t"),
            "SELECT ROW_NUMBER() OVER (PARTITION BY a ORDER BY b) AS rn,\n    EXTRACT(year FROM d)\nFROM t"
        );
    }

    #[test]
    fn test_existing_join_modifiers_kept() {
        assert_eq!(
            run("select a from t left join u on t.id = u.id left outer join v on v.id = t.id"),
            "SELECT a\nFROM t\nLEFT JOIN u ON t.id = u.id\nLEFT OUTER JOIN v ON v.id = t.id"
        );
    }

    #[test]
    fn test_literals_and_quoted_identifiers_untouched() {
        assert_eq!(
            run("select 'from  x' as s, \"select\" from t"),
            "SELECT 'from  x' AS s,\n    \"select\"\nFROM t"
        );
    }

    #[test]
    fn test_cast_types_uppercased() {
        assert_eq!(
            run("select cast(a as varchar), cast(b as decimal(10, 2)) from t"),
            "SELECT CAST(a AS VARCHAR),\n    CAST(b AS DECIMAL(10, 2))\nFROM t"
        );
    }

    #[test]
    fn test_log_mentions_explicit_join() {
        let mut log = FormatLog::new();
        standardize("SELECT a FROM t JOIN u ON t.id = u.id", &mut log);
        assert!(log.render().iter().any(|l| l.contains("JOIN -> INNER JOIN")));
    }
}
