//! Record of rewrites applied while formatting one query.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Change {
    before: String,
    after: String,
    count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RuleEntry {
    rule: &'static str,
    changes: Vec<Change>,
}

#[derive(Debug, Clone, Default)]
pub struct FormatLog {
    entries: Vec<RuleEntry>,
}

impl FormatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one rewrite. No-op rewrites are ignored; repeats are counted.
    pub fn record(&mut self, rule: &'static str, before: &str, after: &str) {
        if before == after {
            return;
        }

        let entry = match self.entries.iter_mut().position(|e| e.rule == rule) {
            Some(idx) => &mut self.entries[idx],
            None => {
                self.entries.push(RuleEntry {
                    rule,
                    changes: Vec::new(),
                });
                let last = self.entries.len() - 1;
                &mut self.entries[last]
            }
        };

        match entry
            .changes
            .iter_mut()
            .find(|c| c.before == before && c.after == after)
        {
            Some(change) => change.count += 1,
            None => entry.changes.push(Change {
                before: before.to_string(),
                after: after.to_string(),
                count: 1,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Numbered, human readable lines:
    /// `1. Quoting aliases` followed by `   a. AS total -> AS "total"`.
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, entry.rule));
            for (j, change) in entry.changes.iter().enumerate() {
                let label = sub_label(j);
                let repeat = if change.count > 1 {
                    format!(" (x{})", change.count)
                } else {
                    String::new()
                };
                lines.push(format!(
                    "   {}. {} -> {}{}",
                    label,
                    one_line(&change.before),
                    one_line(&change.after),
                    repeat
                ));
            }
        }
        lines
    }
}

fn sub_label(idx: usize) -> String {
    if idx < 26 {
        ((b'a' + idx as u8) as char).to_string()
    } else {
        (idx + 1).to_string()
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_are_counted_and_noops_ignored() {
        let mut log = FormatLog::new();
        log.record("Replacing functions", "IFNULL(", "COALESCE(");
        log.record("Replacing functions", "IFNULL(", "COALESCE(");
        log.record("Replacing functions", "NVL(", "COALESCE(");
        log.record("Quoting aliases", "AS total", "AS total");

        assert_eq!(
            log.render(),
            vec![
                "1. Replacing functions".to_string(),
                "   a. IFNULL( -> COALESCE( (x2)".to_string(),
                "   b. NVL( -> COALESCE(".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_log_renders_nothing() {
        let log = FormatLog::new();
        assert!(log.is_empty());
        assert!(log.render().is_empty());
    }
}
