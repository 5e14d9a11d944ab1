//! Line-oriented console report of a gate run.

use std::fmt;

const ITEM_INDENT: &str = "  ";

/// Ordered report lines, rendered verbatim to stdout by the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    lines: Vec<String>,
}

impl GateReport {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A top-level line.
    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    /// An indented list entry.
    pub fn item(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("{ITEM_INDENT}- {}", text.as_ref()));
    }

    /// An indented success entry.
    pub fn ok(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("{ITEM_INDENT}[ok] {}", text.as_ref()));
    }

    /// An indented failure entry.
    pub fn fail(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("{ITEM_INDENT}[fail] {}", text.as_ref()));
    }

    /// A non-blocking warning.
    pub fn warn(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("warning: {}", text.as_ref()));
    }

    /// A list of values under a heading, or the heading with `none`.
    pub fn list<I, S>(&mut self, heading: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<S> = values.into_iter().collect();
        if values.is_empty() {
            self.line(format!("{heading}: none"));
            return;
        }
        self.line(format!("{heading} ({}):", values.len()));
        for value in values {
            self.item(value);
        }
    }

    /// All lines in order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for GateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lines_in_order() {
        let mut report = GateReport::new();
        report.line("Comparing a..b");
        report.list("Changed files", ["x.sql", "y.rs"]);
        report.ok("abc: approved");
        report.fail("def: rejected");
        report.warn("judge advisory");

        assert_eq!(
            report.to_string(),
            "Comparing a..b\nChanged files (2):\n  - x.sql\n  - y.rs\n  [ok] abc: approved\n  [fail] def: rejected\nwarning: judge advisory\n"
        );
    }

    #[test]
    fn empty_list_says_none() {
        let mut report = GateReport::new();
        report.list::<_, &str>("References found", []);
        assert_eq!(report.lines(), ["References found: none"]);
    }
}
