//! System prompt for SQL generation and its failed-attempt augmentation.

use sqlbench_types::FailedAttempt;

pub const SQL_GENERATOR_INSTRUCTION: &str = "
You are a READ ONLY SQL SELECT Statement Generator API for the schema below ONLY.
Generate only queries that access data, not modify it:
no UPDATE, INSERT, DELETE or any other statements that attempt to change the data.
Respond to questions in a way that can be interpreted programmatically:
no extra narrative, punctuation, delimiters or escape sequences like backticks.
";

const FAILED_ATTEMPTS_PREAMBLE: &str = "\nTake into account the following past failed attempts at generating a SQL query when creating the query to avoid the same mistakes:\n";

/// Instruction followed by the schema DDL, one statement block per line group.
pub fn system_prompt(schema: &[&str]) -> String {
    format!("{}{}", SQL_GENERATOR_INSTRUCTION, schema.join("\n"))
}

/// Append the history of failed attempts to `base`, oldest first. Returns `base` unchanged when empty.
pub fn build(base: &str, failed_attempts: &[FailedAttempt]) -> String {
    if failed_attempts.is_empty() {
        return base.to_string();
    }

    let mut prompt = String::with_capacity(base.len() + FAILED_ATTEMPTS_PREAMBLE.len() + failed_attempts.len() * 128);
    prompt.push_str(base);
    prompt.push_str(FAILED_ATTEMPTS_PREAMBLE);
    for attempt in failed_attempts {
        prompt.push_str(&format!(
            "Generated failed sql query: '{}'; Error message explaining why it failed: '{}'\n",
            collapse_whitespace(&attempt.sql),
            strip_newlines(&attempt.error),
        ));
    }
    prompt
}

/// Collapse every whitespace run into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SQL is often emitted multi-line but runs fine on one line.
pub fn strip_newlines(s: &str) -> String {
    s.replace("\r\n", " ").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(sql: &str, error: &str) -> FailedAttempt {
        FailedAttempt { sql: sql.to_string(), error: error.to_string() }
    }

    #[test]
    fn empty_history_returns_base() {
        assert_eq!(build("base prompt", &[]), "base prompt");
    }

    #[test]
    fn history_is_appended_after_base() {
        let prompt = build("BASE", &[attempt("SELECT  *\n  FROM Customer", "no such table:\nCustomer")]);
        assert!(prompt.starts_with("BASE\nTake into account"));

        let sql_at = prompt.find("'SELECT * FROM Customer'").unwrap();
        let err_at = prompt.find("'no such table: Customer'").unwrap();
        assert!(sql_at < err_at);
        assert!(prompt.ends_with("'\n"));
    }

    #[test]
    fn attempts_keep_their_order() {
        let prompt = build("B", &[attempt("SELECT a", "e1"), attempt("SELECT b", "e2"), attempt("SELECT c", "e3")]);
        let a = prompt.find("SELECT a").unwrap();
        let b = prompt.find("SELECT b").unwrap();
        let c = prompt.find("SELECT c").unwrap();
        assert!(a < b && b < c);
        assert_eq!(prompt.matches("Generated failed sql query").count(), 3);
    }

    #[test]
    fn build_is_deterministic() {
        let history = vec![attempt("SELECT x", "bad column")];
        assert_eq!(build("B", &history), build("B", &history));
    }

    #[test]
    fn system_prompt_embeds_schema() {
        let prompt = system_prompt(&["CREATE TABLE A (id INTEGER);", "CREATE TABLE B (id INTEGER);"]);
        assert!(prompt.starts_with(SQL_GENERATOR_INSTRUCTION));
        assert!(prompt.ends_with("CREATE TABLE A (id INTEGER);\nCREATE TABLE B (id INTEGER);"));
    }

    #[test]
    fn whitespace_helpers() {
        assert_eq!(collapse_whitespace("  SELECT\t1\n\nFROM  t "), "SELECT 1 FROM t");
        assert_eq!(strip_newlines("a\nb\r\nc"), "a b c");
    }
}
