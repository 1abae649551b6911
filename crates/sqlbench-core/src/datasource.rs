use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use sqlbench_types::GroundTruthItem;

/// Where the (question, reference SQL, reference result) triples come from.
#[async_trait]
pub trait GroundTruthSource: Send + Sync {
    async fn load(&self) -> Result<Vec<GroundTruthItem>>;
}

pub struct VecGroundTruth {
    items: Vec<GroundTruthItem>,
}

impl VecGroundTruth {
    pub fn new(items: Vec<GroundTruthItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl GroundTruthSource for VecGroundTruth {
    async fn load(&self) -> Result<Vec<GroundTruthItem>> {
        Ok(self.items.clone())
    }
}

/// CSV with a header row and the columns `query, sql, result` in that order.
/// Rows with fewer than three fields are skipped.
pub struct CsvGroundTruth {
    path: PathBuf,
}

impl CsvGroundTruth {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GroundTruthSource for CsvGroundTruth {
    async fn load(&self) -> Result<Vec<GroundTruthItem>> {
        let content = read_to_string(&self.path).await?;
        parse_csv(&content).with_context(|| format!("Invalid ground truth CSV {:?}", self.path))
    }
}

pub fn parse_csv(content: &str) -> Result<Vec<GroundTruthItem>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut items = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Row {}", idx + 1))?;
        if record.len() < 3 {
            tracing::warn!(row = idx + 1, fields = record.len(), "skipping short ground truth row");
            continue;
        }
        items.push(GroundTruthItem::new(&record[0], &record[1], &record[2]));
    }
    Ok(items)
}

/// The first pipe table in a markdown document, with columns `query | sql | result`.
pub struct MarkdownGroundTruth {
    path: PathBuf,
}

impl MarkdownGroundTruth {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GroundTruthSource for MarkdownGroundTruth {
    async fn load(&self) -> Result<Vec<GroundTruthItem>> {
        let content = read_to_string(&self.path).await?;
        let rows = parse_markdown_table(&content)
            .ok_or_else(|| anyhow!("No table found in {:?}", self.path))?;
        Ok(rows
            .into_iter()
            .skip(1)
            .filter(|r| r.len() >= 3)
            .map(|r| GroundTruthItem::new(r[0].clone(), r[1].clone(), r[2].clone()))
            .collect())
    }
}

/// Pick a source by file extension: `.md`/`.markdown` or anything else as CSV.
pub fn source_for_path(path: impl Into<PathBuf>) -> Box<dyn GroundTruthSource> {
    let path = path.into();
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") | Some("markdown") => Box::new(MarkdownGroundTruth::new(path)),
        _ => Box::new(CsvGroundTruth::new(path)),
    }
}

/// Rows of the first pipe table, header included, separator excluded. Cells are trimmed,
/// stripped of enclosing backticks, and `\|` is unescaped.
pub fn parse_markdown_table(markdown: &str) -> Option<Vec<Vec<String>>> {
    let lines: Vec<&str> = markdown.lines().collect();
    let start = lines.windows(2).position(|w| is_table_row(w[0]) && is_separator(w[1]))?;

    let mut rows = vec![split_cells(lines[start])];
    for line in &lines[start + 2..] {
        if !is_table_row(line) {
            break;
        }
        rows.push(split_cells(line));
    }
    Some(rows)
}

fn is_table_row(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

fn is_separator(line: &str) -> bool {
    let cells = split_raw(line);
    !cells.is_empty()
        && cells.iter().all(|c| {
            let c = c.trim();
            c.contains('-') && c.chars().all(|ch| ch == '-' || ch == ':')
        })
}

/// Split on unescaped pipes, dropping the leading and trailing empty cells.
fn split_raw(line: &str) -> Vec<String> {
    let line = line.trim();
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                current.push_str("\\|");
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    cells.push(current);

    if line.starts_with('|') {
        cells.remove(0);
    }
    if line.ends_with('|') && !line.ends_with("\\|") {
        cells.pop();
    }
    cells
}

fn split_cells(line: &str) -> Vec<String> {
    split_raw(line).iter().map(|c| clean_cell(c)).collect()
}

fn clean_cell(cell: &str) -> String {
    let mut s = cell.trim();
    while s.len() >= 2 && s.starts_with('`') && s.ends_with('`') {
        s = s[1..s.len() - 1].trim();
    }
    s.replace("\\|", "|")
}

/// Convert the first table of a markdown file to CSV next to it (`<file>.csv`) and return that path.
pub async fn markdown_to_csv(path: &Path) -> Result<PathBuf> {
    let content = read_to_string(path).await?;
    let rows = parse_markdown_table(&content).ok_or_else(|| anyhow!("No table found in {:?}", path))?;

    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for row in &rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow!(e.to_string()))?;

    let mut out = path.as_os_str().to_owned();
    out.push(".csv");
    let out = PathBuf::from(out);
    tokio::fs::write(&out, bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", out))?;
    tracing::debug!(from = ?path, to = ?out, rows = rows.len() - 1, "converted ground truth table");
    Ok(out)
}

async fn read_to_string(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}
