use std::collections::BTreeMap;

/// Number of parsed rows ever materialized for display.
pub const PREVIEW_ROW_LIMIT: usize = 5;

/// One parsed spreadsheet row: column name to cell text.
pub type PreviewRow = BTreeMap<String, String>;

/// Parsed rows kept for the preview table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewData {
    columns: Vec<String>,
    rows: Vec<PreviewRow>,
    total_rows: usize,
}

impl PreviewData {
    /// Keeps at most [`PREVIEW_ROW_LIMIT`] rows. `total_rows` is raised to the
    /// number of rows received if the server under-reported it.
    pub fn new(columns: Vec<String>, rows: Vec<PreviewRow>, total_rows: usize) -> Self {
        let total_rows = total_rows.max(rows.len());
        let mut rows = rows;
        rows.truncate(PREVIEW_ROW_LIMIT);
        Self {
            columns: dedupe_columns(columns),
            rows,
            total_rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[PreviewRow] {
        &self.rows
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Cells of each displayed row in column order; missing cells are empty.
    pub fn table(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| row.get(column).cloned().unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    pub fn caption(&self) -> String {
        let shown = PREVIEW_ROW_LIMIT.min(self.total_rows);
        format!(
            "First {} rows of {} total, {} columns",
            shown,
            self.total_rows,
            self.columns.len()
        )
    }
}

// Column names key the row maps, so a repeated header could never show
// distinct data anyway.
fn dedupe_columns(columns: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    columns
        .into_iter()
        .filter(|column| seen.insert(column.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> PreviewRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn caps_rows_and_keeps_total() {
        let rows = (1..=7)
            .map(|i| row(&[("Summary", &format!("Issue {i}")), ("Type", "Bug")]))
            .collect();
        let preview = PreviewData::new(vec!["Summary".into(), "Type".into()], rows, 7);

        assert_eq!(preview.rows().len(), 5);
        assert_eq!(preview.total_rows(), 7);
        assert_eq!(preview.caption(), "First 5 rows of 7 total, 2 columns");
    }

    #[test]
    fn caption_uses_total_when_below_limit() {
        let preview = PreviewData::new(
            vec!["Summary".into()],
            vec![row(&[("Summary", "a")]), row(&[("Summary", "b")])],
            2,
        );
        assert_eq!(preview.caption(), "First 2 rows of 2 total, 1 columns");
    }

    #[test]
    fn table_follows_column_order_and_fills_gaps() {
        let preview = PreviewData::new(
            vec!["Type".into(), "Summary".into(), "Labels".into()],
            vec![row(&[("Summary", "Login fails"), ("Type", "Bug")])],
            1,
        );
        assert_eq!(
            preview.table(),
            vec![vec![
                "Bug".to_string(),
                "Login fails".to_string(),
                String::new()
            ]]
        );
    }

    #[test]
    fn total_never_below_rows_received() {
        let preview = PreviewData::new(vec!["Summary".into()], vec![row(&[]); 3], 1);
        assert_eq!(preview.total_rows(), 3);
    }

    #[test]
    fn duplicate_columns_are_dropped() {
        let preview = PreviewData::new(
            vec!["Summary".into(), "Type".into(), "Summary".into()],
            Vec::new(),
            0,
        );
        assert_eq!(preview.columns(), ["Summary", "Type"]);
    }
}
