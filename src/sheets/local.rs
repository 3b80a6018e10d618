use super::{RowSink, column_letter};
use crate::error::{Error, Result};
use crate::fields::InvoiceRecord;
use async_trait::async_trait;
use calamine::{Reader, open_workbook_auto};
use edit_xlsx::{Workbook, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Appends rows to an existing `.xlsx` workbook held in memory and saves
/// it once, to `output`, when the run finishes. An empty sheet gets the
/// field names as a header row first.
pub struct LocalWorkbookSink {
    workbook: Workbook,
    sheet: String,
    next_row: u32,
    output: PathBuf,
    appended: usize,
}

impl LocalWorkbookSink {
    /// Open `input`. Rows go to `sheet`, or the first sheet when `None`;
    /// neither reader exposes the workbook's active tab.
    pub fn open(input: &Path, sheet: Option<&str>, output: PathBuf) -> Result<Self> {
        if !input.exists() {
            return Err(Error::Workbook(format!("{} not found", input.display())));
        }

        let sheet = match sheet {
            Some(name) => name.to_string(),
            None => first_sheet_name(input)?,
        };

        let mut workbook = Workbook::from_path(input)
            .map_err(|e| Error::Workbook(format!("could not open {}: {e}", input.display())))?;
        let worksheet = workbook
            .get_worksheet_mut_by_name(&sheet)
            .map_err(|e| Error::Workbook(format!("sheet '{sheet}' not found: {e}")))?;
        let mut next_row = worksheet.max_row() + 1;
        if next_row == 1 {
            write_row(worksheet, 1, &InvoiceRecord::header_row())?;
            next_row = 2;
        }

        info!(path = %input.display(), sheet = %sheet, next_row, "Opened local workbook");
        Ok(Self {
            workbook,
            sheet,
            next_row,
            output,
            appended: 0,
        })
    }
}

fn first_sheet_name(path: &Path) -> Result<String> {
    let workbook = open_workbook_auto(path)
        .map_err(|e| Error::Workbook(format!("could not read {}: {e}", path.display())))?;
    workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Workbook(format!("{} has no sheets", path.display())))
}

fn write_row<W: Write>(worksheet: &mut W, row_num: u32, values: &[String]) -> Result<()> {
    for (col, value) in values.iter().enumerate() {
        let cell_ref = format!("{}{}", column_letter(col as u32), row_num);
        worksheet
            .write_string(cell_ref.as_str(), xml_safe(value))
            .map_err(|e| Error::Workbook(e.to_string()))?;
    }
    Ok(())
}

/// Drop characters XML 1.0 cannot carry at all. Markup characters are
/// escaped by the writer and pass through untouched.
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|&c| match c {
            '\t' | '\n' | '\r' => true,
            '\u{0}'..='\u{1f}' | '\u{FFFE}' | '\u{FFFF}' => false,
            _ => true,
        })
        .collect()
}

#[async_trait(?Send)]
impl RowSink for LocalWorkbookSink {
    fn name(&self) -> &str {
        "local-workbook"
    }

    async fn append_row(&mut self, row: &[String]) -> Result<()> {
        let worksheet = self
            .workbook
            .get_worksheet_mut_by_name(&self.sheet)
            .map_err(|e| Error::Workbook(format!("sheet '{}' not found: {e}", self.sheet)))?;

        write_row(worksheet, self.next_row, row)?;
        self.next_row += 1;
        self.appended += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.workbook
            .save_as(self.output.as_path())
            .map_err(|e| Error::Workbook(format!("cannot write {}: {e}", self.output.display())))?;
        info!(path = %self.output.display(), rows = self.appended, "Saved local workbook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::DataType;

    fn seed_workbook(path: &Path) {
        let mut workbook = Workbook::new();
        let worksheet = workbook.get_worksheet_mut(1).unwrap();
        worksheet.write_string("A1", "PO Number".to_string()).unwrap();
        worksheet.write_string("B1", "Invoice Number".to_string()).unwrap();
        workbook.save_as(path).unwrap();
    }

    fn read_back(path: &Path, sheet: &str) -> Vec<Vec<String>> {
        let mut written = open_workbook_auto(path).unwrap();
        let range = written.worksheet_range(sheet).unwrap();
        range
            .rows()
            .map(|row| row.iter().map(|c| c.as_string().unwrap_or_default()).collect())
            .collect()
    }

    #[test]
    fn test_xml_safe_keeps_markup_and_drops_controls() {
        assert_eq!(xml_safe("Health&Glow <Pvt>"), "Health&Glow <Pvt>");
        assert_eq!(xml_safe("a\u{1}b\u{7f}"), "ab\u{7f}");
        assert_eq!(xml_safe("line\nbreak\ttab"), "line\nbreak\ttab");
    }

    #[tokio::test]
    async fn test_values_are_written_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("master.xlsx");
        let output = dir.path().join("updated.xlsx");
        seed_workbook(&input);

        let row = vec!["PO-9".to_string(), "Health&Glow <Pvt>".to_string(), "A \"quoted\" 'x'".to_string()];
        let mut sink = LocalWorkbookSink::open(&input, None, output.clone()).unwrap();
        sink.append_row(&row).await.unwrap();
        sink.finish().await.unwrap();

        let rows = read_back(&output, "Sheet1");
        assert_eq!(rows[1], row);
    }

    #[tokio::test]
    async fn test_empty_sheet_gets_header_row() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("blank.xlsx");
        let output = dir.path().join("updated.xlsx");
        Workbook::new().save_as(&input).unwrap();

        let record = InvoiceRecord::new();
        let mut sink = LocalWorkbookSink::open(&input, None, output.clone()).unwrap();
        sink.append_row(&record.to_row()).await.unwrap();
        sink.finish().await.unwrap();

        let rows = read_back(&output, "Sheet1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], InvoiceRecord::header_row());
        assert_eq!(rows[1], record.to_row());
    }

    #[tokio::test]
    async fn test_default_target_is_first_sheet_even_when_another_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("master.xlsx");
        let output = dir.path().join("updated.xlsx");
        {
            let mut workbook = Workbook::new();
            workbook
                .get_worksheet_mut(1)
                .unwrap()
                .write_string("A1", "PO Number".to_string())
                .unwrap();
            let second = workbook.add_worksheet_by_name("Archive").unwrap();
            second.write_string("A1", "old".to_string()).unwrap();
            second.activate();
            workbook.save_as(&input).unwrap();
        }

        let mut sink = LocalWorkbookSink::open(&input, None, output.clone()).unwrap();
        sink.append_row(&["PO-1".to_string()]).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(read_back(&output, "Sheet1"), vec![vec!["PO Number".to_string()], vec!["PO-1".to_string()]]);
        assert_eq!(read_back(&output, "Archive"), vec![vec!["old".to_string()]]);
    }

    #[tokio::test]
    async fn test_rows_append_below_existing_data() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("master.xlsx");
        let output = dir.path().join("out").join("updated.xlsx");
        seed_workbook(&input);

        let mut sink = LocalWorkbookSink::open(&input, None, output.clone()).unwrap();
        sink.append_row(&["PO-1".to_string(), "INV-1".to_string()]).await.unwrap();
        sink.append_row(&["PO-2".to_string(), "NA".to_string()]).await.unwrap();
        sink.finish().await.unwrap();

        let mut written = open_workbook_auto(&output).unwrap();
        let sheet = written.sheet_names().first().cloned().unwrap();
        let range = written.worksheet_range(&sheet).unwrap();
        let cell = |row: u32, col: u32| range.get_value((row, col)).and_then(|c| c.as_string());

        assert_eq!(cell(0, 0).as_deref(), Some("PO Number"));
        assert_eq!(cell(1, 0).as_deref(), Some("PO-1"));
        assert_eq!(cell(1, 1).as_deref(), Some("INV-1"));
        assert_eq!(cell(2, 0).as_deref(), Some("PO-2"));
        assert_eq!(cell(2, 1).as_deref(), Some("NA"));
    }

    #[test]
    fn test_missing_workbook_is_error() {
        let result = LocalWorkbookSink::open(Path::new("nope.xlsx"), None, PathBuf::from("out.xlsx"));
        assert!(matches!(result, Err(Error::Workbook(_))));
    }

    #[test]
    fn test_unknown_sheet_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("master.xlsx");
        seed_workbook(&input);

        let result = LocalWorkbookSink::open(&input, Some("NoSuchSheet"), dir.path().join("o.xlsx"));
        assert!(matches!(result, Err(Error::Workbook(_))));
    }
}
