//! Tabular data parsing for spreadsheet CSV exports and Excel workbooks.
//!
//! Every parser produces [`RowRecord`]s keyed by the trimmed header tokens of
//! the first non-blank row.

use anyhow::{Context, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use std::io::Cursor;

/// Replaces line breaks found inside quoted cells, so a multi-line cell stays
/// a single logical row.
pub const LINE_BREAK_MARKER: &str = "<br>";

/// One data row: `(column, value)` pairs in header order.
///
/// Every record built from the same header carries exactly the header's
/// columns; cells missing at the end of a short row are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    fields: Vec<(String, String)>,
}

impl RowRecord {
    /// Zip `cells` against `headers`. Surplus cells are dropped.
    pub fn from_cells(headers: &[String], cells: Vec<String>) -> Self {
        let mut cells = cells.into_iter();
        let fields = headers
            .iter()
            .map(|h| (h.clone(), cells.next().unwrap_or_default()))
            .collect();
        Self { fields }
    }

    /// Value of `column`, if the header defines it.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `column` when present and non-empty.
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

/// Dispatch file parsing by extension.
pub fn parse_file(filename: &str, data: &[u8]) -> Result<Vec<RowRecord>> {
    match extension(filename).as_str() {
        "csv" => {
            let text = std::str::from_utf8(data).context("CSV file is not valid UTF-8")?;
            parse_csv(text)
        }
        "xlsx" | "xlsm" => parse_excel_xlsx(data),
        ext => anyhow::bail!(
            "Unsupported file type: .{}. Supported: .csv, .xlsx, .xlsm",
            ext
        ),
    }
}

/// Lower-cased extension of `filename`, empty when there is none.
pub fn extension(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Parse CSV text as exported by Google Sheets.
///
/// - blank and whitespace-only lines are skipped, a blank header line included
/// - `""` inside quotes is a literal `"`; commas inside quotes stay in the cell
/// - line breaks inside quotes become [`LINE_BREAK_MARKER`]
/// - only `\n` ends a record; a bare `\r` anywhere is dropped
/// - headers and values are trimmed; short rows are padded with `""`
pub fn parse_csv(text: &str) -> Result<Vec<RowRecord>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_reader(text.as_bytes());

    let mut lines: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        if is_blank(&record) {
            continue;
        }
        lines.push(record.iter().map(normalize_cell).collect());
    }

    let mut lines = lines.into_iter();
    let Some(headers) = lines.next() else {
        return Ok(Vec::new());
    };
    tracing::debug!("CSV headers: {:?}", headers);

    Ok(lines
        .map(|cells| RowRecord::from_cells(&headers, cells))
        .collect())
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.len() <= 1 && record.iter().all(|f| f.trim().is_empty())
}

fn normalize_cell(cell: &str) -> String {
    cell.replace("\r\n", LINE_BREAK_MARKER)
        .replace('\n', LINE_BREAK_MARKER)
        .replace('\r', "")
        .trim()
        .to_string()
}

/// Parse the first worksheet of an xlsx/xlsm workbook. First non-empty row =
/// headers.
fn parse_excel_xlsx(data: &[u8]) -> Result<Vec<RowRecord>> {
    let cursor = Cursor::new(data);
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(cursor).context("Failed to open Excel workbook")?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("Workbook has no worksheets")?;
    let range = workbook
        .worksheet_range(&first)
        .with_context(|| format!("Failed to read worksheet '{}'", first))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|values| values.iter().any(|v| !v.is_empty()));

    let Some(headers) = rows.next() else {
        return Ok(Vec::new());
    };

    Ok(rows
        .map(|cells| RowRecord::from_cells(&headers, cells))
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    let text = match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Whole numbers render without ".0" so prices stay as typed
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    };
    text.trim().to_string()
}

/// Excel serial day number to `YYYY-MM-DD` (1900 date system).
fn serial_to_date(serial: f64) -> String {
    // Serial 25569 is 1970-01-01
    let days = serial.floor() as i64 - 25569;

    // Civil-from-days, proleptic Gregorian
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!("{:04}-{:02}-{:02}", year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_basic() {
        let rows = parse_csv("name,category,product_price\nsake,Omusubi,180\nkonbu,onigiri,150\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].columns().collect::<Vec<_>>(),
            vec!["name", "category", "product_price"]
        );
        assert_eq!(rows[0].get("name"), Some("sake"));
        assert_eq!(rows[1].get("product_price"), Some("150"));
    }

    #[test]
    fn test_row_count_matches_non_blank_lines() {
        let text = "\n  \na , b\n1,2\n\n   \n3,4\n5,6\n";
        let rows = parse_csv(text).unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        }
    }

    #[test]
    fn test_quoted_line_break_becomes_marker() {
        let rows = parse_csv("h1,h2\n\"a\nb\",c").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("h1"), Some("a<br>b"));
        assert_eq!(rows[0].get("h2"), Some("c"));
    }

    #[test]
    fn test_bare_carriage_return_does_not_split_row() {
        let rows = parse_csv("h1,h2\na\rb,c\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("h1"), Some("ab"));
        assert_eq!(rows[0].get("h2"), Some("c"));
    }

    #[test]
    fn test_crlf_rows_keep_clean_last_column() {
        let rows = parse_csv("h1,h2\r\n\r\na,b\r\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["h1", "h2"]);
        assert_eq!(rows[0].get("h2"), Some("b"));
    }

    #[test]
    fn test_quoted_crlf_becomes_single_marker() {
        let rows = parse_csv("h1,h2\r\n\"line one\r\nline two\",x\r\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("h1"), Some("line one<br>line two"));
        assert_eq!(rows[0].get("h2"), Some("x"));
    }

    #[test]
    fn test_escaped_quote() {
        let rows = parse_csv("remarks\n\"say \"\"hi\"\"\"\n").unwrap();
        assert_eq!(rows[0].get("remarks"), Some("say \"hi\""));
    }

    #[test]
    fn test_quoted_comma_stays_in_cell() {
        let rows = parse_csv("allergy,price\n\"egg, milk\",200\n").unwrap();
        assert_eq!(rows[0].get("allergy"), Some("egg, milk"));
        assert_eq!(rows[0].get("price"), Some("200"));
    }

    #[test]
    fn test_short_row_padded() {
        let rows = parse_csv("a,b,c\n1\n").unwrap();
        assert_eq!(rows[0].get("a"), Some("1"));
        assert_eq!(rows[0].get("b"), Some(""));
        assert_eq!(rows[0].get("c"), Some(""));
        assert_eq!(rows[0].columns().count(), 3);
    }

    #[test]
    fn test_surplus_values_ignored() {
        let rows = parse_csv("a,b\n1,2,3,4\n").unwrap();
        assert_eq!(rows[0].columns().count(), 2);
        assert_eq!(rows[0].get("b"), Some("2"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_csv("").unwrap().is_empty());
        assert!(parse_csv("\n \n\t\n").unwrap().is_empty());
        assert!(parse_csv("only,headers\n").unwrap().is_empty());
    }

    #[test]
    fn test_values_trimmed() {
        let rows = parse_csv(" name , title \n  sake  ,  Salmon  \n").unwrap();
        assert_eq!(rows[0].get("name"), Some("sake"));
        assert_eq!(rows[0].get("title"), Some("Salmon"));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(parse_file("products.txt", b"a,b").is_err());
        assert_eq!(parse_file("dir/Products.CSV", b"a\n1").unwrap().len(), 1);
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("/tmp/goods.xlsx"), "xlsx");
        assert_eq!(extension("C:\\data\\goods.CSV"), "csv");
        assert_eq!(extension("noext"), "");
    }

    #[test]
    fn test_serial_to_date() {
        assert_eq!(serial_to_date(25569.0), "1970-01-01");
        assert_eq!(serial_to_date(45292.0), "2024-01-01");
        assert_eq!(serial_to_date(45351.5), "2024-02-29");
    }
}
