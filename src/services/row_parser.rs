//! Spreadsheet parsing
//!
//! Reads uploaded bytes into `RawRow`s. The first row is the header;
//! data rows are numbered from 1. A row that cannot be read is reported
//! as a parse error without aborting the file; a file without a usable
//! header is unreadable and fails the whole task.

use std::collections::BTreeMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls, Xlsx};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::RawRow;

/// Parse output: the header map, readable rows, and per-row failures
#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub headers: BTreeMap<usize, String>,
    pub rows: Vec<RawRow>,
    /// (row number, message) for rows skipped as unreadable
    pub parse_errors: Vec<(u32, String)>,
}

/// Dispatch on file extension; `.xlsx` and `.xls` go to calamine,
/// anything else is treated as CSV.
pub fn parse_file(bytes: &[u8], file_name: &str) -> Result<ParsedSheet> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".xlsx") {
        parse_xlsx(bytes)
    } else if lower.ends_with(".xls") {
        parse_xls(bytes)
    } else {
        parse_csv(bytes)
    }
}

fn parse_xlsx(bytes: &[u8]) -> Result<ParsedSheet> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| Error::UnreadableFile(format!("Not a valid workbook: {}", e)))?;
    sheet_from_range(first_sheet_range(&mut workbook)?)
}

/// Legacy BIFF workbooks need their own reader
fn parse_xls(bytes: &[u8]) -> Result<ParsedSheet> {
    let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes))
        .map_err(|e| Error::UnreadableFile(format!("Not a valid workbook: {}", e)))?;
    sheet_from_range(first_sheet_range(&mut workbook)?)
}

fn first_sheet_range<RS, R>(workbook: &mut R) -> Result<Range<Data>>
where
    RS: std::io::Read + std::io::Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::UnreadableFile("Workbook has no sheets".into()))?;

    workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::UnreadableFile(format!("Cannot read sheet '{}': {}", sheet_name, e)))
}

fn sheet_from_range(range: Range<Data>) -> Result<ParsedSheet> {
    let mut iter = range.rows();
    let header_row = iter
        .next()
        .ok_or_else(|| Error::UnreadableFile("Sheet is empty".into()))?;

    let headers = header_map(header_row.iter().map(cell_to_string));
    if headers.is_empty() {
        return Err(Error::UnreadableFile("Header row is blank".into()));
    }

    let mut sheet = ParsedSheet {
        headers: headers.clone(),
        ..Default::default()
    };

    for (i, row) in iter.enumerate() {
        let row_number = (i + 1) as u32;
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        sheet.rows.push(RawRow {
            row_number,
            values,
            headers: headers.clone(),
        });
    }

    debug!(rows = sheet.rows.len(), "Parsed workbook sheet");
    Ok(sheet)
}

fn parse_csv(bytes: &[u8]) -> Result<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(Cursor::new(bytes));

    let mut records = reader.records();
    let header_record = match records.next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => return Err(Error::UnreadableFile(format!("Bad header row: {}", e))),
        None => return Err(Error::UnreadableFile("File is empty".into())),
    };

    let headers = header_map(header_record.iter().map(|s| s.to_string()));
    if headers.is_empty() {
        return Err(Error::UnreadableFile("Header row is blank".into()));
    }

    let mut sheet = ParsedSheet {
        headers: headers.clone(),
        ..Default::default()
    };

    for (i, record) in records.enumerate() {
        let row_number = (i + 1) as u32;
        match record {
            Ok(record) => {
                let values: Vec<String> = record.iter().map(|s| s.to_string()).collect();
                if values.iter().all(|v| v.trim().is_empty()) {
                    continue;
                }
                sheet.rows.push(RawRow {
                    row_number,
                    values,
                    headers: headers.clone(),
                });
            }
            Err(e) => {
                sheet.parse_errors.push((row_number, format!("Unreadable row: {}", e)));
            }
        }
    }

    debug!(
        rows = sheet.rows.len(),
        errors = sheet.parse_errors.len(),
        "Parsed csv file"
    );
    Ok(sheet)
}

/// Column index → trimmed non-empty header label
fn header_map(labels: impl Iterator<Item = String>) -> BTreeMap<usize, String> {
    labels
        .enumerate()
        .filter_map(|(i, label)| {
            let label = label.trim().to_string();
            (!label.is_empty()).then_some((i, label))
        })
        .collect()
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_basic() {
        let data = "客户名称,商品编码,数量\nAcme,SKU-1,5\nBeta,SKU-2,3\n";
        let sheet = parse_file(data.as_bytes(), "orders.csv").unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].row_number, 1);
        assert_eq!(sheet.rows[0].value_for_header("商品编码"), Some("SKU-1"));
        assert_eq!(sheet.rows[1].value_for_header("数量"), Some("3"));
        assert!(sheet.parse_errors.is_empty());
    }

    #[test]
    fn csv_skips_blank_rows_keeps_numbering() {
        let data = "a,b\n1,2\n,\n3,4\n";
        let sheet = parse_file(data.as_bytes(), "x.csv").unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].row_number, 1);
        assert_eq!(sheet.rows[1].row_number, 3);
    }

    #[test]
    fn csv_short_rows_tolerated() {
        let data = "a,b,c\n1,2,3\n4,5\n";
        let sheet = parse_file(data.as_bytes(), "x.csv").unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1].values.len(), 2);
    }

    #[test]
    fn empty_file_is_unreadable() {
        let err = parse_file(b"", "x.csv").unwrap_err();
        assert!(matches!(err, Error::UnreadableFile(_)));
    }

    #[test]
    fn blank_header_is_unreadable() {
        let err = parse_file(b" , ,\n1,2,3\n", "x.csv").unwrap_err();
        assert!(matches!(err, Error::UnreadableFile(_)));
    }

    #[test]
    fn garbage_xlsx_is_unreadable() {
        let err = parse_file(b"not a zip archive", "orders.xlsx").unwrap_err();
        assert!(matches!(err, Error::UnreadableFile(_)));
    }

    #[test]
    fn garbage_xls_is_unreadable() {
        // .xls must go through the BIFF reader, not the zip-based one
        let err = parse_file(b"not a biff workbook", "orders.xls").unwrap_err();
        assert!(matches!(err, Error::UnreadableFile(_)));
    }
}
