//! Import and export formats.
//!
//! - [`rules`]: audit rule CSV import, export and the blank import template.
//! - [`report`]: risk report rendering as CSV, JSON and plain text.
//!
//! CSV output starts with a UTF-8 byte order mark so spreadsheet tools pick
//! the right encoding for the Chinese headers.

pub mod report;
pub mod rules;

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Byte order mark prepended to CSV output.
pub const BOM: char = '\u{feff}';

/// Write `header` unquoted followed by `rows` with every cell quoted.
fn write_quoted_csv<I, R>(header: &[&str], rows: I) -> Result<String>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut out = Vec::new();
    out.extend_from_slice(BOM.to_string().as_bytes());
    out.extend_from_slice(header.join(",").as_bytes());
    out.push(b'\n');

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    for row in rows {
        writer
            .write_record(row)
            .map_err(|err| Error::internal(format!("failed to write CSV row: {err}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| Error::internal(format!("failed to flush CSV output: {err}")))?;

    String::from_utf8(bytes).map_err(|err| Error::internal(format!("CSV output not UTF-8: {err}")))
}

/// `YYYY-MM-DD`, the date stamp used in download file names.
fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_write_quoted_csv() {
        let csv = write_quoted_csv(&["a", "b"], [["1", "x,y"], ["2", "z"]]).unwrap();
        assert_eq!(csv, "\u{feff}a,b\n\"1\",\"x,y\"\n\"2\",\"z\"\n");
    }

    #[test]
    fn test_write_failure_is_internal() {
        let rows: Vec<Vec<&str>> = vec![vec!["1", "2"], vec!["3"]];
        let err = write_quoted_csv(&["a", "b"], rows).unwrap_err();

        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
