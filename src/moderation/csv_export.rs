//! CSV rendering of the visible records.
use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::domain::CommentRecord;

/// 表計算ソフトがUTF-8（韓国語）を認識するためのBOM。
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const HEADERS: [&str; 5] = ["author_name", "author_id", "verdict", "reason", "commented_at"];

/// Renders `records` in the given order: BOM, header row, one row per record,
/// CRLF line endings, fields quoted only when needed.
///
/// # Errors
/// Returns an error only if the CSV writer fails to encode a row.
pub fn render_csv<'a>(records: impl IntoIterator<Item = &'a CommentRecord>) -> Result<Vec<u8>, csv::Error> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::CRLF)
            .from_writer(&mut buffer);
        writer.write_record(HEADERS)?;
        for record in records {
            let verdict = record.verdict().to_string();
            let commented_at = record.commented_at.to_rfc3339();
            writer.write_record([
                record.author_name.as_str(),
                record.author_identifier.as_str(),
                verdict.as_str(),
                record.text.as_str(),
                commented_at.as_str(),
            ])?;
        }
        writer.flush()?;
    }
    Ok(buffer)
}

/// File name offered for a download, e.g. `comments_20240105T090000.csv`.
#[must_use]
pub fn export_file_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("comments_{}.csv", now.format("%Y%m%dT%H%M%S"))
}
