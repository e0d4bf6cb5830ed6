//! Pull-based CSV row stream.
//!
//! Rows are read one record at a time from any [`Read`] source, so memory use
//! does not depend on file size. The stream owns no database state; each
//! yielded row lives independently of whatever transaction processes it.
//!
//! [`StoredRows`] and [`count_stored`] run the synchronous reads on tokio's
//! blocking pool so the row loop never blocks a runtime thread on file IO.

use std::io::Read;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::IngestError;

/// One data record with its 1-based index among non-blank records.
#[derive(Debug, Clone)]
pub struct CsvRow {
    pub index: i32,
    headers: Arc<[String]>,
    values: StringRecord,
}

impl CsvRow {
    pub fn new(index: i32, headers: Arc<[String]>, values: StringRecord) -> Self {
        Self {
            index,
            headers,
            values,
        }
    }

    /// Trimmed cell for `column`; `None` when the column is absent or the cell is empty.
    pub fn get(&self, column: &str) -> Option<&str> {
        let position = self.headers.iter().position(|h| h == column)?;
        self.values
            .get(position)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// `(column, value)` pairs in header order, including empty cells.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), self.values.get(i).unwrap_or("").trim()))
    }
}

/// What the stream yields for each record.
#[derive(Debug)]
pub enum RowItem {
    Row(CsvRow),
    /// The record could not be decoded; the rest of the file is still readable.
    Malformed { index: i32, message: String },
}

/// Iterator over the data records of a CSV file.
pub struct RowStream<R: Read> {
    reader: csv::Reader<R>,
    headers: Arc<[String]>,
    record: StringRecord,
    next_index: i32,
    skip_through: i32,
}

impl<R: Read> RowStream<R> {
    /// Opens the stream and reads the header row. Records with an index at or
    /// below `skip_through` are read past without being yielded.
    pub fn new(source: R, skip_through: i32) -> Result<Self, IngestError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(source);

        let headers: Arc<[String]> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        Ok(Self {
            reader,
            headers,
            record: StringRecord::new(),
            next_index: 1,
            skip_through,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for RowStream<R> {
    /// IO failures end the stream with an error; decode failures do not.
    type Item = Result<RowItem, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.next_index;
            let item = match self.reader.read_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) => RowItem::Row(CsvRow::new(
                    index,
                    Arc::clone(&self.headers),
                    self.record.clone(),
                )),
                Err(err) if err.is_io_error() => return Some(Err(err.into())),
                Err(err) => RowItem::Malformed {
                    index,
                    message: format!("unreadable record: {err}"),
                },
            };
            self.next_index += 1;

            if index > self.skip_through {
                return Some(Ok(item));
            }
        }
    }
}

/// Reader over a file handed out by a [`FileStore`](crate::storage::FileStore).
pub type StoredSource = Box<dyn Read + Send>;

/// Async front for a [`RowStream`] over a stored file. Each read moves the
/// stream onto the blocking pool and back.
pub struct StoredRows {
    stream: Option<RowStream<StoredSource>>,
}

impl StoredRows {
    pub async fn open(source: StoredSource, skip_through: i32) -> Result<Self, IngestError> {
        let stream = off_runtime(move || RowStream::new(source, skip_through)).await??;
        Ok(Self {
            stream: Some(stream),
        })
    }

    pub async fn next(&mut self) -> Option<Result<RowItem, IngestError>> {
        let mut stream = self.stream.take()?;
        let read = off_runtime(move || {
            let item = stream.next();
            (stream, item)
        })
        .await;

        match read {
            Ok((stream, item)) => {
                if item.is_some() {
                    self.stream = Some(stream);
                }
                item
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// [`count_records`] for a stored file, off the runtime threads.
pub async fn count_stored(source: StoredSource) -> Result<i32, IngestError> {
    off_runtime(move || count_records(source)).await?
}

async fn off_runtime<T, F>(work: F) -> Result<T, IngestError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| IngestError::Storage(std::io::Error::other(err)))
}

/// Counts data records without retaining them.
pub fn count_records<R: Read>(source: R) -> Result<i32, IngestError> {
    let mut count = 0;
    for item in RowStream::new(source, 0)? {
        item?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "product_name, product_sku ,attr_color\n\
                       Lamp,LMP-1,\"Red, Blue\"\n\
                       \n\
                       Chair,CHR-1,\n\
                       Desk,DSK-1,Oak\n";

    fn rows(skip: i32) -> Vec<CsvRow> {
        RowStream::new(CSV.as_bytes(), skip)
            .unwrap()
            .map(|item| match item.unwrap() {
                RowItem::Row(row) => row,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_blank_lines_skipped_and_indices_contiguous() {
        let rows = rows(0);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(rows[1].get("product_name"), Some("Chair"));
    }

    #[test]
    fn test_headers_and_cells_are_trimmed() {
        let rows = rows(0);
        assert_eq!(rows[0].get("product_sku"), Some("LMP-1"));
        assert_eq!(rows[0].get("attr_color"), Some("Red, Blue"));
        assert_eq!(rows[1].get("attr_color"), None);
        assert_eq!(rows[0].get("missing"), None);
    }

    #[test]
    fn test_cursor_skips_leading_rows() {
        let rows = rows(2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 3);
        assert_eq!(rows[0].get("product_name"), Some("Desk"));
    }

    #[test]
    fn test_short_records_are_tolerated() {
        let data = "a,b,c\n1\n2,3,4\n";
        let rows: Vec<_> = RowStream::new(data.as_bytes(), 0)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        match &rows[0] {
            RowItem::Row(row) => {
                assert_eq!(row.get("a"), Some("1"));
                assert_eq!(row.get("c"), None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8_is_malformed_row() {
        let mut data = b"name,sku\nok,A-1\n".to_vec();
        data.extend_from_slice(b"bad\xff,B-1\nfine,C-1\n");

        let items: Vec<_> = RowStream::new(data.as_slice(), 0)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], RowItem::Malformed { index: 2, .. }));
        assert!(matches!(&items[2], RowItem::Row(row) if row.index == 3));
    }

    #[tokio::test]
    async fn test_stored_rows_skip_and_end() {
        let source: StoredSource = Box::new(std::io::Cursor::new(CSV.as_bytes().to_vec()));
        let mut rows = StoredRows::open(source, 1).await.unwrap();

        let mut indices = Vec::new();
        while let Some(item) = rows.next().await {
            match item.unwrap() {
                RowItem::Row(row) => indices.push(row.index),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(indices, vec![2, 3]);
        // exhausted streams stay exhausted
        assert!(rows.next().await.is_none());

        let source: StoredSource = Box::new(std::io::Cursor::new(CSV.as_bytes().to_vec()));
        assert_eq!(count_stored(source).await.unwrap(), 3);
    }

    #[test]
    fn test_count_records() {
        assert_eq!(count_records(CSV.as_bytes()).unwrap(), 3);
        assert_eq!(count_records("".as_bytes()).unwrap(), 0);
        assert_eq!(count_records("only,headers\n".as_bytes()).unwrap(), 0);
    }
}
