//! Delimited measurement record sink

use regbench_core::MeasurementRecord;
use std::io::Write;
use thiserror::Error;

/// Field delimiter of the record stream
pub const DELIMITER: u8 = b';';

/// Errors writing records
#[derive(Debug, Error)]
pub enum SinkError {
    /// Serializing a row failed
    #[error("failed to write record: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the underlying writer failed
    #[error("failed to flush records: {0}")]
    Io(#[from] std::io::Error),
}

/// Tag identifying where a record came from
#[derive(Debug, Clone, Copy)]
pub struct RecordKey<'a> {
    /// Run index
    pub run: usize,
    /// Pass index within the run (0 = baseline)
    pub pass: usize,
    /// Invocation index of the benchmark within the pass
    pub invocation: usize,
    /// Test label of the pass
    pub label: &'a str,
    /// Qualified benchmark path
    pub benchmark: &'a str,
}

impl RecordKey<'_> {
    /// Composite `run-pass-invocation` identifier
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.run, self.pass, self.invocation)
    }
}

/// Column names of the record stream
pub fn header(memory: bool) -> Vec<&'static str> {
    let mut columns = vec!["id", "label", "benchmark", "runtime"];
    if memory {
        columns.extend(["memory", "allocations"]);
    }
    columns
}

/// Appends measurement records as `;`-delimited rows, flushing after every row
pub struct RecordWriter<W: Write> {
    inner: csv::Writer<W>,
    memory: bool,
    rows: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a writer. With `memory` set, rows carry memory and allocation columns.
    pub fn new(inner: W, memory: bool) -> Self {
        let inner = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .flexible(false)
            .from_writer(inner);
        Self {
            inner,
            memory,
            rows: 0,
        }
    }

    /// Whether memory columns are written
    pub fn memory(&self) -> bool {
        self.memory
    }

    /// Number of records appended so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Write the column header row
    pub fn write_header(&mut self) -> Result<(), SinkError> {
        self.inner.write_record(header(self.memory))?;
        self.inner.flush()?;
        Ok(())
    }

    /// Append one record and flush it to the underlying writer
    pub fn append(&mut self, key: &RecordKey<'_>, record: &MeasurementRecord) -> Result<(), SinkError> {
        let mut row = vec![
            key.id(),
            key.label.to_string(),
            key.benchmark.to_string(),
            record.runtime.to_string(),
        ];
        if self.memory {
            row.push(optional(record.memory));
            row.push(optional(record.allocations));
        }
        self.inner.write_record(&row)?;
        self.inner.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.inner
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

fn optional(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key<'a>(label: &'a str, benchmark: &'a str) -> RecordKey<'a> {
        RecordKey {
            run: 1,
            pass: 2,
            invocation: 0,
            label,
            benchmark,
        }
    }

    fn written(writer: RecordWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn runtime_rows() {
        let mut writer = RecordWriter::new(Vec::new(), false);
        let record = MeasurementRecord {
            invocations: 1_000_000,
            runtime: 152.0,
            ..Default::default()
        };
        writer
            .append(&key("Baseline", "/codec/codec_test.go::BenchmarkEncode"), &record)
            .unwrap();
        assert_eq!(writer.rows(), 1);
        assert_eq!(
            written(writer),
            "1-2-0;Baseline;/codec/codec_test.go::BenchmarkEncode;152\n"
        );
    }

    #[test]
    fn memory_rows() {
        let mut writer = RecordWriter::new(Vec::new(), true);
        writer.write_header().unwrap();
        let record = MeasurementRecord {
            invocations: 100,
            runtime: 520.5,
            memory: Some(64),
            allocations: Some(2),
        };
        writer
            .append(&key("/codec/codec.go::(*Encoder).Flush", "/codec/codec_test.go::BenchmarkEncode"), &record)
            .unwrap();
        assert_eq!(
            written(writer),
            "id;label;benchmark;runtime;memory;allocations\n\
             1-2-0;/codec/codec.go::(*Encoder).Flush;/codec/codec_test.go::BenchmarkEncode;520.5;64;2\n"
        );
    }

    #[test]
    fn labels_with_delimiter_are_quoted() {
        let mut writer = RecordWriter::new(Vec::new(), false);
        writer
            .append(&key("odd;label", "b"), &MeasurementRecord::default())
            .unwrap();
        assert_eq!(written(writer), "1-2-0;\"odd;label\";b;0\n");
    }

    #[test]
    fn each_row_is_flushed() {
        struct Counting {
            flushes: usize,
            bytes: Vec<u8>,
        }
        impl Write for Counting {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.bytes.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                self.flushes += 1;
                Ok(())
            }
        }

        let mut writer = RecordWriter::new(
            Counting {
                flushes: 0,
                bytes: Vec::new(),
            },
            false,
        );
        for _ in 0..3 {
            writer
                .append(&key("Baseline", "b"), &MeasurementRecord::default())
                .unwrap();
        }
        let inner = writer.into_inner().unwrap();
        assert!(inner.flushes >= 3);
        assert_eq!(inner.bytes.iter().filter(|b| **b == b'\n').count(), 3);
    }
}
