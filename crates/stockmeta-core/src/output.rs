//! Result output as a JSON array or JSON Lines.

use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::metadata::GeneratedMetadata;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A single pretty-printed JSON array
    #[default]
    Json,
    /// One JSON object per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// One output record: the file and its generated metadata.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataRecord {
    pub file: PathBuf,
    #[serde(flatten)]
    pub metadata: GeneratedMetadata,
}

/// Serializes records as they are produced.
///
/// JSONL lines are written immediately. JSON output opens the array on the
/// first record and closes it in [`OutputWriter::finish`].
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            items_written: 0,
        }
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let sep = if self.items_written == 0 { "[\n" } else { ",\n" };
                self.writer.write_all(sep.as_bytes())?;
                let pretty = serde_json::to_string_pretty(item).map_err(io::Error::other)?;
                for (i, line) in pretty.lines().enumerate() {
                    if i > 0 {
                        self.writer.write_all(b"\n")?;
                    }
                    write!(self.writer, "  {line}")?;
                }
            }
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
                writeln!(self.writer)?;
            }
        }
        self.items_written += 1;
        Ok(())
    }

    /// Close the JSON array (an empty one if nothing was written) and flush.
    pub fn finish(mut self) -> io::Result<W> {
        if self.format == OutputFormat::Json {
            let tail = if self.items_written == 0 { "[]\n" } else { "\n]\n" };
            self.writer.write_all(tail.as_bytes())?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    pub fn items_written(&self) -> usize {
        self.items_written
    }
}
