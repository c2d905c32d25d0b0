// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streaming reader for `;`-delimited text files. Reads in large chunks,
//! carries the incomplete trailing line across chunk boundaries, and
//! resolves columns against a declared schema, so the live working set is
//! one chunk plus the tail regardless of file size.

use crate::error::IngestError;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default read chunk size.
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Inline field capacity; the widest schema (offers) has 16 columns.
type Fields<'l> = SmallVec<[Cow<'l, str>; 20]>;

/// One expected column of a delimited file.
pub struct SchemaField {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

pub struct Schema {
    pub fields: &'static [SchemaField],
    /// Require exactly the declared columns in declaration order. The
    /// hotels file is strict; the offers file resolves by name because of
    /// its optional columns and aliases.
    pub strict_order: bool,
}

/// Column positions resolved against an actual header line.
#[derive(Clone, Debug)]
pub struct HeaderMap {
    /// Position per schema field, parallel to [Schema::fields].
    positions: Vec<Option<usize>>,
    width: usize,
}

impl HeaderMap {
    #[inline]
    pub fn position(&self, field: usize) -> Option<usize> {
        self.positions.get(field).copied().flatten()
    }

    /// Whether the column is present in the file at all.
    #[inline]
    pub fn has(&self, field: usize) -> bool {
        self.position(field).is_some()
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// One data record, fields addressed by schema index.
pub struct Record<'r> {
    header: &'r HeaderMap,
    pub line: u64,
    fields: &'r [Cow<'r, str>],
}

impl Record<'_> {
    /// Field by schema index; `None` when the column is absent from the
    /// file.
    pub fn get(&self, field: usize) -> Option<&str> {
        let pos = self.header.position(field)?;
        self.fields.get(pos).map(|f| f.as_ref())
    }

    /// Field by schema index for columns the header resolution guarantees.
    pub fn require(&self, field: usize, name: &str) -> anyhow::Result<&str> {
        self.get(field)
            .ok_or_else(|| anyhow::anyhow!("missing field '{name}'"))
    }
}

/// A malformed record retained in the load error log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseIssue {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ReadOutcome {
    /// Records delivered to the callback without error.
    pub records: u64,
    /// Records skipped for parse failures under `skip_errors`.
    pub skipped: u64,
    /// Retained issues, capped at `max_error_log`.
    pub issues: Vec<ParseIssue>,
}

pub struct DelimitedReader<'s> {
    schema: &'s Schema,
    delimiter: u8,
    skip_errors: bool,
    max_error_log: usize,
    chunk_size: usize,
}

impl<'s> DelimitedReader<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            delimiter: b';',
            skip_errors: true,
            max_error_log: 1_000,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn skip_errors(mut self, skip_errors: bool) -> Self {
        self.skip_errors = skip_errors;
        self
    }

    pub fn max_error_log(mut self, max_error_log: usize) -> Self {
        self.max_error_log = max_error_log;
        self
    }

    /// Smaller chunks exercise the tail-carry path in tests.
    pub(crate) fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(16);
        self
    }

    /// Streams the file, invoking `on_record` exactly once per valid data
    /// record, in file order. A callback error that downcasts to
    /// [IngestError] aborts the read; any other callback error is a
    /// record-level parse failure and follows the `skip_errors` policy.
    pub fn read<F>(&self, path: &Path, mut on_record: F) -> Result<ReadOutcome, IngestError>
    where
        F: FnMut(&Record<'_>) -> anyhow::Result<()>,
    {
        let mut file = File::open(path).map_err(|source| IngestError::Io {
            path: path.to_owned(),
            source,
        })?;

        let mut chunk = vec![0u8; self.chunk_size];
        let mut pending: Vec<u8> = Vec::new();
        let mut header: Option<HeaderMap> = None;
        let mut outcome = ReadOutcome::default();
        let mut line_no: u64 = 0;

        loop {
            let read = loop {
                match file.read(&mut chunk) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(source) => {
                        return Err(IngestError::Io {
                            path: path.to_owned(),
                            source,
                        })
                    }
                }
            };
            if read == 0 {
                break;
            }
            pending.extend_from_slice(&chunk[..read]);

            let mut consumed = 0;
            while let Some(offset) = pending[consumed..].iter().position(|&b| b == b'\n') {
                let line_end = consumed + offset;
                line_no += 1;
                // The line slice borrows `pending`, so process before
                // draining.
                self.process_line(
                    &pending[consumed..line_end],
                    line_no,
                    path,
                    &mut header,
                    &mut outcome,
                    &mut on_record,
                )?;
                consumed = line_end + 1;
            }
            pending.drain(..consumed);
        }

        // A final line without a trailing newline.
        if !pending.is_empty() {
            line_no += 1;
            let last = std::mem::take(&mut pending);
            self.process_line(&last, line_no, path, &mut header, &mut outcome, &mut on_record)?;
        }

        if header.is_none() {
            return Err(IngestError::HeaderMismatch {
                path: path.to_owned(),
                reason: "file contains no header line".to_owned(),
            });
        }
        Ok(outcome)
    }

    fn process_line<F>(
        &self,
        mut raw: &[u8],
        line_no: u64,
        path: &Path,
        header: &mut Option<HeaderMap>,
        outcome: &mut ReadOutcome,
        on_record: &mut F,
    ) -> Result<(), IngestError>
    where
        F: FnMut(&Record<'_>) -> anyhow::Result<()>,
    {
        if line_no == 1 {
            raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
        }
        if let [rest @ .., b'\r'] = raw {
            raw = rest;
        }
        if raw.is_empty() {
            return Ok(());
        }

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(_) if header.is_none() => {
                return Err(IngestError::HeaderMismatch {
                    path: path.to_owned(),
                    reason: "header line is not valid UTF-8".to_owned(),
                })
            }
            Err(_) => {
                return self.record_failure(line_no, "line is not valid UTF-8".to_owned(), outcome)
            }
        };

        let fields = match split_fields(line, self.delimiter) {
            Ok(fields) => fields,
            Err(reason) if header.is_none() => {
                return Err(IngestError::HeaderMismatch {
                    path: path.to_owned(),
                    reason,
                })
            }
            Err(reason) => return self.record_failure(line_no, reason, outcome),
        };

        let Some(map) = header.as_ref() else {
            let map = resolve_header(self.schema, &fields).map_err(|reason| {
                IngestError::HeaderMismatch {
                    path: path.to_owned(),
                    reason,
                }
            })?;
            *header = Some(map);
            return Ok(());
        };

        if fields.len() != map.width() {
            let reason = format!("expected {} fields, found {}", map.width(), fields.len());
            return self.record_failure(line_no, reason, outcome);
        }

        let record = Record {
            header: map,
            line: line_no,
            fields: &fields,
        };
        match on_record(&record) {
            Ok(()) => {
                outcome.records += 1;
                Ok(())
            }
            Err(e) => match e.downcast::<IngestError>() {
                Ok(fatal) => Err(fatal),
                Err(e) => self.record_failure(line_no, format!("{e:#}"), outcome),
            },
        }
    }

    fn record_failure(
        &self,
        line: u64,
        reason: String,
        outcome: &mut ReadOutcome,
    ) -> Result<(), IngestError> {
        if !self.skip_errors {
            return Err(IngestError::ParseError { line, reason });
        }
        outcome.skipped += 1;
        if outcome.issues.len() < self.max_error_log {
            outcome.issues.push(ParseIssue { line, reason });
        }
        Ok(())
    }
}

/// Splits one line on the delimiter, honoring simple double-quote
/// grouping with `""` as an escaped quote. Unquoted fields borrow from
/// the line; only fields containing escapes allocate.
fn split_fields(line: &str, delimiter: u8) -> Result<Fields<'_>, String> {
    let bytes = line.as_bytes();
    let mut out = Fields::new();
    let mut pos = 0;
    loop {
        if bytes.get(pos) == Some(&b'"') {
            let mut unescaped: Option<String> = None;
            let mut run_start = pos + 1;
            let mut cursor = pos + 1;
            let after_quote;
            loop {
                let Some(offset) = bytes[cursor..].iter().position(|&b| b == b'"') else {
                    return Err("unterminated quoted field".to_owned());
                };
                let quote = cursor + offset;
                if bytes.get(quote + 1) == Some(&b'"') {
                    let buf = unescaped.get_or_insert_with(String::new);
                    buf.push_str(&line[run_start..quote]);
                    buf.push('"');
                    run_start = quote + 2;
                    cursor = quote + 2;
                } else {
                    match unescaped {
                        Some(mut buf) => {
                            buf.push_str(&line[run_start..quote]);
                            out.push(Cow::Owned(buf));
                        }
                        None => out.push(Cow::Borrowed(&line[run_start..quote])),
                    }
                    after_quote = quote + 1;
                    break;
                }
            }
            match bytes.get(after_quote) {
                None => break,
                Some(&b) if b == delimiter => pos = after_quote + 1,
                Some(_) => return Err("unexpected data after closing quote".to_owned()),
            }
        } else {
            match bytes[pos..].iter().position(|&b| b == delimiter) {
                Some(offset) => {
                    out.push(Cow::Borrowed(&line[pos..pos + offset]));
                    pos += offset + 1;
                }
                None => {
                    out.push(Cow::Borrowed(&line[pos..]));
                    break;
                }
            }
        }
    }
    Ok(out)
}

fn resolve_header(schema: &Schema, fields: &[Cow<'_, str>]) -> Result<HeaderMap, String> {
    let lowered: Vec<String> = fields
        .iter()
        .map(|f| f.trim().to_ascii_lowercase())
        .collect();

    let mut positions = vec![None; schema.fields.len()];
    for (index, field) in schema.fields.iter().enumerate() {
        positions[index] = lowered
            .iter()
            .position(|cell| cell == field.name || field.aliases.contains(&cell.as_str()));
    }

    for (index, field) in schema.fields.iter().enumerate() {
        if field.required && positions[index].is_none() {
            return Err(format!("missing required column '{}'", field.name));
        }
    }

    if schema.strict_order {
        if lowered.len() != schema.fields.len() {
            return Err(format!(
                "expected {} columns, found {}",
                schema.fields.len(),
                lowered.len()
            ));
        }
        for (index, field) in schema.fields.iter().enumerate() {
            if positions[index] != Some(index) {
                return Err(format!("column '{}' out of order", field.name));
            }
        }
    }

    Ok(HeaderMap {
        positions,
        width: fields.len(),
    })
}
