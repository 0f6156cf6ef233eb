//! Parsed records and per-file batches

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tabfeed_common::checksum::fingerprint;

use crate::source::SourceName;

/// Render format of the injected `date` field
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One data line mapped onto the header columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionRecord {
    /// header column -> trimmed value
    pub fields: BTreeMap<String, String>,
    pub owner: String,
    pub system: String,
    pub date: NaiveDateTime,
    /// Fingerprint of the raw line and source basename; unique per collection
    pub hash: String,
}

impl IngestionRecord {
    /// Document form handed to the store. Injected fields win over columns
    /// that happen to share their name.
    pub fn to_document(&self) -> Value {
        let mut doc: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        doc.insert("owner".into(), Value::String(self.owner.clone()));
        doc.insert("system".into(), Value::String(self.system.clone()));
        doc.insert(
            "date".into(),
            Value::String(self.date.format(DATE_FORMAT).to_string()),
        );
        doc.insert("hash".into(), Value::String(self.hash.clone()));

        Value::Object(doc)
    }
}

/// All records parsed from one source file, in line order
#[derive(Debug, Clone)]
pub struct Batch {
    pub collection: String,
    /// Source basename, the ledger key
    pub filename: String,
    pub path: PathBuf,
    pub records: Vec<IngestionRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn documents(&self) -> Vec<Value> {
        self.records.iter().map(IngestionRecord::to_document).collect()
    }
}

/// Turns the lines of one file into records.
///
/// The first non-blank line is the header row. Every later line is zipped
/// positionally with the headers; columns past the shorter of the two are
/// dropped without error.
pub struct RecordBuilder<'a> {
    source: &'a SourceName,
    basename: &'a str,
    separator: &'a str,
    ignore_first_header: bool,
    headers: Option<Vec<String>>,
    records: Vec<IngestionRecord>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(
        source: &'a SourceName,
        basename: &'a str,
        separator: &'a str,
        ignore_first_header: bool,
    ) -> Self {
        Self {
            source,
            basename,
            separator,
            ignore_first_header,
            headers: None,
            records: Vec::new(),
        }
    }

    /// Feed one line, without its line terminator
    pub fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        let fields: Vec<&str> = line.split(self.separator).collect();

        let Some(headers) = &self.headers else {
            let skip = usize::from(self.ignore_first_header);
            self.headers = Some(
                fields
                    .iter()
                    .skip(skip)
                    .map(|h| h.trim().to_string())
                    .collect(),
            );
            return;
        };

        let mapped = headers
            .iter()
            .zip(fields.iter())
            .map(|(header, value)| (header.clone(), value.trim().to_string()))
            .collect();

        self.records.push(IngestionRecord {
            fields: mapped,
            owner: self.source.owner.clone(),
            system: self.source.system.clone(),
            date: self.source.timestamp,
            hash: fingerprint(&fields, self.basename),
        });
    }

    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    pub fn finish(self) -> Vec<IngestionRecord> {
        self.records
    }
}
