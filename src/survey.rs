//! Survey CSV handling: download, cleanup and prompt summarisation.

use csv::{ReaderBuilder, Writer};
use std::fs;
use std::path::Path;

use crate::error::{ServiceError, ServiceResult};

/// Leading data rows in a raw export that hold question metadata, not answers.
pub const METADATA_ROWS: usize = 2;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SurveyTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SurveyTable {
    pub fn from_reader<R: std::io::Read>(reader: R) -> ServiceResult<Self> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn read(path: &Path) -> ServiceResult<Self> {
        let file = fs::File::open(path).map_err(|e| {
            ServiceError::FromString(format!("Cannot open survey {}: {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn write(&self, path: &Path) -> ServiceResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = Writer::from_path(path)?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Drop the export's metadata rows and every column without a single answer.
    pub fn cleaned(&self) -> Self {
        let rows: Vec<Vec<String>> = self.rows.iter().skip(METADATA_ROWS).cloned().collect();
        let trimmed = Self {
            headers: self.headers.clone(),
            rows,
        };
        let keep: Vec<usize> = (0..trimmed.headers.len())
            .filter(|&col| {
                (0..trimmed.rows.len()).any(|row| !trimmed.cell(row, col).trim().is_empty())
            })
            .collect();

        Self {
            headers: keep.iter().map(|&c| trimmed.headers[c].clone()).collect(),
            rows: (0..trimmed.rows.len())
                .map(|row| {
                    keep.iter()
                        .map(|&col| trimmed.cell(row, col).to_string())
                        .collect()
                })
                .collect(),
        }
    }

    /// One paragraph per column: the question, then its non-empty answers.
    pub fn summarize(&self) -> String {
        let mut blocks = Vec::with_capacity(self.headers.len());
        for (col, header) in self.headers.iter().enumerate() {
            let answers: Vec<&str> = (0..self.rows.len())
                .map(|row| self.cell(row, col).trim())
                .filter(|v| !v.is_empty())
                .collect();
            blocks.push(format!("{header}\n{}", answers.join(" | ")));
        }
        blocks.join("\n\n")
    }
}

/// Fetch the raw export, clean it and store it at `dest`.
pub fn download_survey(url: &str, dest: &Path) -> ServiceResult<SurveyTable> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| ServiceError::NetworkError(format!("Failed to download survey: {e}")))?;
    let table = SurveyTable::from_reader(response.into_reader())?.cleaned();
    table.write(dest)?;
    tracing::info!(
        file = %dest.display(),
        columns = table.headers.len(),
        rows = table.rows.len(),
        "survey downloaded"
    );
    Ok(table)
}

/// Summary of the stored survey, or `None` when there is no usable table.
pub fn summary_if_present(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match SurveyTable::read(path) {
        Ok(table) => Some(table.summarize()),
        Err(err) => {
            tracing::warn!("ignoring survey {}: {err}", path.display());
            None
        }
    }
}
