use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};

use crate::amount::Arrrtoshi;
use crate::error::{Result, SendFlowError, TaxonomyCode};
use crate::memo::Memo;
use crate::recipient::Recipient;

pub const MAX_FILE_SIZE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_ROWS: usize = 1000;

/// One imported recipient line before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRow {
    #[serde(default)]
    pub row_number: usize,
    pub address: String,
    pub amount: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl RecipientRow {
    pub fn into_recipient(self) -> Recipient {
        Recipient {
            address: self.address,
            amount_text: self.amount,
            memo: self.memo.map(|text| Memo::from_text(&text)),
            label: self.label,
            error: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct HeaderIndexes {
    address: Option<usize>,
    amount: Option<usize>,
    amount_arrrtoshis: Option<usize>,
    memo: Option<usize>,
    label: Option<usize>,
}

pub fn parse_csv(input: &[u8], source: &str) -> Result<Vec<RecipientRow>> {
    check_size(input, source)?;

    let normalized = strip_utf8_bom(input);
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(normalized);

    let headers = reader
        .headers()
        .map_err(|err| {
            SendFlowError::taxonomy(
                TaxonomyCode::Validation1006,
                format!("failed reading CSV headers: {err}"),
            )
        })?
        .clone();

    let indexes = parse_headers(&headers)?;

    let mut rows = Vec::new();
    for (record_idx, record_result) in reader.records().enumerate() {
        let row_number = record_idx + 1;
        if row_number > MAX_ROWS {
            return Err(too_many_rows());
        }

        let record = record_result.map_err(|err| {
            SendFlowError::taxonomy(
                TaxonomyCode::Validation1006,
                format!("failed parsing CSV row {}: {err}", row_number + 1),
            )
        })?;

        check_formula_injection(&record, row_number + 1, Some(&headers))?;

        let amount = match (
            optional_cell(&record, indexes.amount),
            optional_cell(&record, indexes.amount_arrrtoshis),
        ) {
            (Some(decimal), _) => decimal,
            (None, Some(units)) => units_to_decimal(&units, row_number)?,
            (None, None) => String::new(),
        };

        rows.push(RecipientRow {
            row_number,
            address: cell(&record, indexes.address).unwrap_or_default(),
            amount,
            memo: optional_cell(&record, indexes.memo),
            label: optional_cell(&record, indexes.label),
        });
    }

    Ok(rows)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Rows(Vec<RecipientRow>),
    Wrapped { recipients: Vec<RecipientRow> },
}

/// Parse a JSON recipient list: either a bare array of rows or an object
/// with a `recipients` array. Amounts are decimal strings.
pub fn parse_json(input: &[u8], source: &str) -> Result<Vec<RecipientRow>> {
    check_size(input, source)?;

    let document: JsonDocument =
        serde_json::from_slice(strip_utf8_bom(input)).map_err(|err| {
            SendFlowError::taxonomy(
                TaxonomyCode::Validation1006,
                format!("failed parsing JSON recipients in '{source}': {err}"),
            )
        })?;
    let mut rows = match document {
        JsonDocument::Rows(rows) | JsonDocument::Wrapped { recipients: rows } => rows,
    };
    if rows.len() > MAX_ROWS {
        return Err(too_many_rows());
    }
    for (idx, row) in rows.iter_mut().enumerate() {
        row.row_number = idx + 1;
        row.address = row.address.trim().to_string();
        row.amount = row.amount.trim().to_string();
    }
    Ok(rows)
}

fn check_size(input: &[u8], source: &str) -> Result<()> {
    if input.len() > MAX_FILE_SIZE_BYTES {
        return Err(SendFlowError::taxonomy(
            TaxonomyCode::Validation1010,
            format!("input '{source}' exceeds maximum file size of {MAX_FILE_SIZE_BYTES} bytes"),
        ));
    }
    Ok(())
}

fn too_many_rows() -> SendFlowError {
    SendFlowError::taxonomy(
        TaxonomyCode::Validation1011,
        format!("input has more than {MAX_ROWS} data rows"),
    )
}

fn units_to_decimal(units: &str, row_number: usize) -> Result<String> {
    units
        .parse::<u64>()
        .ok()
        .and_then(|value| Arrrtoshi::new(value).ok())
        .map(|amount| amount.to_decimal_string())
        .ok_or_else(|| {
            SendFlowError::taxonomy(
                TaxonomyCode::Validation1002,
                format!("row {row_number}: '{units}' is not a valid arrrtoshi amount"),
            )
        })
}

fn parse_headers(headers: &StringRecord) -> Result<HeaderIndexes> {
    let mut indexes = HeaderIndexes::default();

    check_formula_injection(headers, 1, None)?;

    for (idx, header) in headers.iter().enumerate() {
        let slot = match header.trim().to_ascii_lowercase().as_str() {
            "address" | "recipient" | "to" => &mut indexes.address,
            "amount" | "value" | "arrr" => &mut indexes.amount,
            "amount_arrrtoshis" | "arrrtoshis" => &mut indexes.amount_arrrtoshis,
            "memo" | "message" | "note" => &mut indexes.memo,
            "label" | "name" => &mut indexes.label,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(idx);
        }
    }

    if indexes.address.is_none() {
        return Err(SendFlowError::taxonomy(
            TaxonomyCode::Validation1012,
            "missing required CSV column: address|recipient|to",
        ));
    }
    if indexes.amount.is_none() && indexes.amount_arrrtoshis.is_none() {
        return Err(SendFlowError::taxonomy(
            TaxonomyCode::Validation1012,
            "missing required CSV amount column: amount|value|arrr or amount_arrrtoshis|arrrtoshis",
        ));
    }

    Ok(indexes)
}

fn check_formula_injection(
    record: &StringRecord,
    row_number: usize,
    headers: Option<&StringRecord>,
) -> Result<()> {
    for (idx, value) in record.iter().enumerate() {
        if has_formula_prefix(value) {
            let column = headers
                .and_then(|h| h.get(idx))
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("column#{}", idx + 1));
            return Err(SendFlowError::taxonomy(
                TaxonomyCode::Validation1009,
                format!("formula injection detected at row {row_number}, column {column}"),
            ));
        }
    }

    Ok(())
}

fn has_formula_prefix(value: &str) -> bool {
    matches!(
        value.chars().next(),
        Some('=') | Some('+') | Some('-') | Some('@') | Some('\t') | Some('\r')
    )
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(|value| value.trim().to_string())
}

fn optional_cell(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    cell(record, idx).filter(|value| !value.is_empty())
}

fn strip_utf8_bom(input: &[u8]) -> &[u8] {
    input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input)
}
