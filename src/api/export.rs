use std::io;
use std::string::FromUtf8Error;

use serde::Serialize;
use thiserror::Error;

use crate::core::{ProjectionError, ScenarioInputs, YearRecord};

pub const CSV_COLUMNS: [&str; 9] = [
    "year",
    "income",
    "expenses",
    "surplus",
    "cumulative_cashflow",
    "property_value",
    "loan_balance",
    "equity",
    "lvr",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("export was not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("scenario JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ProjectionError),
}

#[derive(Serialize)]
struct CsvRow {
    year: u32,
    income: f64,
    expenses: f64,
    surplus: f64,
    cumulative_cashflow: f64,
    property_value: f64,
    loan_balance: f64,
    equity: f64,
    lvr: f64,
}

impl From<&YearRecord> for CsvRow {
    fn from(y: &YearRecord) -> Self {
        Self {
            year: y.year,
            income: y.total_income,
            expenses: y.total_expenses,
            surplus: y.surplus,
            cumulative_cashflow: y.cumulative_cashflow,
            property_value: y.property_value,
            loan_balance: y.loan_balance,
            equity: y.equity,
            lvr: y.lvr,
        }
    }
}

pub fn write_projection_csv<W: io::Write>(
    writer: W,
    years: &[YearRecord],
) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(CSV_COLUMNS)?;
    for y in years {
        wtr.serialize(CsvRow::from(y))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn projection_csv(years: &[YearRecord]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_projection_csv(&mut buf, years)?;
    Ok(String::from_utf8(buf)?)
}

pub fn save_scenario_json(inputs: &ScenarioInputs) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(inputs)?)
}

/// Rehydrates saved inputs and applies the same validation as live ones.
pub fn load_scenario_json(json: &str) -> Result<ScenarioInputs, ExportError> {
    let inputs: ScenarioInputs = serde_json::from_str(json)?;
    inputs.validate()?;
    Ok(inputs)
}
