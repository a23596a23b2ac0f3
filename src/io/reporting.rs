// src/io/reporting.rs

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::error::Result;

/// Writes the simulated response surface to a CSV file: one `price_<i>`
/// column per product followed by `mean_profit`. Undefined means are
/// written as `NaN`.
pub fn write_response_surface(
    file_path: impl AsRef<Path>,
    responses: &BTreeMap<Vec<i64>, f64>,
) -> Result<()> {
    let path = file_path.as_ref();
    let mut wtr = csv::Writer::from_path(path)?;

    let width = responses.keys().next().map_or(0, Vec::len);
    let mut header: Vec<String> = (0..width).map(|i| format!("price_{i}")).collect();
    header.push("mean_profit".to_string());
    wtr.write_record(&header)?;

    for (prices, mean) in responses {
        let mut record: Vec<String> = prices.iter().map(i64::to_string).collect();
        record.push(mean.to_string());
        wtr.write_record(&record)?;
    }

    // Flush the buffer to ensure all data is written
    wtr.flush()?;

    info!(rows = responses.len(), path = %path.display(), "response surface exported");
    Ok(())
}
