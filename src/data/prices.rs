use crate::domain::{PricePoint, PriceSeries};
use crate::error::{BacktestError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::io::Read;
use std::path::Path;

const DATE_COLUMNS: [&str; 4] = ["Date", "date", "timestamp", "Datetime"];
/// Adjusted close first, plain close as fallback
const PRICE_COLUMNS: [&str; 3] = ["Adj Close", "Close", "close"];

/// Load a price series from a CSV file with a header row.
pub fn load_price_csv(path: &Path) -> Result<PriceSeries> {
    if !path.exists() {
        return Err(BacktestError::PriceFileNotFound(path.to_path_buf()));
    }
    let reader = csv::Reader::from_path(path)?;
    read_prices(reader)
}

/// Parse prices from any reader holding CSV text.
pub fn read_price_csv<R: Read>(input: R) -> Result<PriceSeries> {
    read_prices(csv::Reader::from_reader(input))
}

fn read_prices<R: Read>(mut reader: csv::Reader<R>) -> Result<PriceSeries> {
    let headers = reader.headers()?.clone();
    let find = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| headers.iter().position(|h| h.trim() == *name))
    };
    let date_col = find(&DATE_COLUMNS[..]).ok_or_else(|| {
        BacktestError::InvalidPriceData(format!("no date column (expected one of {:?})", DATE_COLUMNS))
    })?;
    let price_col = find(&PRICE_COLUMNS[..]).ok_or_else(|| {
        BacktestError::InvalidPriceData(format!(
            "no price column (expected one of {:?})",
            PRICE_COLUMNS
        ))
    })?;

    let mut points = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        // header is line 1
        let line = row + 2;
        let raw_date = record.get(date_col).unwrap_or("").trim();
        let raw_price = record.get(price_col).unwrap_or("").trim();

        let timestamp = parse_timestamp(raw_date).ok_or_else(|| {
            BacktestError::InvalidPriceData(format!("line {}: unparseable date '{}'", line, raw_date))
        })?;
        let price: f64 = raw_price.parse().map_err(|_| {
            BacktestError::InvalidPriceData(format!(
                "line {}: unparseable price '{}'",
                line, raw_price
            ))
        })?;
        points.push(PricePoint { timestamp, price });
    }

    points.sort_by_key(|p| p.timestamp);
    PriceSeries::new(points)
}

/// Fewest digits read as Unix milliseconds; shorter integers such as a bare
/// year are rejected as dates.
const MIN_EPOCH_MILLIS_DIGITS: usize = 10;

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, RFC 3339, or Unix milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if raw.len() < MIN_EPOCH_MILLIS_DIGITS || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.naive_utc())
}
