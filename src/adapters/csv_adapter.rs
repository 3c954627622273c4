//! Signal store over a directory of CSV files.
//!
//! Layout:
//! - `factor_scores.csv`: `ticker,region,date,factor_name,score,percentile`
//! - `prices.csv`: `ticker,region,date,close`

use crate::domain::error::FactorwalkError;
use crate::domain::observation::{FactorObservation, PriceObservation};
use crate::ports::signal_store::SignalStore;
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const FACTOR_SCORES_FILE: &str = "factor_scores.csv";
pub const PRICES_FILE: &str = "prices.csv";

pub struct CsvSignalStore {
    base_path: PathBuf,
}

impl CsvSignalStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn read_records(&self, file: &str) -> Result<Vec<StringRecord>, FactorwalkError> {
        let path = self.base_path.join(file);
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| FactorwalkError::Store {
                reason: format!("failed to open {}: {}", path.display(), e),
            })?;
        rdr.records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FactorwalkError::StoreQuery {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })
    }
}

fn field<'r>(record: &'r StringRecord, index: usize, name: &str) -> Result<&'r str, FactorwalkError> {
    record.get(index).ok_or_else(|| FactorwalkError::StoreQuery {
        reason: format!("missing {} column", name),
    })
}

fn parse_field<T>(record: &StringRecord, index: usize, name: &str) -> Result<T, FactorwalkError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    field(record, index, name)?
        .parse()
        .map_err(|e| FactorwalkError::StoreQuery {
            reason: format!("invalid {} value: {}", name, e),
        })
}

fn parse_date(record: &StringRecord, index: usize) -> Result<NaiveDate, FactorwalkError> {
    let raw = field(record, index, "date")?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| FactorwalkError::StoreQuery {
        reason: format!("invalid date format '{}': {}", raw, e),
    })
}

impl SignalStore for CsvSignalStore {
    fn get_factor_scores(
        &self,
        factor_names: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<FactorObservation>, FactorwalkError> {
        let mut observations = Vec::new();
        for record in self.read_records(FACTOR_SCORES_FILE)? {
            if field(&record, 1, "region")? != region {
                continue;
            }
            let factor_name = field(&record, 3, "factor_name")?;
            if !factor_names.contains(factor_name) {
                continue;
            }
            let date = parse_date(&record, 2)?;
            if date < start_date || date > end_date {
                continue;
            }
            observations.push(FactorObservation {
                ticker: field(&record, 0, "ticker")?.to_string(),
                date,
                factor_name: factor_name.to_string(),
                score: parse_field(&record, 4, "score")?,
                percentile: parse_field(&record, 5, "percentile")?,
            });
        }
        observations.sort_by(|a, b| {
            (a.date, &a.factor_name, &a.ticker).cmp(&(b.date, &b.factor_name, &b.ticker))
        });
        Ok(observations)
    }

    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FactorwalkError> {
        let mut prices = Vec::new();
        for record in self.read_records(PRICES_FILE)? {
            if field(&record, 1, "region")? != region {
                continue;
            }
            let ticker = field(&record, 0, "ticker")?;
            if !tickers.contains(ticker) {
                continue;
            }
            let date = parse_date(&record, 2)?;
            if date < start_date || date > end_date {
                continue;
            }
            prices.push(PriceObservation {
                ticker: ticker.to_string(),
                date,
                close: parse_field(&record, 3, "close")?,
            });
        }
        prices.sort_by(|a, b| (&a.ticker, a.date).cmp(&(&b.ticker, b.date)));
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test_data() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(FACTOR_SCORES_FILE),
            "ticker,region,date,factor_name,score,percentile\n\
             AAA,US,2024-01-15,value,1.5,80\n\
             BBB,US,2024-01-15,value,-0.5,20\n\
             AAA,US,2024-01-15,momentum,0.3,60\n\
             AAA,US,2024-01-16,value,1.4,75\n\
             005930,KR,2024-01-15,value,2.0,90\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(PRICES_FILE),
            "ticker,region,date,close\n\
             AAA,US,2024-01-16,101.0\n\
             AAA,US,2024-01-15,100.0\n\
             BBB,US,2024-01-15,50.0\n\
             005930,KR,2024-01-15,70000\n",
        )
        .unwrap();
        dir
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn factor_scores_filtered_by_name_region_and_date() {
        let dir = setup_test_data();
        let store = CsvSignalStore::new(dir.path());

        let obs = store
            .get_factor_scores(&set(&["value"]), "US", d(15), d(15))
            .unwrap();
        assert_eq!(obs.len(), 2);
        assert!(obs.iter().all(|o| o.factor_name == "value" && o.date == d(15)));
        assert_eq!(obs[0].ticker, "AAA");
        assert_eq!(obs[0].score, 1.5);
        assert_eq!(obs[0].percentile, 80.0);

        let kr = store
            .get_factor_scores(&set(&["value"]), "KR", d(1), d(31))
            .unwrap();
        assert_eq!(kr.len(), 1);
        assert_eq!(kr[0].ticker, "005930");
    }

    #[test]
    fn prices_sorted_by_ticker_then_date() {
        let dir = setup_test_data();
        let store = CsvSignalStore::new(dir.path());

        let prices = store
            .get_prices(&set(&["AAA", "BBB"]), "US", d(1), d(31))
            .unwrap();
        assert_eq!(prices.len(), 3);
        assert_eq!((prices[0].ticker.as_str(), prices[0].date), ("AAA", d(15)));
        assert_eq!((prices[1].ticker.as_str(), prices[1].date), ("AAA", d(16)));
        assert_eq!(prices[2].ticker, "BBB");
    }

    #[test]
    fn empty_range_is_empty_not_error() {
        let dir = setup_test_data();
        let store = CsvSignalStore::new(dir.path());

        let prices = store.get_prices(&set(&["AAA"]), "US", d(20), d(25)).unwrap();
        assert!(prices.is_empty());
        let scores = store
            .get_factor_scores(&set(&["quality"]), "US", d(1), d(31))
            .unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn missing_file_is_store_error() {
        let dir = TempDir::new().unwrap();
        let store = CsvSignalStore::new(dir.path());
        let err = store.get_prices(&set(&["AAA"]), "US", d(1), d(2)).unwrap_err();
        assert!(matches!(err, FactorwalkError::Store { .. }));
    }

    #[test]
    fn bad_value_is_query_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PRICES_FILE),
            "ticker,region,date,close\nAAA,US,2024-01-15,abc\n",
        )
        .unwrap();
        let store = CsvSignalStore::new(dir.path());
        let err = store.get_prices(&set(&["AAA"]), "US", d(1), d(31)).unwrap_err();
        assert!(matches!(err, FactorwalkError::StoreQuery { .. }));
    }
}
