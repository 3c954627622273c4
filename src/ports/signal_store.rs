//! Read-only access to the external factor and price store.

use crate::domain::error::FactorwalkError;
use crate::domain::observation::{FactorObservation, PriceObservation};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Both calls return an empty vector, not an error, when nothing exists in range.
/// Date bounds are inclusive.
pub trait SignalStore {
    fn get_factor_scores(
        &self,
        factor_names: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<FactorObservation>, FactorwalkError>;

    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FactorwalkError>;
}

impl<T: SignalStore + ?Sized> SignalStore for &T {
    fn get_factor_scores(
        &self,
        factor_names: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<FactorObservation>, FactorwalkError> {
        (**self).get_factor_scores(factor_names, region, start_date, end_date)
    }

    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FactorwalkError> {
        (**self).get_prices(tickers, region, start_date, end_date)
    }
}
