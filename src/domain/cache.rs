//! Read-through memoisation of signal store reads for one run.

use crate::domain::error::FactorwalkError;
use crate::domain::observation::{FactorObservation, PriceObservation};
use crate::ports::signal_store::SignalStore;
use chrono::NaiveDate;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

type CacheKey = (BTreeSet<String>, String, NaiveDate, NaiveDate);

/// Wraps a [`SignalStore`] and answers repeated identical queries from
/// memory. Store data is immutable for a run, so a hit is always current.
/// Errors are not cached.
pub struct CachedSignalStore<S> {
    inner: S,
    factor_scores: RefCell<HashMap<CacheKey, Vec<FactorObservation>>>,
    prices: RefCell<HashMap<CacheKey, Vec<PriceObservation>>>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<S: SignalStore> CachedSignalStore<S> {
    pub fn new(inner: S) -> Self {
        CachedSignalStore {
            inner,
            factor_scores: RefCell::new(HashMap::new()),
            prices: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn lookup<T: Clone>(
        &self,
        cache: &RefCell<HashMap<CacheKey, Vec<T>>>,
        key: CacheKey,
        fetch: impl FnOnce() -> Result<Vec<T>, FactorwalkError>,
    ) -> Result<Vec<T>, FactorwalkError> {
        if let Some(found) = cache.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(found.clone());
        }
        self.misses.set(self.misses.get() + 1);
        let fetched = fetch()?;
        debug!(rows = fetched.len(), start = %key.2, end = %key.3, "signal store read cached");
        cache.borrow_mut().insert(key, fetched.clone());
        Ok(fetched)
    }
}

impl<S: SignalStore> SignalStore for CachedSignalStore<S> {
    fn get_factor_scores(
        &self,
        factor_names: &BTreeSet<String>,
        region: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FactorObservation>, FactorwalkError> {
        let key = (factor_names.clone(), region.to_string(), start, end);
        self.lookup(&self.factor_scores, key, || {
            self.inner
                .get_factor_scores(factor_names, region, start, end)
        })
    }

    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        region: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FactorwalkError> {
        let key = (tickers.clone(), region.to_string(), start, end);
        self.lookup(&self.prices, key, || {
            self.inner.get_prices(tickers, region, start, end)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingStore {
        calls: Cell<usize>,
        fail: bool,
    }

    impl SignalStore for CountingStore {
        fn get_factor_scores(
            &self,
            _factor_names: &BTreeSet<String>,
            _region: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<FactorObservation>, FactorwalkError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(FactorwalkError::Store {
                    reason: "offline".into(),
                });
            }
            Ok(vec![FactorObservation {
                ticker: "AAA".into(),
                date: start,
                factor_name: "value".into(),
                score: 1.0,
                percentile: 50.0,
            }])
        }

        fn get_prices(
            &self,
            _tickers: &BTreeSet<String>,
            _region: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceObservation>, FactorwalkError> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![PriceObservation {
                ticker: "AAA".into(),
                date: start,
                close: 10.0,
            }])
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn repeated_reads_hit_the_cache() {
        let cache = CachedSignalStore::new(CountingStore::default());
        let factors = names(&["value"]);

        let first = cache.get_factor_scores(&factors, "US", d(1), d(5)).unwrap();
        let second = cache.get_factor_scores(&factors, "US", d(1), d(5)).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.into_inner().calls.get(), 1);
    }

    #[test]
    fn different_keys_miss() {
        let cache = CachedSignalStore::new(CountingStore::default());
        let tickers = names(&["AAA"]);

        cache.get_prices(&tickers, "US", d(1), d(5)).unwrap();
        cache.get_prices(&tickers, "US", d(1), d(6)).unwrap();
        cache.get_prices(&tickers, "KR", d(1), d(5)).unwrap();
        cache.get_prices(&names(&["AAA", "BBB"]), "US", d(1), d(5)).unwrap();

        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.misses(), 4);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = CachedSignalStore::new(CountingStore {
            fail: true,
            ..Default::default()
        });
        let factors = names(&["value"]);

        assert!(cache.get_factor_scores(&factors, "US", d(1), d(5)).is_err());
        assert!(cache.get_factor_scores(&factors, "US", d(1), d(5)).is_err());
        assert_eq!(cache.into_inner().calls.get(), 2);
    }
}
