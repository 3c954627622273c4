//! Typed engine configuration with defaults and range checks.

use crate::domain::combiner::CombinerPolicy;
use crate::domain::error::FactorwalkError;
use crate::domain::execution::CostModel;
use crate::domain::ic::{
    DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_SIGNIFICANCE_THRESHOLD, IcParams, MAX_HORIZON_DAYS,
};
use crate::domain::simulator::SimulationConfig;
use crate::domain::walk_forward::WindowLength;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::str::FromStr;

const SECTION: &str = "engine";

/// Every recognised `[engine]` option.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub factors: BTreeSet<String>,
    pub region: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub train_window: WindowLength,
    pub test_window: WindowLength,
    pub top_fraction: f64,
    /// Trading days between rebalances.
    pub rebalance_cadence: usize,
    /// Forward-return horizon for IC, in trading days.
    pub holding_period: usize,
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub initial_capital: f64,
    pub ic_min_sample_size: usize,
    pub ic_significance_threshold: f64,
    pub trading_days_per_year: f64,
    pub policies: Vec<CombinerPolicy>,
    pub sign_aware_weights: bool,
}

impl EngineConfig {
    /// Defaults for everything except the factor set and date range.
    pub fn new<I, S>(factors: I, start_date: NaiveDate, end_date: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EngineConfig {
            factors: factors.into_iter().map(Into::into).collect(),
            region: "US".to_string(),
            start_date,
            end_date,
            train_window: WindowLength::Years(1),
            test_window: WindowLength::Years(1),
            top_fraction: 0.45,
            rebalance_cadence: 63,
            holding_period: 63,
            commission_rate: 0.00015,
            slippage_rate: 0.001,
            initial_capital: 100_000_000.0,
            ic_min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            ic_significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            trading_days_per_year: 252.0,
            policies: CombinerPolicy::ALL.to_vec(),
            sign_aware_weights: false,
        }
    }

    /// Read the `[engine]` section. Values that fail to parse are errors, not
    /// silently replaced by defaults. The result is not yet validated.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FactorwalkError> {
        let factors = config.get_list(SECTION, "factors");
        let start_date = required_date(config, "start_date")?;
        let end_date = required_date(config, "end_date")?;
        let mut engine = EngineConfig::new(factors, start_date, end_date);

        if let Some(region) = config.get_string(SECTION, "region") {
            engine.region = region.trim().to_string();
        }
        engine.train_window = parsed(config, "train_window", engine.train_window)?;
        engine.test_window = parsed(config, "test_window", engine.test_window)?;
        engine.top_fraction = parsed(config, "top_fraction", engine.top_fraction)?;
        engine.rebalance_cadence = parsed(config, "rebalance_cadence", engine.rebalance_cadence)?;
        // holding period follows the cadence unless set explicitly
        engine.holding_period = parsed(config, "holding_period", engine.rebalance_cadence)?;
        engine.commission_rate = parsed(config, "commission_rate", engine.commission_rate)?;
        engine.slippage_rate = parsed(config, "slippage_rate", engine.slippage_rate)?;
        engine.initial_capital = parsed(config, "initial_capital", engine.initial_capital)?;
        engine.ic_min_sample_size =
            parsed(config, "ic_min_sample_size", engine.ic_min_sample_size)?;
        engine.ic_significance_threshold = parsed(
            config,
            "ic_significance_threshold",
            engine.ic_significance_threshold,
        )?;
        engine.trading_days_per_year =
            parsed(config, "trading_days_per_year", engine.trading_days_per_year)?;
        engine.sign_aware_weights = config.get_bool(SECTION, "sign_aware_weights", false);

        let policies = config.get_list(SECTION, "policies");
        if !policies.is_empty() {
            engine.policies = policies
                .iter()
                .map(|p| {
                    p.parse::<CombinerPolicy>()
                        .map_err(|e| FactorwalkError::invalid("policies", e))
                })
                .collect::<Result<_, _>>()?;
        }

        Ok(engine)
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), FactorwalkError> {
        if self.factors.is_empty() {
            return Err(FactorwalkError::ConfigMissing {
                section: SECTION.to_string(),
                key: "factors".to_string(),
            });
        }
        if self.region.is_empty() {
            return Err(FactorwalkError::invalid("region", "must not be empty"));
        }
        if self.start_date >= self.end_date {
            return Err(FactorwalkError::invalid(
                "start_date",
                "start_date must be before end_date",
            ));
        }
        if self.train_window.is_zero() {
            return Err(FactorwalkError::invalid("train_window", "must be positive"));
        }
        if self.test_window.is_zero() {
            return Err(FactorwalkError::invalid("test_window", "must be positive"));
        }
        if !(self.top_fraction > 0.0 && self.top_fraction <= 1.0) {
            return Err(FactorwalkError::invalid(
                "top_fraction",
                "must be in (0, 1]",
            ));
        }
        check_trading_days("rebalance_cadence", self.rebalance_cadence)?;
        check_trading_days("holding_period", self.holding_period)?;
        check_rate("commission_rate", self.commission_rate)?;
        check_rate("slippage_rate", self.slippage_rate)?;
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(FactorwalkError::invalid(
                "initial_capital",
                "must be positive",
            ));
        }
        if self.ic_min_sample_size < 3 {
            return Err(FactorwalkError::invalid(
                "ic_min_sample_size",
                "must be at least 3",
            ));
        }
        if !(self.ic_significance_threshold > 0.0 && self.ic_significance_threshold < 1.0) {
            return Err(FactorwalkError::invalid(
                "ic_significance_threshold",
                "must be in (0, 1)",
            ));
        }
        if !(self.trading_days_per_year.is_finite() && self.trading_days_per_year > 0.0) {
            return Err(FactorwalkError::invalid(
                "trading_days_per_year",
                "must be positive",
            ));
        }
        if self.policies.is_empty() {
            return Err(FactorwalkError::invalid(
                "policies",
                "at least one policy is required",
            ));
        }
        Ok(())
    }

    pub fn ic_params(&self) -> IcParams {
        IcParams {
            holding_period: self.holding_period,
            min_sample_size: self.ic_min_sample_size,
            significance_threshold: self.ic_significance_threshold,
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel {
            commission_rate: self.commission_rate,
            slippage_rate: self.slippage_rate,
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            initial_capital: self.initial_capital,
            rebalance_cadence: self.rebalance_cadence,
            costs: self.cost_model(),
        }
    }

    /// Rebalances per year, 4 for a 63-day cadence over 252 trading days.
    pub fn periods_per_year(&self) -> f64 {
        self.trading_days_per_year / self.rebalance_cadence.max(1) as f64
    }
}

fn check_trading_days(key: &str, value: usize) -> Result<(), FactorwalkError> {
    if value == 0 {
        return Err(FactorwalkError::invalid(key, "must be at least 1 trading day"));
    }
    if value > MAX_HORIZON_DAYS {
        return Err(FactorwalkError::invalid(
            key,
            format!("must be at most {MAX_HORIZON_DAYS} trading days"),
        ));
    }
    Ok(())
}

fn check_rate(key: &str, value: f64) -> Result<(), FactorwalkError> {
    if !(0.0..1.0).contains(&value) {
        return Err(FactorwalkError::invalid(key, "must be in [0, 1)"));
    }
    Ok(())
}

fn required_date(config: &dyn ConfigPort, key: &str) -> Result<NaiveDate, FactorwalkError> {
    let raw = config
        .get_string(SECTION, key)
        .ok_or_else(|| FactorwalkError::ConfigMissing {
            section: SECTION.to_string(),
            key: key.to_string(),
        })?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        FactorwalkError::invalid(key, format!("invalid {key} '{raw}', expected YYYY-MM-DD"))
    })
}

fn parsed<T>(config: &dyn ConfigPort, key: &str, default: T) -> Result<T, FactorwalkError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get_string(SECTION, key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FactorwalkError::invalid(key, format!("'{raw}': {e}"))),
    }
}
