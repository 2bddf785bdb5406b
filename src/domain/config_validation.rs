//! Configuration validation.
//!
//! Every key is read from its raw string so that an unparseable number is an
//! error instead of a silent default. The `read_*` helpers are shared with the
//! CLI config builders.

use crate::domain::error::SwingtraderError;
use crate::domain::preset::Preset;
use crate::domain::signal::SignalKind;
use crate::domain::strategy::StopMode;
use crate::domain::trailing::TrailingRule;
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

fn raw(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_none_literal(value: &str) -> bool {
    value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("off")
}

/// Parse a key with `FromStr`; absent or blank reads as `None`.
pub fn read_parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    expected: &str,
) -> Result<Option<T>, SwingtraderError> {
    match raw(config, section, key) {
        None => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(|_| {
            SwingtraderError::invalid(section, key, format!("'{}' is not {}", s, expected))
        }),
    }
}

pub fn read_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, SwingtraderError> {
    let value: Option<f64> = read_parsed(config, section, key, "a number")?;
    match value {
        Some(v) if !v.is_finite() => Err(SwingtraderError::invalid(section, key, "must be finite")),
        other => Ok(other),
    }
}

pub fn read_usize(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<usize>, SwingtraderError> {
    read_parsed(config, section, key, "a non-negative integer")
}

pub fn read_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<bool>, SwingtraderError> {
    match raw(config, section, key) {
        None => Ok(None),
        Some(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Some(true)),
            "false" | "no" | "0" | "off" => Ok(Some(false)),
            _ => Err(SwingtraderError::invalid(
                section,
                key,
                format!("'{}' is not a boolean", s),
            )),
        },
    }
}

pub fn read_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDate>, SwingtraderError> {
    match raw(config, section, key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").map(Some).map_err(|_| {
            SwingtraderError::invalid(section, key, format!("invalid {} format, expected YYYY-MM-DD", key))
        }),
    }
}

/// A value that may be switched off with `none`.
///
/// Absent keeps `default`; `none` gives `Ok(None)`.
pub fn read_optional<T: FromStr + Copy>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Option<T>,
    expected: &str,
) -> Result<Option<T>, SwingtraderError> {
    match raw(config, section, key) {
        None => Ok(default),
        Some(s) if is_none_literal(&s) => Ok(None),
        Some(_) => read_parsed(config, section, key, expected),
    }
}

/// Symbol list from `symbols`, falling back to `symbol`.
pub fn read_symbols(config: &dyn ConfigPort) -> Result<Vec<String>, SwingtraderError> {
    let list = raw(config, "backtest", "symbols").or_else(|| raw(config, "backtest", "symbol"));
    match list {
        None => Err(SwingtraderError::missing("backtest", "symbols")),
        Some(s) => parse_symbols(&s).map_err(|e| SwingtraderError::invalid("backtest", "symbols", e.to_string())),
    }
}

pub fn read_period_list(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<Vec<usize>>, SwingtraderError> {
    let Some(s) = raw(config, section, key) else {
        return Ok(None);
    };
    let mut periods = Vec::new();
    for token in s.split(',') {
        let period: usize = token.trim().parse().map_err(|_| {
            SwingtraderError::invalid(section, key, format!("'{}' is not a period", token.trim()))
        })?;
        if period == 0 {
            return Err(SwingtraderError::invalid(section, key, "periods must be positive"));
        }
        periods.push(period);
    }
    Ok(Some(periods))
}

fn require_positive(section: &str, key: &str, value: Option<f64>) -> Result<(), SwingtraderError> {
    match value {
        Some(v) if v <= 0.0 => Err(SwingtraderError::invalid(section, key, format!("{} must be positive", key))),
        _ => Ok(()),
    }
}

fn require_non_negative(section: &str, key: &str, value: Option<f64>) -> Result<(), SwingtraderError> {
    match value {
        Some(v) if v < 0.0 => Err(SwingtraderError::invalid(section, key, format!("{} must be non-negative", key))),
        _ => Ok(()),
    }
}

fn require_min_period(section: &str, key: &str, value: Option<usize>, min: usize) -> Result<(), SwingtraderError> {
    match value {
        Some(v) if v < min => Err(SwingtraderError::invalid(section, key, format!("{} must be at least {}", key, min))),
        _ => Ok(()),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    validate_initial_capital(config)?;
    validate_dates(config)?;
    validate_rates(config)?;
    read_bool(config, "backtest", "allow_shorting")?;
    read_symbols(config)?;
    validate_data_dir(config)?;
    validate_costs(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    read_parsed::<Preset>(config, "strategy", "preset", "a known preset")?;
    read_parsed::<SignalKind>(config, "strategy", "signal", "a known signal")?;
    validate_position_size(config)?;
    read_parsed::<StopMode>(config, "strategy", "stop_mode", "atr or structural")?;
    require_positive("strategy", "stop_atr_mult", read_f64(config, "strategy", "stop_atr_mult")?)?;
    validate_targets(config)?;
    read_bool(config, "strategy", "breakeven_on_tp1")?;
    validate_trailing(config)?;
    validate_max_holding(config)?;
    read_bool(config, "strategy", "quadrant_exit")?;
    if read_parsed::<u32>(config, "strategy", "emergence_days", "a day count")? == Some(0) {
        return Err(SwingtraderError::invalid(
            "strategy",
            "emergence_days",
            "emergence_days must be positive",
        ));
    }
    require_positive("strategy", "atr_fallback", read_f64(config, "strategy", "atr_fallback")?)?;
    Ok(())
}

pub fn validate_indicator_config(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    const S: &str = "indicators";
    require_min_period(S, "bb_period", read_usize(config, S, "bb_period")?, 2)?;
    require_positive(S, "bb_std", read_f64(config, S, "bb_std")?)?;
    require_positive(S, "squeeze_threshold", read_f64(config, S, "squeeze_threshold")?)?;
    for key in [
        "atr_period",
        "rsi_period",
        "ratio_short",
        "ratio_long",
        "momentum_short",
        "momentum_long",
    ] {
        require_min_period(S, key, read_usize(config, S, key)?, 1)?;
    }
    read_period_list(config, S, "ema_stack")?;

    let fast = read_usize(config, S, "pullback_fast")?;
    let slow = read_usize(config, S, "pullback_slow")?;
    require_min_period(S, "pullback_fast", fast, 1)?;
    require_min_period(S, "pullback_slow", slow, 1)?;
    if let (Some(f), Some(s)) = (fast, slow)
        && f >= s
    {
        return Err(SwingtraderError::invalid(
            S,
            "pullback_fast",
            "pullback_fast must be shorter than pullback_slow",
        ));
    }
    require_positive(S, "pullback_band_atr", read_f64(config, S, "pullback_band_atr")?)?;
    read_bool(config, S, "pullback_quadrant_gate")?;
    Ok(())
}

/// Everything, in the order a run reads it.
pub fn validate_all(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    validate_backtest_config(config)?;
    validate_strategy_config(config)?;
    validate_indicator_config(config)?;
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    require_positive("backtest", "initial_capital", read_f64(config, "backtest", "initial_capital")?)
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    let start = read_date(config, "backtest", "start_date")?;
    let end = read_date(config, "backtest", "end_date")?;
    if let (Some(s), Some(e)) = (start, end)
        && s >= e
    {
        return Err(SwingtraderError::invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_rates(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    if let Some(rf) = read_f64(config, "backtest", "risk_free_rate")?
        && !(0.0..1.0).contains(&rf)
    {
        return Err(SwingtraderError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    require_positive("backtest", "periods_per_year", read_f64(config, "backtest", "periods_per_year")?)
}

fn validate_data_dir(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    match raw(config, "backtest", "data_dir") {
        Some(_) => Ok(()),
        None => Err(SwingtraderError::missing("backtest", "data_dir")),
    }
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    for key in ["commission", "tax", "slippage", "commission_flat"] {
        require_non_negative("costs", key, read_f64(config, "costs", key)?)?;
    }
    Ok(())
}

fn validate_position_size(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    match read_f64(config, "strategy", "position_size")? {
        Some(v) if v <= 0.0 || v > 1.0 => Err(SwingtraderError::invalid(
            "strategy",
            "position_size",
            "position_size must be in (0, 1]",
        )),
        _ => Ok(()),
    }
}

fn validate_targets(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    let tp1 = read_optional::<f64>(config, "strategy", "tp1_r", None, "a number or none")?;
    let tp2 = read_f64(config, "strategy", "tp2_r")?;
    require_positive("strategy", "tp1_r", tp1)?;
    require_positive("strategy", "tp2_r", tp2)?;
    if let (Some(t1), Some(t2)) = (tp1, tp2)
        && t1 >= t2
    {
        return Err(SwingtraderError::invalid(
            "strategy",
            "tp1_r",
            "tp1_r must be below tp2_r",
        ));
    }
    Ok(())
}

fn validate_trailing(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    match raw(config, "strategy", "trailing") {
        None => Ok(()),
        Some(s) => s
            .parse::<TrailingRule>()
            .map(|_| ())
            .map_err(|e| SwingtraderError::invalid("strategy", "trailing", e)),
    }
}

fn validate_max_holding(config: &dyn ConfigPort) -> Result<(), SwingtraderError> {
    match read_optional::<u32>(config, "strategy", "max_holding_bars", None, "a bar count or none")? {
        Some(0) => Err(SwingtraderError::invalid(
            "strategy",
            "max_holding_bars",
            "max_holding_bars must be positive",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    const BASE: &str = "[backtest]\ninitial_capital = 100000\nstart_date = 2020-01-01\nend_date = 2024-12-31\nsymbols = CBA,BHP\ndata_dir = data\n";

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn with_base(extra: &str) -> FileConfigAdapter {
        make_config(&format!("{}{}", BASE, extra))
    }

    fn invalid_key(err: SwingtraderError) -> String {
        match err {
            SwingtraderError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn valid_full_config_passes() {
        let config = with_base(
            r#"
risk_free_rate = 0.03
periods_per_year = 252
allow_shorting = yes

[costs]
commission = 0.001
tax = 0.001
slippage = 0.002
commission_flat = 0

[strategy]
preset = quadrant_emergence
position_size = 0.05
stop_mode = atr
stop_atr_mult = 4
tp1_r = none
tp2_r = 2.5
trailing = 4:0,5:0,6:1
max_holding_bars = none
quadrant_exit = true
emergence_days = 2

[indicators]
bb_period = 20
bb_std = 2
squeeze_threshold = 0.03
ema_stack = 10,20,60,200
pullback_fast = 5
pullback_slow = 25
"#,
        );
        assert!(validate_all(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[backtest]\ninitial_capital = 0\nsymbols = CBA\ndata_dir = d\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "initial_capital");
    }

    #[test]
    fn unparseable_number_is_rejected() {
        let config = make_config("[backtest]\ninitial_capital = lots\nsymbols = CBA\ndata_dir = d\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "initial_capital");
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 01/01/2020\nsymbols = CBA\ndata_dir = d\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "start_date");
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-01-01\nend_date = 2020-01-01\nsymbols = CBA\ndata_dir = d\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "start_date");
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let config = with_base("risk_free_rate = 1.5\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "risk_free_rate");
    }

    #[test]
    fn missing_symbols_fails() {
        let config = make_config("[backtest]\ndata_dir = d\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, SwingtraderError::ConfigMissing { key, .. } if key == "symbols"));
    }

    #[test]
    fn single_symbol_key_accepted() {
        let config = make_config("[backtest]\nsymbol = cba\ndata_dir = d\n");
        assert!(validate_backtest_config(&config).is_ok());
        assert_eq!(read_symbols(&config).unwrap(), vec!["CBA"]);
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let config = make_config("[backtest]\nsymbols = CBA,cba\ndata_dir = d\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "symbols");
    }

    #[test]
    fn missing_data_dir_fails() {
        let config = make_config("[backtest]\nsymbols = CBA\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, SwingtraderError::ConfigMissing { key, .. } if key == "data_dir"));
    }

    #[test]
    fn negative_cost_fails() {
        let config = with_base("[costs]\nslippage = -0.001\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "slippage");
    }

    #[test]
    fn bad_boolean_fails() {
        let config = with_base("allow_shorting = maybe\n");
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "allow_shorting");
    }

    #[test]
    fn unknown_preset_fails() {
        let config = make_config("[strategy]\npreset = momentum\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "preset");
    }

    #[test]
    fn position_size_above_one_fails() {
        let config = make_config("[strategy]\nposition_size = 1.5\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "position_size");
    }

    #[test]
    fn non_positive_multiple_fails() {
        let config = make_config("[strategy]\nstop_atr_mult = 0\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "stop_atr_mult");
    }

    #[test]
    fn tp1_must_be_below_tp2() {
        let config = make_config("[strategy]\ntp1_r = 3\ntp2_r = 2\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "tp1_r");
    }

    #[test]
    fn tp1_none_is_allowed() {
        let config = make_config("[strategy]\ntp1_r = none\ntp2_r = 2\n");
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn bad_trailing_ladder_fails() {
        let config = make_config("[strategy]\ntrailing = 4-0\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "trailing");
    }

    #[test]
    fn zero_max_holding_fails() {
        let config = make_config("[strategy]\nmax_holding_bars = 0\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "max_holding_bars");
    }

    #[test]
    fn zero_emergence_days_fails() {
        let config = make_config("[strategy]\nemergence_days = 0\n");
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "emergence_days");
    }

    #[test]
    fn band_period_needs_two_bars() {
        let config = make_config("[indicators]\nbb_period = 1\n");
        assert_eq!(invalid_key(validate_indicator_config(&config).unwrap_err()), "bb_period");
    }

    #[test]
    fn zero_period_fails() {
        let config = make_config("[indicators]\natr_period = 0\n");
        assert_eq!(invalid_key(validate_indicator_config(&config).unwrap_err()), "atr_period");
    }

    #[test]
    fn negative_period_fails() {
        let config = make_config("[indicators]\nrsi_period = -3\n");
        assert_eq!(invalid_key(validate_indicator_config(&config).unwrap_err()), "rsi_period");
    }

    #[test]
    fn pullback_fast_must_be_shorter() {
        let config = make_config("[indicators]\npullback_fast = 25\npullback_slow = 5\n");
        assert_eq!(invalid_key(validate_indicator_config(&config).unwrap_err()), "pullback_fast");
    }

    #[test]
    fn ema_stack_must_be_periods() {
        let config = make_config("[indicators]\nema_stack = 10,x\n");
        assert_eq!(invalid_key(validate_indicator_config(&config).unwrap_err()), "ema_stack");
        let config = make_config("[indicators]\nema_stack = 10,0\n");
        assert_eq!(invalid_key(validate_indicator_config(&config).unwrap_err()), "ema_stack");
    }

    #[test]
    fn read_optional_semantics() {
        let config = make_config("[strategy]\na = none\nb = 7\n");
        assert_eq!(read_optional::<u32>(&config, "strategy", "a", Some(3), "n").unwrap(), None);
        assert_eq!(read_optional::<u32>(&config, "strategy", "b", Some(3), "n").unwrap(), Some(7));
        assert_eq!(read_optional::<u32>(&config, "strategy", "c", Some(3), "n").unwrap(), Some(3));
    }
}
