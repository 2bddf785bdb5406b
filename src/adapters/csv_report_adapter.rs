//! CSV report adapter.
//!
//! Writes three files into the output directory:
//! - `trades.csv`: one row per closed trade;
//! - `equity.csv`: one row per simulated date;
//! - `summary.csv`: `metric,value` rows for the performance report.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SwingtraderError;
use crate::domain::metrics::PerformanceReport;
use crate::domain::position::ExitReason;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

pub struct CsvReportAdapter;

fn serialize_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), SwingtraderError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// `(metric, value)` rows in display order.
pub fn summary_rows(result: &BacktestResult, report: &PerformanceReport) -> Vec<(String, String)> {
    let mut rows: Vec<(String, String)> = vec![
        ("strategy".into(), result.strategy_name.clone()),
        ("initial_capital".into(), format!("{:.2}", report.initial_capital)),
        ("final_equity".into(), format!("{:.2}", report.final_equity)),
        ("total_return".into(), format!("{:.6}", report.total_return)),
        ("annualized_return".into(), format!("{:.6}", report.annualized_return)),
        ("sharpe_ratio".into(), format!("{:.4}", report.sharpe_ratio)),
        ("sortino_ratio".into(), format!("{:.4}", report.sortino_ratio)),
        ("calmar_ratio".into(), format!("{:.4}", report.calmar_ratio)),
        ("max_drawdown".into(), format!("{:.6}", report.max_drawdown)),
        (
            "max_drawdown_duration".into(),
            report.max_drawdown_duration.to_string(),
        ),
        ("total_trades".into(), report.total_trades.to_string()),
        ("trades_won".into(), report.trades_won.to_string()),
        ("trades_lost".into(), report.trades_lost.to_string()),
        ("trades_breakeven".into(), report.trades_breakeven.to_string()),
        ("win_rate".into(), format!("{:.4}", report.win_rate)),
        ("profit_factor".into(), format!("{:.4}", report.profit_factor)),
        ("expectancy".into(), format!("{:.2}", report.expectancy)),
        ("avg_win".into(), format!("{:.2}", report.avg_win)),
        ("avg_loss".into(), format!("{:.2}", report.avg_loss)),
        ("largest_win".into(), format!("{:.2}", report.largest_win)),
        ("largest_loss".into(), format!("{:.2}", report.largest_loss)),
        ("avg_holding_bars".into(), format!("{:.2}", report.avg_holding_bars)),
        ("total_costs".into(), format!("{:.2}", report.total_costs)),
        ("signals_armed".into(), result.signals_armed.to_string()),
        ("fills_refused".into(), result.fills_refused.to_string()),
    ];

    for reason in ExitReason::ALL {
        rows.push((
            format!("exits.{}", reason),
            report.exit_count(reason).to_string(),
        ));
    }

    for s in &report.per_symbol {
        rows.push((format!("symbol.{}.trades", s.symbol), s.total_trades.to_string()));
        rows.push((format!("symbol.{}.pnl", s.symbol), format!("{:.2}", s.total_pnl)));
        rows.push((format!("symbol.{}.win_rate", s.symbol), format!("{:.4}", s.win_rate)));
    }

    if !result.quarantined.is_empty() {
        rows.push(("quarantined".into(), result.quarantined.join(";")));
    }

    rows
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        report: &PerformanceReport,
        output_dir: &Path,
    ) -> Result<(), SwingtraderError> {
        fs::create_dir_all(output_dir)?;

        serialize_rows(&output_dir.join("trades.csv"), &result.closed_trades)?;
        serialize_rows(&output_dir.join("equity.csv"), &result.equity_curve)?;

        let mut wtr = csv::Writer::from_path(output_dir.join("summary.csv"))?;
        wtr.write_record(["metric", "value"])?;
        for (metric, value) in summary_rows(result, report) {
            wtr.write_record([metric, value])?;
        }
        wtr.flush()?;

        info!(dir = %output_dir.display(), "report written");
        Ok(())
    }
}
