//! Report output port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SwingtraderError;
use crate::domain::metrics::PerformanceReport;
use std::path::Path;

pub trait ReportPort {
    /// Write the run's trades, equity curve and summary under `output_dir`.
    fn write(
        &self,
        result: &BacktestResult,
        report: &PerformanceReport,
        output_dir: &Path,
    ) -> Result<(), SwingtraderError>;
}
