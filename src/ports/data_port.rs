//! Price data access port.

use crate::domain::error::SwingtraderError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` within `[start_date, end_date]`, oldest first.
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, SwingtraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, SwingtraderError>;

    /// First date, last date and bar count, or `None` if the symbol has no data.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SwingtraderError>;
}
