mod compressor;
mod forecast_set;

pub use compressor::compress_history;
pub use forecast_set::{build_forecast_sets, ForecastSet};
