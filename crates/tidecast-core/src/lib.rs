//! Core time-series forecasting and analytics engine for tidecast.
//!
//! This crate holds the model kernels (ETS with analytical gradients,
//! ARIMA, theta, multi-seasonal and intermittent families), the bounded
//! L-BFGS optimizer, evaluation metrics and cross-validation, and the
//! descriptive/diagnostic kernels the streaming operator layer drives.

pub mod changepoint;
pub mod cv;
pub mod decomposition;
pub mod error;
pub mod ets;
pub mod ets_checkpoint;
pub mod frequency;
pub mod imputation;
pub mod lbfgs;
pub mod metrics;
pub mod models;
pub mod numeric;
pub mod perf;
pub mod quality;
pub mod series;
pub mod simd;
pub mod stats;

// Re-exports for convenience
pub use changepoint::{detect_changepoints_bocpd, BocpdResult};
pub use cv::{evaluate as cross_validate, generate_folds, CvFold, CvResults, CvStrategy, FoldSpec};
pub use decomposition::{mstl_decompose, MstlDecomposition};
pub use error::{ForecastError, Result};
pub use ets::{
    neg_log_likelihood_with_gradients, run_backward, run_forward, EtsConfig, EtsErrorKind,
    EtsSeasonKind, EtsTrendKind, ForwardPass, GradientComponents,
};
pub use ets_checkpoint::{Checkpoint, CheckpointConfig};
pub use frequency::{generate_range, DateAxisKind, Frequency};
pub use imputation::fill_nulls_interpolate;
pub use lbfgs::{minimize, LbfgsResult, Options as LbfgsOptions};
pub use metrics::{
    bias, coverage, mae, mape, mase, mqloss, mse, quantile_loss, r2, rmae, rmse, smape,
};
pub use models::{
    create as create_forecaster, supported_models, Forecast, Forecaster, MethodNameWrapper,
    ModelParams, ParamValue,
};
pub use numeric::{median, safe_divide, siegel_repeated_medians};
pub use quality::{compute_data_quality, DataQuality};
pub use series::{AxisKind, TimeSeries, TimeSeriesBuilder};
pub use stats::{compute_ts_stats, compute_ts_stats_with_dates, TsStats};
