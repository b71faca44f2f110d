//! Streaming group-operator layer between the tidecast engine and the
//! host columnar engine.
//!
//! The host drives each operator in three phases: bind (schemas and
//! parameters validated before any row), update (row batches bucketed per
//! group), finalize (output drained in batches of at most
//! [`types::VECTOR_SIZE`] rows, signalled by
//! [`operator::FinalizeResult`]).

pub mod analytics_op;
pub mod forecast_op;
pub mod gapfill;
pub mod operator;
pub mod types;

pub use analytics_op::{ChangepointOperator, MstlOperator, QualityOperator, StatsOperator};
pub use forecast_op::{ForecastOperator, ForecastOptions};
pub use gapfill::{FillForwardOperator, GapFillOperator};
pub use operator::{ErrorPolicy, FinalizeResult, GroupAccumulator, GroupBuffer};
pub use types::{Column, DataType, RowBatch, ScalarValue, Schema, VECTOR_SIZE};
