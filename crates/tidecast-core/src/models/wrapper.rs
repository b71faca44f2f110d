//! Name-override wrapper for disambiguating models in multi-model runs.

use crate::error::{ForecastError, Result};
use crate::series::TimeSeries;

use super::{Forecast, Forecaster};

/// Delegates fit and predict to a wrapped model but reports a caller-chosen
/// name. The wrapper owns the inner model; callers may borrow it via
/// [`MethodNameWrapper::inner`] but cannot detach it.
#[derive(Debug)]
pub struct MethodNameWrapper {
    inner: Box<dyn Forecaster>,
    custom_name: String,
}

impl MethodNameWrapper {
    pub fn new(inner: Box<dyn Forecaster>, custom_name: impl Into<String>) -> Result<Self> {
        let custom_name = custom_name.into();
        if custom_name.is_empty() {
            return Err(ForecastError::InvalidInput(
                "method_name cannot be empty".to_string(),
            ));
        }
        log::debug!(
            "wrapping model '{}' as '{}'",
            inner.name(),
            custom_name
        );
        Ok(Self { inner, custom_name })
    }

    /// Borrow the wrapped model.
    pub fn inner(&self) -> &dyn Forecaster {
        self.inner.as_ref()
    }
}

impl Forecaster for MethodNameWrapper {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        self.inner.fit(ts)
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let mut forecast = self.inner.predict(horizon)?;
        forecast.model_name = self.custom_name.clone();
        Ok(forecast)
    }

    fn name(&self) -> &str {
        &self.custom_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::baseline::Naive;
    use crate::series::TimeSeriesBuilder;

    fn series(values: Vec<f64>) -> TimeSeries {
        TimeSeriesBuilder::new().values(values).build().unwrap()
    }

    #[test]
    fn test_wrapper_overrides_name_and_delegates() {
        let mut wrapper =
            MethodNameWrapper::new(Box::new(Naive::new()), "baseline_v2").unwrap();
        assert_eq!(wrapper.name(), "baseline_v2");

        wrapper.fit(&series(vec![1.0, 2.0, 3.0])).unwrap();
        let forecast = wrapper.predict(2).unwrap();
        assert_eq!(forecast.point, vec![3.0, 3.0]);
        assert_eq!(forecast.model_name, "baseline_v2");
    }

    #[test]
    fn test_wrapper_rejects_empty_name() {
        assert!(MethodNameWrapper::new(Box::new(Naive::new()), "").is_err());
    }

    #[test]
    fn test_inner_borrow_sees_original_name() {
        let wrapper = MethodNameWrapper::new(Box::new(Naive::new()), "renamed").unwrap();
        assert_eq!(wrapper.inner().name(), "Naive");
    }

    #[test]
    fn test_wrapper_propagates_not_fitted() {
        let wrapper = MethodNameWrapper::new(Box::new(Naive::new()), "renamed").unwrap();
        assert!(wrapper.predict(1).is_err());
    }
}
