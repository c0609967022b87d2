//! Metrics capability and its implementations.

/// Optional knobs for a metric observation.
///
/// Replaces the positional `(sampleRate?, tags?)` overloads of statsd-style
/// clients with one builder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricOptions {
    pub sample_rate: Option<f64>,
    pub tags: Vec<(String, String)>,
}

impl MetricOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }
}

/// Counter / histogram / gauge sink. Each call may name several stats.
pub trait Metrics: Send + Sync {
    fn increment(&self, stats: &[&str], value: f64, options: &MetricOptions);
    fn histogram(&self, stats: &[&str], value: f64, options: &MetricOptions);
    fn gauge(&self, stats: &[&str], value: f64, options: &MetricOptions);
}

/// Discards every observation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment(&self, _stats: &[&str], _value: f64, _options: &MetricOptions) {}
    fn histogram(&self, _stats: &[&str], _value: f64, _options: &MetricOptions) {}
    fn gauge(&self, _stats: &[&str], _value: f64, _options: &MetricOptions) {}
}

/// Forwards to the global [`metrics`] recorder.
///
/// Tags become labels. Sampling is left to the installed recorder, which
/// aggregates every observation, so `sample_rate` is ignored here. Counters
/// are integral: increments are rounded to the nearest whole number, and
/// negative ones are dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsFacade;

impl Metrics for MetricsFacade {
    fn increment(&self, stats: &[&str], value: f64, options: &MetricOptions) {
        let Some(delta) = counter_delta(value) else {
            return;
        };
        for stat in stats {
            metrics::counter!(stat.to_string(), &options.tags).increment(delta);
        }
    }

    fn histogram(&self, stats: &[&str], value: f64, options: &MetricOptions) {
        for stat in stats {
            metrics::histogram!(stat.to_string(), &options.tags).record(value);
        }
    }

    fn gauge(&self, stats: &[&str], value: f64, options: &MetricOptions) {
        for stat in stats {
            metrics::gauge!(stat.to_string(), &options.tags).set(value);
        }
    }
}

fn counter_delta(value: f64) -> Option<u64> {
    (value >= 0.0).then(|| value.round() as u64)
}
