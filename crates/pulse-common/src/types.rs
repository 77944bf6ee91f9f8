use serde::{Deserialize, Serialize};

/// Kind of a metric. Gauges are last-writer-wins floats, counters are
/// additive integers whose stored form is the running absolute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(format!("unknown metric kind: {s}")),
        }
    }
}

/// Wire and snapshot representation of a single metric.
///
/// Exactly one of `delta`/`value` is populated on a write, matching the
/// kind; both absent means the record is a read request for `id`.
///
/// ```
/// use pulse_common::types::Metric;
///
/// let m = Metric::counter("requests", 10);
/// assert_eq!(serde_json::to_string(&m).unwrap(),
///            r#"{"id":"requests","type":"counter","delta":10}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// A write must carry the payload field matching its kind.
    pub fn has_payload(&self) -> bool {
        match self.kind {
            MetricKind::Gauge => self.value.is_some(),
            MetricKind::Counter => self.delta.is_some(),
        }
    }
}

/// Formats a gauge the way it appears in text responses and the HTML
/// listing: shortest representation that round-trips, no trailing zeros.
pub fn format_gauge(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let mut s = format!("{v}");
        if s.contains('.') {
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [MetricKind::Gauge, MetricKind::Counter] {
            assert_eq!(kind.to_string().parse::<MetricKind>().unwrap(), kind);
        }
        assert!("histogram".parse::<MetricKind>().is_err());
    }

    #[test]
    fn gauge_serializes_without_delta() {
        let m = Metric::gauge("temperature", 23.5);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"temperature","type":"gauge","value":23.5}"#);
    }

    #[test]
    fn read_request_deserializes_without_payload() {
        let m: Metric = serde_json::from_str(r#"{"id":"x","type":"counter"}"#).unwrap();
        assert_eq!(m.kind, MetricKind::Counter);
        assert!(m.delta.is_none());
        assert!(!m.has_payload());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let res = serde_json::from_str::<Metric>(r#"{"id":"x","type":"timer"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn gauge_formatting_drops_trailing_zeros() {
        assert_eq!(format_gauge(1.0), "1");
        assert_eq!(format_gauge(23.5), "23.5");
        assert_eq!(format_gauge(-0.25), "-0.25");
    }
}
