//! Per-field telemetry summary

use std::collections::BTreeMap;

use crate::report::FieldSummary;
use crate::telemetry::{FieldValue, Reading, TelemetrySnapshot};

#[derive(Debug, Clone, PartialEq)]
enum Accumulator {
    Unsupported,
    Numeric {
        min: f64,
        max: f64,
        last: f64,
        samples: usize,
    },
    Enum {
        last: String,
        samples: usize,
    },
}

impl Accumulator {
    fn samples(&self) -> usize {
        match self {
            Self::Unsupported => 0,
            Self::Numeric { samples, .. } | Self::Enum { samples, .. } => *samples,
        }
    }

    fn record(&mut self, reading: &Reading) {
        let seen = self.samples();
        match reading.value() {
            None => {}
            Some(FieldValue::Enum(label)) => {
                *self = Self::Enum {
                    last: label.clone(),
                    samples: seen + 1,
                }
            }
            Some(value) => {
                let x = value.as_f64().unwrap_or_default();
                *self = match *self {
                    Self::Numeric { min, max, .. } => Self::Numeric {
                        min: min.min(x),
                        max: max.max(x),
                        last: x,
                        samples: seen + 1,
                    },
                    _ => Self::Numeric {
                        min: x,
                        max: x,
                        last: x,
                        samples: seen + 1,
                    },
                }
            }
        }
    }

    fn finish(self) -> FieldSummary {
        match self {
            Self::Unsupported => FieldSummary::Unsupported { unsupported: true },
            Self::Numeric {
                min,
                max,
                last,
                samples,
            } => FieldSummary::Numeric {
                min,
                max,
                last,
                samples,
            },
            Self::Enum { last, samples } => FieldSummary::Enum { last, samples },
        }
    }
}

/// Running min/max/last per field
#[derive(Debug, Clone, Default)]
pub(crate) struct Summary {
    fields: BTreeMap<String, Accumulator>,
}

impl Summary {
    pub(crate) fn record(&mut self, snapshot: &TelemetrySnapshot) {
        for (field, reading) in &snapshot.fields {
            self.fields
                .entry(field.clone())
                .or_insert(Accumulator::Unsupported)
                .record(reading);
        }
    }

    pub(crate) fn finish(self) -> BTreeMap<String, FieldSummary> {
        self.fields
            .into_iter()
            .map(|(field, acc)| (field, acc.finish()))
            .collect()
    }
}
