use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;

use log::debug;
use thiserror::Error;

use crate::attributes;
use crate::format::format_number;
use crate::service::{FeatureService, ServiceError};

/// Upper bound used when rendering the open-ended very-high class.
pub const VERY_HIGH_CAP: f64 = 100_000_000_000.0;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("no usable values for {0}")]
    EmptyPopulation(String),
}

/// One display class: an inclusive value range plus its legend label.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub min: f64,
    pub max: f64,
    pub label: String,
}

/// Four ordered, contiguous classes covering `[0, population max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBreaks {
    pub attribute: String,
    pub low: Bucket,
    pub medium: Bucket,
    pub high: Bucket,
    pub very_high: Bucket,
}

impl ClassBreaks {
    pub fn buckets(&self) -> [&Bucket; 4] {
        [&self.low, &self.medium, &self.high, &self.very_high]
    }
}

/// Sorts in place and returns the element at `floor(n/2)`. For even counts
/// this is the upper of the two middle elements, not their mean; the layer
/// has always been classified this way and the break table depends on it.
fn approximate_median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

/// Step size for snapping break boundaries to round numbers.
pub fn rounding_unit(effective_median: f64) -> f64 {
    if effective_median > 5000.0 {
        1000.0
    } else if effective_median > 1000.0 {
        100.0
    } else if effective_median <= 1000.0 {
        10.0
    } else {
        // The service's break table has a `<= 100` arm selecting no rounding,
        // but the floor-at-100 clamp and the arm above shadow it.
        0.0
    }
}

/// Computes the four class breaks for `attribute`. Issues two queries per
/// call (all valid values, then stddev/max aggregates); nothing is cached
/// between attribute switches.
pub fn class_breaks(
    service: &dyn FeatureService,
    attribute: &str,
) -> Result<ClassBreaks, ClassifyError> {
    let mut values = service.fetch_values(attribute)?;
    let median = approximate_median(&mut values)
        .ok_or_else(|| ClassifyError::EmptyPopulation(attribute.to_string()))?;
    let aggregates = service.fetch_aggregates(attribute)?;
    let label = attributes::label_for(attribute);

    // Floor the working median at 100 so small-valued fields do not collapse
    // into degenerate ranges.
    let effective_median = if median > 100.0 { median } else { 100.0 };
    let rounder = rounding_unit(effective_median);
    let snap = |v: f64| {
        if rounder > 0.0 { v - v % rounder } else { v }
    };

    let low_max = snap(effective_median / 2.0);
    let med_max = snap(effective_median);
    let high_max = med_max + snap(aggregates.stddev);
    debug!(
        "{attribute}: median {median}, effective {effective_median}, rounder {rounder}, \
         stddev {}, breaks {low_max}/{med_max}/{high_max}/{}",
        aggregates.stddev, aggregates.max
    );

    let bucket = |tier: &str, min: f64, max: f64| Bucket {
        min,
        max,
        label: format!(
            "{tier} ({} - {})",
            format_number(label, min),
            format_number(label, max)
        ),
    };

    Ok(ClassBreaks {
        attribute: attribute.to_string(),
        low: bucket("Low", 0.0, low_max),
        medium: bucket("Moderate", low_max + 1.0, med_max),
        high: bucket("High", med_max + 1.0, high_max),
        very_high: bucket("Very High", high_max + 1.0, aggregates.max),
    })
}

/// Result of one background classification run, tagged with the generation
/// that requested it so stale runs can be discarded.
pub struct Outcome {
    pub generation: u64,
    pub attribute: String,
    pub result: Result<ClassBreaks, ClassifyError>,
}

/// Runs `class_breaks` off the UI thread and reports back over `tx`.
pub fn spawn(
    service: Arc<dyn FeatureService>,
    attribute: String,
    generation: u64,
    tx: Sender<Outcome>,
) {
    thread::spawn(move || {
        let result = class_breaks(service.as_ref(), &attribute);
        // Receiver may already be gone during shutdown.
        let _ = tx.send(Outcome { generation, attribute, result });
    });
}
