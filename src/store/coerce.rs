use serde_json::Value;

use crate::error::{SelectionError, SelectionResult};
use crate::model::{Measurements, RawMeasurements};

/// Convert normalized measurement values into the numeric columns the store
/// persists. JSON numbers and numeric strings are accepted.
pub fn coerce_measurements(raw: &RawMeasurements) -> SelectionResult<Measurements> {
    let [ceiling_height, bedroom_count, bathroom_count] =
        raw.fields().map(|(field, value)| coerce_field(field, value));

    Ok(Measurements {
        ceiling_height: ceiling_height?,
        bedroom_count: bedroom_count?,
        bathroom_count: bathroom_count?,
    })
}

fn coerce_field(field: &str, value: Option<&Value>) -> SelectionResult<Option<f64>> {
    let Some(value) = value else {
        return Ok(None);
    };

    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(SelectionError::validation(
            field,
            format!("expected a number, got {}", value),
        )),
    }
}
