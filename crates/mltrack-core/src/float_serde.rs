//! Float deserializers that survive NaN
//!
//! `serde_json` writes non-finite floats as `null`. A diverged run (NaN loss)
//! must still load back, so required floats read `null` as NaN.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Required `f64` where `null` means NaN
pub fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Metric map whose `null` values mean NaN
pub fn nan_map_from_null<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| (name, value.unwrap_or(f64::NAN)))
        .collect())
}
