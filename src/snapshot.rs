//! Point-in-time sensor readings.
//!
//! The control loop samples every sensor once per poll and hands the
//! frozen snapshot to the resolver and interlock tracker. Nothing in the
//! core reads a pin directly; this keeps state resolution a pure function
//! over a snapshot and makes every component testable without hardware.

use std::collections::BTreeMap;

/// One reading per level/error sensor. `true` means submerged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readings(BTreeMap<String, bool>);

impl Readings {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, sensor: impl Into<String>, submerged: bool) {
        self.0.insert(sensor.into(), submerged);
    }

    /// Reading for a sensor, or `None` if it was not sampled.
    pub fn get(&self, sensor: &str) -> Option<bool> {
        self.0.get(sensor).copied()
    }

    /// Whether the sensor read submerged. An unsampled sensor reads as
    /// exposed, which is the failure-visible default: a missing reading
    /// can only ever un-satisfy a tank state, never fabricate one.
    pub fn is_submerged(&self, sensor: &str) -> bool {
        self.get(sensor).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, bool)> for Readings {
    fn from_iter<T: IntoIterator<Item = (String, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for Readings {
    /// Compact `name=submerged|exposed` listing for notification bodies.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (name, submerged) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            let level = if submerged { "submerged" } else { "exposed" };
            write!(f, "{name}={level}")?;
        }
        if first {
            write!(f, "(no readings)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsampled_sensor_reads_exposed() {
        let r = Readings::new();
        assert!(!r.is_submerged("Normal"));
        assert_eq!(r.get("Normal"), None);
    }

    #[test]
    fn display_lists_every_reading() {
        let mut r = Readings::new();
        r.set("Low", true);
        r.set("Normal", false);
        assert_eq!(r.to_string(), "Low=submerged, Normal=exposed");
    }
}
