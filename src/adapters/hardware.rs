//! Hardware adapters for the sensor and actuator ports.
//!
//! [`GpioBank`] drives real pins through the `embedded-hal` digital
//! traits and is generic over the HAL in use. [`SimHardware`] is the
//! in-memory rig the host binary and the integration tests run against:
//! sensors are plain booleans that tests (or scripted pump physics)
//! flip, and every relay transition is recorded.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use embedded_hal::digital::{InputPin, OutputPin};
use tracing::{debug, warn};

use crate::config::PumpDef;
use crate::ports::{ActuatorPort, SensorPort};
use crate::snapshot::Readings;

// ───────────────────────────────────────────────────────────────
// Real pins
// ───────────────────────────────────────────────────────────────

struct PumpChannel<O> {
    name: String,
    pin: O,
    /// Relay polarity: `true` = driving the pin high energises the pump.
    active_high: bool,
}

/// GPIO-backed sensors and relays.
///
/// A read error on a sensor pin keeps the previous value rather than
/// inventing one; a write error on a relay pin is logged and the relay
/// is assumed stuck, which the runtime ceiling then catches.
pub struct GpioBank<I, O> {
    sensors: Vec<(String, I)>,
    pumps: Vec<PumpChannel<O>>,
    last: Readings,
}

impl<I, O> GpioBank<I, O>
where
    I: InputPin,
    O: OutputPin,
{
    /// `sensors` pairs each configured sensor name with its input pin;
    /// `pumps` pairs each pump definition with its output pin.
    pub fn new(sensors: Vec<(String, I)>, pumps: Vec<(PumpDef, O)>) -> Self {
        let pumps = pumps
            .into_iter()
            .map(|(def, pin)| PumpChannel { name: def.name, pin, active_high: def.active_high })
            .collect();
        Self { sensors, pumps, last: Readings::new() }
    }

    fn drive(&mut self, pump: &str, on: bool) {
        let Some(channel) = self.pumps.iter_mut().find(|p| p.name == pump) else {
            warn!("gpio: unknown pump '{pump}' ignored");
            return;
        };
        let energise = on == channel.active_high;
        let result = if energise { channel.pin.set_high() } else { channel.pin.set_low() };
        if result.is_err() {
            warn!("gpio: failed to switch pump '{pump}' {}", if on { "on" } else { "off" });
        }
    }
}

impl<I, O> SensorPort for GpioBank<I, O>
where
    I: InputPin,
    O: OutputPin,
{
    fn read_all(&mut self) -> Readings {
        for (name, pin) in &mut self.sensors {
            match pin.is_high() {
                // Float switches close to ground when the float drops.
                Ok(high) => self.last.set(name.clone(), high),
                Err(_) => {
                    warn!("gpio: read failed on sensor '{name}', keeping previous value");
                }
            }
        }
        self.last.clone()
    }
}

impl<I, O> ActuatorPort for GpioBank<I, O>
where
    I: InputPin,
    O: OutputPin,
{
    fn pump_on(&mut self, pump: &str) {
        self.drive(pump, true);
    }

    fn pump_off(&mut self, pump: &str) {
        self.drive(pump, false);
    }

    fn all_off(&mut self) {
        let names: Vec<String> = self.pumps.iter().map(|p| p.name.clone()).collect();
        for name in names {
            self.drive(&name, false);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulator
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimInner {
    levels: BTreeMap<String, bool>,
    active: HashSet<String>,
    log: Vec<String>,
}

/// In-memory tank rig. Clone freely: all clones share one state, so a
/// test can flip sensors while the controller holds the other handle.
#[derive(Debug, Clone, Default)]
pub struct SimHardware {
    inner: Arc<Mutex<SimInner>>,
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sensor(&self, name: &str, submerged: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.levels.insert(name.to_string(), submerged);
    }

    pub fn pump_is_on(&self, pump: &str) -> bool {
        self.inner.lock().unwrap().active.contains(pump)
    }

    /// Every relay transition since construction, in order.
    pub fn pump_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }
}

impl SensorPort for SimHardware {
    fn read_all(&mut self) -> Readings {
        let inner = self.inner.lock().unwrap();
        inner
            .levels
            .iter()
            .map(|(name, &submerged)| (name.clone(), submerged))
            .collect()
    }
}

impl ActuatorPort for SimHardware {
    fn pump_on(&mut self, pump: &str) {
        debug!("sim: pump '{pump}' on");
        let mut inner = self.inner.lock().unwrap();
        inner.active.insert(pump.to_string());
        inner.log.push(format!("on:{pump}"));
    }

    fn pump_off(&mut self, pump: &str) {
        debug!("sim: pump '{pump}' off");
        let mut inner = self.inner.lock().unwrap();
        inner.active.remove(pump);
        inner.log.push(format!("off:{pump}"));
    }

    fn all_off(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.active.clear();
        inner.log.push("all_off".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_clones_share_state() {
        let rig = SimHardware::new();
        let mut handle = rig.clone();

        rig.set_sensor("Normal", true);
        let snap = handle.read_all();
        assert!(snap.is_submerged("Normal"));

        handle.pump_on("drain");
        assert!(rig.pump_is_on("drain"));
        handle.all_off();
        assert!(!rig.pump_is_on("drain"));
        assert_eq!(rig.pump_log(), ["on:drain", "all_off"]);
    }
}
