//! YAML configuration: schema, defaults, validation.
//!
//! The file is the single source of truth for hardware wiring and
//! routine definitions. It is parsed once at startup and cross-checked
//! before anything touches a pin: every pump, error check, and tank
//! state a step names must exist, every step must carry exactly one
//! runtime bound, and contact lists may pull addresses from the
//! environment with `${VAR}` placeholders. Any violation aborts startup
//! with a [`ConfigError`].

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;
use crate::interlock::TriggerWhen;
use crate::routine::{IntervalUnit, Routine, RoutineSet, Schedule};
use crate::step::{RuntimeBound, Step, StepFlags};

/// Global controller tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Seconds between sensor polls while a pump runs.
    #[serde(default = "default_bounce")]
    pub bounce_time: f64,
    /// Seconds between control-loop ticks while idle.
    #[serde(default = "default_tick")]
    pub tick_interval: f64,
    /// Confidence level for runtime bounds, in (0, 1).
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// How often runtime models may be refit.
    #[serde(default)]
    pub model_update: ModelUpdate,
}

fn default_bounce() -> f64 {
    0.1
}

fn default_tick() -> f64 {
    1.0
}

fn default_confidence() -> f64 {
    0.95
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bounce_time: default_bounce(),
            tick_interval: default_tick(),
            confidence: default_confidence(),
            model_update: ModelUpdate::default(),
        }
    }
}

/// Model refit rate limit. Defaults to daily.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelUpdate {
    pub interval: u32,
    pub unit: IntervalUnit,
}

impl ModelUpdate {
    pub fn period(&self) -> chrono::Duration {
        self.unit.to_duration(i64::from(self.interval))
    }
}

impl Default for ModelUpdate {
    fn default() -> Self {
        Self { interval: 1, unit: IntervalUnit::Days }
    }
}

/// An error sensor: trigger polarity plus its run budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorSensorDef {
    pub name: String,
    pub pin: u8,
    pub trigger_when: TriggerWhen,
    pub permitted_runs: u32,
}

/// A level sensor and the tank states each of its readings reports to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TankSensorDef {
    pub name: String,
    pub pin: u8,
    #[serde(default)]
    pub when_submerged: Vec<String>,
    #[serde(default)]
    pub when_exposed: Vec<String>,
}

/// A relay-driven pump.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PumpDef {
    pub name: String,
    pub pin: u8,
    #[serde(default = "default_true")]
    pub active_high: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepDef {
    name: String,
    pump: String,
    start_states: Vec<String>,
    end_states: Vec<String>,
    #[serde(default)]
    error_checks: Vec<String>,
    /// Fixed runtime ceiling, seconds. Mutually exclusive with
    /// `initial_max_runtime`.
    max_runtime: Option<f64>,
    /// Adaptive seed ceiling, seconds.
    initial_max_runtime: Option<f64>,
    #[serde(default = "default_true")]
    report_invalid_start: bool,
    #[serde(default)]
    proceed_on_invalid_start: bool,
    #[serde(default)]
    proceed_on_timeout: bool,
    #[serde(default)]
    proceed_on_error: bool,
    #[serde(default = "default_true")]
    cancel_on_critical_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoutineDef {
    name: String,
    interval: Option<u32>,
    unit: Option<IntervalUnit>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    error_contacts: Vec<String>,
    #[serde(default)]
    completion_contacts: Vec<String>,
    steps: Vec<StepDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    error_sensors: Vec<ErrorSensorDef>,
    tank_sensors: Vec<TankSensorDef>,
    pumps: Vec<PumpDef>,
    routines: Vec<RoutineDef>,
}

/// Validated configuration, ready to wire into the controller.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub error_sensors: Vec<ErrorSensorDef>,
    pub tank_sensors: Vec<TankSensorDef>,
    pub pumps: Vec<PumpDef>,
    pub routines: RoutineSet,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        info!(
            "config: loaded {} ({} routines, {} pumps, {} sensors)",
            path.display(),
            config.routines.len(),
            config.pumps.len(),
            config.tank_sensors.len() + config.error_sensors.len(),
        );
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        validate(raw)
    }
}

fn validate(raw: RawConfig) -> Result<Config, ConfigError> {
    let settings = raw.settings;
    if !(settings.confidence > 0.0 && settings.confidence < 1.0) {
        return Err(ConfigError::BadConfidence(settings.confidence));
    }

    check_unique("error sensor", raw.error_sensors.iter().map(|d| d.name.as_str()))?;
    check_unique("tank sensor", raw.tank_sensors.iter().map(|d| d.name.as_str()))?;
    check_unique("pump", raw.pumps.iter().map(|d| d.name.as_str()))?;
    check_unique("routine", raw.routines.iter().map(|d| d.name.as_str()))?;

    let pumps: HashSet<&str> = raw.pumps.iter().map(|d| d.name.as_str()).collect();
    let checks: HashSet<&str> = raw.error_sensors.iter().map(|d| d.name.as_str()).collect();
    let states: HashSet<&str> = raw
        .tank_sensors
        .iter()
        .flat_map(|d| d.when_submerged.iter().chain(&d.when_exposed))
        .map(String::as_str)
        .collect();

    let mut routines = Vec::with_capacity(raw.routines.len());
    for def in raw.routines {
        routines.push(build_routine(def, &pumps, &checks, &states)?);
    }

    Ok(Config {
        settings,
        error_sensors: raw.error_sensors,
        tank_sensors: raw.tank_sensors,
        pumps: raw.pumps,
        routines: RoutineSet::new(routines),
    })
}

fn build_routine(
    def: RoutineDef,
    pumps: &HashSet<&str>,
    checks: &HashSet<&str>,
    states: &HashSet<&str>,
) -> Result<Routine, ConfigError> {
    let schedule = match (def.interval, def.unit) {
        (Some(interval), Some(unit)) if interval > 0 => Some(Schedule { interval, unit }),
        (None, None) => None,
        _ => return Err(ConfigError::PartialSchedule { routine: def.name }),
    };

    if def.steps.is_empty() {
        return Err(ConfigError::EmptyRoutine { routine: def.name });
    }
    let mut step_names = HashSet::new();
    let mut steps = Vec::with_capacity(def.steps.len());
    for step_def in def.steps {
        if !step_names.insert(step_def.name.clone()) {
            return Err(ConfigError::DuplicateName { kind: "step", name: step_def.name });
        }
        steps.push(build_step(step_def, pumps, checks, states)?);
    }

    Ok(Routine {
        name: def.name,
        schedule,
        priority: def.priority,
        error_contacts: expand_contacts(def.error_contacts)?,
        completion_contacts: expand_contacts(def.completion_contacts)?,
        steps,
    })
}

fn build_step(
    def: StepDef,
    pumps: &HashSet<&str>,
    checks: &HashSet<&str>,
    states: &HashSet<&str>,
) -> Result<Step, ConfigError> {
    if !pumps.contains(def.pump.as_str()) {
        return Err(ConfigError::UnknownPump { step: def.name, pump: def.pump });
    }
    for check in &def.error_checks {
        if !checks.contains(check.as_str()) {
            return Err(ConfigError::UnknownErrorCheck {
                step: def.name,
                check: check.clone(),
            });
        }
    }
    for state in def.start_states.iter().chain(&def.end_states) {
        if !states.contains(state.as_str()) {
            return Err(ConfigError::UnknownTankState {
                step: def.name,
                state: state.clone(),
            });
        }
    }

    let bound = match (def.max_runtime, def.initial_max_runtime) {
        (Some(secs), None) => RuntimeBound::Fixed(secs),
        (None, Some(secs)) => RuntimeBound::Adaptive { initial_max: secs },
        _ => return Err(ConfigError::AmbiguousRuntimeBound { step: def.name }),
    };
    if bound.seed_secs() <= 0.0 {
        return Err(ConfigError::NonPositiveRuntime {
            step: def.name,
            value: bound.seed_secs(),
        });
    }

    Ok(Step {
        name: def.name,
        pump: def.pump,
        start_states: def.start_states,
        end_states: def.end_states,
        error_checks: def.error_checks,
        flags: StepFlags {
            report_invalid_start: def.report_invalid_start,
            proceed_on_invalid_start: def.proceed_on_invalid_start,
            proceed_on_timeout: def.proceed_on_timeout,
            proceed_on_error: def.proceed_on_error,
            cancel_on_critical_failure: def.cancel_on_critical_failure,
        },
        bound,
    })
}

fn check_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName { kind, name: name.to_string() });
        }
    }
    Ok(())
}

/// Expand `${VAR}` placeholders from the environment. Addresses stay out
/// of the config file this way.
fn expand_contacts(contacts: Vec<String>) -> Result<Vec<String>, ConfigError> {
    contacts.into_iter().map(expand_env).collect()
}

fn expand_env(value: String) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value.as_str();
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let var = &tail[..end];
        let resolved =
            std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.to_string()))?;
        out.push_str(&resolved);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
settings:
  bounce_time: 0.1
  confidence: 0.95
  model_update: { interval: 1, unit: days }

error_sensors:
  - name: RODI Low
    pin: 17
    trigger_when: exposed
    permitted_runs: 3

tank_sensors:
  - name: Normal
    pin: 27
    when_submerged: [full]
    when_exposed: [draining, low]
  - name: Low
    pin: 22
    when_submerged: [full, draining]
    when_exposed: [low]

pumps:
  - name: drain
    pin: 23
  - name: fill
    pin: 24
    active_high: false

routines:
  - name: Water Change
    interval: 3
    unit: days
    priority: 1
    completion_contacts: ["ops@example.org"]
    steps:
      - name: Drain
        pump: drain
        start_states: [full]
        end_states: [low]
        error_checks: [RODI Low]
        initial_max_runtime: 120
        proceed_on_timeout: true
      - name: Refill
        pump: fill
        start_states: [low, draining]
        end_states: [full]
        error_checks: [RODI Low]
        initial_max_runtime: 180
  - name: Top Off
    priority: 5
    steps:
      - name: Top
        pump: fill
        start_states: [draining]
        end_states: [full]
        max_runtime: 30
"#;

    #[test]
    fn valid_document_round_trips() {
        let config = Config::from_yaml_str(VALID).unwrap();
        assert_eq!(config.routines.len(), 2);
        assert!((config.settings.bounce_time - 0.1).abs() < 1e-9);
        assert!((config.settings.tick_interval - 1.0).abs() < 1e-9);
        assert_eq!(config.settings.model_update.period(), chrono::Duration::days(1));

        let wc = config.routines.get("Water Change").unwrap();
        assert_eq!(wc.schedule.unwrap().period(), chrono::Duration::days(3));
        assert_eq!(wc.priority, 1);
        assert_eq!(wc.steps.len(), 2);
        assert!(wc.steps[0].flags.proceed_on_timeout);
        assert_eq!(wc.steps[0].bound, RuntimeBound::Adaptive { initial_max: 120.0 });

        let topoff = config.routines.get("Top Off").unwrap();
        assert!(topoff.schedule.is_none());
        assert_eq!(topoff.steps[0].bound, RuntimeBound::Fixed(30.0));

        assert!(!config.pumps[1].active_high);
    }

    #[test]
    fn unknown_pump_is_rejected() {
        let doc = VALID.replace("pump: drain", "pump: sump");
        match Config::from_yaml_str(&doc) {
            Err(ConfigError::UnknownPump { step, pump }) => {
                assert_eq!(step, "Drain");
                assert_eq!(pump, "sump");
            }
            other => panic!("expected unknown pump, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tank_state_is_rejected() {
        let doc = VALID.replace("end_states: [low]\n", "end_states: [empty]\n");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::UnknownTankState { state, .. }) if state == "empty"
        ));
    }

    #[test]
    fn unknown_error_check_is_rejected() {
        let doc = VALID.replace("error_checks: [RODI Low]", "error_checks: [Waste Full]");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::UnknownErrorCheck { check, .. }) if check == "Waste Full"
        ));
    }

    #[test]
    fn runtime_bound_must_be_exactly_one() {
        let both = VALID.replace(
            "initial_max_runtime: 120",
            "initial_max_runtime: 120\n        max_runtime: 60",
        );
        assert!(matches!(
            Config::from_yaml_str(&both),
            Err(ConfigError::AmbiguousRuntimeBound { step }) if step == "Drain"
        ));

        let neither = VALID.replace("        initial_max_runtime: 120\n", "");
        assert!(matches!(
            Config::from_yaml_str(&neither),
            Err(ConfigError::AmbiguousRuntimeBound { step }) if step == "Drain"
        ));
    }

    #[test]
    fn non_positive_runtime_is_rejected() {
        let doc = VALID.replace("max_runtime: 30", "max_runtime: 0");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::NonPositiveRuntime { .. })
        ));
    }

    #[test]
    fn schedule_needs_both_interval_and_unit() {
        let doc = VALID.replace("    unit: days\n    priority: 1\n", "    priority: 1\n");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::PartialSchedule { routine }) if routine == "Water Change"
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let doc = VALID.replace("name: Top Off", "name: Water Change");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::DuplicateName { kind: "routine", .. })
        ));
    }

    #[test]
    fn bad_confidence_is_rejected() {
        let doc = VALID.replace("confidence: 0.95", "confidence: 1.5");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::BadConfidence(c)) if (c - 1.5).abs() < 1e-9
        ));
    }

    #[test]
    fn contacts_expand_from_the_environment() {
        // Env mutation is process-global; keep the variable name unique
        // to this test.
        unsafe { std::env::set_var("AQUACTL_TEST_CONTACT", "alerts@example.org") };
        let doc = VALID.replace("ops@example.org", "${AQUACTL_TEST_CONTACT}");
        let config = Config::from_yaml_str(&doc).unwrap();
        let wc = config.routines.get("Water Change").unwrap();
        assert_eq!(wc.completion_contacts, ["alerts@example.org"]);

        let doc = VALID.replace("ops@example.org", "${AQUACTL_TEST_UNSET}");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::MissingEnv(var)) if var == "AQUACTL_TEST_UNSET"
        ));
    }

    #[test]
    fn empty_routine_is_rejected() {
        let doc = VALID.replace(
            "      - name: Top\n        pump: fill\n        start_states: [draining]\n        end_states: [full]\n        max_runtime: 30\n",
            "",
        );
        match Config::from_yaml_str(&doc) {
            // serde may reject the now-empty sequence before validation.
            Err(ConfigError::EmptyRoutine { routine }) => assert_eq!(routine, "Top Off"),
            Err(ConfigError::Parse(_)) => {}
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
