//! Analog rules and the translation from configuration to engine parts

use super::SyncEngine;
use crate::clock::Clock;
use crate::config::{parse_flag, AnalogConfig, ConfigError, FeatureConfig, FlightConfig};
use crate::device::{InputId, InputSource, OutputAxis, OutputSink};
use crate::shaping::{self, Curve, CurveError};
use crate::status::{StatusFeed, StatusFlags, StatusSnapshot};
use crate::toggle::ToggleController;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// How a virtual axis value is derived from physical inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalogSource {
    /// Pass-through, optionally reversed
    Direct {
        input: InputId,
        #[serde(default)]
        invert: bool,
    },
    /// Full lever travel onto [0, 1], or [-1, 0] when negated
    Unit {
        input: InputId,
        #[serde(default)]
        negate: bool,
    },
    Deadzone {
        input: InputId,
        low_in: f64,
        low_out: f64,
        high_in: f64,
        high_out: f64,
    },
    Throttle {
        forward: InputId,
        backward: InputId,
    },
    DualPedal {
        back: InputId,
        forward: InputId,
    },
    Curve {
        input: InputId,
        curve: Vec<(f64, f64)>,
    },
}

impl AnalogSource {
    pub fn inputs(&self) -> Vec<&InputId> {
        match self {
            AnalogSource::Direct { input, .. }
            | AnalogSource::Unit { input, .. }
            | AnalogSource::Deadzone { input, .. }
            | AnalogSource::Curve { input, .. } => vec![input],
            AnalogSource::Throttle { forward, backward } => vec![forward, backward],
            AnalogSource::DualPedal { back, forward } => vec![back, forward],
        }
    }

    /// Rejects curve tables that cannot be interpolated
    pub fn check(&self) -> Result<(), CurveError> {
        if let AnalogSource::Curve { curve, .. } = self {
            Curve::new(curve)?;
        }
        Ok(())
    }
}

/// Restricts a rule to one side of a status flag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeGate {
    pub flag: StatusFlags,
    /// Drive the axis while the flag is set (`true`) or clear (`false`)
    pub active: bool,
}

impl ModeGate {
    pub fn admits(&self, status: &StatusSnapshot) -> bool {
        status.has(self.flag) == self.active
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shaper {
    Direct { input: InputId, invert: bool },
    Unit { input: InputId, negate: bool },
    Deadzone {
        input: InputId,
        low_in: f64,
        low_out: f64,
        high_in: f64,
        high_out: f64,
    },
    Throttle { forward: InputId, backward: InputId },
    DualPedal { back: InputId, forward: InputId },
    Curve { input: InputId, curve: Curve },
}

/// A virtual axis, its source and an optional gate, ready to evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogRule {
    name: String,
    output: OutputAxis,
    shaper: Shaper,
    gate: Option<ModeGate>,
}

impl AnalogRule {
    pub fn new(
        name: impl Into<String>,
        output: OutputAxis,
        source: AnalogSource,
    ) -> Result<Self, CurveError> {
        let shaper = match source {
            AnalogSource::Direct { input, invert } => Shaper::Direct { input, invert },
            AnalogSource::Unit { input, negate } => Shaper::Unit { input, negate },
            AnalogSource::Deadzone {
                input,
                low_in,
                low_out,
                high_in,
                high_out,
            } => Shaper::Deadzone {
                input,
                low_in,
                low_out,
                high_in,
                high_out,
            },
            AnalogSource::Throttle { forward, backward } => Shaper::Throttle { forward, backward },
            AnalogSource::DualPedal { back, forward } => Shaper::DualPedal { back, forward },
            AnalogSource::Curve { input, curve } => Shaper::Curve {
                input,
                curve: Curve::new(&curve)?,
            },
        };

        Ok(Self {
            name: name.into(),
            output,
            shaper,
            gate: None,
        })
    }

    pub fn gated(mut self, gate: ModeGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> OutputAxis {
        self.output
    }

    pub fn gate(&self) -> Option<ModeGate> {
        self.gate
    }

    pub fn inputs(&self) -> Vec<&InputId> {
        match &self.shaper {
            Shaper::Direct { input, .. }
            | Shaper::Unit { input, .. }
            | Shaper::Deadzone { input, .. }
            | Shaper::Curve { input, .. } => vec![input],
            Shaper::Throttle { forward, backward } => vec![forward, backward],
            Shaper::DualPedal { back, forward } => vec![back, forward],
        }
    }

    /// Current output value, or `None` while the gate holds the axis off
    pub fn evaluate(&self, status: &StatusSnapshot, inputs: &dyn InputSource) -> Option<f64> {
        if let Some(gate) = &self.gate {
            if !gate.admits(status) {
                return None;
            }
        }

        let value = match &self.shaper {
            Shaper::Direct { input, invert } => {
                let v = inputs.axis(input).clamp(-1.0, 1.0);
                if *invert {
                    shaping::invert(v)
                } else {
                    v
                }
            }
            Shaper::Unit { input, negate } => {
                let v = shaping::scale_unit(inputs.axis(input));
                if *negate {
                    shaping::invert(v)
                } else {
                    v
                }
            }
            Shaper::Deadzone {
                input,
                low_in,
                low_out,
                high_in,
                high_out,
            } => shaping::deadzone(inputs.axis(input), *low_in, *low_out, *high_in, *high_out),
            Shaper::Throttle { forward, backward } => {
                shaping::blend_throttle(inputs.axis(forward), inputs.axis(backward))
            }
            Shaper::DualPedal { back, forward } => {
                shaping::dual_pedal_blend(inputs.axis(back), inputs.axis(forward))
            }
            Shaper::Curve { input, curve } => curve.eval(inputs.axis(input)),
        };
        Some(value)
    }
}

fn analog_rule(config: &AnalogConfig) -> Result<AnalogRule, ConfigError> {
    let rule = AnalogRule::new(&config.name, config.output, config.source.clone()).map_err(
        |source| ConfigError::Curve {
            name: config.name.clone(),
            source,
        },
    )?;

    let gate = match (&config.when, &config.unless) {
        (Some(flag), _) => Some(ModeGate {
            flag: parse_flag(&config.name, flag)?,
            active: true,
        }),
        (None, Some(flag)) => Some(ModeGate {
            flag: parse_flag(&config.name, flag)?,
            active: false,
        }),
        (None, None) => None,
    };

    Ok(match gate {
        Some(gate) => rule.gated(gate),
        None => rule,
    })
}

/// Feature is synced when the game flag matches the switch position
fn toggle_controller(
    feature: &FeatureConfig,
    config: &FlightConfig,
) -> Result<ToggleController, ConfigError> {
    let flag = feature.status_flag()?;
    let switch = feature.switch.clone();
    let invert = feature.invert;

    Ok(ToggleController::new(
        &feature.name,
        feature.output,
        feature.cooldown(&config.general),
        move |ctx| {
            let desired = ctx.inputs.button(&switch) != invert;
            ctx.status.has(flag) == desired
        },
    ))
}

impl SyncEngine {
    /// Builds an engine with every feature and analog rule from `config`
    pub fn from_config(
        config: &FlightConfig,
        feed: Box<dyn StatusFeed>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut engine = SyncEngine::new(feed, clock, sink, config.general.pulse_duration());

        for feature in &config.features {
            let controller = toggle_controller(feature, config)?;
            engine.register_toggle(controller, Some(feature.switch.clone()));
        }
        for rule in &config.analog {
            engine.register_analog(analog_rule(rule)?);
        }

        info!(
            "Engine built with {} features and {} analog rules",
            config.features.len(),
            config.analog.len()
        );
        Ok(engine)
    }
}
