// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! Configuration loading for Tickit: runtime settings (log level,
//! simulation speed) and the declared component graph.
//!
//! Both are layered with [figment]: a TOML file first, then environment
//! variables prefixed `TICKIT_`, so a deployment can override any setting
//! without touching the checked-in config file.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use tickit_core::wiring::InverseWiring;
use tickit_core::{ComponentId, ComponentPort, PortId, TickitError, Wiring};

/// Settings that apply to the scheduler itself, independent of the
/// simulated graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub log_level: String,
    /// Simulated nanoseconds per wall-clock nanosecond; the master's
    /// pacing knob. `0.0` runs as fast as the host can process ticks.
    pub simulation_speed: f64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            simulation_speed: 1.0,
        }
    }
}

impl RuntimeSettings {
    /// Load from an optional TOML file, then layer `TICKIT_*` environment
    /// variables on top.
    pub fn load(conf_file: Option<&Path>) -> Result<Self, TickitError> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(Self::default()));
        if let Some(path) = conf_file {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("TICKIT_"));
        figment
            .extract()
            .map_err(|err| TickitError::config(format!("failed to load runtime settings: {err}")))
    }
}

/// One port on a component bound to an upstream `(component, port)` pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputBinding {
    pub port: PortId,
    pub source_component: ComponentId,
    pub source_port: PortId,
}

/// One declared component: an id, an opaque device descriptor (left to the
/// caller's device registry to resolve), and its input bindings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub id: ComponentId,
    pub device: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
}

/// The declared simulation graph: a flat list of components and their
/// wiring. This is the "parser" input the scheduler consumes, converted
/// to an [`InverseWiring`] by [`GraphConfig::wiring`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    pub components: Vec<ComponentSpec>,
}

impl GraphConfig {
    pub fn load(path: &Path) -> Result<Self, TickitError> {
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|err| TickitError::config(format!("failed to load graph config at {}: {err}", path.display())))
    }

    /// Convert the declared input bindings into an [`InverseWiring`].
    /// Fails if two different sources are bound to the same sink port.
    pub fn wiring(&self) -> Result<InverseWiring, TickitError> {
        let mut wiring = Wiring::new();
        for component in &self.components {
            for input in &component.inputs {
                wiring.connect(
                    input.source_component.clone(),
                    input.source_port.clone(),
                    ComponentPort::new(component.id.clone(), input.port.clone()),
                );
            }
        }
        InverseWiring::try_from(wiring)
    }

    #[must_use]
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components.iter().map(|c| c.id.clone()).collect()
    }
}
