// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A small factory registry so a binary can turn the opaque `device`
//! string and `params` blob a [`ComponentSpec`](tickit_config::ComponentSpec)
//! carries into an actual [`Device`]. Device crates register their types
//! by name; the CLI never needs to know concrete device types at compile
//! time beyond whichever crates it links in.

use std::collections::HashMap;

use tickit_core::TickitError;

use crate::component::Device;

/// Builds one device type from its JSON `params` blob.
pub trait DeviceFactory: Send + Sync {
    fn build(&self, params: &serde_json::Value) -> Result<Box<dyn Device>, TickitError>;
}

impl<F> DeviceFactory for F
where
    F: Fn(&serde_json::Value) -> Result<Box<dyn Device>, TickitError> + Send + Sync,
{
    fn build(&self, params: &serde_json::Value) -> Result<Box<dyn Device>, TickitError> {
        self(params)
    }
}

#[derive(Default)]
pub struct DeviceRegistry {
    factories: HashMap<String, Box<dyn DeviceFactory>>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, device_type: impl Into<String>, factory: impl DeviceFactory + 'static) {
        self.factories.insert(device_type.into(), Box::new(factory));
    }

    pub fn build(&self, device_type: &str, params: &serde_json::Value) -> Result<Box<dyn Device>, TickitError> {
        let factory = self
            .factories
            .get(device_type)
            .ok_or_else(|| TickitError::config(format!("unknown device type {device_type:?}")))?;
        factory.build(params)
    }
}
