// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The error kinds raised across the Tickit engine, and their disposition.
//!
//! See the design notes on error handling for the full propagation
//! policy: `ConfigError` and `ProtocolViolation` are fatal, `DeviceFailure`
//! is converted into a [`ComponentException`](crate::messages::ComponentException)
//! and triggers shutdown, `AdapterFailure` and transient `BusFailure` stay
//! local, and `Timeout` is returned to whichever caller requested the bound.

use std::error::Error;
use std::fmt;

/// The `TickitError` is the error type returned by fallible engine operations.
#[derive(Debug, Clone)]
pub enum TickitError {
    /// Wiring has cycles, dangling ports, or duplicate ids. Fatal at
    /// construction.
    ConfigError(String),

    /// An `Output` was published for a component that was not in
    /// `to_update`, or carried a stale `time`, or an unsupported `call_at`.
    ProtocolViolation(String),

    /// A device's `update` raised. Converted to a `ComponentException` and
    /// escalated to a global shutdown by the caller.
    DeviceFailure { source: String, detail: String },

    /// An adapter's `run_forever` raised. The adapter task stops; the
    /// device continues; not fatal.
    AdapterFailure { source: String, detail: String },

    /// A bus publish or subscribe failed after exhausting retries.
    BusFailure(String),

    /// An adapter's `wait_until_ready` exceeded its bound.
    Timeout(String),
}

impl TickitError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    pub fn device_failure(source: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DeviceFailure {
            source: source.into(),
            detail: detail.into(),
        }
    }

    pub fn adapter_failure(source: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::AdapterFailure {
            source: source.into(),
            detail: detail.into(),
        }
    }

    pub fn bus(msg: impl Into<String>) -> Self {
        Self::BusFailure(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Whether this error is fatal to the whole simulation, as opposed to
    /// something a single component or adapter can recover from locally.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::ProtocolViolation(_) | Self::DeviceFailure { .. }
        )
    }
}

impl fmt::Display for TickitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "config error: {msg}"),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::DeviceFailure { source, detail } => {
                write!(f, "device failure in {source}: {detail}")
            }
            Self::AdapterFailure { source, detail } => {
                write!(f, "adapter failure in {source}: {detail}")
            }
            Self::BusFailure(msg) => write!(f, "bus failure: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
        }
    }
}

impl Error for TickitError {}

pub type TickitResult<T> = Result<T, TickitError>;
