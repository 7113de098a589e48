// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Bus topic naming. Bit-exact: `tickit-<component-id>-in` /
//! `tickit-<component-id>-out`.

use tickit_core::ComponentId;

#[must_use]
pub fn input_topic(component: &ComponentId) -> String {
    format!("tickit-{component}-in")
}

#[must_use]
pub fn output_topic(component: &ComponentId) -> String {
    format!("tickit-{component}-out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_are_bit_exact() {
        let c = ComponentId::new("sensor_1").unwrap();
        assert_eq!(input_topic(&c), "tickit-sensor_1-in");
        assert_eq!(output_topic(&c), "tickit-sensor_1-out");
    }
}
