//! Fuzz target: `commands::parse`
//!
//! Splits the input into a topic and a payload and checks that every
//! resulting command stays inside the actuator bank.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use envnode::app::commands;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&count, rest)) = data.split_first() else {
        return;
    };
    let count = usize::from(count % 8) + 1;
    let split = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let topic = String::from_utf8_lossy(&rest[..split]);
    let payload = rest.get(split + 1..).unwrap_or(&[]);

    let cmd = commands::parse(&topic, payload, count);
    assert!(cmd.index < count, "index {} outside bank of {}", cmd.index, count);
    assert!(cmd.duty <= commands::MAX_DUTY_PERCENT, "duty {} above 100", cmd.duty);
});
