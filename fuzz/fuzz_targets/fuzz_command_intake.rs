#![no_main]
use ledreg_core::{LineAssembler, TargetCommand, parse_target_command};
use libfuzzer_sys::fuzz_target;

const MAX_MA: f32 = 1400.0;

fuzz_target!(|data: &[u8]| {
    let mut asm = LineAssembler::<64>::new();
    for &b in data {
        if let Some(Ok(line)) = asm.push(b) {
            match parse_target_command(&line, MAX_MA) {
                Ok(TargetCommand::Set(ma)) => assert!(ma.is_finite() && ma > 0.0 && ma <= MAX_MA),
                Ok(TargetCommand::Off) | Err(_) => {}
            }
        }
        assert!(asm.pending() <= 64);
    }
});
