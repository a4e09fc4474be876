#![no_main]
use libfuzzer_sys::fuzz_target;

use helpertag::fuzzing::{check_tag_invariants, ArbitraryModule};
use helpertag::passes::tag_helpers;
use helpertag::Module;

fuzz_target!(|module: ArbitraryModule| {
    let _ = env_logger::try_init();
    let before = module.0;
    let mut after = before.clone();
    assert!(tag_helpers::run(&mut after));
    check_tag_invariants(&before, &after);

    let printed = format!("{}", after.display());
    let reparsed = Module::from_text(&printed).unwrap();
    assert_eq!(reparsed.funcs.len(), after.funcs.len());
    assert_eq!(reparsed.strings.len(), after.strings.len());
});
