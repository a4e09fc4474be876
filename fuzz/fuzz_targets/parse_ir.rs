#![no_main]
use libfuzzer_sys::fuzz_target;

use helpertag::Module;

fuzz_target!(|text: &str| {
    let _ = env_logger::try_init();
    if let Ok(module) = Module::from_text(text) {
        // Whatever parses must print back into something that parses.
        let printed = format!("{}", module.display());
        let reparsed = Module::from_text(&printed).unwrap();
        assert_eq!(reparsed.funcs.len(), module.funcs.len());
    }
});
