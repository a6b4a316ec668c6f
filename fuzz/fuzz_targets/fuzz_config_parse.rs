#![no_main]

use libfuzzer_sys::fuzz_target;
use switchyard::config::Config;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = toml::from_str::<Config>(text) {
        let _ = config.validate();
        let _ = config.tool_loop.to_loop_config();
        let _ = config.history.to_policy();
        let _ = config.reliability.to_retry_policy();
    }
});
