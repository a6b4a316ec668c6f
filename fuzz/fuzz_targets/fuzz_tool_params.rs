#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::{json, Value};
use switchyard::tools::validate_input;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let schema = json!({
        "type": "object",
        "properties": {
            "orderId": { "type": "string" },
            "quantity": { "type": "integer" },
            "express": { "type": "boolean" }
        },
        "required": ["orderId"],
        "additionalProperties": false
    });
    let _ = validate_input(&schema, &input);
});
