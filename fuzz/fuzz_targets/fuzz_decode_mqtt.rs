#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever the broker sends must either decode or be rejected cleanly
    if let Ok(fields) = powerocean::mqtt::decode_payload(data) {
        let value = serde_json::Value::Object(fields.clone());
        let _ = powerocean::signature::flatten_params(&value);
        let _ = powerocean::signature::flatten_fields(&fields, "");
    }
});
