#![no_main]

use libfuzzer_sys::fuzz_target;
use shopbot_runtime::{decode_discount_mirror, decode_summary, MIRROR_SCHEMA_VERSION};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(payload) = decode_summary(&raw) {
        assert!(payload.schema_version <= MIRROR_SCHEMA_VERSION);
    }
    if let Ok(mirror) = decode_discount_mirror(&raw) {
        for user_id in &mirror.skipped {
            assert!(!mirror.entries.contains_key(user_id));
        }
    }
});
