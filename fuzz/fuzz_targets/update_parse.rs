#![no_main]

use libfuzzer_sys::fuzz_target;
use shopbot_telegram::{parse_update, InteractionKind};

fuzz_target!(|data: &[u8]| {
    let Ok(update) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Some(interaction) = parse_update(&update) else {
        return;
    };
    assert_eq!(
        update.get("update_id").and_then(serde_json::Value::as_i64),
        Some(interaction.update_id)
    );
    match interaction.kind {
        InteractionKind::Command { name, .. } => {
            assert!(!name.is_empty());
            assert!(!name.contains('@'));
        }
        InteractionKind::Text(text) => assert!(!text.trim().is_empty()),
        InteractionKind::Button { .. } => {}
    }
});
