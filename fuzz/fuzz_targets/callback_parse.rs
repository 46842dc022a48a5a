#![no_main]

use libfuzzer_sys::fuzz_target;
use shopbot_runtime::{DialogueInput, StorefrontAction};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Some(action) = StorefrontAction::parse(&raw) {
        assert_eq!(StorefrontAction::parse(&action.callback_data()), Some(action));
    }
    if let Some(input) = DialogueInput::from_callback(&raw) {
        let encoded = input.callback_data().expect("button inputs encode");
        assert_eq!(DialogueInput::from_callback(&encoded), Some(input));
    }
});
