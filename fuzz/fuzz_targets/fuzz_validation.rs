//! Fuzz testing for validation functions.
//!
//! Feeds arbitrary input to the phone and message validators and checks that
//! they never panic and agree with each other.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `validate_phone_number` and `NormalizedPhoneNumber::parse` accept the same inputs
//! - A normalized number always re-validates
//! - `sanitize_message` output has no control characters and no raw `<` or `>`

#![no_main]

use libfuzzer_sys::fuzz_target;
use whatsapp_relay::validation::{
    NormalizedPhoneNumber, sanitize_message, validate_message_content, validate_phone_number,
};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let valid = validate_phone_number(s);
    let parsed = NormalizedPhoneNumber::parse(s);
    assert_eq!(valid, parsed.is_ok());

    if let Ok(phone) = parsed {
        assert!(validate_phone_number(&phone.as_e164()));
        assert!(validate_phone_number(phone.as_wire()));
    }

    let _ = validate_message_content(s);

    let clean = sanitize_message(s);
    assert!(clean.chars().all(|c| u32::from(c) >= 32));
    assert!(!clean.contains('<') && !clean.contains('>'));
});
