#![no_main]

use dexbox::utf;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // end must be a zero
    if let Some(end) = data.iter().position(|&x| x == 0) {
        if let Ok(s) = utf::mutf8_to_str(&data[..end]) {
            // valid input survives a re-encode
            assert_eq!(utf::mutf8_to_str(&utf::str_to_mutf8(&s)).ok(), Some(s));
        }
        let _ = utf::mutf8_to_str_lossy(&data[..end]);
    }
});
