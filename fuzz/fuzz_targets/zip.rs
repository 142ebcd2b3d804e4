#![no_main]

use dexbox::container::{self, Container};

libfuzzer_sys::fuzz_target!(|data: &[u8]| {
    if let Ok((_, container)) = container::from_bytes(data.to_vec()) {
        for name in container.list_entries() {
            let _ = container.open_entry(&name);
        }
    }
});
