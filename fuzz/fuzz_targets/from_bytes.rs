#![no_main]

use dexbox::{DexFile, VerifyPreset};

libfuzzer_sys::fuzz_target!(|data: &[u8]| {
    // this must not panic
    if let Ok(dex) = DexFile::from_bytes_with(data, VerifyPreset::None) {
        let pool = dex.pool();
        for idx in 0..pool.num_strings() as u32 {
            let _ = pool.resolve_string(idx);
        }
        for idx in 0..pool.num_methods() as u32 {
            let _ = pool.resolve_method(idx);
        }
        for idx in 0..pool.num_class_defs() as u32 {
            let _ = pool.resolve_class_def(idx);
        }
        let _ = pool.map_list();
    }
});
