#![no_main]

use dexbox::file::{reader::DexReader, ClassData, Endianness};

libfuzzer_sys::fuzz_target!(|data: &[u8]| {
    let r = DexReader::new(data, Endianness::Little);
    if let Ok(class_data) = ClassData::parse(&r, 0) {
        assert!(class_data.num_fields() + class_data.num_methods() <= data.len());
    }
});
