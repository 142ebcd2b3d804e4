//! Fixture builders shared by the integration tests: a dex image assembler
//! and a minimal ZIP writer.

#![allow(dead_code)]

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};

mod zip;
pub use zip::{central_record_offset, local_data_offset, ZipBuilder};

pub const NO_INDEX: u32 = 0xFFFF_FFFF;

pub fn uleb128(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassSpec {
    pub class: u32,
    pub access_flags: u32,
    pub superclass: Option<u32>,
    pub interfaces: Vec<u16>,
    pub source_file: Option<u32>,
    /// (field index, access flags), sorted by index
    pub static_fields: Vec<(u32, u32)>,
    pub instance_fields: Vec<(u32, u32)>,
    /// (method index, access flags, code offset), sorted by index
    pub direct_methods: Vec<(u32, u32, u32)>,
    pub virtual_methods: Vec<(u32, u32, u32)>,
}

impl ClassSpec {
    fn has_members(&self) -> bool {
        !(self.static_fields.is_empty()
            && self.instance_fields.is_empty()
            && self.direct_methods.is_empty()
            && self.virtual_methods.is_empty())
    }
}

/// Assembles a structurally valid dex image.
#[derive(Debug, Clone, Default)]
pub struct DexBuilder {
    /// (utf16 length, mutf-8 bytes without terminator)
    strings: Vec<(u32, Vec<u8>)>,
    types: Vec<u32>,
    protos: Vec<(u32, u32, Vec<u16>)>,
    fields: Vec<(u16, u16, u32)>,
    methods: Vec<(u16, u16, u32)>,
    classes: Vec<ClassSpec>,
    big_endian: bool,
    version: Option<[u8; 3]>,
}

struct Out {
    buf: Vec<u8>,
    big: bool,
}

impl Out {
    fn u16(&mut self, v: u16) {
        if self.big {
            self.buf.write_u16::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u16::<LittleEndian>(v).unwrap();
        }
    }

    fn u32(&mut self, v: u32) {
        if self.big {
            self.buf.write_u32::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u32::<LittleEndian>(v).unwrap();
        }
    }

    fn align4(&mut self) {
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
    }
}

impl DexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn version(mut self, version: &[u8; 3]) -> Self {
        self.version = Some(*version);
        self
    }

    /// Interns `s`, encoded as MUTF-8.
    pub fn string(&mut self, s: &str) -> u32 {
        let utf16_len = s.encode_utf16().count() as u32;
        let bytes = dexbox::utf::str_to_mutf8(s);
        // drop the terminator, it is written with the item
        let bytes = bytes[..bytes.len() - 1].to_vec();
        if let Some(idx) = self.strings.iter().position(|(_, b)| *b == bytes) {
            return idx as u32;
        }
        self.raw_string(utf16_len, &bytes)
    }

    /// Adds a string item with arbitrary content and declared length.
    pub fn raw_string(&mut self, utf16_len: u32, bytes: &[u8]) -> u32 {
        self.strings.push((utf16_len, bytes.to_vec()));
        (self.strings.len() - 1) as u32
    }

    pub fn type_(&mut self, descriptor: &str) -> u32 {
        let string_idx = self.string(descriptor);
        if let Some(idx) = self.types.iter().position(|s| *s == string_idx) {
            return idx as u32;
        }
        self.types.push(string_idx);
        (self.types.len() - 1) as u32
    }

    pub fn proto(&mut self, return_type: &str, params: &[&str]) -> u32 {
        let shorty: String = std::iter::once(return_type)
            .chain(params.iter().copied())
            .map(|d| match d.as_bytes()[0] {
                b'[' => 'L',
                c => c as char,
            })
            .collect();
        let shorty_idx = self.string(&shorty);
        let ret = self.type_(return_type);
        let params: Vec<u16> = params.iter().map(|p| self.type_(p) as u16).collect();
        self.protos.push((shorty_idx, ret, params));
        (self.protos.len() - 1) as u32
    }

    pub fn field(&mut self, class: &str, type_: &str, name: &str) -> u32 {
        let class = self.type_(class) as u16;
        let type_ = self.type_(type_) as u16;
        let name = self.string(name);
        self.fields.push((class, type_, name));
        (self.fields.len() - 1) as u32
    }

    pub fn method(&mut self, class: &str, name: &str, return_type: &str, params: &[&str]) -> u32 {
        let class = self.type_(class) as u16;
        let proto = self.proto(return_type, params) as u16;
        let name = self.string(name);
        self.methods.push((class, proto, name));
        (self.methods.len() - 1) as u32
    }

    pub fn class(&mut self, spec: ClassSpec) -> u32 {
        self.classes.push(spec);
        (self.classes.len() - 1) as u32
    }

    pub fn build(&self) -> Vec<u8> {
        let big = self.big_endian;
        let header_size = 0x70u32;
        let mut off = header_size;
        let mut place = |count: usize, width: u32| {
            if count == 0 {
                return 0;
            }
            let at = off;
            off += count as u32 * width;
            at
        };
        let string_ids_off = place(self.strings.len(), 4);
        let type_ids_off = place(self.types.len(), 4);
        let proto_ids_off = place(self.protos.len(), 12);
        let field_ids_off = place(self.fields.len(), 8);
        let method_ids_off = place(self.methods.len(), 8);
        let class_defs_off = place(self.classes.len(), 32);
        let data_off = off;

        // data section, offsets are absolute
        let mut data = Out {
            buf: vec![0; data_off as usize],
            big,
        };
        let mut string_offsets = Vec::new();
        for (utf16_len, bytes) in &self.strings {
            string_offsets.push(data.buf.len() as u32);
            uleb128(*utf16_len, &mut data.buf);
            data.buf.extend_from_slice(bytes);
            data.buf.push(0);
        }

        let mut type_lists = 0u32;
        let mut type_list_off = |data: &mut Out, list: &[u16]| -> u32 {
            if list.is_empty() {
                return 0;
            }
            data.align4();
            let at = data.buf.len() as u32;
            data.u32(list.len() as u32);
            for t in list {
                data.u16(*t);
            }
            type_lists += 1;
            at
        };
        let proto_params: Vec<u32> = self
            .protos
            .iter()
            .map(|(_, _, params)| type_list_off(&mut data, params))
            .collect();
        let interfaces: Vec<u32> = self
            .classes
            .iter()
            .map(|c| type_list_off(&mut data, &c.interfaces))
            .collect();
        let first_type_list = proto_params
            .iter()
            .chain(&interfaces)
            .copied()
            .filter(|o| *o != 0)
            .min()
            .unwrap_or(0);

        let mut class_data_offsets = Vec::new();
        let mut class_data_count = 0;
        let class_data_start = data.buf.len() as u32;
        for class in &self.classes {
            if !class.has_members() {
                class_data_offsets.push(0);
                continue;
            }
            class_data_count += 1;
            class_data_offsets.push(data.buf.len() as u32);
            let buf = &mut data.buf;
            uleb128(class.static_fields.len() as u32, buf);
            uleb128(class.instance_fields.len() as u32, buf);
            uleb128(class.direct_methods.len() as u32, buf);
            uleb128(class.virtual_methods.len() as u32, buf);
            for fields in [&class.static_fields, &class.instance_fields] {
                let mut prev = 0;
                for (idx, flags) in fields {
                    uleb128(idx - prev, buf);
                    uleb128(*flags, buf);
                    prev = *idx;
                }
            }
            for methods in [&class.direct_methods, &class.virtual_methods] {
                let mut prev = 0;
                for (idx, flags, code) in methods {
                    uleb128(idx - prev, buf);
                    uleb128(*flags, buf);
                    uleb128(*code, buf);
                    prev = *idx;
                }
            }
        }

        data.align4();
        let map_off = data.buf.len() as u32;
        let mut map: Vec<(u16, u32, u32)> = vec![(0x0000, 1, 0)];
        for (ty, count, at) in [
            (0x0001, self.strings.len(), string_ids_off),
            (0x0002, self.types.len(), type_ids_off),
            (0x0003, self.protos.len(), proto_ids_off),
            (0x0004, self.fields.len(), field_ids_off),
            (0x0005, self.methods.len(), method_ids_off),
            (0x0006, self.classes.len(), class_defs_off),
            (0x2002, self.strings.len(), data_off),
            (0x1001, type_lists as usize, first_type_list),
            (0x2000, class_data_count, class_data_start),
        ] {
            if count > 0 {
                map.push((ty, count as u32, at));
            }
        }
        map.push((0x1000, 1, map_off));
        data.u32(map.len() as u32);
        for (ty, count, at) in &map {
            data.u16(*ty);
            data.u16(0);
            data.u32(*count);
            data.u32(*at);
        }
        data.align4();

        let file_size = data.buf.len() as u32;
        let data_size = file_size - data_off;

        // id tables and header, written over the zeroed prefix
        let mut ids = Out {
            buf: Vec::new(),
            big,
        };
        for at in &string_offsets {
            ids.u32(*at);
        }
        for string_idx in &self.types {
            ids.u32(*string_idx);
        }
        for ((shorty, ret, _), params_off) in self.protos.iter().zip(&proto_params) {
            ids.u32(*shorty);
            ids.u32(*ret);
            ids.u32(*params_off);
        }
        for (class, type_, name) in &self.fields {
            ids.u16(*class);
            ids.u16(*type_);
            ids.u32(*name);
        }
        for (class, proto, name) in &self.methods {
            ids.u16(*class);
            ids.u16(*proto);
            ids.u32(*name);
        }
        for ((class, interfaces_off), class_data_off) in self
            .classes
            .iter()
            .zip(&interfaces)
            .zip(&class_data_offsets)
        {
            ids.u32(class.class);
            ids.u32(class.access_flags);
            ids.u32(class.superclass.unwrap_or(NO_INDEX));
            ids.u32(*interfaces_off);
            ids.u32(class.source_file.unwrap_or(NO_INDEX));
            ids.u32(0); // annotations
            ids.u32(*class_data_off);
            ids.u32(0); // static values
        }

        let mut header = Out {
            buf: Vec::new(),
            big,
        };
        header.buf.extend_from_slice(b"dex\n");
        header
            .buf
            .extend_from_slice(self.version.as_ref().unwrap_or(b"035"));
        header.buf.push(0);
        header.u32(0); // checksum
        header.buf.extend_from_slice(&[0; 20]); // signature
        header.u32(file_size);
        header.u32(header_size);
        header.u32(0x12345678);
        header.u32(0); // link
        header.u32(0);
        header.u32(map_off);
        for (count, at) in [
            (self.strings.len(), string_ids_off),
            (self.types.len(), type_ids_off),
            (self.protos.len(), proto_ids_off),
            (self.fields.len(), field_ids_off),
            (self.methods.len(), method_ids_off),
            (self.classes.len(), class_defs_off),
        ] {
            header.u32(count as u32);
            header.u32(at);
        }
        header.u32(data_size);
        header.u32(data_off);
        assert_eq!(header.buf.len(), header_size as usize);

        let mut image = data.buf;
        image[..header.buf.len()].copy_from_slice(&header.buf);
        let ids_end = header_size as usize + ids.buf.len();
        image[header_size as usize..ids_end].copy_from_slice(&ids.buf);
        fix_integrity(&mut image, big);
        image
    }
}

/// Recomputes the signature and checksum of a patched image.
pub fn fix_integrity(image: &mut [u8], big_endian: bool) {
    let digest = Sha1::digest(&image[32..]);
    image[12..32].copy_from_slice(&digest);
    let checksum = adler32::RollingAdler32::from_buffer(&image[12..]).hash();
    if big_endian {
        BigEndian::write_u32(&mut image[8..12], checksum);
    } else {
        LittleEndian::write_u32(&mut image[8..12], checksum);
    }
}

/// Indices of the interesting items in [`sample_dex`].
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub foo: u32,
    pub object: u32,
    pub foo_class: u32,
    pub base_class: u32,
    pub count_field: u32,
    pub tag_field: u32,
    pub init_method: u32,
    pub accept_method: u32,
    pub main_method: u32,
    pub run_method: u32,
    pub accept_proto: u32,
    pub hello: u32,
}

/// A small dex with two classes:
///
/// ```text
/// public final class com.example.Foo extends java.lang.Object implements java.lang.Runnable
/// abstract class com.example.Base
/// ```
pub fn sample_builder() -> (DexBuilder, Sample) {
    let mut b = DexBuilder::new();
    let foo_desc = "Lcom/example/Foo;";
    let object = b.type_("Ljava/lang/Object;");
    let foo = b.type_(foo_desc);
    let runnable = b.type_("Ljava/lang/Runnable;") as u16;
    let base = b.type_("Lcom/example/Base;");
    let source = b.string("Foo.java");
    let hello = b.string("hello \u{1F600} world");

    let count_field = b.field(foo_desc, "I", "count");
    let tag_field = b.field(foo_desc, "Ljava/lang/String;", "TAG");
    let init_method = b.method(foo_desc, "<init>", "V", &[]);
    let accept_method = b.method(foo_desc, "accept", "V", &["Ljava/lang/Object;"]);
    let main_method = b.method(foo_desc, "main", "V", &["[Ljava/lang/String;"]);
    let run_method = b.method(foo_desc, "run", "V", &[]);
    let accept_proto = b.methods[accept_method as usize].1 as u32;

    let foo_class = b.class(ClassSpec {
        class: foo,
        access_flags: 0x0011,
        superclass: Some(object),
        interfaces: vec![runnable],
        source_file: Some(source),
        static_fields: vec![(tag_field, 0x0019)],
        instance_fields: vec![(count_field, 0x0002)],
        direct_methods: vec![(init_method, 0x10001, 0), (main_method, 0x0009, 0)],
        virtual_methods: vec![(accept_method, 0x0001, 0), (run_method, 0x0001, 0)],
    });
    let base_class = b.class(ClassSpec {
        class: base,
        access_flags: 0x0400,
        superclass: Some(object),
        ..Default::default()
    });

    let sample = Sample {
        foo,
        object,
        foo_class,
        base_class,
        count_field,
        tag_field,
        init_method,
        accept_method,
        main_method,
        run_method,
        accept_proto,
        hello,
    };
    (b, sample)
}

pub fn sample_dex() -> Vec<u8> {
    sample_builder().0.build()
}
