//! Minimal ZIP writer shared by the unit tests, integration tests and benches.

#![allow(dead_code)]

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flate2::{write::DeflateEncoder, Compression};

/// Minimal ZIP writer: stored or deflated entries, no extra fields.
#[derive(Default)]
pub struct ZipBuilder {
    out: Vec<u8>,
    central: Vec<u8>,
    count: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.add(name, data, false)
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.add(name, data, true)
    }

    pub fn add(mut self, name: &str, data: &[u8], deflate: bool) -> Self {
        let (method, payload) = if deflate {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::best());
            enc.write_all(data).unwrap();
            (8u16, enc.finish().unwrap())
        } else {
            (0u16, data.to_vec())
        };
        let crc = crc32fast::hash(data);
        let offset = self.out.len() as u32;

        let out = &mut self.out;
        out.write_u32::<LittleEndian>(0x04034b50).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(0x0800).unwrap(); // utf-8 names
        out.write_u16::<LittleEndian>(method).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(crc).unwrap();
        out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        out.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        let cd = &mut self.central;
        cd.write_u32::<LittleEndian>(0x02014b50).unwrap();
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(0x0800).unwrap();
        cd.write_u16::<LittleEndian>(method).unwrap();
        cd.write_u32::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(crc).unwrap();
        cd.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        cd.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        cd.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(offset).unwrap();
        cd.extend_from_slice(name.as_bytes());

        self.count += 1;
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let cd_offset = self.out.len() as u32;
        let cd_size = self.central.len() as u32;
        self.out.extend_from_slice(&self.central);
        let out = &mut self.out;
        out.write_u32::<LittleEndian>(0x06054b50).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        self.out
    }
}

/// Offset of the first byte of entry data for `name` in an archive built by
/// [`ZipBuilder`].
pub fn local_data_offset(zip: &[u8], name: &str) -> usize {
    let mut pos = 0;
    loop {
        assert_eq!(LittleEndian::read_u32(&zip[pos..]), 0x04034b50);
        let csize = LittleEndian::read_u32(&zip[pos + 18..]) as usize;
        let name_len = LittleEndian::read_u16(&zip[pos + 26..]) as usize;
        let entry = &zip[pos + 30..pos + 30 + name_len];
        let data = pos + 30 + name_len;
        if entry == name.as_bytes() {
            return data;
        }
        pos = data + csize;
    }
}

/// Offset of the central directory record for `name`.
pub fn central_record_offset(zip: &[u8], name: &str) -> usize {
    let eocd = zip.len() - 22;
    let mut pos = LittleEndian::read_u32(&zip[eocd + 16..]) as usize;
    loop {
        assert_eq!(LittleEndian::read_u32(&zip[pos..]), 0x02014b50);
        let name_len = LittleEndian::read_u16(&zip[pos + 28..]) as usize;
        if &zip[pos + 46..pos + 46 + name_len] == name.as_bytes() {
            return pos;
        }
        pos += 46 + name_len;
    }
}
