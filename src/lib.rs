use std::result;

pub mod container;
pub mod error;
pub mod file;
pub mod leb128;
pub mod utf;

pub mod desc_names;

pub use container::Container;
pub use file::{DexFile, VerifyPreset};

pub type Result<T> = result::Result<T, error::DexError>;
