//! Deduplicating constant pool

use std::collections::HashMap;

use super::error::{BackendError, BackendResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
}

impl Constant {
    /// Long and double entries occupy two pool indices
    fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn write_to(&self, bytes: &mut Vec<u8>) {
        use constant_tags::*;
        match self {
            Constant::Utf8(value) => {
                let encoded = encode_modified_utf8(value);
                bytes.push(CONSTANT_UTF8);
                bytes.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
                bytes.extend_from_slice(&encoded);
            }
            Constant::Integer(value) => {
                bytes.push(CONSTANT_INTEGER);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Float(value) => {
                bytes.push(CONSTANT_FLOAT);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            Constant::Long(value) => {
                bytes.push(CONSTANT_LONG);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Double(value) => {
                bytes.push(CONSTANT_DOUBLE);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            Constant::Class(name_index) => {
                bytes.push(CONSTANT_CLASS);
                bytes.extend_from_slice(&name_index.to_be_bytes());
            }
            Constant::String(string_index) => {
                bytes.push(CONSTANT_STRING);
                bytes.extend_from_slice(&string_index.to_be_bytes());
            }
            Constant::FieldRef(class_index, nat_index) => {
                bytes.push(CONSTANT_FIELDREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&nat_index.to_be_bytes());
            }
            Constant::MethodRef(class_index, nat_index) => {
                bytes.push(CONSTANT_METHODREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&nat_index.to_be_bytes());
            }
            Constant::InterfaceMethodRef(class_index, nat_index) => {
                bytes.push(CONSTANT_INTERFACEMETHODREF);
                bytes.extend_from_slice(&class_index.to_be_bytes());
                bytes.extend_from_slice(&nat_index.to_be_bytes());
            }
            Constant::NameAndType(name_index, descriptor_index) => {
                bytes.push(CONSTANT_NAMEANDTYPE);
                bytes.extend_from_slice(&name_index.to_be_bytes());
                bytes.extend_from_slice(&descriptor_index.to_be_bytes());
            }
        }
    }
}

/// Hashable identity of a pool entry; floats are keyed by their bits so
/// NaN and signed zeros stay distinct
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

impl Key {
    fn of(c: &Constant) -> Self {
        match c {
            Constant::Utf8(s) => Key::Utf8(s.clone()),
            Constant::Integer(v) => Key::Integer(*v),
            Constant::Float(v) => Key::Float(v.to_bits()),
            Constant::Long(v) => Key::Long(*v),
            Constant::Double(v) => Key::Double(v.to_bits()),
            Constant::Class(i) => Key::Class(*i),
            Constant::String(i) => Key::String(*i),
            Constant::FieldRef(a, b) => Key::FieldRef(*a, *b),
            Constant::MethodRef(a, b) => Key::MethodRef(*a, *b),
            Constant::InterfaceMethodRef(a, b) => Key::InterfaceMethodRef(*a, *b),
            Constant::NameAndType(a, b) => Key::NameAndType(*a, *b),
        }
    }
}

#[derive(Debug)]
pub struct ConstantPool {
    /// Entries with the pool index they were assigned
    constants: Vec<(u16, Constant)>,
    index: HashMap<Key, u16>,
    /// Next free index; index 0 is never used
    next: u16,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { constants: Vec::new(), index: HashMap::new(), next: 1 }
    }

    fn add(&mut self, constant: Constant) -> BackendResult<u16> {
        let key = Key::of(&constant);
        if let Some(&i) = self.index.get(&key) {
            return Ok(i);
        }
        let i = self.next;
        let next = u32::from(i) + u32::from(constant.width());
        if next > u32::from(u16::MAX) {
            return Err(BackendError::ConstPoolOverflow);
        }
        self.next = next as u16;
        self.index.insert(key, i);
        self.constants.push((i, constant));
        Ok(i)
    }

    pub fn add_utf8(&mut self, value: &str) -> BackendResult<u16> {
        let len = modified_utf8_len(value);
        if len > usize::from(u16::MAX) {
            return Err(BackendError::Utf8TooLong { len });
        }
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn add_class(&mut self, name: &str) -> BackendResult<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> BackendResult<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType(name_index, descriptor_index))
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> BackendResult<u16> {
        let class_index = self.add_class(class)?;
        let nat = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(class_index, nat))
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str, interface: bool) -> BackendResult<u16> {
        let class_index = self.add_class(class)?;
        let nat = self.add_name_and_type(name, descriptor)?;
        if interface {
            self.add(Constant::InterfaceMethodRef(class_index, nat))
        } else {
            self.add(Constant::MethodRef(class_index, nat))
        }
    }

    pub fn add_string(&mut self, value: &str) -> BackendResult<u16> {
        let utf8_index = self.add_utf8(value)?;
        self.add(Constant::String(utf8_index))
    }

    pub fn add_integer(&mut self, value: i32) -> BackendResult<u16> {
        self.add(Constant::Integer(value))
    }

    pub fn add_float(&mut self, value: f32) -> BackendResult<u16> {
        self.add(Constant::Float(value))
    }

    pub fn add_long(&mut self, value: i64) -> BackendResult<u16> {
        self.add(Constant::Long(value))
    }

    pub fn add_double(&mut self, value: f64) -> BackendResult<u16> {
        self.add(Constant::Double(value))
    }

    /// The `constant_pool_count` value (one more than the highest index)
    pub fn count(&self) -> u16 {
        self.next
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.constants.iter().find(|(i, _)| *i == index).map(|(_, c)| c)
    }

    pub fn write_to(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.count().to_be_bytes());
        for (_, constant) in &self.constants {
            constant.write_to(bytes);
        }
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of `s` in the class file's modified UTF-8
pub fn modified_utf8_len(s: &str) -> usize {
    s.encode_utf16()
        .map(|u| match u {
            0x0001..=0x007f => 1,
            0x0000 | 0x0080..=0x07ff => 2,
            _ => 3,
        })
        .sum()
}

/// Encode `s` as modified UTF-8: NUL becomes two bytes and supplementary
/// characters are written as encoded surrogate pairs
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for u in s.encode_utf16() {
        match u {
            0x0001..=0x007f => out.push(u as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (u >> 6) as u8);
                out.push(0x80 | (u & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (u >> 12) as u8);
                out.push(0x80 | ((u >> 6) & 0x3f) as u8);
                out.push(0x80 | (u & 0x3f) as u8);
            }
        }
    }
    out
}
