//! Class file structures and their serialization

use std::io::Write;

use super::constpool::ConstantPool;

/// Header of a class file
pub const MAGIC: u32 = 0xCAFEBABE;

/// Class file major versions
pub mod major_versions {
    pub const JAVA_5_0: u16 = 49;
    pub const JAVA_6_0: u16 = 50;
    pub const JAVA_7: u16 = 51;
    pub const JAVA_8: u16 = 52;
    pub const JAVA_9: u16 = 53;
    pub const JAVA_10: u16 = 54;
    pub const JAVA_11: u16 = 55;
    pub const JAVA_17: u16 = 61;
    pub const JAVA_21: u16 = 65;
}

/// Access flags as stored in the class file
pub mod access_flags {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_VOLATILE: u16 = 0x0040;
    pub const ACC_BRIDGE: u16 = 0x0040;
    pub const ACC_TRANSIENT: u16 = 0x0080;
    pub const ACC_VARARGS: u16 = 0x0080;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_STRICT: u16 = 0x0800;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
}

/// Attribute with its name already in the constant pool
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// Field or method entry
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

/// An object which can be written into a class file
pub trait ClassfileWritable {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()>;

    fn to_classfile_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to_classfile(&mut buffer)?;
        Ok(buffer)
    }
}

impl ClassfileWritable for Attribute {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&self.name_index.to_be_bytes())?;
        buffer.write_all(&(self.info.len() as u32).to_be_bytes())?;
        buffer.write_all(&self.info)
    }
}

impl ClassfileWritable for MemberInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&self.access_flags.to_be_bytes())?;
        buffer.write_all(&self.name_index.to_be_bytes())?;
        buffer.write_all(&self.descriptor_index.to_be_bytes())?;
        write_attributes(&self.attributes, buffer)
    }
}

impl ClassfileWritable for ConstantPool {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        buffer.write_all(&bytes)
    }
}

impl ClassfileWritable for ClassFile {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&MAGIC.to_be_bytes())?;
        buffer.write_all(&self.minor_version.to_be_bytes())?;
        buffer.write_all(&self.major_version.to_be_bytes())?;
        self.constant_pool.write_to_classfile(buffer)?;
        buffer.write_all(&self.access_flags.to_be_bytes())?;
        buffer.write_all(&self.this_class.to_be_bytes())?;
        buffer.write_all(&self.super_class.to_be_bytes())?;
        buffer.write_all(&(self.interfaces.len() as u16).to_be_bytes())?;
        for interface in &self.interfaces {
            buffer.write_all(&interface.to_be_bytes())?;
        }
        buffer.write_all(&(self.fields.len() as u16).to_be_bytes())?;
        for field in &self.fields {
            field.write_to_classfile(buffer)?;
        }
        buffer.write_all(&(self.methods.len() as u16).to_be_bytes())?;
        for method in &self.methods {
            method.write_to_classfile(buffer)?;
        }
        write_attributes(&self.attributes, buffer)
    }
}

fn write_attributes<W: Write>(attributes: &[Attribute], buffer: &mut W) -> std::io::Result<()> {
    buffer.write_all(&(attributes.len() as u16).to_be_bytes())?;
    for attribute in attributes {
        attribute.write_to_classfile(buffer)?;
    }
    Ok(())
}

/// Big-endian byte sink used to build attribute payloads
#[derive(Debug, Default, Clone)]
pub struct ByteBuf {
    pub bytes: Vec<u8>,
}

impl ByteBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u1(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn u2(&mut self, v: u16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u4(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn raw(&mut self, b: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(b);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
