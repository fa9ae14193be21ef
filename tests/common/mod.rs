// Common test utilities
#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use classmaker::{Code, Expr, MethodRef, Result, Type};

/// Route `log` output through the test harness; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Whether a `java` launcher is on `PATH`
pub fn java_available() -> bool {
    Command::new("java").arg("-version").output().map(|o| o.status.success()).unwrap_or(false)
}

/// Run `main_class` from `classpath` and return its stdout, or `None` when
/// no JVM is installed or it is too old for the generated class version
pub fn run_java(classpath: &Path, main_class: &str) -> Option<String> {
    if !java_available() {
        eprintln!("skipping: no java launcher on PATH");
        return None;
    }
    let output = Command::new("java")
        .arg("-Xverify:all")
        .arg("-cp")
        .arg(classpath)
        .arg(main_class)
        .output()
        .expect("failed to launch java");
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("UnsupportedClassVersionError") {
        eprintln!("skipping: installed JVM is too old");
        return None;
    }
    assert!(output.status.success(), "java {main_class} failed:\n{stderr}");
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `System.out.println(value)` using the overload for `param`
pub fn println(code: &mut Code, blk: classmaker::Block, value: Expr, param: Type) -> Result<()> {
    let out = classmaker::FieldRef::of_static("java/lang/System", "out", Type::class("java/io/PrintStream"));
    let println = MethodRef::of_virtual("java/io/PrintStream", "println", vec![param], Type::void());
    let call = code.invoke(&println, Some(Expr::get_static(&out)?), vec![value])?;
    code.eval(blk, call)
}

// ---- minimal class file reader -------------------------------------------

#[derive(Debug, Clone)]
pub enum CpEntry {
    Utf8(String),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    Ref(u8, u16, u16),
    NameAndType(u16, u16),
    Other(u8),
    /// Second slot of a long or double
    Unusable,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<(String, Vec<u8>)>,
}

impl Member {
    pub fn attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, b)| b.as_slice())
    }

    /// Bytecode of the `Code` attribute
    pub fn code(&self) -> Option<&[u8]> {
        let attr = self.attribute("Code")?;
        let len = u32::from_be_bytes([attr[4], attr[5], attr[6], attr[7]]) as usize;
        Some(&attr[8..8 + len])
    }

    pub fn max_locals(&self) -> Option<u16> {
        self.attribute("Code").map(|a| u16::from_be_bytes([a[2], a[3]]))
    }

    /// Names of the attributes nested in the `Code` attribute
    pub fn code_attributes(&self, cp: &[CpEntry]) -> Vec<String> {
        let Some(attr) = self.attribute("Code") else { return Vec::new() };
        let mut r = Reader { bytes: attr, pos: 4 };
        let len = r.u32() as usize;
        r.pos += len;
        let handlers = r.u16() as usize;
        r.pos += handlers * 8;
        let count = r.u16();
        let mut names = Vec::new();
        for _ in 0..count {
            names.push(utf8(cp, r.u16()));
            let len = r.u32() as usize;
            r.pos += len;
        }
        names
    }

    /// Number of exception table entries
    pub fn handler_count(&self) -> usize {
        let Some(attr) = self.attribute("Code") else { return 0 };
        let len = u32::from_be_bytes([attr[4], attr[5], attr[6], attr[7]]) as usize;
        u16::from_be_bytes([attr[8 + len], attr[9 + len]]) as usize
    }
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub major: u16,
    pub access: u16,
    pub cp: Vec<CpEntry>,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<(String, Vec<u8>)>,
}

impl ClassFile {
    pub fn field(&self, name: &str) -> Option<&Member> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&Member> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, b)| b.as_slice())
    }

    pub fn utf8(&self, index: u16) -> String {
        utf8(&self.cp, index)
    }

    pub fn class_name_at(&self, index: u16) -> String {
        class_name(&self.cp, index)
    }

    /// Class names listed in a `NestMembers` attribute
    pub fn nest_members(&self) -> Vec<String> {
        let Some(attr) = self.attribute("NestMembers") else { return Vec::new() };
        let count = u16::from_be_bytes([attr[0], attr[1]]) as usize;
        (0..count).map(|i| self.class_name_at(u16::from_be_bytes([attr[2 + 2 * i], attr[3 + 2 * i]]))).collect()
    }

    pub fn has_utf8(&self, s: &str) -> bool {
        self.cp.iter().any(|e| matches!(e, CpEntry::Utf8(v) if v == s))
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn u8(&mut self) -> u8 {
        let v = self.bytes[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_be_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_be_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn take(&mut self, n: usize) -> &[u8] {
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        s
    }
}

fn utf8(cp: &[CpEntry], index: u16) -> String {
    match &cp[index as usize] {
        CpEntry::Utf8(s) => s.clone(),
        other => panic!("constant {index} is not Utf8: {other:?}"),
    }
}

fn class_name(cp: &[CpEntry], index: u16) -> String {
    match &cp[index as usize] {
        CpEntry::Class(n) => utf8(cp, *n),
        other => panic!("constant {index} is not a Class: {other:?}"),
    }
}

fn attributes(r: &mut Reader<'_>, cp: &[CpEntry]) -> Vec<(String, Vec<u8>)> {
    let count = r.u16();
    (0..count)
        .map(|_| {
            let name = utf8(cp, r.u16());
            let len = r.u32() as usize;
            (name, r.take(len).to_vec())
        })
        .collect()
}

fn members(r: &mut Reader<'_>, cp: &[CpEntry]) -> Vec<Member> {
    let count = r.u16();
    (0..count)
        .map(|_| {
            let access = r.u16();
            let name = utf8(cp, r.u16());
            let descriptor = utf8(cp, r.u16());
            let attributes = attributes(r, cp);
            Member { access, name, descriptor, attributes }
        })
        .collect()
}

/// Parse the structure of a class file; panics on malformed input
pub fn parse_class(bytes: &[u8]) -> ClassFile {
    let mut r = Reader { bytes, pos: 0 };
    assert_eq!(r.u32(), 0xCAFE_BABE, "bad magic");
    let _minor = r.u16();
    let major = r.u16();
    let cp_count = r.u16();
    let mut cp = vec![CpEntry::Unusable];
    while cp.len() < cp_count as usize {
        let tag = r.u8();
        let entry = match tag {
            1 => {
                let len = r.u16() as usize;
                CpEntry::Utf8(String::from_utf8_lossy(r.take(len)).into_owned())
            }
            3 => CpEntry::Int(r.u32() as i32),
            4 => CpEntry::Float(f32::from_bits(r.u32())),
            5 => {
                let v = ((r.u32() as u64) << 32 | r.u32() as u64) as i64;
                cp.push(CpEntry::Long(v));
                CpEntry::Unusable
            }
            6 => {
                let v = (r.u32() as u64) << 32 | r.u32() as u64;
                cp.push(CpEntry::Double(f64::from_bits(v)));
                CpEntry::Unusable
            }
            7 => CpEntry::Class(r.u16()),
            8 => CpEntry::String(r.u16()),
            9..=11 => CpEntry::Ref(tag, r.u16(), r.u16()),
            12 => CpEntry::NameAndType(r.u16(), r.u16()),
            15 => {
                r.take(3);
                CpEntry::Other(tag)
            }
            16 | 19 | 20 => {
                r.take(2);
                CpEntry::Other(tag)
            }
            17 | 18 => {
                r.take(4);
                CpEntry::Other(tag)
            }
            other => panic!("unknown constant tag {other}"),
        };
        cp.push(entry);
    }
    let access = r.u16();
    let name = class_name(&cp, r.u16());
    let super_index = r.u16();
    let super_name = (super_index != 0).then(|| class_name(&cp, super_index));
    let iface_count = r.u16();
    let interfaces = (0..iface_count).map(|_| class_name(&cp, r.u16())).collect();
    let fields = members(&mut r, &cp);
    let methods = members(&mut r, &cp);
    let attributes = attributes(&mut r, &cp);
    assert_eq!(r.pos, bytes.len(), "trailing bytes after class file");
    ClassFile { major, access, cp, name, super_name, interfaces, fields, methods, attributes }
}
