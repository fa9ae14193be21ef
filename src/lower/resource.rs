//! Large collection literals loaded from a string blob
//!
//! A `List`/`Set`/`Map` constant with many scalar elements would otherwise
//! cost several instructions per element. Instead its elements are encoded
//! into a string constant, decoded once in `<clinit>` by a synthetic helper
//! and kept in a static final field.
//!
//! Each element is written as a tag character, the payload length in UTF-16
//! units, `:`, then the payload:
//!
//! | tag | payload |
//! |-----|---------|
//! | `Z` | `true` or `false` |
//! | `B` `S` `I` `J` | decimal value |
//! | `C` | decimal UTF-16 code unit |
//! | `F` | decimal `Float.floatToRawIntBits` |
//! | `D` | decimal `Double.doubleToRawLongBits` |
//! | `T` | the string itself |
//!
//! Map entries are flattened into key, value, key, value.

use log::debug;

use crate::backend::classfile::access_flags::{ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC};
use crate::backend::opcodes::*;
use crate::backend::{CodeRequest, FieldRequest, Insn, Label, LdcConst, MethodRequest};
use crate::error::{Error, Result};
use crate::ir::Constant;
use crate::types::OBJECT;

pub(crate) const DECODER_NAME: &str = "$decodeConstants";
pub(crate) const DECODER_DESC: &str = "(Ljava/lang/String;II)Ljava/lang/Object;";

/// Longest string constant written per `ldc`; stays well below the
/// 65535-byte limit of a `CONSTANT_Utf8` entry
const CHUNK_CHARS: usize = 10_000;

const KIND_LIST: i32 = 0;
const KIND_SET: i32 = 1;
const KIND_MAP: i32 = 2;

#[derive(Debug, Default)]
pub(crate) struct ResourcePool {
    constants: Vec<Constant>,
}

impl ResourcePool {
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Name of the static field that will hold `constant`
    pub fn intern(&mut self, constant: &Constant) -> Result<String> {
        if !constant.is_collection() || constant.requires_inline() {
            return Err(Error::invalid_state(format!("{constant:?} cannot be stored as a resource")));
        }
        let index = match self.constants.iter().position(|c| c == constant) {
            Some(i) => i,
            None => {
                debug!("moving {}-element {} literal into the resource blob", constant.element_count(), constant.ty());
                self.constants.push(constant.clone());
                self.constants.len() - 1
            }
        };
        Ok(field_name(index))
    }

    pub fn fields(&self, host_is_interface: bool) -> Vec<FieldRequest> {
        let mut access = ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC;
        if host_is_interface {
            access |= ACC_PUBLIC;
        }
        self.constants
            .iter()
            .enumerate()
            .map(|(i, c)| FieldRequest { access, name: field_name(i), descriptor: c.ty().descriptor(), ..Default::default() })
            .collect()
    }

    /// `<clinit>` code decoding every resource into its field
    pub fn init_insns(&self, host: &str, host_is_interface: bool) -> Result<Vec<Insn>> {
        let mut out = Vec::new();
        for (i, constant) in self.constants.iter().enumerate() {
            let (blob, count, kind) = encode(constant)?;
            let chunks = split_chunks(&blob);
            for (n, chunk) in chunks.iter().enumerate() {
                out.push(Insn::Ldc(LdcConst::String(chunk.clone())));
                if n > 0 {
                    out.push(invoke(INVOKEVIRTUAL, "java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;", false));
                }
            }
            out.push(Insn::Push(count));
            out.push(Insn::Push(kind));
            out.push(invoke(INVOKESTATIC, host, DECODER_NAME, DECODER_DESC, host_is_interface));
            let ty = constant.ty();
            out.push(Insn::Type { op: CHECKCAST, class: ty.class_constant_name() });
            out.push(Insn::Field { op: PUTSTATIC, owner: host.to_string(), name: field_name(i), descriptor: ty.descriptor() });
        }
        Ok(out)
    }

    /// The synthetic `static Object $decodeConstants(String blob, int count, int kind)`
    pub fn decoder(&self) -> MethodRequest {
        MethodRequest {
            access: ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC,
            name: DECODER_NAME.to_string(),
            descriptor: DECODER_DESC.to_string(),
            code: Some(CodeRequest { insns: decoder_insns(), ..Default::default() }),
            ..Default::default()
        }
    }
}

fn field_name(index: usize) -> String {
    format!("$rc${index}")
}

fn invoke(op: u8, owner: &str, name: &str, descriptor: &str, interface: bool) -> Insn {
    Insn::Invoke { op, owner: owner.to_string(), name: name.to_string(), descriptor: descriptor.to_string(), interface }
}

/// Blob text, element count and collection kind of a resource constant
pub(crate) fn encode(constant: &Constant) -> Result<(String, i32, i32)> {
    let mut blob = String::new();
    let (count, kind) = match constant {
        Constant::List(items) | Constant::Set(items) => {
            for item in items {
                encode_element(item, &mut blob)?;
            }
            let kind = if matches!(constant, Constant::List(_)) { KIND_LIST } else { KIND_SET };
            (items.len(), kind)
        }
        Constant::Map(entries) => {
            for (k, v) in entries {
                encode_element(k, &mut blob)?;
                encode_element(v, &mut blob)?;
            }
            (entries.len() * 2, KIND_MAP)
        }
        other => return Err(Error::invalid_state(format!("{other:?} is not a collection"))),
    };
    let count = i32::try_from(count).map_err(|_| Error::invalid_argument("collection literal is too large"))?;
    Ok((blob, count, kind))
}

fn encode_element(c: &Constant, out: &mut String) -> Result<()> {
    let (tag, text) = match c {
        Constant::Boolean(v) => ('Z', v.to_string()),
        Constant::Byte(v) => ('B', v.to_string()),
        Constant::Short(v) => ('S', v.to_string()),
        Constant::Int(v) => ('I', v.to_string()),
        Constant::Long(v) => ('J', v.to_string()),
        Constant::Char(v) => ('C', v.to_string()),
        Constant::Float(v) => ('F', (v.to_bits() as i32).to_string()),
        Constant::Double(v) => ('D', (v.to_bits() as i64).to_string()),
        Constant::String(s) => ('T', s.clone()),
        other => return Err(Error::invalid_state(format!("{other:?} cannot be encoded as a resource element"))),
    };
    out.push(tag);
    out.push_str(&text.encode_utf16().count().to_string());
    out.push(':');
    out.push_str(&text);
    Ok(())
}

fn split_chunks(blob: &str) -> Vec<String> {
    if blob.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = blob.chars().collect();
    chars.chunks(CHUNK_CHARS).map(|c| c.iter().collect()).collect()
}

// Decoder locals
const BLOB: u16 = 0;
const COUNT: u16 = 1;
const KIND: u16 = 2;
const VALUES: u16 = 3;
const POS: u16 = 4;
const INDEX: u16 = 5;
const TAG: u16 = 6;
const COLON: u16 = 7;
const LEN: u16 = 8;
const TEXT: u16 = 9;
const ENTRIES: u16 = 6;

fn decoder_insns() -> Vec<Insn> {
    let mut next = 0;
    let mut label = || {
        next += 1;
        Label(next)
    };
    let (top, next_elem, done, not_list, map, map_top, map_done) =
        (label(), label(), label(), label(), label(), label(), label());
    let text_arm = label();

    let load = |op: u8, slot: u16| Insn::Local { op, slot };
    let string = "java/lang/String";
    let mut c = vec![
        load(ILOAD, COUNT),
        Insn::Type { op: ANEWARRAY, class: OBJECT.to_string() },
        load(ASTORE, VALUES),
        Insn::Push(0),
        load(ISTORE, POS),
        Insn::Push(0),
        load(ISTORE, INDEX),
        Insn::Label(top),
        load(ILOAD, INDEX),
        load(ILOAD, COUNT),
        Insn::Jump { op: IF_ICMPGE, target: done },
        // tag = blob.charAt(pos)
        load(ALOAD, BLOB),
        load(ILOAD, POS),
        invoke(INVOKEVIRTUAL, string, "charAt", "(I)C", false),
        load(ISTORE, TAG),
        // colon = blob.indexOf(':', pos)
        load(ALOAD, BLOB),
        Insn::Push(':' as i32),
        load(ILOAD, POS),
        invoke(INVOKEVIRTUAL, string, "indexOf", "(II)I", false),
        load(ISTORE, COLON),
        // len = Integer.parseInt(blob.substring(pos + 1, colon))
        load(ALOAD, BLOB),
        load(ILOAD, POS),
        Insn::Push(1),
        Insn::Op(IADD),
        load(ILOAD, COLON),
        invoke(INVOKEVIRTUAL, string, "substring", "(II)Ljava/lang/String;", false),
        invoke(INVOKESTATIC, "java/lang/Integer", "parseInt", "(Ljava/lang/String;)I", false),
        load(ISTORE, LEN),
        // pos = colon + 1 + len; text = blob.substring(colon + 1, pos)
        load(ILOAD, COLON),
        Insn::Push(1),
        Insn::Op(IADD),
        load(ILOAD, LEN),
        Insn::Op(IADD),
        load(ISTORE, POS),
        load(ALOAD, BLOB),
        load(ILOAD, COLON),
        Insn::Push(1),
        Insn::Op(IADD),
        load(ILOAD, POS),
        invoke(INVOKEVIRTUAL, string, "substring", "(II)Ljava/lang/String;", false),
        load(ASTORE, TEXT),
    ];

    // values[i] = decoded element; each arm stores its own boxed value
    type Arm = (char, &'static [(&'static str, &'static str, &'static str, bool)]);
    let arms: [Arm; 8] = [
        ('Z', &[("java/lang/Boolean", "parseBoolean", "(Ljava/lang/String;)Z", false), ("java/lang/Boolean", "valueOf", "(Z)Ljava/lang/Boolean;", false)]),
        ('B', &[("java/lang/Byte", "parseByte", "(Ljava/lang/String;)B", false), ("java/lang/Byte", "valueOf", "(B)Ljava/lang/Byte;", false)]),
        ('S', &[("java/lang/Short", "parseShort", "(Ljava/lang/String;)S", false), ("java/lang/Short", "valueOf", "(S)Ljava/lang/Short;", false)]),
        ('I', &[("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I", false), ("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;", false)]),
        ('J', &[("java/lang/Long", "parseLong", "(Ljava/lang/String;)J", false), ("java/lang/Long", "valueOf", "(J)Ljava/lang/Long;", false)]),
        ('C', &[("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I", true), ("java/lang/Character", "valueOf", "(C)Ljava/lang/Character;", false)]),
        ('F', &[("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I", false), ("java/lang/Float", "intBitsToFloat", "(I)F", false), ("java/lang/Float", "valueOf", "(F)Ljava/lang/Float;", false)]),
        ('D', &[("java/lang/Long", "parseLong", "(Ljava/lang/String;)J", false), ("java/lang/Double", "longBitsToDouble", "(J)D", false), ("java/lang/Double", "valueOf", "(D)Ljava/lang/Double;", false)]),
    ];
    let arm_labels: Vec<Label> = arms.iter().map(|_| label()).collect();
    c.push(load(ALOAD, VALUES));
    c.push(load(ILOAD, INDEX));
    c.push(load(ILOAD, TAG));
    c.push(Insn::Switch {
        default: text_arm,
        cases: arms.iter().zip(&arm_labels).map(|((tag, _), l)| (*tag as i32, *l)).collect(),
    });
    for ((_, calls), l) in arms.iter().zip(&arm_labels) {
        c.push(Insn::Label(*l));
        c.push(load(ALOAD, TEXT));
        for (owner, name, desc, to_char) in calls.iter() {
            c.push(invoke(INVOKESTATIC, owner, name, desc, false));
            if *to_char {
                c.push(Insn::Op(I2C));
            }
        }
        c.push(Insn::Op(AASTORE));
        c.push(Insn::Jump { op: GOTO, target: next_elem });
    }
    c.extend([
        Insn::Label(text_arm),
        load(ALOAD, TEXT),
        Insn::Op(AASTORE),
        Insn::Label(next_elem),
        Insn::Iinc { slot: INDEX, delta: 1 },
        Insn::Jump { op: GOTO, target: top },
        Insn::Label(done),
        load(ILOAD, KIND),
        Insn::Jump { op: IFNE, target: not_list },
        load(ALOAD, VALUES),
        invoke(INVOKESTATIC, "java/util/List", "of", "([Ljava/lang/Object;)Ljava/util/List;", true),
        Insn::Op(ARETURN),
        Insn::Label(not_list),
        load(ILOAD, KIND),
        Insn::Push(KIND_SET),
        Insn::Jump { op: IF_ICMPNE, target: map },
        load(ALOAD, VALUES),
        invoke(INVOKESTATIC, "java/util/Set", "of", "([Ljava/lang/Object;)Ljava/util/Set;", true),
        Insn::Op(ARETURN),
        Insn::Label(map),
        load(ILOAD, COUNT),
        Insn::Push(2),
        Insn::Op(IDIV),
        Insn::Type { op: ANEWARRAY, class: "java/util/Map$Entry".to_string() },
        load(ASTORE, ENTRIES),
        Insn::Push(0),
        load(ISTORE, INDEX),
        Insn::Label(map_top),
        load(ILOAD, INDEX),
        load(ALOAD, ENTRIES),
        Insn::Op(ARRAYLENGTH),
        Insn::Jump { op: IF_ICMPGE, target: map_done },
        load(ALOAD, ENTRIES),
        load(ILOAD, INDEX),
        load(ALOAD, VALUES),
        load(ILOAD, INDEX),
        Insn::Push(2),
        Insn::Op(IMUL),
        Insn::Op(AALOAD),
        load(ALOAD, VALUES),
        load(ILOAD, INDEX),
        Insn::Push(2),
        Insn::Op(IMUL),
        Insn::Push(1),
        Insn::Op(IADD),
        Insn::Op(AALOAD),
        invoke(
            INVOKESTATIC,
            "java/util/Map",
            "entry",
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/util/Map$Entry;",
            true,
        ),
        Insn::Op(AASTORE),
        Insn::Iinc { slot: INDEX, delta: 1 },
        Insn::Jump { op: GOTO, target: map_top },
        Insn::Label(map_done),
        load(ALOAD, ENTRIES),
        invoke(INVOKESTATIC, "java/util/Map", "ofEntries", "([Ljava/util/Map$Entry;)Ljava/util/Map;", true),
        Insn::Op(ARETURN),
    ]);
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(n: i32) -> Constant {
        Constant::List((0..n).map(Constant::Int).collect())
    }

    #[test]
    fn test_element_encoding() {
        let list = Constant::List(vec![
            Constant::Int(-12),
            Constant::String("a:b".to_string()),
            Constant::Boolean(true),
            Constant::Char('x' as u16),
            Constant::Long(7),
        ]);
        let (blob, count, kind) = encode(&list).unwrap();
        assert_eq!(blob, "I3:-12T3:a:bZ4:trueC3:120J1:7");
        assert_eq!((count, kind), (5, KIND_LIST));
    }

    #[test]
    fn test_float_bits_and_utf16_lengths() {
        let set = Constant::Set(vec![Constant::Float(1.5), Constant::String("\u{1F600}".to_string())]);
        let (blob, _, kind) = encode(&set).unwrap();
        let bits = (1.5f32.to_bits() as i32).to_string();
        assert_eq!(blob, format!("F{}:{bits}T2:\u{1F600}", bits.len()));
        assert_eq!(kind, KIND_SET);
    }

    #[test]
    fn test_map_entries_flattened() {
        let map = Constant::Map(vec![(Constant::String("k".to_string()), Constant::Double(0.0))]);
        let (blob, count, kind) = encode(&map).unwrap();
        assert_eq!(blob, "T1:kD1:0");
        assert_eq!((count, kind), (2, KIND_MAP));
    }

    #[test]
    fn test_pool_dedupes_and_rejects_nested() {
        let mut pool = ResourcePool::default();
        assert_eq!(pool.intern(&ints(20)).unwrap(), "$rc$0");
        assert_eq!(pool.intern(&ints(21)).unwrap(), "$rc$1");
        assert_eq!(pool.intern(&ints(20)).unwrap(), "$rc$0");
        let nested = Constant::List(vec![ints(2)]);
        assert!(pool.intern(&nested).is_err());
        let fields = pool.fields(true);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].descriptor, "Ljava/util/List;");
        assert_ne!(fields[0].access & ACC_PUBLIC, 0);
    }

    #[test]
    fn test_long_blobs_are_chunked() {
        let big = Constant::List((0..3000).map(|i| Constant::String(format!("value-{i}"))).collect());
        let mut pool = ResourcePool::default();
        pool.intern(&big).unwrap();
        let insns = pool.init_insns("demo/Host", false).unwrap();
        let concats = insns.iter().filter(|i| matches!(i, Insn::Invoke { name, .. } if name == "concat")).count();
        let ldcs = insns.iter().filter(|i| matches!(i, Insn::Ldc(LdcConst::String(_)))).count();
        assert!(ldcs > 1);
        assert_eq!(concats, ldcs - 1);
        assert!(matches!(insns.last(), Some(Insn::Field { op: PUTSTATIC, .. })));
    }

    #[test]
    fn test_decoder_ends_in_returns() {
        let decoder = ResourcePool::default().decoder();
        let code = decoder.code.unwrap();
        assert_eq!(code.insns.iter().filter(|i| **i == Insn::Op(ARETURN)).count(), 3);
        assert!(matches!(code.insns.last(), Some(Insn::Op(ARETURN))));
    }
}
