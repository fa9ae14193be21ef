//! Encoding of annotation attributes

use super::classfile::ByteBuf;
use super::constpool::ConstantPool;
use super::error::BackendResult;
use crate::model::annotation::{Annotation, AnnotationValue};
use crate::signature::{TypeAnnotation, TypeTarget};
use crate::types::Type;

/// Resolved `localvar_target` table entry
#[derive(Debug, Clone, Copy)]
pub struct LocalTargetRange {
    pub start_pc: u16,
    pub length: u16,
    pub index: u16,
}

pub fn write_annotation(a: &Annotation, cp: &mut ConstantPool, buf: &mut ByteBuf) -> BackendResult<()> {
    buf.u2(cp.add_utf8(&a.descriptor())?);
    buf.u2(a.values.len() as u16);
    for (name, value) in &a.values {
        buf.u2(cp.add_utf8(name)?);
        write_value(value, cp, buf)?;
    }
    Ok(())
}

fn write_value(v: &AnnotationValue, cp: &mut ConstantPool, buf: &mut ByteBuf) -> BackendResult<()> {
    match v {
        AnnotationValue::Boolean(b) => {
            buf.u1(b'Z').u2(cp.add_integer(i32::from(*b))?);
        }
        AnnotationValue::Byte(b) => {
            buf.u1(b'B').u2(cp.add_integer(i32::from(*b))?);
        }
        AnnotationValue::Char(c) => {
            buf.u1(b'C').u2(cp.add_integer(i32::from(*c))?);
        }
        AnnotationValue::Short(s) => {
            buf.u1(b'S').u2(cp.add_integer(i32::from(*s))?);
        }
        AnnotationValue::Int(i) => {
            buf.u1(b'I').u2(cp.add_integer(*i)?);
        }
        AnnotationValue::Long(l) => {
            buf.u1(b'J').u2(cp.add_long(*l)?);
        }
        AnnotationValue::Float(f) => {
            buf.u1(b'F').u2(cp.add_float(*f)?);
        }
        AnnotationValue::Double(d) => {
            buf.u1(b'D').u2(cp.add_double(*d)?);
        }
        AnnotationValue::String(s) => {
            buf.u1(b's').u2(cp.add_utf8(s)?);
        }
        AnnotationValue::Enum { type_name, constant } => {
            buf.u1(b'e').u2(cp.add_utf8(&Type::Class(type_name.clone()).descriptor())?).u2(cp.add_utf8(constant)?);
        }
        AnnotationValue::Class(ty) => {
            buf.u1(b'c').u2(cp.add_utf8(&ty.descriptor())?);
        }
        AnnotationValue::Annotation(a) => {
            buf.u1(b'@');
            write_annotation(a, cp, buf)?;
        }
        AnnotationValue::Array(items) => {
            buf.u1(b'[').u2(items.len() as u16);
            for item in items {
                write_value(item, cp, buf)?;
            }
        }
    }
    Ok(())
}

/// `Runtime(In)VisibleAnnotations` payload
pub fn annotations_payload(list: &[Annotation], cp: &mut ConstantPool) -> BackendResult<Vec<u8>> {
    let mut buf = ByteBuf::new();
    buf.u2(list.len() as u16);
    for a in list {
        write_annotation(a, cp, &mut buf)?;
    }
    Ok(buf.bytes)
}

/// `Runtime(In)VisibleParameterAnnotations` payload
pub fn parameter_annotations_payload(params: &[&[Annotation]], cp: &mut ConstantPool) -> BackendResult<Vec<u8>> {
    let mut buf = ByteBuf::new();
    buf.u1(params.len() as u8);
    for list in params {
        buf.u2(list.len() as u16);
        for a in *list {
            write_annotation(a, cp, &mut buf)?;
        }
    }
    Ok(buf.bytes)
}

/// `Runtime(In)VisibleTypeAnnotations` payload; `locals` supplies the
/// resolved code ranges of local-variable targets, in order
pub fn type_annotations_payload(
    list: &[(&TypeAnnotation, Vec<LocalTargetRange>)],
    cp: &mut ConstantPool,
) -> BackendResult<Vec<u8>> {
    let mut buf = ByteBuf::new();
    buf.u2(list.len() as u16);
    for (ta, ranges) in list {
        buf.u1(ta.target.target_type());
        match &ta.target {
            TypeTarget::ClassTypeParameter(i) | TypeTarget::MethodTypeParameter(i) | TypeTarget::FormalParameter(i) => {
                buf.u1(*i);
            }
            TypeTarget::Supertype(i) | TypeTarget::Throws(i) => {
                buf.u2(*i);
            }
            TypeTarget::ClassTypeParameterBound { param, bound } | TypeTarget::MethodTypeParameterBound { param, bound } => {
                buf.u1(*param).u1(*bound);
            }
            TypeTarget::Field | TypeTarget::Return | TypeTarget::Receiver => {}
            TypeTarget::LocalVariable(_) => {
                buf.u2(ranges.len() as u16);
                for r in ranges {
                    buf.u2(r.start_pc).u2(r.length).u2(r.index);
                }
            }
        }
        buf.u1(ta.path.len() as u8);
        for step in &ta.path {
            let (kind, index) = step.encode();
            buf.u1(kind).u1(index);
        }
        write_annotation(&ta.annotation, cp, &mut buf)?;
    }
    Ok(buf.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::annotation::Retention;
    use crate::signature::PathStep;

    #[test]
    fn test_element_values() {
        let mut cp = ConstantPool::new();
        let a = Annotation::new("p/Ann")
            .retention(Retention::Runtime)
            .value("n", 5)
            .value("kind", AnnotationValue::enum_constant("p/Kind", "A"))
            .value("tags", vec![AnnotationValue::from("x")]);
        let bytes = annotations_payload(&[a], &mut cp).unwrap();
        // count, type, pair count
        assert_eq!(&bytes[0..2], &[0, 1]);
        assert_eq!(&bytes[4..6], &[0, 3]);
        assert_eq!(bytes[8], b'I');
        assert!(bytes.contains(&b'e'));
        assert!(bytes.contains(&b'['));
    }

    #[test]
    fn test_type_annotation_layout() {
        let mut cp = ConstantPool::new();
        let ta = TypeAnnotation {
            target: TypeTarget::FormalParameter(2),
            path: vec![PathStep::TypeArgument(1)],
            annotation: Annotation::new("p/N"),
        };
        let bytes = type_annotations_payload(&[(&ta, vec![])], &mut cp).unwrap();
        assert_eq!(&bytes[0..6], &[0, 1, 0x16, 2, 1, 3]);
        assert_eq!(bytes[6], 1);
    }
}
