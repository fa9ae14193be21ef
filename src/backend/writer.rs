//! Default backend producing class file bytes

use super::analyzer::{Analyzer, Handler, VType};
use super::annotations::{self, LocalTargetRange};
use super::assembler::{self, Assembled};
use super::classfile::{access_flags, Attribute, ClassFile, ClassfileWritable, MemberInfo, ByteBuf};
use super::constpool::ConstantPool;
use super::error::{BackendError, BackendResult};
use super::frame::{self, FrameAt};
use super::insn::LdcConst;
use super::opcodes;
use super::{ClassBackend, ClassRequest, CodeRequest, FieldRequest, MethodRequest};
use crate::model::annotation::{Annotation, AnnotationSet, Retention};
use crate::signature::{TypeAnnotation, TypeTarget};
use crate::types::{parse_method_descriptor, TypeRegistry, OBJECT, THROWABLE};

/// Writes class files with computed frames, `max_stack` and `max_locals`
#[derive(Debug, Default, Clone)]
pub struct ClassFileBackend;

impl ClassFileBackend {
    pub fn new() -> Self {
        Self
    }
}

fn attribute(cp: &mut ConstantPool, name: &str, info: Vec<u8>) -> BackendResult<Attribute> {
    Ok(Attribute { name_index: cp.add_utf8(name)?, info })
}

fn u2_attribute(cp: &mut ConstantPool, name: &str, value: u16) -> BackendResult<Attribute> {
    attribute(cp, name, value.to_be_bytes().to_vec())
}

fn count(what: &'static str, n: usize) -> BackendResult<u16> {
    u16::try_from(n).map_err(|_| BackendError::TooMany { what, count: n })
}

/// Declaration annotations, visible and invisible
fn push_annotation_attributes(set: &AnnotationSet, cp: &mut ConstantPool, out: &mut Vec<Attribute>) -> BackendResult<()> {
    if !set.visible.is_empty() {
        let info = annotations::annotations_payload(&set.visible, cp)?;
        out.push(attribute(cp, "RuntimeVisibleAnnotations", info)?);
    }
    if !set.invisible.is_empty() {
        let info = annotations::annotations_payload(&set.invisible, cp)?;
        out.push(attribute(cp, "RuntimeInvisibleAnnotations", info)?);
    }
    Ok(())
}

fn push_type_annotation_attributes(
    list: &[(&TypeAnnotation, Vec<LocalTargetRange>)],
    cp: &mut ConstantPool,
    out: &mut Vec<Attribute>,
) -> BackendResult<()> {
    for (retention, name) in [
        (Retention::Runtime, "RuntimeVisibleTypeAnnotations"),
        (Retention::Class, "RuntimeInvisibleTypeAnnotations"),
    ] {
        let selected: Vec<_> = list.iter().filter(|(t, _)| t.annotation.retention == retention).cloned().collect();
        if !selected.is_empty() {
            let info = annotations::type_annotations_payload(&selected, cp)?;
            out.push(attribute(cp, name, info)?);
        }
    }
    Ok(())
}

fn push_parameter_annotations(params: &[AnnotationSet], cp: &mut ConstantPool, out: &mut Vec<Attribute>) -> BackendResult<()> {
    let visible: Vec<&[Annotation]> = params.iter().map(|p| p.visible.as_slice()).collect();
    if visible.iter().any(|v| !v.is_empty()) {
        let info = annotations::parameter_annotations_payload(&visible, cp)?;
        out.push(attribute(cp, "RuntimeVisibleParameterAnnotations", info)?);
    }
    let invisible: Vec<&[Annotation]> = params.iter().map(|p| p.invisible.as_slice()).collect();
    if invisible.iter().any(|v| !v.is_empty()) {
        let info = annotations::parameter_annotations_payload(&invisible, cp)?;
        out.push(attribute(cp, "RuntimeInvisibleParameterAnnotations", info)?);
    }
    Ok(())
}

fn without_ranges(list: &[TypeAnnotation]) -> Vec<(&TypeAnnotation, Vec<LocalTargetRange>)> {
    list.iter().map(|t| (t, Vec::new())).collect()
}

impl ClassFileBackend {
    fn field(&self, f: &FieldRequest, cp: &mut ConstantPool) -> BackendResult<MemberInfo> {
        let mut attributes = Vec::new();
        if let Some(value) = &f.constant_value {
            let index = match value {
                LdcConst::Int(v) => cp.add_integer(*v)?,
                LdcConst::Float(v) => cp.add_float(*v)?,
                LdcConst::Long(v) => cp.add_long(*v)?,
                LdcConst::Double(v) => cp.add_double(*v)?,
                LdcConst::String(s) => cp.add_string(s)?,
                LdcConst::Class(c) => cp.add_class(c)?,
            };
            attributes.push(u2_attribute(cp, "ConstantValue", index)?);
        }
        if let Some(sig) = &f.signature {
            let index = cp.add_utf8(sig)?;
            attributes.push(u2_attribute(cp, "Signature", index)?);
        }
        push_annotation_attributes(&f.annotations, cp, &mut attributes)?;
        push_type_annotation_attributes(&without_ranges(&f.type_annotations), cp, &mut attributes)?;
        Ok(MemberInfo {
            access_flags: f.access,
            name_index: cp.add_utf8(&f.name)?,
            descriptor_index: cp.add_utf8(&f.descriptor)?,
            attributes,
        })
    }

    fn method(&self, class: &ClassRequest, m: &MethodRequest, cp: &mut ConstantPool, types: &TypeRegistry) -> BackendResult<MemberInfo> {
        let mut attributes = Vec::new();
        if let Some(code) = &m.code {
            attributes.push(self.code(class, m, code, cp, types)?);
        }
        if !m.exceptions.is_empty() {
            let mut buf = ByteBuf::new();
            buf.u2(count("exceptions", m.exceptions.len())?);
            for e in &m.exceptions {
                buf.u2(cp.add_class(e)?);
            }
            attributes.push(attribute(cp, "Exceptions", buf.bytes)?);
        }
        if let Some(sig) = &m.signature {
            let index = cp.add_utf8(sig)?;
            attributes.push(u2_attribute(cp, "Signature", index)?);
        }
        push_annotation_attributes(&m.annotations, cp, &mut attributes)?;
        push_parameter_annotations(&m.parameter_annotations, cp, &mut attributes)?;
        push_type_annotation_attributes(&without_ranges(&m.type_annotations), cp, &mut attributes)?;
        Ok(MemberInfo {
            access_flags: m.access,
            name_index: cp.add_utf8(&m.name)?,
            descriptor_index: cp.add_utf8(&m.descriptor)?,
            attributes,
        })
    }

    /// Verifier types of `this` and the parameters
    fn initial_locals(&self, class: &ClassRequest, m: &MethodRequest) -> BackendResult<Vec<VType>> {
        let (params, _) = parse_method_descriptor(&m.descriptor)
            .ok_or_else(|| BackendError::MalformedDescriptor { descriptor: m.descriptor.clone() })?;
        let mut locals = Vec::new();
        if m.access & access_flags::ACC_STATIC == 0 {
            locals.push(if m.name == "<init>" && class.name != OBJECT {
                VType::UninitThis
            } else {
                VType::Object(class.name.clone())
            });
        }
        for p in &params {
            let v = VType::of_type(p);
            let wide = v.is_wide();
            locals.push(v);
            if wide {
                locals.push(VType::Top);
            }
        }
        Ok(locals)
    }

    fn code(
        &self,
        class: &ClassRequest,
        m: &MethodRequest,
        code: &CodeRequest,
        cp: &mut ConstantPool,
        types: &TypeRegistry,
    ) -> BackendResult<Attribute> {
        let method_name = format!("{}.{}{}", class.name, m.name, m.descriptor);
        let asm = assembler::assemble(&code.insns, cp, &method_name)?;
        let initial = self.initial_locals(class, m)?;
        let handlers = code
            .handlers
            .iter()
            .map(|h| {
                Ok(Handler {
                    start: asm.label_index(h.start)?,
                    end: asm.label_index(h.end)?,
                    handler: asm.label_index(h.handler)?,
                    catch_type: h.catch_type.clone(),
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let analysis = Analyzer::new(&code.insns, &asm, types, &class.name, &method_name).analyze(initial.clone(), &handlers)?;

        let mut bytes = asm.code.clone();
        let dead_ranges: Vec<(u32, u32)> =
            analysis.dead.iter().map(|(s, e)| (asm.offsets[*s], asm.offsets[*e])).collect();
        for (start, end) in &dead_ranges {
            let (start, end) = (*start as usize, *end as usize);
            bytes[start..end].fill(opcodes::NOP);
            bytes[end - 1] = opcodes::ATHROW;
        }
        if !dead_ranges.is_empty() {
            log::debug!("{method_name}: patched {} unreachable code ranges", dead_ranges.len());
        }

        let mut buf = ByteBuf::new();
        let max_locals = code
            .locals
            .iter()
            .map(|l| l.slot + if matches!(l.descriptor.as_str(), "J" | "D") { 2 } else { 1 })
            .fold(analysis.max_locals, u16::max);
        buf.u2(analysis.max_stack).u2(max_locals).u4(bytes.len() as u32).raw(&bytes);

        let mut table = ByteBuf::new();
        let mut entries = 0usize;
        for (h, req) in handlers.iter().zip(&code.handlers) {
            let entry = (h.handler..code.insns.len()).find(|&i| code.insns[i].is_real());
            if entry.and_then(|i| analysis.states[i].as_ref()).is_none() {
                continue;
            }
            let catch = match &req.catch_type {
                Some(c) => cp.add_class(c)?,
                None => 0,
            };
            let handler_pc = asm.offsets[h.handler] as u16;
            for (start, end) in subtract(asm.offsets[h.start], asm.offsets[h.end], &dead_ranges) {
                table.u2(start as u16).u2(end as u16).u2(handler_pc).u2(catch);
                entries += 1;
            }
        }
        buf.u2(count("exception table entries", entries)?).raw(&table.bytes);

        let mut attributes = Vec::new();
        if class.emit_frames {
            let mut frames: Vec<FrameAt> = analysis
                .frame_points
                .iter()
                .filter_map(|&i| analysis.states.get(i).cloned().flatten().map(|s| (i, s)))
                .map(|(i, s)| FrameAt { offset: asm.offsets[i], locals: s.locals, stack: s.stack })
                .collect();
            frames.extend(dead_ranges.iter().map(|(start, _)| FrameAt {
                offset: *start,
                locals: Vec::new(),
                stack: vec![VType::Object(THROWABLE.to_string())],
            }));
            frames.sort_by_key(|f| f.offset);
            frames.dedup_by_key(|f| f.offset);
            if !frames.is_empty() {
                let compressed = frame::compress_frames(&initial, &frames, cp)?;
                log::debug!("{method_name}: {} stack map frames", compressed.len());
                attributes.push(attribute(cp, "StackMapTable", frame::encode_table(&compressed))?);
            }
        }
        if !asm.lines.is_empty() {
            let mut lines = ByteBuf::new();
            lines.u2(count("line numbers", asm.lines.len())?);
            for (pc, line) in &asm.lines {
                lines.u2(*pc).u2(*line);
            }
            attributes.push(attribute(cp, "LineNumberTable", lines.bytes)?);
        }
        self.local_variable_tables(code, &asm, cp, &mut attributes)?;

        let resolved = code
            .type_annotations
            .iter()
            .map(|t| Ok((t, resolve_ranges(t, &asm)?)))
            .collect::<BackendResult<Vec<_>>>()?;
        let resolved: Vec<_> = resolved
            .into_iter()
            .filter(|(t, r)| !matches!(t.target, TypeTarget::LocalVariable(_)) || !r.is_empty())
            .collect();
        push_type_annotation_attributes(&resolved, cp, &mut attributes)?;

        buf.u2(count("code attributes", attributes.len())?);
        for a in &attributes {
            buf.u2(a.name_index).u4(a.info.len() as u32).raw(&a.info);
        }
        attribute(cp, "Code", buf.bytes)
    }

    fn local_variable_tables(
        &self,
        code: &CodeRequest,
        asm: &Assembled,
        cp: &mut ConstantPool,
        attributes: &mut Vec<Attribute>,
    ) -> BackendResult<()> {
        let mut lvt = ByteBuf::new();
        let mut lvtt = ByteBuf::new();
        let (mut n, mut nt) = (0usize, 0usize);
        for l in &code.locals {
            let start = asm.label_offset(l.start)?;
            let end = asm.label_offset(l.end)?;
            if end <= start {
                continue;
            }
            let (start, length) = (start as u16, (end - start) as u16);
            lvt.u2(start).u2(length).u2(cp.add_utf8(&l.name)?).u2(cp.add_utf8(&l.descriptor)?).u2(l.slot);
            n += 1;
            if let Some(sig) = &l.signature {
                lvtt.u2(start).u2(length).u2(cp.add_utf8(&l.name)?).u2(cp.add_utf8(sig)?).u2(l.slot);
                nt += 1;
            }
        }
        if n > 0 {
            let mut info = count("local variables", n)?.to_be_bytes().to_vec();
            info.extend_from_slice(&lvt.bytes);
            attributes.push(attribute(cp, "LocalVariableTable", info)?);
        }
        if nt > 0 {
            let mut info = count("local variable types", nt)?.to_be_bytes().to_vec();
            info.extend_from_slice(&lvtt.bytes);
            attributes.push(attribute(cp, "LocalVariableTypeTable", info)?);
        }
        Ok(())
    }
}

fn resolve_ranges(t: &TypeAnnotation, asm: &Assembled) -> BackendResult<Vec<LocalTargetRange>> {
    let TypeTarget::LocalVariable(ranges) = &t.target else { return Ok(Vec::new()) };
    let mut out = Vec::new();
    for r in ranges {
        let start = asm.label_offset(r.start)?;
        let end = asm.label_offset(r.end)?;
        if end > start {
            out.push(LocalTargetRange { start_pc: start as u16, length: (end - start) as u16, index: r.slot });
        }
    }
    Ok(out)
}

/// `[start, end)` minus the given (sorted, disjoint) ranges
fn subtract(start: u32, end: u32, holes: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut cur = start;
    for &(hs, he) in holes {
        if he <= cur || hs >= end {
            continue;
        }
        if hs > cur {
            out.push((cur, hs));
        }
        cur = cur.max(he);
    }
    if cur < end {
        out.push((cur, end));
    }
    out
}

impl ClassBackend for ClassFileBackend {
    fn assemble(&mut self, class: &ClassRequest, types: &TypeRegistry) -> BackendResult<Vec<u8>> {
        let mut cp = ConstantPool::new();
        let this_class = cp.add_class(&class.name)?;
        let super_class = match &class.super_name {
            Some(s) => cp.add_class(s)?,
            None => 0,
        };
        let interfaces = class.interfaces.iter().map(|i| cp.add_class(i)).collect::<BackendResult<Vec<_>>>()?;
        count("interfaces", interfaces.len())?;
        let fields = class.fields.iter().map(|f| self.field(f, &mut cp)).collect::<BackendResult<Vec<_>>>()?;
        count("fields", fields.len())?;
        let methods =
            class.methods.iter().map(|m| self.method(class, m, &mut cp, types)).collect::<BackendResult<Vec<_>>>()?;
        count("methods", methods.len())?;

        let mut attributes = Vec::new();
        if let Some(source) = &class.source_file {
            let index = cp.add_utf8(source)?;
            attributes.push(u2_attribute(&mut cp, "SourceFile", index)?);
        }
        if let Some(sig) = &class.signature {
            let index = cp.add_utf8(sig)?;
            attributes.push(u2_attribute(&mut cp, "Signature", index)?);
        }
        if !class.inner_classes.is_empty() {
            let mut buf = ByteBuf::new();
            buf.u2(count("inner classes", class.inner_classes.len())?);
            for e in &class.inner_classes {
                let inner = cp.add_class(&e.inner)?;
                let outer = match &e.outer {
                    Some(o) => cp.add_class(o)?,
                    None => 0,
                };
                let name = match &e.simple_name {
                    Some(n) => cp.add_utf8(n)?,
                    None => 0,
                };
                buf.u2(inner).u2(outer).u2(name).u2(e.access);
            }
            attributes.push(attribute(&mut cp, "InnerClasses", buf.bytes)?);
        }
        if let Some(em) = &class.enclosing_method {
            let class_index = cp.add_class(&em.class)?;
            let method_index = match &em.method {
                Some((name, desc)) => cp.add_name_and_type(name, desc)?,
                None => 0,
            };
            let mut buf = ByteBuf::new();
            buf.u2(class_index).u2(method_index);
            attributes.push(attribute(&mut cp, "EnclosingMethod", buf.bytes)?);
        }
        if let Some(host) = &class.nest_host {
            let index = cp.add_class(host)?;
            attributes.push(u2_attribute(&mut cp, "NestHost", index)?);
        }
        if !class.nest_members.is_empty() {
            let mut buf = ByteBuf::new();
            buf.u2(count("nest members", class.nest_members.len())?);
            for m in &class.nest_members {
                buf.u2(cp.add_class(m)?);
            }
            attributes.push(attribute(&mut cp, "NestMembers", buf.bytes)?);
        }
        push_annotation_attributes(&class.annotations, &mut cp, &mut attributes)?;
        push_type_annotation_attributes(&without_ranges(&class.type_annotations), &mut cp, &mut attributes)?;

        let file = ClassFile {
            minor_version: 0,
            major_version: class.version,
            constant_pool: cp,
            access_flags: class.access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        log::debug!(
            "assembled {} ({} fields, {} methods, {} pool entries)",
            class.name,
            file.fields.len(),
            file.methods.len(),
            file.constant_pool.count()
        );
        file.to_classfile_bytes().map_err(|e| BackendError::Serialize { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::insn::{Insn, Label};
    use crate::backend::HandlerRequest;

    #[test]
    fn test_subtract_ranges() {
        assert_eq!(subtract(0, 10, &[]), vec![(0, 10)]);
        assert_eq!(subtract(0, 10, &[(3, 5)]), vec![(0, 3), (5, 10)]);
        assert_eq!(subtract(4, 8, &[(0, 5), (7, 20)]), vec![(5, 7)]);
        assert!(subtract(4, 8, &[(0, 20)]).is_empty());
    }

    fn simple_class(code: CodeRequest) -> ClassRequest {
        ClassRequest {
            version: 55,
            access: access_flags::ACC_PUBLIC | access_flags::ACC_SUPER,
            name: "T".into(),
            super_name: Some(OBJECT.into()),
            emit_frames: true,
            methods: vec![MethodRequest {
                access: access_flags::ACC_PUBLIC | access_flags::ACC_STATIC,
                name: "m".into(),
                descriptor: "()V".into(),
                code: Some(code),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_dead_code_gets_patched() {
        let code = CodeRequest {
            insns: vec![Insn::Op(opcodes::RETURN), Insn::Push(1), Insn::Op(opcodes::POP), Insn::Op(opcodes::RETURN)],
            ..Default::default()
        };
        let bytes = ClassFileBackend::new().assemble(&simple_class(code), &TypeRegistry::new()).unwrap();
        let patched = [opcodes::RETURN, opcodes::NOP, opcodes::NOP, opcodes::ATHROW];
        assert!(bytes.windows(4).any(|w| w == patched));
    }

    #[test]
    fn test_unresolved_handler_label() {
        let code = CodeRequest {
            insns: vec![Insn::Label(Label(0)), Insn::Op(opcodes::RETURN), Insn::Label(Label(1))],
            handlers: vec![HandlerRequest { start: Label(0), end: Label(1), handler: Label(5), catch_type: None }],
            ..Default::default()
        };
        let err = ClassFileBackend::new().assemble(&simple_class(code), &TypeRegistry::new()).unwrap_err();
        assert_eq!(err, BackendError::UnresolvedLabel { label: 5 });
    }
}
