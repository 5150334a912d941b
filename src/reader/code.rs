use super::annotations::{TypeAnnotation, TypeAnnotationTarget};
use super::frames::{implicit_locals, FrameTable};
use super::{ClassReader, Context, ReaderOptions};
use crate::access_flags::MethodAccessFlags;
use crate::constants::TypeReference;
use crate::errors::Error;
use crate::label::{Label, LabelGenerator};
use crate::opcodes::{
    insn_kind, opposite_jump, InsnKind, ASM_IFNULL, ASM_IFNULL_OPCODE_DELTA, ASM_OPCODE_DELTA,
    GOTO, GOTO_W, IINC, ILOAD, ILOAD_0, INVOKEVIRTUAL, ISTORE, ISTORE_0, JSR, NEW,
    WIDE_JUMP_OPCODE_DELTA,
};
use crate::stack_map::{StackMapFrame, VerificationType};
use crate::symbol_table::{CONSTANT_INTERFACE_METHODREF_TAG, CONSTANT_INVOKE_DYNAMIC_TAG};
use crate::visitor::{LocalVariableRange, MethodVisitor};

/// The parts of a method header needed to decode its body
pub(super) struct MethodInfo<'r> {
    pub(super) access: MethodAccessFlags,
    pub(super) name: &'r str,
    pub(super) descriptor: &'r str,
}

#[derive(Clone)]
struct LabelSlot {
    label: Label,

    /// Line numbers starting at this offset
    lines: Vec<u16>,
}

/// Labels of a method body, by bytecode offset
///
/// Offsets range up to and including the code length, since the end of the last instruction
/// can be referenced by exception handlers and debug information.
pub(super) struct CodeLabels {
    generator: LabelGenerator,
    slots: Vec<Option<LabelSlot>>,
}

impl CodeLabels {
    pub(super) fn new(code_length: usize) -> CodeLabels {
        CodeLabels {
            generator: LabelGenerator::new(),
            slots: vec![None; code_length + 1],
        }
    }

    /// Label at `target`, created if needed, for a reference found at bytecode offset `at`
    fn slot_mut(&mut self, target: i64, at: usize, debug: bool) -> Result<&mut LabelSlot, Error> {
        if target < 0 || target as usize >= self.slots.len() {
            return Err(Error::InvalidBranchTarget { target, offset: at });
        }
        let generator = &mut self.generator;
        Ok(self.slots[target as usize].get_or_insert_with(|| {
            let label = if debug {
                generator.fresh_debug_label()
            } else {
                generator.fresh_label()
            };
            LabelSlot {
                label,
                lines: vec![],
            }
        }))
    }

    /// Label used by control flow (jumps, switches, exception handlers, frames)
    pub(super) fn code_label(&mut self, target: i64, at: usize) -> Result<Label, Error> {
        let slot = self.slot_mut(target, at, false)?;
        slot.label = slot.label.for_code();
        Ok(slot.label)
    }

    /// Label used only by debug information, unless control flow also needs it
    fn debug_label(&mut self, target: i64, at: usize) -> Result<Label, Error> {
        Ok(self.slot_mut(target, at, true)?.label)
    }

    fn add_line_number(&mut self, target: usize, line: u16) -> Result<(), Error> {
        self.slot_mut(target as i64, target, true)?.lines.push(line);
        Ok(())
    }

    fn slot(&self, offset: usize) -> Option<&LabelSlot> {
        self.slots.get(offset).and_then(Option::as_ref)
    }
}

impl<'a> ClassReader<'a> {
    /// Visit the content of the `Code` attribute at `offset`
    pub(super) fn read_code(
        &self,
        method: &mut (dyn MethodVisitor + '_),
        context: &Context<'_>,
        info: &MethodInfo<'_>,
        offset: usize,
    ) -> Result<(), Error> {
        let max_stack = self.read_u16(offset)?;
        let max_locals = self.read_u16(offset + 2)?;
        let code_length = self.read_u32(offset + 4)? as usize;
        let code_start = offset + 8;
        self.slice(code_start, code_length)?;
        let code_end = code_start + code_length;

        let mut labels = CodeLabels::new(code_length);
        self.find_jump_targets(code_start, code_length, &mut labels)?;

        let exception_count = self.read_u16(code_end)?;
        let mut current = code_end + 2;
        for _ in 0..exception_count {
            let start = self.read_u16(current)? as i64;
            let end = self.read_u16(current + 2)? as i64;
            let handler = self.read_u16(current + 4)? as i64;
            method.visit_try_catch_block(
                labels.code_label(start, start as usize)?,
                labels.code_label(end, start as usize)?,
                labels.code_label(handler, start as usize)?,
                self.read_optional_class(current + 6)?,
            )?;
            current += 8;
        }

        let skip_debug = context.skip_debug();
        let skip_frames = context.options.contains(ReaderOptions::SKIP_FRAMES);
        let (attributes, _) = self.attributes(current)?;
        let mut local_variables = None;
        let mut local_variable_types = None;
        let mut frame_table = None;
        let mut type_annotations: Vec<(TypeAnnotation<'_>, bool)> = vec![];
        let mut custom = vec![];
        for (attribute, offset, length) in attributes {
            match attribute {
                "LocalVariableTable" => {
                    if !skip_debug {
                        local_variables = Some(offset);
                        let count = self.read_u16(offset)? as usize;
                        for i in 0..count {
                            let entry = offset + 2 + 10 * i;
                            let start = self.read_u16(entry)? as i64;
                            let length = self.read_u16(entry + 2)? as i64;
                            labels.debug_label(start, start as usize)?;
                            labels.debug_label(start + length, start as usize)?;
                        }
                    }
                }
                "LocalVariableTypeTable" => {
                    if !skip_debug {
                        local_variable_types = Some(offset);
                    }
                }
                "LineNumberTable" => {
                    if !skip_debug {
                        let count = self.read_u16(offset)? as usize;
                        for i in 0..count {
                            let entry = offset + 2 + 4 * i;
                            let start = self.read_u16(entry)? as usize;
                            labels.add_line_number(start, self.read_u16(entry + 2)?)?;
                        }
                    }
                }
                "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                    let visible = attribute == "RuntimeVisibleTypeAnnotations";
                    for annotation in self.type_annotations(offset)? {
                        if annotation.type_ref.sort() == TypeReference::EXCEPTION_PARAMETER {
                            let mut visitor = method.visit_try_catch_annotation(
                                annotation.type_ref,
                                annotation.type_path.as_ref(),
                                annotation.descriptor,
                                visible,
                            );
                            self.read_element_values(visitor.as_deref_mut(), annotation.values, true)?;
                            continue;
                        }
                        if let TypeAnnotationTarget::LocalVariable(ranges) = &annotation.target {
                            for &(start, length, _) in ranges {
                                let start = start as i64;
                                labels.code_label(start, start as usize)?;
                                labels.code_label(start + length as i64, start as usize)?;
                            }
                        }
                        type_annotations.push((annotation, visible));
                    }
                }
                "StackMapTable" | "StackMap" => {
                    if !skip_frames {
                        frame_table = Some(FrameTable {
                            offset,
                            length,
                            compressed: attribute == "StackMapTable",
                        });
                    }
                }
                _ => custom.push(self.read_attribute(
                    context,
                    attribute,
                    offset,
                    length,
                    Some(code_start),
                )?),
            }
        }
        type_annotations.sort_by_key(|(_, visible)| !visible);

        let expand_frames = context.options.contains(ReaderOptions::EXPAND_FRAMES);
        let expand_asm = context.options.contains(ReaderOptions::EXPAND_ASM_INSNS);
        let implicit = if expand_frames && (frame_table.is_some() || expand_asm) {
            implicit_locals(context.class_name, info.access, info.name, info.descriptor)?
        } else {
            vec![]
        };
        let frames = match &frame_table {
            Some(table) => {
                self.find_uninitialized_labels(table, code_start, code_length, &mut labels)?;
                self.read_frames(table, expand_frames, implicit.clone(), &mut labels)?
            }
            None => vec![],
        };

        if expand_frames && expand_asm {
            // Inserted frames are computed starting from this one
            let mut locals = implicit;
            let mut width: usize = locals.iter().map(VerificationType::width).sum();
            while width < max_locals as usize {
                locals.push(VerificationType::Top);
                width += 1;
            }
            method.visit_frame(&StackMapFrame::New {
                locals,
                stack: vec![],
            })?;
        }

        let mut next_frame = 0;
        let mut insert_frame = false;
        let mut pc = 0;
        while pc < code_length {
            if let Some(slot) = labels.slot(pc) {
                method.visit_label(slot.label)?;
                for &line in &slot.lines {
                    method.visit_line_number(line, slot.label)?;
                }
            }

            while let Some((frame_offset, frame)) = frames.get(next_frame) {
                if *frame_offset > pc {
                    break;
                }
                if *frame_offset < pc {
                    log::warn!(
                        "dropping stack map frame at offset {} of {}.{}{}: not an instruction",
                        frame_offset,
                        context.class_name,
                        info.name,
                        info.descriptor
                    );
                } else {
                    method.visit_frame(frame)?;
                    insert_frame = false;
                }
                next_frame += 1;
            }

            if insert_frame && expand_frames {
                method.visit_frame(&StackMapFrame::Insert)?;
            }

            let (size, needs_frame) =
                self.read_instruction(method, &mut labels, code_start, pc, expand_asm)?;
            insert_frame = needs_frame;

            for (annotation, visible) in &type_annotations {
                if let TypeAnnotationTarget::Instruction(offset) = annotation.target {
                    if offset as usize == pc {
                        let mut visitor = method.visit_insn_annotation(
                            annotation.type_ref,
                            annotation.type_path.as_ref(),
                            annotation.descriptor,
                            *visible,
                        );
                        self.read_element_values(visitor.as_deref_mut(), annotation.values, true)?;
                    }
                }
            }
            pc += size;
        }
        for (frame_offset, _) in frames.iter().skip(next_frame) {
            log::warn!(
                "dropping stack map frame at offset {} of {}.{}{}: past the last instruction",
                frame_offset,
                context.class_name,
                info.name,
                info.descriptor
            );
        }

        if let Some(slot) = labels.slot(code_length) {
            method.visit_label(slot.label)?;
        }

        if let Some(offset) = local_variables {
            self.read_local_variables(method, offset, local_variable_types, &mut labels)?;
        }

        for (annotation, visible) in &type_annotations {
            if let TypeAnnotationTarget::LocalVariable(ranges) = &annotation.target {
                let ranges = ranges
                    .iter()
                    .map(|&(start, length, index)| {
                        let start = start as i64;
                        Ok(LocalVariableRange {
                            start: labels.code_label(start, start as usize)?,
                            end: labels.code_label(start + length as i64, start as usize)?,
                            index,
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                let mut visitor = method.visit_local_variable_annotation(
                    annotation.type_ref,
                    annotation.type_path.as_ref(),
                    &ranges,
                    annotation.descriptor,
                    *visible,
                );
                self.read_element_values(visitor.as_deref_mut(), annotation.values, true)?;
            }
        }

        for attribute in custom {
            method.visit_attribute(attribute)?;
        }
        method.visit_maxs(max_stack, max_locals)
    }

    /// Create labels for every jump and switch target
    fn find_jump_targets(
        &self,
        code_start: usize,
        code_length: usize,
        labels: &mut CodeLabels,
    ) -> Result<(), Error> {
        let mut pc = 0;
        while pc < code_length {
            let at = code_start + pc;
            let opcode = self.bytes[at];
            let kind = insn_kind(opcode).ok_or(Error::InvalidOpcode { opcode, offset: pc })?;
            pc += match kind {
                InsnKind::NoArg | InsnKind::ImplicitVar => 1,
                InsnKind::Label => {
                    labels.code_label(pc as i64 + self.read_i16(at + 1)? as i64, pc)?;
                    3
                }
                InsnKind::AsmLabel => {
                    labels.code_label(pc as i64 + self.read_u16(at + 1)? as i64, pc)?;
                    3
                }
                InsnKind::WideLabel | InsnKind::AsmWideLabel => {
                    labels.code_label(pc as i64 + self.read_i32(at + 1)? as i64, pc)?;
                    5
                }
                InsnKind::Wide => {
                    if self.read_u8(at + 1)? == IINC {
                        6
                    } else {
                        4
                    }
                }
                InsnKind::TableSwitch => {
                    let mut current = at + 4 - (pc & 3);
                    labels.code_label(pc as i64 + self.read_i32(current)? as i64, pc)?;
                    let low = self.read_i32(current + 4)? as i64;
                    let high = self.read_i32(current + 8)? as i64;
                    current += 12;
                    for _ in low..=high {
                        labels.code_label(pc as i64 + self.read_i32(current)? as i64, pc)?;
                        current += 4;
                    }
                    current - at
                }
                InsnKind::LookupSwitch => {
                    let mut current = at + 4 - (pc & 3);
                    labels.code_label(pc as i64 + self.read_i32(current)? as i64, pc)?;
                    let pairs = self.read_i32(current + 4)?;
                    current += 8;
                    for _ in 0..pairs {
                        labels.code_label(pc as i64 + self.read_i32(current + 4)? as i64, pc)?;
                        current += 8;
                    }
                    current - at
                }
                InsnKind::Var | InsnKind::SignedByte | InsnKind::Ldc => 2,
                InsnKind::Short
                | InsnKind::WideLdc
                | InsnKind::FieldOrMethod
                | InsnKind::Type
                | InsnKind::Iinc => 3,
                InsnKind::MultiANewArray => 4,
                InsnKind::InterfaceMethod | InsnKind::InvokeDynamic => 5,
            };
        }
        if pc > code_length {
            return Err(Error::UnexpectedEof {
                offset: code_start + code_length,
            });
        }
        Ok(())
    }

    /// Create labels for the `new` instructions referenced by uninitialized frame types
    ///
    /// This looks for byte sequences that could be an `Uninitialized` verification type instead
    /// of decoding the frames, so it may create a few unneeded labels.
    fn find_uninitialized_labels(
        &self,
        table: &FrameTable,
        code_start: usize,
        code_length: usize,
        labels: &mut CodeLabels,
    ) -> Result<(), Error> {
        let content = self.slice(table.offset, table.length)?;
        for i in 2..content.len().saturating_sub(2) {
            if content[i] == 8 {
                let target = self.read_u16(table.offset + i + 1)? as usize;
                if target < code_length && self.bytes[code_start + target] == NEW {
                    labels.code_label(target as i64, target)?;
                }
            }
        }
        Ok(())
    }

    /// Visit the instruction at bytecode offset `pc`
    ///
    /// Returns the instruction size, and whether a frame must be inserted after it (which is
    /// the case after an expanded long forward jump).
    fn read_instruction(
        &self,
        method: &mut (dyn MethodVisitor + '_),
        labels: &mut CodeLabels,
        code_start: usize,
        pc: usize,
        expand_asm: bool,
    ) -> Result<(usize, bool), Error> {
        let at = code_start + pc;
        let opcode = self.bytes[at];
        let kind = insn_kind(opcode).ok_or(Error::InvalidOpcode { opcode, offset: pc })?;
        let target = |labels: &mut CodeLabels, delta: i64| labels.code_label(pc as i64 + delta, pc);

        let size = match kind {
            InsnKind::NoArg => {
                method.visit_insn(opcode)?;
                1
            }
            InsnKind::ImplicitVar => {
                let (base, first) = if opcode >= ISTORE_0 {
                    (ISTORE, ISTORE_0)
                } else {
                    (ILOAD, ILOAD_0)
                };
                let delta = opcode - first;
                method.visit_var_insn(base + (delta >> 2), (delta & 3) as u16)?;
                1
            }
            InsnKind::Label => {
                let label = target(labels, self.read_i16(at + 1)? as i64)?;
                method.visit_jump_insn(opcode, label)?;
                3
            }
            InsnKind::WideLabel => {
                let label = target(labels, self.read_i32(at + 1)? as i64)?;
                let opcode = if expand_asm {
                    opcode
                } else {
                    opcode - WIDE_JUMP_OPCODE_DELTA
                };
                method.visit_jump_insn(opcode, label)?;
                5
            }
            InsnKind::AsmLabel => {
                let label = target(labels, self.read_u16(at + 1)? as i64)?;
                let opcode = if opcode < ASM_IFNULL {
                    opcode - ASM_OPCODE_DELTA
                } else {
                    opcode - ASM_IFNULL_OPCODE_DELTA
                };
                if opcode == GOTO || opcode == JSR {
                    method.visit_jump_insn(opcode + WIDE_JUMP_OPCODE_DELTA, label)?;
                    return Ok((3, false));
                }
                // IFNOT endif; GOTO_W label; endif:
                let endif = target(labels, 3)?;
                method.visit_jump_insn(opposite_jump(opcode), endif)?;
                method.visit_jump_insn(GOTO_W, label)?;
                return Ok((3, true));
            }
            InsnKind::AsmWideLabel => {
                let label = target(labels, self.read_i32(at + 1)? as i64)?;
                method.visit_jump_insn(GOTO_W, label)?;
                return Ok((5, true));
            }
            InsnKind::Wide => {
                let opcode = self.read_u8(at + 1)?;
                if opcode == IINC {
                    method.visit_iinc_insn(self.read_u16(at + 2)?, self.read_i16(at + 4)?)?;
                    6
                } else {
                    method.visit_var_insn(opcode, self.read_u16(at + 2)?)?;
                    4
                }
            }
            InsnKind::TableSwitch => {
                let mut current = at + 4 - (pc & 3);
                let default = target(labels, self.read_i32(current)? as i64)?;
                let low = self.read_i32(current + 4)?;
                let high = self.read_i32(current + 8)?;
                current += 12;
                let mut targets = vec![];
                for _ in low as i64..=high as i64 {
                    targets.push(target(labels, self.read_i32(current)? as i64)?);
                    current += 4;
                }
                method.visit_table_switch_insn(low, high, default, &targets)?;
                current - at
            }
            InsnKind::LookupSwitch => {
                let mut current = at + 4 - (pc & 3);
                let default = target(labels, self.read_i32(current)? as i64)?;
                let pairs = self.read_i32(current + 4)?;
                current += 8;
                let mut keys = vec![];
                let mut targets = vec![];
                for _ in 0..pairs {
                    keys.push(self.read_i32(current)?);
                    targets.push(target(labels, self.read_i32(current + 4)? as i64)?);
                    current += 8;
                }
                method.visit_lookup_switch_insn(default, &keys, &targets)?;
                current - at
            }
            InsnKind::Var => {
                method.visit_var_insn(opcode, self.read_u8(at + 1)? as u16)?;
                2
            }
            InsnKind::SignedByte => {
                method.visit_int_insn(opcode, self.read_i8(at + 1)? as i32)?;
                2
            }
            InsnKind::Short => {
                method.visit_int_insn(opcode, self.read_i16(at + 1)? as i32)?;
                3
            }
            InsnKind::Ldc => {
                method.visit_ldc_insn(&self.read_const(self.read_u8(at + 1)? as u16)?)?;
                2
            }
            InsnKind::WideLdc => {
                method.visit_ldc_insn(&self.read_const(self.read_u16(at + 1)?)?)?;
                3
            }
            InsnKind::FieldOrMethod | InsnKind::InterfaceMethod => {
                let member = self.entry(at + 1)?;
                let owner = self.read_class(member)?;
                let (name, descriptor) = self.read_name_and_type(member + 2)?;
                if opcode < INVOKEVIRTUAL {
                    method.visit_field_insn(opcode, owner, name, descriptor)?;
                } else {
                    let is_interface = self.bytes[member - 1] == CONSTANT_INTERFACE_METHODREF_TAG;
                    method.visit_method_insn(opcode, owner, name, descriptor, is_interface)?;
                }
                if kind == InsnKind::InterfaceMethod {
                    5
                } else {
                    3
                }
            }
            InsnKind::InvokeDynamic => {
                let entry = self.typed_entry(at + 1, CONSTANT_INVOKE_DYNAMIC_TAG)?;
                let (name, descriptor) = self.read_name_and_type(entry + 2)?;
                let (handle, arguments) = self.read_bootstrap_method(self.read_u16(entry)?, entry)?;
                method.visit_invoke_dynamic_insn(name, descriptor, &handle, &arguments)?;
                5
            }
            InsnKind::Type => {
                method.visit_type_insn(opcode, self.read_class(at + 1)?)?;
                3
            }
            InsnKind::Iinc => {
                method.visit_iinc_insn(self.read_u8(at + 1)? as u16, self.read_i8(at + 2)? as i16)?;
                3
            }
            InsnKind::MultiANewArray => {
                method.visit_multi_anew_array_insn(self.read_class(at + 1)?, self.read_u8(at + 3)?)?;
                4
            }
        };
        Ok((size, false))
    }

    /// Visit a `LocalVariableTable`, taking signatures from the `LocalVariableTypeTable`
    fn read_local_variables(
        &self,
        method: &mut (dyn MethodVisitor + '_),
        offset: usize,
        types: Option<usize>,
        labels: &mut CodeLabels,
    ) -> Result<(), Error> {
        // (start_pc, index, signature)
        let mut signatures = vec![];
        if let Some(types) = types {
            let count = self.read_u16(types)? as usize;
            for i in 0..count {
                let entry = types + 2 + 10 * i;
                signatures.push((
                    self.read_u16(entry)?,
                    self.read_u16(entry + 8)?,
                    self.read_utf8(entry + 6)?,
                ));
            }
        }

        let count = self.read_u16(offset)? as usize;
        for i in 0..count {
            let entry = offset + 2 + 10 * i;
            let start_pc = self.read_u16(entry)?;
            let length = self.read_u16(entry + 2)?;
            let index = self.read_u16(entry + 8)?;
            let signature = signatures
                .iter()
                .find(|(start, slot, _)| *start == start_pc && *slot == index)
                .map(|(_, _, signature)| *signature);
            let start = start_pc as i64;
            method.visit_local_variable(
                self.read_utf8(entry + 4)?,
                self.read_utf8(entry + 6)?,
                signature,
                labels.debug_label(start, start as usize)?,
                labels.debug_label(start + length as i64, start as usize)?,
                index,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod code_tests {
    use super::*;

    #[test]
    fn code_labels_upgrade_to_control_flow() {
        let mut labels = CodeLabels::new(10);
        let debug = labels.debug_label(4, 0).unwrap();
        assert!(debug.is_debug_only());
        let code = labels.code_label(4, 0).unwrap();
        assert_eq!(debug, code);
        assert!(!code.is_debug_only());
        assert!(!labels.debug_label(4, 0).unwrap().is_debug_only());
    }

    #[test]
    fn code_labels_are_bounded() {
        let mut labels = CodeLabels::new(10);
        assert!(labels.code_label(10, 0).is_ok());
        assert!(matches!(
            labels.code_label(11, 3),
            Err(Error::InvalidBranchTarget { target: 11, offset: 3 })
        ));
        assert!(labels.code_label(-1, 0).is_err());
        assert!(labels.slot(5).is_none());
    }

    #[test]
    fn line_numbers_share_labels() {
        let mut labels = CodeLabels::new(4);
        labels.add_line_number(2, 10).unwrap();
        labels.add_line_number(2, 11).unwrap();
        let slot = labels.slot(2).unwrap();
        assert_eq!(slot.lines, vec![10, 11]);
        assert!(slot.label.is_debug_only());
    }
}
