//! Method writer
//!
//! Instructions are encoded as they are visited. Depending on [`Compute`], the writer also
//! builds a control flow graph of basic blocks along the way, from which it computes the
//! maximum stack size, the number of locals, and (optionally) all stack map frames once
//! `visit_maxs` is reached.
//!
//! Jumps whose offset is not known yet are written as forward references, and patched once
//! their label is visited. A forward jump that turns out not to fit in a signed 16-bit offset
//! is turned into one of the internal opcodes of [`crate::opcodes`], which makes the class
//! writer re-read and re-write the whole class once with those expanded.

use super::annotation::{AnnotationWriter, AnnotationSet, Annotations, ParameterAnnotations};
use super::basic_block::{pair_mut, BasicBlock, Edge, EdgeKind, Handler, NodeId};
use super::AttributeList;
use crate::access_flags::{class_file_access, MethodAccessFlags, ParameterAccessFlags};
use crate::attribute::Attribute;
use crate::byte_vector::ByteVector;
use crate::class_hierarchy::ClassHierarchy;
use crate::constants::{ConstantValue, Handle, TypePath, TypeReference};
use crate::descriptors::{arguments_and_return_sizes, MethodDescriptor};
use crate::errors::Error;
use crate::frame::{from_verification_type, put_abstract_type, AbstractType, Frame, Operand};
use crate::label::Label;
use crate::opcodes::*;
use crate::stack_map::{StackMapFrame, VerificationType};
use crate::symbol_table::SymbolTable;
use crate::visitor::{AnnotationVisitor, LocalVariableRange, MethodVisitor};
use std::collections::HashMap;

const THROWABLE: &str = "java/lang/Throwable";

/// What the method writer computes by itself
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Compute {
    /// Frames and maximums are copied from the visitor calls
    Nothing,

    /// Maximum stack size and number of locals are computed, frames are copied
    MaxStackAndLocal,

    /// Frames and maximums are all computed, and visited frames are ignored
    AllFrames,

    /// Visited frames are copied, but `Insert` frames are computed from the preceding ones
    InsertedFrames,
}

/// Contents of a `Code` attribute
#[derive(Debug, Default)]
pub(crate) struct Code {
    bytes: ByteVector,
    max_stack: u16,
    max_locals: u16,
    handlers: Vec<Handler>,
    stack_map: ByteVector,
    stack_map_count: u16,
    line_numbers: ByteVector,
    line_number_count: u16,
    local_variables: ByteVector,
    local_variable_count: u16,
    local_variable_types: ByteVector,
    local_variable_type_count: u16,
    visible_type_annotations: AnnotationSet,
    invisible_type_annotations: AnnotationSet,
    attributes: Vec<Box<dyn Attribute>>,
}

impl Code {
    fn put(&self, symbols: &mut SymbolTable) -> Result<ByteVector, Error> {
        let mut body = ByteVector::with_capacity(12 + self.bytes.len() + 8 * self.handlers.len());
        body.put_u16(self.max_stack)
            .put_u16(self.max_locals)
            .put_u32(self.bytes.len() as u32)
            .put_bytes(self.bytes.as_slice())
            .put_u16(self.handlers.len() as u16);
        for handler in &self.handlers {
            body.put_u16(handler.start as u16)
                .put_u16(handler.end as u16)
                .put_u16(handler.handler as u16)
                .put_u16(handler.catch_type);
        }

        let mut attributes = AttributeList::new();
        if self.stack_map_count > 0 {
            let name = if symbols.version().has_stack_map_table() {
                "StackMapTable"
            } else {
                "StackMap"
            };
            put_table(symbols, &mut attributes, name, self.stack_map_count, &self.stack_map);
        }
        if self.line_number_count > 0 {
            put_table(
                symbols,
                &mut attributes,
                "LineNumberTable",
                self.line_number_count,
                &self.line_numbers,
            );
        }
        if self.local_variable_count > 0 {
            put_table(
                symbols,
                &mut attributes,
                "LocalVariableTable",
                self.local_variable_count,
                &self.local_variables,
            );
        }
        if self.local_variable_type_count > 0 {
            put_table(
                symbols,
                &mut attributes,
                "LocalVariableTypeTable",
                self.local_variable_type_count,
                &self.local_variable_types,
            );
        }
        self.visible_type_annotations
            .put(symbols, "RuntimeVisibleTypeAnnotations", &mut attributes);
        self.invisible_type_annotations
            .put(symbols, "RuntimeInvisibleTypeAnnotations", &mut attributes);
        for attribute in &self.attributes {
            attributes.put_custom(symbols, attribute.as_ref())?;
        }
        attributes.write_to(&mut body);
        Ok(body)
    }
}

/// Attribute made of a `u16` entry count followed by the entries
fn put_table(
    symbols: &mut SymbolTable,
    attributes: &mut AttributeList,
    name: &str,
    count: u16,
    entries: &ByteVector,
) {
    let mut body = ByteVector::with_capacity(2 + entries.len());
    body.put_u16(count).put_bytes(entries.as_slice());
    attributes.put(symbols, name, &body);
}

/// Everything recorded about a method, with strings already interned
#[derive(Debug)]
pub(crate) struct MethodData {
    access: MethodAccessFlags,
    name: u16,
    descriptor: u16,
    pub(crate) name_value: String,
    pub(crate) descriptor_value: String,
    signature: Option<u16>,
    exceptions: Vec<u16>,
    parameters: ByteVector,
    parameter_count: u8,
    annotation_default: Option<ByteVector>,
    annotations: Annotations,
    visible_parameter_annotations: Option<ParameterAnnotations>,
    invisible_parameter_annotations: Option<ParameterAnnotations>,
    attributes: Vec<Box<dyn Attribute>>,
    has_code: bool,
    code: Code,

    /// Whether the code contains internal opcodes that need a second pass to be expanded
    pub(crate) has_asm_instructions: bool,
}

impl MethodData {
    pub(crate) fn new(
        symbols: &mut SymbolTable,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> MethodData {
        MethodData {
            access,
            name: symbols.add_utf8(name),
            descriptor: symbols.add_utf8(descriptor),
            name_value: name.to_string(),
            descriptor_value: descriptor.to_string(),
            signature: signature.map(|signature| symbols.add_utf8(signature)),
            exceptions: exceptions
                .iter()
                .map(|exception| symbols.add_class(exception))
                .collect(),
            parameters: ByteVector::new(),
            parameter_count: 0,
            annotation_default: None,
            annotations: Annotations::default(),
            visible_parameter_annotations: None,
            invisible_parameter_annotations: None,
            attributes: vec![],
            has_code: false,
            code: Code::default(),
            has_asm_instructions: false,
        }
    }

    pub(crate) fn code_length(&self) -> usize {
        self.code.bytes.len()
    }

    pub(crate) fn has_frames(&self) -> bool {
        self.code.stack_map_count > 0
    }

    /// Write the `method_info` structure
    pub(crate) fn put(&self, symbols: &mut SymbolTable, output: &mut ByteVector) -> Result<(), Error> {
        let use_synthetic_attribute = !symbols.version().has_synthetic_flag();
        output
            .put_u16(class_file_access(self.access.bits(), use_synthetic_attribute))
            .put_u16(self.name)
            .put_u16(self.descriptor);

        let mut attributes = AttributeList::new();
        if self.has_code {
            let body = self.code.put(symbols)?;
            attributes.put(symbols, "Code", &body);
        }
        if !self.exceptions.is_empty() {
            let mut body = ByteVector::with_capacity(2 + 2 * self.exceptions.len());
            body.put_u16(self.exceptions.len() as u16);
            for exception in &self.exceptions {
                body.put_u16(*exception);
            }
            attributes.put(symbols, "Exceptions", &body);
        }
        if use_synthetic_attribute && self.access.contains(MethodAccessFlags::SYNTHETIC) {
            attributes.put_empty(symbols, "Synthetic");
        }
        if let Some(signature) = self.signature {
            attributes.put_u16(symbols, "Signature", signature);
        }
        if self.access.contains(MethodAccessFlags::DEPRECATED) {
            attributes.put_empty(symbols, "Deprecated");
        }
        self.annotations.put(symbols, &mut attributes);
        if let Some(parameters) = &self.visible_parameter_annotations {
            parameters.put(symbols, "RuntimeVisibleParameterAnnotations", &mut attributes);
        }
        if let Some(parameters) = &self.invisible_parameter_annotations {
            parameters.put(symbols, "RuntimeInvisibleParameterAnnotations", &mut attributes);
        }
        if let Some(default) = &self.annotation_default {
            attributes.put(symbols, "AnnotationDefault", default);
        }
        if self.parameter_count > 0 {
            let mut body = ByteVector::with_capacity(1 + self.parameters.len());
            body.put_u8(self.parameter_count)
                .put_bytes(self.parameters.as_slice());
            attributes.put(symbols, "MethodParameters", &body);
        }
        for attribute in &self.attributes {
            attributes.put_custom(symbols, attribute.as_ref())?;
        }
        attributes.write_to(output);
        Ok(())
    }
}

/// Jump or switch offset written before its label was visited
#[derive(Copy, Clone, Debug)]
struct ForwardReference {
    /// Offset of the instruction the jump is relative to
    source: u32,

    /// Where the placeholder offset was written
    position: usize,
    wide: bool,
}

#[derive(Debug, Default)]
struct LabelInfo {
    offset: Option<u32>,
    node: Option<NodeId>,
    forward_references: Vec<ForwardReference>,
}

#[derive(Debug)]
struct TryCatchBlock {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: u16,
    catch_type_name: Option<String>,
}

#[derive(Debug)]
struct LocalVariable {
    name: u16,
    descriptor: u16,
    signature: Option<u16>,
    start: Label,
    end: Label,
    index: u16,
}

/// Last frame written to the stack map, in compressed form
#[derive(Debug)]
struct FrameRecord {
    offset: u32,
    locals: Vec<AbstractType>,
    stack: Vec<AbstractType>,
}

pub(crate) struct MethodWriter<'a> {
    symbols: &'a mut SymbolTable,
    hierarchy: &'a dyn ClassHierarchy,
    method: &'a mut MethodData,
    compute: Compute,
    is_static: bool,
    is_constructor: bool,

    labels: HashMap<Label, LabelInfo>,
    blocks: Vec<BasicBlock>,

    /// Visited blocks, in bytecode order (aliases excluded)
    block_order: Vec<NodeId>,
    first_block: Option<NodeId>,

    /// Block receiving the instructions (`None` right after an unconditional jump)
    current_block: Option<NodeId>,
    last_block: Option<NodeId>,

    /// Stack size relative to the start of the current block (max stack computation only)
    relative_stack_size: i32,
    max_relative_stack_size: i32,
    max_locals: u32,

    /// Frame tracking the instructions since the last visited frame (inserted frames only)
    running_frame: Option<Frame>,
    previous_frame: Option<FrameRecord>,
    last_frame_offset: Option<u32>,

    last_bytecode_offset: u32,

    /// Class instantiated by each `NEW`, by bytecode offset
    new_types: HashMap<u32, String>,

    try_catch_blocks: Vec<TryCatchBlock>,
    line_numbers: Vec<(u16, Label)>,
    local_variables: Vec<LocalVariable>,

    /// Error detected in a call that could not report it (nested visitor factories)
    pending_error: Option<Error>,
}

impl<'a> MethodWriter<'a> {
    pub(crate) fn new(
        symbols: &'a mut SymbolTable,
        hierarchy: &'a dyn ClassHierarchy,
        method: &'a mut MethodData,
        compute: Compute,
    ) -> MethodWriter<'a> {
        let is_static = method.access.contains(MethodAccessFlags::STATIC);
        let is_constructor = method.name_value == "<init>";
        let mut pending_error = None;
        let max_locals = match arguments_and_return_sizes(&method.descriptor_value) {
            Ok((arguments, _)) if is_static => arguments as u32 - 1,
            Ok((arguments, _)) => arguments as u32,
            Err(error) => {
                pending_error = Some(error);
                0
            }
        };
        MethodWriter {
            symbols,
            hierarchy,
            method,
            compute,
            is_static,
            is_constructor,
            labels: HashMap::new(),
            blocks: vec![],
            block_order: vec![],
            first_block: None,
            current_block: None,
            last_block: None,
            relative_stack_size: 0,
            max_relative_stack_size: 0,
            max_locals: if compute == Compute::Nothing { 0 } else { max_locals },
            running_frame: None,
            previous_frame: None,
            last_frame_offset: None,
            last_bytecode_offset: 0,
            new_types: HashMap::new(),
            try_catch_blocks: vec![],
            line_numbers: vec![],
            local_variables: vec![],
            pending_error,
        }
    }

    fn code_length(&self) -> u32 {
        self.method.code.bytes.len() as u32
    }

    fn new_block(&mut self) -> NodeId {
        self.blocks.push(BasicBlock::default());
        self.blocks.len() - 1
    }

    /// Follow aliases down to the block that actually holds the instructions
    fn canonical(&self, mut node: NodeId) -> NodeId {
        while let Some(target) = self.blocks[node].canonical {
            node = target;
        }
        node
    }

    /// Block starting at a label, created on first use
    fn node_of(&mut self, label: Label) -> NodeId {
        if let Some(node) = self.labels.get(&label).and_then(|info| info.node) {
            return node;
        }
        let node = self.new_block();
        self.labels.entry(label).or_default().node = Some(node);
        node
    }

    /// Block targeted by a jump
    fn jump_target(&mut self, label: Label) -> Result<NodeId, Error> {
        match self.labels.get(&label) {
            Some(LabelInfo {
                offset: Some(offset),
                node: None,
                ..
            }) => Err(Error::InvalidFrame(format!(
                "jump to {:?} (bytecode offset {}), which was visited as a debug only label",
                label, offset
            ))),
            _ => Ok(self.node_of(label)),
        }
    }

    fn label_offset(&self, label: Label) -> Result<u32, Error> {
        self.labels
            .get(&label)
            .and_then(|info| info.offset)
            .ok_or(Error::UnresolvedLabel(label))
    }

    /// Fix the offset of a label, and patch all the forward references to it
    fn resolve(&mut self, label: Label) {
        let offset = self.code_length();
        let info = self.labels.entry(label).or_default();
        if info.offset.is_some() {
            log::warn!("label {:?} visited twice, keeping its first offset", label);
            return;
        }
        info.offset = Some(offset);
        let code = &mut self.method.code.bytes;
        for reference in info.forward_references.drain(..) {
            let relative = offset as i64 - reference.source as i64;
            if reference.wide {
                code.set_u32(reference.position, relative as u32);
                continue;
            }
            if relative > i16::MAX as i64 {
                let source = reference.source as usize;
                let opcode = code.get_u8(source);
                let expanded = if opcode < IFNULL {
                    opcode + ASM_OPCODE_DELTA
                } else {
                    opcode + ASM_IFNULL_OPCODE_DELTA
                };
                code.set_u8(source, expanded);
                self.method.has_asm_instructions = true;
            }
            code.set_u16(reference.position, relative as u16);
        }
    }

    /// Write the offset of `label` relative to `source`, or a placeholder to patch later
    fn put_label_reference(&mut self, label: Label, source: u32, wide: bool) {
        let position = self.method.code.bytes.len();
        let code = &mut self.method.code.bytes;
        match self.labels.get(&label).and_then(|info| info.offset) {
            Some(offset) => {
                let relative = offset as i64 - source as i64;
                if wide {
                    code.put_i32(relative as i32);
                } else {
                    code.put_i16(relative as i16);
                }
            }
            None => {
                self.labels
                    .entry(label)
                    .or_default()
                    .forward_references
                    .push(ForwardReference {
                        source,
                        position,
                        wide,
                    });
                if wide {
                    code.put_i32(-1);
                } else {
                    code.put_i16(-1);
                }
            }
        }
    }

    fn add_successor(&mut self, successor: NodeId, kind: EdgeKind) {
        if let Some(current) = self.current_block {
            self.blocks[current].edges.push(Edge { successor, kind });
        }
    }

    /// Make `node` an alias of `target`, which starts at the same offset
    fn alias(&mut self, node: NodeId, target: NodeId) {
        if node != target {
            let jump_target = self.blocks[node].jump_target;
            self.blocks[target].jump_target |= jump_target;
            self.blocks[node].canonical = Some(target);
        }
    }

    fn mark_jump_target(&mut self, node: NodeId) {
        let canonical = self.canonical(node);
        self.blocks[canonical].jump_target = true;
    }

    /// Start a basic block at the current offset
    fn visit_block(&mut self, node: NodeId) {
        let offset = self.code_length();
        self.blocks[node].offset = Some(offset);
        match self.compute {
            Compute::AllFrames => {
                if let Some(current) = self.current_block {
                    if self.blocks[current].offset == Some(offset) {
                        self.alias(node, current);
                        return;
                    }
                    self.add_successor(node, EdgeKind::Jump(0));
                }
                if let Some(last) = self.last_block {
                    if self.blocks[last].offset == Some(offset) {
                        self.alias(node, last);
                        self.current_block = Some(last);
                        return;
                    }
                }
                self.block_order.push(node);
                self.last_block = Some(node);
                self.current_block = Some(node);
            }
            Compute::MaxStackAndLocal => {
                if let Some(current) = self.current_block {
                    self.blocks[current].output_stack_max = self.max_relative_stack_size;
                    self.add_successor(node, EdgeKind::Jump(self.relative_stack_size));
                }
                self.block_order.push(node);
                self.last_block = Some(node);
                self.current_block = Some(node);
                self.relative_stack_size = 0;
                self.max_relative_stack_size = 0;
            }
            Compute::Nothing | Compute::InsertedFrames => {}
        }
    }

    /// End the current block after an instruction that never falls through
    fn end_block_with_no_successor(&mut self) {
        match self.compute {
            Compute::AllFrames => {
                if self.current_block.take().is_some() {
                    // Placeholder for the (possibly dead) code that follows
                    let node = self.new_block();
                    self.blocks[node].offset = Some(self.code_length());
                    self.block_order.push(node);
                    self.last_block = Some(node);
                }
            }
            Compute::MaxStackAndLocal => {
                if let Some(current) = self.current_block.take() {
                    self.blocks[current].output_stack_max = self.max_relative_stack_size;
                }
            }
            Compute::Nothing | Compute::InsertedFrames => {}
        }
    }

    /// Simulate an instruction with whatever the compute mode tracks
    fn execute(&mut self, opcode: u8, operand: Operand<'_>, stack_delta: i32) -> Result<(), Error> {
        match self.compute {
            Compute::AllFrames => {
                if let Some(current) = self.current_block {
                    self.blocks[current]
                        .frame
                        .execute(opcode, operand, self.symbols)?;
                }
            }
            Compute::InsertedFrames => {
                if let Some(frame) = &mut self.running_frame {
                    frame.execute(opcode, operand, self.symbols)?;
                    frame.advance(self.symbols, self.hierarchy)?;
                }
            }
            Compute::MaxStackAndLocal => {
                if self.current_block.is_some() {
                    self.relative_stack_size += stack_delta;
                    self.max_relative_stack_size =
                        self.max_relative_stack_size.max(self.relative_stack_size);
                }
            }
            Compute::Nothing => {}
        }
        Ok(())
    }

    fn track_local(&mut self, end: u32) {
        if self.compute != Compute::Nothing && end > self.max_locals {
            self.max_locals = end;
        }
    }

    /// Shared tail of `TABLESWITCH` and `LOOKUPSWITCH`
    fn visit_switch(&mut self, default: Label, labels: &[Label]) -> Result<(), Error> {
        match self.compute {
            Compute::AllFrames => {
                if let Some(current) = self.current_block {
                    self.blocks[current]
                        .frame
                        .execute(LOOKUPSWITCH, Operand::None, self.symbols)?;
                    for label in std::iter::once(&default).chain(labels) {
                        let target = self.jump_target(*label)?;
                        self.mark_jump_target(target);
                        self.add_successor(target, EdgeKind::Jump(0));
                    }
                }
            }
            Compute::MaxStackAndLocal => {
                if self.current_block.is_some() {
                    self.relative_stack_size -= 1;
                    for label in std::iter::once(&default).chain(labels) {
                        let target = self.jump_target(*label)?;
                        self.add_successor(target, EdgeKind::Jump(self.relative_stack_size));
                    }
                }
            }
            Compute::InsertedFrames => self.execute(LOOKUPSWITCH, Operand::None, -1)?,
            Compute::Nothing => {}
        }
        self.end_block_with_no_successor();
        Ok(())
    }

    fn put_switch_padding(&mut self) {
        let code = &mut self.method.code.bytes;
        let padding = (4 - code.len() % 4) % 4;
        for _ in 0..padding {
            code.put_u8(0);
        }
    }

    /// Convert frame types, resolving the offsets of uninitialized types
    fn abstract_types(&mut self, types: &[VerificationType]) -> Result<Vec<AbstractType>, Error> {
        let labels = &self.labels;
        let new_types = &self.new_types;
        let mut converted = Vec::with_capacity(types.len());
        for typ in types {
            let typ = from_verification_type(self.symbols, typ, |label| {
                let offset = labels
                    .get(&label)
                    .and_then(|info| info.offset)
                    .ok_or_else(|| {
                        Error::InvalidFrame(format!(
                            "uninitialized type created at {:?}, which is not visited yet",
                            label
                        ))
                    })?;
                let name = new_types.get(&offset).cloned().unwrap_or_default();
                Ok((offset, name))
            })?;
            converted.push(typ);
        }
        Ok(converted)
    }

    /// Implicit frame at the start of the method
    fn implicit_frame(&mut self, max_locals: usize) -> Result<Frame, Error> {
        let mut frame = Frame::new();
        frame.set_input_frame_from_descriptor(
            self.symbols,
            self.is_static,
            self.is_constructor,
            &self.method.descriptor_value,
            max_locals,
        )?;
        Ok(frame)
    }

    fn set_previous_frame(&mut self, frame: &Frame) {
        let (locals, stack) = frame.compressed_input();
        self.previous_frame = Some(FrameRecord {
            offset: 0,
            locals,
            stack,
        });
    }

    /// Append a frame to the stack map, compressed relative to the previous one
    fn put_frame(&mut self, frame: FrameRecord) -> Result<(), Error> {
        let symbols = &mut *self.symbols;
        let stack_map = &mut self.method.code.stack_map;
        if !symbols.version().has_stack_map_table() {
            stack_map
                .put_u16(frame.offset as u16)
                .put_u16(frame.locals.len() as u16);
            for local in &frame.locals {
                put_abstract_type(symbols, *local, stack_map)?;
            }
            stack_map.put_u16(frame.stack.len() as u16);
            for typ in &frame.stack {
                put_abstract_type(symbols, *typ, stack_map)?;
            }
        } else {
            let offset_delta = match self.last_frame_offset {
                None => frame.offset as i64,
                Some(last) => frame.offset as i64 - last as i64 - 1,
            };
            if offset_delta < 0 {
                return Err(Error::InvalidFrame(format!(
                    "frame at bytecode offset {} does not follow the previous frame",
                    frame.offset
                )));
            }
            let offset_delta = offset_delta as u16;
            let previous_locals = self
                .previous_frame
                .as_ref()
                .map_or(&[][..], |previous| &previous.locals[..]);
            let local_delta = frame.locals.len() as i64 - previous_locals.len() as i64;
            let same_prefix = previous_locals
                .iter()
                .zip(&frame.locals)
                .all(|(previous, local)| previous == local);

            match (frame.stack.len(), local_delta) {
                (0, 0) if same_prefix => {
                    if offset_delta < 64 {
                        stack_map.put_u8(offset_delta as u8);
                    } else {
                        stack_map.put_u8(251).put_u16(offset_delta);
                    }
                }
                (1, 0) if same_prefix => {
                    if offset_delta < 64 {
                        stack_map.put_u8(64 + offset_delta as u8);
                    } else {
                        stack_map.put_u8(247).put_u16(offset_delta);
                    }
                    put_abstract_type(symbols, frame.stack[0], stack_map)?;
                }
                (0, -3..=-1) if same_prefix => {
                    stack_map
                        .put_u8((251 + local_delta) as u8)
                        .put_u16(offset_delta);
                }
                (0, 1..=3) if same_prefix => {
                    stack_map
                        .put_u8((251 + local_delta) as u8)
                        .put_u16(offset_delta);
                    for local in &frame.locals[previous_locals.len()..] {
                        put_abstract_type(symbols, *local, stack_map)?;
                    }
                }
                _ => {
                    stack_map
                        .put_u8(255)
                        .put_u16(offset_delta)
                        .put_u16(frame.locals.len() as u16);
                    for local in &frame.locals {
                        put_abstract_type(symbols, *local, stack_map)?;
                    }
                    stack_map.put_u16(frame.stack.len() as u16);
                    for typ in &frame.stack {
                        put_abstract_type(symbols, *typ, stack_map)?;
                    }
                }
            }
        }
        self.method.code.stack_map_count += 1;
        self.last_frame_offset = Some(frame.offset);
        self.previous_frame = Some(frame);
        Ok(())
    }

    fn put_verification_type(&mut self, typ: &VerificationType) -> Result<(), Error> {
        let stack_map = &mut self.method.code.stack_map;
        match typ {
            VerificationType::Top => stack_map.put_u8(0),
            VerificationType::Integer => stack_map.put_u8(1),
            VerificationType::Float => stack_map.put_u8(2),
            VerificationType::Double => stack_map.put_u8(3),
            VerificationType::Long => stack_map.put_u8(4),
            VerificationType::Null => stack_map.put_u8(5),
            VerificationType::UninitializedThis => stack_map.put_u8(6),
            VerificationType::Object(class) => {
                let class = self.symbols.add_class(class);
                stack_map.put_12(7, class)
            }
            VerificationType::Uninitialized(label) => {
                let offset = self
                    .labels
                    .get(label)
                    .and_then(|info| info.offset)
                    .ok_or_else(|| {
                        Error::InvalidFrame(format!(
                            "uninitialized type created at {:?}, which is not visited yet",
                            label
                        ))
                    })?;
                stack_map.put_12(8, offset as u16)
            }
        };
        Ok(())
    }

    /// Copy a frame that is already in compressed form
    fn put_compressed_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        if !self.symbols.version().has_stack_map_table() {
            return Err(Error::InvalidFrame(String::from(
                "compressed frames need class files of version 50 or above",
            )));
        }
        let offset = self.code_length();
        let offset_delta = match self.last_frame_offset {
            None => offset as i64,
            Some(last) => offset as i64 - last as i64 - 1,
        };
        if offset_delta < 0 {
            return Err(Error::InvalidFrame(format!(
                "frame at bytecode offset {} does not follow the previous frame",
                offset
            )));
        }
        let offset_delta = offset_delta as u16;
        let stack_map = &mut self.method.code.stack_map;
        match frame {
            StackMapFrame::Same => {
                if offset_delta < 64 {
                    stack_map.put_u8(offset_delta as u8);
                } else {
                    stack_map.put_u8(251).put_u16(offset_delta);
                }
            }
            StackMapFrame::Same1 { stack } => {
                if offset_delta < 64 {
                    stack_map.put_u8(64 + offset_delta as u8);
                } else {
                    stack_map.put_u8(247).put_u16(offset_delta);
                }
                self.put_verification_type(stack)?;
            }
            StackMapFrame::Chop { count } => {
                stack_map.put_u8(251 - count).put_u16(offset_delta);
            }
            StackMapFrame::Append { locals } => {
                stack_map
                    .put_u8(251 + locals.len() as u8)
                    .put_u16(offset_delta);
                for local in locals {
                    self.put_verification_type(local)?;
                }
            }
            StackMapFrame::Full { locals, stack } => {
                stack_map
                    .put_u8(255)
                    .put_u16(offset_delta)
                    .put_u16(locals.len() as u16);
                for local in locals {
                    self.put_verification_type(local)?;
                }
                self.method.code.stack_map.put_u16(stack.len() as u16);
                for typ in stack {
                    self.put_verification_type(typ)?;
                }
            }
            StackMapFrame::New { .. } | StackMapFrame::Insert => {
                return Err(Error::InvalidFrame(String::from(
                    "expected a compressed frame",
                )))
            }
        }
        self.method.code.stack_map_count += 1;
        self.last_frame_offset = Some(offset);
        Ok(())
    }

    /// Frames when only inserted frames are computed
    fn visit_frame_with_inserted(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        match frame {
            StackMapFrame::New { locals, stack } if self.running_frame.is_none() => {
                // First frame is the implicit one, padded to the maximum number of locals
                let max_locals = locals.iter().map(VerificationType::width).sum();
                let running = self.implicit_frame(max_locals)?;
                self.set_previous_frame(&running);
                self.running_frame = Some(running);
                if !stack.is_empty() {
                    return Err(Error::InvalidFrame(String::from(
                        "implicit first frame has a non empty stack",
                    )));
                }
                Ok(())
            }
            StackMapFrame::New { locals, stack } => {
                let locals = self.abstract_types(locals)?;
                let stack = self.abstract_types(stack)?;
                let (locals, stack) = match &mut self.running_frame {
                    Some(running) => {
                        let max_locals = running.input_locals().len();
                        running.set_input_frame_from_api_format(&locals, &stack, max_locals);
                        running.compressed_input()
                    }
                    None => (locals, stack),
                };
                self.put_frame(FrameRecord {
                    offset: self.code_length(),
                    locals,
                    stack,
                })
            }
            StackMapFrame::Insert => {
                let (locals, stack) = match &self.running_frame {
                    Some(running) => running.compressed_input(),
                    None => {
                        return Err(Error::InvalidFrame(String::from(
                            "frame to insert before the implicit first frame",
                        )))
                    }
                };
                self.put_frame(FrameRecord {
                    offset: self.code_length(),
                    locals,
                    stack,
                })
            }
            _ => Err(Error::InvalidFrame(String::from(
                "inserted frames can only be computed from expanded frames",
            ))),
        }
    }

    fn resolve_handlers(&self) -> Result<Vec<Handler>, Error> {
        self.try_catch_blocks
            .iter()
            .map(|block| {
                Ok(Handler {
                    start: self.label_offset(block.start)?,
                    end: self.label_offset(block.end)?,
                    handler: self.label_offset(block.handler)?,
                    catch_type: block.catch_type,
                    catch_type_name: block.catch_type_name.clone(),
                })
            })
            .collect()
    }

    /// Add an exception edge from every block in the range of each handler
    fn add_handler_edges(&mut self, handlers: &[Handler]) -> Result<(), Error> {
        for handler in handlers {
            let catch_type = AbstractType::from_internal_name(
                self.symbols,
                handler.catch_type_name.as_deref().unwrap_or(THROWABLE),
            )?;
            let handler_node = self
                .block_order
                .iter()
                .copied()
                .find(|node| self.blocks[*node].offset == Some(handler.handler))
                .ok_or_else(|| {
                    Error::InvalidFrame(format!(
                        "exception handler at bytecode offset {} does not start a basic block",
                        handler.handler
                    ))
                })?;
            for node in &self.block_order {
                let block = &mut self.blocks[*node];
                match block.offset {
                    Some(offset) if offset >= handler.start && offset < handler.end => {
                        block.edges.push(Edge {
                            successor: handler_node,
                            kind: EdgeKind::Exception(catch_type),
                        });
                    }
                    _ => {}
                }
            }
            self.blocks[handler_node].jump_target = true;
        }
        Ok(())
    }

    /// Fixed point of the input frames over the control flow graph, then frame emission and
    /// dead code replacement
    fn compute_all_frames(&mut self, handlers: Vec<Handler>) -> Result<Vec<Handler>, Error> {
        let first = match self.first_block {
            Some(first) => first,
            None => return Ok(handlers),
        };
        self.add_handler_edges(&handlers)?;

        // Only the input of the first block is implicit: its output was built while visiting
        self.blocks[first].frame.set_input_frame_from_descriptor(
            self.symbols,
            self.is_static,
            self.is_constructor,
            &self.method.descriptor_value,
            self.max_locals as usize,
        )?;
        let first_frame = self.blocks[first].frame.clone();
        self.set_previous_frame(&first_frame);

        let mut worklist = vec![first];
        self.blocks[first].queued = true;
        let mut max_stack = 0;
        let mut iterations = 0;
        while let Some(node) = worklist.pop() {
            iterations += 1;
            self.blocks[node].queued = false;
            self.blocks[node].reachable = true;
            let block_max_stack =
                self.blocks[node].frame.input_stack_size() as i32 + self.blocks[node].frame.output_stack_max();
            max_stack = max_stack.max(block_max_stack);

            let edges = self.blocks[node].edges.clone();
            for edge in edges {
                let successor = self.canonical(edge.successor);
                let catch_type = match edge.kind {
                    EdgeKind::Exception(catch_type) => Some(catch_type),
                    EdgeKind::Jump(_) => None,
                };
                let changed = if successor == node {
                    let source = self.blocks[node].frame.clone();
                    source.merge(
                        self.symbols,
                        self.hierarchy,
                        &mut self.blocks[node].frame,
                        catch_type,
                    )?
                } else {
                    let (source, target) = pair_mut(&mut self.blocks, node, successor);
                    source
                        .frame
                        .merge(self.symbols, self.hierarchy, &mut target.frame, catch_type)?
                };
                if changed && !self.blocks[successor].queued {
                    self.blocks[successor].queued = true;
                    worklist.push(successor);
                }
            }
        }

        let mut handlers = handlers;
        let code_length = self.code_length();
        let order = self.block_order.clone();
        for (i, node) in order.iter().enumerate() {
            let block = &self.blocks[*node];
            let offset = match block.offset {
                Some(offset) => offset,
                None => continue,
            };
            if block.reachable {
                if block.jump_target {
                    let (locals, stack) = block.frame.compressed_input();
                    self.put_frame(FrameRecord {
                        offset,
                        locals,
                        stack,
                    })?;
                }
                continue;
            }

            // Unreachable code is replaced with NOP ... NOP ATHROW
            let next_offset = order.get(i + 1).and_then(|next| self.blocks[*next].offset);
            let end = next_offset.unwrap_or(code_length);
            if end > offset {
                let code = &mut self.method.code.bytes;
                for position in offset..end - 1 {
                    code.set_u8(position as usize, NOP);
                }
                code.set_u8(end as usize - 1, ATHROW);
                let throwable = AbstractType::from_internal_name(self.symbols, THROWABLE)?;
                self.put_frame(FrameRecord {
                    offset,
                    locals: vec![],
                    stack: vec![throwable],
                })?;
                handlers = Handler::remove_range(handlers, offset, next_offset);
                max_stack = max_stack.max(1);
            }
        }

        log::trace!(
            "computed frames of {}{} in {} iterations over {} blocks",
            self.method.name_value,
            self.method.descriptor_value,
            iterations,
            self.block_order.len()
        );
        self.method.code.max_stack = max_stack.max(0) as u16;
        self.method.code.max_locals = self.max_locals as u16;
        Ok(handlers)
    }

    /// Longest stack size over all paths of the control flow graph
    fn compute_max_stack_and_local(&mut self, handlers: &[Handler]) -> Result<(), Error> {
        if let Some(current) = self.current_block {
            self.blocks[current].output_stack_max = self.max_relative_stack_size;
        }
        self.add_handler_edges(handlers)?;

        let mut max_stack = 0;
        if let Some(first) = self.first_block {
            let mut worklist = vec![first];
            self.blocks[first].queued = true;
            while let Some(node) = worklist.pop() {
                let input_stack_size = self.blocks[node].input_stack_size;
                max_stack = max_stack.max(input_stack_size + self.blocks[node].output_stack_max);
                for edge in self.blocks[node].edges.clone() {
                    let successor = self.canonical(edge.successor);
                    if self.blocks[successor].queued {
                        continue;
                    }
                    self.blocks[successor].input_stack_size = match edge.kind {
                        EdgeKind::Exception(_) => 1,
                        EdgeKind::Jump(relative) => input_stack_size + relative,
                    };
                    self.blocks[successor].queued = true;
                    worklist.push(successor);
                }
            }
        }
        self.method.code.max_stack = max_stack.max(0) as u16;
        self.method.code.max_locals = self.max_locals as u16;
        Ok(())
    }

    /// Write the line number and local variable tables, now that every label is resolved
    fn put_debug_tables(&mut self) -> Result<(), Error> {
        for (line, start) in &self.line_numbers {
            let start = self.label_offset(*start)?;
            let code = &mut self.method.code;
            code.line_numbers.put_u16(start as u16).put_u16(*line);
            code.line_number_count += 1;
        }
        for variable in &self.local_variables {
            let start = self.label_offset(variable.start)?;
            let end = self.label_offset(variable.end)?;
            let length = end.saturating_sub(start) as u16;
            let code = &mut self.method.code;
            if let Some(signature) = variable.signature {
                code.local_variable_types
                    .put_u16(start as u16)
                    .put_u16(length)
                    .put_u16(variable.name)
                    .put_u16(signature)
                    .put_u16(variable.index);
                code.local_variable_type_count += 1;
            }
            code.local_variables
                .put_u16(start as u16)
                .put_u16(length)
                .put_u16(variable.name)
                .put_u16(variable.descriptor)
                .put_u16(variable.index);
            code.local_variable_count += 1;
        }
        Ok(())
    }

    fn parameter_annotations(&mut self, visible: bool) -> &mut ParameterAnnotations {
        let descriptor = &self.method.descriptor_value;
        let parameters = if visible {
            &mut self.method.visible_parameter_annotations
        } else {
            &mut self.method.invisible_parameter_annotations
        };
        parameters.get_or_insert_with(|| {
            let count = MethodDescriptor::parse(descriptor)
                .map_or(0, |descriptor| descriptor.parameters.len());
            ParameterAnnotations::new(count as u8)
        })
    }

    /// Type annotations of the code, along with the symbol table to encode them with
    fn code_type_annotations(&mut self, visible: bool) -> (&mut SymbolTable, &mut AnnotationSet) {
        let set = if visible {
            &mut self.method.code.visible_type_annotations
        } else {
            &mut self.method.code.invisible_type_annotations
        };
        (&mut *self.symbols, set)
    }
}

impl<'a> MethodVisitor for MethodWriter<'a> {
    fn visit_parameter(
        &mut self,
        name: Option<&str>,
        access: ParameterAccessFlags,
    ) -> Result<(), Error> {
        let name = name.map_or(0, |name| self.symbols.add_utf8(name));
        self.method
            .parameters
            .put_u16(name)
            .put_u16(access.bits() as u16);
        self.method.parameter_count += 1;
        Ok(())
    }

    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let output = self.method.annotation_default.insert(ByteVector::new());
        Some(Box::new(AnnotationWriter::new(self.symbols, output, false, None)))
    }

    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let writer = self
            .method
            .annotations
            .annotation(self.symbols, descriptor, visible);
        Some(Box::new(writer))
    }

    fn visit_type_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let writer = self.method.annotations.type_annotation(
            self.symbols,
            type_ref,
            type_path,
            descriptor,
            visible,
        );
        Some(Box::new(writer))
    }

    fn visit_annotable_parameter_count(
        &mut self,
        parameter_count: u8,
        visible: bool,
    ) -> Result<(), Error> {
        self.parameter_annotations(visible).annotable_count = parameter_count;
        Ok(())
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.parameter_annotations(visible);
        let parameters = if visible {
            &mut self.method.visible_parameter_annotations
        } else {
            &mut self.method.invisible_parameter_annotations
        };
        let set = parameters.as_mut()?.parameter(parameter);
        Some(Box::new(set.add(self.symbols, descriptor)))
    }

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        if attribute.is_code_attribute() {
            self.method.code.attributes.push(attribute);
        } else {
            self.method.attributes.push(attribute);
        }
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.method.has_code = true;
        if let Compute::AllFrames | Compute::MaxStackAndLocal = self.compute {
            let first = self.new_block();
            self.first_block = Some(first);
            self.visit_block(first);
        }
        Ok(())
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        match self.compute {
            Compute::AllFrames => Ok(()),
            Compute::InsertedFrames => self.visit_frame_with_inserted(frame),
            Compute::Nothing | Compute::MaxStackAndLocal => match frame {
                StackMapFrame::New { locals, stack } => {
                    if self.previous_frame.is_none() {
                        let max_locals = arguments_and_return_sizes(&self.method.descriptor_value)?.0
                            - self.is_static as usize;
                        let implicit = self.implicit_frame(max_locals)?;
                        self.set_previous_frame(&implicit);
                    }
                    let locals = self.abstract_types(locals)?;
                    let stack = self.abstract_types(stack)?;
                    self.put_frame(FrameRecord {
                        offset: self.code_length(),
                        locals,
                        stack,
                    })
                }
                StackMapFrame::Insert => Err(Error::InvalidFrame(String::from(
                    "frames can only be inserted while computing them",
                ))),
                compressed => self.put_compressed_frame(compressed),
            },
        }
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        self.method.code.bytes.put_u8(opcode);
        self.execute(opcode, Operand::None, stack_size_delta(opcode).unwrap_or(0))?;
        if (IRETURN..=RETURN).contains(&opcode) || opcode == ATHROW {
            self.end_block_with_no_successor();
        }
        Ok(())
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let code = &mut self.method.code.bytes;
        let operand = if opcode == SIPUSH {
            code.put_u8(opcode).put_i16(operand as i16);
            Operand::None
        } else {
            code.put_11(opcode, operand as u8);
            if opcode == NEWARRAY {
                Operand::ArrayType(operand as u8)
            } else {
                Operand::None
            }
        };
        self.execute(opcode, operand, stack_size_delta(opcode).unwrap_or(0))
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let code = &mut self.method.code.bytes;
        if var < 4 && opcode != RET {
            let implicit = if opcode < ISTORE {
                ILOAD_0 + ((opcode - ILOAD) << 2) + var as u8
            } else {
                ISTORE_0 + ((opcode - ISTORE) << 2) + var as u8
            };
            code.put_u8(implicit);
        } else if var >= 256 {
            code.put_u8(WIDE).put_12(opcode, var);
        } else {
            code.put_11(opcode, var as u8);
        }

        if opcode == RET && self.compute == Compute::MaxStackAndLocal {
            self.end_block_with_no_successor();
        } else {
            self.execute(opcode, Operand::Var(var), stack_size_delta(opcode).unwrap_or(0))?;
        }

        let size = if let LLOAD | DLOAD | LSTORE | DSTORE = opcode { 2 } else { 1 };
        self.track_local(var as u32 + size);

        // Stores inside try blocks change the frame seen by the handlers
        if opcode >= ISTORE && self.compute == Compute::AllFrames && !self.try_catch_blocks.is_empty()
        {
            let node = self.new_block();
            self.visit_block(node);
        }
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) -> Result<(), Error> {
        let offset = self.code_length();
        self.last_bytecode_offset = offset;
        let class = self.symbols.add_class(type_name);
        self.method.code.bytes.put_12(opcode, class);
        let operand = if opcode == NEW {
            self.new_types.insert(offset, type_name.to_string());
            Operand::New {
                type_name,
                bytecode_offset: offset,
            }
        } else {
            Operand::Type(type_name)
        };
        self.execute(opcode, operand, stack_size_delta(opcode).unwrap_or(0))
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let field = self.symbols.add_field_ref(owner, name, descriptor);
        self.method.code.bytes.put_12(opcode, field);
        let size = if let Some(b'J' | b'D') = descriptor.as_bytes().first() { 2 } else { 1 };
        let stack_delta = match opcode {
            GETSTATIC => size,
            PUTSTATIC => -size,
            GETFIELD => size - 1,
            _ => -size - 1,
        };
        self.execute(opcode, Operand::Member { name, descriptor }, stack_delta)
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let method = self
            .symbols
            .add_method_ref(owner, name, descriptor, is_interface);
        let (arguments, returns) = arguments_and_return_sizes(descriptor)?;
        let code = &mut self.method.code.bytes;
        code.put_12(opcode, method);
        if opcode == INVOKEINTERFACE {
            code.put_11(arguments as u8, 0);
        }
        let mut stack_delta = returns as i32 - arguments as i32;
        if opcode == INVOKESTATIC {
            stack_delta += 1;
        }
        self.execute(opcode, Operand::Member { name, descriptor }, stack_delta)
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let call_site = self.symbols.add_invoke_dynamic(
            name,
            descriptor,
            bootstrap_method,
            bootstrap_arguments,
        );
        self.method
            .code
            .bytes
            .put_12(INVOKEDYNAMIC, call_site)
            .put_u16(0);
        let (arguments, returns) = arguments_and_return_sizes(descriptor)?;
        let stack_delta = returns as i32 - arguments as i32 + 1;
        self.execute(INVOKEDYNAMIC, Operand::Member { name, descriptor }, stack_delta)
    }

    fn visit_jump_insn(&mut self, opcode: u8, label: Label) -> Result<(), Error> {
        let source = self.code_length();
        self.last_bytecode_offset = source;
        let base_opcode = if opcode >= GOTO_W {
            opcode - WIDE_JUMP_OPCODE_DELTA
        } else {
            opcode
        };

        let mut next_is_jump_target = false;
        let backward_offset = self
            .labels
            .get(&label)
            .and_then(|info| info.offset)
            .map(|offset| offset as i64 - source as i64);
        match backward_offset {
            Some(relative) if relative < i16::MIN as i64 => {
                let code = &mut self.method.code.bytes;
                if base_opcode == GOTO {
                    code.put_u8(GOTO_W);
                } else if base_opcode == JSR {
                    code.put_u8(JSR_W);
                } else {
                    // IFNOTxx +8 ; GOTO_W target
                    code.put_u8(opposite_jump(base_opcode))
                        .put_u16(8)
                        .put_u8(ASM_GOTO_W);
                    self.method.has_asm_instructions = true;
                    next_is_jump_target = true;
                }
                let wide_source = self.code_length() - 1;
                self.put_label_reference(label, wide_source, true);
            }
            _ if base_opcode != opcode => {
                self.method.code.bytes.put_u8(opcode);
                self.put_label_reference(label, source, true);
            }
            _ => {
                self.method.code.bytes.put_u8(base_opcode);
                self.put_label_reference(label, source, false);
            }
        }

        let mut next_block = None;
        match self.compute {
            Compute::AllFrames => {
                if let Some(current) = self.current_block {
                    self.blocks[current]
                        .frame
                        .execute(base_opcode, Operand::None, self.symbols)?;
                    let target = self.jump_target(label)?;
                    self.mark_jump_target(target);
                    self.add_successor(target, EdgeKind::Jump(0));
                    if base_opcode != GOTO {
                        next_block = Some(self.new_block());
                    }
                }
            }
            Compute::MaxStackAndLocal => {
                if self.current_block.is_some() {
                    let target = self.jump_target(label)?;
                    if base_opcode == JSR {
                        self.add_successor(target, EdgeKind::Jump(self.relative_stack_size + 1));
                        next_block = Some(self.new_block());
                    } else {
                        self.relative_stack_size += stack_size_delta(base_opcode).unwrap_or(0);
                        self.add_successor(target, EdgeKind::Jump(self.relative_stack_size));
                    }
                }
            }
            Compute::InsertedFrames => self.execute(base_opcode, Operand::None, 0)?,
            Compute::Nothing => {}
        }

        if let Some(next) = next_block {
            if next_is_jump_target {
                self.blocks[next].jump_target = true;
            }
            self.visit_block(next);
        }
        if base_opcode == GOTO {
            self.end_block_with_no_successor();
        }
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        let already_visited = self
            .labels
            .get(&label)
            .map_or(false, |info| info.offset.is_some());
        self.resolve(label);
        if already_visited {
            return Ok(());
        }
        if let Compute::AllFrames | Compute::MaxStackAndLocal = self.compute {
            let has_node = self.labels.get(&label).map_or(false, |info| info.node.is_some());
            if label.is_debug_only() && !has_node {
                return Ok(());
            }
            let node = self.node_of(label);
            self.visit_block(node);
        }
        Ok(())
    }

    fn visit_ldc_insn(&mut self, value: &ConstantValue) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let index = self.symbols.add_constant(value);
        let wide = value.is_wide();
        let code = &mut self.method.code.bytes;
        if wide {
            code.put_12(LDC2_W, index);
        } else if index >= 256 {
            code.put_12(LDC_W, index);
        } else {
            code.put_11(LDC, index as u8);
        }
        self.execute(LDC, Operand::Constant(value), if wide { 2 } else { 1 })
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let code = &mut self.method.code.bytes;
        if var > 255 || increment > i8::MAX as i16 || increment < i8::MIN as i16 {
            code.put_u8(WIDE).put_12(IINC, var).put_i16(increment);
        } else {
            code.put_u8(IINC).put_11(var as u8, increment as u8);
        }
        self.execute(IINC, Operand::Var(var), 0)?;
        self.track_local(var as u32 + 1);
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        min: i32,
        max: i32,
        default: Label,
        labels: &[Label],
    ) -> Result<(), Error> {
        let source = self.code_length();
        self.last_bytecode_offset = source;
        self.method.code.bytes.put_u8(TABLESWITCH);
        self.put_switch_padding();
        self.put_label_reference(default, source, true);
        self.method.code.bytes.put_i32(min).put_i32(max);
        for label in labels {
            self.put_label_reference(*label, source, true);
        }
        self.visit_switch(default, labels)
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        labels: &[Label],
    ) -> Result<(), Error> {
        let source = self.code_length();
        self.last_bytecode_offset = source;
        self.method.code.bytes.put_u8(LOOKUPSWITCH);
        self.put_switch_padding();
        self.put_label_reference(default, source, true);
        self.method.code.bytes.put_u32(labels.len() as u32);
        for (key, label) in keys.iter().zip(labels) {
            self.method.code.bytes.put_i32(*key);
            self.put_label_reference(*label, source, true);
        }
        self.visit_switch(default, labels)
    }

    fn visit_multi_anew_array_insn(
        &mut self,
        descriptor: &str,
        dimensions: u8,
    ) -> Result<(), Error> {
        self.last_bytecode_offset = self.code_length();
        let class = self.symbols.add_class(descriptor);
        self.method
            .code
            .bytes
            .put_12(MULTIANEWARRAY, class)
            .put_u8(dimensions);
        self.execute(
            MULTIANEWARRAY,
            Operand::MultiArray {
                descriptor,
                dimensions,
            },
            1 - dimensions as i32,
        )
    }

    fn visit_insn_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let type_ref =
            TypeReference((type_ref.0 & 0xFF00_00FF) | (self.last_bytecode_offset << 8));
        let (symbols, set) = self.code_type_annotations(visible);
        Some(Box::new(set.add_type_annotation(
            symbols, type_ref, type_path, descriptor,
        )))
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        exception_type: Option<&str>,
    ) -> Result<(), Error> {
        let catch_type = exception_type.map_or(0, |class| self.symbols.add_class(class));
        self.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type,
            catch_type_name: exception_type.map(str::to_string),
        });
        Ok(())
    }

    fn visit_try_catch_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let index = self.try_catch_blocks.len().saturating_sub(1) as u16;
        let type_ref = type_ref.with_exception_index(index);
        let (symbols, set) = self.code_type_annotations(visible);
        Some(Box::new(set.add_type_annotation(
            symbols, type_ref, type_path, descriptor,
        )))
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        let variable = LocalVariable {
            name: self.symbols.add_utf8(name),
            descriptor: self.symbols.add_utf8(descriptor),
            signature: signature.map(|signature| self.symbols.add_utf8(signature)),
            start,
            end,
            index,
        };
        self.local_variables.push(variable);
        let size = if let Some(b'J' | b'D') = descriptor.as_bytes().first() { 2 } else { 1 };
        self.track_local(index as u32 + size);
        Ok(())
    }

    fn visit_local_variable_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        ranges: &[LocalVariableRange],
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let mut resolved = Vec::with_capacity(ranges.len());
        for range in ranges {
            let offsets = self
                .label_offset(range.start)
                .and_then(|start| Ok((start, self.label_offset(range.end)?)));
            match offsets {
                Ok((start, end)) => resolved.push((
                    start as u16,
                    end.saturating_sub(start) as u16,
                    range.index,
                )),
                Err(error) => {
                    self.pending_error.get_or_insert(error);
                    return None;
                }
            }
        }
        let (symbols, set) = self.code_type_annotations(visible);
        Some(Box::new(set.add_local_variable_annotation(
            symbols, type_ref, type_path, &resolved, descriptor,
        )))
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.line_numbers.push((line, start));
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        if let Some(error) = self.pending_error.take() {
            return Err(error);
        }
        if let Some(label) = self
            .labels
            .iter()
            .find(|(_, info)| info.offset.is_none() && !info.forward_references.is_empty())
            .map(|(label, _)| *label)
        {
            return Err(Error::UnresolvedLabel(label));
        }

        let handlers = self.resolve_handlers()?;
        let handlers = match self.compute {
            Compute::AllFrames => self.compute_all_frames(handlers)?,
            Compute::MaxStackAndLocal => {
                self.compute_max_stack_and_local(&handlers)?;
                handlers
            }
            Compute::Nothing | Compute::InsertedFrames => {
                self.method.code.max_stack = max_stack;
                self.method.code.max_locals = max_locals;
                handlers
            }
        };
        self.method.code.handlers = handlers;
        self.put_debug_tables()?;

        log::trace!(
            "wrote code of {}{}: {} bytes, max stack {}, max locals {}, {} frames",
            self.method.name_value,
            self.method.descriptor_value,
            self.method.code.bytes.len(),
            self.method.code.max_stack,
            self.method.code.max_locals,
            self.method.code.stack_map_count
        );
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        match self.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod method_writer_tests {
    use super::*;
    use crate::class_hierarchy::ObjectHierarchy;
    use crate::label::LabelGenerator;
    use crate::Version;

    fn symbols() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols.set_major_version_and_class_name(Version::JAVA8.major_version, "Test");
        symbols
    }

    fn method(symbols: &mut SymbolTable, access: MethodAccessFlags, descriptor: &str) -> MethodData {
        MethodData::new(symbols, access, "run", descriptor, None, &[])
    }

    #[test]
    fn implicit_local_variable_opcodes() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "()V");
        let mut writer = MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::Nothing);
        writer.visit_code().unwrap();
        writer.visit_var_insn(ILOAD, 2).unwrap();
        writer.visit_var_insn(ASTORE, 3).unwrap();
        writer.visit_var_insn(ALOAD, 7).unwrap();
        writer.visit_var_insn(LLOAD, 300).unwrap();
        writer.visit_iinc_insn(1, 200).unwrap();
        writer.visit_maxs(0, 0).unwrap();
        assert_eq!(
            data.code.bytes.as_slice(),
            &[28, 78, ALOAD, 7, WIDE, LLOAD, 1, 44, WIDE, IINC, 0, 1, 0, 200]
        );
    }

    #[test]
    fn maxs_follow_every_path() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "(I)I");
        let mut labels = LabelGenerator::new();
        let other = labels.fresh_label();
        let mut writer = MethodWriter::new(
            &mut symbols,
            &ObjectHierarchy,
            &mut data,
            Compute::MaxStackAndLocal,
        );
        writer.visit_code().unwrap();
        writer.visit_var_insn(ILOAD, 0).unwrap();
        writer.visit_jump_insn(IFEQ, other).unwrap();
        writer.visit_insn(ICONST_1).unwrap();
        writer.visit_insn(IRETURN).unwrap();
        writer.visit_label(other).unwrap();
        writer.visit_insn(LCONST_0).unwrap();
        writer.visit_insn(LCONST_1).unwrap();
        writer.visit_insn(LADD).unwrap();
        writer.visit_insn(L2I).unwrap();
        writer.visit_insn(IRETURN).unwrap();
        writer.visit_maxs(0, 0).unwrap();
        assert_eq!(data.code.max_stack, 4);
        assert_eq!(data.code.max_locals, 1);
    }

    #[test]
    fn forward_jumps_are_patched() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "()V");
        let mut labels = LabelGenerator::new();
        let end = labels.fresh_label();
        let mut writer = MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::Nothing);
        writer.visit_code().unwrap();
        writer.visit_insn(NOP).unwrap();
        writer.visit_jump_insn(GOTO, end).unwrap();
        writer.visit_insn(NOP).unwrap();
        writer.visit_label(end).unwrap();
        writer.visit_insn(RETURN).unwrap();
        writer.visit_maxs(0, 0).unwrap();
        assert_eq!(data.code.bytes.as_slice(), &[NOP, GOTO, 0, 4, NOP, RETURN]);
    }

    #[test]
    fn long_forward_jumps_need_expansion() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "(I)V");
        let mut labels = LabelGenerator::new();
        let end = labels.fresh_label();
        let mut writer = MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::Nothing);
        writer.visit_code().unwrap();
        writer.visit_var_insn(ILOAD, 0).unwrap();
        writer.visit_jump_insn(IFEQ, end).unwrap();
        for _ in 0..40_000 {
            writer.visit_insn(NOP).unwrap();
        }
        writer.visit_label(end).unwrap();
        writer.visit_insn(RETURN).unwrap();
        writer.visit_maxs(1, 1).unwrap();
        assert!(data.has_asm_instructions);
        assert_eq!(data.code.bytes.get_u8(1), IFEQ + ASM_OPCODE_DELTA);
    }

    #[test]
    fn unresolved_labels_are_reported() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "()V");
        let mut labels = LabelGenerator::new();
        let nowhere = labels.fresh_label();
        let mut writer = MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::Nothing);
        writer.visit_code().unwrap();
        writer.visit_jump_insn(GOTO, nowhere).unwrap();
        assert!(matches!(
            writer.visit_maxs(0, 0),
            Err(Error::UnresolvedLabel(label)) if label == nowhere
        ));
    }

    #[test]
    fn switch_padding() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "(I)V");
        let mut labels = LabelGenerator::new();
        let default = labels.fresh_label();
        let mut writer = MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::Nothing);
        writer.visit_code().unwrap();
        writer.visit_var_insn(ILOAD, 0).unwrap();
        writer.visit_lookup_switch_insn(default, &[], &[]).unwrap();
        writer.visit_label(default).unwrap();
        writer.visit_insn(RETURN).unwrap();
        writer.visit_maxs(1, 1).unwrap();
        // iload_0, lookupswitch, 2 bytes of padding, default +11, 0 pairs
        assert_eq!(
            data.code.bytes.as_slice(),
            &[26, LOOKUPSWITCH, 0, 0, 0, 0, 0, 11, 0, 0, 0, 0, RETURN]
        );
    }

    #[test]
    fn frames_at_branch_targets() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "(I)I");
        let mut labels = LabelGenerator::new();
        let other = labels.fresh_label();
        let mut writer =
            MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::AllFrames);
        writer.visit_code().unwrap();
        writer.visit_var_insn(ILOAD, 0).unwrap();
        writer.visit_jump_insn(IFEQ, other).unwrap();
        writer.visit_insn(ICONST_1).unwrap();
        writer.visit_insn(IRETURN).unwrap();
        writer.visit_label(other).unwrap();
        writer.visit_insn(ICONST_0).unwrap();
        writer.visit_insn(IRETURN).unwrap();
        writer.visit_maxs(0, 0).unwrap();
        assert_eq!(data.code.stack_map_count, 1);
        // same frame at offset 6
        assert_eq!(data.code.stack_map.as_slice(), &[6]);
        assert_eq!(data.code.max_stack, 1);
        assert_eq!(data.code.max_locals, 1);
    }

    #[test]
    fn dead_code_is_replaced() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "()V");
        let mut writer =
            MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::AllFrames);
        writer.visit_code().unwrap();
        writer.visit_insn(RETURN).unwrap();
        writer.visit_insn(ICONST_0).unwrap();
        writer.visit_insn(POP).unwrap();
        writer.visit_insn(RETURN).unwrap();
        writer.visit_maxs(0, 0).unwrap();
        assert_eq!(data.code.bytes.as_slice(), &[RETURN, NOP, NOP, ATHROW]);
        assert_eq!(data.code.stack_map_count, 1);
        assert_eq!(data.code.max_stack, 1);
    }

    #[test]
    fn inserting_frames_needs_frame_computation() {
        let mut symbols = symbols();
        let mut data = method(&mut symbols, MethodAccessFlags::STATIC, "()V");
        let mut writer = MethodWriter::new(&mut symbols, &ObjectHierarchy, &mut data, Compute::Nothing);
        writer.visit_code().unwrap();
        assert!(matches!(
            writer.visit_frame(&StackMapFrame::Insert),
            Err(Error::InvalidFrame(_))
        ));
    }
}
