//! Abstract interpretation of bytecode, for computing stack map frames
//!
//! Each basic block of a method gets a [`Frame`]. While instructions are being written, the
//! frame of the current block symbolically executes them: its _output_ locals and stack are
//! expressed relative to its (still unknown) _input_ locals and stack, using the `LOCAL` and
//! `STACK` placeholder kinds of [`AbstractType`]. Once the whole method is known, input frames
//! are propagated through the control flow graph with [`Frame::merge`] until a fixed point is
//! reached.

mod abstract_type;

pub use abstract_type::AbstractType;
pub(crate) use abstract_type::*;

use crate::byte_vector::ByteVector;
use crate::class_hierarchy::{ClassHierarchy, OBJECT};
use crate::constants::ConstantValue;
use crate::descriptors::arguments_and_return_sizes;
use crate::errors::Error;
use crate::label::Label;
use crate::opcodes::*;
use crate::stack_map::VerificationType;
use crate::symbol_table::{Symbol, SymbolTable};

/// Operand of an instruction, as far as frame computation is concerned
#[derive(Copy, Clone, Debug)]
pub enum Operand<'a> {
    None,

    /// Local variable index (loads, stores, `IINC`, `RET`)
    Var(u16),

    /// Primitive array type code (`NEWARRAY`)
    ArrayType(u8),

    /// Loaded constant (`LDC`, `LDC_W`, `LDC2_W`)
    Constant(&'a ConstantValue),

    /// Field or method being accessed or invoked (including `INVOKEDYNAMIC`)
    Member { name: &'a str, descriptor: &'a str },

    /// Internal name or array descriptor (`ANEWARRAY`, `CHECKCAST`, `INSTANCEOF`)
    Type(&'a str),

    /// Class instantiated by a `NEW` at the given bytecode offset
    New { type_name: &'a str, bytecode_offset: u32 },

    /// Array descriptor and number of dimensions (`MULTIANEWARRAY`)
    MultiArray { descriptor: &'a str, dimensions: u8 },
}

/// Input and output frames of a basic block
#[derive(Clone, Debug, Default)]
pub struct Frame {
    /// Types of the locals when entering the block (`None` until first reached)
    input_locals: Option<Vec<AbstractType>>,

    /// Types on the stack when entering the block (`None` until first reached)
    input_stack: Option<Vec<AbstractType>>,

    /// Types of the locals when exiting the block (unset entries were not written)
    output_locals: Vec<AbstractType>,

    /// Types pushed by the block onto its input stack (minus `output_stack_start` entries)
    output_stack: Vec<AbstractType>,

    /// Opposite of the number of input stack entries popped by the block
    output_stack_start: i32,

    /// Highest output stack size, relative to the input stack size
    output_stack_max: i32,

    /// Types on which a constructor was called in the block
    initializations: Vec<AbstractType>,
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    pub fn input_locals(&self) -> &[AbstractType] {
        self.input_locals.as_deref().unwrap_or(&[])
    }

    pub fn input_stack(&self) -> &[AbstractType] {
        self.input_stack.as_deref().unwrap_or(&[])
    }

    pub fn input_stack_size(&self) -> usize {
        self.input_stack().len()
    }

    pub fn has_input(&self) -> bool {
        self.input_locals.is_some()
    }

    pub fn output_stack(&self) -> &[AbstractType] {
        &self.output_stack
    }

    pub fn output_stack_max(&self) -> i32 {
        self.output_stack_max
    }

    /// Set the input frame to the implicit frame at the start of a method
    pub fn set_input_frame_from_descriptor(
        &mut self,
        symbols: &mut SymbolTable,
        is_static: bool,
        is_constructor: bool,
        descriptor: &str,
        max_locals: usize,
    ) -> Result<(), Error> {
        let mut locals = Vec::with_capacity(max_locals);
        if !is_static {
            if is_constructor {
                locals.push(AbstractType::UNINITIALIZED_THIS);
            } else {
                let class_name = symbols.class_name().to_string();
                locals.push(AbstractType::reference(symbols.add_type(&class_name)));
            }
        }
        for argument in argument_descriptors(descriptor)? {
            let typ = AbstractType::from_descriptor(symbols, argument)?;
            locals.push(typ);
            if typ.is_long_or_double() {
                locals.push(AbstractType::TOP);
            }
        }
        if locals.len() < max_locals {
            locals.resize(max_locals, AbstractType::TOP);
        }
        self.input_locals = Some(locals);
        self.input_stack = Some(vec![]);
        Ok(())
    }

    /// Set the input frame from a frame where `long` and `double` take only one entry
    ///
    /// `max_locals` is a lower bound on the number of input locals (missing ones are `TOP`).
    pub fn set_input_frame_from_api_format(
        &mut self,
        locals: &[AbstractType],
        stack: &[AbstractType],
        max_locals: usize,
    ) {
        self.input_locals = Some(expand_long_and_double(locals, max_locals));
        self.input_stack = Some(expand_long_and_double(stack, 0));
        self.output_locals.clear();
        self.output_stack.clear();
        self.output_stack_start = 0;
        self.initializations.clear();
    }

    /// Replace the input frame by the current (concrete) output frame, and clear the output
    pub(crate) fn advance(
        &mut self,
        symbols: &mut SymbolTable,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<(), Error> {
        let mut successor = Frame::new();
        self.merge(symbols, hierarchy, &mut successor, None)?;
        self.input_locals = successor.input_locals;
        self.input_stack = successor.input_stack;
        self.output_locals.clear();
        self.output_stack.clear();
        self.output_stack_start = 0;
        self.initializations.clear();
        Ok(())
    }

    fn get_local(&mut self, index: u16) -> AbstractType {
        match self.output_locals.get_mut(index as usize) {
            Some(local) => {
                if local.is_unset() {
                    *local = AbstractType::input_local(index);
                }
                *local
            }
            None => AbstractType::input_local(index),
        }
    }

    fn set_local(&mut self, index: usize, typ: AbstractType) {
        if index >= self.output_locals.len() {
            self.output_locals.resize(index + 1, AbstractType::UNSET);
        }
        self.output_locals[index] = typ;
    }

    /// Push a type on the output stack, updating the high-water mark
    pub fn push(&mut self, typ: AbstractType) {
        self.output_stack.push(typ);
        let output_stack_size = self.output_stack_start + self.output_stack.len() as i32;
        if output_stack_size > self.output_stack_max {
            self.output_stack_max = output_stack_size;
        }
    }

    /// Push the type of a field descriptor, or the return type of a method descriptor
    fn push_descriptor(&mut self, symbols: &mut SymbolTable, descriptor: &str) -> Result<(), Error> {
        let field_descriptor = match descriptor.strip_prefix('(') {
            Some(method) => method
                .split_once(')')
                .map(|(_, ret)| ret)
                .ok_or_else(|| Error::InvalidDescriptor(descriptor.to_string()))?,
            None => descriptor,
        };
        let typ = AbstractType::from_descriptor(symbols, field_descriptor)?;
        if !typ.is_unset() {
            self.push(typ);
            if typ.is_long_or_double() {
                self.push(AbstractType::TOP);
            }
        }
        Ok(())
    }

    /// Pop one type from the output stack (or a placeholder for an input stack entry)
    pub fn pop(&mut self) -> AbstractType {
        match self.output_stack.pop() {
            Some(typ) => typ,
            None => {
                self.output_stack_start -= 1;
                AbstractType::input_stack(-self.output_stack_start)
            }
        }
    }

    /// Pop some number of stack entries
    pub fn pop_many(&mut self, elements: usize) {
        let top = self.output_stack.len();
        if top >= elements {
            self.output_stack.truncate(top - elements);
        } else {
            self.output_stack_start -= (elements - top) as i32;
            self.output_stack.clear();
        }
    }

    /// Pop the arguments of a method descriptor, or the value of a field descriptor
    fn pop_descriptor(&mut self, descriptor: &str) -> Result<(), Error> {
        if descriptor.starts_with('(') {
            let (arguments_size, _) = arguments_and_return_sizes(descriptor)?;
            self.pop_many(arguments_size - 1);
        } else if descriptor.starts_with('J') || descriptor.starts_with('D') {
            self.pop_many(2);
        } else {
            self.pop_many(1);
        }
        Ok(())
    }

    /// Resolve an initialized type, if a constructor was called on it in this block
    fn initialized_type(&self, symbols: &mut SymbolTable, typ: AbstractType) -> AbstractType {
        if typ != AbstractType::UNINITIALIZED_THIS && typ.dimension_and_kind_bits() != UNINITIALIZED_KIND {
            return typ;
        }
        for initialization in &self.initializations {
            let initialized = match initialization.kind() {
                LOCAL_KIND => self
                    .input_locals()
                    .get(initialization.value() as usize)
                    .map(|local| local.add_dimensions(initialization.dimensions())),
                STACK_KIND => {
                    let input_stack = self.input_stack();
                    input_stack
                        .len()
                        .checked_sub(initialization.value() as usize)
                        .map(|index| input_stack[index].add_dimensions(initialization.dimensions()))
                }
                _ => Some(*initialization),
            };
            if initialized == Some(typ) {
                let name = if typ == AbstractType::UNINITIALIZED_THIS {
                    symbols.class_name().to_string()
                } else {
                    symbols.type_name(typ.value()).to_string()
                };
                return AbstractType::reference(symbols.add_type(&name));
            }
        }
        typ
    }

    /// Simulate the effect of an instruction on the output frame
    pub fn execute(
        &mut self,
        opcode: u8,
        operand: Operand<'_>,
        symbols: &mut SymbolTable,
    ) -> Result<(), Error> {
        match (opcode, operand) {
            (NOP | INEG | LNEG | FNEG | DNEG | I2B | I2C | I2S | GOTO | RETURN, _) => (),
            (ACONST_NULL, _) => self.push(AbstractType::NULL),
            (ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH | ILOAD, _) => self.push(AbstractType::INTEGER),
            (LCONST_0 | LCONST_1 | LLOAD, _) => {
                self.push(AbstractType::LONG);
                self.push(AbstractType::TOP);
            }
            (FCONST_0..=FCONST_2 | FLOAD, _) => self.push(AbstractType::FLOAT),
            (DCONST_0 | DCONST_1 | DLOAD, _) => {
                self.push(AbstractType::DOUBLE);
                self.push(AbstractType::TOP);
            }
            (LDC | LDC_W | LDC2_W, Operand::Constant(constant)) => match constant {
                ConstantValue::Integer(_) => self.push(AbstractType::INTEGER),
                ConstantValue::Long(_) => {
                    self.push(AbstractType::LONG);
                    self.push(AbstractType::TOP);
                }
                ConstantValue::Float(_) => self.push(AbstractType::FLOAT),
                ConstantValue::Double(_) => {
                    self.push(AbstractType::DOUBLE);
                    self.push(AbstractType::TOP);
                }
                ConstantValue::Class(_) => self.push_class(symbols, "java/lang/Class"),
                ConstantValue::String(_) => self.push_class(symbols, "java/lang/String"),
                ConstantValue::MethodType(_) => {
                    self.push_class(symbols, "java/lang/invoke/MethodType")
                }
                ConstantValue::Handle(_) => {
                    self.push_class(symbols, "java/lang/invoke/MethodHandle")
                }
                ConstantValue::Dynamic(dynamic) => {
                    self.push_descriptor(symbols, &dynamic.descriptor)?
                }
            },
            (ALOAD, Operand::Var(var)) => {
                let typ = self.get_local(var);
                self.push(typ);
            }
            (LALOAD | D2L, _) => {
                self.pop_many(2);
                self.push(AbstractType::LONG);
                self.push(AbstractType::TOP);
            }
            (DALOAD | L2D, _) => {
                self.pop_many(2);
                self.push(AbstractType::DOUBLE);
                self.push(AbstractType::TOP);
            }
            (AALOAD, _) => {
                self.pop_many(1);
                let array = self.pop();
                self.push(if array == AbstractType::NULL {
                    array
                } else {
                    array.element_of()
                });
            }
            (ISTORE | FSTORE | ASTORE, Operand::Var(var)) => {
                let typ = self.pop();
                self.set_local(var as usize, typ);
                self.invalidate_two_word_local(var);
            }
            (LSTORE | DSTORE, Operand::Var(var)) => {
                self.pop_many(1);
                let typ = self.pop();
                if var == u16::MAX {
                    return Err(Error::InvalidFrame(format!(
                        "two-word store into the last local {}",
                        var
                    )));
                }
                self.set_local(var as usize, typ);
                self.set_local(var as usize + 1, AbstractType::TOP);
                self.invalidate_two_word_local(var);
            }
            (IASTORE | BASTORE | CASTORE | SASTORE | FASTORE | AASTORE, _) => self.pop_many(3),
            (LASTORE | DASTORE, _) => self.pop_many(4),
            (
                POP | IFEQ..=IFLE | IRETURN | FRETURN | ARETURN | TABLESWITCH | LOOKUPSWITCH
                | ATHROW | MONITORENTER | MONITOREXIT | IFNULL | IFNONNULL,
                _,
            ) => self.pop_many(1),
            (POP2 | IF_ICMPEQ..=IF_ACMPNE | LRETURN | DRETURN, _) => self.pop_many(2),
            (DUP, _) => {
                let t1 = self.pop();
                self.push(t1);
                self.push(t1);
            }
            (DUP_X1, _) => {
                let t1 = self.pop();
                let t2 = self.pop();
                self.push(t1);
                self.push(t2);
                self.push(t1);
            }
            (DUP_X2, _) => {
                let t1 = self.pop();
                let t2 = self.pop();
                let t3 = self.pop();
                self.push(t1);
                self.push(t3);
                self.push(t2);
                self.push(t1);
            }
            (DUP2, _) => {
                let t1 = self.pop();
                let t2 = self.pop();
                self.push(t2);
                self.push(t1);
                self.push(t2);
                self.push(t1);
            }
            (DUP2_X1, _) => {
                let t1 = self.pop();
                let t2 = self.pop();
                let t3 = self.pop();
                self.push(t2);
                self.push(t1);
                self.push(t3);
                self.push(t2);
                self.push(t1);
            }
            (DUP2_X2, _) => {
                let t1 = self.pop();
                let t2 = self.pop();
                let t3 = self.pop();
                let t4 = self.pop();
                self.push(t2);
                self.push(t1);
                self.push(t4);
                self.push(t3);
                self.push(t2);
                self.push(t1);
            }
            (SWAP, _) => {
                let t1 = self.pop();
                let t2 = self.pop();
                self.push(t1);
                self.push(t2);
            }
            (
                IALOAD | BALOAD | CALOAD | SALOAD | IADD | ISUB | IMUL | IDIV | IREM | IAND | IOR
                | IXOR | ISHL | ISHR | IUSHR | L2I | D2I | FCMPL | FCMPG,
                _,
            ) => {
                self.pop_many(2);
                self.push(AbstractType::INTEGER);
            }
            (LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR, _) => {
                self.pop_many(4);
                self.push(AbstractType::LONG);
                self.push(AbstractType::TOP);
            }
            (FALOAD | FADD | FSUB | FMUL | FDIV | FREM | L2F | D2F, _) => {
                self.pop_many(2);
                self.push(AbstractType::FLOAT);
            }
            (DADD | DSUB | DMUL | DDIV | DREM, _) => {
                self.pop_many(4);
                self.push(AbstractType::DOUBLE);
                self.push(AbstractType::TOP);
            }
            (LSHL | LSHR | LUSHR, _) => {
                self.pop_many(3);
                self.push(AbstractType::LONG);
                self.push(AbstractType::TOP);
            }
            (IINC, Operand::Var(var)) => self.set_local(var as usize, AbstractType::INTEGER),
            (I2L | F2L, _) => {
                self.pop_many(1);
                self.push(AbstractType::LONG);
                self.push(AbstractType::TOP);
            }
            (I2F, _) => {
                self.pop_many(1);
                self.push(AbstractType::FLOAT);
            }
            (I2D | F2D, _) => {
                self.pop_many(1);
                self.push(AbstractType::DOUBLE);
                self.push(AbstractType::TOP);
            }
            (F2I | ARRAYLENGTH | INSTANCEOF, _) => {
                self.pop_many(1);
                self.push(AbstractType::INTEGER);
            }
            (LCMP | DCMPL | DCMPG, _) => {
                self.pop_many(4);
                self.push(AbstractType::INTEGER);
            }
            (JSR | RET, _) => return Err(Error::SubroutinesUnsupported { opcode }),
            (GETSTATIC, Operand::Member { descriptor, .. }) => {
                self.push_descriptor(symbols, descriptor)?
            }
            (PUTSTATIC, Operand::Member { descriptor, .. }) => self.pop_descriptor(descriptor)?,
            (GETFIELD, Operand::Member { descriptor, .. }) => {
                self.pop_many(1);
                self.push_descriptor(symbols, descriptor)?;
            }
            (PUTFIELD, Operand::Member { descriptor, .. }) => {
                self.pop_descriptor(descriptor)?;
                self.pop();
            }
            (
                INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE,
                Operand::Member { name, descriptor },
            ) => {
                self.pop_descriptor(descriptor)?;
                if opcode != INVOKESTATIC {
                    let receiver = self.pop();
                    if opcode == INVOKESPECIAL && name.starts_with('<') {
                        self.initializations.push(receiver);
                    }
                }
                self.push_descriptor(symbols, descriptor)?;
            }
            (INVOKEDYNAMIC, Operand::Member { descriptor, .. }) => {
                self.pop_descriptor(descriptor)?;
                self.push_descriptor(symbols, descriptor)?;
            }
            (
                NEW,
                Operand::New {
                    type_name,
                    bytecode_offset,
                },
            ) => {
                let index = symbols.add_uninitialized_type(type_name, bytecode_offset);
                self.push(AbstractType::uninitialized(index));
            }
            (NEWARRAY, Operand::ArrayType(array_type)) => {
                self.pop();
                let element = match array_type {
                    T_BOOLEAN => AbstractType::BOOLEAN,
                    T_CHAR => AbstractType::CHAR,
                    T_BYTE => AbstractType::BYTE,
                    T_SHORT => AbstractType::SHORT,
                    T_INT => AbstractType::INTEGER,
                    T_FLOAT => AbstractType::FLOAT,
                    T_DOUBLE => AbstractType::DOUBLE,
                    T_LONG => AbstractType::LONG,
                    _ => return Err(Error::InvalidFrame(format!("invalid array type {}", array_type))),
                };
                self.push(element.array_of());
            }
            (ANEWARRAY, Operand::Type(element_type)) => {
                self.pop();
                if element_type.starts_with('[') {
                    self.push_descriptor(symbols, &format!("[{}", element_type))?;
                } else {
                    let index = symbols.add_type(element_type);
                    self.push(AbstractType::reference(index).array_of());
                }
            }
            (CHECKCAST, Operand::Type(cast_type)) => {
                self.pop();
                if cast_type.starts_with('[') {
                    self.push_descriptor(symbols, cast_type)?;
                } else {
                    self.push_class(symbols, cast_type);
                }
            }
            (
                MULTIANEWARRAY,
                Operand::MultiArray {
                    descriptor,
                    dimensions,
                },
            ) => {
                self.pop_many(dimensions as usize);
                self.push_descriptor(symbols, descriptor)?;
            }
            (opcode, operand) => {
                return Err(Error::InvalidFrame(format!(
                    "cannot simulate opcode {} with operand {:?}",
                    opcode, operand
                )))
            }
        }
        Ok(())
    }

    fn push_class(&mut self, symbols: &mut SymbolTable, internal_name: &str) {
        let index = symbols.add_type(internal_name);
        self.push(AbstractType::reference(index));
    }

    /// After storing to `var`, a two-word value in `var - 1` is no longer valid
    fn invalidate_two_word_local(&mut self, var: u16) {
        if var == 0 {
            return;
        }
        let previous = self.get_local(var - 1);
        if previous.is_long_or_double() {
            self.set_local(var as usize - 1, AbstractType::TOP);
        } else if previous.kind() == LOCAL_KIND || previous.kind() == STACK_KIND {
            self.set_local(var as usize - 1, previous.with_top_if_long_or_double());
        }
    }

    /// Resolve a `LOCAL` or `STACK` placeholder against the input frame
    fn concrete_output_type(&self, typ: AbstractType, input_stack_size: usize) -> AbstractType {
        let base = match typ.kind() {
            LOCAL_KIND => self.input_locals().get(typ.value() as usize).copied(),
            STACK_KIND => input_stack_size
                .checked_sub(typ.value() as usize)
                .and_then(|index| self.input_stack().get(index).copied()),
            _ => return typ,
        };
        let concrete = base.unwrap_or(AbstractType::TOP).add_dimensions(typ.dimensions());
        if typ.is_top_if_long_or_double() && concrete.is_long_or_double() {
            AbstractType::TOP
        } else {
            concrete
        }
    }

    /// Merge the output frame of this block into the input frame of a successor
    ///
    /// For an exception edge, `catch_type` is the type of the caught exception: the successor
    /// then sees the locals at any point of this block (input or output) and only the
    /// exception on the stack. Returns whether the input frame of `successor` changed.
    ///
    /// The input stack of `successor` gets its size from the first merge into it. Any later
    /// merge bringing a stack of a different height is an error, since the code could not
    /// pass verification.
    pub fn merge(
        &self,
        symbols: &mut SymbolTable,
        hierarchy: &dyn ClassHierarchy,
        successor: &mut Frame,
        catch_type: Option<AbstractType>,
    ) -> Result<bool, Error> {
        let mut changed = false;
        let input_locals = self.input_locals();
        let input_stack = self.input_stack();
        let num_local = input_locals.len();
        let num_stack = input_stack.len();

        if successor.input_locals.is_none() {
            successor.input_locals = Some(vec![AbstractType::UNSET; num_local]);
            changed = true;
        }
        let successor_locals = successor.input_locals.get_or_insert_with(Vec::new);
        if successor_locals.len() < num_local {
            successor_locals.resize(num_local, AbstractType::UNSET);
        }

        for i in 0..num_local {
            let mut concrete = match self.output_locals.get(i) {
                Some(output) if !output.is_unset() => self.concrete_output_type(*output, num_stack),
                _ => input_locals[i],
            };
            if !self.initializations.is_empty() {
                concrete = self.initialized_type(symbols, concrete);
            }
            changed |= merge_type(symbols, hierarchy, concrete, successor_locals, i);
        }

        if let Some(catch_type) = catch_type {
            for (i, local) in input_locals.iter().enumerate() {
                changed |= merge_type(symbols, hierarchy, *local, successor_locals, i);
            }
            let successor_stack = successor.input_stack.get_or_insert_with(|| {
                changed = true;
                vec![AbstractType::UNSET]
            });
            check_stack_height(successor_stack, 1)?;
            changed |= merge_type(symbols, hierarchy, catch_type, successor_stack, 0);
            return Ok(changed);
        }

        let num_input_stack = (num_stack as i32 + self.output_stack_start).max(0) as usize;
        let height = num_input_stack + self.output_stack.len();
        let successor_stack = successor.input_stack.get_or_insert_with(|| {
            changed = true;
            vec![AbstractType::UNSET; height]
        });
        check_stack_height(successor_stack, height)?;
        for (i, input) in input_stack.iter().take(num_input_stack).enumerate() {
            let mut concrete = *input;
            if !self.initializations.is_empty() {
                concrete = self.initialized_type(symbols, concrete);
            }
            changed |= merge_type(symbols, hierarchy, concrete, successor_stack, i);
        }
        for (i, output) in self.output_stack.iter().enumerate() {
            let mut concrete = self.concrete_output_type(*output, num_stack);
            if !self.initializations.is_empty() {
                concrete = self.initialized_type(symbols, concrete);
            }
            changed |= merge_type(symbols, hierarchy, concrete, successor_stack, num_input_stack + i);
        }
        Ok(changed)
    }

    /// Input frame in compressed form (`long` and `double` take one entry, and trailing `TOP`
    /// locals are dropped)
    pub fn compressed_input(&self) -> (Vec<AbstractType>, Vec<AbstractType>) {
        let input_locals = self.input_locals();
        let mut locals = Vec::with_capacity(input_locals.len());
        let mut num_local = 0;
        let mut i = 0;
        while i < input_locals.len() {
            let local = input_locals[i];
            locals.push(local);
            i += if local.is_long_or_double() { 2 } else { 1 };
            if local != AbstractType::TOP {
                num_local = locals.len();
            }
        }
        locals.truncate(num_local);
        (locals, compress_long_and_double(self.input_stack()))
    }
}

/// Descriptors of the arguments of a method descriptor
fn argument_descriptors(descriptor: &str) -> Result<Vec<&str>, Error> {
    let invalid = || Error::InvalidDescriptor(descriptor.to_string());
    let arguments = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(arguments, _)| arguments)
        .ok_or_else(invalid)?;
    let bytes = arguments.as_bytes();
    let mut descriptors = vec![];
    let mut start = 0;
    while start < bytes.len() {
        let mut end = start;
        while bytes.get(end) == Some(&b'[') {
            end += 1;
        }
        match bytes.get(end) {
            Some(b'L') => {
                let semicolon = arguments[end..].find(';').ok_or_else(invalid)?;
                end += semicolon + 1;
            }
            Some(_) => end += 1,
            None => return Err(invalid()),
        }
        descriptors.push(&arguments[start..end]);
        start = end;
    }
    Ok(descriptors)
}

/// Insert a `TOP` after every `long` and `double`, then pad with `TOP` up to `min_len`
fn expand_long_and_double(types: &[AbstractType], min_len: usize) -> Vec<AbstractType> {
    let mut expanded = Vec::with_capacity(types.len().max(min_len));
    for typ in types {
        expanded.push(*typ);
        if typ.is_long_or_double() {
            expanded.push(AbstractType::TOP);
        }
    }
    if expanded.len() < min_len {
        expanded.resize(min_len, AbstractType::TOP);
    }
    expanded
}

/// Drop the `TOP` following every `long` and `double`
fn compress_long_and_double(types: &[AbstractType]) -> Vec<AbstractType> {
    let mut compressed = Vec::with_capacity(types.len());
    let mut i = 0;
    while i < types.len() {
        compressed.push(types[i]);
        i += if types[i].is_long_or_double() { 2 } else { 1 };
    }
    compressed
}

fn check_stack_height(stack: &[AbstractType], height: usize) -> Result<(), Error> {
    if stack.len() == height {
        Ok(())
    } else {
        Err(Error::InvalidFrame(format!(
            "inconsistent stack height: {} entries, then {}",
            stack.len(),
            height
        )))
    }
}

/// Merge `source` into `destination[index]`, returning whether the destination changed
fn merge_type(
    symbols: &mut SymbolTable,
    hierarchy: &dyn ClassHierarchy,
    source: AbstractType,
    destination: &mut [AbstractType],
    index: usize,
) -> bool {
    let dst = destination[index];
    if dst == source {
        return false;
    }
    let mut src = source;
    if AbstractType::from_bits(source.bits() & !source.dimension_bits()) == AbstractType::NULL {
        if dst == AbstractType::NULL {
            return false;
        }
        src = AbstractType::NULL;
    }
    if dst.is_unset() {
        destination[index] = src;
        return true;
    }

    let merged = if dst.is_reference_or_array() {
        if src == AbstractType::NULL {
            return false;
        } else if src.dimension_and_kind_bits() == dst.dimension_and_kind_bits() {
            if dst.kind() == REFERENCE_KIND {
                let index = symbols.add_merged_type(src.value(), dst.value(), hierarchy);
                AbstractType::from_bits(src.dimension_bits() | REFERENCE_KIND | index as i32)
            } else {
                // Arrays of distinct primitive types (with the same number of dimensions)
                let object = symbols.add_type(OBJECT);
                AbstractType::reference(object).add_dimensions(src.dimensions() - 1)
            }
        } else if src.is_reference_or_array() {
            let element_dimensions = |typ: AbstractType| {
                if typ.dimensions() != 0 && typ.kind() != REFERENCE_KIND {
                    typ.dimensions() - 1
                } else {
                    typ.dimensions()
                }
            };
            let dimensions = element_dimensions(src).min(element_dimensions(dst));
            let object = symbols.add_type(OBJECT);
            AbstractType::reference(object).add_dimensions(dimensions)
        } else {
            AbstractType::TOP
        }
    } else if dst == AbstractType::NULL {
        if src.is_reference_or_array() {
            src
        } else {
            AbstractType::TOP
        }
    } else {
        AbstractType::TOP
    };

    if merged != dst {
        destination[index] = merged;
        true
    } else {
        false
    }
}

/// Write a concrete abstract type as a `verification_type_info`
pub(crate) fn put_abstract_type(
    symbols: &mut SymbolTable,
    typ: AbstractType,
    output: &mut ByteVector,
) -> Result<(), Error> {
    let dimensions = typ.dimensions();
    if dimensions == 0 {
        let value = typ.value();
        match typ.kind() {
            CONSTANT_KIND => {
                let tag = match value as i32 {
                    ITEM_BOOLEAN | ITEM_BYTE | ITEM_CHAR | ITEM_SHORT => ITEM_INTEGER,
                    other => other,
                };
                output.put_u8(tag as u8);
            }
            REFERENCE_KIND => {
                let name = symbols.type_name(value).to_string();
                let class = symbols.add_class(&name);
                output.put_12(ITEM_OBJECT as u8, class);
            }
            UNINITIALIZED_KIND => match symbols.type_entry(value) {
                Symbol::UninitializedType {
                    bytecode_offset, ..
                } => {
                    output.put_12(ITEM_UNINITIALIZED as u8, *bytecode_offset as u16);
                }
                other => {
                    return Err(Error::InvalidFrame(format!(
                        "not an uninitialized type: {:?}",
                        other
                    )))
                }
            },
            _ => return Err(Error::InvalidFrame(format!("unresolved type {:?}", typ))),
        }
    } else if dimensions > 0 {
        let mut descriptor = "[".repeat(dimensions as usize);
        if typ.kind() == REFERENCE_KIND {
            descriptor.push('L');
            descriptor.push_str(symbols.type_name(typ.value()));
            descriptor.push(';');
        } else {
            let element = match typ.value() as i32 {
                ITEM_BOOLEAN => 'Z',
                ITEM_BYTE => 'B',
                ITEM_CHAR => 'C',
                ITEM_SHORT => 'S',
                ITEM_INTEGER => 'I',
                ITEM_FLOAT => 'F',
                ITEM_LONG => 'J',
                ITEM_DOUBLE => 'D',
                _ => return Err(Error::InvalidFrame(format!("invalid array type {:?}", typ))),
            };
            descriptor.push(element);
        }
        let class = symbols.add_class(&descriptor);
        output.put_12(ITEM_OBJECT as u8, class);
    } else {
        return Err(Error::InvalidFrame(format!("negative array dimension {:?}", typ)));
    }
    Ok(())
}

/// Convert a verification type from a visited frame
///
/// `uninitialized` resolves the label of an uninitialized type into the bytecode offset of
/// its `NEW` instruction and the type being instantiated.
pub(crate) fn from_verification_type<F>(
    symbols: &mut SymbolTable,
    typ: &VerificationType,
    mut uninitialized: F,
) -> Result<AbstractType, Error>
where
    F: FnMut(Label) -> Result<(u32, String), Error>,
{
    Ok(match typ {
        VerificationType::Top => AbstractType::TOP,
        VerificationType::Integer => AbstractType::INTEGER,
        VerificationType::Float => AbstractType::FLOAT,
        VerificationType::Double => AbstractType::DOUBLE,
        VerificationType::Long => AbstractType::LONG,
        VerificationType::Null => AbstractType::NULL,
        VerificationType::UninitializedThis => AbstractType::UNINITIALIZED_THIS,
        VerificationType::Object(name) => AbstractType::from_internal_name(symbols, name)?,
        VerificationType::Uninitialized(label) => {
            let (offset, name) = uninitialized(*label)?;
            AbstractType::uninitialized(symbols.add_uninitialized_type(&name, offset))
        }
    })
}

#[cfg(test)]
mod frame_tests {
    use super::*;
    use crate::class_hierarchy::{KnownClassHierarchy, ObjectHierarchy};

    fn symbols() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols.set_major_version_and_class_name(52, "pkg/Foo");
        symbols
    }

    #[test]
    fn stack_high_water_mark() {
        let mut frame = Frame::new();
        frame.push(AbstractType::INTEGER);
        frame.push(AbstractType::INTEGER);
        frame.pop_many(2);
        frame.push(AbstractType::INTEGER);
        assert_eq!(frame.output_stack(), &[AbstractType::INTEGER]);
        assert_eq!(frame.output_stack_max(), 2);
    }

    #[test]
    fn popping_below_output_stack() {
        let mut frame = Frame::new();
        assert_eq!(frame.pop(), AbstractType::input_stack(1));
        assert_eq!(frame.pop(), AbstractType::input_stack(2));
        frame.push(AbstractType::FLOAT);
        assert_eq!(frame.output_stack(), &[AbstractType::FLOAT]);
        assert_eq!(frame.output_stack_max(), 0);
    }

    #[test]
    fn implicit_first_frame() {
        let mut symbols = symbols();
        let mut frame = Frame::new();
        frame
            .set_input_frame_from_descriptor(&mut symbols, false, false, "(J[ILjava/lang/String;)V", 6)
            .unwrap();
        let locals = frame.input_locals();
        assert_eq!(locals.len(), 6);
        assert_eq!(symbols.type_name(locals[0].value()), "pkg/Foo");
        assert_eq!(locals[1], AbstractType::LONG);
        assert_eq!(locals[2], AbstractType::TOP);
        assert_eq!(locals[3], AbstractType::INTEGER.array_of());
        assert_eq!(symbols.type_name(locals[4].value()), "java/lang/String");
        assert_eq!(locals[5], AbstractType::TOP);

        let mut constructor = Frame::new();
        constructor
            .set_input_frame_from_descriptor(&mut symbols, false, true, "()V", 1)
            .unwrap();
        assert_eq!(constructor.input_locals(), &[AbstractType::UNINITIALIZED_THIS]);

        // Trailing `TOP` locals are dropped and the `long` is compressed
        let (locals, stack) = frame.compressed_input();
        assert_eq!(locals.len(), 4);
        assert!(stack.is_empty());
    }

    #[test]
    fn execute_arithmetic_and_locals() {
        let mut symbols = symbols();
        let mut entry = Frame::new();
        entry
            .set_input_frame_from_descriptor(&mut symbols, true, false, "(IJ)V", 4)
            .unwrap();

        // iload 0; i2l; lload 1; ladd; lstore 1
        entry.execute(ILOAD, Operand::Var(0), &mut symbols).unwrap();
        entry.execute(I2L, Operand::None, &mut symbols).unwrap();
        entry.execute(LLOAD, Operand::Var(1), &mut symbols).unwrap();
        entry.execute(LADD, Operand::None, &mut symbols).unwrap();
        entry.execute(LSTORE, Operand::Var(1), &mut symbols).unwrap();
        assert_eq!(entry.output_stack_max(), 4);
        assert!(entry.output_stack().is_empty());

        let mut successor = Frame::new();
        assert!(entry.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap());
        assert_eq!(
            successor.input_locals(),
            &[
                AbstractType::INTEGER,
                AbstractType::LONG,
                AbstractType::TOP,
                AbstractType::TOP
            ]
        );
    }

    #[test]
    fn storing_over_half_of_a_long() {
        let mut symbols = symbols();
        let mut entry = Frame::new();
        entry
            .set_input_frame_from_descriptor(&mut symbols, true, false, "(J)V", 2)
            .unwrap();
        entry.execute(ICONST_0, Operand::None, &mut symbols).unwrap();
        entry.execute(ISTORE, Operand::Var(1), &mut symbols).unwrap();

        let mut successor = Frame::new();
        entry.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap();
        assert_eq!(successor.input_locals(), &[AbstractType::TOP, AbstractType::INTEGER]);
    }

    #[test]
    fn constructor_call_initializes_this() {
        let mut symbols = symbols();
        let mut entry = Frame::new();
        entry
            .set_input_frame_from_descriptor(&mut symbols, false, true, "()V", 1)
            .unwrap();
        entry.execute(ALOAD, Operand::Var(0), &mut symbols).unwrap();
        let init = Operand::Member {
            name: "<init>",
            descriptor: "()V",
        };
        entry.execute(INVOKESPECIAL, init, &mut symbols).unwrap();

        let mut successor = Frame::new();
        entry.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap();
        let this = successor.input_locals()[0];
        assert_eq!(this.kind(), REFERENCE_KIND);
        assert_eq!(symbols.type_name(this.value()), "pkg/Foo");
    }

    #[test]
    fn new_then_constructor() {
        let mut symbols = symbols();
        let mut entry = Frame::new();
        entry
            .set_input_frame_from_descriptor(&mut symbols, true, false, "()V", 0)
            .unwrap();
        let new = Operand::New {
            type_name: "java/lang/Object",
            bytecode_offset: 0,
        };
        entry.execute(NEW, new, &mut symbols).unwrap();
        entry.execute(DUP, Operand::None, &mut symbols).unwrap();
        let init = Operand::Member {
            name: "<init>",
            descriptor: "()V",
        };
        entry.execute(INVOKESPECIAL, init, &mut symbols).unwrap();
        assert_eq!(entry.output_stack().len(), 1);
        assert_eq!(entry.output_stack()[0].kind(), UNINITIALIZED_KIND);

        // The uninitialized type gets resolved when flowing into a successor
        let mut successor = Frame::new();
        entry.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap();
        let object = successor.input_stack()[0];
        assert_eq!(object.kind(), REFERENCE_KIND);
        assert_eq!(symbols.type_name(object.value()), "java/lang/Object");
    }

    #[test]
    fn two_word_store_into_last_local() {
        let mut symbols = symbols();
        let mut frame = Frame::new();
        frame.execute(LCONST_0, Operand::None, &mut symbols).unwrap();
        assert!(matches!(
            frame.execute(LSTORE, Operand::Var(u16::MAX), &mut symbols),
            Err(Error::InvalidFrame(_))
        ));

        frame.execute(DCONST_1, Operand::None, &mut symbols).unwrap();
        frame.execute(DSTORE, Operand::Var(u16::MAX - 1), &mut symbols).unwrap();
        frame.execute(FCONST_0, Operand::None, &mut symbols).unwrap();
        frame.execute(FSTORE, Operand::Var(u16::MAX), &mut symbols).unwrap();
    }

    #[test]
    fn inconsistent_stack_heights() {
        let mut symbols = symbols();
        let mut empty = Frame::new();
        empty.set_input_frame_from_api_format(&[], &[], 0);
        let mut pushing = Frame::new();
        pushing.set_input_frame_from_api_format(&[], &[], 0);
        pushing.execute(ICONST_0, Operand::None, &mut symbols).unwrap();

        let mut successor = Frame::new();
        assert!(empty.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap());
        assert!(matches!(
            pushing.merge(&mut symbols, &ObjectHierarchy, &mut successor, None),
            Err(Error::InvalidFrame(_))
        ));
        assert!(successor.input_stack().is_empty());

        // A block looping back onto itself with one more value on the stack
        assert!(matches!(
            pushing.clone().merge(&mut symbols, &ObjectHierarchy, &mut pushing, None),
            Err(Error::InvalidFrame(_))
        ));

        // Exception handlers always start with exactly the exception on the stack
        let throwable = AbstractType::reference(symbols.add_type("java/lang/Throwable"));
        assert!(matches!(
            empty.merge(&mut symbols, &ObjectHierarchy, &mut successor, Some(throwable)),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn subroutines_are_rejected() {
        let mut symbols = symbols();
        let mut frame = Frame::new();
        assert!(matches!(
            frame.execute(RET, Operand::Var(1), &mut symbols),
            Err(Error::SubroutinesUnsupported { opcode: RET })
        ));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut symbols = symbols();
        let mut source = Frame::new();
        source.set_input_frame_from_api_format(&[AbstractType::INTEGER], &[AbstractType::FLOAT], 1);
        let mut successor = Frame::new();
        assert!(source.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap());
        assert!(!source.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap());
        assert_eq!(successor.input_locals(), &[AbstractType::INTEGER]);
        assert_eq!(successor.input_stack(), &[AbstractType::FLOAT]);
    }

    #[test]
    fn merge_null_with_reference() {
        let mut symbols = symbols();
        let string = AbstractType::reference(symbols.add_type("java/lang/String"));

        let mut with_null = Frame::new();
        with_null.set_input_frame_from_api_format(&[AbstractType::NULL], &[], 1);
        let mut with_string = Frame::new();
        with_string.set_input_frame_from_api_format(&[string], &[], 1);

        let mut successor = Frame::new();
        with_null.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap();
        assert!(with_string.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap());
        assert_eq!(successor.input_locals(), &[string]);

        // Merging `null` again changes nothing
        assert!(!with_null.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap());
    }

    #[test]
    fn merge_to_common_super_class() {
        let mut symbols = symbols();
        let mut hierarchy = KnownClassHierarchy::new();
        hierarchy.insert("java/lang/Number", Some(OBJECT), &[], false);
        hierarchy.insert("java/lang/Integer", Some("java/lang/Number"), &[], false);
        hierarchy.insert("java/lang/Long", Some("java/lang/Number"), &[], false);

        let integer = AbstractType::reference(symbols.add_type("java/lang/Integer"));
        let long = AbstractType::reference(symbols.add_type("java/lang/Long"));
        let mut first = Frame::new();
        first.set_input_frame_from_api_format(&[integer, AbstractType::INTEGER], &[], 2);
        let mut second = Frame::new();
        second.set_input_frame_from_api_format(&[long, AbstractType::FLOAT], &[], 2);

        let mut successor = Frame::new();
        first.merge(&mut symbols, &hierarchy, &mut successor, None).unwrap();
        assert!(second.merge(&mut symbols, &hierarchy, &mut successor, None).unwrap());
        let merged = successor.input_locals();
        assert_eq!(symbols.type_name(merged[0].value()), "java/lang/Number");
        assert_eq!(merged[1], AbstractType::TOP);
    }

    #[test]
    fn merge_primitive_arrays() {
        let mut symbols = symbols();
        let ints = AbstractType::INTEGER.array_of();
        let floats = AbstractType::FLOAT.array_of();
        let mut first = Frame::new();
        first.set_input_frame_from_api_format(&[ints], &[], 1);
        let mut second = Frame::new();
        second.set_input_frame_from_api_format(&[floats], &[], 1);

        let mut successor = Frame::new();
        first.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap();
        second.merge(&mut symbols, &ObjectHierarchy, &mut successor, None).unwrap();
        let merged = successor.input_locals()[0];
        assert_eq!(merged.dimensions(), 0);
        assert_eq!(symbols.type_name(merged.value()), OBJECT);
    }

    #[test]
    fn exception_edge() {
        let mut symbols = symbols();
        let mut block = Frame::new();
        block.set_input_frame_from_api_format(&[AbstractType::INTEGER], &[AbstractType::INTEGER], 1);
        block.execute(FCONST_0, Operand::None, &mut symbols).unwrap();
        block.execute(FSTORE, Operand::Var(0), &mut symbols).unwrap();

        let throwable = AbstractType::reference(symbols.add_type("java/lang/Throwable"));
        let mut handler = Frame::new();
        block.merge(&mut symbols, &ObjectHierarchy, &mut handler, Some(throwable)).unwrap();

        // The local is `INTEGER` at the start and `FLOAT` at the end of the block
        assert_eq!(handler.input_locals(), &[AbstractType::TOP]);
        assert_eq!(handler.input_stack(), &[throwable]);
    }

    #[test]
    fn writing_abstract_types() {
        let mut symbols = symbols();
        let mut output = ByteVector::new();
        put_abstract_type(&mut symbols, AbstractType::INTEGER, &mut output).unwrap();
        let strings = AbstractType::from_descriptor(&mut symbols, "[Ljava/lang/String;").unwrap();
        put_abstract_type(&mut symbols, strings, &mut output).unwrap();
        let class = symbols.add_class("[Ljava/lang/String;");
        let bytes = output.as_slice();
        assert_eq!(bytes[0], ITEM_INTEGER as u8);
        assert_eq!(bytes[1], ITEM_OBJECT as u8);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), class);

        assert!(put_abstract_type(&mut symbols, AbstractType::input_local(0), &mut output).is_err());
    }

    #[test]
    fn method_arguments() {
        assert_eq!(
            argument_descriptors("(I[[JLjava/lang/String;D)V").unwrap(),
            vec!["I", "[[J", "Ljava/lang/String;", "D"]
        );
        assert!(argument_descriptors("(Ljava/lang/String)V").is_err());
        assert!(argument_descriptors("I").is_err());
    }
}
