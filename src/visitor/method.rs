use super::AnnotationVisitor;
use crate::access_flags::ParameterAccessFlags;
use crate::attribute::Attribute;
use crate::constants::{ConstantValue, Handle, TypePath, TypeReference};
use crate::errors::Error;
use crate::label::Label;
use crate::stack_map::StackMapFrame;

/// Range of code where a local variable has a given value (see `visit_local_variable_annotation`)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableRange {
    pub start: Label,
    pub end: Label,
    pub index: u16,
}

/// Visitor of a method
///
/// Instructions are identified by their raw opcode (see [`crate::opcodes`]). Loads and stores
/// always use the explicit index form (`ILOAD 2` and never `ILOAD_2`) and jumps use the short
/// form (`GOTO` and not `GOTO_W`): the writer picks the actual encoding. The only exception is
/// a reader expanding the writer's internal long jumps, which visits `GOTO_W` explicitly.
#[allow(unused_variables)]
pub trait MethodVisitor {
    fn visit_parameter(
        &mut self,
        name: Option<&str>,
        access: ParameterAccessFlags,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Default value of an annotation interface element
    ///
    /// The returned visitor expects exactly one `visit*` call, with no name.
    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_type_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    /// Number of parameters that can have annotations (which may be less than the number of
    /// parameters in the descriptor, for synthetic parameters)
    fn visit_annotable_parameter_count(
        &mut self,
        parameter_count: u8,
        visible: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        Ok(())
    }

    /// Start of the method body
    fn visit_code(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Stack map frame at the current position, which must be right before an instruction
    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        Ok(())
    }

    /// Instruction without operands
    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        Ok(())
    }

    /// `BIPUSH`, `SIPUSH` or `NEWARRAY`
    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        Ok(())
    }

    /// Local variable load, store, or `RET`
    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        Ok(())
    }

    /// `NEW`, `ANEWARRAY`, `CHECKCAST` or `INSTANCEOF`
    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_jump_insn(&mut self, opcode: u8, label: Label) -> Result<(), Error> {
        Ok(())
    }

    /// Marks the position of the next instruction
    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        Ok(())
    }

    fn visit_ldc_insn(&mut self, value: &ConstantValue) -> Result<(), Error> {
        Ok(())
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        min: i32,
        max: i32,
        default: Label,
        labels: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        labels: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_multi_anew_array_insn(
        &mut self,
        descriptor: &str,
        dimensions: u8,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Annotation on the type used by the previous instruction
    fn visit_insn_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    /// Exception handler (`exception_type` is `None` for `finally` blocks)
    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        exception_type: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Annotation on the exception type of the previous try-catch block
    fn visit_try_catch_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
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
        None
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
