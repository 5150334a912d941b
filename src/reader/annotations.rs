use super::ClassReader;
use crate::constants::{AnnotationValue, TypePath, TypePathStep, TypeReference};
use crate::errors::Error;
use crate::symbol_table::{
    CONSTANT_DOUBLE_TAG, CONSTANT_FLOAT_TAG, CONSTANT_INTEGER_TAG, CONSTANT_LONG_TAG,
};
use crate::visitor::{
    AnnotationVisitor, ClassVisitor, FieldVisitor, MethodVisitor, RecordComponentVisitor,
};

/// Anything that annotations and type annotations can be attached to
pub(super) trait AnnotationSink {
    fn annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>>;

    fn type_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>>;
}

macro_rules! annotation_sink {
    ($($visitor:ident),*) => {
        $(
            impl<'v> AnnotationSink for dyn $visitor + 'v {
                fn annotation(
                    &mut self,
                    descriptor: &str,
                    visible: bool,
                ) -> Option<Box<dyn AnnotationVisitor + '_>> {
                    self.visit_annotation(descriptor, visible)
                }

                fn type_annotation(
                    &mut self,
                    type_ref: TypeReference,
                    type_path: Option<&TypePath>,
                    descriptor: &str,
                    visible: bool,
                ) -> Option<Box<dyn AnnotationVisitor + '_>> {
                    self.visit_type_annotation(type_ref, type_path, descriptor, visible)
                }
            }
        )*
    };
}

annotation_sink!(ClassVisitor, FieldVisitor, MethodVisitor, RecordComponentVisitor);

/// Offsets of the annotation attributes found on a class, field, method or record component
#[derive(Default)]
pub(super) struct AnnotationAttributes {
    visible: Option<usize>,
    invisible: Option<usize>,
    visible_type: Option<usize>,
    invisible_type: Option<usize>,
}

impl AnnotationAttributes {
    /// Remember the attribute if it is one of the annotation attributes
    pub(super) fn record(&mut self, name: &str, offset: usize) -> bool {
        let slot = match name {
            "RuntimeVisibleAnnotations" => &mut self.visible,
            "RuntimeInvisibleAnnotations" => &mut self.invisible,
            "RuntimeVisibleTypeAnnotations" => &mut self.visible_type,
            "RuntimeInvisibleTypeAnnotations" => &mut self.invisible_type,
            _ => return false,
        };
        *slot = Some(offset);
        true
    }
}

/// Where a type annotation sits, beyond what its type reference says
pub(super) enum TypeAnnotationTarget {
    /// Class, field, method or exception parameter
    Member,

    /// Instruction at this bytecode offset
    Instruction(u16),

    /// Live ranges of a local variable, as `(start_pc, length, index)`
    LocalVariable(Vec<(u16, u16, u16)>),
}

pub(super) struct TypeAnnotation<'r> {
    /// Type reference, with the bytecode offsets masked out
    pub(super) type_ref: TypeReference,
    pub(super) type_path: Option<TypePath>,
    pub(super) target: TypeAnnotationTarget,
    pub(super) descriptor: &'r str,

    /// Offset of the `element_value_pairs`
    pub(super) values: usize,
}

impl<'a> ClassReader<'a> {
    /// Descriptor and element values offset of each entry in an `annotations` table, along
    /// with the offset right after the table
    pub(super) fn annotations(&self, offset: usize) -> Result<(Vec<(&str, usize)>, usize), Error> {
        let count = self.read_u16(offset)?;
        let mut current = offset + 2;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let descriptor = self.read_utf8(current)?;
            annotations.push((descriptor, current + 2));
            current = self.read_element_values(None, current + 2, true)?;
        }
        Ok((annotations, current))
    }

    /// Entries of a `RuntimeVisibleTypeAnnotations` or `RuntimeInvisibleTypeAnnotations`
    /// attribute
    pub(super) fn type_annotations(&self, offset: usize) -> Result<Vec<TypeAnnotation<'_>>, Error> {
        let count = self.read_u16(offset)?;
        let mut current = offset + 2;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let annotation = self.read_type_annotation(current)?;
            current = self.read_element_values(None, annotation.values, true)?;
            annotations.push(annotation);
        }
        Ok(annotations)
    }

    fn read_type_annotation(&self, offset: usize) -> Result<TypeAnnotation<'_>, Error> {
        let target_type = self.read_u8(offset)?;
        let target_info = self.read_u32(offset)?;
        let (type_ref, target, mut current) = match target_type {
            TypeReference::CLASS_TYPE_PARAMETER
            | TypeReference::METHOD_TYPE_PARAMETER
            | TypeReference::METHOD_FORMAL_PARAMETER => {
                (target_info & 0xFFFF_0000, TypeAnnotationTarget::Member, offset + 2)
            }
            TypeReference::FIELD | TypeReference::METHOD_RETURN | TypeReference::METHOD_RECEIVER => {
                (target_info & 0xFF00_0000, TypeAnnotationTarget::Member, offset + 1)
            }
            TypeReference::CLASS_EXTENDS
            | TypeReference::CLASS_TYPE_PARAMETER_BOUND
            | TypeReference::METHOD_TYPE_PARAMETER_BOUND
            | TypeReference::THROWS
            | TypeReference::EXCEPTION_PARAMETER => {
                (target_info & 0xFFFF_FF00, TypeAnnotationTarget::Member, offset + 3)
            }
            TypeReference::LOCAL_VARIABLE | TypeReference::RESOURCE_VARIABLE => {
                let count = self.read_u16(offset + 1)? as usize;
                let mut ranges = Vec::with_capacity(count);
                for i in 0..count {
                    let entry = offset + 3 + 6 * i;
                    ranges.push((
                        self.read_u16(entry)?,
                        self.read_u16(entry + 2)?,
                        self.read_u16(entry + 4)?,
                    ));
                }
                let target = TypeAnnotationTarget::LocalVariable(ranges);
                (target_info & 0xFF00_0000, target, offset + 3 + 6 * count)
            }
            TypeReference::INSTANCEOF
            | TypeReference::NEW
            | TypeReference::CONSTRUCTOR_REFERENCE
            | TypeReference::METHOD_REFERENCE => {
                let target = TypeAnnotationTarget::Instruction(self.read_u16(offset + 1)?);
                (target_info & 0xFF00_0000, target, offset + 3)
            }
            TypeReference::CAST
            | TypeReference::CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT
            | TypeReference::METHOD_INVOCATION_TYPE_ARGUMENT
            | TypeReference::CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT
            | TypeReference::METHOD_REFERENCE_TYPE_ARGUMENT => {
                let target = TypeAnnotationTarget::Instruction(self.read_u16(offset + 1)?);
                (target_info & 0xFF00_00FF, target, offset + 4)
            }
            _ => {
                return Err(Error::InvalidTypeAnnotationTarget {
                    target: target_type,
                    offset,
                })
            }
        };

        let path_length = self.read_u8(current)? as usize;
        let type_path = if path_length == 0 {
            None
        } else {
            let steps = (0..path_length)
                .map(|i| {
                    Ok(TypePathStep {
                        kind: self.read_u8(current + 1 + 2 * i)?,
                        type_argument_index: self.read_u8(current + 2 + 2 * i)?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            Some(TypePath { steps })
        };
        current += 1 + 2 * path_length;

        Ok(TypeAnnotation {
            type_ref: TypeReference(type_ref),
            type_path,
            target,
            descriptor: self.read_utf8(current)?,
            values: current + 2,
        })
    }

    /// Visit the annotations and type annotations of a class, field, method or record component
    pub(super) fn visit_annotations<S: AnnotationSink + ?Sized>(
        &self,
        sink: &mut S,
        attributes: &AnnotationAttributes,
    ) -> Result<(), Error> {
        for (offset, visible) in [(attributes.visible, true), (attributes.invisible, false)] {
            if let Some(offset) = offset {
                for (descriptor, values) in self.annotations(offset)?.0 {
                    let mut annotation = sink.annotation(descriptor, visible);
                    self.read_element_values(annotation.as_deref_mut(), values, true)?;
                }
            }
        }
        for (offset, visible) in [
            (attributes.visible_type, true),
            (attributes.invisible_type, false),
        ] {
            if let Some(offset) = offset {
                for annotation in self.type_annotations(offset)? {
                    let mut visitor = sink.type_annotation(
                        annotation.type_ref,
                        annotation.type_path.as_ref(),
                        annotation.descriptor,
                        visible,
                    );
                    self.read_element_values(visitor.as_deref_mut(), annotation.values, true)?;
                }
            }
        }
        Ok(())
    }

    /// Visit a `RuntimeVisibleParameterAnnotations` or `RuntimeInvisibleParameterAnnotations`
    /// attribute
    pub(super) fn read_parameter_annotations(
        &self,
        method: &mut (dyn MethodVisitor + '_),
        offset: usize,
        visible: bool,
    ) -> Result<(), Error> {
        let count = self.read_u8(offset)?;
        method.visit_annotable_parameter_count(count, visible)?;
        let mut current = offset + 1;
        for parameter in 0..count {
            let (annotations, end) = self.annotations(current)?;
            for (descriptor, values) in annotations {
                let mut annotation = method.visit_parameter_annotation(parameter, descriptor, visible);
                self.read_element_values(annotation.as_deref_mut(), values, true)?;
            }
            current = end;
        }
        Ok(())
    }

    /// Read `element_value_pairs` (when `named`) or the values of an array element value, and
    /// return the offset right after them
    ///
    /// The visitor is ended once all values have been visited. Without a visitor, the values
    /// are only skipped.
    pub(super) fn read_element_values(
        &self,
        mut visitor: Option<&mut (dyn AnnotationVisitor + '_)>,
        offset: usize,
        named: bool,
    ) -> Result<usize, Error> {
        let count = self.read_u16(offset)?;
        let mut current = offset + 2;
        for _ in 0..count {
            let name = if named {
                current += 2;
                Some(self.read_utf8(current - 2)?)
            } else {
                None
            };
            current = self.read_element_value(visitor.as_deref_mut(), current, name)?;
        }
        if let Some(visitor) = visitor {
            visitor.visit_end()?;
        }
        Ok(current)
    }

    /// Read one `element_value` and return the offset right after it
    pub(super) fn read_element_value(
        &self,
        visitor: Option<&mut (dyn AnnotationVisitor + '_)>,
        offset: usize,
        name: Option<&str>,
    ) -> Result<usize, Error> {
        let tag = self.read_u8(offset)?;
        let visitor = match visitor {
            Some(visitor) => visitor,
            None => return self.skip_element_value(tag, offset),
        };
        match tag {
            b'B' | b'C' | b'S' | b'Z' | b'I' | b'J' | b'F' | b'D' => {
                let value = self.read_element_constant(tag, offset + 1)?;
                visitor.visit(name, &value)?;
                Ok(offset + 3)
            }
            b's' => {
                let value = AnnotationValue::String(self.read_utf8(offset + 1)?.to_string());
                visitor.visit(name, &value)?;
                Ok(offset + 3)
            }
            b'c' => {
                let value = AnnotationValue::Class(self.read_utf8(offset + 1)?.to_string());
                visitor.visit(name, &value)?;
                Ok(offset + 3)
            }
            b'e' => {
                let descriptor = self.read_utf8(offset + 1)?;
                let value = self.read_utf8(offset + 3)?;
                visitor.visit_enum(name, descriptor, value)?;
                Ok(offset + 5)
            }
            b'@' => {
                let descriptor = self.read_utf8(offset + 1)?;
                let mut nested = visitor.visit_annotation(name, descriptor);
                self.read_element_values(nested.as_deref_mut(), offset + 3, true)
            }
            b'[' => {
                let mut nested = visitor.visit_array(name);
                self.read_element_values(nested.as_deref_mut(), offset + 1, false)
            }
            _ => Err(Error::InvalidElementValue { tag, offset }),
        }
    }

    fn skip_element_value(&self, tag: u8, offset: usize) -> Result<usize, Error> {
        match tag {
            b'B' | b'C' | b'S' | b'Z' | b'I' | b'J' | b'F' | b'D' | b's' | b'c' => Ok(offset + 3),
            b'e' => Ok(offset + 5),
            b'@' => self.read_element_values(None, offset + 3, true),
            b'[' => self.read_element_values(None, offset + 1, false),
            _ => Err(Error::InvalidElementValue { tag, offset }),
        }
    }

    /// Primitive element value whose constant index is stored at `offset`
    fn read_element_constant(&self, tag: u8, offset: usize) -> Result<AnnotationValue, Error> {
        let constant_tag = match tag {
            b'J' => CONSTANT_LONG_TAG,
            b'F' => CONSTANT_FLOAT_TAG,
            b'D' => CONSTANT_DOUBLE_TAG,
            _ => CONSTANT_INTEGER_TAG,
        };
        let entry = self.typed_entry(offset, constant_tag)?;
        let value = match tag {
            b'B' => AnnotationValue::Byte(self.read_i32(entry)? as i8),
            b'C' => AnnotationValue::Char(self.read_i32(entry)? as u16),
            b'S' => AnnotationValue::Short(self.read_i32(entry)? as i16),
            b'Z' => AnnotationValue::Boolean(self.read_i32(entry)? != 0),
            b'J' => AnnotationValue::Long(self.read_i64(entry)?),
            b'F' => AnnotationValue::Float(f32::from_bits(self.read_u32(entry)?)),
            b'D' => AnnotationValue::Double(f64::from_bits(self.read_i64(entry)? as u64)),
            _ => AnnotationValue::Int(self.read_i32(entry)?),
        };
        Ok(value)
    }
}
