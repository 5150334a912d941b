use super::AttributeList;
use crate::byte_vector::ByteVector;
use crate::constants::{AnnotationValue, TypePath, TypeReference};
use crate::errors::Error;
use crate::symbol_table::SymbolTable;
use crate::visitor::AnnotationVisitor;

/// Writes the `element_value_pairs` of an annotation, or the values of an array element
///
/// The writer appends directly to the buffer of the enclosing attribute. The number of values
/// written so far is patched in after each value, so nothing needs to happen when the visitor
/// is dropped.
pub(crate) struct AnnotationWriter<'a> {
    symbols: &'a mut SymbolTable,
    output: &'a mut ByteVector,

    /// Values are preceded by their element name (false inside arrays and default values)
    named: bool,

    /// Where the `num_element_value_pairs` (or `num_values`) is written
    count_offset: Option<usize>,
    count: u16,
}

impl<'a> AnnotationWriter<'a> {
    pub(crate) fn new(
        symbols: &'a mut SymbolTable,
        output: &'a mut ByteVector,
        named: bool,
        count_offset: Option<usize>,
    ) -> AnnotationWriter<'a> {
        AnnotationWriter {
            symbols,
            output,
            named,
            count_offset,
            count: 0,
        }
    }

    fn put_name(&mut self, name: Option<&str>) {
        self.count += 1;
        if let Some(offset) = self.count_offset {
            self.output.set_u16(offset, self.count);
        }
        if self.named {
            let name_index = self.symbols.add_utf8(name.unwrap_or(""));
            self.output.put_u16(name_index);
        }
    }

    fn nested(&mut self, named: bool) -> AnnotationWriter<'_> {
        let count_offset = self.output.len();
        self.output.put_u16(0);
        AnnotationWriter::new(&mut *self.symbols, &mut *self.output, named, Some(count_offset))
    }
}

impl<'a> AnnotationVisitor for AnnotationWriter<'a> {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) -> Result<(), Error> {
        self.put_name(name);
        let (tag, index) = match value {
            AnnotationValue::Byte(value) => (b'B', self.symbols.add_integer(*value as i32)),
            AnnotationValue::Char(value) => (b'C', self.symbols.add_integer(*value as i32)),
            AnnotationValue::Double(value) => (b'D', self.symbols.add_double(*value)),
            AnnotationValue::Float(value) => (b'F', self.symbols.add_float(*value)),
            AnnotationValue::Int(value) => (b'I', self.symbols.add_integer(*value)),
            AnnotationValue::Long(value) => (b'J', self.symbols.add_long(*value)),
            AnnotationValue::Short(value) => (b'S', self.symbols.add_integer(*value as i32)),
            AnnotationValue::Boolean(value) => (b'Z', self.symbols.add_integer(*value as i32)),
            AnnotationValue::String(value) => (b's', self.symbols.add_utf8(value)),
            AnnotationValue::Class(descriptor) => (b'c', self.symbols.add_utf8(descriptor)),
        };
        self.output.put_12(tag, index);
        Ok(())
    }

    fn visit_enum(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
        value: &str,
    ) -> Result<(), Error> {
        self.put_name(name);
        let type_name = self.symbols.add_utf8(descriptor);
        let const_name = self.symbols.add_utf8(value);
        self.output.put_122(b'e', type_name, const_name);
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.put_name(name);
        let type_index = self.symbols.add_utf8(descriptor);
        self.output.put_12(b'@', type_index);
        Some(Box::new(self.nested(true)))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.put_name(name);
        self.output.put_u8(b'[');
        Some(Box::new(self.nested(false)))
    }
}

/// Annotations of one kind (eg. runtime visible type annotations) on one element
#[derive(Default, Debug)]
pub(crate) struct AnnotationSet {
    count: u16,
    bytes: ByteVector,
}

impl AnnotationSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Start a new annotation, returning the writer of its element values
    pub(crate) fn add<'a>(
        &'a mut self,
        symbols: &'a mut SymbolTable,
        descriptor: &str,
    ) -> AnnotationWriter<'a> {
        self.count += 1;
        let type_index = symbols.add_utf8(descriptor);
        self.bytes.put_u16(type_index);
        let count_offset = self.bytes.len();
        self.bytes.put_u16(0);
        AnnotationWriter::new(symbols, &mut self.bytes, true, Some(count_offset))
    }

    /// Start a new type annotation whose target is not a local variable
    pub(crate) fn add_type_annotation<'a>(
        &'a mut self,
        symbols: &'a mut SymbolTable,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
    ) -> AnnotationWriter<'a> {
        put_target(type_ref, &mut self.bytes);
        put_type_path(type_path, &mut self.bytes);
        self.add(symbols, descriptor)
    }

    /// Start a new type annotation on a local variable, with resolved `(start, length, index)`
    /// ranges
    pub(crate) fn add_local_variable_annotation<'a>(
        &'a mut self,
        symbols: &'a mut SymbolTable,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        ranges: &[(u16, u16, u16)],
        descriptor: &str,
    ) -> AnnotationWriter<'a> {
        self.bytes.put_u8(type_ref.sort()).put_u16(ranges.len() as u16);
        for (start, length, index) in ranges {
            self.bytes.put_u16(*start).put_u16(*length).put_u16(*index);
        }
        put_type_path(type_path, &mut self.bytes);
        self.add(symbols, descriptor)
    }

    pub(crate) fn put(&self, symbols: &mut SymbolTable, name: &str, attributes: &mut AttributeList) {
        if self.is_empty() {
            return;
        }
        let mut body = ByteVector::with_capacity(2 + self.bytes.len());
        body.put_u16(self.count).put_bytes(self.bytes.as_slice());
        attributes.put(symbols, name, &body);
    }
}

/// The four annotation attributes that can appear on classes, fields, methods and record
/// components
#[derive(Default, Debug)]
pub(crate) struct Annotations {
    pub visible: AnnotationSet,
    pub invisible: AnnotationSet,
    pub visible_type: AnnotationSet,
    pub invisible_type: AnnotationSet,
}

impl Annotations {
    pub(crate) fn annotation<'a>(
        &'a mut self,
        symbols: &'a mut SymbolTable,
        descriptor: &str,
        visible: bool,
    ) -> AnnotationWriter<'a> {
        let set = if visible {
            &mut self.visible
        } else {
            &mut self.invisible
        };
        set.add(symbols, descriptor)
    }

    pub(crate) fn type_annotation<'a>(
        &'a mut self,
        symbols: &'a mut SymbolTable,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> AnnotationWriter<'a> {
        let set = if visible {
            &mut self.visible_type
        } else {
            &mut self.invisible_type
        };
        set.add_type_annotation(symbols, type_ref, type_path, descriptor)
    }

    pub(crate) fn put(&self, symbols: &mut SymbolTable, attributes: &mut AttributeList) {
        self.visible.put(symbols, "RuntimeVisibleAnnotations", attributes);
        self.invisible.put(symbols, "RuntimeInvisibleAnnotations", attributes);
        self.visible_type.put(symbols, "RuntimeVisibleTypeAnnotations", attributes);
        self.invisible_type.put(symbols, "RuntimeInvisibleTypeAnnotations", attributes);
    }
}

/// Annotations on the parameters of a method
#[derive(Debug)]
pub(crate) struct ParameterAnnotations {
    /// Number of parameters that can be annotated
    pub annotable_count: u8,
    pub parameters: Vec<AnnotationSet>,
}

impl ParameterAnnotations {
    pub(crate) fn new(annotable_count: u8) -> ParameterAnnotations {
        ParameterAnnotations {
            annotable_count,
            parameters: vec![],
        }
    }

    pub(crate) fn parameter(&mut self, parameter: u8) -> &mut AnnotationSet {
        let index = parameter as usize;
        if self.parameters.len() <= index {
            self.parameters.resize_with(index + 1, AnnotationSet::default);
        }
        if self.annotable_count <= parameter {
            self.annotable_count = parameter + 1;
        }
        &mut self.parameters[index]
    }

    pub(crate) fn put(&self, symbols: &mut SymbolTable, name: &str, attributes: &mut AttributeList) {
        let mut body = ByteVector::new();
        body.put_u8(self.annotable_count);
        for i in 0..self.annotable_count as usize {
            match self.parameters.get(i) {
                Some(set) => {
                    body.put_u16(set.count).put_bytes(set.bytes.as_slice());
                }
                None => {
                    body.put_u16(0);
                }
            }
        }
        attributes.put(symbols, name, &body);
    }
}

/// Write the `target_type` and `target_info` of a type annotation (except for local variable
/// targets, which have a table of ranges)
pub(crate) fn put_target(type_ref: TypeReference, output: &mut ByteVector) {
    let bits = type_ref.0;
    match type_ref.sort() {
        TypeReference::CLASS_TYPE_PARAMETER
        | TypeReference::METHOD_TYPE_PARAMETER
        | TypeReference::METHOD_FORMAL_PARAMETER => {
            output.put_u16((bits >> 16) as u16);
        }
        TypeReference::FIELD | TypeReference::METHOD_RETURN | TypeReference::METHOD_RECEIVER => {
            output.put_u8((bits >> 24) as u8);
        }
        TypeReference::CAST
        | TypeReference::CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT
        | TypeReference::METHOD_INVOCATION_TYPE_ARGUMENT
        | TypeReference::CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT
        | TypeReference::METHOD_REFERENCE_TYPE_ARGUMENT => {
            output.put_u32(bits);
        }
        _ => {
            output.put_12((bits >> 24) as u8, ((bits & 0x00FF_FF00) >> 8) as u16);
        }
    }
}

pub(crate) fn put_type_path(type_path: Option<&TypePath>, output: &mut ByteVector) {
    match type_path {
        None => {
            output.put_u8(0);
        }
        Some(path) => {
            output.put_u8(path.steps.len() as u8);
            for step in &path.steps {
                output.put_11(step.kind, step.type_argument_index);
            }
        }
    }
}

#[cfg(test)]
mod annotation_writer_tests {
    use super::*;

    #[test]
    fn element_counts_are_patched() {
        let mut symbols = SymbolTable::new();
        let mut set = AnnotationSet::default();
        {
            let mut annotation = set.add(&mut symbols, "LFoo;");
            annotation.visit(Some("a"), &AnnotationValue::Int(1)).unwrap();
            {
                let mut array = annotation.visit_array(Some("b")).unwrap();
                array.visit(None, &AnnotationValue::Boolean(true)).unwrap();
                array.visit(None, &AnnotationValue::Boolean(false)).unwrap();
            }
            annotation.visit_enum(Some("c"), "LE;", "X").unwrap();
        }
        let bytes = set.bytes.as_slice();
        assert_eq!(set.count, 1);
        // type index, then 3 element value pairs
        assert_eq!(&bytes[2..4], &[0, 3]);
        let a = symbols.add_utf8("a");
        let one = symbols.add_integer(1);
        assert_eq!(&bytes[4..9], &[(a >> 8) as u8, a as u8, b'I', (one >> 8) as u8, one as u8]);
        // the array has two values
        assert_eq!(&bytes[11..14], &[b'[', 0, 2]);
    }

    #[test]
    fn targets() {
        let mut bytes = ByteVector::new();
        put_target(TypeReference(0x1600_0000 | 2 << 16), &mut bytes);
        put_target(TypeReference::new(TypeReference::FIELD), &mut bytes);
        put_target(TypeReference(0x4700_0501), &mut bytes);
        put_target(TypeReference::exception_parameter(4), &mut bytes);
        assert_eq!(
            bytes.as_slice(),
            &[0x16, 2, 0x13, 0x47, 0, 5, 1, 0x42, 0, 4]
        );
    }
}
