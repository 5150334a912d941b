use super::annotation::Annotations;
use super::AttributeList;
use crate::access_flags::{class_file_access, FieldAccessFlags};
use crate::attribute::Attribute;
use crate::byte_vector::ByteVector;
use crate::constants::{TypePath, TypeReference};
use crate::errors::Error;
use crate::symbol_table::SymbolTable;
use crate::visitor::{AnnotationVisitor, FieldVisitor, RecordComponentVisitor};

/// Everything recorded about a field, with strings already interned
#[derive(Debug)]
pub(crate) struct FieldData {
    access: FieldAccessFlags,
    name: u16,
    descriptor: u16,
    signature: Option<u16>,
    constant_value: Option<u16>,
    annotations: Annotations,
    attributes: Vec<Box<dyn Attribute>>,
}

impl FieldData {
    pub(crate) fn new(
        access: FieldAccessFlags,
        name: u16,
        descriptor: u16,
        signature: Option<u16>,
        constant_value: Option<u16>,
    ) -> FieldData {
        FieldData {
            access,
            name,
            descriptor,
            signature,
            constant_value,
            annotations: Annotations::default(),
            attributes: vec![],
        }
    }

    /// Write the `field_info` structure
    pub(crate) fn put(&self, symbols: &mut SymbolTable, output: &mut ByteVector) -> Result<(), Error> {
        let use_synthetic_attribute = !symbols.version().has_synthetic_flag();
        output
            .put_u16(class_file_access(self.access.bits(), use_synthetic_attribute))
            .put_u16(self.name)
            .put_u16(self.descriptor);

        let mut attributes = AttributeList::new();
        if let Some(constant_value) = self.constant_value {
            attributes.put_u16(symbols, "ConstantValue", constant_value);
        }
        if use_synthetic_attribute && self.access.contains(FieldAccessFlags::SYNTHETIC) {
            attributes.put_empty(symbols, "Synthetic");
        }
        if let Some(signature) = self.signature {
            attributes.put_u16(symbols, "Signature", signature);
        }
        if self.access.contains(FieldAccessFlags::DEPRECATED) {
            attributes.put_empty(symbols, "Deprecated");
        }
        self.annotations.put(symbols, &mut attributes);
        for attribute in &self.attributes {
            attributes.put_custom(symbols, attribute.as_ref())?;
        }
        attributes.write_to(output);
        Ok(())
    }
}

pub(crate) struct FieldWriter<'a> {
    pub(crate) symbols: &'a mut SymbolTable,
    pub(crate) field: &'a mut FieldData,
}

impl<'a> FieldVisitor for FieldWriter<'a> {
    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let writer = self
            .field
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
        let writer = self.field.annotations.type_annotation(
            self.symbols,
            type_ref,
            type_path,
            descriptor,
            visible,
        );
        Some(Box::new(writer))
    }

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        self.field.attributes.push(attribute);
        Ok(())
    }
}

/// Everything recorded about a record component
#[derive(Debug)]
pub(crate) struct RecordComponentData {
    name: u16,
    descriptor: u16,
    signature: Option<u16>,
    annotations: Annotations,
    attributes: Vec<Box<dyn Attribute>>,
}

impl RecordComponentData {
    pub(crate) fn new(name: u16, descriptor: u16, signature: Option<u16>) -> RecordComponentData {
        RecordComponentData {
            name,
            descriptor,
            signature,
            annotations: Annotations::default(),
            attributes: vec![],
        }
    }

    /// Write the `record_component_info` structure
    pub(crate) fn put(&self, symbols: &mut SymbolTable, output: &mut ByteVector) -> Result<(), Error> {
        output.put_u16(self.name).put_u16(self.descriptor);
        let mut attributes = AttributeList::new();
        if let Some(signature) = self.signature {
            attributes.put_u16(symbols, "Signature", signature);
        }
        self.annotations.put(symbols, &mut attributes);
        for attribute in &self.attributes {
            attributes.put_custom(symbols, attribute.as_ref())?;
        }
        attributes.write_to(output);
        Ok(())
    }
}

pub(crate) struct RecordComponentWriter<'a> {
    pub(crate) symbols: &'a mut SymbolTable,
    pub(crate) component: &'a mut RecordComponentData,
}

impl<'a> RecordComponentVisitor for RecordComponentWriter<'a> {
    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let writer = self
            .component
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
        let writer = self.component.annotations.type_annotation(
            self.symbols,
            type_ref,
            type_path,
            descriptor,
            visible,
        );
        Some(Box::new(writer))
    }

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        self.component.attributes.push(attribute);
        Ok(())
    }
}
