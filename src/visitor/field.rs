use super::AnnotationVisitor;
use crate::attribute::Attribute;
use crate::constants::{TypePath, TypeReference};
use crate::errors::Error;

/// Visitor of a field
#[allow(unused_variables)]
pub trait FieldVisitor {
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

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Visitor of a record component
#[allow(unused_variables)]
pub trait RecordComponentVisitor {
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

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
