use super::{
    AnnotationVisitor, FieldVisitor, MethodVisitor, ModuleVisitor, RecordComponentVisitor,
};
use crate::access_flags::*;
use crate::attribute::Attribute;
use crate::constants::{ConstantValue, TypePath, TypeReference};
use crate::errors::Error;
use crate::Version;

/// Visitor of a class
#[allow(unused_variables)]
pub trait ClassVisitor {
    /// Header of the class
    ///
    /// `super_name` is `None` only for `java/lang/Object` and for `module-info`.
    fn visit(
        &mut self,
        version: Version,
        access: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Source file name and `SourceDebugExtension` content
    fn visit_source(&mut self, source: Option<&str>, debug: Option<&str>) -> Result<(), Error> {
        Ok(())
    }

    fn visit_module(
        &mut self,
        name: &str,
        access: ModuleAccessFlags,
        version: Option<&str>,
    ) -> Option<Box<dyn ModuleVisitor + '_>> {
        None
    }

    fn visit_nest_host(&mut self, nest_host: &str) -> Result<(), Error> {
        Ok(())
    }

    /// Enclosing class of a local or anonymous class, and the enclosing method if there is one
    fn visit_outer_class(
        &mut self,
        owner: &str,
        name: Option<&str>,
        descriptor: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
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

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        Ok(())
    }

    fn visit_nest_member(&mut self, nest_member: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_permitted_subclass(&mut self, permitted_subclass: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccessFlags,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_record_component(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
    ) -> Option<Box<dyn RecordComponentVisitor + '_>> {
        None
    }

    fn visit_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Option<Box<dyn FieldVisitor + '_>> {
        None
    }

    fn visit_method(
        &mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> Option<Box<dyn MethodVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
