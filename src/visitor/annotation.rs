use crate::constants::AnnotationValue;
use crate::errors::Error;

/// Visitor of an annotation, or of an array of annotation element values
///
/// Element names are `None` inside arrays and for annotation default values.
#[allow(unused_variables)]
pub trait AnnotationVisitor {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) -> Result<(), Error> {
        Ok(())
    }

    fn visit_enum(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
        value: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
