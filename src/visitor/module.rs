use crate::access_flags::ModuleAccessFlags;
use crate::errors::Error;

/// Visitor of the module declaration of a `module-info` class
#[allow(unused_variables)]
pub trait ModuleVisitor {
    fn visit_main_class(&mut self, main_class: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_package(&mut self, package: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_require(
        &mut self,
        module: &str,
        access: ModuleAccessFlags,
        version: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_export(
        &mut self,
        package: &str,
        access: ModuleAccessFlags,
        modules: &[&str],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_open(
        &mut self,
        package: &str,
        access: ModuleAccessFlags,
        modules: &[&str],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_use(&mut self, service: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_provide(&mut self, service: &str, providers: &[&str]) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
