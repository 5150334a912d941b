use super::AttributeList;
use crate::access_flags::ModuleAccessFlags;
use crate::byte_vector::ByteVector;
use crate::errors::Error;
use crate::symbol_table::SymbolTable;
use crate::visitor::ModuleVisitor;

/// Content of the `Module`, `ModulePackages` and `ModuleMainClass` attributes
#[derive(Debug)]
pub(crate) struct ModuleData {
    name: u16,
    access: u16,
    version: u16,
    requires: ByteVector,
    requires_count: u16,
    exports: ByteVector,
    exports_count: u16,
    opens: ByteVector,
    opens_count: u16,
    uses: ByteVector,
    uses_count: u16,
    provides: ByteVector,
    provides_count: u16,
    packages: ByteVector,
    packages_count: u16,
    main_class: Option<u16>,
}

impl ModuleData {
    pub(crate) fn new(name: u16, access: ModuleAccessFlags, version: u16) -> ModuleData {
        ModuleData {
            name,
            access: access.bits() as u16,
            version,
            requires: ByteVector::new(),
            requires_count: 0,
            exports: ByteVector::new(),
            exports_count: 0,
            opens: ByteVector::new(),
            opens_count: 0,
            uses: ByteVector::new(),
            uses_count: 0,
            provides: ByteVector::new(),
            provides_count: 0,
            packages: ByteVector::new(),
            packages_count: 0,
            main_class: None,
        }
    }

    pub(crate) fn put(&self, symbols: &mut SymbolTable, attributes: &mut AttributeList) {
        let mut body = ByteVector::new();
        body.put_u16(self.name)
            .put_u16(self.access)
            .put_u16(self.version)
            .put_u16(self.requires_count)
            .put_bytes(self.requires.as_slice())
            .put_u16(self.exports_count)
            .put_bytes(self.exports.as_slice())
            .put_u16(self.opens_count)
            .put_bytes(self.opens.as_slice())
            .put_u16(self.uses_count)
            .put_bytes(self.uses.as_slice())
            .put_u16(self.provides_count)
            .put_bytes(self.provides.as_slice());
        attributes.put(symbols, "Module", &body);

        if self.packages_count > 0 {
            let mut body = ByteVector::with_capacity(2 + self.packages.len());
            body.put_u16(self.packages_count)
                .put_bytes(self.packages.as_slice());
            attributes.put(symbols, "ModulePackages", &body);
        }
        if let Some(main_class) = self.main_class {
            attributes.put_u16(symbols, "ModuleMainClass", main_class);
        }
    }
}

pub(crate) struct ModuleWriter<'a> {
    pub(crate) symbols: &'a mut SymbolTable,
    pub(crate) module: &'a mut ModuleData,
}

impl<'a> ModuleWriter<'a> {
    /// Write a package, its flags, and the modules it is exported or opened to
    fn put_package_target(
        symbols: &mut SymbolTable,
        output: &mut ByteVector,
        package: &str,
        access: ModuleAccessFlags,
        modules: &[&str],
    ) {
        let package = symbols.add_package(package);
        output
            .put_u16(package)
            .put_u16(access.bits() as u16)
            .put_u16(modules.len() as u16);
        for module in modules {
            let module = symbols.add_module(module);
            output.put_u16(module);
        }
    }
}

impl<'a> ModuleVisitor for ModuleWriter<'a> {
    fn visit_main_class(&mut self, main_class: &str) -> Result<(), Error> {
        self.module.main_class = Some(self.symbols.add_class(main_class));
        Ok(())
    }

    fn visit_package(&mut self, package: &str) -> Result<(), Error> {
        let package = self.symbols.add_package(package);
        self.module.packages.put_u16(package);
        self.module.packages_count += 1;
        Ok(())
    }

    fn visit_require(
        &mut self,
        module: &str,
        access: ModuleAccessFlags,
        version: Option<&str>,
    ) -> Result<(), Error> {
        let module = self.symbols.add_module(module);
        let version = version.map_or(0, |version| self.symbols.add_utf8(version));
        self.module
            .requires
            .put_u16(module)
            .put_u16(access.bits() as u16)
            .put_u16(version);
        self.module.requires_count += 1;
        Ok(())
    }

    fn visit_export(
        &mut self,
        package: &str,
        access: ModuleAccessFlags,
        modules: &[&str],
    ) -> Result<(), Error> {
        ModuleWriter::put_package_target(
            self.symbols,
            &mut self.module.exports,
            package,
            access,
            modules,
        );
        self.module.exports_count += 1;
        Ok(())
    }

    fn visit_open(
        &mut self,
        package: &str,
        access: ModuleAccessFlags,
        modules: &[&str],
    ) -> Result<(), Error> {
        ModuleWriter::put_package_target(
            self.symbols,
            &mut self.module.opens,
            package,
            access,
            modules,
        );
        self.module.opens_count += 1;
        Ok(())
    }

    fn visit_use(&mut self, service: &str) -> Result<(), Error> {
        let service = self.symbols.add_class(service);
        self.module.uses.put_u16(service);
        self.module.uses_count += 1;
        Ok(())
    }

    fn visit_provide(&mut self, service: &str, providers: &[&str]) -> Result<(), Error> {
        let service = self.symbols.add_class(service);
        self.module
            .provides
            .put_u16(service)
            .put_u16(providers.len() as u16);
        for provider in providers {
            let provider = self.symbols.add_class(provider);
            self.module.provides.put_u16(provider);
        }
        self.module.provides_count += 1;
        Ok(())
    }
}
