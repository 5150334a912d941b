//! Class writer
//!
//! [`ClassWriter`] is a [`ClassVisitor`] that records everything it is shown into byte
//! buffers, interning every name, descriptor and constant into its [`SymbolTable`] on the
//! way. The class file is only assembled in [`ClassWriter::to_bytes`], once the constant pool
//! can no longer grow.
//!
//! Fields, methods and record components are kept as an ordered list owned by the writer.
//! The nested visitors handed out by `visit_field`, `visit_method`, etc. borrow the last
//! element of that list (and the symbol table) for as long as they are alive.

mod annotation;
mod basic_block;
mod field;
mod method;
mod module;

use crate::access_flags::*;
use crate::attribute::Attribute;
use crate::byte_vector::{encode_modified_utf8, ByteVector};
use crate::class_hierarchy::{ClassHierarchy, ObjectHierarchy};
use crate::constants::{ConstantValue, TypePath, TypeReference};
use crate::errors::Error;
use crate::reader::{ClassReader, ReaderOptions};
use crate::symbol_table::SymbolTable;
use crate::visitor::*;
use crate::Version;
use annotation::Annotations;
use bitflags::bitflags;
use field::{FieldData, FieldWriter, RecordComponentData, RecordComponentWriter};
use method::{Compute, MethodData, MethodWriter};
use module::{ModuleData, ModuleWriter};
use std::collections::HashSet;
use std::io;
use std::mem;

bitflags! {
    /// What the class writer computes by itself
    pub struct WriterOptions: u32 {
        /// Compute the maximum stack size and number of locals of every method (the values
        /// passed to `visit_maxs` are ignored)
        const COMPUTE_MAXS = 0x1;

        /// Compute all stack map frames from scratch, along with the maximums (visited frames
        /// and the values passed to `visit_maxs` are ignored)
        const COMPUTE_FRAMES = 0x2;
    }
}

impl WriterOptions {
    fn compute(self) -> Compute {
        if self.contains(WriterOptions::COMPUTE_FRAMES) {
            Compute::AllFrames
        } else if self.contains(WriterOptions::COMPUTE_MAXS) {
            Compute::MaxStackAndLocal
        } else {
            Compute::Nothing
        }
    }
}

/// Attributes of a class, field, method, record component, or `Code` attribute
#[derive(Debug, Default)]
pub(crate) struct AttributeList {
    count: u16,
    bytes: ByteVector,
}

impl AttributeList {
    pub(crate) fn new() -> AttributeList {
        AttributeList::default()
    }

    pub(crate) fn put(&mut self, symbols: &mut SymbolTable, name: &str, body: &ByteVector) {
        let name = symbols.add_utf8(name);
        self.bytes
            .put_u16(name)
            .put_u32(body.len() as u32)
            .put_bytes(body.as_slice());
        self.count += 1;
    }

    /// Attribute whose body is a single constant pool index
    pub(crate) fn put_u16(&mut self, symbols: &mut SymbolTable, name: &str, value: u16) {
        let name = symbols.add_utf8(name);
        self.bytes.put_u16(name).put_u32(2).put_u16(value);
        self.count += 1;
    }

    pub(crate) fn put_empty(&mut self, symbols: &mut SymbolTable, name: &str) {
        let name = symbols.add_utf8(name);
        self.bytes.put_u16(name).put_u32(0);
        self.count += 1;
    }

    /// Attribute of a list of class constants, preceded by their count
    pub(crate) fn put_classes(&mut self, symbols: &mut SymbolTable, name: &str, classes: &[u16]) {
        let mut body = ByteVector::with_capacity(2 + 2 * classes.len());
        body.put_u16(classes.len() as u16);
        for class in classes {
            body.put_u16(*class);
        }
        self.put(symbols, name, &body);
    }

    pub(crate) fn put_custom(
        &mut self,
        symbols: &mut SymbolTable,
        attribute: &dyn Attribute,
    ) -> Result<(), Error> {
        let body = attribute.write(symbols)?;
        self.put(symbols, attribute.type_name(), &body);
        Ok(())
    }

    pub(crate) fn put_bootstrap_methods(&mut self, symbols: &mut SymbolTable) {
        if symbols.bootstrap_method_count() > 0 {
            symbols.put_bootstrap_methods(&mut self.bytes);
            self.count += 1;
        }
    }

    pub(crate) fn write_to(&self, output: &mut ByteVector) {
        output.put_u16(self.count).put_bytes(self.bytes.as_slice());
    }
}

/// Class visitor that produces a class file
///
/// ```
/// use classfile_codec::{ClassAccessFlags, ClassVisitor, ClassWriter, Version, WriterOptions};
///
/// let mut writer = ClassWriter::new(WriterOptions::COMPUTE_FRAMES);
/// writer.visit(
///     Version::JAVA8,
///     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
///     "Empty",
///     None,
///     Some("java/lang/Object"),
///     &[],
/// )?;
/// writer.visit_end()?;
/// let bytes = writer.to_bytes()?;
/// assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
/// # Ok::<(), classfile_codec::Error>(())
/// ```
pub struct ClassWriter {
    symbols: SymbolTable,
    hierarchy: Box<dyn ClassHierarchy>,
    compute: Compute,

    version: Version,
    access: ClassAccessFlags,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    signature: Option<u16>,
    source_file: Option<u16>,

    /// `SourceDebugExtension` content, in modified UTF-8 (not length prefixed)
    debug_extension: Option<ByteVector>,
    enclosing_class: Option<u16>,
    enclosing_method: u16,

    inner_classes: ByteVector,
    inner_class_count: u16,
    inner_class_names: HashSet<u16>,

    nest_host: Option<u16>,
    nest_members: Vec<u16>,
    permitted_subclasses: Vec<u16>,
    annotations: Annotations,
    attributes: Vec<Box<dyn Attribute>>,
    module: Option<ModuleData>,
    record_components: Vec<RecordComponentData>,
    fields: Vec<FieldData>,
    methods: Vec<MethodData>,
}

impl ClassWriter {
    /// Writer with an empty constant pool, merging unrelated classes to `java/lang/Object`
    pub fn new(options: WriterOptions) -> ClassWriter {
        ClassWriter::with_hierarchy(options, Box::new(ObjectHierarchy))
    }

    /// Writer with an empty constant pool, consulting `hierarchy` when computing frames
    pub fn with_hierarchy(options: WriterOptions, hierarchy: Box<dyn ClassHierarchy>) -> ClassWriter {
        ClassWriter::with_symbols(SymbolTable::new(), hierarchy, options.compute())
    }

    /// Writer whose constant pool and bootstrap methods start as a copy of those of `reader`
    ///
    /// Constants keep their indices, so attributes copied as raw bytes stay valid, and a class
    /// that is only slightly transformed gets written much faster.
    pub fn from_reader(reader: &ClassReader<'_>, options: WriterOptions) -> Result<ClassWriter, Error> {
        let symbols = SymbolTable::from_reader(reader)?;
        Ok(ClassWriter::with_symbols(
            symbols,
            Box::new(ObjectHierarchy),
            options.compute(),
        ))
    }

    fn with_symbols(
        symbols: SymbolTable,
        hierarchy: Box<dyn ClassHierarchy>,
        compute: Compute,
    ) -> ClassWriter {
        ClassWriter {
            symbols,
            hierarchy,
            compute,
            version: Version::JAVA8,
            access: ClassAccessFlags::empty(),
            this_class: 0,
            super_class: 0,
            interfaces: vec![],
            signature: None,
            source_file: None,
            debug_extension: None,
            enclosing_class: None,
            enclosing_method: 0,
            inner_classes: ByteVector::new(),
            inner_class_count: 0,
            inner_class_names: HashSet::new(),
            nest_host: None,
            nest_members: vec![],
            permitted_subclasses: vec![],
            annotations: Annotations::default(),
            attributes: vec![],
            module: None,
            record_components: vec![],
            fields: vec![],
            methods: vec![],
        }
    }

    /// Replace the class hierarchy used when computing frames
    pub fn set_hierarchy(&mut self, hierarchy: Box<dyn ClassHierarchy>) {
        self.hierarchy = hierarchy;
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Intern constants directly (eg. for custom attributes)
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Serialize the class file
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut fields = ByteVector::new();
        for field in &self.fields {
            field.put(&mut self.symbols, &mut fields)?;
        }

        let mut methods = ByteVector::new();
        let mut has_frames = false;
        let mut has_asm_instructions = false;
        for method in &self.methods {
            let code_length = method.code_length();
            if code_length > 0xFFFF {
                return Err(Error::MethodCodeOverflow {
                    class_name: self.symbols.class_name().to_string(),
                    method_name: method.name_value.clone(),
                    descriptor: method.descriptor_value.clone(),
                    code_length,
                });
            }
            has_frames |= method.has_frames();
            has_asm_instructions |= method.has_asm_instructions;
            method.put(&mut self.symbols, &mut methods)?;
        }

        let attributes = self.class_attributes()?;

        if let Some(error) = self.symbols.take_error() {
            return Err(error);
        }
        let constant_pool_count = self.symbols.constant_pool_count() as usize;
        if constant_pool_count > 0xFFFF {
            return Err(Error::ConstantPoolOverflow {
                class_name: self.symbols.class_name().to_string(),
                constant_pool_count,
            });
        }

        let use_synthetic_attribute = !self.version.has_synthetic_flag();
        let mut output = ByteVector::with_capacity(
            24 + self.symbols.constant_pool_length()
                + 2 * self.interfaces.len()
                + fields.len()
                + methods.len(),
        );
        output
            .put_u32(0xCAFE_BABE)
            .put_u16(self.version.minor_version)
            .put_u16(self.version.major_version);
        self.symbols.put_constant_pool(&mut output);
        output
            .put_u16(class_file_access(self.access.bits(), use_synthetic_attribute))
            .put_u16(self.this_class)
            .put_u16(self.super_class)
            .put_u16(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            output.put_u16(*interface);
        }
        output
            .put_u16(self.fields.len() as u16)
            .put_bytes(fields.as_slice())
            .put_u16(self.methods.len() as u16)
            .put_bytes(methods.as_slice());
        attributes.write_to(&mut output);

        log::debug!(
            "wrote class {} ({} bytes, {} constants, {} fields, {} methods)",
            self.symbols.class_name(),
            output.len(),
            constant_pool_count - 1,
            self.fields.len(),
            self.methods.len()
        );

        if has_asm_instructions {
            self.replace_asm_instructions(output.into_vec(), has_frames)
        } else {
            Ok(output.into_vec())
        }
    }

    /// Serialize the class file into a writer
    pub fn write_to<W: io::Write>(&mut self, output: &mut W) -> Result<(), Error> {
        let bytes = self.to_bytes()?;
        output.write_all(&bytes)?;
        Ok(())
    }

    fn class_attributes(&mut self) -> Result<AttributeList, Error> {
        let symbols = &mut self.symbols;
        let mut attributes = AttributeList::new();

        if self.inner_class_count > 0 {
            let mut body = ByteVector::with_capacity(2 + self.inner_classes.len());
            body.put_u16(self.inner_class_count)
                .put_bytes(self.inner_classes.as_slice());
            attributes.put(symbols, "InnerClasses", &body);
        }
        if let Some(class) = self.enclosing_class {
            let mut body = ByteVector::with_capacity(4);
            body.put_u16(class).put_u16(self.enclosing_method);
            attributes.put(symbols, "EnclosingMethod", &body);
        }
        if !self.version.has_synthetic_flag() && self.access.contains(ClassAccessFlags::SYNTHETIC) {
            attributes.put_empty(symbols, "Synthetic");
        }
        if let Some(signature) = self.signature {
            attributes.put_u16(symbols, "Signature", signature);
        }
        if let Some(source_file) = self.source_file {
            attributes.put_u16(symbols, "SourceFile", source_file);
        }
        if let Some(debug_extension) = &self.debug_extension {
            attributes.put(symbols, "SourceDebugExtension", debug_extension);
        }
        if self.access.contains(ClassAccessFlags::DEPRECATED) {
            attributes.put_empty(symbols, "Deprecated");
        }
        self.annotations.put(symbols, &mut attributes);
        attributes.put_bootstrap_methods(symbols);
        if let Some(module) = &self.module {
            module.put(symbols, &mut attributes);
        }
        if let Some(nest_host) = self.nest_host {
            attributes.put_u16(symbols, "NestHost", nest_host);
        }
        if !self.nest_members.is_empty() {
            attributes.put_classes(symbols, "NestMembers", &self.nest_members);
        }
        if !self.permitted_subclasses.is_empty() {
            attributes.put_classes(symbols, "PermittedSubclasses", &self.permitted_subclasses);
        }
        if self.access.contains(ClassAccessFlags::RECORD) || !self.record_components.is_empty() {
            let mut body = ByteVector::new();
            body.put_u16(self.record_components.len() as u16);
            for component in &self.record_components {
                component.put(symbols, &mut body)?;
            }
            attributes.put(symbols, "Record", &body);
        }
        for attribute in &self.attributes {
            attributes.put_custom(symbols, attribute.as_ref())?;
        }
        Ok(attributes)
    }

    /// Re-read the class with the internal wide jump opcodes expanded, and write it again
    fn replace_asm_instructions(&mut self, bytes: Vec<u8>, has_frames: bool) -> Result<Vec<u8>, Error> {
        log::debug!(
            "rewriting {} to expand forward jumps past 32767 bytes",
            self.symbols.class_name()
        );
        let mut options = ReaderOptions::EXPAND_ASM_INSNS;
        let compute = if has_frames {
            options |= ReaderOptions::EXPAND_FRAMES;
            Compute::InsertedFrames
        } else {
            Compute::Nothing
        };

        let reader = ClassReader::new(&bytes)?;
        let symbols = SymbolTable::from_reader(&reader)?;
        let hierarchy = mem::replace(&mut self.hierarchy, Box::new(ObjectHierarchy));
        let mut writer = ClassWriter::with_symbols(symbols, hierarchy, compute);
        let result = reader
            .accept(&mut writer, options)
            .and_then(|()| writer.to_bytes());
        self.hierarchy = mem::replace(&mut writer.hierarchy, Box::new(ObjectHierarchy));
        result
    }
}

impl ClassVisitor for ClassWriter {
    fn visit(
        &mut self,
        version: Version,
        access: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) -> Result<(), Error> {
        self.version = version;
        self.access = access;
        self.this_class = self
            .symbols
            .set_major_version_and_class_name(version.major_version, name);
        self.signature = signature.map(|signature| self.symbols.add_utf8(signature));
        self.super_class = super_name.map_or(0, |super_name| self.symbols.add_class(super_name));
        self.interfaces = interfaces
            .iter()
            .map(|interface| self.symbols.add_class(interface))
            .collect();
        Ok(())
    }

    fn visit_source(&mut self, source: Option<&str>, debug: Option<&str>) -> Result<(), Error> {
        self.source_file = source.map(|source| self.symbols.add_utf8(source));
        self.debug_extension = debug.map(|debug| {
            let mut encoded = Vec::with_capacity(debug.len());
            encode_modified_utf8(debug, &mut encoded);
            let mut bytes = ByteVector::with_capacity(encoded.len());
            bytes.put_bytes(&encoded);
            bytes
        });
        Ok(())
    }

    fn visit_module(
        &mut self,
        name: &str,
        access: ModuleAccessFlags,
        version: Option<&str>,
    ) -> Option<Box<dyn ModuleVisitor + '_>> {
        let name = self.symbols.add_module(name);
        let version = version.map_or(0, |version| self.symbols.add_utf8(version));
        let module = self.module.insert(ModuleData::new(name, access, version));
        Some(Box::new(ModuleWriter {
            symbols: &mut self.symbols,
            module,
        }))
    }

    fn visit_nest_host(&mut self, nest_host: &str) -> Result<(), Error> {
        self.nest_host = Some(self.symbols.add_class(nest_host));
        Ok(())
    }

    fn visit_outer_class(
        &mut self,
        owner: &str,
        name: Option<&str>,
        descriptor: Option<&str>,
    ) -> Result<(), Error> {
        self.enclosing_class = Some(self.symbols.add_class(owner));
        self.enclosing_method = match (name, descriptor) {
            (Some(name), Some(descriptor)) => self.symbols.add_name_and_type(name, descriptor),
            _ => 0,
        };
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let writer = self
            .annotations
            .annotation(&mut self.symbols, descriptor, visible);
        Some(Box::new(writer))
    }

    fn visit_type_annotation(
        &mut self,
        type_ref: TypeReference,
        type_path: Option<&TypePath>,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let writer = self.annotations.type_annotation(
            &mut self.symbols,
            type_ref,
            type_path,
            descriptor,
            visible,
        );
        Some(Box::new(writer))
    }

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        self.attributes.push(attribute);
        Ok(())
    }

    fn visit_nest_member(&mut self, nest_member: &str) -> Result<(), Error> {
        let class = self.symbols.add_class(nest_member);
        self.nest_members.push(class);
        Ok(())
    }

    fn visit_permitted_subclass(&mut self, permitted_subclass: &str) -> Result<(), Error> {
        let class = self.symbols.add_class(permitted_subclass);
        self.permitted_subclasses.push(class);
        Ok(())
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccessFlags,
    ) -> Result<(), Error> {
        let class = self.symbols.add_class(name);
        if !self.inner_class_names.insert(class) {
            return Ok(());
        }
        let outer = outer_name.map_or(0, |outer_name| self.symbols.add_class(outer_name));
        let inner = inner_name.map_or(0, |inner_name| self.symbols.add_utf8(inner_name));
        self.inner_classes
            .put_u16(class)
            .put_u16(outer)
            .put_u16(inner)
            .put_u16(access.bits() as u16);
        self.inner_class_count += 1;
        Ok(())
    }

    fn visit_record_component(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
    ) -> Option<Box<dyn RecordComponentVisitor + '_>> {
        let name = self.symbols.add_utf8(name);
        let descriptor = self.symbols.add_utf8(descriptor);
        let signature = signature.map(|signature| self.symbols.add_utf8(signature));
        self.record_components
            .push(RecordComponentData::new(name, descriptor, signature));
        let component = self.record_components.last_mut()?;
        Some(Box::new(RecordComponentWriter {
            symbols: &mut self.symbols,
            component,
        }))
    }

    fn visit_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Option<Box<dyn FieldVisitor + '_>> {
        let name = self.symbols.add_utf8(name);
        let descriptor = self.symbols.add_utf8(descriptor);
        let signature = signature.map(|signature| self.symbols.add_utf8(signature));
        let constant_value = value.map(|value| self.symbols.add_constant(value));
        self.fields.push(FieldData::new(
            access,
            name,
            descriptor,
            signature,
            constant_value,
        ));
        let field = self.fields.last_mut()?;
        Some(Box::new(FieldWriter {
            symbols: &mut self.symbols,
            field,
        }))
    }

    fn visit_method(
        &mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[&str],
    ) -> Option<Box<dyn MethodVisitor + '_>> {
        let method = MethodData::new(
            &mut self.symbols,
            access,
            name,
            descriptor,
            signature,
            exceptions,
        );
        self.methods.push(method);
        let method = self.methods.last_mut()?;
        Some(Box::new(MethodWriter::new(
            &mut self.symbols,
            self.hierarchy.as_ref(),
            method,
            self.compute,
        )))
    }
}

#[cfg(test)]
mod class_writer_tests {
    use super::*;
    use crate::opcodes::*;

    fn empty_class(writer: &mut ClassWriter, version: Version) {
        writer
            .visit(
                version,
                ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                "Foo",
                None,
                Some("java/lang/Object"),
                &[],
            )
            .unwrap();
    }

    #[test]
    fn header_layout() {
        let mut writer = ClassWriter::new(WriterOptions::empty());
        empty_class(&mut writer, Version::JAVA8);
        writer.visit_end().unwrap();
        let bytes = writer.to_bytes().unwrap();
        let expected: Vec<u8> = [
            &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52][..],
            &[0, 5],
            &[1, 0, 3, b'F', b'o', b'o'],
            &[7, 0, 1],
            &[1, 0, 16],
            b"java/lang/Object",
            &[7, 0, 3],
            &[0, 0x21, 0, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0],
        ]
        .concat();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn inner_classes_are_deduplicated() {
        let mut writer = ClassWriter::new(WriterOptions::empty());
        empty_class(&mut writer, Version::JAVA8);
        for _ in 0..2 {
            writer
                .visit_inner_class(
                    "Foo$Bar",
                    Some("Foo"),
                    Some("Bar"),
                    InnerClassAccessFlags::STATIC,
                )
                .unwrap();
        }
        assert_eq!(writer.inner_class_count, 1);
    }

    #[test]
    fn oversized_methods_are_rejected() {
        let mut writer = ClassWriter::new(WriterOptions::empty());
        empty_class(&mut writer, Version::JAVA8);
        {
            let mut method = writer
                .visit_method(MethodAccessFlags::STATIC, "big", "()V", None, &[])
                .unwrap();
            method.visit_code().unwrap();
            for _ in 0..70_000 {
                method.visit_insn(NOP).unwrap();
            }
            method.visit_insn(RETURN).unwrap();
            method.visit_maxs(0, 0).unwrap();
            method.visit_end().unwrap();
        }
        match writer.to_bytes() {
            Err(Error::MethodCodeOverflow {
                method_name,
                code_length,
                ..
            }) => {
                assert_eq!(method_name, "big");
                assert_eq!(code_length, 70_001);
            }
            other => panic!("expected a code overflow, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn synthetic_attribute_before_java5() {
        let mut writer = ClassWriter::new(WriterOptions::empty());
        writer
            .visit(
                Version::JAVA1_4,
                ClassAccessFlags::SYNTHETIC,
                "Foo",
                None,
                Some("java/lang/Object"),
                &[],
            )
            .unwrap();
        let bytes = writer.to_bytes().unwrap();
        let access_offset = 10 + writer.symbols.constant_pool_length();
        assert_eq!(&bytes[access_offset..access_offset + 2], &[0, 0]);
        assert_eq!(writer.class_attributes().unwrap().count, 1);
    }
}
