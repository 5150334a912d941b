//! Reading, transforming, and writing JVM class files
//!
//! The crate is organized around the visitor traits in [`visitor`]: a [`ClassReader`] parses a
//! class file and drives a [`ClassVisitor`] through it, and a [`ClassWriter`] is a
//! [`ClassVisitor`] that builds a class file from the calls it receives. Anything in between
//! (an adapter forwarding to another visitor) is a transformation.
//!
//! The writer interns every constant into a [`SymbolTable`] and can compute the maximum stack
//! size, the number of locals, and the stack map frames of every method (see
//! [`WriterOptions`]). Frame computation needs to merge class types, which is what the
//! [`ClassHierarchy`] trait is for.
//!
//! ### Simple example
//!
//! ```
//! use classfile_codec::{ClassReader, ClassWriter, ReaderOptions, WriterOptions};
//! # use classfile_codec::{ClassAccessFlags, ClassVisitor, Error, Version};
//!
//! # fn build() -> Result<Vec<u8>, Error> {
//! #     let mut writer = ClassWriter::new(WriterOptions::empty());
//! #     writer.visit(
//! #         Version::JAVA8,
//! #         ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//! #         "Empty",
//! #         None,
//! #         Some("java/lang/Object"),
//! #         &[],
//! #     )?;
//! #     writer.visit_end()?;
//! #     writer.to_bytes()
//! # }
//! # fn main() -> Result<(), Error> {
//! # let original: Vec<u8> = build()?;
//! // Copy a class, recomputing all of its frames
//! let reader = ClassReader::new(&original)?;
//! let mut writer = ClassWriter::new(WriterOptions::COMPUTE_FRAMES);
//! reader.accept(&mut writer, ReaderOptions::SKIP_FRAMES)?;
//! let copy: Vec<u8> = writer.to_bytes()?;
//!
//! assert_eq!(ClassReader::new(&copy)?.class_name()?, "Empty");
//! # Ok(())
//! # }
//! ```

pub mod access_flags;
pub mod attribute;
pub mod byte_vector;
pub mod class_hierarchy;
pub mod constants;
pub mod descriptors;
pub mod errors;
pub mod frame;
pub mod label;
pub mod opcodes;
pub mod reader;
pub mod stack_map;
pub mod symbol_table;
pub mod version;
pub mod visitor;
pub mod writer;

pub use access_flags::*;
pub use attribute::{Attribute, AttributeReader, RawAttribute};
pub use class_hierarchy::{ClassHierarchy, KnownClassHierarchy, ObjectHierarchy};
pub use constants::{
    AnnotationValue, ConstantDynamic, ConstantValue, Handle, HandleKind, TypePath, TypePathStep,
    TypeReference,
};
pub use errors::Error;
pub use frame::{AbstractType, Frame};
pub use label::{Label, LabelGenerator};
pub use reader::{ClassReader, ReaderOptions};
pub use stack_map::{StackMapFrame, VerificationType};
pub use symbol_table::{Symbol, SymbolTable};
pub use version::Version;
pub use visitor::*;
pub use writer::{ClassWriter, WriterOptions};
