//! Visitor traits
//!
//! A class file is a strict sequence of visitor calls. The class reader produces them in this
//! order, and the class writer expects them in this order:
//!
//! ```text
//! visit
//! visit_source? visit_module? visit_nest_host? visit_outer_class?
//! (visit_annotation | visit_type_annotation | visit_attribute)*
//! (visit_nest_member | visit_permitted_subclass | visit_inner_class | visit_record_component
//!   | visit_field | visit_method)*
//! visit_end
//! ```
//!
//! Within a method:
//!
//! ```text
//! visit_parameter* visit_annotation_default?
//! (visit_annotation | visit_type_annotation | visit_parameter_annotation | visit_attribute)*
//! (visit_code (visit_frame | visit_*_insn | visit_label | visit_insn_annotation
//!   | visit_try_catch_block | visit_try_catch_annotation | visit_local_variable
//!   | visit_local_variable_annotation | visit_line_number)* visit_maxs)?
//! visit_end
//! ```
//!
//! Every method has a no-op default, so consumers only implement what they care about.
//! Factory methods (the ones returning nested visitors) default to `None`, which tells the
//! reader to skip the nested content entirely.
//!
//! Visitors are composed by wrapping: an adapter owns (or borrows) the next visitor in the
//! pipeline as a `&mut dyn ClassVisitor`, and forwards calls to it.

mod annotation;
mod class;
mod field;
mod method;
mod module;

pub use annotation::AnnotationVisitor;
pub use class::ClassVisitor;
pub use field::{FieldVisitor, RecordComponentVisitor};
pub use method::{LocalVariableRange, MethodVisitor};
pub use module::ModuleVisitor;
