//! Answers "what is the closest common super class of these two classes?"
//!
//! Computing stack map frames requires merging two reference types at control flow joins.
//! The codec itself knows nothing about classes other than the one being written, so this
//! question is delegated to a [`ClassHierarchy`].

use crate::access_flags::ClassAccessFlags;
use crate::errors::Error;
use crate::visitor::ClassVisitor;
use crate::Version;
use std::collections::{HashMap, HashSet};

pub const OBJECT: &str = "java/lang/Object";

pub trait ClassHierarchy {
    /// Internal name of the closest common super class of two classes
    ///
    /// Both arguments are internal names of classes (never array descriptors).
    fn common_super_class(&self, type1: &str, type2: &str) -> String;
}

/// Hierarchy where every pair of distinct classes merges to `java/lang/Object`
///
/// The resulting frames are only accepted by the verifier if the merged values are only ever
/// used as `java/lang/Object` afterwards.
#[derive(Copy, Clone, Debug, Default)]
pub struct ObjectHierarchy;

impl ClassHierarchy for ObjectHierarchy {
    fn common_super_class(&self, type1: &str, type2: &str) -> String {
        if type1 == type2 {
            type1.to_string()
        } else {
            OBJECT.to_string()
        }
    }
}

#[derive(Clone, Debug)]
struct ClassInfo {
    super_name: Option<String>,
    interfaces: Vec<String>,
    is_interface: bool,
}

/// Hierarchy built from declared classes
///
/// Classes are registered explicitly with [`KnownClassHierarchy::insert`], or by having a
/// class reader visit the hierarchy (only the class header is recorded). Classes that were
/// never registered are assumed to extend `java/lang/Object` directly.
#[derive(Clone, Debug, Default)]
pub struct KnownClassHierarchy {
    classes: HashMap<String, ClassInfo>,
}

impl KnownClassHierarchy {
    pub fn new() -> KnownClassHierarchy {
        KnownClassHierarchy::default()
    }

    pub fn insert(
        &mut self,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[&str],
        is_interface: bool,
    ) {
        let info = ClassInfo {
            super_name: super_name.map(str::to_string),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            is_interface,
        };
        self.classes.insert(name.to_string(), info);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    fn super_name<'a>(&'a self, name: &str) -> Option<&'a str> {
        match self.classes.get(name) {
            Some(info) => info.super_name.as_deref(),
            None if name == OBJECT => None,
            None => Some(OBJECT),
        }
    }

    fn is_interface(&self, name: &str) -> bool {
        self.classes.get(name).map_or(false, |info| info.is_interface)
    }

    /// Is `sub_type` assignable to `super_type`?
    ///
    /// This does a traversal of super types to determine assignability.
    pub fn is_assignable(&self, sub_type: &str, super_type: &str) -> bool {
        if super_type == OBJECT {
            return true;
        }
        let mut supertypes_to_visit: Vec<&str> = vec![sub_type];
        let mut dont_revisit: HashSet<&str> = HashSet::new();
        dont_revisit.insert(sub_type);

        // If the super type is a class, then skip visiting interfaces
        let super_is_class = !self.is_interface(super_type);

        while let Some(class_name) = supertypes_to_visit.pop() {
            if class_name == super_type {
                return true;
            }
            if let Some(superclass) = self.super_name(class_name) {
                if dont_revisit.insert(superclass) {
                    supertypes_to_visit.push(superclass);
                }
            }
            if !super_is_class {
                if let Some(info) = self.classes.get(class_name) {
                    for interface in &info.interfaces {
                        if dont_revisit.insert(interface) {
                            supertypes_to_visit.push(interface);
                        }
                    }
                }
            }
        }

        false
    }
}

impl ClassHierarchy for KnownClassHierarchy {
    fn common_super_class(&self, type1: &str, type2: &str) -> String {
        if self.is_assignable(type2, type1) {
            return type1.to_string();
        }
        if self.is_assignable(type1, type2) {
            return type2.to_string();
        }
        if self.is_interface(type1) || self.is_interface(type2) {
            return OBJECT.to_string();
        }

        // Walk up from `type1` until `type2` fits (this terminates at `java/lang/Object`)
        let mut current = type1;
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(superclass) = self.super_name(current) {
            if !seen.insert(superclass) {
                break;
            }
            if self.is_assignable(type2, superclass) {
                return superclass.to_string();
            }
            current = superclass;
        }
        OBJECT.to_string()
    }
}

impl ClassVisitor for KnownClassHierarchy {
    fn visit(
        &mut self,
        _version: Version,
        access: ClassAccessFlags,
        name: &str,
        _signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) -> Result<(), Error> {
        let is_interface = access.contains(ClassAccessFlags::INTERFACE);
        self.insert(name, super_name, interfaces, is_interface);
        Ok(())
    }
}

#[cfg(test)]
mod class_hierarchy_tests {
    use super::*;

    fn java_lang() -> KnownClassHierarchy {
        let mut hierarchy = KnownClassHierarchy::new();
        hierarchy.insert(OBJECT, None, &[], false);
        hierarchy.insert("java/lang/CharSequence", Some(OBJECT), &[], true);
        hierarchy.insert("java/lang/String", Some(OBJECT), &["java/lang/CharSequence"], false);
        hierarchy.insert("java/lang/Number", Some(OBJECT), &[], false);
        hierarchy.insert("java/lang/Integer", Some("java/lang/Number"), &[], false);
        hierarchy.insert("java/lang/Long", Some("java/lang/Number"), &[], false);
        hierarchy
    }

    #[test]
    fn transitive_classes() {
        let java = java_lang();
        assert!(java.is_assignable("java/lang/Integer", "java/lang/Number"));
        assert!(java.is_assignable("java/lang/Integer", OBJECT));
        assert!(!java.is_assignable("java/lang/Number", "java/lang/Integer"));
        assert!(!java.is_assignable(OBJECT, "java/lang/Integer"));
    }

    #[test]
    fn simple_interfaces() {
        let java = java_lang();
        assert!(java.is_assignable("java/lang/String", "java/lang/CharSequence"));
        assert!(!java.is_assignable("java/lang/CharSequence", "java/lang/String"));
    }

    #[test]
    fn common_super_classes() {
        let java = java_lang();
        assert_eq!(
            java.common_super_class("java/lang/Integer", "java/lang/Long"),
            "java/lang/Number"
        );
        assert_eq!(
            java.common_super_class("java/lang/Number", "java/lang/Integer"),
            "java/lang/Number"
        );
        assert_eq!(
            java.common_super_class("java/lang/Integer", "java/lang/String"),
            OBJECT
        );
        assert_eq!(
            java.common_super_class("java/lang/CharSequence", "java/lang/Integer"),
            OBJECT
        );
    }

    #[test]
    fn unknown_classes_extend_object() {
        let java = java_lang();
        assert_eq!(java.common_super_class("a/B", "a/C"), OBJECT);
        assert_eq!(ObjectHierarchy.common_super_class("a/B", "a/C"), OBJECT);
        assert_eq!(ObjectHierarchy.common_super_class("a/B", "a/B"), "a/B");
    }
}
