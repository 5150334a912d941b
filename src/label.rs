use std::fmt;
use std::hash::{Hash, Hasher};

/// Position inside a method body
///
/// Labels are opaque ids: they only acquire a bytecode offset once a method writer has seen
/// them in a `visit_label` call. Equality and hashing only look at the id.
///
/// A label that is only used by debug information (line numbers, local variable ranges) is
/// marked as debug-only. Such labels do not start a new basic block when frames are computed.
#[derive(Copy, Clone)]
pub struct Label {
    id: u32,
    debug_only: bool,
}

impl Label {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_debug_only(&self) -> bool {
        self.debug_only
    }

    /// Same label, but used by actual control flow
    pub(crate) fn for_code(self) -> Label {
        Label {
            debug_only: false,
            ..self
        }
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Label) -> bool {
        self.id == other.id
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.id))
    }
}

/// Generates fresh labels
///
/// Labels visited on the same method must all come from the same generator. Cloning does not
/// split the generator source: the cloned generator will produce the same sequence of labels as
/// the original.
#[derive(Clone, Default, Debug)]
pub struct LabelGenerator {
    next: u32,
}

impl LabelGenerator {
    pub fn new() -> LabelGenerator {
        LabelGenerator { next: 0 }
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> Label {
        let id = self.next;
        self.next += 1;
        Label {
            id,
            debug_only: false,
        }
    }

    /// Generate a fresh label for debug information only
    pub fn fresh_debug_label(&mut self) -> Label {
        Label {
            debug_only: true,
            ..self.fresh_label()
        }
    }
}

#[cfg(test)]
mod label_tests {
    use super::*;

    #[test]
    fn labels_are_fresh() {
        let mut generator = LabelGenerator::new();
        let l0 = generator.fresh_label();
        let l1 = generator.fresh_debug_label();
        assert_ne!(l0, l1);
        assert!(l1.is_debug_only());
        assert_eq!(l1, l1.for_code());
        assert!(!l1.for_code().is_debug_only());
        assert_eq!(format!("{:?}", l1), "l1");
    }
}
