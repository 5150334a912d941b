//! Stack map frames, as they appear in visitor calls
//!
//! In frames, `long` and `double` values are a single entry (the implicit second `Top` slot is
//! not listed). This is also how the `StackMapTable` attribute lists them.

use crate::label::Label;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type: an internal class name, or an array descriptor
    Object(String),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    /// The label marks the `new` instruction.
    Uninitialized(Label),
}

impl VerificationType {
    /// The `tag` byte of the `verification_type_info` union
    pub fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => 0,
            VerificationType::Integer => 1,
            VerificationType::Float => 2,
            VerificationType::Double => 3,
            VerificationType::Long => 4,
            VerificationType::Null => 5,
            VerificationType::UninitializedThis => 6,
            VerificationType::Object(_) => 7,
            VerificationType::Uninitialized(_) => 8,
        }
    }

    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null
                | VerificationType::UninitializedThis
                | VerificationType::Object(_)
                | VerificationType::Uninitialized(_)
        )
    }

    /// Number of slots the type takes in locals or on the stack
    pub fn width(&self) -> usize {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }
}

/// Stack map frame
///
/// The compressed forms (`Full`, `Append`, `Chop`, `Same`, `Same1`) are relative to the
/// previous frame of the method. `New` is the expanded form: it always lists all locals and
/// stack entries. `Insert` is a request for the writer to compute the frame itself, which only
/// ever happens between the wide jump rewrites made by the class reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    New {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },

    /// Same as previous frame, with 1-3 extra locals and an empty stack
    Append { locals: Vec<VerificationType> },

    /// Same as previous frame, without the last 1-3 locals and with an empty stack
    Chop { count: u8 },

    /// Same locals as previous frame, empty stack
    Same,

    /// Same locals as previous frame, one stack entry
    Same1 { stack: VerificationType },

    Insert,
}

impl StackMapFrame {
    pub fn is_expanded(&self) -> bool {
        matches!(self, StackMapFrame::New { .. })
    }
}
