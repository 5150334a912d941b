//! Field and method descriptors
//!
//! Class names inside descriptors are kept as plain internal names (eg. `java/lang/Object`).
//! Array types keep their whole descriptor (eg. `[Ljava/lang/String;`), since that is also how
//! the constant pool names them. The frame engine walks these to push and pop abstract types,
//! and the writer uses [`arguments_and_return_sizes`] to track stack sizes of invocations.

use crate::errors::Error;

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// Number of local variable or stack slots the type takes
    pub fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }

    pub fn from_descriptor_char(c: u8) -> Option<BaseType> {
        let typ = match c {
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'D' => BaseType::Double,
            b'F' => BaseType::Float,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'S' => BaseType::Short,
            b'Z' => BaseType::Boolean,
            _ => return None,
        };
        Some(typ)
    }
}

/// Type of a field, parameter, or return value
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),

    /// Internal name of a class
    Object(String),

    /// Array descriptor, which doubles as the internal name of the array class
    Array(String),
}

impl FieldType {
    pub fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Object(_) | FieldType::Array(_) => 1,
        }
    }

    /// Parse a complete field descriptor
    pub fn parse(descriptor: &str) -> Result<FieldType, Error> {
        let (field_type, end) = read_field_type(descriptor, 0)?;
        if end != descriptor.len() {
            return Err(invalid(descriptor, "unexpected leftover input"));
        }
        Ok(field_type)
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` is for `void` (ie. no return)
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor, Error> {
        if !descriptor.starts_with('(') {
            return Err(invalid(descriptor, "expected '(' for method"));
        }
        let mut parameters = vec![];
        let mut position = 1;
        loop {
            match descriptor.as_bytes().get(position) {
                Some(b')') => break,
                None => return Err(invalid(descriptor, "expected ')' for method")),
                Some(_) => {
                    let (parameter, end) = read_field_type(descriptor, position)?;
                    parameters.push(parameter);
                    position = end;
                }
            }
        }
        position += 1;

        let return_type = if &descriptor[position..] == "V" {
            None
        } else {
            let (return_type, end) = read_field_type(descriptor, position)?;
            if end != descriptor.len() {
                return Err(invalid(descriptor, "unexpected leftover input"));
            }
            Some(return_type)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(FieldType::width).sum::<usize>()
    }

    pub fn return_width(&self) -> usize {
        self.return_type.as_ref().map_or(0, FieldType::width)
    }
}

fn invalid(descriptor: &str, msg: &str) -> Error {
    Error::InvalidDescriptor(format!("{} in '{}'", msg, descriptor))
}

/// Read the field type starting at `start`, returning it along with the position right after
fn read_field_type(descriptor: &str, start: usize) -> Result<(FieldType, usize), Error> {
    let bytes = descriptor.as_bytes();
    let mut position = start;
    while bytes.get(position) == Some(&b'[') {
        position += 1;
    }
    let dimensions = position - start;
    if dimensions > 255 {
        return Err(invalid(descriptor, "array has more than 255 dimensions"));
    }

    let end = match bytes.get(position) {
        Some(b'L') => {
            let semicolon = descriptor[position..]
                .find(';')
                .ok_or_else(|| invalid(descriptor, "missing ';' after class name"))?;
            if semicolon == 1 {
                return Err(invalid(descriptor, "empty class name"));
            }
            position + semicolon + 1
        }
        Some(c) if BaseType::from_descriptor_char(*c).is_some() => position + 1,
        Some(_) => return Err(invalid(descriptor, "invalid field type character")),
        None => return Err(invalid(descriptor, "missing field type")),
    };

    let field_type = if dimensions > 0 {
        FieldType::Array(descriptor[start..end].to_string())
    } else if bytes[position] == b'L' {
        FieldType::Object(descriptor[position + 1..end - 1].to_string())
    } else {
        match BaseType::from_descriptor_char(bytes[position]) {
            Some(base_type) => FieldType::Base(base_type),
            None => return Err(invalid(descriptor, "invalid field type character")),
        }
    };
    Ok((field_type, end))
}

/// Argument and return sizes of a method descriptor, in slots
///
/// The argument size includes an implicit `this` slot, as does the JVM when it counts the
/// arguments of `invokeinterface`.
pub fn arguments_and_return_sizes(descriptor: &str) -> Result<(usize, usize), Error> {
    let method = MethodDescriptor::parse(descriptor)?;
    Ok((method.parameter_length(true), method.return_width()))
}

#[cfg(test)]
mod descriptors_tests {
    use super::*;

    #[test]
    fn field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Base(BaseType::Int));
        assert_eq!(FieldType::parse("Z").unwrap(), FieldType::Base(BaseType::Boolean));
        assert_eq!(
            FieldType::parse("Ljava/lang/Object;").unwrap(),
            FieldType::Object(String::from("java/lang/Object"))
        );
        assert_eq!(
            FieldType::parse("[[[D").unwrap(),
            FieldType::Array(String::from("[[[D"))
        );
        assert_eq!(
            FieldType::parse("[Ljava/lang/String;").unwrap(),
            FieldType::Array(String::from("[Ljava/lang/String;"))
        );
    }

    #[test]
    fn method_descriptors() {
        let method = MethodDescriptor::parse("(IDLjava/lang/Integer;[J)Ljava/lang/Object;").unwrap();
        assert_eq!(
            method.parameters,
            vec![
                FieldType::Base(BaseType::Int),
                FieldType::Base(BaseType::Double),
                FieldType::Object(String::from("java/lang/Integer")),
                FieldType::Array(String::from("[J")),
            ]
        );
        assert_eq!(
            method.return_type,
            Some(FieldType::Object(String::from("java/lang/Object")))
        );
        assert_eq!(method.parameter_length(false), 5);

        let void = MethodDescriptor::parse("()V").unwrap();
        assert!(void.parameters.is_empty());
        assert_eq!(void.return_type, None);
    }

    #[test]
    fn invalid_descriptors() {
        assert!(FieldType::parse("Ljava/lang/Object").is_err());
        assert!(FieldType::parse("L;").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("V").is_err());
        assert!(FieldType::parse("[").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
        assert!(MethodDescriptor::parse("()").is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(arguments_and_return_sizes("()V").unwrap(), (1, 0));
        assert_eq!(arguments_and_return_sizes("(JD[JLFoo;)J").unwrap(), (7, 2));
        assert_eq!(arguments_and_return_sizes("(I)Ljava/lang/String;").unwrap(), (2, 1));
    }
}
