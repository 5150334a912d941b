use super::code::CodeLabels;
use super::ClassReader;
use crate::access_flags::MethodAccessFlags;
use crate::descriptors::{BaseType, FieldType, MethodDescriptor};
use crate::errors::Error;
use crate::stack_map::{StackMapFrame, VerificationType};

/// Where the frames of a method body are stored
pub(super) struct FrameTable {
    /// Offset of the `number_of_entries` item
    pub(super) offset: usize,
    pub(super) length: usize,

    /// `StackMapTable` (as opposed to the legacy `StackMap`)
    pub(super) compressed: bool,
}

/// Locals of the frame implied by a method's signature
pub(super) fn implicit_locals(
    class_name: &str,
    access: MethodAccessFlags,
    name: &str,
    descriptor: &str,
) -> Result<Vec<VerificationType>, Error> {
    let mut locals = vec![];
    if !access.contains(MethodAccessFlags::STATIC) {
        if name == "<init>" {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(class_name.to_string()));
        }
    }
    for parameter in MethodDescriptor::parse(descriptor)?.parameters {
        locals.push(match parameter {
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Base(_) => VerificationType::Integer,
            FieldType::Object(name) | FieldType::Array(name) => VerificationType::Object(name),
        });
    }
    Ok(locals)
}

impl<'a> ClassReader<'a> {
    /// Decode every frame of a method, along with the bytecode offset it applies to
    ///
    /// Compressed frames are turned into `New` frames when `expand` is set, starting from the
    /// implicit locals. Legacy frames always come out as `New` frames.
    pub(super) fn read_frames(
        &self,
        table: &FrameTable,
        expand: bool,
        implicit_locals: Vec<VerificationType>,
        labels: &mut CodeLabels,
    ) -> Result<Vec<(usize, StackMapFrame)>, Error> {
        let count = self.read_u16(table.offset)?;
        let mut current = table.offset + 2;
        let mut frames = Vec::with_capacity(count as usize);
        let mut locals = implicit_locals;
        let mut previous: i64 = -1;

        for _ in 0..count {
            let frame_offset = current;
            let (delta, frame) = if table.compressed {
                let frame_type = self.read_u8(current)?;
                current += 1;
                match frame_type {
                    0..=63 => (frame_type as i64, StackMapFrame::Same),
                    64..=127 => {
                        let (stack, next) = self.read_verification_type(current, labels)?;
                        current = next;
                        ((frame_type - 64) as i64, StackMapFrame::Same1 { stack })
                    }
                    128..=246 => {
                        return Err(Error::InvalidStackMapFrame {
                            frame_type,
                            offset: frame_offset,
                        })
                    }
                    _ => {
                        let delta = self.read_u16(current)? as i64;
                        current += 2;
                        let frame = match frame_type {
                            247 => {
                                let (stack, next) = self.read_verification_type(current, labels)?;
                                current = next;
                                StackMapFrame::Same1 { stack }
                            }
                            248..=250 => StackMapFrame::Chop {
                                count: 251 - frame_type,
                            },
                            251 => StackMapFrame::Same,
                            252..=254 => {
                                let (appended, next) = self.read_verification_types(
                                    current,
                                    (frame_type - 251) as usize,
                                    labels,
                                )?;
                                current = next;
                                StackMapFrame::Append { locals: appended }
                            }
                            _ => {
                                let (locals, next) = self.read_counted_verification_types(current, labels)?;
                                let (stack, next) = self.read_counted_verification_types(next, labels)?;
                                current = next;
                                StackMapFrame::Full { locals, stack }
                            }
                        };
                        (delta, frame)
                    }
                }
            } else {
                let offset = self.read_u16(current)? as i64;
                let (locals, next) = self.read_counted_verification_types(current + 2, labels)?;
                let (stack, next) = self.read_counted_verification_types(next, labels)?;
                current = next;
                (offset - previous - 1, StackMapFrame::Full { locals, stack })
            };

            let offset = previous + delta + 1;
            labels.code_label(offset, offset as usize)?;
            previous = offset;

            let frame = if expand || !table.compressed {
                expand_frame(&mut locals, frame)
            } else {
                frame
            };
            frames.push((offset as usize, frame));
        }

        if current > table.offset + table.length {
            return Err(Error::UnexpectedEof {
                offset: table.offset + table.length,
            });
        }
        Ok(frames)
    }

    /// Read one `verification_type_info` and return the offset right after it
    fn read_verification_type(
        &self,
        offset: usize,
        labels: &mut CodeLabels,
    ) -> Result<(VerificationType, usize), Error> {
        let tag = self.read_u8(offset)?;
        let verification_type = match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => {
                let class = self.read_class(offset + 1)?;
                return Ok((VerificationType::Object(class.to_string()), offset + 3));
            }
            8 => {
                let new_offset = self.read_u16(offset + 1)? as i64;
                let label = labels.code_label(new_offset, new_offset as usize)?;
                return Ok((VerificationType::Uninitialized(label), offset + 3));
            }
            _ => return Err(Error::InvalidVerificationType { tag, offset }),
        };
        Ok((verification_type, offset + 1))
    }

    fn read_verification_types(
        &self,
        offset: usize,
        count: usize,
        labels: &mut CodeLabels,
    ) -> Result<(Vec<VerificationType>, usize), Error> {
        let mut types = Vec::with_capacity(count);
        let mut current = offset;
        for _ in 0..count {
            let (verification_type, next) = self.read_verification_type(current, labels)?;
            types.push(verification_type);
            current = next;
        }
        Ok((types, current))
    }

    /// Verification types preceded by a `u16` count
    fn read_counted_verification_types(
        &self,
        offset: usize,
        labels: &mut CodeLabels,
    ) -> Result<(Vec<VerificationType>, usize), Error> {
        let count = self.read_u16(offset)? as usize;
        self.read_verification_types(offset + 2, count, labels)
    }
}

/// Apply a frame to the running locals and return its expanded form
fn expand_frame(locals: &mut Vec<VerificationType>, frame: StackMapFrame) -> StackMapFrame {
    let stack = match frame {
        StackMapFrame::Full {
            locals: full_locals,
            stack,
        } => {
            *locals = full_locals;
            stack
        }
        StackMapFrame::Append { locals: appended } => {
            locals.extend(appended);
            vec![]
        }
        StackMapFrame::Chop { count } => {
            let kept = locals.len().saturating_sub(count as usize);
            locals.truncate(kept);
            vec![]
        }
        StackMapFrame::Same => vec![],
        StackMapFrame::Same1 { stack } => vec![stack],
        StackMapFrame::New { locals: new_locals, stack } => {
            *locals = new_locals;
            stack
        }
        StackMapFrame::Insert => vec![],
    };
    StackMapFrame::New {
        locals: locals.clone(),
        stack,
    }
}

#[cfg(test)]
mod frames_tests {
    use super::*;

    #[test]
    fn implicit_frames() {
        let descriptor = "(IJ[Ljava/lang/String;LBaz;)V";
        let instance = implicit_locals("Foo", MethodAccessFlags::PUBLIC, "bar", descriptor).unwrap();
        assert_eq!(
            instance,
            vec![
                VerificationType::Object("Foo".to_string()),
                VerificationType::Integer,
                VerificationType::Long,
                VerificationType::Object("[Ljava/lang/String;".to_string()),
                VerificationType::Object("Baz".to_string()),
            ]
        );

        let constructor =
            implicit_locals("Foo", MethodAccessFlags::empty(), "<init>", "(ZF)V").unwrap();
        assert_eq!(
            constructor,
            vec![
                VerificationType::UninitializedThis,
                VerificationType::Integer,
                VerificationType::Float,
            ]
        );

        let static_method = implicit_locals("Foo", MethodAccessFlags::STATIC, "main", "(D)V").unwrap();
        assert_eq!(static_method, vec![VerificationType::Double]);
    }

    #[test]
    fn compressed_frames_expand() {
        let mut locals = vec![VerificationType::Integer];
        let append = StackMapFrame::Append {
            locals: vec![VerificationType::Long, VerificationType::Float],
        };
        assert_eq!(
            expand_frame(&mut locals, append),
            StackMapFrame::New {
                locals: vec![
                    VerificationType::Integer,
                    VerificationType::Long,
                    VerificationType::Float,
                ],
                stack: vec![],
            }
        );
        assert_eq!(
            expand_frame(&mut locals, StackMapFrame::Chop { count: 2 }),
            StackMapFrame::New {
                locals: vec![VerificationType::Integer],
                stack: vec![],
            }
        );
        assert_eq!(
            expand_frame(&mut locals, StackMapFrame::Same1 { stack: VerificationType::Null }),
            StackMapFrame::New {
                locals: vec![VerificationType::Integer],
                stack: vec![VerificationType::Null],
            }
        );
    }
}
