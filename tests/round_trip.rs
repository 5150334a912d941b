mod common;

use classfile_codec::opcodes::*;
use classfile_codec::*;
use common::{init_logging, trace};
use std::cell::Cell;

/// `public class Foo {}`, without any method (not even a constructor)
const EMPTY_CLASS: &[u8] = &[
    0xCA, 0xFE, 0xBA, 0xBE, // magic
    0x00, 0x00, 0x00, 0x34, // version 52.0
    0x00, 0x05, // constant pool count
    0x07, 0x00, 0x02, // #1 = Class #2
    0x01, 0x00, 0x03, b'F', b'o', b'o', // #2 = Utf8 "Foo"
    0x07, 0x00, 0x04, // #3 = Class #4
    0x01, 0x00, 0x10, b'j', b'a', b'v', b'a', b'/', b'l', b'a', b'n', b'g', b'/', b'O', b'b',
    b'j', b'e', b'c', b't', // #4 = Utf8 "java/lang/Object"
    0x00, 0x21, // public super
    0x00, 0x01, // this
    0x00, 0x03, // super
    0x00, 0x00, // interfaces
    0x00, 0x00, // fields
    0x00, 0x00, // methods
    0x00, 0x00, // attributes
];

/// A small class with a field, a constant, two methods, an annotation, and a custom attribute
fn counter_class(options: WriterOptions) -> Result<Vec<u8>, Error> {
    let mut writer = ClassWriter::new(options);
    writer.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "Counter",
        None,
        Some("java/lang/Object"),
        &["java/lang/Runnable"],
    )?;
    writer.visit_source(Some("Counter.java"), None)?;

    if let Some(mut annotation) = writer.visit_annotation("LMarker;", true) {
        annotation.visit(Some("since"), &AnnotationValue::String(String::from("1.0")))?;
        annotation.visit_enum(Some("level"), "LLevel;", "HIGH")?;
        if let Some(mut tags) = annotation.visit_array(Some("tags")) {
            tags.visit(None, &AnnotationValue::Int(1))?;
            tags.visit(None, &AnnotationValue::Int(2))?;
            tags.visit_end()?;
        }
        annotation.visit_end()?;
    }
    writer.visit_attribute(Box::new(RawAttribute {
        type_name: String::from("Custom"),
        content: vec![1, 2, 3],
        in_code: false,
    }))?;

    if let Some(mut field) = writer.visit_field(FieldAccessFlags::PRIVATE, "count", "I", None, None) {
        field.visit_end()?;
    }
    let limit = ConstantValue::Integer(10);
    let constant = FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL;
    if let Some(mut field) = writer.visit_field(constant, "LIMIT", "I", None, Some(&limit)) {
        field.visit_end()?;
    }

    if let Some(mut method) = writer.visit_method(MethodAccessFlags::PUBLIC, "run", "()V", None, &[]) {
        let mut labels = LabelGenerator::new();
        let start = labels.fresh_label();
        let end = labels.fresh_label();
        method.visit_code()?;
        method.visit_label(start)?;
        method.visit_line_number(3, start)?;
        method.visit_var_insn(ALOAD, 0)?;
        method.visit_var_insn(ALOAD, 0)?;
        method.visit_field_insn(GETFIELD, "Counter", "count", "I")?;
        method.visit_insn(ICONST_1)?;
        method.visit_insn(IADD)?;
        method.visit_field_insn(PUTFIELD, "Counter", "count", "I")?;
        method.visit_insn(RETURN)?;
        method.visit_label(end)?;
        method.visit_local_variable("this", "LCounter;", None, start, end, 0)?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }

    // static int sum(int n) { int total = 0; while (n > 0) { total += n; n--; } return total; }
    let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    if let Some(mut method) = writer.visit_method(access, "sum", "(I)I", None, &[]) {
        let mut labels = LabelGenerator::new();
        let head = labels.fresh_label();
        let done = labels.fresh_label();
        method.visit_code()?;
        method.visit_insn(ICONST_0)?;
        method.visit_var_insn(ISTORE, 1)?;
        method.visit_label(head)?;
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_jump_insn(IFLE, done)?;
        method.visit_var_insn(ILOAD, 1)?;
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_insn(IADD)?;
        method.visit_var_insn(ISTORE, 1)?;
        method.visit_iinc_insn(0, -1)?;
        method.visit_jump_insn(GOTO, head)?;
        method.visit_label(done)?;
        method.visit_var_insn(ILOAD, 1)?;
        method.visit_insn(IRETURN)?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }

    writer.visit_end()?;
    writer.to_bytes()
}

/// Read a class and write it back, starting from a copy of its constant pool
fn copy(bytes: &[u8], writer_options: WriterOptions, reader_options: ReaderOptions) -> Result<Vec<u8>, Error> {
    let reader = ClassReader::new(bytes)?;
    let mut writer = ClassWriter::from_reader(&reader, writer_options)?;
    reader.accept(&mut writer, reader_options)?;
    writer.to_bytes()
}

#[test]
fn empty_class() -> Result<(), Error> {
    init_logging();
    let reader = ClassReader::new(EMPTY_CLASS)?;
    assert_eq!(reader.version(), Version::JAVA8);
    assert_eq!(reader.class_name()?, "Foo");
    assert_eq!(reader.super_name()?, Some("java/lang/Object"));
    assert!(reader.interfaces()?.is_empty());

    assert_eq!(
        trace(EMPTY_CLASS, ReaderOptions::empty())?,
        vec![
            String::from("visit 52.0 0x0021 Foo None Some(\"java/lang/Object\") []"),
            String::from("visit_end"),
        ]
    );
    Ok(())
}

#[test]
fn empty_class_copies_exactly() -> Result<(), Error> {
    init_logging();
    let copied = copy(EMPTY_CLASS, WriterOptions::empty(), ReaderOptions::empty())?;
    assert_eq!(copied.as_slice(), EMPTY_CLASS);
    Ok(())
}

#[test]
fn truncated_class_is_rejected() {
    init_logging();
    for length in [0, 4, 9, 20, EMPTY_CLASS.len() - 1] {
        let result = ClassReader::new(&EMPTY_CLASS[..length])
            .and_then(|reader| reader.accept(&mut common::TraceVisitor::new(), ReaderOptions::empty()));
        assert!(result.is_err(), "accepted a class truncated to {} bytes", length);
    }
}

#[test]
fn written_class_reads_back() -> Result<(), Error> {
    init_logging();
    let bytes = counter_class(WriterOptions::COMPUTE_FRAMES)?;
    let events = trace(&bytes, ReaderOptions::empty())?;

    assert_eq!(
        events[0],
        "visit 52.0 0x0021 Counter None Some(\"java/lang/Object\") [\"java/lang/Runnable\"]"
    );
    assert_eq!(events[1], "source Some(\"Counter.java\") None");
    let expected_annotation = [
        "annotation LMarker; true",
        "value Some(\"since\") String(\"1.0\")",
        "enum Some(\"level\") LLevel; HIGH",
        "array Some(\"tags\")",
        "value None Int(1)",
        "value None Int(2)",
        "annotation_end",
        "annotation_end",
        "attribute Custom",
    ];
    assert_eq!(&events[2..11], &expected_annotation[..]);

    assert!(events.contains(&String::from("field 0x0002 count I None None")));
    assert!(events.contains(&String::from("field 0x0019 LIMIT I None Some(Integer(10))")));

    let run = events
        .iter()
        .position(|event| event == "method 0x0001 run()V None []")
        .expect("run method");
    let sum = events
        .iter()
        .position(|event| event == "method 0x0009 sum(I)I None []")
        .expect("sum method");
    assert!(run < sum);

    let run_events = &events[run..sum];
    assert_eq!(run_events[1], "code");
    assert!(run_events.iter().any(|event| event.starts_with("line 3 ")));
    assert!(run_events
        .iter()
        .any(|event| event == &format!("insn {} Counter.count:I", GETFIELD)));
    assert!(run_events
        .iter()
        .any(|event| event.starts_with("local_variable this LCounter; None ")));
    assert!(run_events.contains(&String::from("maxs 3 1")));
    assert!(!run_events.iter().any(|event| event.starts_with("frame")));

    let sum_events = &events[sum..];
    let frames: Vec<&String> = sum_events
        .iter()
        .filter(|event| event.starts_with("frame"))
        .collect();
    assert_eq!(
        frames,
        vec!["frame Append { locals: [Integer] }", "frame Same"]
    );
    assert!(sum_events.contains(&String::from("iinc 0 -1")));
    assert!(sum_events.contains(&String::from("maxs 2 2")));
    assert_eq!(events.last().map(String::as_str), Some("visit_end"));
    Ok(())
}

#[test]
fn copy_preserves_everything() -> Result<(), Error> {
    init_logging();
    let original = counter_class(WriterOptions::COMPUTE_FRAMES)?;
    let copied = copy(&original, WriterOptions::empty(), ReaderOptions::empty())?;
    assert_eq!(
        trace(&copied, ReaderOptions::empty())?,
        trace(&original, ReaderOptions::empty())?
    );
    Ok(())
}

#[test]
fn recomputed_frames_match() -> Result<(), Error> {
    init_logging();
    let original = counter_class(WriterOptions::COMPUTE_FRAMES)?;
    let copied = copy(&original, WriterOptions::COMPUTE_FRAMES, ReaderOptions::SKIP_FRAMES)?;
    assert_eq!(
        trace(&copied, ReaderOptions::empty())?,
        trace(&original, ReaderOptions::empty())?
    );
    Ok(())
}

#[test]
fn expanded_frames() -> Result<(), Error> {
    init_logging();
    let bytes = counter_class(WriterOptions::COMPUTE_FRAMES)?;
    let events = trace(&bytes, ReaderOptions::EXPAND_FRAMES)?;
    let frames: Vec<&String> = events
        .iter()
        .filter(|event| event.starts_with("frame"))
        .collect();
    assert_eq!(
        frames,
        vec![
            "frame New { locals: [Integer, Integer], stack: [] }",
            "frame New { locals: [Integer, Integer], stack: [] }",
        ]
    );

    // Expanded frames can be written back as is
    let copied = copy(&bytes, WriterOptions::empty(), ReaderOptions::EXPAND_FRAMES)?;
    assert_eq!(
        trace(&copied, ReaderOptions::empty())?,
        trace(&bytes, ReaderOptions::empty())?
    );
    Ok(())
}

#[test]
fn skip_options() -> Result<(), Error> {
    init_logging();
    let bytes = counter_class(WriterOptions::COMPUTE_FRAMES)?;

    let no_debug = trace(&bytes, ReaderOptions::SKIP_DEBUG)?;
    assert!(no_debug.contains(&String::from("code")));
    assert!(!no_debug.iter().any(|event| event.starts_with("source")
        || event.starts_with("line")
        || event.starts_with("local_variable")));

    let no_frames = trace(&bytes, ReaderOptions::SKIP_FRAMES)?;
    assert!(no_frames.contains(&String::from("maxs 2 2")));
    assert!(!no_frames.iter().any(|event| event.starts_with("frame")));

    let no_code = trace(&bytes, ReaderOptions::SKIP_CODE)?;
    assert!(no_code.contains(&String::from("method 0x0009 sum(I)I None []")));
    assert!(!no_code
        .iter()
        .any(|event| event == "code" || event.starts_with("insn") || event.starts_with("maxs")));
    Ok(())
}

/// Attribute reader counting how many attributes it interpreted
struct CountingReader {
    calls: Cell<usize>,
}

impl AttributeReader for CountingReader {
    fn type_name(&self) -> &str {
        "Custom"
    }

    fn read(
        &self,
        reader: &ClassReader<'_>,
        offset: usize,
        length: usize,
        code_offset: Option<usize>,
    ) -> Result<Box<dyn Attribute>, Error> {
        self.calls.set(self.calls.get() + 1);
        assert_eq!(code_offset, None);
        let content = reader.bytes()[offset..offset + length].to_vec();
        assert_eq!(content, vec![1, 2, 3]);
        Ok(Box::new(RawAttribute {
            type_name: String::from("Custom"),
            content,
            in_code: false,
        }))
    }
}

#[test]
fn custom_attribute_readers() -> Result<(), Error> {
    init_logging();
    let bytes = counter_class(WriterOptions::COMPUTE_FRAMES)?;
    let reader = ClassReader::new(&bytes)?;
    let counting = CountingReader {
        calls: Cell::new(0),
    };
    let mut visitor = common::TraceVisitor::new();
    reader.accept_with_attributes(&mut visitor, &[&counting], ReaderOptions::empty())?;
    assert_eq!(counting.calls.get(), 1);
    assert!(visitor.has("attribute Custom"));
    Ok(())
}

#[test]
fn copied_constant_pool_keeps_indices() -> Result<(), Error> {
    init_logging();
    let bytes = counter_class(WriterOptions::COMPUTE_FRAMES)?;
    let reader = ClassReader::new(&bytes)?;
    let this_class = reader.read_u16(reader.constant_pool_end() + 2)?;

    let mut symbols = SymbolTable::from_reader(&reader)?;
    let count = symbols.constant_pool_count();
    assert_eq!(symbols.add_class("Counter"), this_class);
    assert_eq!(symbols.add_utf8("Counter.java"), symbols.add_utf8("Counter.java"));
    assert_eq!(symbols.constant_pool_count(), count);

    let fresh = symbols.add_utf8("never seen before");
    assert_eq!(u32::from(fresh), count);
    Ok(())
}

#[test]
fn long_forward_jumps_are_rewritten() -> Result<(), Error> {
    init_logging();
    let mut writer = ClassWriter::new(WriterOptions::COMPUTE_FRAMES);
    writer.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "Padded",
        None,
        Some("java/lang/Object"),
        &[],
    )?;
    let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    if let Some(mut method) = writer.visit_method(access, "skip", "(I)V", None, &[]) {
        let mut labels = LabelGenerator::new();
        let end = labels.fresh_label();
        method.visit_code()?;
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_jump_insn(IFEQ, end)?;
        for _ in 0..40_000 {
            method.visit_insn(NOP)?;
        }
        method.visit_label(end)?;
        method.visit_insn(RETURN)?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    let bytes = writer.to_bytes()?;

    // `IFEQ end` became `IFNE next; GOTO_W end; next:`
    let events = trace(&bytes, ReaderOptions::empty())?;
    let jumps: Vec<&String> = events
        .iter()
        .filter(|event| event.starts_with("jump"))
        .collect();
    assert_eq!(jumps.len(), 2);
    assert!(jumps[0].starts_with(&format!("jump {} ", IFNE)));
    assert!(jumps[1].starts_with(&format!("jump {} ", GOTO)));

    let frames: Vec<&String> = events
        .iter()
        .filter(|event| event.starts_with("frame"))
        .collect();
    assert_eq!(frames, vec!["frame Same", "frame Same"]);
    Ok(())
}
