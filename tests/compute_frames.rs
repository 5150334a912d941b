mod common;

use classfile_codec::opcodes::*;
use classfile_codec::*;
use common::{init_logging, trace};

/// `static Animal pick(boolean dog) { return dog ? new Dog() : new Cat(); }`
fn pick_class(hierarchy: Box<dyn ClassHierarchy>) -> Result<Vec<u8>, Error> {
    let mut writer = ClassWriter::with_hierarchy(WriterOptions::COMPUTE_FRAMES, hierarchy);
    writer.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "Shelter",
        None,
        Some("java/lang/Object"),
        &[],
    )?;
    let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    if let Some(mut method) = writer.visit_method(access, "pick", "(Z)LAnimal;", None, &[]) {
        let mut labels = LabelGenerator::new();
        let cat = labels.fresh_label();
        let join = labels.fresh_label();
        method.visit_code()?;
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_jump_insn(IFEQ, cat)?;
        method.visit_type_insn(NEW, "Dog")?;
        method.visit_insn(DUP)?;
        method.visit_method_insn(INVOKESPECIAL, "Dog", "<init>", "()V", false)?;
        method.visit_jump_insn(GOTO, join)?;
        method.visit_label(cat)?;
        method.visit_type_insn(NEW, "Cat")?;
        method.visit_insn(DUP)?;
        method.visit_method_insn(INVOKESPECIAL, "Cat", "<init>", "()V", false)?;
        method.visit_label(join)?;
        method.visit_insn(ARETURN)?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    writer.to_bytes()
}

fn frames(bytes: &[u8], options: ReaderOptions) -> Result<Vec<String>, Error> {
    Ok(trace(bytes, options)?
        .into_iter()
        .filter(|event| event.starts_with("frame"))
        .collect())
}

#[test]
fn siblings_merge_to_their_parent() -> Result<(), Error> {
    init_logging();
    let mut hierarchy = KnownClassHierarchy::new();
    hierarchy.insert("Animal", Some("java/lang/Object"), &[], false);
    hierarchy.insert("Dog", Some("Animal"), &[], false);
    hierarchy.insert("Cat", Some("Animal"), &[], false);

    let bytes = pick_class(Box::new(hierarchy))?;
    assert_eq!(
        frames(&bytes, ReaderOptions::empty())?,
        vec![
            String::from("frame Same"),
            String::from("frame Same1 { stack: Object(\"Animal\") }"),
        ]
    );
    assert!(trace(&bytes, ReaderOptions::empty())?.contains(&String::from("maxs 2 1")));
    Ok(())
}

#[test]
fn unknown_classes_merge_to_object() -> Result<(), Error> {
    init_logging();
    let bytes = pick_class(Box::new(ObjectHierarchy))?;
    assert_eq!(
        frames(&bytes, ReaderOptions::empty())?,
        vec![
            String::from("frame Same"),
            String::from("frame Same1 { stack: Object(\"java/lang/Object\") }"),
        ]
    );
    Ok(())
}

#[test]
fn hierarchy_from_visited_classes() -> Result<(), Error> {
    init_logging();
    let mut hierarchy = KnownClassHierarchy::new();
    for (name, super_name) in [("Animal", "java/lang/Object"), ("Dog", "Animal"), ("Cat", "Animal")] {
        let mut writer = ClassWriter::new(WriterOptions::empty());
        writer.visit(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name,
            None,
            Some(super_name),
            &[],
        )?;
        writer.visit_end()?;
        let bytes = writer.to_bytes()?;
        ClassReader::new(&bytes)?.accept(&mut hierarchy, ReaderOptions::SKIP_CODE)?;
    }
    assert!(hierarchy.contains("Dog"));
    assert!(hierarchy.is_assignable("Cat", "Animal"));
    assert!(!hierarchy.is_assignable("Cat", "Dog"));

    let bytes = pick_class(Box::new(hierarchy))?;
    assert_eq!(
        frames(&bytes, ReaderOptions::empty())?.last().map(String::as_str),
        Some("frame Same1 { stack: Object(\"Animal\") }")
    );
    Ok(())
}

#[test]
fn uninitialized_values_across_branches() -> Result<(), Error> {
    init_logging();

    // static Object make(boolean b) { return new StringBuilder(b ? "yes" : "no"); }
    let mut writer = ClassWriter::new(WriterOptions::COMPUTE_FRAMES);
    writer.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "Maker",
        None,
        Some("java/lang/Object"),
        &[],
    )?;
    let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    if let Some(mut method) = writer.visit_method(access, "make", "(Z)Ljava/lang/Object;", None, &[]) {
        let mut labels = LabelGenerator::new();
        let no = labels.fresh_label();
        let join = labels.fresh_label();
        method.visit_code()?;
        method.visit_type_insn(NEW, "java/lang/StringBuilder")?;
        method.visit_insn(DUP)?;
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_jump_insn(IFEQ, no)?;
        method.visit_ldc_insn(&ConstantValue::String(String::from("yes")))?;
        method.visit_jump_insn(GOTO, join)?;
        method.visit_label(no)?;
        method.visit_ldc_insn(&ConstantValue::String(String::from("no")))?;
        method.visit_label(join)?;
        method.visit_method_insn(
            INVOKESPECIAL,
            "java/lang/StringBuilder",
            "<init>",
            "(Ljava/lang/String;)V",
            false,
        )?;
        method.visit_insn(ARETURN)?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    let bytes = writer.to_bytes()?;

    // Both frames carry the two uninitialized values, which point back at the `NEW`
    let events = trace(&bytes, ReaderOptions::EXPAND_FRAMES)?;
    let new_label = events
        .iter()
        .position(|event| event == &format!("insn {} java/lang/StringBuilder", NEW))
        .and_then(|index| events[..index].iter().rev().find(|event| event.starts_with("label ")))
        .map(|event| event["label ".len()..].to_string())
        .expect("label on NEW");
    let uninitialized = format!("Uninitialized({})", new_label);
    let frames: Vec<&String> = events
        .iter()
        .filter(|event| event.starts_with("frame"))
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames[0],
        &format!(
            "frame New {{ locals: [Integer], stack: [{0}, {0}] }}",
            uninitialized
        )
    );
    assert_eq!(
        frames[1],
        &format!(
            "frame New {{ locals: [Integer], stack: [{0}, {0}, Object(\"java/lang/String\")] }}",
            uninitialized
        )
    );
    Ok(())
}

/// Write a class with a single static method, whose code is emitted by `body`
fn single_method<F>(options: WriterOptions, descriptor: &str, body: F) -> Result<Vec<u8>, Error>
where
    F: FnOnce(&mut dyn MethodVisitor, &mut LabelGenerator) -> Result<(), Error>,
{
    let mut writer = ClassWriter::new(options);
    writer.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "Looper",
        None,
        Some("java/lang/Object"),
        &[],
    )?;
    let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    if let Some(mut method) = writer.visit_method(access, "spin", descriptor, None, &[]) {
        let mut labels = LabelGenerator::new();
        method.visit_code()?;
        body(&mut *method, &mut labels)?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    writer.to_bytes()
}

/// A loop whose body leaves a `float` behind on every iteration
fn leaky_loop(method: &mut dyn MethodVisitor, labels: &mut LabelGenerator) -> Result<(), Error> {
    let head = labels.fresh_label();
    method.visit_insn(ICONST_0)?;
    method.visit_var_insn(ISTORE, 1)?;
    method.visit_label(head)?;
    method.visit_var_insn(ILOAD, 0)?;
    method.visit_insn(FCONST_2)?;
    method.visit_var_insn(ILOAD, 1)?;
    method.visit_var_insn(ILOAD, 0)?;
    method.visit_insn(IADD)?;
    method.visit_var_insn(ISTORE, 1)?;
    method.visit_iinc_insn(0, -1)?;
    method.visit_jump_insn(GOTO, head)?;
    Ok(())
}

/// `L: ICONST_0; GOTO L`, where the loop head is also the start of the method
fn pushing_loop(method: &mut dyn MethodVisitor, labels: &mut LabelGenerator) -> Result<(), Error> {
    let head = labels.fresh_label();
    method.visit_label(head)?;
    method.visit_insn(ICONST_0)?;
    method.visit_jump_insn(GOTO, head)?;
    Ok(())
}

#[test]
fn growing_stack_in_loop_is_rejected() {
    init_logging();
    assert!(matches!(
        single_method(WriterOptions::COMPUTE_FRAMES, "(I)I", leaky_loop),
        Err(Error::InvalidFrame(_))
    ));
    assert!(matches!(
        single_method(WriterOptions::COMPUTE_FRAMES, "()V", pushing_loop),
        Err(Error::InvalidFrame(_))
    ));

    // Only max stack and locals are computed here, which does not check stack heights
    assert!(single_method(WriterOptions::COMPUTE_MAXS, "(I)I", leaky_loop).is_ok());
}

#[test]
fn balanced_loop_reaches_fixed_point() -> Result<(), Error> {
    init_logging();

    // The same loop, but with the float popped before jumping back
    let bytes = single_method(WriterOptions::COMPUTE_FRAMES, "(I)V", |method, labels| {
        let head = labels.fresh_label();
        method.visit_label(head)?;
        method.visit_insn(FCONST_2)?;
        method.visit_insn(POP)?;
        method.visit_iinc_insn(0, -1)?;
        method.visit_jump_insn(GOTO, head)?;
        Ok(())
    })?;
    assert_eq!(
        frames(&bytes, ReaderOptions::empty())?,
        vec![String::from("frame Same")]
    );
    assert!(trace(&bytes, ReaderOptions::empty())?.contains(&String::from("maxs 1 1")));
    Ok(())
}

#[test]
fn two_word_store_into_last_local_is_rejected() {
    init_logging();
    let result = single_method(WriterOptions::COMPUTE_FRAMES, "()V", |method, _| {
        method.visit_insn(LCONST_0)?;
        method.visit_var_insn(LSTORE, u16::MAX)?;
        method.visit_insn(RETURN)?;
        Ok(())
    });
    assert!(matches!(result, Err(Error::InvalidFrame(_))));
}
