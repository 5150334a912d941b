use classfile_codec::*;

/// Class visitor recording every call it receives as a line of text
///
/// Nested visitors write into the same list, so the result reads like a flattened trace of
/// the whole class.
#[derive(Default)]
pub struct TraceVisitor {
    pub events: Vec<String>,
}

impl TraceVisitor {
    pub fn new() -> TraceVisitor {
        TraceVisitor::default()
    }

    /// Does any event start with `prefix`?
    pub fn has(&self, prefix: &str) -> bool {
        self.events.iter().any(|event| event.starts_with(prefix))
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Read `bytes` with the given options and return the trace
pub fn trace(bytes: &[u8], options: ReaderOptions) -> Result<Vec<String>, Error> {
    let reader = ClassReader::new(bytes)?;
    let mut visitor = TraceVisitor::new();
    reader.accept(&mut visitor, options)?;
    Ok(visitor.events)
}

impl ClassVisitor for TraceVisitor {
    fn visit(
        &mut self,
        version: Version,
        access: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) -> Result<(), Error> {
        self.events.push(format!(
            "visit {}.{} {:#06x} {} {:?} {:?} {:?}",
            version.major_version,
            version.minor_version,
            access.bits(),
            name,
            signature,
            super_name,
            interfaces
        ));
        Ok(())
    }

    fn visit_source(&mut self, source: Option<&str>, debug: Option<&str>) -> Result<(), Error> {
        self.events.push(format!("source {:?} {:?}", source, debug));
        Ok(())
    }

    fn visit_nest_host(&mut self, nest_host: &str) -> Result<(), Error> {
        self.events.push(format!("nest_host {}", nest_host));
        Ok(())
    }

    fn visit_outer_class(
        &mut self,
        owner: &str,
        name: Option<&str>,
        descriptor: Option<&str>,
    ) -> Result<(), Error> {
        self.events
            .push(format!("outer_class {} {:?} {:?}", owner, name, descriptor));
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!("annotation {} {}", descriptor, visible));
        Some(Box::new(TraceAnnotation {
            events: &mut self.events,
        }))
    }

    fn visit_attribute(&mut self, attribute: Box<dyn Attribute>) -> Result<(), Error> {
        self.events.push(format!("attribute {}", attribute.type_name()));
        Ok(())
    }

    fn visit_nest_member(&mut self, nest_member: &str) -> Result<(), Error> {
        self.events.push(format!("nest_member {}", nest_member));
        Ok(())
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access: InnerClassAccessFlags,
    ) -> Result<(), Error> {
        self.events.push(format!(
            "inner_class {} {:?} {:?} {:#06x}",
            name,
            outer_name,
            inner_name,
            access.bits()
        ));
        Ok(())
    }

    fn visit_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Option<Box<dyn FieldVisitor + '_>> {
        self.events.push(format!(
            "field {:#06x} {} {} {:?} {:?}",
            access.bits(),
            name,
            descriptor,
            signature,
            value
        ));
        Some(Box::new(TraceMember {
            events: &mut self.events,
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
        self.events.push(format!(
            "method {:#06x} {}{} {:?} {:?}",
            access.bits(),
            name,
            descriptor,
            signature,
            exceptions
        ));
        Some(Box::new(TraceMember {
            events: &mut self.events,
        }))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("visit_end"));
        Ok(())
    }
}

/// Field or method visitor sharing the class trace
pub struct TraceMember<'t> {
    events: &'t mut Vec<String>,
}

impl<'t> FieldVisitor for TraceMember<'t> {
    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!("annotation {} {}", descriptor, visible));
        Some(Box::new(TraceAnnotation {
            events: &mut *self.events,
        }))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("field_end"));
        Ok(())
    }
}

impl<'t> MethodVisitor for TraceMember<'t> {
    fn visit_annotation(
        &mut self,
        descriptor: &str,
        visible: bool,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!("annotation {} {}", descriptor, visible));
        Some(Box::new(TraceAnnotation {
            events: &mut *self.events,
        }))
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.events.push(String::from("code"));
        Ok(())
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        self.events.push(format!("frame {:?}", frame));
        Ok(())
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        self.events.push(format!("insn {}", opcode));
        Ok(())
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        self.events.push(format!("insn {} {}", opcode, operand));
        Ok(())
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        self.events.push(format!("insn {} {}", opcode, var));
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) -> Result<(), Error> {
        self.events.push(format!("insn {} {}", opcode, type_name));
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        self.events
            .push(format!("insn {} {}.{}:{}", opcode, owner, name, descriptor));
        Ok(())
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        self.events.push(format!(
            "insn {} {}.{}{} {}",
            opcode, owner, name, descriptor, is_interface
        ));
        Ok(())
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        self.events.push(format!(
            "indy {}{} {:?} {:?}",
            name, descriptor, bootstrap_method, bootstrap_arguments
        ));
        Ok(())
    }

    fn visit_jump_insn(&mut self, opcode: u8, label: Label) -> Result<(), Error> {
        self.events.push(format!("jump {} {:?}", opcode, label));
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        self.events.push(format!("label {:?}", label));
        Ok(())
    }

    fn visit_ldc_insn(&mut self, value: &ConstantValue) -> Result<(), Error> {
        self.events.push(format!("ldc {:?}", value));
        Ok(())
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        self.events.push(format!("iinc {} {}", var, increment));
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        min: i32,
        max: i32,
        default: Label,
        labels: &[Label],
    ) -> Result<(), Error> {
        self.events.push(format!(
            "tableswitch {} {} {:?} {:?}",
            min, max, default, labels
        ));
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        labels: &[Label],
    ) -> Result<(), Error> {
        self.events
            .push(format!("lookupswitch {:?} {:?} {:?}", default, keys, labels));
        Ok(())
    }

    fn visit_multi_anew_array_insn(
        &mut self,
        descriptor: &str,
        dimensions: u8,
    ) -> Result<(), Error> {
        self.events
            .push(format!("multianewarray {} {}", descriptor, dimensions));
        Ok(())
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        exception_type: Option<&str>,
    ) -> Result<(), Error> {
        self.events.push(format!(
            "try_catch {:?} {:?} {:?} {:?}",
            start, end, handler, exception_type
        ));
        Ok(())
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        self.events.push(format!(
            "local_variable {} {} {:?} {:?} {:?} {}",
            name, descriptor, signature, start, end, index
        ));
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.events.push(format!("line {} {:?}", line, start));
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.events.push(format!("maxs {} {}", max_stack, max_locals));
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("method_end"));
        Ok(())
    }
}

pub struct TraceAnnotation<'t> {
    events: &'t mut Vec<String>,
}

impl<'t> AnnotationVisitor for TraceAnnotation<'t> {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) -> Result<(), Error> {
        self.events.push(format!("value {:?} {:?}", name, value));
        Ok(())
    }

    fn visit_enum(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
        value: &str,
    ) -> Result<(), Error> {
        self.events
            .push(format!("enum {:?} {} {}", name, descriptor, value));
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!("nested {:?} {}", name, descriptor));
        Some(Box::new(TraceAnnotation {
            events: &mut *self.events,
        }))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.events.push(format!("array {:?}", name));
        Some(Box::new(TraceAnnotation {
            events: &mut *self.events,
        }))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("annotation_end"));
        Ok(())
    }
}
