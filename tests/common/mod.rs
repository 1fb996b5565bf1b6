//! Helpers for assembling jars of real class files

#![allow(dead_code)]

use takamaka_verifier::jvm::class_file::{
    Annotation, Attribute, BootstrapMethod, BootstrapMethods, BytecodeArray, BytecodeIndex, ClassFile, Code,
    ConstantsPool, ElementValue, ElementValuePair, ExceptionHandler, Field, HandleKind, LineNumber,
    LineNumberTable, Method, RuntimeVisibleAnnotations, Serialize, SourceFile, Version,
};
use takamaka_verifier::jvm::code::{encode_instructions, CodeInstruction};
use takamaka_verifier::jvm::{
    BinaryName, ClassAccessFlags, ClassConstantIndex, ConstantIndex, FieldAccessFlags, FieldRefConstantIndex,
    InvokeDynamicConstantIndex, MethodAccessFlags, MethodRefConstantIndex, Name, UnqualifiedName,
};
use takamaka_verifier::verification::{
    AccessList, ClassLoaderArenas, Error, Jar, Settings, TakamakaClassLoader, VerificationError, VerifiedJar,
};

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";
pub const STORAGE: &str = "io/takamaka/code/lang/Storage";
pub const CONTRACT: &str = "io/takamaka/code/lang/Contract";

pub const PAYABLE: &str = "io/takamaka/code/lang/Payable";
pub const FROM_CONTRACT: &str = "io/takamaka/code/lang/FromContract";
pub const THROWS_EXCEPTIONS: &str = "io/takamaka/code/lang/ThrowsExceptions";
pub const SELF_CHARGED: &str = "io/takamaka/code/lang/SelfCharged";

pub const MAKECONCAT_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";
pub const METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn name(name: &str) -> BinaryName {
    BinaryName::from_string(name.to_owned()).unwrap()
}

pub fn member(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(name.to_owned()).unwrap()
}

/// Method to add to a class
pub struct MethodSpec {
    flags: MethodAccessFlags,
    name: String,
    descriptor: String,
    annotations: Vec<(String, Option<String>)>,
    code: Option<Vec<CodeInstruction<usize>>>,
    handlers: Vec<(u16, u16, u16, Option<String>)>,
    line: Option<u16>,
}

impl MethodSpec {
    pub fn new(flags: MethodAccessFlags, name: &str, descriptor: &str) -> MethodSpec {
        MethodSpec {
            flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            annotations: vec![],
            code: None,
            handlers: vec![],
            line: None,
        }
    }

    pub fn annotated(mut self, kind: &str) -> MethodSpec {
        self.annotations.push((kind.to_owned(), None));
        self
    }

    /// Annotation with a class literal as `value`
    pub fn annotated_with(mut self, kind: &str, value: &str) -> MethodSpec {
        self.annotations.push((kind.to_owned(), Some(value.to_owned())));
        self
    }

    pub fn code(mut self, code: Vec<CodeInstruction<usize>>) -> MethodSpec {
        self.code = Some(code);
        self
    }

    /// Exception handler, in bytecode offsets
    pub fn handler(mut self, start: u16, end: u16, handler: u16, catch_type: Option<&str>) -> MethodSpec {
        self.handlers
            .push((start, end, handler, catch_type.map(str::to_owned)));
        self
    }

    /// Source line of the whole body
    pub fn line(mut self, line: u16) -> MethodSpec {
        self.line = Some(line);
        self
    }
}

pub struct ClassBuilder {
    constants: ConstantsPool,
    name: String,
    access_flags: ClassAccessFlags,
    superclass: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    bootstraps: Vec<BootstrapMethod>,
    source_file: Option<String>,
    annotations: Vec<String>,
}

impl ClassBuilder {
    pub fn new(name: &str, superclass: Option<&str>) -> ClassBuilder {
        ClassBuilder {
            constants: ConstantsPool::new(),
            name: name.to_owned(),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            superclass: superclass.map(str::to_owned),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            bootstraps: vec![],
            source_file: None,
            annotations: vec![],
        }
    }

    pub fn flags(&mut self, flags: ClassAccessFlags) -> &mut Self {
        self.access_flags = flags;
        self
    }

    pub fn interface(&mut self, name: &str) -> &mut Self {
        self.interfaces.push(name.to_owned());
        self
    }

    pub fn source_file(&mut self, file: &str) -> &mut Self {
        self.source_file = Some(file.to_owned());
        self
    }

    pub fn annotate(&mut self, kind: &str) -> &mut Self {
        self.annotations.push(kind.to_owned());
        self
    }

    pub fn field(&mut self, flags: FieldAccessFlags, name: &str, descriptor: &str) -> &mut Self {
        let name_index = self.constants.get_utf8(name).unwrap();
        let descriptor_index = self.constants.get_utf8(descriptor).unwrap();
        self.fields.push(Field {
            access_flags: flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        self
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> FieldRefConstantIndex {
        self.constants.get_field_ref(class, name, descriptor).unwrap()
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> MethodRefConstantIndex {
        self.constants
            .get_method_ref(class, name, descriptor, false)
            .unwrap()
    }

    pub fn class_ref(&mut self, class: &str) -> ClassConstantIndex {
        self.constants.get_class(class).unwrap()
    }

    /// Handle to a static method, as bootstrap methods are given
    pub fn static_handle(&mut self, class: &str, name: &str, descriptor: &str) -> ConstantIndex {
        let method = self.method_ref(class, name, descriptor);
        self.constants
            .get_method_handle(HandleKind::InvokeStatic, method.0)
            .unwrap()
    }

    /// Dynamic call site concatenating strings, as `javac` compiles `"" + x`
    pub fn string_concat(&mut self) -> InvokeDynamicConstantIndex {
        let factory = self.static_handle(
            "java/lang/invoke/StringConcatFactory",
            "makeConcatWithConstants",
            MAKECONCAT_DESCRIPTOR,
        );
        let recipe = self.constants.get_string("\u{1}").unwrap();
        self.bootstrap(factory, vec![recipe.0], "makeConcatWithConstants")
    }

    /// Dynamic call site creating a lambda implemented by a static method of this class
    pub fn lambda(&mut self, implementation: &str, descriptor: &str) -> InvokeDynamicConstantIndex {
        let factory = self
            .constants
            .get_method_ref(
                "java/lang/invoke/LambdaMetafactory",
                "metafactory",
                METAFACTORY_DESCRIPTOR,
                false,
            )
            .unwrap();
        let factory = self
            .constants
            .get_method_handle(HandleKind::InvokeStatic, factory.0)
            .unwrap();
        let name = self.name.clone();
        let implementation = self.method_ref(&name, implementation, descriptor);
        let implementation = self
            .constants
            .get_method_handle(HandleKind::InvokeStatic, implementation.0)
            .unwrap();
        let method_type = self.constants.get_method_type(descriptor).unwrap();
        self.bootstrap(factory, vec![method_type, implementation, method_type], "run")
    }

    pub fn bootstrap(
        &mut self,
        factory: ConstantIndex,
        arguments: Vec<ConstantIndex>,
        name: &str,
    ) -> InvokeDynamicConstantIndex {
        let index = self.bootstraps.len() as u16;
        self.bootstraps.push(BootstrapMethod {
            bootstrap_method: factory,
            bootstrap_arguments: arguments,
        });
        self.constants
            .get_invoke_dynamic(index, name, "()Ljava/lang/Runnable;")
            .unwrap()
    }

    pub fn method(&mut self, spec: MethodSpec) -> &mut Self {
        let name_index = self.constants.get_utf8(spec.name.as_str()).unwrap();
        let descriptor_index = self.constants.get_utf8(spec.descriptor.as_str()).unwrap();

        let mut attributes = vec![];
        if !spec.annotations.is_empty() {
            let annotations = spec
                .annotations
                .iter()
                .map(|(kind, value)| self.annotation(kind, value.as_deref()))
                .collect();
            attributes.push(
                self.constants
                    .get_attribute(RuntimeVisibleAnnotations(annotations))
                    .unwrap(),
            );
        }
        if let Some(code) = &spec.code {
            let mut exception_table = vec![];
            for (start, end, handler, catch_type) in &spec.handlers {
                exception_table.push(ExceptionHandler {
                    start_pc: BytecodeIndex(*start),
                    end_pc: BytecodeIndex(*end),
                    handler_pc: BytecodeIndex(*handler),
                    catch_type: catch_type
                        .as_ref()
                        .map(|class| self.constants.get_class(class).unwrap()),
                });
            }
            let mut code_attributes: Vec<Attribute> = vec![];
            if let Some(line) = spec.line {
                let table = LineNumberTable(vec![LineNumber {
                    start_pc: BytecodeIndex(0),
                    line_number: line,
                }]);
                code_attributes.push(self.constants.get_attribute(table).unwrap());
            }
            let code = Code {
                max_stack: 16,
                max_locals: 16,
                code_array: BytecodeArray(encode_instructions(code).unwrap()),
                exception_table,
                attributes: code_attributes,
            };
            attributes.push(self.constants.get_attribute(code).unwrap());
        }

        self.methods.push(Method {
            access_flags: spec.flags,
            name_index,
            descriptor_index,
            attributes,
        });
        self
    }

    fn annotation(&mut self, kind: &str, value: Option<&str>) -> Annotation {
        let type_index = self.constants.get_utf8(format!("L{};", kind)).unwrap();
        let element_value_pairs = match value {
            Some(value) => vec![ElementValuePair {
                element_name: self.constants.get_utf8("value").unwrap(),
                value: ElementValue::Class(self.constants.get_utf8(format!("L{};", value)).unwrap()),
            }],
            None => vec![],
        };
        Annotation {
            type_index,
            element_value_pairs,
        }
    }

    pub fn build(&mut self) -> Vec<u8> {
        let this_class = self.constants.get_class(&self.name).unwrap();
        let super_class = self
            .superclass
            .clone()
            .map(|superclass| self.constants.get_class(&superclass).unwrap());
        let interfaces = self
            .interfaces
            .clone()
            .iter()
            .map(|interface| self.constants.get_class(interface).unwrap())
            .collect();

        let mut attributes = vec![];
        if let Some(file) = self.source_file.clone() {
            let file = self.constants.get_utf8(file).unwrap();
            attributes.push(self.constants.get_attribute(SourceFile(file)).unwrap());
        }
        if !self.annotations.is_empty() {
            let annotations = self
                .annotations
                .clone()
                .iter()
                .map(|kind| self.annotation(kind, None))
                .collect();
            attributes.push(
                self.constants
                    .get_attribute(RuntimeVisibleAnnotations(annotations))
                    .unwrap(),
            );
        }
        if !self.bootstraps.is_empty() {
            let bootstraps = BootstrapMethods(self.bootstraps.clone());
            attributes.push(self.constants.get_attribute(bootstraps).unwrap());
        }

        let constants = std::mem::take(&mut self.constants);
        let class = ClassFile {
            version: Version::JAVA11,
            constants: constants.into_offset_vec(),
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces,
            fields: std::mem::take(&mut self.fields),
            methods: std::mem::take(&mut self.methods),
            attributes,
        };
        let mut bytes = vec![];
        class.serialize(&mut bytes).unwrap();
        bytes
    }
}

fn public() -> MethodAccessFlags {
    MethodAccessFlags::PUBLIC
}

/// Add a class to a jar, under the entry matching its name
pub fn add_class(jar: &mut Jar, name: &str, class: &mut ClassBuilder) {
    jar.add_entry(format!("{}.class", name), class.build());
}

fn library_class(jar: &mut Jar, name: &str, superclass: Option<&str>, methods: &[(&str, &str)]) {
    let mut class = ClassBuilder::new(name, superclass);
    for (method, descriptor) in methods {
        let flags = if *method == "toString" && name == "java/util/Objects" {
            public() | MethodAccessFlags::STATIC
        } else {
            public()
        };
        class.method(MethodSpec::new(flags, method, descriptor));
    }
    add_class(jar, name, &mut class);
}

/// Minimal runtime library
pub fn library() -> Jar {
    let mut jar = Jar::new();
    library_class(
        &mut jar,
        OBJECT,
        None,
        &[
            ("<init>", "()V"),
            ("hashCode", "()I"),
            ("toString", "()Ljava/lang/String;"),
            ("equals", "(Ljava/lang/Object;)Z"),
        ],
    );
    library_class(&mut jar, STRING, Some(OBJECT), &[("length", "()I")]);
    library_class(&mut jar, "java/math/BigInteger", Some(OBJECT), &[]);
    library_class(
        &mut jar,
        "java/util/Objects",
        Some(OBJECT),
        &[("toString", "(Ljava/lang/Object;)Ljava/lang/String;")],
    );
    library_class(&mut jar, "java/lang/Throwable", Some(OBJECT), &[("<init>", "()V")]);
    library_class(&mut jar, "java/lang/Exception", Some("java/lang/Throwable"), &[("<init>", "()V")]);
    library_class(
        &mut jar,
        "java/lang/RuntimeException",
        Some("java/lang/Exception"),
        &[("<init>", "()V")],
    );
    library_class(&mut jar, "java/lang/Error", Some("java/lang/Throwable"), &[("<init>", "()V")]);

    let mut system = ClassBuilder::new("java/lang/System", Some(OBJECT));
    system.field(
        FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "out",
        "Ljava/io/PrintStream;",
    );
    add_class(&mut jar, "java/lang/System", &mut system);
    jar
}

/// Base classes of smart contracts, installed as a dependency
pub fn takamaka_code() -> Jar {
    let mut jar = Jar::new();
    let mut storage = ClassBuilder::new(STORAGE, Some(OBJECT));
    storage
        .flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT)
        .method(MethodSpec::new(public(), "<init>", "()V"))
        .method(MethodSpec::new(
            MethodAccessFlags::PROTECTED | MethodAccessFlags::FINAL,
            "caller",
            "()Lio/takamaka/code/lang/Contract;",
        ));
    add_class(&mut jar, STORAGE, &mut storage);

    let mut contract = ClassBuilder::new(CONTRACT, Some(STORAGE));
    contract
        .flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT)
        .method(MethodSpec::new(public(), "<init>", "()V"));
    add_class(&mut jar, CONTRACT, &mut contract);
    jar
}

/// Library members that contracts can use
pub fn access_list() -> AccessList {
    let mut list = AccessList::new();
    list.allow(name(OBJECT), member("<init>"), "()V");
    list.allow(name(OBJECT), member("hashCode"), "()I");
    list.allow(name(OBJECT), member("toString"), "()Ljava/lang/String;");
    list.allow(name(STRING), member("length"), "()I");
    list.allow(
        name("java/util/Objects"),
        member("toString"),
        "(Ljava/lang/Object;)Ljava/lang/String;",
    );
    list
}

/// Verify a jar against the minimal library and the Takamaka base classes
pub fn verify_with(jar: &Jar, settings: &Settings) -> Result<Vec<VerificationError>, Error> {
    init_logging();
    let arenas = ClassLoaderArenas::new();
    let dependencies = vec![takamaka_code()];
    let library = library();
    let loader = TakamakaClassLoader::new(&arenas, jar, &dependencies, Some(&library))?;
    let verified = VerifiedJar::verify(&loader, settings, &access_list())?;
    Ok(verified.errors().cloned().collect())
}

pub fn verify(jar: &Jar) -> Result<Vec<VerificationError>, Error> {
    verify_with(jar, &Settings::new(0)?)
}
