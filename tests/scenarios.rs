mod common;

use common::*;
use takamaka_verifier::jvm::code::{BranchInstruction, CodeInstruction, Instruction};
use takamaka_verifier::jvm::{FieldAccessFlags, MethodAccessFlags};
use takamaka_verifier::verification::{Error, ErrorKind, Jar, Settings};
use CodeInstruction::{Branch, Regular};

fn shop(annotations: &[&str]) -> Jar {
    let mut class = ClassBuilder::new("a/Shop", Some(CONTRACT));
    class.source_file("Shop.java");
    let mut buy = MethodSpec::new(MethodAccessFlags::PUBLIC, "buy", "(I)V")
        .code(vec![Branch(BranchInstruction::Return)])
        .line(7);
    for annotation in annotations {
        buy = buy.annotated(annotation);
    }
    class.method(buy);

    let mut jar = Jar::new();
    add_class(&mut jar, "a/Shop", &mut class);
    jar
}

#[test]
fn native_method_is_rejected() {
    let mut class = ClassBuilder::new("a/Natives", Some(OBJECT));
    class.source_file("Natives.java").method(MethodSpec::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
        "f",
        "()I",
    ));
    let mut jar = Jar::new();
    add_class(&mut jar, "a/Natives", &mut class);

    let errors = verify(&jar).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::IllegalNativeMethod);
    assert!(errors[0].message.contains("native method"));
    assert_eq!(errors[0].location, "a/Natives.java method f");
}

#[test]
fn payable_needs_from_contract() {
    let errors = verify(&shop(&[PAYABLE])).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::PayableWithoutFromContract);
    assert_eq!(errors[0].location, "a/Shop.java:7 method buy");

    let errors = verify(&shop(&[PAYABLE, FROM_CONTRACT])).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn payable_needs_an_amount() {
    let mut class = ClassBuilder::new("a/Shop", Some(CONTRACT));
    class.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "buy", "(Ljava/lang/String;)V")
            .annotated(PAYABLE)
            .annotated(FROM_CONTRACT)
            .code(vec![Branch(BranchInstruction::Return)]),
    );
    let mut jar = Jar::new();
    add_class(&mut jar, "a/Shop", &mut class);

    let kinds: Vec<_> = verify(&jar).unwrap().iter().map(|error| error.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::PayableWithoutAmount]);
}

#[test]
fn unknown_type_is_fatal() {
    let mut class = ClassBuilder::new("a/Orphan", Some("a/Missing"));
    class.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "f", "()V").code(vec![Branch(BranchInstruction::Return)]),
    );
    let mut jar = Jar::new();
    add_class(&mut jar, "a/Orphan", &mut class);

    match verify(&jar) {
        Err(Error::UnknownType(name)) => assert_eq!(name, "a.Missing"),
        other => panic!("expected an unknown type, got {:?}", other),
    }
}

#[test]
fn unknown_field_owner_is_fatal() {
    let mut class = ClassBuilder::new("a/Reader", Some(OBJECT));
    let field = class.field_ref("b/Gone", "x", "I");
    class.method(MethodSpec::new(MethodAccessFlags::PUBLIC, "f", "()I").code(vec![
        Regular(Instruction::GetStatic(field)),
        Branch(BranchInstruction::IReturn),
    ]));
    let mut jar = Jar::new();
    add_class(&mut jar, "a/Reader", &mut class);

    assert!(matches!(verify(&jar), Err(Error::UnknownType(name)) if name == "b.Gone"));
}

#[test]
fn unsupported_version() {
    assert!(matches!(Settings::new(3), Err(Error::UnsupportedVersion(3))));
}

#[test]
fn reserved_packages() {
    let mut jar = Jar::new();
    add_class(&mut jar, "java/lang/Hack", &mut ClassBuilder::new("java/lang/Hack", Some(OBJECT)));
    add_class(
        &mut jar,
        "io/takamaka/code/util/Extra",
        &mut ClassBuilder::new("io/takamaka/code/util/Extra", Some(OBJECT)),
    );

    let kinds: Vec<_> = verify(&jar).unwrap().iter().map(|error| error.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::IllegalPackageName, ErrorKind::IllegalPackageName]);

    let mut settings = Settings::new(0).unwrap();
    settings.during_initialization = true;
    let errors = verify_with(&jar, &settings).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].location, "java.lang.Hack");
}

#[test]
fn skipping_accepts_everything() {
    let mut settings = Settings::new(0).unwrap();
    settings.skips_verification = true;
    let errors = verify_with(&shop(&[PAYABLE]), &settings).unwrap();
    assert!(errors.is_empty());
}

fn messy_jar() -> Jar {
    let mut jar = Jar::new();

    let mut first = ClassBuilder::new("a/First", Some(OBJECT));
    first
        .source_file("First.java")
        .field(FieldAccessFlags::PRIVATE, "§hidden", "I")
        .method(
            MethodSpec::new(MethodAccessFlags::PROTECTED, "finalize", "()V")
                .code(vec![Branch(BranchInstruction::Return)]),
        )
        .method(
            MethodSpec::new(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNCHRONIZED,
                "locked",
                "()V",
            )
            .code(vec![
                Regular(Instruction::ALoad(0)),
                Regular(Instruction::MonitorEnter),
                Regular(Instruction::ALoad(0)),
                Regular(Instruction::MonitorExit),
                Branch(BranchInstruction::Return),
            ])
            .line(12),
        );
    add_class(&mut jar, "a/First", &mut first);

    let mut second = ClassBuilder::new("a/Second", Some(OBJECT));
    second
        .source_file("Second.java")
        .method(MethodSpec::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
            "g",
            "()V",
        ))
        .method(
            MethodSpec::new(MethodAccessFlags::PUBLIC, "h", "()V").code(vec![
                Regular(Instruction::AConstNull),
                Regular(Instruction::AStore(0)),
                Branch(BranchInstruction::Return),
            ]),
        );
    add_class(&mut jar, "a/Second", &mut second);
    jar
}

#[test]
fn errors_are_deterministic_and_ordered() {
    let first = verify(&messy_jar()).unwrap();
    let second = verify(&messy_jar()).unwrap();
    assert_eq!(first, second);

    let mut sorted = first.clone();
    sorted.sort_by(|a, b| {
        (&a.location, a.kind.name(), &a.message).cmp(&(&b.location, b.kind.name(), &b.message))
    });
    assert_eq!(first, sorted);

    let kinds: Vec<_> = first.iter().map(|error| error.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ErrorKind::IllegalFieldName,
            ErrorKind::IllegalFinalizer,
            ErrorKind::IllegalSynchronization,
            ErrorKind::IllegalSynchronization,
            ErrorKind::IllegalNativeMethod,
            ErrorKind::IllegalUpdateOfLocal0,
        ]
    );
    assert_eq!(first[0].location, "a/First.java field §hidden");
    assert_eq!(first[2].location, "a/First.java:12 method locked");
    assert_eq!(first[2].message, "synchronization is not allowed");
}
