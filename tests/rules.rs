mod common;

use common::*;
use takamaka_verifier::jvm::code::{BranchInstruction, CodeInstruction, Instruction, InvokeType};
use takamaka_verifier::jvm::{FieldAccessFlags, MethodAccessFlags};
use takamaka_verifier::verification::{ErrorKind, Jar, Settings};
use CodeInstruction::{Branch, Regular};

const CALLER: &str = "()Lio/takamaka/code/lang/Contract;";

fn kinds(jar: &Jar) -> Vec<ErrorKind> {
    verify(jar).unwrap().iter().map(|error| error.kind).collect()
}

fn single(name: &str, class: &mut ClassBuilder) -> Jar {
    let mut jar = Jar::new();
    add_class(&mut jar, name, class);
    jar
}

/// Contract calling `caller()` on the receiver loaded from `local`
fn caller_user(local: u16, from_contract: bool) -> Jar {
    let mut class = ClassBuilder::new("a/Pay", Some(CONTRACT));
    let caller = class.method_ref("a/Pay", "caller", CALLER);
    let mut spec = MethodSpec::new(MethodAccessFlags::PUBLIC, "f", "(Lio/takamaka/code/lang/Contract;)V")
        .code(vec![
            Regular(Instruction::ALoad(local)),
            Regular(Instruction::Invoke(InvokeType::Virtual, caller)),
            Regular(Instruction::Pop),
            Branch(BranchInstruction::Return),
        ]);
    if from_contract {
        spec = spec.annotated(FROM_CONTRACT);
    }
    class.method(spec);
    single("a/Pay", &mut class)
}

#[test]
fn caller_is_only_for_this() {
    init_logging();
    assert!(kinds(&caller_user(0, true)).is_empty());
    assert_eq!(kinds(&caller_user(1, true)), vec![ErrorKind::CallerNotOnThis]);
    assert_eq!(kinds(&caller_user(0, false)), vec![ErrorKind::CallerOutsideFromContract]);
}

fn base() -> ClassBuilder {
    let mut base = ClassBuilder::new("a/Base", Some(CONTRACT));
    let init = base.method_ref(CONTRACT, "<init>", "()V");
    base.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "<init>", "(I)V")
            .annotated(PAYABLE)
            .annotated(FROM_CONTRACT)
            .code(vec![
                Regular(Instruction::ALoad(0)),
                Regular(Instruction::Invoke(InvokeType::Special, init)),
                Branch(BranchInstruction::Return),
            ]),
    );
    base
}

/// Subclass of `a/Base` chaining its payable constructor
fn child(payable: bool, amount: Vec<CodeInstruction<usize>>) -> Jar {
    let mut child = ClassBuilder::new("a/Child", Some("a/Base"));
    let init = child.method_ref("a/Base", "<init>", "(I)V");
    let mut code = vec![Regular(Instruction::ALoad(0))];
    code.extend(amount);
    code.push(Regular(Instruction::Invoke(InvokeType::Special, init)));
    code.push(Branch(BranchInstruction::Return));

    let mut spec = MethodSpec::new(MethodAccessFlags::PUBLIC, "<init>", "(I)V")
        .annotated(FROM_CONTRACT)
        .code(code);
    if payable {
        spec = spec.annotated(PAYABLE);
    }
    child.method(spec);

    let mut jar = Jar::new();
    add_class(&mut jar, "a/Base", &mut base());
    add_class(&mut jar, "a/Child", &mut child);
    jar
}

#[test]
fn amount_flows_through_constructor_chaining() {
    init_logging();
    assert!(kinds(&child(true, vec![Regular(Instruction::ILoad(1))])).is_empty());

    let doubled = vec![
        Regular(Instruction::ILoad(1)),
        Regular(Instruction::IConst1),
        Regular(Instruction::IAdd),
    ];
    assert_eq!(kinds(&child(true, doubled)), vec![ErrorKind::IllegalModificationOfAmount]);
}

#[test]
fn payable_constructors_chain_from_payable_constructors() {
    init_logging();
    let errors = verify(&child(false, vec![Regular(Instruction::ILoad(1))])).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::IllegalCallToPayableConstructorOnThis);
    assert_eq!(errors[0].location, "a.Child method <init>");
}

/// Method `f` of `a/Guard` running a handler for `caught` (`None` for `finally`)
fn guarded(caught: Option<&str>) -> Jar {
    let mut class = ClassBuilder::new("a/Guard", Some(OBJECT));
    class.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "f", "()V")
            .code(vec![
                Regular(Instruction::Nop),
                Branch(BranchInstruction::Return),
                Regular(Instruction::Pop),
                Branch(BranchInstruction::Return),
            ])
            .handler(0, 1, 2, caught),
    );

    let mut oops = ClassBuilder::new("a/Oops", Some("java/lang/Exception"));
    let mut jar = single("a/Guard", &mut class);
    add_class(&mut jar, "a/Oops", &mut oops);
    jar
}

#[test]
fn only_checked_exceptions_are_caught() {
    init_logging();
    let errors = verify(&guarded(Some("java/lang/RuntimeException"))).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::UncheckedExceptionHandler);
    assert_eq!(errors[0].message, "exception handler for unchecked exception java.lang.RuntimeException");

    // Catching a supertype of unchecked exceptions catches them too
    assert_eq!(kinds(&guarded(Some("java/lang/Exception"))), vec![ErrorKind::UncheckedExceptionHandler]);
    assert_eq!(kinds(&guarded(Some("java/lang/Error"))), vec![ErrorKind::UncheckedExceptionHandler]);

    assert!(kinds(&guarded(Some("a/Oops"))).is_empty());
    assert!(kinds(&guarded(None)).is_empty());
}

fn counter(in_static_initializer: bool) -> Jar {
    let mut class = ClassBuilder::new("a/Counter", Some(OBJECT));
    let count = class.field_ref("a/Counter", "count", "I");
    let (flags, name) = if in_static_initializer {
        (MethodAccessFlags::STATIC, "<clinit>")
    } else {
        (MethodAccessFlags::PUBLIC, "bump")
    };
    class
        .field(FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC, "count", "I")
        .method(MethodSpec::new(flags, name, "()V").code(vec![
            Regular(Instruction::IConst1),
            Regular(Instruction::PutStatic(count)),
            Branch(BranchInstruction::Return),
        ]));
    single("a/Counter", &mut class)
}

#[test]
fn static_state_cannot_be_updated() {
    init_logging();
    assert_eq!(kinds(&counter(false)), vec![ErrorKind::IllegalPutstaticInstruction]);

    // Updates inside the static initializer are fine, but the initializer itself is not
    assert_eq!(kinds(&counter(true)), vec![ErrorKind::IllegalStaticInitialization]);
}

#[test]
fn subroutines_are_rejected() {
    init_logging();
    let mut class = ClassBuilder::new("a/Old", Some(OBJECT));
    let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    class.method(MethodSpec::new(flags, "f", "()V").code(vec![
        Branch(BranchInstruction::Jsr(2)),
        Branch(BranchInstruction::Return),
        Regular(Instruction::AStore(0)),
        Branch(BranchInstruction::Ret(0)),
    ]));

    assert_eq!(
        kinds(&single("a/Old", &mut class)),
        vec![ErrorKind::IllegalJsrInstruction, ErrorKind::IllegalRetInstruction]
    );
}

fn self_charged(flags: MethodAccessFlags) -> Jar {
    let mut class = ClassBuilder::new("a/Charged", Some(CONTRACT));
    class.method(
        MethodSpec::new(flags, "f", "()V")
            .annotated(SELF_CHARGED)
            .code(vec![Branch(BranchInstruction::Return)]),
    );
    single("a/Charged", &mut class)
}

#[test]
fn self_charged_methods_need_permission() {
    init_logging();
    let public = MethodAccessFlags::PUBLIC;
    assert_eq!(kinds(&self_charged(public)), vec![ErrorKind::SelfChargedNotAllowed]);

    let mut settings = Settings::new(0).unwrap();
    settings.allow_self_charged = true;
    assert!(verify_with(&self_charged(public), &settings).unwrap().is_empty());

    let errors = verify_with(&self_charged(public | MethodAccessFlags::STATIC), &settings).unwrap();
    let kinds: Vec<_> = errors.iter().map(|error| error.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::IllegalSelfCharged]);
}

#[test]
fn storage_fields_hold_storable_values() {
    init_logging();
    let mut class = ClassBuilder::new("a/Box", Some(STORAGE));
    class
        .field(FieldAccessFlags::PRIVATE, "n", "I")
        .field(FieldAccessFlags::PRIVATE, "s", "Ljava/lang/String;")
        .field(FieldAccessFlags::PRIVATE, "owner", "Lio/takamaka/code/lang/Contract;")
        .field(FieldAccessFlags::PRIVATE | FieldAccessFlags::TRANSIENT, "cache", "Ljava/lang/Throwable;")
        .field(FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC, "shared", "Ljava/lang/Throwable;")
        .field(FieldAccessFlags::PRIVATE, "arr", "[I")
        .field(FieldAccessFlags::PRIVATE, "thr", "Ljava/lang/Throwable;");

    let errors = verify(&single("a/Box", &mut class)).unwrap();
    let found: Vec<_> = errors
        .iter()
        .map(|error| (error.kind, error.location.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            (ErrorKind::IllegalTypeForStorageField, "a.Box field arr"),
            (ErrorKind::IllegalTypeForStorageField, "a.Box field thr"),
        ]
    );

    // Classes that are not storage can hold anything
    let mut plain = ClassBuilder::new("a/Plain", Some(OBJECT));
    plain.field(FieldAccessFlags::PRIVATE, "arr", "[I");
    assert!(kinds(&single("a/Plain", &mut plain)).is_empty());
}

/// Contract `a/C` with a from-contract method `g`
fn callee() -> ClassBuilder {
    let mut class = ClassBuilder::new("a/C", Some(CONTRACT));
    class.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "g", "()V")
            .annotated(FROM_CONTRACT)
            .code(vec![Branch(BranchInstruction::Return)]),
    );
    class
}

/// Jar with `a/C` and a class calling `a/C.g` from method `h`, on the receiver in `local`
fn calling_g(name: &str, superclass: &str, flags: MethodAccessFlags, descriptor: &str, local: u16) -> Jar {
    let mut caller = ClassBuilder::new(name, Some(superclass));
    let g = caller.method_ref("a/C", "g", "()V");
    caller.method(MethodSpec::new(flags, "h", descriptor).code(vec![
        Regular(Instruction::ALoad(local)),
        Regular(Instruction::Invoke(InvokeType::Virtual, g)),
        Branch(BranchInstruction::Return),
    ]));

    let mut jar = Jar::new();
    add_class(&mut jar, "a/C", &mut callee());
    add_class(&mut jar, name, &mut caller);
    jar
}

#[test]
fn from_contract_code_is_called_from_contracts() {
    init_logging();
    let public = MethodAccessFlags::PUBLIC;

    // From a class that is not a contract
    let errors = verify(&calling_g("a/Plain", OBJECT, public, "(La/C;)V", 1)).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::IllegalCallToFromContract);
    assert_eq!(errors[0].location, "a.Plain method h");
    assert!(errors[0]
        .message
        .contains("can only be called from an instance method or constructor of a contract"));

    // From a static method of a contract
    let jar = calling_g("a/D", CONTRACT, public | MethodAccessFlags::STATIC, "(La/C;)V", 0);
    assert_eq!(kinds(&jar), vec![ErrorKind::IllegalCallToFromContract]);

    // From an instance method of a contract, on another contract
    assert!(kinds(&calling_g("a/D", CONTRACT, public, "(La/C;)V", 1)).is_empty());

    // On this, from code that is not itself from-contract
    let jar = calling_g("a/E", "a/C", public, "()V", 0);
    assert_eq!(kinds(&jar), vec![ErrorKind::IllegalCallToFromContractOnThis]);
}

fn with_method(class: &str, superclass: &str, spec: MethodSpec) -> Jar {
    let mut builder = ClassBuilder::new(class, Some(superclass));
    builder.method(spec.code(vec![Branch(BranchInstruction::Return)]));
    single(class, &mut builder)
}

#[test]
fn from_contract_code_lives_in_storage() {
    init_logging();
    let public = MethodAccessFlags::PUBLIC;
    let plain = MethodSpec::new(public, "f", "()V").annotated(FROM_CONTRACT);
    assert_eq!(
        kinds(&with_method("a/Plain", OBJECT, plain)),
        vec![ErrorKind::FromContractNotInStorage]
    );

    let static_method = MethodSpec::new(public | MethodAccessFlags::STATIC, "f", "()V").annotated(FROM_CONTRACT);
    assert_eq!(
        kinds(&with_method("a/Shop", CONTRACT, static_method)),
        vec![ErrorKind::FromContractNotInStorage]
    );

    let argument = MethodSpec::new(public, "f", "()V").annotated_with(FROM_CONTRACT, STRING);
    let errors = verify(&with_method("a/Shop", CONTRACT, argument)).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::IllegalFromContractArgument);
    assert_eq!(errors[0].message, "the argument of @FromContract must be a contract, not java.lang.String");

    let contract = MethodSpec::new(public, "f", "()V").annotated_with(FROM_CONTRACT, "a/Shop");
    assert!(kinds(&with_method("a/Shop", CONTRACT, contract)).is_empty());
}

#[test]
fn throws_exceptions_is_public_and_inherited() {
    init_logging();
    let protected = MethodSpec::new(MethodAccessFlags::PROTECTED, "f", "()V").annotated(THROWS_EXCEPTIONS);
    assert_eq!(
        kinds(&with_method("a/Risky", OBJECT, protected)),
        vec![ErrorKind::ThrowsExceptionsOnNonPublic]
    );

    let mut base = ClassBuilder::new("a/Base", Some(OBJECT));
    base.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "f", "()V")
            .annotated(THROWS_EXCEPTIONS)
            .code(vec![Branch(BranchInstruction::Return)]),
    );
    let mut derived = ClassBuilder::new("a/Derived", Some("a/Base"));
    derived.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "f", "()V").code(vec![Branch(BranchInstruction::Return)]),
    );
    let mut jar = Jar::new();
    add_class(&mut jar, "a/Base", &mut base);
    add_class(&mut jar, "a/Derived", &mut derived);

    let errors = verify(&jar).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::InconsistentThrowsExceptions);
    assert_eq!(errors[0].location, "a.Derived method f");
}

#[test]
fn reserved_prefix_is_rejected_in_names() {
    init_logging();
    let mut class = ClassBuilder::new("a/Named", Some(OBJECT));
    class
        .field(FieldAccessFlags::PRIVATE, "§f", "I")
        .field(FieldAccessFlags::PRIVATE, "f§", "I")
        .method(MethodSpec::new(MethodAccessFlags::PUBLIC, "§m", "()V").code(vec![Branch(BranchInstruction::Return)]));

    let errors = verify(&single("a/Named", &mut class)).unwrap();
    let found: Vec<_> = errors
        .iter()
        .map(|error| (error.kind, error.location.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            (ErrorKind::IllegalFieldName, "a.Named field §f"),
            (ErrorKind::IllegalMethodName, "a.Named method §m"),
        ]
    );
}

#[test]
fn library_members_need_white_listing() {
    init_logging();
    let mut class = ClassBuilder::new("a/User", Some(OBJECT));
    let out = class.field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
    class.method(MethodSpec::new(MethodAccessFlags::PUBLIC, "print", "()V").code(vec![
        Regular(Instruction::GetStatic(out)),
        Regular(Instruction::Pop),
        Branch(BranchInstruction::Return),
    ]));
    let errors = verify(&single("a/User", &mut class)).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::IllegalAccessToNonWhiteListedField);
    assert_eq!(errors[0].message, "illegal access to non-white-listed field java.lang.System.out");

    let build = |created: &str| {
        let mut class = ClassBuilder::new("a/Maker", Some(OBJECT));
        let new = class.class_ref(created);
        let init = class.method_ref(created, "<init>", "()V");
        class.method(MethodSpec::new(MethodAccessFlags::PUBLIC, "make", "()V").code(vec![
            Regular(Instruction::New(new)),
            Regular(Instruction::Dup),
            Regular(Instruction::Invoke(InvokeType::Special, init)),
            Regular(Instruction::Pop),
            Branch(BranchInstruction::Return),
        ]));
        single("a/Maker", &mut class)
    };

    let errors = verify(&build("java/lang/Exception")).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::IllegalCallToNonWhiteListedConstructor);
    assert_eq!(
        errors[0].message,
        "illegal call to non-white-listed constructor java.lang.Exception.<init>"
    );
    assert!(kinds(&build(OBJECT)).is_empty());
}

#[test]
fn provenance_queries_that_give_up_reject() {
    init_logging();
    let mut class = ClassBuilder::new("a/Pay", Some(CONTRACT));
    let caller = class.method_ref("a/Pay", "caller", CALLER);
    class.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC, "f", "()V")
            .annotated(FROM_CONTRACT)
            .code(vec![
                Regular(Instruction::ALoad(0)),
                Regular(Instruction::Nop),
                Regular(Instruction::Invoke(InvokeType::Virtual, caller)),
                Regular(Instruction::Pop),
                Branch(BranchInstruction::Return),
            ]),
    );
    let jar = single("a/Pay", &mut class);
    assert!(kinds(&jar).is_empty());

    // Looking past the `nop` takes a second state
    let mut settings = Settings::new(0).unwrap();
    assert_eq!(settings.version(), 0);
    settings.max_pusher_states = 1;
    let errors = verify_with(&jar, &settings).unwrap();
    let kinds: Vec<_> = errors.iter().map(|error| error.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::CallerNotOnThis]);
}
