mod common;

use common::*;
use takamaka_verifier::jvm::code::{BranchInstruction, CodeInstruction, Instruction};
use takamaka_verifier::jvm::MethodAccessFlags;
use takamaka_verifier::verification::{ClassLoaderArenas, ErrorKind, Jar, TakamakaClassLoader, VerifiedClass};
use CodeInstruction::{Branch, Regular};

fn lambda_body(
    flags: MethodAccessFlags,
    name: &str,
    calls: Option<&str>,
    class: &mut ClassBuilder,
) -> MethodSpec {
    let mut code = vec![];
    if let Some(implementation) = calls {
        let site = class.lambda(implementation, "()V");
        code.push(Regular(Instruction::InvokeDynamic(site)));
        code.push(Regular(Instruction::Pop));
    }
    code.push(Branch(BranchInstruction::Return));
    MethodSpec::new(flags, name, "()V").code(code)
}

fn lambdas(with_plain: bool) -> Jar {
    let hidden = MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC;
    let mut class = ClassBuilder::new("a/Lambdas", Some(CONTRACT));

    let entry =
        lambda_body(MethodAccessFlags::PUBLIC, "entry", Some("lambda$0"), &mut class).annotated(FROM_CONTRACT);
    let first = lambda_body(hidden, "lambda$0", Some("lambda$2"), &mut class);
    let last = lambda_body(hidden, "lambda$2", None, &mut class);
    class.method(entry).method(first).method(last);

    if with_plain {
        let plain = lambda_body(MethodAccessFlags::PUBLIC, "plain", Some("lambda$1"), &mut class);
        let unrelated = lambda_body(hidden, "lambda$1", None, &mut class);
        class.method(plain).method(unrelated);
    }

    let mut jar = Jar::new();
    add_class(&mut jar, "a/Lambdas", &mut class);
    jar
}

/// Names of the lambdas reachable from from-contract code
fn part_of_from_contract(jar: &Jar) -> Vec<String> {
    let arenas = ClassLoaderArenas::new();
    let dependencies = vec![takamaka_code()];
    let library = library();
    let loader = TakamakaClassLoader::new(&arenas, jar, &dependencies, Some(&library)).unwrap();
    let decl = loader.package_classes()[0];
    let class = VerifiedClass::new(&loader, decl, 1000).unwrap();

    decl.methods
        .iter()
        .filter(|method| class.bootstraps().is_part_of_from_contract(method))
        .map(|method| method.name.to_string())
        .collect()
}

#[test]
fn lambdas_of_from_contract_code_are_closed_transitively() {
    init_logging();
    let found = part_of_from_contract(&lambdas(true));
    assert_eq!(found, vec!["lambda$0".to_owned(), "lambda$2".to_owned()]);
}

#[test]
fn unrelated_lambdas_do_not_change_the_closure() {
    init_logging();
    assert_eq!(part_of_from_contract(&lambdas(true)), part_of_from_contract(&lambdas(false)));
}

#[test]
fn lambdas_are_known_by_their_bootstraps() {
    init_logging();
    let jar = lambdas(true);
    let arenas = ClassLoaderArenas::new();
    let dependencies = vec![takamaka_code()];
    let library = library();
    let loader = TakamakaClassLoader::new(&arenas, &jar, &dependencies, Some(&library)).unwrap();
    let decl = loader.package_classes()[0];
    let class = VerifiedClass::new(&loader, decl, 1000).unwrap();

    let bootstraps = class.bootstraps();
    assert_eq!(bootstraps.entries().len(), 3);
    let mut names: Vec<_> = bootstraps.lambdas().map(|lambda| lambda.name.to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["lambda$0", "lambda$1", "lambda$2"]);
    for entry in bootstraps.entries() {
        assert!(entry.target.is_some(), "bootstrap {} has no target", entry.index);
        assert_eq!(
            entry.target.map(|target| target.name.clone()),
            entry.lambda.map(|lambda| lambda.name.clone())
        );
    }

    // No lambda is itself from-contract, so no bootstrap leads to from-contract code
    assert_eq!(bootstraps.leading_to_from_contract().count(), 0);
}

#[test]
fn lambdas_of_storage_classes_verify() {
    let errors = verify(&lambdas(true)).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
}

fn concatenation() -> Jar {
    let mut class = ClassBuilder::new("a/Concat", Some(OBJECT));
    let site = class.string_concat();
    class.method(
        MethodSpec::new(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "f", "()V").code(vec![
            Regular(Instruction::InvokeDynamic(site)),
            Regular(Instruction::Pop),
            Branch(BranchInstruction::Return),
        ]),
    );
    let mut jar = Jar::new();
    add_class(&mut jar, "a/Concat", &mut class);
    jar
}

#[test]
fn string_concatenation_calls_to_string() {
    init_logging();
    let jar = concatenation();
    let arenas = ClassLoaderArenas::new();
    let dependencies = vec![takamaka_code()];
    let library = library();
    let loader = TakamakaClassLoader::new(&arenas, &jar, &dependencies, Some(&library)).unwrap();
    let class = VerifiedClass::new(&loader, loader.package_classes()[0], 1000).unwrap();

    let target = class.bootstraps().target_of(0).expect("concatenation has a target");
    assert_eq!(target.class, name("java/util/Objects"));
    assert_eq!(target.name, member("toString"));
    assert!(class.bootstraps().get(0).unwrap().lambda.is_none());

    // `Objects.toString(Object)` is white-listed
    let errors = verify(&jar).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn unknown_bootstrap_factories_are_rejected() {
    init_logging();
    let mut class = ClassBuilder::new("a/Weird", Some(OBJECT));
    let factory = class.static_handle("a/Factory", "make", "()Ljava/lang/invoke/CallSite;");
    class.bootstrap(factory, vec![], "make");
    let mut jar = Jar::new();
    add_class(&mut jar, "a/Weird", &mut class);

    let errors = verify(&jar).unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, ErrorKind::IllegalBootstrapMethod);
    assert_eq!(errors[0].location, "a.Weird");
    assert_eq!(errors[0].message, "cannot resolve the target of bootstrap method 0");
}
