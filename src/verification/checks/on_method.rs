use super::{all_pushers, calls_payable_constructor_on_this, is_load_of, ClassContext};
use crate::jvm::code::{BranchInstruction, CodeInstruction, Instruction, InvokeType};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType, UnqualifiedName};
use crate::util::Width;
use crate::verification::{white_listing_model_of, Error, ErrorKind, Member, MethodDecl, WhiteListingModel};
use std::collections::{BTreeSet, VecDeque};

pub fn payable_receives_amount(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    if !is_payable(cx, method)? {
        return Ok(());
    }
    let has_amount = match method.descriptor.parameters.first() {
        Some(FieldType::Base(BaseType::Int | BaseType::Long)) => true,
        Some(FieldType::Ref(RefType::Object(class))) => *class == BinaryName::BIGINTEGER,
        _ => false,
    };
    if !has_amount {
        cx.issue_on_method(
            ErrorKind::PayableWithoutAmount,
            method,
            None,
            "a @Payable method must have a first argument for the paid amount, of type int, long or BigInteger",
        )?;
    }
    Ok(())
}

pub fn throws_exceptions_is_public(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    if class
        .annotations()
        .is_throws_exceptions(&method.class, &method.name, &method.descriptor)?
        && !method.is_public()
    {
        cx.issue_on_method(
            ErrorKind::ThrowsExceptionsOnNonPublic,
            method,
            None,
            "@ThrowsExceptions can only be applied to public methods and constructors",
        )?;
    }
    Ok(())
}

pub fn payable_is_from_contract(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    if is_payable(cx, method)?
        && !class
            .annotations()
            .is_from_contract(&method.class, &method.name, &method.descriptor)?
    {
        cx.issue_on_method(
            ErrorKind::PayableWithoutFromContract,
            method,
            None,
            "a @Payable method or constructor must be @FromContract",
        )?;
    }
    Ok(())
}

pub fn from_contract_is_in_storage(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    let loader = cx.loader();
    let argument = match class
        .annotations()
        .from_contract_argument(&method.class, &method.name, &method.descriptor)?
    {
        Some(argument) => argument,
        None => return Ok(()),
    };

    if !loader.is_contract(&argument)? {
        cx.issue_on_method(
            ErrorKind::IllegalFromContractArgument,
            method,
            None,
            format!("the argument of @FromContract must be a contract, not {}", argument),
        )?;
    }
    let decl = cx.decl();
    if method.is_static() || !(decl.is_interface() || loader.is_storage(&decl.name)?) {
        cx.issue_on_method(
            ErrorKind::FromContractNotInStorage,
            method,
            None,
            "@FromContract can only be applied to instance methods or constructors of storage classes or interfaces",
        )?;
    }
    Ok(())
}

pub fn from_contract_is_consistent(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let annotations = *cx.class.annotations();
    let loader = cx.loader();
    let own = annotations.from_contract_argument(&method.class, &method.name, &method.descriptor)?;

    for overridden in overridden_types(cx, method)? {
        let inherited = annotations.from_contract_argument(&overridden, &method.name, &method.descriptor)?;
        let consistent = match (&own, &inherited) {
            (None, None) => true,
            (Some(own), Some(inherited)) => loader.is_subclass_of(inherited, own)?,
            _ => false,
        };
        if !consistent {
            cx.issue_on_method(
                ErrorKind::InconsistentFromContract,
                method,
                None,
                format!("@FromContract is inconsistent with the overridden method in {}", overridden),
            )?;
        }
    }
    Ok(())
}

pub fn payable_is_consistent(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let annotations = *cx.class.annotations();
    let own = annotations.is_payable(&method.class, &method.name, &method.descriptor)?;

    for overridden in overridden_types(cx, method)? {
        if annotations.is_payable(&overridden, &method.name, &method.descriptor)? != own {
            cx.issue_on_method(
                ErrorKind::InconsistentPayable,
                method,
                None,
                format!("@Payable is inconsistent with the overridden method in {}", overridden),
            )?;
        }
    }
    Ok(())
}

pub fn throws_exceptions_is_consistent(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let annotations = *cx.class.annotations();
    let own = annotations.is_throws_exceptions(&method.class, &method.name, &method.descriptor)?;

    for overridden in overridden_types(cx, method)? {
        if annotations.is_throws_exceptions(&overridden, &method.name, &method.descriptor)? != own {
            cx.issue_on_method(
                ErrorKind::InconsistentThrowsExceptions,
                method,
                None,
                format!("@ThrowsExceptions is inconsistent with the overridden method in {}", overridden),
            )?;
        }
    }
    Ok(())
}

/// Supertypes of the class declaring a non-private method with the same signature
///
/// Constructors and private methods override nothing. Superclasses come before interfaces,
/// nearest first.
fn overridden_types(cx: &ClassContext<'_, '_>, method: &MethodDecl) -> Result<Vec<BinaryName>, Error> {
    if method.is_constructor() || method.is_private() || method.name == UnqualifiedName::CLINIT {
        return Ok(vec![]);
    }

    let loader = cx.loader();
    let decl = cx.decl();
    let mut overridden = vec![];
    let mut visited = BTreeSet::new();
    let mut to_visit: VecDeque<BinaryName> = decl
        .superclass
        .iter()
        .chain(decl.interfaces.iter())
        .cloned()
        .collect();
    while let Some(current) = to_visit.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let class = loader.load_class(&current)?;
        if let Some(declared) = class.declared_method(&method.name, &method.descriptor) {
            if !declared.is_private() {
                overridden.push(current);
            }
        }
        to_visit.extend(class.superclass.iter().chain(class.interfaces.iter()).cloned());
    }
    Ok(overridden)
}

pub fn is_not_static_initializer(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    if method.name != UnqualifiedName::CLINIT {
        return Ok(());
    }

    let decl = cx.decl();
    if decl.is_enum() || decl.is_synthetic() {
        // Enumerations and synthetic classes may only initialize their constants
        let extra_fields = decl.fields.iter().any(|field| {
            field.is_static()
                && !field.is_synthetic()
                && !field.is_enum_constant()
                && !(field.is_final() && field.has_constant_value)
        });
        if !extra_fields {
            return Ok(());
        }
    }
    cx.issue_on_method(
        ErrorKind::IllegalStaticInitialization,
        method,
        Some(0),
        "illegal static initialization: only enumerations and synthetic classes can initialize their constants",
    )
}

pub fn is_not_native(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    if method.is_native() {
        cx.issue_on_method(
            ErrorKind::IllegalNativeMethod,
            method,
            None,
            "native methods are not allowed",
        )?;
    }
    Ok(())
}

pub fn is_not_finalizer(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    if !method.is_static()
        && method.name == UnqualifiedName::FINALIZE
        && method.descriptor.parameters.is_empty()
        && method.descriptor.return_type.is_none()
    {
        cx.issue_on_method(
            ErrorKind::IllegalFinalizer,
            method,
            None,
            "finalizers are not allowed",
        )?;
    }
    Ok(())
}

pub fn bytecodes_are_legal(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    let code = match class.code(method) {
        Some(code) => code,
        None => return Ok(()),
    };
    let can_put_static = method.is_synthetic() || method.name == UnqualifiedName::CLINIT;
    let during_initialization = cx.settings.during_initialization;

    for (_, idx, insn) in code.body.iter() {
        let (kind, message) = match insn {
            CodeInstruction::Regular(Instruction::PutStatic(_)) if !can_put_static => (
                ErrorKind::IllegalPutstaticInstruction,
                "static fields can only be updated inside the static initializer",
            ),
            CodeInstruction::Branch(BranchInstruction::Jsr(_)) => {
                (ErrorKind::IllegalJsrInstruction, "bytecode JSR is not allowed")
            }
            CodeInstruction::Branch(BranchInstruction::Ret(_)) => {
                (ErrorKind::IllegalRetInstruction, "bytecode RET is not allowed")
            }
            CodeInstruction::Regular(Instruction::MonitorEnter | Instruction::MonitorExit)
                if !during_initialization =>
            {
                (ErrorKind::IllegalSynchronization, "synchronization is not allowed")
            }
            CodeInstruction::Regular(
                Instruction::IStore(0)
                | Instruction::LStore(0)
                | Instruction::FStore(0)
                | Instruction::DStore(0)
                | Instruction::AStore(0),
            ) if !method.is_static() => (
                ErrorKind::IllegalUpdateOfLocal0,
                "local 0 (this) cannot be modified",
            ),
            _ => continue,
        };
        cx.issue_on_method(kind, method, Some(idx), message)?;
    }
    Ok(())
}

pub fn is_not_synchronized(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    if method.is_synchronized() && !cx.settings.during_initialization {
        cx.issue_on_method(
            ErrorKind::IllegalSynchronization,
            method,
            None,
            "synchronized methods are not allowed",
        )?;
    }
    Ok(())
}

pub fn caller_is_used_on_this(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    let loader = cx.loader();
    let code = match class.code(method) {
        Some(code) => code,
        None => return Ok(()),
    };
    let in_from_contract = class.bootstraps().is_part_of_from_contract(method)
        || class
            .annotations()
            .is_from_contract(&method.class, &method.name, &method.descriptor)?;

    for (_, idx, insn) in code.body.iter() {
        let target = match insn {
            CodeInstruction::Regular(Instruction::Invoke(invoke, target)) if *invoke != InvokeType::Static => {
                class.class_file().method_ref(*target)?
            }
            _ => continue,
        };
        let owner = match target.class.as_object() {
            Some(owner) => owner,
            None => continue,
        };
        let is_caller = target.name == UnqualifiedName::CALLER
            && target.descriptor.parameters.is_empty()
            && target.descriptor.return_type == Some(FieldType::object(BinaryName::CONTRACT))
            && loader.is_storage(owner)?;
        if !is_caller {
            continue;
        }

        if !in_from_contract {
            cx.issue_on_method(
                ErrorKind::CallerOutsideFromContract,
                method,
                Some(idx),
                "caller() can only be used inside a @FromContract method or constructor",
            )?;
        }
        if all_pushers(class, method, idx, 0, is_load_of(0)) != Some(true) {
            cx.issue_on_method(
                ErrorKind::CallerNotOnThis,
                method,
                Some(idx),
                "caller() can only be called on \"this\"",
            )?;
        }
    }
    Ok(())
}

pub fn handlers_are_for_checked_exceptions(
    cx: &mut ClassContext<'_, '_>,
    method: &MethodDecl,
) -> Result<(), Error> {
    let class = cx.class;
    let loader = cx.loader();
    let code = match class.code(method) {
        Some(code) => code,
        None => return Ok(()),
    };
    // Synthetic classes made for switches over enumerations guard their initialization this way
    let allows_missing_fields = class.decl().is_synthetic() && method.name == UnqualifiedName::CLINIT;

    for handler in &code.body.exception_handlers {
        let caught = match handler.catch_type {
            Some(catch_type) => class.class_file().class_name(catch_type)?,
            None => continue,
        };
        if allows_missing_fields && caught == BinaryName::NOSUCHFIELDERROR {
            continue;
        }

        let unchecked = loader.is_subclass_of(&caught, &BinaryName::RUNTIMEEXCEPTION)?
            || loader.is_subclass_of(&caught, &BinaryName::ERROR)?
            || loader.is_subclass_of(&BinaryName::RUNTIMEEXCEPTION, &caught)?
            || loader.is_subclass_of(&BinaryName::ERROR, &caught)?;
        if unchecked {
            cx.issue_on_method(
                ErrorKind::UncheckedExceptionHandler,
                method,
                Some(handler.handler),
                format!("exception handler for unchecked exception {}", caught),
            )?;
        }
    }
    Ok(())
}

pub fn used_code_is_white_listed(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    let loader = cx.loader();
    let wizard = cx.wizard;
    let version = cx.settings.version();
    let during_initialization = cx.settings.during_initialization;
    let code = match class.code(method) {
        Some(code) => code,
        None => return Ok(()),
    };

    for (_, idx, insn) in code.body.iter() {
        match insn {
            CodeInstruction::Regular(
                Instruction::GetStatic(field)
                | Instruction::PutStatic(field)
                | Instruction::GetField(field)
                | Instruction::PutField(field),
            ) => {
                let model = match class.resolver().resolved_field(*field)? {
                    Some(resolved) => white_listing_model_of(loader, wizard, version, Member::Field(resolved))?,
                    None => None,
                };
                if model.is_none() {
                    let field = class.class_file().field_ref(*field)?;
                    cx.issue_on_method(
                        ErrorKind::IllegalAccessToNonWhiteListedField,
                        method,
                        Some(idx),
                        format!(
                            "illegal access to non-white-listed field {}.{}",
                            owner_name(&field.class),
                            field.name
                        ),
                    )?;
                }
            }
            CodeInstruction::Regular(Instruction::Invoke(invoke, target)) => {
                let model = match class.resolved_executable(insn)? {
                    Some(resolved) => {
                        let model = white_listing_model_of(loader, wizard, version, Member::Method(resolved))?;
                        usable_model(cx, *invoke, resolved, model, during_initialization)?
                    }
                    None => None,
                };
                if model.is_none() {
                    let target = class.class_file().method_ref(*target)?;
                    let (kind, what) = if target.name.is_constructor() {
                        (ErrorKind::IllegalCallToNonWhiteListedConstructor, "constructor")
                    } else {
                        (ErrorKind::IllegalCallToNonWhiteListedMethod, "method")
                    };
                    cx.issue_on_method(
                        kind,
                        method,
                        Some(idx),
                        format!(
                            "illegal call to non-white-listed {} {}.{}",
                            what,
                            owner_name(&target.class),
                            target.name
                        ),
                    )?;
                }
            }
            CodeInstruction::Regular(Instruction::InvokeDynamic(_)) => {
                // Bootstraps without a target are rejected on the class
                if let Some(resolved) = class.resolved_executable(insn)? {
                    let model = white_listing_model_of(loader, wizard, version, Member::Method(resolved))?;
                    let model = usable_model(cx, InvokeType::Virtual, resolved, model, during_initialization)?;
                    if model.is_none() {
                        cx.issue_on_method(
                            ErrorKind::IllegalCallToNonWhiteListedMethod,
                            method,
                            Some(idx),
                            format!("illegal call to non-white-listed method {}.{}", resolved.class, resolved.name),
                        )?;
                    }
                }
            }
            _ => (),
        }
    }
    Ok(())
}

/// Class named by a symbolic reference (members of arrays belong to `java.lang.Object`)
fn owner_name(class: &RefType<BinaryName>) -> String {
    class.as_object().unwrap_or(&BinaryName::OBJECT).to_string()
}

/// Drop models that cannot be used from a given call
fn usable_model(
    cx: &ClassContext<'_, '_>,
    invoke: InvokeType,
    target: &MethodDecl,
    model: Option<WhiteListingModel>,
    during_initialization: bool,
) -> Result<Option<WhiteListingModel>, Error> {
    let model = match model {
        Some(model) => model,
        None => return Ok(None),
    };

    // `super.hashCode()` would reach the identity hash code of `java.lang.Object`
    if invoke == InvokeType::Special
        && target.class == BinaryName::OBJECT
        && model.receiver.iter().any(|obligation| obligation.requires_hash_code())
    {
        return Ok(None);
    }
    if !during_initialization
        && cx
            .class
            .annotations()
            .is_white_listed_during_initialization(&target.class)?
    {
        return Ok(None);
    }
    Ok(Some(model))
}

pub fn self_charged_is_legal(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    if !class
        .annotations()
        .is_self_charged(&method.class, &method.name, &method.descriptor)?
    {
        return Ok(());
    }

    if !cx.settings.allow_self_charged {
        cx.issue_on_method(
            ErrorKind::SelfChargedNotAllowed,
            method,
            None,
            "@SelfCharged methods are not allowed",
        )?;
    } else if !method.is_public()
        || method.is_static()
        || method.is_constructor()
        || !cx.loader().is_contract(&method.class)?
    {
        cx.issue_on_method(
            ErrorKind::IllegalSelfCharged,
            method,
            None,
            "@SelfCharged can only be applied to public instance methods of contracts",
        )?;
    }
    Ok(())
}

pub fn amount_is_not_modified(cx: &mut ClassContext<'_, '_>, method: &MethodDecl) -> Result<(), Error> {
    let class = cx.class;
    if method.is_static()
        || !method.is_constructor()
        || !class
            .annotations()
            .is_payable(&method.class, &method.name, &method.descriptor)?
    {
        return Ok(());
    }
    let code = match class.code(method) {
        Some(code) => code,
        None => return Ok(()),
    };

    for (_, idx, insn) in code.body.iter() {
        if !calls_payable_constructor_on_this(class, method, idx, insn)? {
            continue;
        }
        let target = match insn {
            CodeInstruction::Regular(Instruction::Invoke(_, target)) => class.class_file().method_ref(*target)?,
            _ => continue,
        };
        // The amount is the first argument: skip the slots of the others
        let amount_offset = target
            .descriptor
            .parameters
            .iter()
            .skip(1)
            .map(Width::width)
            .sum::<usize>();
        if all_pushers(class, method, idx, amount_offset, is_load_of(1)) != Some(true) {
            return cx.issue_on_method(
                ErrorKind::IllegalModificationOfAmount,
                method,
                Some(idx),
                "the paid amount cannot be modified in constructor chaining",
            );
        }
    }
    Ok(())
}

fn is_payable(cx: &ClassContext<'_, '_>, method: &MethodDecl) -> Result<bool, Error> {
    let annotations = cx.class.annotations();
    Ok(annotations.is_payable(&method.class, &method.name, &method.descriptor)?
        || annotations.is_red_payable(&method.class, &method.name, &method.descriptor)?)
}
