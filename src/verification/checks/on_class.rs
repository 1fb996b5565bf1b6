use super::{all_pushers, calls_payable_constructor_on_this, is_load_of, ClassContext};
use crate::jvm::code::{CodeInstruction, Instruction, InvokeType};
use crate::jvm::{BinaryName, FieldType, Name, RefType};
use crate::verification::{Error, ErrorKind, MethodDecl, VerifiedClass};
use std::collections::BTreeSet;

/// Prefix that instrumentation reserves for the names it generates
const RESERVED_PREFIX: &str = "§";

pub fn packages_are_legal(cx: &mut ClassContext<'_, '_>) -> Result<(), Error> {
    let name = cx.decl().name.to_dotted();
    if name.starts_with("java.") || name.starts_with("javax.") {
        cx.issue_on_class(
            ErrorKind::IllegalPackageName,
            "package java.* and javax.* are not allowed",
        )?;
    } else if name.starts_with("io.takamaka.code.") && !cx.settings.during_initialization {
        cx.issue_on_class(
            ErrorKind::IllegalPackageName,
            "package io.takamaka.code.* is only allowed during initialization",
        )?;
    }
    Ok(())
}

pub fn names_are_not_reserved(cx: &mut ClassContext<'_, '_>) -> Result<(), Error> {
    let decl = cx.decl();
    for field in &decl.fields {
        if field.name.as_str().starts_with(RESERVED_PREFIX) {
            let message = format!("field names cannot start with {}", RESERVED_PREFIX);
            cx.issue_on_field(ErrorKind::IllegalFieldName, field, message)?;
        }
    }
    for method in &decl.methods {
        if method.name.as_str().starts_with(RESERVED_PREFIX) {
            let message = format!("method names cannot start with {}", RESERVED_PREFIX);
            cx.issue_on_method(ErrorKind::IllegalMethodName, method, None, message)?;
        }
    }
    Ok(())
}

pub fn bootstraps_are_legal(cx: &mut ClassContext<'_, '_>) -> Result<(), Error> {
    let class = cx.class;
    for entry in class.bootstraps().entries() {
        if entry.target.is_none() {
            cx.issue_on_class(
                ErrorKind::IllegalBootstrapMethod,
                format!("cannot resolve the target of bootstrap method {}", entry.index),
            )?;
        }
    }
    Ok(())
}

pub fn storage_fields_have_storage_types(cx: &mut ClassContext<'_, '_>) -> Result<(), Error> {
    let decl = cx.decl();
    let loader = cx.loader();
    if !loader.is_storage(&decl.name)? {
        return Ok(());
    }

    for field in &decl.fields {
        if field.is_static() || field.is_transient() {
            continue;
        }
        let allowed = match &field.descriptor {
            FieldType::Base(_) => true,
            FieldType::Ref(RefType::Object(class)) => {
                *class == BinaryName::OBJECT
                    || *class == BinaryName::STRING
                    || *class == BinaryName::BIGINTEGER
                    || loader.is_interface(class)?
                    || is_enum_without_instance_fields(cx, class)?
                    || loader.is_storage(class)?
            }
            FieldType::Ref(_) => false,
        };
        if !allowed {
            cx.issue_on_field(
                ErrorKind::IllegalTypeForStorageField,
                field,
                "type not allowed for a field of a storage class",
            )?;
        }
    }
    Ok(())
}

fn is_enum_without_instance_fields(cx: &ClassContext<'_, '_>, class: &BinaryName) -> Result<bool, Error> {
    let class = cx.loader().load_class(class)?;
    Ok(class.is_enum() && class.fields.iter().all(|field| field.is_static()))
}

/// Call of from-contract code found in a method
struct FromContractCall {
    instruction: usize,
    name: String,

    /// Is the receiver `this`? `None` when the receiver could not be traced.
    on_this: Option<bool>,
}

pub fn from_contract_called_in_context(cx: &mut ClassContext<'_, '_>) -> Result<(), Error> {
    let class = cx.class;
    let decl = cx.decl();
    let loader = cx.loader();
    let annotations = class.annotations();

    let is_storage = loader.is_storage(&decl.name)?;
    let is_contract = loader.is_contract(&decl.name)?;
    let unreachable_lambdas = if is_storage {
        lambdas_unreachable_from_static_methods(class)?
    } else {
        BTreeSet::new()
    };

    for method in &decl.methods {
        let is_static = method.is_static();
        let in_from_contract = class.bootstraps().is_part_of_from_contract(method)
            || annotations.is_from_contract(&decl.name, &method.name, &method.descriptor)?;

        for call in from_contract_calls(class, method)? {
            let instruction = Some(call.instruction);
            if is_static && !unreachable_lambdas.contains(&method.index) {
                cx.issue_on_method(
                    ErrorKind::IllegalCallToFromContract,
                    method,
                    instruction,
                    only_from_contracts(&call.name),
                )?;
            }
            if !is_contract && (is_static || call.on_this != Some(true)) {
                cx.issue_on_method(
                    ErrorKind::IllegalCallToFromContract,
                    method,
                    instruction,
                    only_from_contracts(&call.name),
                )?;
            }
            if !is_storage && !is_static && call.on_this != Some(false) {
                cx.issue_on_method(
                    ErrorKind::IllegalCallToFromContract,
                    method,
                    instruction,
                    only_from_contracts(&call.name),
                )?;
            }
            if !is_static && !in_from_contract && call.on_this != Some(false) {
                cx.issue_on_method(
                    ErrorKind::IllegalCallToFromContractOnThis,
                    method,
                    instruction,
                    format!(
                        "\"{}\" is @FromContract and can only be called on this from a @FromContract method or constructor",
                        call.name
                    ),
                )?;
            }
        }

        if !is_static
            && method.is_constructor()
            && !annotations.is_payable(&decl.name, &method.name, &method.descriptor)?
        {
            if let Some(code) = class.code(method) {
                for (_, idx, insn) in code.body.iter() {
                    if calls_payable_constructor_on_this(class, method, idx, insn)? {
                        cx.issue_on_method(
                            ErrorKind::IllegalCallToPayableConstructorOnThis,
                            method,
                            Some(idx),
                            "only a @Payable constructor can call a @Payable constructor on this",
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn only_from_contracts(name: &str) -> String {
    format!(
        "\"{}\" is @FromContract and can only be called from an instance method or constructor of a contract",
        name
    )
}

fn from_contract_calls(class: &VerifiedClass<'_>, method: &MethodDecl) -> Result<Vec<FromContractCall>, Error> {
    let code = match class.code(method) {
        Some(code) => code,
        None => return Ok(vec![]),
    };

    let mut calls = vec![];
    for (_, idx, insn) in code.body.iter() {
        match insn {
            CodeInstruction::Regular(Instruction::InvokeDynamic(call_site)) => {
                let entry = class.bootstraps().bootstrap_for(*call_site)?;
                match &entry.implementation {
                    Some(implementation) if entry.lambda_is_from_contract => {
                        calls.push(FromContractCall {
                            instruction: idx,
                            name: implementation.name.to_string(),
                            on_this: Some(false),
                        })
                    }
                    _ => (),
                }
            }
            CodeInstruction::Regular(Instruction::Invoke(invoke, target)) if *invoke != InvokeType::Static => {
                let target = class.class_file().method_ref(*target)?;
                let owner = match target.class.as_object() {
                    Some(owner) => owner,
                    None => continue,
                };
                if class
                    .annotations()
                    .is_from_contract(owner, &target.name, &target.descriptor)?
                {
                    let receiver = target.descriptor.parameter_length(false);
                    calls.push(FromContractCall {
                        instruction: idx,
                        name: target.name.to_string(),
                        on_this: all_pushers(class, method, idx, receiver, is_load_of(0)),
                    });
                }
            }
            _ => (),
        }
    }
    Ok(calls)
}

/// Lambdas of the class that no static method reaches
///
/// Lambdas are compiled into static methods, but they only run in a static context when some
/// static method creates them.
fn lambdas_unreachable_from_static_methods(class: &VerifiedClass<'_>) -> Result<BTreeSet<usize>, Error> {
    let lambdas: BTreeSet<usize> = class.bootstraps().lambdas().map(|lambda| lambda.index).collect();

    let mut reached = BTreeSet::new();
    let mut worklist: Vec<&MethodDecl> = class
        .decl()
        .methods
        .iter()
        .filter(|method| method.is_static() && !lambdas.contains(&method.index))
        .collect();
    while let Some(current) = worklist.pop() {
        let code = match class.code(current) {
            Some(code) => code,
            None => continue,
        };
        for (_, _, insn) in code.body.iter() {
            if let CodeInstruction::Regular(Instruction::InvokeDynamic(call_site)) = insn {
                if let Some(lambda) = class.bootstraps().bootstrap_for(*call_site)?.lambda {
                    if reached.insert(lambda.index) {
                        worklist.push(lambda);
                    }
                }
            }
        }
    }

    Ok(lambdas.difference(&reached).copied().collect())
}
