//! Rules a class must obey to be installed
//!
//! Checks are plain functions, grouped into versioned [rule sets](RuleSet). Class checks run once
//! per class; method checks run once per method of the class, in declaration order. A check never
//! stops the ones after it: it records whatever problems it finds and lets the others run, so that
//! a single verification reports every problem of a jar. Only fatal conditions (such as a type
//! that cannot be found) abort the whole verification.

mod on_class;
mod on_method;

use super::class_loader::{ClassDecl, FieldDecl, MethodDecl, TakamakaClassLoader};
use super::verified_class::VerifiedClass;
use super::whitelist::WhiteListingWizard;
use super::{Error, ErrorKind, Settings, VerificationError};
use crate::jvm::code::{CodeInstruction, Instruction, InvokeType};

/// Check run once on a whole class
pub type ClassCheck = fn(&mut ClassContext<'_, '_>) -> Result<(), Error>;

/// Check run once on each method of a class
pub type MethodCheck = fn(&mut ClassContext<'_, '_>, &MethodDecl) -> Result<(), Error>;

/// Ordered lists of checks, selected by version
pub struct RuleSet {
    pub version: u32,
    pub class_checks: &'static [(&'static str, ClassCheck)],
    pub method_checks: &'static [(&'static str, MethodCheck)],
}

static RULE_SET_0: RuleSet = RuleSet {
    version: 0,
    class_checks: &[
        ("packages are legal", on_class::packages_are_legal as ClassCheck),
        ("names are not reserved", on_class::names_are_not_reserved as ClassCheck),
        ("bootstraps are legal", on_class::bootstraps_are_legal as ClassCheck),
        ("storage fields have storage types", on_class::storage_fields_have_storage_types as ClassCheck),
        ("from-contract code is called in context", on_class::from_contract_called_in_context as ClassCheck),
    ],
    method_checks: &[
        ("payable code receives an amount", on_method::payable_receives_amount as MethodCheck),
        ("throws-exceptions code is public", on_method::throws_exceptions_is_public as MethodCheck),
        ("payable code is from-contract", on_method::payable_is_from_contract as MethodCheck),
        ("from-contract code is in storage", on_method::from_contract_is_in_storage as MethodCheck),
        ("from-contract is consistent", on_method::from_contract_is_consistent as MethodCheck),
        ("payable is consistent", on_method::payable_is_consistent as MethodCheck),
        ("throws-exceptions is consistent", on_method::throws_exceptions_is_consistent as MethodCheck),
        ("not a static initializer", on_method::is_not_static_initializer as MethodCheck),
        ("not native", on_method::is_not_native as MethodCheck),
        ("not a finalizer", on_method::is_not_finalizer as MethodCheck),
        ("bytecodes are legal", on_method::bytecodes_are_legal as MethodCheck),
        ("not synchronized", on_method::is_not_synchronized as MethodCheck),
        ("caller is used on this", on_method::caller_is_used_on_this as MethodCheck),
        ("handlers catch checked exceptions", on_method::handlers_are_for_checked_exceptions as MethodCheck),
        ("used code is white-listed", on_method::used_code_is_white_listed as MethodCheck),
        ("self-charged code is legal", on_method::self_charged_is_legal as MethodCheck),
        ("amount is not modified", on_method::amount_is_not_modified as MethodCheck),
    ],
};

/// Rule set for a verification version, if there is one
pub fn rule_set(version: u32) -> Option<&'static RuleSet> {
    match version {
        0 => Some(&RULE_SET_0),
        _ => None,
    }
}

/// Everything a check can look at, plus the problems found so far in the class
pub struct ClassContext<'c, 'g> {
    pub class: &'c VerifiedClass<'g>,
    pub settings: &'c Settings,
    pub wizard: &'c dyn WhiteListingWizard,
    pub errors: Vec<VerificationError>,
}

impl<'c, 'g> ClassContext<'c, 'g> {
    pub fn new(
        class: &'c VerifiedClass<'g>,
        settings: &'c Settings,
        wizard: &'c dyn WhiteListingWizard,
    ) -> Self {
        ClassContext {
            class,
            settings,
            wizard,
            errors: vec![],
        }
    }

    pub fn decl(&self) -> &'g ClassDecl {
        self.class.decl()
    }

    pub fn loader(&self) -> &'g TakamakaClassLoader<'g> {
        self.class.loader()
    }

    pub fn issue(&mut self, kind: ErrorKind, location: String, message: impl Into<String>) {
        let error = VerificationError::new(kind, location, message);
        log::trace!("{}", error);
        self.errors.push(error);
    }

    pub fn issue_on_class(&mut self, kind: ErrorKind, message: impl Into<String>) -> Result<(), Error> {
        let location = self.class.source_location()?;
        self.issue(kind, location, message);
        Ok(())
    }

    pub fn issue_on_field(
        &mut self,
        kind: ErrorKind,
        field: &FieldDecl,
        message: impl Into<String>,
    ) -> Result<(), Error> {
        let location = self.class.field_location(field)?;
        self.issue(kind, location, message);
        Ok(())
    }

    /// Record a problem of a method, at an instruction or at the start of its body
    pub fn issue_on_method(
        &mut self,
        kind: ErrorKind,
        method: &MethodDecl,
        instruction: Option<usize>,
        message: impl Into<String>,
    ) -> Result<(), Error> {
        let location = self.class.method_location(method, instruction)?;
        self.issue(kind, location, message);
        Ok(())
    }
}

/// Run every check of a rule set on a class, returning the problems found
pub fn run(
    rules: &RuleSet,
    class: &VerifiedClass<'_>,
    settings: &Settings,
    wizard: &dyn WhiteListingWizard,
) -> Result<Vec<VerificationError>, Error> {
    let mut context = ClassContext::new(class, settings, wizard);
    for (name, check) in rules.class_checks {
        log::trace!("checking that {} in {}", name, class.name());
        check(&mut context)?;
    }
    for method in &class.decl().methods {
        for (name, check) in rules.method_checks {
            log::trace!("checking that {} in {}", name, method);
            check(&mut context, method)?;
        }
    }
    Ok(context.errors)
}

/// Do all the pushers of a stack slot satisfy a predicate?
///
/// `None` means that the query gave up before finding a pusher that does not.
pub(super) fn all_pushers(
    class: &VerifiedClass<'_>,
    method: &MethodDecl,
    instruction: usize,
    stack_offset: usize,
    predicate: impl Fn(&CodeInstruction<usize>) -> bool,
) -> Option<bool> {
    let code = class.code(method)?;
    for pusher in class.pushers(method, instruction, stack_offset)? {
        match pusher {
            Ok(pusher) => {
                if !code.body.get(pusher).map_or(false, &predicate) {
                    return Some(false);
                }
            }
            Err(_) => return None,
        }
    }
    Some(true)
}

/// Is the instruction a load from the given local variable?
pub(super) fn is_load_of(local: u16) -> impl Fn(&CodeInstruction<usize>) -> bool {
    move |insn| {
        matches!(
            insn,
            CodeInstruction::Regular(
                Instruction::ILoad(l)
                    | Instruction::LLoad(l)
                    | Instruction::FLoad(l)
                    | Instruction::DLoad(l)
                    | Instruction::ALoad(l)
            ) if *l == local
        )
    }
}

/// Is the instruction an `invokespecial` of a payable from-contract constructor, on `this`?
///
/// When the receiver cannot be traced, the call is assumed to be on `this`.
pub(super) fn calls_payable_constructor_on_this(
    class: &VerifiedClass<'_>,
    method: &MethodDecl,
    instruction: usize,
    insn: &CodeInstruction<usize>,
) -> Result<bool, Error> {
    let target = match insn {
        CodeInstruction::Regular(Instruction::Invoke(InvokeType::Special, target)) => {
            class.class_file().method_ref(*target)?
        }
        _ => return Ok(false),
    };
    let owner = match target.class.as_object() {
        Some(owner) if target.name.is_constructor() => owner,
        _ => return Ok(false),
    };

    let annotations = class.annotations();
    if !annotations.is_from_contract(owner, &target.name, &target.descriptor)?
        || !annotations.is_payable(owner, &target.name, &target.descriptor)?
    {
        return Ok(false);
    }
    let receiver = target.descriptor.parameter_length(false);
    Ok(all_pushers(class, method, instruction, receiver, is_load_of(0)) != Some(false))
}
