use super::annotations::Annotations;
use super::class_loader::{ClassDecl, MethodDecl, TakamakaClassLoader};
use super::resolver::Resolver;
use super::verified_class::MethodCode;
use super::Error;
use crate::jvm::class_file::{BootstrapMethod, ClassFile, MethodHandleRef, MethodRef};
use crate::jvm::code::{CodeInstruction, Instruction, InvokeType};
use crate::jvm::{
    self, BinaryName, Constant, ConstantIndex, FieldType, InvokeDynamicConstantIndex,
    MethodDescriptor, RenderDescriptor, UnqualifiedName,
};
use std::collections::BTreeSet;

const METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";
const MAKECONCATWITHCONSTANTS_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";

/// Entry of the `BootstrapMethods` attribute of a class
pub struct BootstrapEntry<'g> {
    /// Position in the `BootstrapMethods` attribute
    pub index: usize,

    pub method: BootstrapMethod,

    /// Method called at the dynamic call site, when it is known
    ///
    /// For lambdas and method references, this is the implementation method. For string
    /// concatenation, this is `java.util.Objects.toString(Object)`, which is what ends up being
    /// called on every argument. Other bootstraps have no known target.
    pub target: Option<&'g MethodDecl>,

    /// Method handle passed as implementation of a lambda (second bootstrap argument)
    pub implementation: Option<MethodRef>,

    /// Synthetic method of this same class implementing the lambda
    pub lambda: Option<&'g MethodDecl>,

    /// Is the lambda implemented by from-contract code?
    pub lambda_is_from_contract: bool,
}

/// Analysis of the dynamic call sites of a class
///
/// Beside the targets of the bootstraps, this computes which bootstraps eventually lead to
/// from-contract code (directly, or through a chain of lambdas), and which lambdas of the class
/// are reachable from its from-contract methods.
pub struct Bootstraps<'g> {
    class: &'g ClassDecl,
    entries: Vec<BootstrapEntry<'g>>,

    /// Indices of entries leading to from-contract code, in order of discovery
    leading_to_from_contract: Vec<usize>,

    /// Indices (among the methods of the class) of lambdas reachable from from-contract code
    lambdas_part_of_from_contract: BTreeSet<usize>,
}

impl<'g> Bootstraps<'g> {
    /// Analyze the bootstraps of a class
    ///
    /// `code` holds the decoded body of each method of the class (in declaration order).
    pub fn new(
        loader: &'g TakamakaClassLoader<'g>,
        class: &'g ClassDecl,
        resolver: &Resolver<'g>,
        annotations: &Annotations<'g>,
        code: &[Option<MethodCode>],
    ) -> Result<Bootstraps<'g>, Error> {
        let file = &class.file;
        let mut entries = vec![];
        for (index, method) in file.bootstrap_methods()?.into_iter().enumerate() {
            let implementation = match method.bootstrap_arguments.get(1) {
                Some(argument) => handle_method(file, *argument)?,
                None => None,
            };
            let lambda_method = match &implementation {
                Some(implementation)
                    if method.bootstrap_arguments.len() == 3 && !implementation.is_interface =>
                {
                    Some(implementation)
                }
                _ => None,
            };

            let lambda_is_from_contract = match lambda_method.map(|m| (m, m.class.as_object())) {
                Some((implementation, Some(owner))) => annotations.is_from_contract(
                    owner,
                    &implementation.name,
                    &implementation.descriptor,
                )?,
                _ => false,
            };
            let lambda = lambda_method
                .filter(|implementation| implementation.class.as_object() == Some(&class.name))
                .and_then(|implementation| {
                    class.declared_method(&implementation.name, &implementation.descriptor)
                });

            entries.push(BootstrapEntry {
                index,
                target: target_of(loader, file, resolver, &method)?,
                method,
                implementation,
                lambda,
                lambda_is_from_contract,
            });
        }

        let mut bootstraps = Bootstraps {
            class,
            entries,
            leading_to_from_contract: vec![],
            lambdas_part_of_from_contract: BTreeSet::new(),
        };
        bootstraps.collect_leading_to_from_contract(annotations, code)?;
        bootstraps.collect_lambdas_part_of_from_contract(annotations, code)?;
        Ok(bootstraps)
    }

    pub fn entries(&self) -> &[BootstrapEntry<'g>] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&BootstrapEntry<'g>> {
        self.entries.get(index)
    }

    /// Entry used by a dynamic call site
    pub fn bootstrap_for(&self, call_site: InvokeDynamicConstantIndex) -> Result<&BootstrapEntry<'g>, Error> {
        let index = self.class.file.invoke_dynamic(call_site)?.bootstrap_method as usize;
        self.entries.get(index).ok_or_else(|| {
            Error::from(jvm::Error::BadAttribute {
                name: "BootstrapMethods",
                message: format!("illegal bootstrap method index {}", index),
            })
        })
    }

    pub fn target_of(&self, index: usize) -> Option<&'g MethodDecl> {
        self.entries.get(index).and_then(|entry| entry.target)
    }

    /// Entries leading to from-contract code, in a deterministic order
    pub fn leading_to_from_contract(&self) -> impl Iterator<Item = &BootstrapEntry<'g>> {
        self.leading_to_from_contract
            .iter()
            .map(move |index| &self.entries[*index])
    }

    pub fn is_leading_to_from_contract(&self, index: usize) -> bool {
        self.leading_to_from_contract.contains(&index)
    }

    /// Is the method a lambda of this class, reachable from from-contract code?
    pub fn is_part_of_from_contract(&self, method: &MethodDecl) -> bool {
        method.class == self.class.name && self.lambdas_part_of_from_contract.contains(&method.index)
    }

    /// Methods of the class implementing lambdas
    pub fn lambdas(&self) -> impl Iterator<Item = &'g MethodDecl> + '_ {
        self.entries.iter().filter_map(|entry| entry.lambda)
    }

    fn collect_leading_to_from_contract(
        &mut self,
        annotations: &Annotations<'g>,
        code: &[Option<MethodCode>],
    ) -> Result<(), Error> {
        loop {
            let initial = self.leading_to_from_contract.len();
            for index in 0..self.entries.len() {
                if self.is_leading_to_from_contract(index) {
                    continue;
                }
                let entry = &self.entries[index];
                let leads = entry.lambda_is_from_contract
                    || match entry.lambda {
                        Some(lambda) => self.calls_from_contract(annotations, code, lambda)?,
                        None => false,
                    };
                if leads {
                    log::trace!("bootstrap {} of {} leads to from-contract code", index, self.class.name);
                    self.leading_to_from_contract.push(index);
                }
            }
            if self.leading_to_from_contract.len() == initial {
                return Ok(());
            }
        }
    }

    fn calls_from_contract(
        &self,
        annotations: &Annotations<'g>,
        code: &[Option<MethodCode>],
        lambda: &MethodDecl,
    ) -> Result<bool, Error> {
        let code = match code.get(lambda.index) {
            Some(Some(code)) => code,
            _ => return Ok(false),
        };
        for (_, _, insn) in code.body.iter() {
            if self.leads_to_from_contract(annotations, insn)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn leads_to_from_contract(
        &self,
        annotations: &Annotations<'g>,
        insn: &CodeInstruction<usize>,
    ) -> Result<bool, Error> {
        match insn {
            CodeInstruction::Regular(Instruction::InvokeDynamic(call_site)) => {
                let entry = self.bootstrap_for(*call_site)?;
                Ok(self.is_leading_to_from_contract(entry.index))
            }
            CodeInstruction::Regular(Instruction::Invoke(invoke, method))
                if *invoke != InvokeType::Static =>
            {
                let method = self.class.file.method_ref(*method)?;
                match method.class.as_object() {
                    Some(owner) => annotations.is_from_contract(owner, &method.name, &method.descriptor),
                    None => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    fn collect_lambdas_part_of_from_contract(
        &mut self,
        annotations: &Annotations<'g>,
        code: &[Option<MethodCode>],
    ) -> Result<(), Error> {
        let class = self.class;
        let mut worklist = vec![];
        for method in &class.methods {
            if annotations.is_from_contract(&class.name, &method.name, &method.descriptor)? {
                worklist.push(method);
            }
        }

        while let Some(current) = worklist.pop() {
            let code = match code.get(current.index) {
                Some(Some(code)) => code,
                _ => continue,
            };
            for (_, _, insn) in code.body.iter() {
                if let CodeInstruction::Regular(Instruction::InvokeDynamic(call_site)) = insn {
                    let lambda = self.bootstrap_for(*call_site)?.lambda;
                    if let Some(lambda) = lambda {
                        if lambda.is_private()
                            && lambda.is_synthetic()
                            && self.lambdas_part_of_from_contract.insert(lambda.index)
                        {
                            log::trace!("lambda {} is part of from-contract code", lambda);
                            worklist.push(lambda);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Method behind a method handle constant, if the constant is a method handle to a method
fn handle_method(file: &ClassFile, index: ConstantIndex) -> Result<Option<MethodRef>, jvm::Error> {
    match file.constant(index)? {
        Constant::MethodHandle { .. } => match file.method_handle(index)? {
            MethodHandleRef::Method(_, method) => Ok(Some(method)),
            MethodHandleRef::Field(_, _) => Ok(None),
        },
        _ => Ok(None),
    }
}

fn target_of<'g>(
    loader: &'g TakamakaClassLoader<'g>,
    file: &ClassFile,
    resolver: &Resolver<'g>,
    bootstrap: &BootstrapMethod,
) -> Result<Option<&'g MethodDecl>, Error> {
    let factory = match handle_method(file, bootstrap.bootstrap_method)? {
        Some(factory) if !factory.is_interface => factory,
        _ => return Ok(None),
    };
    let factory_class = factory.class.as_object();
    let factory_descriptor = factory.descriptor.render();

    if factory_class == Some(&BinaryName::LAMBDAMETAFACTORY)
        && factory.name == UnqualifiedName::METAFACTORY
        && factory_descriptor == METAFACTORY_DESCRIPTOR
    {
        let implementation = bootstrap.bootstrap_arguments.get(1).ok_or_else(|| {
            Error::from(jvm::Error::BadAttribute {
                name: "BootstrapMethods",
                message: format!(
                    "illegal bootstrap arguments count {}",
                    bootstrap.bootstrap_arguments.len()
                ),
            })
        })?;
        match handle_method(file, *implementation)? {
            Some(implementation) => resolver.resolve_method(&implementation),
            None => Ok(None),
        }
    } else if factory_class == Some(&BinaryName::STRINGCONCATFACTORY)
        && factory.name == UnqualifiedName::MAKECONCATWITHCONSTANTS
        && factory_descriptor == MAKECONCATWITHCONSTANTS_DESCRIPTOR
    {
        let to_string = MethodDescriptor {
            parameters: vec![FieldType::object(BinaryName::OBJECT)],
            return_type: Some(FieldType::object(BinaryName::STRING)),
        };
        loader.resolve_method(&BinaryName::OBJECTS, &UnqualifiedName::TOSTRING, &to_string)
    } else {
        Ok(None)
    }
}
