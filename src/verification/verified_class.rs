use super::annotations::Annotations;
use super::bootstraps::Bootstraps;
use super::class_loader::{ClassDecl, FieldDecl, MethodDecl, TakamakaClassLoader};
use super::pushers::Pushers;
use super::resolver::Resolver;
use super::Error;
use crate::jvm::class_file::{ClassFile, Code};
use crate::jvm::code::{CodeInstruction, Instruction, MethodBody, StackEffect};
use crate::jvm::{BinaryName, Name};

/// Decoded body of a method, along with the stack effect of each instruction
pub struct MethodCode {
    pub body: MethodBody,
    pub effects: Vec<StackEffect>,
}

impl MethodCode {
    pub fn new(file: &ClassFile, code: &Code) -> Result<MethodCode, Error> {
        let body = MethodBody::from_code(file, code)?;
        let effects = body
            .iter()
            .map(|(_, _, insn)| insn.stack_effect(file))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MethodCode { body, effects })
    }

    pub fn pushers(&self, instruction: usize, stack_offset: usize, max_states: usize) -> Pushers<'_> {
        Pushers::new(&self.body, &self.effects, instruction, stack_offset, max_states)
    }
}

/// Class of the jar under verification, along with everything the checks learned about it
///
/// Classes that pass verification are handed over to instrumentation, which reuses the resolver,
/// the annotations, the bootstraps, and the stack provenance queries computed here.
pub struct VerifiedClass<'g> {
    decl: &'g ClassDecl,
    loader: &'g TakamakaClassLoader<'g>,
    resolver: Resolver<'g>,
    annotations: Annotations<'g>,
    bootstraps: Bootstraps<'g>,

    /// Body of each method, in declaration order (`None` for abstract and native methods)
    code: Vec<Option<MethodCode>>,

    max_pusher_states: usize,
    pub(super) accepted: bool,
}

impl<'g> VerifiedClass<'g> {
    pub fn new(
        loader: &'g TakamakaClassLoader<'g>,
        decl: &'g ClassDecl,
        max_pusher_states: usize,
    ) -> Result<VerifiedClass<'g>, Error> {
        Self::analyze(loader, decl, max_pusher_states).map_err(|error| error.in_entry(&decl.entry))
    }

    fn analyze(
        loader: &'g TakamakaClassLoader<'g>,
        decl: &'g ClassDecl,
        max_pusher_states: usize,
    ) -> Result<VerifiedClass<'g>, Error> {
        let mut code = Vec::with_capacity(decl.file.methods.len());
        for method in &decl.file.methods {
            code.push(match decl.file.attribute::<Code>(&method.attributes)? {
                Some(attribute) => Some(MethodCode::new(&decl.file, &attribute)?),
                None => None,
            });
        }

        let resolver = Resolver::new(loader, decl);
        let annotations = Annotations::new(loader);
        let bootstraps = Bootstraps::new(loader, decl, &resolver, &annotations, &code)?;

        Ok(VerifiedClass {
            decl,
            loader,
            resolver,
            annotations,
            bootstraps,
            code,
            max_pusher_states,
            accepted: false,
        })
    }

    pub fn name(&self) -> &'g BinaryName {
        &self.decl.name
    }

    pub fn decl(&self) -> &'g ClassDecl {
        self.decl
    }

    pub fn class_file(&self) -> &'g ClassFile {
        &self.decl.file
    }

    pub fn loader(&self) -> &'g TakamakaClassLoader<'g> {
        self.loader
    }

    pub fn resolver(&self) -> &Resolver<'g> {
        &self.resolver
    }

    pub fn annotations(&self) -> &Annotations<'g> {
        &self.annotations
    }

    pub fn bootstraps(&self) -> &Bootstraps<'g> {
        &self.bootstraps
    }

    /// Did the class pass every check?
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn code(&self, method: &MethodDecl) -> Option<&MethodCode> {
        self.code.get(method.index).and_then(Option::as_ref)
    }

    /// Instructions that may have pushed the value `stack_offset` slots below the top of the
    /// stack, right before an instruction of a method executes
    pub fn pushers(
        &self,
        method: &MethodDecl,
        instruction: usize,
        stack_offset: usize,
    ) -> Option<Pushers<'_>> {
        self.code(method)
            .map(|code| code.pushers(instruction, stack_offset, self.max_pusher_states))
    }

    /// Method executed by a call instruction
    ///
    /// For dynamic call sites, this is the target of the bootstrap.
    pub fn resolved_executable(&self, insn: &CodeInstruction<usize>) -> Result<Option<&'g MethodDecl>, Error> {
        match insn {
            CodeInstruction::Regular(Instruction::Invoke(_, method)) => self.resolver.resolved_method(*method),
            CodeInstruction::Regular(Instruction::InvokeDynamic(call_site)) => {
                Ok(self.bootstraps.bootstrap_for(*call_site)?.target)
            }
            _ => Ok(None),
        }
    }

    /// Source file of the class, relative to the root of the sources
    ///
    /// Without a `SourceFile` attribute, this is the dotted name of the class.
    pub fn source_location(&self) -> Result<String, Error> {
        let name = self.decl.name.as_str();
        Ok(match self.decl.file.source_file()? {
            Some(file) => match name.rfind('/') {
                Some(slash) => format!("{}{}", &name[..=slash], file),
                None => file.to_owned(),
            },
            None => self.decl.name.to_dotted(),
        })
    }

    pub fn field_location(&self, field: &FieldDecl) -> Result<String, Error> {
        Ok(format!("{} field {}", self.source_location()?, field.name))
    }

    /// Location of a method, at an instruction or else at the start of its body
    pub fn method_location(&self, method: &MethodDecl, instruction: Option<usize>) -> Result<String, Error> {
        let file = self.source_location()?;
        let line = self
            .code(method)
            .and_then(|code| code.body.line_of(instruction.unwrap_or(0)));
        Ok(match line {
            Some(line) => format!("{}:{} method {}", file, line, method.name),
            None => format!("{} method {}", file, method.name),
        })
    }
}
