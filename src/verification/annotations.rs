use super::class_loader::{AnnotationFact, TakamakaClassLoader};
use super::Error;
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, UnqualifiedName};
use std::collections::BTreeSet;

/// Annotations of methods and constructors, as seen through the class hierarchy
///
/// Every lookup is first tried with the given descriptor, then with the
/// [expanded](MethodDescriptor::expanded) one, so that code already instrumented can be queried
/// with its original signature.
#[derive(Copy, Clone)]
pub struct Annotations<'g> {
    loader: &'g TakamakaClassLoader<'g>,
}

impl<'g> Annotations<'g> {
    pub fn new(loader: &'g TakamakaClassLoader<'g>) -> Self {
        Annotations { loader }
    }

    /// Annotation of the given kind on a method or constructor
    pub fn annotation(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        kind: &BinaryName,
    ) -> Result<Option<&'g AnnotationFact>, Error> {
        if let Some(annotation) = self.lookup(class, name, descriptor, kind)? {
            return Ok(Some(annotation));
        }
        self.lookup(class, name, &descriptor.expanded(), kind)
    }

    pub fn is_annotated(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        kind: &BinaryName,
    ) -> Result<bool, Error> {
        Ok(self.annotation(class, name, descriptor, kind)?.is_some())
    }

    pub fn is_payable(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<bool, Error> {
        self.is_annotated(class, name, descriptor, &BinaryName::PAYABLE)
    }

    pub fn is_red_payable(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<bool, Error> {
        self.is_annotated(class, name, descriptor, &BinaryName::RED_PAYABLE)
    }

    pub fn is_from_contract(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<bool, Error> {
        self.is_annotated(class, name, descriptor, &BinaryName::FROM_CONTRACT)
    }

    /// Type of the caller of from-contract code, if the code is from-contract
    ///
    /// Without an explicit class, any contract can call.
    pub fn from_contract_argument(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<Option<BinaryName>, Error> {
        Ok(self
            .annotation(class, name, descriptor, &BinaryName::FROM_CONTRACT)?
            .map(|annotation| {
                annotation
                    .class_value
                    .clone()
                    .unwrap_or(BinaryName::CONTRACT)
            }))
    }

    pub fn is_throws_exceptions(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<bool, Error> {
        self.is_annotated(class, name, descriptor, &BinaryName::THROWS_EXCEPTIONS)
    }

    pub fn is_self_charged(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<bool, Error> {
        self.is_annotated(class, name, descriptor, &BinaryName::SELF_CHARGED)
    }

    pub fn is_view(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<bool, Error> {
        self.is_annotated(class, name, descriptor, &BinaryName::VIEW)
    }

    pub fn is_exported(&self, class: &BinaryName) -> Result<bool, Error> {
        self.loader.is_exported(class)
    }

    /// Is the class, or one of its superclasses, white-listed during initialization?
    pub fn is_white_listed_during_initialization(&self, class: &BinaryName) -> Result<bool, Error> {
        Ok(self
            .loader
            .superclasses(class)?
            .iter()
            .any(|class| class.has_annotation(&BinaryName::WHITE_LISTED_DURING_INITIALIZATION)))
    }

    fn lookup(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        kind: &BinaryName,
    ) -> Result<Option<&'g AnnotationFact>, Error> {
        if name.is_constructor() {
            return self.constructor_annotation(class, &descriptor.parameters, kind);
        }
        self.method_annotation(class, name, descriptor, kind, &mut BTreeSet::new())
    }

    fn constructor_annotation(
        &self,
        class: &BinaryName,
        parameters: &[FieldType<BinaryName>],
        kind: &BinaryName,
    ) -> Result<Option<&'g AnnotationFact>, Error> {
        Ok(self
            .loader
            .load_class(class)?
            .declared_constructor(parameters)
            .and_then(|constructor| constructor.annotation(kind)))
    }

    fn method_annotation(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        kind: &BinaryName,
        visited: &mut BTreeSet<BinaryName>,
    ) -> Result<Option<&'g AnnotationFact>, Error> {
        if !visited.insert(class.clone()) {
            return Ok(None);
        }
        let decl = self.loader.load_class(class)?;

        if let Some(method) = decl.declared_method(name, descriptor) {
            if let Some(annotation) = method.annotation(kind) {
                return Ok(Some(annotation));
            }

            // Compilers do not copy annotations onto bridges
            return match &decl.superclass {
                Some(superclass) if method.is_bridge() && method.is_synthetic() && !method.is_private() => {
                    self.method_annotation(superclass, name, descriptor, kind, visited)
                }
                _ => Ok(None),
            };
        }

        for supertype in decl.superclass.iter().chain(&decl.interfaces) {
            if let Some(annotation) = self.method_annotation(supertype, name, descriptor, kind, visited)? {
                return Ok(Some(annotation));
            }
        }
        Ok(None)
    }
}
