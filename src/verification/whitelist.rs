use super::class_loader::{ClassOrigin, FieldDecl, MethodDecl, TakamakaClassLoader};
use super::Error;
use crate::jvm::{BinaryName, RenderDescriptor, UnqualifiedName};
use std::collections::BTreeMap;

/// Condition that must hold, at run time, for a white-listed member to be used
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProofObligation {
    /// The value must be `false`
    MustBeFalse,

    /// The value must belong to a class that redefines `hashCode`
    MustRedefineHashCode,

    /// The value must belong to a class that redefines `hashCode` or `toString`
    MustRedefineHashCodeOrToString,

    HasDeterministicTerminatingEquals,
    HasDeterministicTerminatingHashCode,
    HasDeterministicTerminatingToString,
}

impl ProofObligation {
    /// Does the obligation ask for a redefinition of `hashCode`?
    pub fn requires_hash_code(&self) -> bool {
        matches!(
            self,
            ProofObligation::MustRedefineHashCode | ProofObligation::MustRedefineHashCodeOrToString
        )
    }
}

/// Approved usage of a field, method, or constructor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhiteListingModel {
    pub class: BinaryName,
    pub name: UnqualifiedName,

    /// Rendered field or method descriptor
    pub descriptor: String,

    /// Obligations on the receiver of the call
    pub receiver: Vec<ProofObligation>,

    /// Obligations on each argument of the call, by position
    pub arguments: Vec<Vec<ProofObligation>>,
}

impl WhiteListingModel {
    pub fn new(class: BinaryName, name: UnqualifiedName, descriptor: String) -> Self {
        WhiteListingModel {
            class,
            name,
            descriptor,
            receiver: vec![],
            arguments: vec![],
        }
    }

    /// Model of a member that can be used without restrictions
    pub fn unrestricted(member: Member<'_>) -> Self {
        WhiteListingModel::new(member.class().clone(), member.name().clone(), member.descriptor())
    }

    pub fn with_receiver(&mut self, obligation: ProofObligation) -> &mut Self {
        self.receiver.push(obligation);
        self
    }

    pub fn with_argument(&mut self, position: usize, obligation: ProofObligation) -> &mut Self {
        if self.arguments.len() <= position {
            self.arguments.resize(position + 1, vec![]);
        }
        self.arguments[position].push(obligation);
        self
    }
}

/// Field or method (including constructors) whose usage must be approved
#[derive(Copy, Clone, Debug)]
pub enum Member<'a> {
    Field(&'a FieldDecl),
    Method(&'a MethodDecl),
}

impl<'a> Member<'a> {
    pub fn class(&self) -> &'a BinaryName {
        match self {
            Member::Field(field) => &field.class,
            Member::Method(method) => &method.class,
        }
    }

    pub fn name(&self) -> &'a UnqualifiedName {
        match self {
            Member::Field(field) => &field.name,
            Member::Method(method) => &method.name,
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            Member::Field(field) => field.descriptor.render(),
            Member::Method(method) => method.descriptor.render(),
        }
    }
}

/// Source of white-listing models for members of the runtime library
pub trait WhiteListingWizard {
    /// Model of a library member under the given rule set version, if it is white-listed
    fn model_of(&self, version: u32, member: Member<'_>) -> Option<WhiteListingModel>;
}

/// In-memory white-listing database
///
/// Each entry is keyed by class, name, and descriptor, and is only visible from the rule set
/// version it was introduced in.
#[derive(Clone, Debug, Default)]
pub struct AccessList {
    entries: BTreeMap<(BinaryName, UnqualifiedName, String), (u32, WhiteListingModel)>,
}

impl AccessList {
    pub fn new() -> AccessList {
        AccessList::default()
    }

    /// Allow a member in every rule set version
    pub fn allow(
        &mut self,
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: impl Into<String>,
    ) -> &mut WhiteListingModel {
        self.allow_since(0, class, name, descriptor)
    }

    /// Allow a member starting from a rule set version
    pub fn allow_since(
        &mut self,
        version: u32,
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: impl Into<String>,
    ) -> &mut WhiteListingModel {
        let descriptor = descriptor.into();
        let key = (class.clone(), name.clone(), descriptor.clone());
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| (version, WhiteListingModel::new(class, name, descriptor)));
        entry.0 = version;
        &mut entry.1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WhiteListingWizard for AccessList {
    fn model_of(&self, version: u32, member: Member<'_>) -> Option<WhiteListingModel> {
        let key = (member.class().clone(), member.name().clone(), member.descriptor());
        match self.entries.get(&key) {
            Some((since, model)) if *since <= version => Some(model.clone()),
            _ => None,
        }
    }
}

/// Model for using a resolved member
///
/// Members of the jar and of its dependencies are always usable. A library method without a
/// model of its own inherits the model of the method it overrides, searching the superclass
/// first and then the interfaces.
pub fn white_listing_model_of<'g>(
    loader: &'g TakamakaClassLoader<'g>,
    wizard: &dyn WhiteListingWizard,
    version: u32,
    member: Member<'g>,
) -> Result<Option<WhiteListingModel>, Error> {
    let class = loader.load_class(member.class())?;
    if class.origin != ClassOrigin::Library {
        return Ok(Some(WhiteListingModel::unrestricted(member)));
    }
    if let Some(model) = wizard.model_of(version, member) {
        return Ok(Some(model));
    }

    let method = match member {
        Member::Method(method)
            if !method.is_static() && !method.is_private() && !method.is_constructor() =>
        {
            method
        }
        _ => return Ok(None),
    };

    if let Some(superclass) = &class.superclass {
        if let Some(overridden) = loader.resolve_method(superclass, &method.name, &method.descriptor)? {
            let model = white_listing_model_of(loader, wizard, version, Member::Method(overridden))?;
            if model.is_some() {
                return Ok(model);
            }
        }
    }
    for interface in &class.interfaces {
        if let Some(overridden) =
            loader.resolve_interface_method(interface, &method.name, &method.descriptor)?
        {
            let model = white_listing_model_of(loader, wizard, version, Member::Method(overridden))?;
            if model.is_some() {
                return Ok(model);
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldAccessFlags, FieldType, Name};

    fn field(class: &str, name: &str) -> FieldDecl {
        FieldDecl {
            class: BinaryName::from_string(class.to_owned()).unwrap(),
            name: UnqualifiedName::from_string(name.to_owned()).unwrap(),
            descriptor: FieldType::int(),
            access_flags: FieldAccessFlags::PUBLIC,
            has_constant_value: false,
            index: 0,
        }
    }

    #[test]
    fn entries_are_visible_from_their_version() {
        let mut list = AccessList::new();
        let old = field("java/lang/Integer", "MAX_VALUE");
        let new = field("java/lang/Integer", "MIN_VALUE");
        list.allow(old.class.clone(), old.name.clone(), "I");
        list.allow_since(2, new.class.clone(), new.name.clone(), "I");

        assert!(list.model_of(0, Member::Field(&old)).is_some());
        assert!(list.model_of(1, Member::Field(&new)).is_none());
        assert!(list.model_of(2, Member::Field(&new)).is_some());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn obligations_accumulate() {
        let mut list = AccessList::new();
        list.allow(BinaryName::OBJECT, UnqualifiedName::HASHCODE, "()I")
            .with_receiver(ProofObligation::MustRedefineHashCode)
            .with_argument(1, ProofObligation::MustBeFalse);
        let model = list.allow(BinaryName::OBJECT, UnqualifiedName::HASHCODE, "()I");
        assert!(model.receiver[0].requires_hash_code());
        assert_eq!(model.arguments, vec![vec![], vec![ProofObligation::MustBeFalse]]);
    }
}
