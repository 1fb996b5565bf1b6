use super::Error;
use crate::jvm::class_file::{
    Attribute, ClassFile, ConstantValue, ElementValue, RuntimeInvisibleAnnotations,
    RuntimeVisibleAnnotations,
};
use crate::jvm::{
    self, BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, ParseDescriptor, RenderDescriptor, UnqualifiedName,
};
use elsa::map::FrozenMap;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{self, Display};
use typed_arena::Arena;

/// Container of class files, in the order they were added
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jar {
    entries: Vec<(String, Vec<u8>)>,
}

impl Jar {
    pub fn new() -> Jar {
        Jar::default()
    }

    pub fn add_entry(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.push((name.into(), bytes));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    /// Entries holding class files, along with the class name implied by the entry name
    ///
    /// Module descriptors and resources are skipped.
    pub fn class_entries(&self) -> impl Iterator<Item = (&str, &str, &[u8])> {
        self.entries().filter_map(|(entry, bytes)| {
            let class_name = entry.strip_suffix(".class")?;
            if class_name == "module-info" || class_name.ends_with("/module-info") {
                None
            } else {
                Some((entry, class_name, bytes))
            }
        })
    }
}

/// Where a class comes from
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClassOrigin {
    /// The jar under verification
    Package,

    /// A jar the package depends on (already verified and installed)
    Dependency,

    /// The runtime library (`java.lang.Object` and friends)
    Library,
}

/// Annotation found on a class, method, or field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationFact {
    /// Annotation interface
    pub kind: BinaryName,

    /// Class literal given to the `value` element, if any
    pub class_value: Option<BinaryName>,
}

/// Class or interface, as seen by the verifier
#[derive(Debug)]
pub struct ClassDecl {
    pub name: BinaryName,
    pub origin: ClassOrigin,

    /// Entry of the jar the class was read from
    pub entry: String,

    pub file: ClassFile,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<BinaryName>,

    pub interfaces: Vec<BinaryName>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub annotations: Vec<AnnotationFact>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    /// Declaring class
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,
    pub annotations: Vec<AnnotationFact>,

    /// Position among the methods of the class file
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Declaring class
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub access_flags: FieldAccessFlags,

    /// Does the field have a `ConstantValue` attribute?
    pub has_constant_value: bool,

    /// Position among the fields of the class file
    pub index: usize,
}

impl ClassDecl {
    pub fn new(entry: &str, origin: ClassOrigin, file: ClassFile) -> Result<ClassDecl, jvm::Error> {
        let name = file.this_class_name()?;

        let mut methods = Vec::with_capacity(file.methods.len());
        for (index, method) in file.methods.iter().enumerate() {
            methods.push(MethodDecl {
                class: name.clone(),
                name: member_name(file.utf8(method.name_index)?)?,
                descriptor: MethodDescriptor::parse(file.utf8(method.descriptor_index)?)
                    .map_err(|err| jvm::Error::BadDescriptor(err.to_string()))?,
                access_flags: method.access_flags,
                annotations: decode_annotations(&file, &method.attributes)?,
                index,
            });
        }

        let mut fields = Vec::with_capacity(file.fields.len());
        for (index, field) in file.fields.iter().enumerate() {
            fields.push(FieldDecl {
                class: name.clone(),
                name: member_name(file.utf8(field.name_index)?)?,
                descriptor: FieldType::parse(file.utf8(field.descriptor_index)?)
                    .map_err(|err| jvm::Error::BadDescriptor(err.to_string()))?,
                access_flags: field.access_flags,
                has_constant_value: file.attribute::<ConstantValue>(&field.attributes)?.is_some(),
                index,
            });
        }

        Ok(ClassDecl {
            superclass: file.super_class_name()?,
            interfaces: file.interface_names()?,
            annotations: decode_annotations(&file, &file.attributes)?,
            name,
            origin,
            entry: entry.to_owned(),
            fields,
            methods,
            file,
        })
    }

    pub fn access_flags(&self) -> ClassAccessFlags {
        self.file.access_flags
    }

    pub fn is_interface(&self) -> bool {
        self.file.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_enum(&self) -> bool {
        self.file.access_flags.contains(ClassAccessFlags::ENUM)
    }

    pub fn is_synthetic(&self) -> bool {
        self.file.access_flags.contains(ClassAccessFlags::SYNTHETIC)
    }

    pub fn has_annotation(&self, kind: &BinaryName) -> bool {
        self.annotations.iter().any(|annotation| &annotation.kind == kind)
    }

    /// Method declared in this class with exactly this name and descriptor
    pub fn declared_method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<&MethodDecl> {
        self.methods
            .iter()
            .find(|method| &method.name == name && &method.descriptor == descriptor)
    }

    /// Constructor declared in this class with these parameters
    pub fn declared_constructor(&self, parameters: &[FieldType<BinaryName>]) -> Option<&MethodDecl> {
        self.methods.iter().find(|method| {
            method.name == UnqualifiedName::INIT && method.descriptor.parameters == parameters
        })
    }

    pub fn declared_field(
        &self,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Option<&FieldDecl> {
        self.fields
            .iter()
            .find(|field| &field.name == name && &field.descriptor == descriptor)
    }
}

impl MethodDecl {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_private(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PRIVATE)
    }

    pub fn is_public(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PUBLIC)
    }

    pub fn is_synthetic(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::SYNTHETIC)
    }

    pub fn is_bridge(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::BRIDGE)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_synchronized(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::SYNCHRONIZED)
    }

    pub fn is_constructor(&self) -> bool {
        self.name.is_constructor()
    }

    pub fn annotation(&self, kind: &BinaryName) -> Option<&AnnotationFact> {
        self.annotations
            .iter()
            .find(|annotation| &annotation.kind == kind)
    }
}

impl FieldDecl {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }

    pub fn is_transient(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::TRANSIENT)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::FINAL)
    }

    pub fn is_synthetic(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::SYNTHETIC)
    }

    pub fn is_enum_constant(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::ENUM)
    }
}

impl Display for MethodDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor.render())
    }
}

impl Display for FieldDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor.render())
    }
}

fn member_name(name: &str) -> Result<UnqualifiedName, jvm::Error> {
    UnqualifiedName::from_string(name.to_owned()).map_err(jvm::Error::BadName)
}

/// Class named by a field descriptor, if it names one
fn object_descriptor(descriptor: &str) -> Result<Option<BinaryName>, jvm::Error> {
    if descriptor == "V" {
        return Ok(None);
    }
    let field_type = FieldType::<BinaryName>::parse(descriptor)
        .map_err(|err| jvm::Error::BadDescriptor(err.to_string()))?;
    Ok(field_type.as_object().cloned())
}

/// Collect visible and invisible annotations from a list of attributes
fn decode_annotations(
    file: &ClassFile,
    attributes: &[Attribute],
) -> Result<Vec<AnnotationFact>, jvm::Error> {
    let mut annotations = vec![];
    if let Some(visible) = file.attribute::<RuntimeVisibleAnnotations>(attributes)? {
        annotations.extend(visible.0);
    }
    if let Some(invisible) = file.attribute::<RuntimeInvisibleAnnotations>(attributes)? {
        annotations.extend(invisible.0);
    }

    let mut facts = Vec::with_capacity(annotations.len());
    for annotation in &annotations {
        let kind = match object_descriptor(file.utf8(annotation.type_index)?)? {
            Some(kind) => kind,
            None => continue,
        };
        let mut class_value = None;
        for pair in &annotation.element_value_pairs {
            if file.utf8(pair.element_name)? == UnqualifiedName::VALUE.as_str() {
                if let ElementValue::Class(descriptor) = &pair.value {
                    class_value = object_descriptor(file.utf8(*descriptor)?)?;
                }
            }
        }
        facts.push(AnnotationFact { kind, class_value });
    }
    Ok(facts)
}

pub struct ClassLoaderArenas {
    class_arena: Arena<ClassDecl>,
}

impl ClassLoaderArenas {
    pub fn new() -> Self {
        ClassLoaderArenas {
            class_arena: Arena::new(),
        }
    }
}

impl Default for ClassLoaderArenas {
    fn default() -> Self {
        ClassLoaderArenas::new()
    }
}

/// Class file that has not been parsed yet
struct ClassSource<'g> {
    origin: ClassOrigin,
    entry: &'g str,
    bytes: &'g [u8],
}

/// Loads the classes visible to a jar under verification
///
/// Classes of the jar itself are parsed upfront. Classes of the dependencies and of the runtime
/// library are only parsed the first time they are needed, and are then remembered. When the
/// same class is in more than one container, the first one wins, in the order: jar,
/// dependencies, library.
pub struct TakamakaClassLoader<'g> {
    arenas: &'g ClassLoaderArenas,
    sources: BTreeMap<BinaryName, ClassSource<'g>>,
    classes: FrozenMap<&'g BinaryName, &'g ClassDecl>,

    /// Classes of the jar under verification, sorted by name
    package: Vec<&'g ClassDecl>,
}

impl<'g> TakamakaClassLoader<'g> {
    pub fn new(
        arenas: &'g ClassLoaderArenas,
        jar: &'g Jar,
        dependencies: &'g [Jar],
        library: Option<&'g Jar>,
    ) -> Result<Self, Error> {
        let mut loader = TakamakaClassLoader {
            arenas,
            sources: BTreeMap::new(),
            classes: FrozenMap::new(),
            package: vec![],
        };

        for (entry, _, bytes) in jar.class_entries() {
            let malformed = |error| Error::MalformedClass {
                entry: entry.to_owned(),
                error,
            };
            let file = ClassFile::parse(bytes).map_err(malformed)?;
            let decl = ClassDecl::new(entry, ClassOrigin::Package, file).map_err(malformed)?;
            if loader.classes.get(&decl.name).is_some() {
                return Err(Error::DuplicateClass(decl.name.to_dotted()));
            }
            let decl = loader.add_class(decl);
            loader.package.push(decl);
        }
        loader.package.sort_by(|c1, c2| c1.name.cmp(&c2.name));

        let others = dependencies
            .iter()
            .map(|jar| (ClassOrigin::Dependency, jar))
            .chain(library.map(|jar| (ClassOrigin::Library, jar)));
        for (origin, container) in others {
            for (entry, class_name, bytes) in container.class_entries() {
                let name = match BinaryName::from_string(class_name.to_owned()) {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                if loader.classes.get(&name).is_none() {
                    loader.sources.entry(name).or_insert(ClassSource {
                        origin,
                        entry,
                        bytes,
                    });
                }
            }
        }

        log::debug!(
            "class loader over {} package classes and {} other classes",
            loader.package.len(),
            loader.sources.len()
        );
        Ok(loader)
    }

    fn add_class(&self, decl: ClassDecl) -> &'g ClassDecl {
        let arenas: &'g ClassLoaderArenas = self.arenas;
        let decl: &'g ClassDecl = arenas.class_arena.alloc(decl);
        self.classes.insert(&decl.name, decl);
        decl
    }

    /// Classes of the jar under verification, sorted by name
    pub fn package_classes(&self) -> &[&'g ClassDecl] {
        &self.package
    }

    /// Find (and parse, the first time) a class
    ///
    /// A class that cannot be found makes the whole verification fail, since it is impossible
    /// to tell whether code using it is legal.
    pub fn load_class(&'g self, name: &BinaryName) -> Result<&'g ClassDecl, Error> {
        if let Some(class) = self.classes.get(name) {
            return Ok(class);
        }

        let source = self
            .sources
            .get(name)
            .ok_or_else(|| Error::UnknownType(name.to_dotted()))?;
        let malformed = |error| Error::MalformedClass {
            entry: source.entry.to_owned(),
            error,
        };
        let file = ClassFile::parse(source.bytes).map_err(malformed)?;
        let decl = ClassDecl::new(source.entry, source.origin, file).map_err(malformed)?;
        if &decl.name != name {
            return Err(malformed(jvm::Error::BadName(format!(
                "entry {} defines {}",
                source.entry, decl.name
            ))));
        }

        log::trace!("loaded {} from {:?} entry {}", name, source.origin, source.entry);
        Ok(self.add_class(decl))
    }

    pub fn origin_of(&'g self, name: &BinaryName) -> Result<ClassOrigin, Error> {
        Ok(self.load_class(name)?.origin)
    }

    /// The class followed by its superclasses, up to `java/lang/Object`
    pub fn superclasses(&'g self, name: &BinaryName) -> Result<Vec<&'g ClassDecl>, Error> {
        let mut chain: Vec<&'g ClassDecl> = vec![];
        let mut next = Some(name.clone());
        while let Some(current) = next {
            if chain.iter().any(|class| class.name == current) {
                break;
            }
            let class = self.load_class(&current)?;
            next = class.superclass.clone();
            chain.push(class);
        }
        Ok(chain)
    }

    /// Is the class equal to, or a subclass of, `ancestor`?
    pub fn is_subclass_of(&'g self, name: &BinaryName, ancestor: &BinaryName) -> Result<bool, Error> {
        Ok(self
            .superclasses(name)?
            .iter()
            .any(|class| &class.name == ancestor))
    }

    pub fn is_storage(&'g self, name: &BinaryName) -> Result<bool, Error> {
        self.is_subclass_of(name, &BinaryName::STORAGE)
    }

    pub fn is_contract(&'g self, name: &BinaryName) -> Result<bool, Error> {
        self.is_subclass_of(name, &BinaryName::CONTRACT)
    }

    pub fn is_interface(&'g self, name: &BinaryName) -> Result<bool, Error> {
        Ok(self.load_class(name)?.is_interface())
    }

    pub fn is_enum(&'g self, name: &BinaryName) -> Result<bool, Error> {
        Ok(self.load_class(name)?.is_enum())
    }

    pub fn is_exported(&'g self, name: &BinaryName) -> Result<bool, Error> {
        Ok(self.load_class(name)?.has_annotation(&BinaryName::EXPORTED))
    }

    /// Field accessed through `class`: the first declaration found walking up the superclasses
    pub fn resolve_field(
        &'g self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Result<Option<&'g FieldDecl>, Error> {
        for class in self.superclasses(class)? {
            if let Some(field) = class.declared_field(name, descriptor) {
                return Ok(Some(field));
            }
        }
        Ok(None)
    }

    /// Method invoked through `class`
    ///
    /// Superclasses are searched first, then the interfaces they implement (breadth first, in
    /// declaration order).
    pub fn resolve_method(
        &'g self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<Option<&'g MethodDecl>, Error> {
        let superclasses = self.superclasses(class)?;
        for class in &superclasses {
            if let Some(method) = class.declared_method(name, descriptor) {
                return Ok(Some(method));
            }
        }
        let interfaces = superclasses
            .iter()
            .flat_map(|class| class.interfaces.iter().cloned());
        self.find_in_interfaces(interfaces, name, descriptor)
    }

    /// Method invoked through interface `class`
    ///
    /// The interface and its superinterfaces are searched, then `java/lang/Object`.
    pub fn resolve_interface_method(
        &'g self,
        class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<Option<&'g MethodDecl>, Error> {
        if let Some(method) = self.find_in_interfaces(Some(class.clone()), name, descriptor)? {
            return Ok(Some(method));
        }
        Ok(self
            .load_class(&BinaryName::OBJECT)?
            .declared_method(name, descriptor))
    }

    /// Constructor of exactly `class` (constructors are not inherited)
    pub fn resolve_constructor(
        &'g self,
        class: &BinaryName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<Option<&'g MethodDecl>, Error> {
        Ok(self
            .load_class(class)?
            .declared_constructor(&descriptor.parameters))
    }

    fn find_in_interfaces(
        &'g self,
        roots: impl IntoIterator<Item = BinaryName>,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<Option<&'g MethodDecl>, Error> {
        let mut to_visit: VecDeque<BinaryName> = roots.into_iter().collect();
        let mut visited: BTreeSet<BinaryName> = BTreeSet::new();
        while let Some(interface) = to_visit.pop_front() {
            if !visited.insert(interface.clone()) {
                continue;
            }
            let interface = self.load_class(&interface)?;
            if let Some(method) = interface.declared_method(name, descriptor) {
                return Ok(Some(method));
            }
            to_visit.extend(interface.interfaces.iter().cloned());
        }
        Ok(None)
    }
}
