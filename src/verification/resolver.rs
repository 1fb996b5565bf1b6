use super::class_loader::{ClassDecl, FieldDecl, MethodDecl, TakamakaClassLoader};
use super::Error;
use crate::jvm::class_file::{FieldRef, MethodRef};
use crate::jvm::{BinaryName, FieldRefConstantIndex, MethodDescriptor, MethodRefConstantIndex, RefType};

/// Members of arrays are those of `java/lang/Object`
static ARRAY_MEMBERS: BinaryName = BinaryName::OBJECT;

/// Resolves the symbolic references found in the constant pool of a class
#[derive(Copy, Clone)]
pub struct Resolver<'g> {
    loader: &'g TakamakaClassLoader<'g>,
    class: &'g ClassDecl,
}

impl<'g> Resolver<'g> {
    pub fn new(loader: &'g TakamakaClassLoader<'g>, class: &'g ClassDecl) -> Self {
        Resolver { loader, class }
    }

    pub fn resolve_field(&self, field: &FieldRef) -> Result<Option<&'g FieldDecl>, Error> {
        self.loader
            .resolve_field(owner(&field.class), &field.name, &field.descriptor)
    }

    pub fn resolved_field(&self, index: FieldRefConstantIndex) -> Result<Option<&'g FieldDecl>, Error> {
        let field = self.class.file.field_ref(index)?;
        self.resolve_field(&field)
    }

    /// Method or constructor targeted by a reference
    ///
    /// Constructors are looked up in the named class only, interface methods through the
    /// interface hierarchy, and other methods through superclasses and then interfaces. When
    /// nothing matches, the lookup is repeated with the expanded descriptor of instrumented code.
    pub fn resolve_method(&self, method: &MethodRef) -> Result<Option<&'g MethodDecl>, Error> {
        let loader = self.loader;
        let class = owner(&method.class);
        let name = &method.name;

        if name.is_constructor() {
            with_expansion(&method.descriptor, |descriptor| {
                loader.resolve_constructor(class, descriptor)
            })
        } else if method.is_interface {
            with_expansion(&method.descriptor, |descriptor| {
                loader.resolve_interface_method(class, name, descriptor)
            })
        } else {
            with_expansion(&method.descriptor, |descriptor| {
                loader.resolve_method(class, name, descriptor)
            })
        }
    }

    pub fn resolved_method(&self, index: MethodRefConstantIndex) -> Result<Option<&'g MethodDecl>, Error> {
        let method = self.class.file.method_ref(index)?;
        self.resolve_method(&method)
    }
}

fn owner(class: &RefType<BinaryName>) -> &BinaryName {
    class.as_object().unwrap_or(&ARRAY_MEMBERS)
}

fn with_expansion<T>(
    descriptor: &MethodDescriptor<BinaryName>,
    resolve: impl Fn(&MethodDescriptor<BinaryName>) -> Result<Option<T>, Error>,
) -> Result<Option<T>, Error> {
    match resolve(descriptor)? {
        Some(found) => Ok(Some(found)),
        None => resolve(&descriptor.expanded()),
    }
}
