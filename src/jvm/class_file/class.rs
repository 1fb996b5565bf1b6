use crate::jvm::class_file::{
    Attribute, AttributeLike, BootstrapMethod, BootstrapMethods, Deserialize, Field, Method,
    Serialize, SourceFile, Version,
};
use crate::jvm::{
    BinaryName, ClassAccessFlags, ClassConstantIndex, Constant, ConstantIndex, Error,
    FieldRefConstantIndex, FieldType, HandleKind, InvokeDynamicConstantIndex, MethodDescriptor,
    MethodRefConstantIndex, Name, NameAndTypeConstantIndex, ParseDescriptor, RefType,
    UnqualifiedName, Utf8ConstantIndex,
};
use crate::util::{Offset, OffsetVec};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` (and `module-info`) have no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

/// Symbolic reference to a field, as found in a `CONSTANT_Fieldref_info`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: RefType<BinaryName>,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Symbolic reference to a method or constructor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: RefType<BinaryName>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub is_interface: bool,
}

/// Dynamic call site, as found in a `CONSTANT_InvokeDynamic_info`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvokeDynamicRef {
    /// Index into the `BootstrapMethods` attribute
    pub bootstrap_method: u16,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

/// Target of a `CONSTANT_MethodHandle_info`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodHandleRef {
    Field(HandleKind, FieldRef),
    Method(HandleKind, MethodRef),
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file, rejecting trailing bytes
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class_file = ClassFile::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::TrailingBytes("class file"));
        }
        Ok(class_file)
    }

    /// Look up an entry in the constant pool
    pub fn constant(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok()
            .ok_or(Error::MissingConstant(index))
    }

    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_Utf8",
            }),
        }
    }

    /// Type named by a class constant
    ///
    /// Class constants usually name a class or interface, but can also hold an array
    /// descriptor (eg. the receiver of `clone()` on an array).
    pub fn class_type(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = match self.constant(index.0)? {
            Constant::Class(name) => self.utf8(*name)?,
            _ => {
                return Err(Error::UnexpectedConstant {
                    index: index.0,
                    expected: "CONSTANT_Class",
                })
            }
        };
        if name.starts_with('[') {
            RefType::parse(name).map_err(|err| Error::BadDescriptor(err.to_string()))
        } else {
            BinaryName::from_string(name.to_owned())
                .map(RefType::Object)
                .map_err(Error::BadName)
        }
    }

    /// Name of the class or interface named by a class constant (arrays are rejected)
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        match self.class_type(index)? {
            RefType::Object(name) => Ok(name),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "class or interface",
            }),
        }
    }

    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.constant(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_NameAndType",
            }),
        }
    }

    fn member_name(name: &str) -> Result<UnqualifiedName, Error> {
        UnqualifiedName::from_string(name.to_owned()).map_err(Error::BadName)
    }

    fn field_descriptor(descriptor: &str) -> Result<FieldType<BinaryName>, Error> {
        FieldType::parse(descriptor).map_err(|err| Error::BadDescriptor(err.to_string()))
    }

    fn method_descriptor(descriptor: &str) -> Result<MethodDescriptor<BinaryName>, Error> {
        MethodDescriptor::parse(descriptor).map_err(|err| Error::BadDescriptor(err.to_string()))
    }

    pub fn field_ref(&self, index: FieldRefConstantIndex) -> Result<FieldRef, Error> {
        match self.constant(index.0)? {
            Constant::FieldRef(class, name_and_type) => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(FieldRef {
                    class: self.class_type(*class)?,
                    name: Self::member_name(name)?,
                    descriptor: Self::field_descriptor(descriptor)?,
                })
            }
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_Fieldref",
            }),
        }
    }

    pub fn method_ref(&self, index: MethodRefConstantIndex) -> Result<MethodRef, Error> {
        match self.constant(index.0)? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MethodRef {
                    class: self.class_type(*class)?,
                    name: Self::member_name(name)?,
                    descriptor: Self::method_descriptor(descriptor)?,
                    is_interface: *is_interface,
                })
            }
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_Methodref or CONSTANT_InterfaceMethodref",
            }),
        }
    }

    pub fn invoke_dynamic(&self, index: InvokeDynamicConstantIndex) -> Result<InvokeDynamicRef, Error> {
        match self.constant(index.0)? {
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                let (name, descriptor) = self.name_and_type(*method_descriptor)?;
                Ok(InvokeDynamicRef {
                    bootstrap_method: *bootstrap_method,
                    name: Self::member_name(name)?,
                    descriptor: Self::method_descriptor(descriptor)?,
                })
            }
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_InvokeDynamic",
            }),
        }
    }

    pub fn method_handle(&self, index: ConstantIndex) -> Result<MethodHandleRef, Error> {
        match self.constant(index)? {
            Constant::MethodHandle {
                handle_kind,
                member,
            } => match handle_kind {
                HandleKind::GetField
                | HandleKind::GetStatic
                | HandleKind::PutField
                | HandleKind::PutStatic => Ok(MethodHandleRef::Field(
                    *handle_kind,
                    self.field_ref(FieldRefConstantIndex(*member))?,
                )),
                _ => Ok(MethodHandleRef::Method(
                    *handle_kind,
                    self.method_ref(MethodRefConstantIndex(*member))?,
                )),
            },
            _ => Err(Error::UnexpectedConstant {
                index,
                expected: "CONSTANT_MethodHandle",
            }),
        }
    }

    /// Name of this class
    pub fn this_class_name(&self) -> Result<BinaryName, Error> {
        self.class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<Option<BinaryName>, Error> {
        self.super_class
            .map(|super_class| self.class_name(super_class))
            .transpose()
    }

    pub fn interface_names(&self) -> Result<Vec<BinaryName>, Error> {
        self.interfaces
            .iter()
            .map(|interface| self.class_name(*interface))
            .collect()
    }

    /// Find and decode the first attribute of the given type in a list of attributes
    pub fn attribute<A: AttributeLike>(&self, attributes: &[Attribute]) -> Result<Option<A>, Error> {
        for attribute in attributes {
            if self.utf8(attribute.name_index)? == A::NAME {
                return attribute.decode().map(Some);
            }
        }
        Ok(None)
    }

    /// Name of the source file this class was compiled from, if recorded
    pub fn source_file(&self) -> Result<Option<&str>, Error> {
        match self.attribute::<SourceFile>(&self.attributes)? {
            Some(SourceFile(name)) => self.utf8(name).map(Some),
            None => Ok(None),
        }
    }

    /// Entries of the `BootstrapMethods` attribute (empty if there is none)
    pub fn bootstrap_methods(&self) -> Result<Vec<BootstrapMethod>, Error> {
        Ok(self
            .attribute::<BootstrapMethods>(&self.attributes)?
            .map_or_else(Vec::new, |methods| methods.0))
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::deserialize(reader)?;
        let constants = OffsetVec::<Constant>::deserialize(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = match u16::deserialize(reader)? {
            0 => None,
            idx => Some(ClassConstantIndex(ConstantIndex(idx))),
        };
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;

    fn empty_class(pool: &mut ConstantsPool, name: &str) -> (ClassConstantIndex, ClassConstantIndex) {
        (
            pool.get_class(name).unwrap(),
            pool.get_class("java/lang/Object").unwrap(),
        )
    }

    #[test]
    fn parse_minimal_class() {
        let mut pool = ConstantsPool::new();
        let (this_class, super_class) = empty_class(&mut pool, "io/takamaka/Example");
        let array = pool.get_class("[Ljava/lang/String;").unwrap();
        let method = pool.get_method_ref("[Ljava/lang/String;", "clone", "()Ljava/lang/Object;", false).unwrap();
        let source = pool.get_utf8("Example.java").unwrap();
        let source_attr = pool.get_attribute(SourceFile(source)).unwrap();

        let class_file = ClassFile {
            version: Version::JAVA11,
            constants: pool.into_offset_vec(),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![source_attr],
        };
        let mut bytes = vec![];
        class_file.serialize(&mut bytes).unwrap();

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(
            parsed.this_class_name().unwrap(),
            BinaryName::from_string(String::from("io/takamaka/Example")).unwrap()
        );
        assert_eq!(parsed.super_class_name().unwrap(), Some(BinaryName::OBJECT));
        assert_eq!(parsed.source_file().unwrap(), Some("Example.java"));
        assert!(parsed.class_name(array).is_err());
        assert_eq!(
            parsed.class_type(array).unwrap(),
            RefType::array(FieldType::object(BinaryName::STRING))
        );
        let clone = parsed.method_ref(method).unwrap();
        assert_eq!(clone.name.as_str(), "clone");
        assert!(clone.descriptor.parameters.is_empty());
        assert!(parsed.bootstrap_methods().unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        assert!(matches!(
            ClassFile::parse(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0]),
            Err(Error::BadMagic(_))
        ));
        assert!(matches!(
            ClassFile::parse(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]),
            Err(Error::IoError(_))
        ));
    }

    #[test]
    fn wrong_constant_kind() {
        let mut pool = ConstantsPool::new();
        let (this_class, _) = empty_class(&mut pool, "Example");
        let class_file = ClassFile {
            version: Version::JAVA8,
            constants: pool.into_offset_vec(),
            access_flags: ClassAccessFlags::empty(),
            this_class,
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        };
        assert!(matches!(
            class_file.utf8(Utf8ConstantIndex(this_class.0)),
            Err(Error::UnexpectedConstant { .. })
        ));
        assert!(matches!(
            class_file.constant(ConstantIndex(99)),
            Err(Error::MissingConstant(ConstantIndex(99)))
        ));
    }
}
