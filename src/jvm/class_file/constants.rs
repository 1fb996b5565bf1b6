use crate::jvm::class_file::{read_bytes, Attribute, AttributeLike, Deserialize, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;

/// Class file constants pool builder
///
/// The pool is append only and only after the pool is fully built up, it can be consumed into a
/// regular [`OffsetVec`]. Entries are deduplicated, so asking twice for the same constant returns
/// the same index.
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<String, ClassConstantIndex>,
    fieldrefs: HashMap<(String, String, String), FieldRefConstantIndex>,
    methodrefs: HashMap<(String, String, String, bool), MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
    method_handles: HashMap<(HandleKind, ConstantIndex), ConstantIndex>,
    method_types: HashMap<Utf8ConstantIndex, ConstantIndex>,
    invoke_dynamics: HashMap<(u16, NameAndTypeConstantIndex), InvokeDynamicConstantIndex>,
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            classes: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            strings: HashMap::new(),
            longs: HashMap::new(),
            name_and_types: HashMap::new(),
            utf8s: HashMap::new(),
            method_handles: HashMap::new(),
            method_types: HashMap::new(),
            invoke_dynamics: HashMap::new(),
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Consume the pool and return the final vector of constants
    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant)?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a class constant, given the class name in internal form (or an array
    /// descriptor)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.classes.get(name) {
            Ok(*idx)
        } else {
            let utf8 = self.get_utf8(name)?;
            let idx = ClassConstantIndex(self.push_constant(Constant::Class(utf8))?);
            self.classes.insert(name.to_owned(), idx);
            Ok(idx)
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, value: &str) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        let utf8 = self.get_utf8(value)?;
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let idx = StringConstantIndex(self.push_constant(Constant::String(utf8))?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    pub fn get_long(&mut self, value: i64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.longs.get(&value) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Long(value))?;
            self.longs.insert(value, idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(name_and_type_key, idx);
            Ok(idx)
        }
    }

    /// Get or insert a `CONSTANT_Fieldref_info`
    pub fn get_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let key = (class.to_owned(), name.to_owned(), descriptor.to_owned());
        if let Some(idx) = self.fieldrefs.get(&key) {
            Ok(*idx)
        } else {
            let class_idx = self.get_class(class)?;
            let name_and_type_idx = self.get_name_and_type(name, descriptor)?;
            let constant = Constant::FieldRef(class_idx, name_and_type_idx);
            let idx = FieldRefConstantIndex(self.push_constant(constant)?);
            self.fieldrefs.insert(key, idx);
            Ok(idx)
        }
    }

    /// Get or insert a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let key = (
            class.to_owned(),
            name.to_owned(),
            descriptor.to_owned(),
            is_interface,
        );
        if let Some(idx) = self.methodrefs.get(&key) {
            Ok(*idx)
        } else {
            let class_idx = self.get_class(class)?;
            let name_and_type_idx = self.get_name_and_type(name, descriptor)?;
            let constant = Constant::MethodRef {
                class: class_idx,
                name_and_type: name_and_type_idx,
                is_interface,
            };
            let idx = MethodRefConstantIndex(self.push_constant(constant)?);
            self.methodrefs.insert(key, idx);
            Ok(idx)
        }
    }

    /// Get or insert a method handle constant from the constant pool
    pub fn get_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let handle_key = (handle_kind, member);
        if let Some(idx) = self.method_handles.get(&handle_key) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodHandle {
                handle_kind,
                member,
            };
            let idx = self.push_constant(constant)?;
            self.method_handles.insert(handle_key, idx);
            Ok(idx)
        }
    }

    pub fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.method_types.get(&descriptor) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::MethodType { descriptor })?;
            self.method_types.insert(descriptor, idx);
            Ok(idx)
        }
    }

    /// Get or insert an invoke dynamic constant from the constant pool
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<InvokeDynamicConstantIndex, ConstantPoolOverflow> {
        let method_descriptor = self.get_name_and_type(name, descriptor)?;
        let indy_key = (bootstrap_method, method_descriptor);
        if let Some(idx) = self.invoke_dynamics.get(&indy_key) {
            Ok(*idx)
        } else {
            let constant = Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            };
            let idx = InvokeDynamicConstantIndex(self.push_constant(constant)?);
            self.invoke_dynamics.insert(indy_key, idx);
            Ok(idx)
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(
        &mut self,
        attribute: A,
    ) -> Result<Attribute, ConstantPoolOverflow> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        // Writing into a `Vec` cannot fail
        let _ = attribute.serialize(&mut info);

        Ok(Attribute { name_index, info })
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: usize,
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    /// Module or package (only meaningful in `module-info.class`)
    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Serialize for OffsetVec<Constant> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.offset_len().0 as u16).serialize(writer)?;
        for (_, _, constant) in self.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// Reads the pool, prefixed by its `constant_pool_count` (which is one more than the last
/// usable index)
impl Deserialize for OffsetVec<Constant> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::deserialize(reader)? as usize;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count {
            let index = ConstantIndex(constants.offset_len().0 as u16);
            constants.push(Constant::deserialize_at(index, reader)?);
        }
        if constants.offset_len().0 != count {
            return Err(Error::BadAttribute {
                name: "constant pool",
                message: String::from("last wide constant overflows the pool"),
            });
        }
        Ok(constants)
    }
}

impl Constant {
    fn deserialize_at<R: ReadBytesExt>(index: ConstantIndex, reader: &mut R) -> Result<Self, Error> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                Constant::Utf8(decode_modified_utf8(&bytes)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            tag => return Err(Error::UnknownConstantTag { index, tag }),
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// The bytes are first decoded into UTF-16 code units (which is what the 1/2/3-byte forms
/// encode), then surrogate pairs are stitched back together.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    let bad = || Error::BadModifiedUtf8(bytes.to_vec());
    let continuation = |idx: usize| -> Result<u16, Error> {
        match bytes.get(idx) {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            _ => Err(bad()),
        }
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        if b & 0b1000_0000 == 0 && b != 0 {
            units.push(b as u16);
            idx += 1;
        } else if b & 0b1110_0000 == 0b1100_0000 {
            units.push(((b & 0x1F) as u16) << 6 | continuation(idx + 1)?);
            idx += 2;
        } else if b & 0b1111_0000 == 0b1110_0000 {
            units.push(
                ((b & 0x0F) as u16) << 12 | continuation(idx + 1)? << 6 | continuation(idx + 2)?,
            );
            idx += 3;
        } else {
            return Err(bad());
        }
    }

    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| bad())
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
        assert!(decode_modified_utf8(&[97, 0]).is_err());
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(decode_modified_utf8(b"io/takamaka/code/lang/Contract").unwrap(), "io/takamaka/code/lang/Contract");
    }

    #[test]
    fn multi_byte_encodings() {
        for text in ["ĄǍǞǠǺȀȂȦȺӐӒ", "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ", "§lambda"] {
            let encoded = encode_modified_utf8(text);
            assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
        }
    }

    #[test]
    fn supplementary_characters() {
        let encoded = vec![
            237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237, 191,
            191,
        ];
        assert_eq!(encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"), encoded);
        assert_eq!(
            decode_modified_utf8(&encoded).unwrap(),
            "\u{10000}\u{dffff}\u{10FFFF}"
        );
    }

    #[test]
    fn truncated_sequences() {
        assert!(decode_modified_utf8(&[0b1110_0000, 0b1000_0000]).is_err());
        assert!(decode_modified_utf8(&[0b1111_1000]).is_err());
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

macro_rules! typed_index {
    ($($(#[$attr:meta])* $name:ident,)*) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $name {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($name(ConstantIndex::deserialize(reader)?))
                }
            }
        )*
    };
}

typed_index! {
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    /// Index of a `CONSTANT_Class_info` (which may also name an array type)
    ClassConstantIndex,
    FieldRefConstantIndex,
    /// Index of either a `CONSTANT_Methodref_info` or a `CONSTANT_InterfaceMethodref_info`
    MethodRefConstantIndex,
    InvokeDynamicConstantIndex,
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let kind = match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::BadAttribute {
                    name: "MethodHandle",
                    message: format!("unknown reference kind {}", other),
                })
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn entries_are_deduplicated() {
        let mut pool = ConstantsPool::new();
        let object = pool.get_class("java/lang/Object").unwrap();
        let long = pool.get_long(7).unwrap();
        let utf8 = pool.get_utf8("after").unwrap();
        assert_eq!(pool.get_class("java/lang/Object").unwrap(), object);
        assert_eq!(pool.get_long(7).unwrap(), long);

        // `java/lang/Object` (1), its class (2), the long (3, 4), then "after"
        assert_eq!(object, ClassConstantIndex(ConstantIndex(2)));
        assert_eq!(long, ConstantIndex(3));
        assert_eq!(utf8, Utf8ConstantIndex(ConstantIndex(5)));
    }

    #[test]
    fn pool_binary_round_trip() {
        let mut pool = ConstantsPool::new();
        pool.get_method_ref("java/lang/Object", "<init>", "()V", false)
            .unwrap();
        pool.get_long(-1).unwrap();
        pool.get_string("\u{0}§").unwrap();
        let constants = pool.into_offset_vec();

        let mut bytes = vec![];
        constants.serialize(&mut bytes).unwrap();
        let parsed = OffsetVec::<Constant>::deserialize(&mut &bytes[..]).unwrap();
        assert_eq!(parsed, constants);
    }

    #[test]
    fn unknown_tag() {
        let bytes = [0, 2, 42];
        match OffsetVec::<Constant>::deserialize(&mut &bytes[..]) {
            Err(Error::UnknownConstantTag { tag: 42, .. }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}
