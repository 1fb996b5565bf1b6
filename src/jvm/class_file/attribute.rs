use crate::jvm::class_file::{read_bytes, Deserialize, Serialize};
use crate::jvm::{ClassConstantIndex, ConstantIndex, Error, Utf8ConstantIndex};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are kept in their raw form and only decoded on demand, through
/// [`Attribute::decode`]. Attributes the verifier does not care about (stack map tables, inner
/// classes, signatures, ...) are never looked at.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Decode the attribute contents, making sure all of the bytes are consumed
    pub fn decode<A: AttributeLike>(&self) -> Result<A, Error> {
        let mut reader: &[u8] = &self.info;
        let attribute = A::deserialize(&mut reader).map_err(|err| Error::BadAttribute {
            name: A::NAME,
            message: err.to_string(),
        })?;
        if !reader.is_empty() {
            return Err(Error::TrailingBytes(A::NAME));
        }
        Ok(attribute)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into (and read back out of) attributes.
pub trait AttributeLike: Serialize + Deserialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.2
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantValue(pub ConstantIndex);

impl Serialize for ConstantValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantValue(ConstantIndex::deserialize(reader)?))
    }
}

impl AttributeLike for ConstantValue {
    const NAME: &'static str = "ConstantValue";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Code {
            max_stack: u16::deserialize(reader)?,
            max_locals: u16::deserialize(reader)?,
            code_array: BytecodeArray::deserialize(reader)?,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Class of exceptions caught (`None` catches everything, as `finally` blocks do)
    pub catch_type: Option<ClassConstantIndex>,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        match self.catch_type {
            Some(catch_type) => catch_type.serialize(writer),
            None => 0u16.serialize(writer),
        }
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let start_pc = BytecodeIndex::deserialize(reader)?;
        let end_pc = BytecodeIndex::deserialize(reader)?;
        let handler_pc = BytecodeIndex::deserialize(reader)?;
        let catch_type = match u16::deserialize(reader)? {
            0 => None,
            idx => Some(ClassConstantIndex(ConstantIndex(idx))),
        };
        Ok(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u32::deserialize(reader)?;
        Ok(BytecodeArray(read_bytes(reader, len as usize)?))
    }
}

/// Index into `BytecodeArray`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BytecodeIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(BytecodeIndex(u16::deserialize(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.23
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethods(pub Vec<BootstrapMethod>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// Index of a `CONSTANT_MethodHandle_info`
    pub bootstrap_method: ConstantIndex,
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

impl AttributeLike for BootstrapMethods {
    const NAME: &'static str = "BootstrapMethods";
}

impl Serialize for BootstrapMethods {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BootstrapMethods {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(BootstrapMethods(Vec::deserialize(reader)?))
    }
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bootstrap_method.serialize(writer)?;
        self.bootstrap_arguments.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for BootstrapMethod {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(BootstrapMethod {
            bootstrap_method: ConstantIndex::deserialize(reader)?,
            bootstrap_arguments: Vec::deserialize(reader)?,
        })
    }
}

/// Mapping from code offsets back to source lines
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl LineNumberTable {
    /// Source line of the instruction at the given offset
    ///
    /// Entries can be in any order and can overlap, so this picks the entry with the largest
    /// start that is still at or before the offset.
    pub fn line_of(&self, offset: usize) -> Option<u16> {
        self.0
            .iter()
            .filter(|entry| entry.start_pc.0 as usize <= offset)
            .max_by_key(|entry| entry.start_pc)
            .map(|entry| entry.line_number)
    }
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LineNumberTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LineNumberTable(Vec::deserialize(reader)?))
    }
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)
    }
}

impl Deserialize for LineNumber {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LineNumber {
            start_pc: BytecodeIndex::deserialize(reader)?,
            line_number: u16::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.10
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFile(pub Utf8ConstantIndex);

impl AttributeLike for SourceFile {
    const NAME: &'static str = "SourceFile";
}

impl Serialize for SourceFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for SourceFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(SourceFile(Utf8ConstantIndex::deserialize(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVisibleAnnotations(pub Vec<Annotation>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.17
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInvisibleAnnotations(pub Vec<Annotation>);

impl AttributeLike for RuntimeVisibleAnnotations {
    const NAME: &'static str = "RuntimeVisibleAnnotations";
}

impl AttributeLike for RuntimeInvisibleAnnotations {
    const NAME: &'static str = "RuntimeInvisibleAnnotations";
}

impl Serialize for RuntimeVisibleAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeVisibleAnnotations {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(RuntimeVisibleAnnotations(Vec::deserialize(reader)?))
    }
}

impl Serialize for RuntimeInvisibleAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeInvisibleAnnotations {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(RuntimeInvisibleAnnotations(Vec::deserialize(reader)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface (eg. `Lio/takamaka/code/lang/Payable;`)
    pub type_index: Utf8ConstantIndex,
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub element_name: Utf8ConstantIndex,
    pub value: ElementValue,
}

/// Value of an annotation element
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant (`tag` is one of `BCDFIJSZs`)
    Const { tag: u8, value: ConstantIndex },

    Enum {
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },

    /// Class literal, as a return descriptor (eg. `Lfoo/Bar;` or `V`)
    Class(Utf8ConstantIndex),

    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.type_index.serialize(writer)?;
        self.element_value_pairs.serialize(writer)
    }
}

impl Deserialize for Annotation {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Annotation {
            type_index: Utf8ConstantIndex::deserialize(reader)?,
            element_value_pairs: Vec::deserialize(reader)?,
        })
    }
}

impl Serialize for ElementValuePair {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.element_name.serialize(writer)?;
        self.value.serialize(writer)
    }
}

impl Deserialize for ElementValuePair {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ElementValuePair {
            element_name: Utf8ConstantIndex::deserialize(reader)?,
            value: ElementValue::deserialize(reader)?,
        })
    }
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            ElementValue::Const { tag, value } => {
                tag.serialize(writer)?;
                value.serialize(writer)
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)
            }
            ElementValue::Class(class) => {
                b'c'.serialize(writer)?;
                class.serialize(writer)
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)
            }
        }
    }
}

impl Deserialize for ElementValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let value = match u8::deserialize(reader)? {
            tag @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's') => {
                ElementValue::Const {
                    tag,
                    value: ConstantIndex::deserialize(reader)?,
                }
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::deserialize(reader)?,
                const_name: Utf8ConstantIndex::deserialize(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::deserialize(reader)?),
            b'@' => ElementValue::Annotation(Box::new(Annotation::deserialize(reader)?)),
            b'[' => ElementValue::Array(Vec::deserialize(reader)?),
            other => {
                return Err(Error::BadAttribute {
                    name: "element_value",
                    message: format!("unknown tag {:?}", other as char),
                })
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn attribute<A: AttributeLike>(attribute: &A) -> Attribute {
        let mut info = vec![];
        attribute.serialize(&mut info).unwrap();
        Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info,
        }
    }

    #[test]
    fn line_numbers() {
        let table = LineNumberTable(vec![
            LineNumber {
                start_pc: BytecodeIndex(4),
                line_number: 12,
            },
            LineNumber {
                start_pc: BytecodeIndex(0),
                line_number: 10,
            },
        ]);
        let decoded: LineNumberTable = attribute(&table).decode().unwrap();
        assert_eq!(decoded.line_of(0), Some(10));
        assert_eq!(decoded.line_of(3), Some(10));
        assert_eq!(decoded.line_of(7), Some(12));
        assert_eq!(LineNumberTable(vec![]).line_of(0), None);
    }

    #[test]
    fn nested_annotations() {
        let annotation = Annotation {
            type_index: Utf8ConstantIndex(ConstantIndex(3)),
            element_value_pairs: vec![ElementValuePair {
                element_name: Utf8ConstantIndex(ConstantIndex(4)),
                value: ElementValue::Array(vec![
                    ElementValue::Class(Utf8ConstantIndex(ConstantIndex(5))),
                    ElementValue::Const {
                        tag: b'I',
                        value: ConstantIndex(6),
                    },
                ]),
            }],
        };
        let attr = RuntimeInvisibleAnnotations(vec![annotation]);
        let decoded: RuntimeInvisibleAnnotations = attribute(&attr).decode().unwrap();
        assert_eq!(decoded, attr);
    }

    #[test]
    fn catch_all_handlers() {
        let code = Code {
            max_stack: 1,
            max_locals: 1,
            code_array: BytecodeArray(vec![0xb1]),
            exception_table: vec![ExceptionHandler {
                start_pc: BytecodeIndex(0),
                end_pc: BytecodeIndex(1),
                handler_pc: BytecodeIndex(0),
                catch_type: None,
            }],
            attributes: vec![],
        };
        let decoded: Code = attribute(&code).decode().unwrap();
        assert_eq!(decoded, code);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut attr = attribute(&SourceFile(Utf8ConstantIndex(ConstantIndex(2))));
        attr.info.push(0);
        assert!(matches!(
            attr.decode::<SourceFile>(),
            Err(Error::TrailingBytes("SourceFile"))
        ));
    }
}
