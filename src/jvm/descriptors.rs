use super::{BinaryName, Name};
use crate::util::Width;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string, rejecting trailing input
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}' in '{}'", c, source);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        write_to.push(match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        });
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.next() {
            Some('B') => Ok(BaseType::Byte),
            Some('C') => Ok(BaseType::Char),
            Some('D') => Ok(BaseType::Double),
            Some('F') => Ok(BaseType::Float),
            Some('I') => Ok(BaseType::Int),
            Some('J') => Ok(BaseType::Long),
            Some('S') => Ok(BaseType::Short),
            Some('Z') => Ok(BaseType::Boolean),
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
            None => Err(Error::new(
                ErrorKind::UnexpectedEof,
                "Missing base type character",
            )),
        }
    }
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

impl<C> RefType<C> {
    /// Class of an object type (arrays have none)
    pub fn as_object(&self) -> Option<&C> {
        match self {
            RefType::Object(class) => Some(class),
            RefType::ObjectArray(_) | RefType::PrimitiveArray(_) => None,
        }
    }

    pub fn array(field_type: FieldType<C>) -> RefType<C> {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next_if_eq(&'L').is_none() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected object type to start with `L`",
            ));
        }
        let mut class_name = String::new();
        loop {
            match source.next() {
                Some(';') => {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
                }
                Some(c) => class_name.push(c),
                None => {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    return Err(Error::new(ErrorKind::UnexpectedEof, msg));
                }
            }
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('L') => Ok(RefType::Object(C::parse_from(source)?)),
            Some('[') => {
                let mut dimensions = 0;
                while source.next_if_eq(&'[').is_some() {
                    dimensions += 1;
                }
                let additional_dimensions = dimensions - 1;
                if let Some('L') = source.peek().copied() {
                    Ok(RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: C::parse_from(source)?,
                    }))
                } else {
                    Ok(RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    }))
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing reference type")),
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn array(field_type: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(field_type))
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }

    /// Class of an object type (primitives and arrays have none)
    pub fn as_object(&self) -> Option<&C> {
        match self {
            FieldType::Ref(ref_type) => ref_type.as_object(),
            FieldType::Base(_) => None,
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,
    pub return_type: Option<FieldType<Class>>, // `None` is for `void` (ie. no return)
}

impl<C> MethodDescriptor<C> {
    /// Total length of parameters in local variable slots (not the same as the length of the
    /// vector)
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Slots occupied on the operand stack by the returned value
    pub fn return_length(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl MethodDescriptor<BinaryName> {
    /// Descriptor with the two extra trailing parameters that instrumentation adds to
    /// from-contract code: the calling contract and a marker of type `Dummy`
    pub fn expanded(&self) -> MethodDescriptor<BinaryName> {
        let mut parameters = self.parameters.clone();
        parameters.push(FieldType::object(BinaryName::CONTRACT));
        parameters.push(FieldType::object(BinaryName::DUMMY));
        MethodDescriptor {
            parameters,
            return_type: self.return_type.clone(),
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next_if_eq(&'(').is_none() {
            return Err(Error::new(ErrorKind::InvalidInput, "Expected '(' for method"));
        }

        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            parameters.push(FieldType::<C>::parse_from(source)?);
        }

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::<C>::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}
