//! Structural types for the Slate language.
//!
//! A type is a base shape plus a pointer-indirection count and an
//! optional array length. Function and struct shapes carry their own
//! payloads. Types are plain values: they are cloned into symbols and
//! AST nodes rather than shared.

use std::fmt;

/// A named member of a struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
    /// Byte offset from the start of the struct. Members are laid out
    /// back to back; there is no padding or alignment.
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BaseType {
    Void,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Func {
        ret: Box<Type>,
        params: Vec<Type>,
    },
    Struct {
        members: Vec<StructMember>,
        /// Total size in bytes: the sum of the member sizes.
        size: u64,
    },
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub base: BaseType,
    /// Pointer indirection count. 0 means not a pointer.
    pub ptr: u32,
    /// Array length. 0 means not an array.
    pub arrlen: u64,
}

impl Type {
    pub fn new(base: BaseType) -> Self {
        Type {
            base,
            ptr: 0,
            arrlen: 0,
        }
    }

    pub fn void() -> Self {
        Type::new(BaseType::Void)
    }

    pub fn is_pointer(&self) -> bool {
        self.ptr > 0
    }

    /// Integral types are everything that is not a struct, union or
    /// function, with no indirection and no array length.
    pub fn is_integral(&self) -> bool {
        !matches!(
            self.base,
            BaseType::Struct { .. } | BaseType::Union | BaseType::Func { .. }
        ) && self.ptr == 0
            && self.arrlen == 0
    }

    /// Size in bytes of an object of this type in the generated image.
    ///
    /// Any pointer is 8 bytes. An array multiplies the primitive size
    /// by its length. Types with no object representation (`void`, a
    /// bare function type) are an error rather than a silent zero.
    pub fn byte_size(&self) -> Result<u64, String> {
        if self.ptr > 0 {
            return Ok(8);
        }
        let prim = match &self.base {
            BaseType::Int8 | BaseType::Uint8 => 1,
            BaseType::Int16 | BaseType::Uint16 => 2,
            BaseType::Int32 | BaseType::Uint32 | BaseType::Float32 => 4,
            BaseType::Int64 | BaseType::Uint64 | BaseType::Float64 => 8,
            BaseType::Struct { size, .. } => *size,
            BaseType::Void | BaseType::Union | BaseType::Func { .. } => {
                return Err(format!("type '{}' has no object size", self));
            }
        };
        Ok(prim * if self.arrlen != 0 { self.arrlen } else { 1 })
    }
}

/// Compatibility for assignment, initialization, return values and
/// binary operands: two pointer types always match, and two integral
/// types always match. There is no promotion matrix beyond this.
pub fn compatible(a: &Type, b: &Type) -> bool {
    (a.is_pointer() && b.is_pointer()) || (a.is_integral() && b.is_integral())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &self.base {
            BaseType::Void => "void",
            BaseType::Int8 => "int8",
            BaseType::Int16 => "int16",
            BaseType::Int32 => "int32",
            BaseType::Int64 => "int64",
            BaseType::Uint8 => "uint8",
            BaseType::Uint16 => "uint16",
            BaseType::Uint32 => "uint32",
            BaseType::Uint64 => "uint64",
            BaseType::Float32 => "float32",
            BaseType::Float64 => "float64",
            BaseType::Func { .. } => "fn",
            BaseType::Struct { .. } => "struct",
            BaseType::Union => "union",
        };
        write!(f, "{}", name)?;
        for _ in 0..self.ptr {
            write!(f, "*")?;
        }
        if self.arrlen != 0 {
            write!(f, "[{}]", self.arrlen)?;
        }
        Ok(())
    }
}
