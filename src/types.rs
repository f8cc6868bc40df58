//! The C type system: a tagged `Ctype` enum (kind-specific payload lives
//! directly in the variant, not behind a shared kind-int + struct), struct
//! and union layout including bitfield packing, and the usual arithmetic
//! conversions.

use std::cell::RefCell;
use std::rc::Rc;

use crate::util::OrderedMap;

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub ty: Ctype,
    pub offset: u32,
    pub bit_offset: Option<u32>,
    pub bit_size: Option<u32>,
}

/// A struct or union's body. Wrapped in `Rc<RefCell<_>>` so that every
/// declaration referring to the same tag shares one definition, and a
/// forward-declared (incomplete) tag can be completed in place once its
/// body is parsed — completion is monotonic, `complete` never goes back to
/// `false`.
#[derive(Debug)]
pub struct StructType {
    pub name: Option<String>,
    pub is_union: bool,
    pub fields: OrderedMap<FieldInfo>,
    pub size: u32,
    pub align: u32,
    pub complete: bool,
}

impl StructType {
    pub fn incomplete(name: Option<String>, is_union: bool) -> Self {
        StructType {
            name,
            is_union,
            fields: OrderedMap::new(),
            size: 0,
            align: 1,
            complete: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Ctype {
    Void,
    Bool,
    Char { signed: bool },
    Short { signed: bool },
    Int { signed: bool },
    Long { signed: bool },
    LLong { signed: bool },
    Float,
    Double,
    /// Kept identical to `Double` in size, alignment, and codegen path; see
    /// DESIGN.md for why 80-bit extended precision isn't implemented.
    LDouble,
    Ptr(Rc<Ctype>),
    Array {
        elem: Rc<Ctype>,
        length: Option<usize>,
    },
    Struct(Rc<RefCell<StructType>>),
    Union(Rc<RefCell<StructType>>),
    Func {
        return_type: Rc<Ctype>,
        params: Vec<Ctype>,
        has_varargs: bool,
    },
}

pub(crate) fn align_to(n: u32, align: u32) -> u32 {
    if align == 0 {
        return n;
    }
    (n + align - 1) / align * align
}

impl Ctype {
    pub fn ptr(to: Ctype) -> Ctype {
        Ctype::Ptr(Rc::new(to))
    }

    pub fn array(elem: Ctype, length: Option<usize>) -> Ctype {
        Ctype::Array {
            elem: Rc::new(elem),
            length,
        }
    }

    pub fn func(return_type: Ctype, params: Vec<Ctype>, has_varargs: bool) -> Ctype {
        Ctype::Func {
            return_type: Rc::new(return_type),
            params,
            has_varargs,
        }
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ctype::Ptr(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Ctype::Array { .. })
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Ctype::Func { .. })
    }

    pub fn is_struct_or_union(&self) -> bool {
        matches!(self, Ctype::Struct(_) | Ctype::Union(_))
    }

    pub fn is_inttype(&self) -> bool {
        matches!(
            self,
            Ctype::Bool
                | Ctype::Char { .. }
                | Ctype::Short { .. }
                | Ctype::Int { .. }
                | Ctype::Long { .. }
                | Ctype::LLong { .. }
        )
    }

    pub fn is_flotype(&self) -> bool {
        matches!(self, Ctype::Float | Ctype::Double | Ctype::LDouble)
    }

    pub fn is_arithtype(&self) -> bool {
        self.is_inttype() || self.is_flotype()
    }

    pub fn is_signed(&self) -> bool {
        match self {
            Ctype::Bool => false,
            Ctype::Char { signed }
            | Ctype::Short { signed }
            | Ctype::Int { signed }
            | Ctype::Long { signed }
            | Ctype::LLong { signed } => *signed,
            _ => false,
        }
    }

    /// Integer conversion rank, used only to pick a display/result rank
    /// between two integers of the *same byte size* (e.g. `long` vs `long
    /// long` on an LP64 target, both 8 bytes). Width comparisons for the
    /// conversions themselves use `size()`, not this.
    fn rank(&self) -> u32 {
        match self {
            Ctype::Bool => 0,
            Ctype::Char { .. } => 1,
            Ctype::Short { .. } => 2,
            Ctype::Int { .. } => 3,
            Ctype::Long { .. } => 4,
            Ctype::LLong { .. } => 5,
            _ => 0,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Ctype::Void => 0,
            Ctype::Bool | Ctype::Char { .. } => 1,
            Ctype::Short { .. } => 2,
            Ctype::Int { .. } | Ctype::Float => 4,
            Ctype::Long { .. } | Ctype::LLong { .. } | Ctype::Double | Ctype::LDouble => 8,
            Ctype::Ptr(_) | Ctype::Func { .. } => 8,
            Ctype::Array { elem, length } => length.map(|n| n as u32 * elem.size()).unwrap_or(0),
            Ctype::Struct(s) | Ctype::Union(s) => s.borrow().size,
        }
    }

    pub fn align(&self) -> u32 {
        match self {
            Ctype::Array { elem, .. } => elem.align(),
            Ctype::Struct(s) | Ctype::Union(s) => s.borrow().align,
            Ctype::Func { .. } => 1,
            other => other.size().max(1),
        }
    }

    /// Array-to-pointer and function-to-pointer decay, applied whenever an
    /// lvalue of that type appears in a context expecting a value (almost
    /// everywhere except `sizeof`, `&`, and an initializer's own array).
    pub fn decay(&self) -> Ctype {
        match self {
            Ctype::Array { elem, .. } => Ctype::Ptr(elem.clone()),
            Ctype::Func { .. } => Ctype::Ptr(Rc::new(self.clone())),
            other => other.clone(),
        }
    }

    pub fn is_compatible(&self, other: &Ctype) -> bool {
        use Ctype::*;
        match (self, other) {
            (Void, Void) | (Bool, Bool) | (Float, Float) | (Double, Double) | (LDouble, LDouble) => {
                true
            }
            (Char { signed: a }, Char { signed: b })
            | (Short { signed: a }, Short { signed: b })
            | (Int { signed: a }, Int { signed: b })
            | (Long { signed: a }, Long { signed: b })
            | (LLong { signed: a }, LLong { signed: b }) => a == b,
            (Ptr(a), Ptr(b)) => a.is_compatible(b),
            (Array { elem: a, .. }, Array { elem: b, .. }) => a.is_compatible(b),
            (Struct(a), Struct(b)) | (Union(a), Union(b)) => Rc::ptr_eq(a, b),
            (
                Func {
                    return_type: ra,
                    params: pa,
                    has_varargs: va,
                },
                Func {
                    return_type: rb,
                    params: pb,
                    has_varargs: vb,
                },
            ) => {
                va == vb
                    && ra.is_compatible(rb)
                    && pa.len() == pb.len()
                    && pa.iter().zip(pb.iter()).all(|(x, y)| x.is_compatible(y))
            }
            _ => false,
        }
    }
}

/// Binary operator class relevant to type combination. Parser ops map into
/// this before calling `result_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Other,
}

fn promote(t: &Ctype) -> Ctype {
    match t {
        Ctype::Bool | Ctype::Char { .. } | Ctype::Short { .. } => Ctype::Int { signed: true },
        other => other.clone(),
    }
}

fn with_rank_signed(rank: u32, signed: bool) -> Ctype {
    match rank {
        3 => Ctype::Int { signed },
        4 => Ctype::Long { signed },
        5 => Ctype::LLong { signed },
        _ => Ctype::Int { signed },
    }
}

fn float_rank(t: &Ctype) -> u8 {
    match t {
        Ctype::Float => 1,
        Ctype::Double => 2,
        Ctype::LDouble => 3,
        _ => 0,
    }
}

/// Usual arithmetic conversions (C11 6.3.1.8), plus the pointer-arithmetic
/// short-circuit for `+`/`-`: adding/subtracting a pointer and an integer
/// keeps the pointer type, and subtracting two pointers yields `long`
/// (approximating `ptrdiff_t`).
pub fn result_type(op: ArithOp, a: &Ctype, b: &Ctype) -> Ctype {
    if matches!(op, ArithOp::Add | ArithOp::Sub) {
        if a.is_ptr() && b.is_ptr() {
            return Ctype::Long { signed: true };
        }
        if a.is_ptr() {
            return a.clone();
        }
        if b.is_ptr() {
            return b.clone();
        }
    }
    if a.is_flotype() || b.is_flotype() {
        let fa = float_rank(a);
        let fb = float_rank(b);
        return if fa >= fb { a.clone() } else { b.clone() };
    }
    let pa = promote(a);
    let pb = promote(b);
    let sa = pa.size();
    let sb = pb.size();
    if sa == sb {
        if pa.is_signed() == pb.is_signed() {
            if pa.rank() >= pb.rank() {
                pa
            } else {
                pb
            }
        } else {
            with_rank_signed(pa.rank().max(pb.rank()), false)
        }
    } else if sa > sb {
        pa
    } else {
        pb
    }
}

/// Packs struct/union fields in declaration order, handling bitfields by
/// grouping consecutive bitfields into the storage unit implied by their
/// declared type, matching the common x86-64 SysV layout.
pub fn complete_struct(
    name: Option<String>,
    fields: Vec<(String, Ctype, Option<u32>)>,
    is_union: bool,
) -> StructType {
    let mut infos = OrderedMap::new();
    let mut offset: u32 = 0;
    let mut bit_used: u32 = 0;
    let mut unit_size: u32 = 0;
    let mut max_align: u32 = 1;

    for (fname, ty, bits) in fields {
        let align = ty.align();
        max_align = max_align.max(align);
        if let Some(width) = bits {
            let unit_bytes = ty.size();
            if unit_size == 0 || bit_used + width > unit_size * 8 {
                if unit_size != 0 && !is_union {
                    offset += unit_size;
                }
                if !is_union {
                    offset = align_to(offset, align);
                }
                unit_size = unit_bytes;
                bit_used = 0;
            }
            let field_offset = if is_union { 0 } else { offset };
            infos.insert(
                fname,
                FieldInfo {
                    ty,
                    offset: field_offset,
                    bit_offset: Some(bit_used),
                    bit_size: Some(width),
                },
            );
            bit_used += width;
        } else {
            if unit_size != 0 && !is_union {
                offset += unit_size;
            }
            unit_size = 0;
            bit_used = 0;
            let field_offset = if is_union { 0 } else { align_to(offset, align) };
            let field_size = ty.size();
            infos.insert(
                fname,
                FieldInfo {
                    ty,
                    offset: field_offset,
                    bit_offset: None,
                    bit_size: None,
                },
            );
            if !is_union {
                offset = field_offset + field_size;
            }
        }
    }
    if unit_size != 0 && !is_union {
        offset += unit_size;
    }

    let size = if is_union {
        infos.values().map(|f| f.ty.size()).max().unwrap_or(0)
    } else {
        offset
    };
    let align = max_align.max(1);

    StructType {
        name,
        is_union,
        fields: infos,
        size: align_to(size, align),
        align,
        complete: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sizes_match_sysv_amd64() {
        assert_eq!(Ctype::Bool.size(), 1);
        assert_eq!(Ctype::Int { signed: true }.size(), 4);
        assert_eq!(Ctype::Long { signed: true }.size(), 8);
        assert_eq!(Ctype::Double.size(), 8);
        assert_eq!(Ctype::ptr(Ctype::Void).size(), 8);
    }

    #[test]
    fn array_decays_to_pointer_to_element() {
        let arr = Ctype::array(Ctype::Int { signed: true }, Some(10));
        match arr.decay() {
            Ctype::Ptr(elem) => assert!(matches!(*elem, Ctype::Int { signed: true })),
            _ => panic!("expected pointer"),
        }
    }

    #[test]
    fn usual_arith_conversion_int_plus_double_is_double() {
        let r = result_type(ArithOp::Other, &Ctype::Int { signed: true }, &Ctype::Double);
        assert!(matches!(r, Ctype::Double));
    }

    #[test]
    fn usual_arith_unsigned_long_plus_int_is_unsigned_long() {
        let ul = Ctype::Long { signed: false };
        let i = Ctype::Int { signed: true };
        let r = result_type(ArithOp::Other, &ul, &i);
        assert!(matches!(r, Ctype::Long { signed: false }));
    }

    #[test]
    fn usual_arith_signed_long_long_plus_unsigned_int_is_signed_long_long() {
        let ll = Ctype::LLong { signed: true };
        let u = Ctype::Int { signed: false };
        let r = result_type(ArithOp::Other, &ll, &u);
        assert!(matches!(r, Ctype::LLong { signed: true }));
    }

    #[test]
    fn usual_arith_unsigned_long_plus_signed_long_long_is_unsigned_long_long() {
        // Same byte width (8), differing signedness: unsigned wins even
        // though `long long` has strictly higher C integer rank, because a
        // signed 64-bit type cannot represent all unsigned 64-bit values.
        let ul = Ctype::Long { signed: false };
        let ll = Ctype::LLong { signed: true };
        let r = result_type(ArithOp::Other, &ul, &ll);
        assert!(matches!(r, Ctype::LLong { signed: false }));
    }

    #[test]
    fn pointer_plus_int_keeps_pointer_type() {
        let p = Ctype::ptr(Ctype::Int { signed: true });
        let i = Ctype::Int { signed: true };
        let r = result_type(ArithOp::Add, &p, &i);
        assert!(r.is_ptr());
    }

    #[test]
    fn bitfields_pack_into_shared_storage_unit() {
        let s = complete_struct(
            None,
            vec![
                ("a".to_string(), Ctype::Int { signed: true }, Some(3)),
                ("b".to_string(), Ctype::Int { signed: true }, Some(5)),
                ("c".to_string(), Ctype::Int { signed: true }, None),
            ],
            false,
        );
        let a = s.fields.get("a").unwrap();
        let b = s.fields.get("b").unwrap();
        let c = s.fields.get("c").unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(a.bit_offset, Some(0));
        assert_eq!(b.offset, 0);
        assert_eq!(b.bit_offset, Some(3));
        assert_eq!(c.offset, 4);
        assert_eq!(s.size, 8);
        assert_eq!(s.align, 4);
    }

    #[test]
    fn union_size_is_max_of_members() {
        let u = complete_struct(
            None,
            vec![
                ("i".to_string(), Ctype::Int { signed: true }, None),
                ("d".to_string(), Ctype::Double, None),
            ],
            true,
        );
        assert_eq!(u.size, 8);
        assert_eq!(u.align, 8);
        assert_eq!(u.fields.get("i").unwrap().offset, 0);
        assert_eq!(u.fields.get("d").unwrap().offset, 0);
    }
}
