/// std140 layout of uniform structs
///
/// A `StructType` describes the logical shape of a uniform block. Building a
/// `StructLayout` walks that shape once and produces a flat list of leaves
/// (`path`, byte offset, leaf type, element count, stride). The same list is
/// used to write values into a structured buffer and, on the legacy tier, to
/// push the block field by field through the program's uniform setters.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::context::UniformType;
use crate::error::{Error, Result};
use crate::program::{Components, UniformValue};

/// Logical type of a struct member
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderType {
    /// Scalar, vector or matrix
    Leaf(UniformType),
    /// Fixed-size array
    Array(Box<ShaderType>, u32),
    /// Nested struct
    Struct(Rc<StructType>),
}

impl ShaderType {
    pub fn array(element: ShaderType, len: u32) -> Self {
        ShaderType::Array(Box::new(element), len)
    }

    /// Base alignment under std140
    pub fn std140_align(&self) -> u32 {
        match self {
            ShaderType::Leaf(ty) => leaf_align(*ty),
            ShaderType::Array(_, _) => 16,
            ShaderType::Struct(s) => s.std140_align(),
        }
    }

    /// Size in bytes under std140 (arrays and structs include trailing padding)
    pub fn std140_size(&self) -> u32 {
        match self {
            ShaderType::Leaf(ty) => leaf_size(*ty),
            ShaderType::Array(element, len) => array_stride(element) * len,
            ShaderType::Struct(s) => s.std140_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub field_type: ShaderType,
}

/// Declared struct shape, in member order
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: ShaderType) -> Self {
        self.fields.push(StructField {
            name: name.into(),
            field_type,
        });
        self
    }

    pub fn std140_align(&self) -> u32 {
        let widest = self
            .fields
            .iter()
            .map(|f| f.field_type.std140_align())
            .max()
            .unwrap_or(4);
        round_up(widest, 16)
    }

    pub fn std140_size(&self) -> u32 {
        let mut cursor = 0;
        for field in &self.fields {
            cursor = round_up(cursor, field.field_type.std140_align());
            cursor += field.field_type.std140_size();
        }
        round_up(cursor, self.std140_align())
    }
}

/// One addressable leaf of a flattened struct
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLeaf {
    /// Dotted path from the struct root, e.g. `lights[1].color`
    pub path: String,
    pub offset: u32,
    pub leaf_type: UniformType,
    /// Element count (1 unless the leaf is an array of scalars/vectors/matrices)
    pub count: u32,
    /// Distance between array elements
    pub stride: u32,
}

impl LayoutLeaf {
    /// Bytes spanned by the leaf, padding of the last element excluded
    pub fn span(&self) -> u32 {
        self.stride * (self.count - 1) + leaf_size(self.leaf_type)
    }
}

static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Flattened std140 layout of a `StructType`
///
/// Every layout built by `new` gets its own id; clones share it.
#[derive(Debug, Clone)]
pub struct StructLayout {
    id: u64,
    name: String,
    size: u32,
    leaves: Vec<LayoutLeaf>,
    by_path: FxHashMap<String, usize>,
}

impl PartialEq for StructLayout {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.size == other.size && self.leaves == other.leaves
    }
}

impl StructLayout {
    pub fn new(struct_type: &StructType) -> Result<Self> {
        let mut leaves = Vec::new();
        flatten_struct(struct_type, 0, "", &mut leaves)?;
        let by_path = leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| (leaf.path.clone(), i))
            .collect();
        Ok(Self {
            id: NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed),
            name: struct_type.name.clone(),
            size: struct_type.std140_size(),
            leaves,
            by_path,
        })
    }

    /// Never reused for another layout
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn leaves(&self) -> &[LayoutLeaf] {
        &self.leaves
    }

    pub fn leaf(&self, path: &str) -> Option<&LayoutLeaf> {
        self.by_path.get(path).map(|&i| &self.leaves[i])
    }

    /// Resolve a path to (offset, type, element count, stride).
    /// Accepts element paths into leaf arrays, e.g. `weights[2]`.
    pub fn locate(&self, path: &str) -> Option<(u32, UniformType, u32, u32)> {
        if let Some(leaf) = self.leaf(path) {
            return Some((leaf.offset, leaf.leaf_type, leaf.count, leaf.stride));
        }
        let (base, index) = split_index(path)?;
        let leaf = self.leaf(base)?;
        if index >= leaf.count {
            return None;
        }
        Some((leaf.offset + index * leaf.stride, leaf.leaf_type, 1, leaf.stride))
    }

    /// Write `value` at `path` into `dst` (a buffer of at least `size()` bytes).
    /// Aggregates are flattened to `path.field` / `path[index]`.
    /// Returns the byte range touched, for partial GPU uploads.
    pub fn write(&self, path: &str, value: &UniformValue, dst: &mut [u8]) -> Result<(u32, u32)> {
        match value {
            UniformValue::Struct(fields) => {
                let mut range: Option<(u32, u32)> = None;
                for (name, field_value) in fields {
                    let child = join_path(path, name);
                    let touched = self.write(&child, field_value, dst)?;
                    range = Some(merge_range(range, touched));
                }
                range.ok_or_else(|| empty_value(path))
            }
            UniformValue::Array(elements) => {
                let mut range: Option<(u32, u32)> = None;
                for (i, element) in elements.iter().enumerate() {
                    let child = format!("{}[{}]", path, i);
                    let touched = self.write(&child, element, dst)?;
                    range = Some(merge_range(range, touched));
                }
                range.ok_or_else(|| empty_value(path))
            }
            leaf_value => {
                let (offset, leaf_type, count, stride) = self.locate(path).ok_or_else(|| {
                    Error::InvalidUsage(format!("'{}' has no field '{}'", self.name, path))
                })?;
                let components = leaf_value.components().ok_or_else(|| empty_value(path))?;
                encode_leaf(leaf_type, count, stride, &components, &mut dst[offset as usize..])
                    .map_err(|e| match e {
                        Error::InvalidUsage(msg) => {
                            Error::InvalidUsage(format!("'{}.{}': {}", self.name, path, msg))
                        }
                        other => other,
                    })?;
                let elements = components.len() as u32 / leaf_type.components();
                let len = stride * (elements.max(1) - 1) + leaf_size(leaf_type);
                Ok((offset, len))
            }
        }
    }

    /// Decode the leaf at `path` from `src`
    pub fn read(&self, path: &str, src: &[u8]) -> Option<UniformValue> {
        let (offset, leaf_type, count, stride) = self.locate(path)?;
        let src = src.get(offset as usize..)?;
        if count == 1 {
            let components = decode_leaf(leaf_type, 1, stride, src)?;
            return UniformValue::from_components(leaf_type, &components);
        }
        let mut elements = Vec::with_capacity(count as usize);
        for i in 0..count {
            let start = (i * stride) as usize;
            let components = decode_leaf(leaf_type, 1, stride, src.get(start..)?)?;
            elements.push(UniformValue::from_components(leaf_type, &components)?);
        }
        Some(UniformValue::Array(elements))
    }

    /// Components of a leaf (all elements), as the uniform setters expect them
    pub fn read_components(&self, leaf: &LayoutLeaf, src: &[u8]) -> Option<Components> {
        decode_leaf(leaf.leaf_type, leaf.count, leaf.stride, src.get(leaf.offset as usize..)?)
    }
}

// ===== LAYOUT RULES =====

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

fn matrix_dim(ty: UniformType) -> Option<u32> {
    match ty {
        UniformType::Mat2 => Some(2),
        UniformType::Mat3 => Some(3),
        UniformType::Mat4 => Some(4),
        _ => None,
    }
}

fn leaf_align(ty: UniformType) -> u32 {
    if matrix_dim(ty).is_some() {
        return 16;
    }
    match ty.components() {
        1 => 4,
        2 => 8,
        _ => 16,
    }
}

fn leaf_size(ty: UniformType) -> u32 {
    match matrix_dim(ty) {
        // columns are padded to vec4
        Some(dim) => 16 * dim,
        None => 4 * ty.components(),
    }
}

fn array_stride(element: &ShaderType) -> u32 {
    round_up(element.std140_size(), 16)
}

fn flatten_struct(
    struct_type: &StructType,
    base: u32,
    prefix: &str,
    leaves: &mut Vec<LayoutLeaf>,
) -> Result<()> {
    let mut cursor = base;
    for field in &struct_type.fields {
        cursor = round_up(cursor, field.field_type.std140_align());
        let path = join_path(prefix, &field.name);
        flatten_type(&field.field_type, cursor, &path, leaves)?;
        cursor += field.field_type.std140_size();
    }
    Ok(())
}

fn flatten_type(ty: &ShaderType, offset: u32, path: &str, leaves: &mut Vec<LayoutLeaf>) -> Result<()> {
    match ty {
        ShaderType::Leaf(leaf_type) => {
            if leaf_type.is_sampler() {
                return Err(Error::InvalidUsage(format!(
                    "Sampler '{}' cannot live inside a uniform struct",
                    path
                )));
            }
            leaves.push(LayoutLeaf {
                path: path.to_string(),
                offset,
                leaf_type: *leaf_type,
                count: 1,
                stride: leaf_size(*leaf_type),
            });
        }
        ShaderType::Array(element, len) => {
            if *len == 0 {
                return Err(Error::InvalidUsage(format!("Array '{}' has zero length", path)));
            }
            let stride = array_stride(element);
            match element.as_ref() {
                ShaderType::Leaf(leaf_type) if !leaf_type.is_sampler() => {
                    leaves.push(LayoutLeaf {
                        path: path.to_string(),
                        offset,
                        leaf_type: *leaf_type,
                        count: *len,
                        stride,
                    });
                }
                _ => {
                    for i in 0..*len {
                        let element_path = format!("{}[{}]", path, i);
                        flatten_type(element, offset + i * stride, &element_path, leaves)?;
                    }
                }
            }
        }
        ShaderType::Struct(inner) => flatten_struct(inner, offset, path, leaves)?,
    }
    Ok(())
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// `weights[3]` -> (`weights`, 3)
fn split_index(path: &str) -> Option<(&str, u32)> {
    let stripped = path.strip_suffix(']')?;
    let open = stripped.rfind('[')?;
    let index = stripped[open + 1..].parse().ok()?;
    Some((&stripped[..open], index))
}

fn merge_range(range: Option<(u32, u32)>, touched: (u32, u32)) -> (u32, u32) {
    match range {
        None => touched,
        Some((offset, len)) => {
            let start = offset.min(touched.0);
            let end = (offset + len).max(touched.0 + touched.1);
            (start, end - start)
        }
    }
}

fn empty_value(path: &str) -> Error {
    Error::InvalidUsage(format!("Empty value for '{}'", path))
}

// ===== ENCODING =====

/// Columns and rows of one element of a leaf type
fn element_shape(ty: UniformType) -> (u32, u32) {
    match matrix_dim(ty) {
        Some(dim) => (dim, dim),
        None => (1, ty.components()),
    }
}

fn encode_leaf(
    leaf_type: UniformType,
    count: u32,
    stride: u32,
    components: &Components,
    dst: &mut [u8],
) -> Result<()> {
    let per_element = leaf_type.components() as usize;
    let given = components.len();
    if given == 0 || given % per_element != 0 || given / per_element > count as usize {
        return Err(Error::InvalidUsage(format!(
            "expected up to {} x {} components, got {}",
            count, per_element, given
        )));
    }
    let (columns, rows) = element_shape(leaf_type);
    let column_stride = if columns > 1 { 16 } else { 0 };
    for element in 0..given / per_element {
        for column in 0..columns {
            for row in 0..rows {
                let src = element * per_element + (column * rows + row) as usize;
                let at = (element as u32 * stride + column * column_stride + row * 4) as usize;
                let bytes = components.bytes_of(src);
                dst.get_mut(at..at + 4)
                    .ok_or_else(|| Error::InvalidUsage("write past the end of the struct".to_string()))?
                    .copy_from_slice(&bytes);
            }
        }
    }
    Ok(())
}

fn decode_leaf(leaf_type: UniformType, count: u32, stride: u32, src: &[u8]) -> Option<Components> {
    let (columns, rows) = element_shape(leaf_type);
    let column_stride = if columns > 1 { 16 } else { 0 };
    let mut words = Vec::with_capacity((count * columns * rows) as usize);
    for element in 0..count {
        for column in 0..columns {
            for row in 0..rows {
                let at = (element * stride + column * column_stride + row * 4) as usize;
                let bytes: [u8; 4] = src.get(at..at + 4)?.try_into().ok()?;
                words.push(u32::from_le_bytes(bytes));
            }
        }
    }
    let components = match crate::program::scalar_family(leaf_type) {
        crate::program::ScalarFamily::Float | crate::program::ScalarFamily::Matrix(_) => {
            Components::F32(bytemuck::cast_slice(&words).to_vec())
        }
        crate::program::ScalarFamily::UInt => Components::U32(words),
        crate::program::ScalarFamily::Int => Components::I32(bytemuck::cast_slice(&words).to_vec()),
    };
    Some(components)
}

#[cfg(test)]
#[path = "std140_tests.rs"]
mod tests;
