/// Uniform values and typed setters
///
/// `UniformValue` is what callers hand to `Program::set_uniform`,
/// `StructuredBuffer::set_value` and `BindGroup::set_value`. Leaf values are
/// converted once into a flat component list; aggregates (`Struct`, `Array`)
/// are flattened into `name.field` / `name[index]` paths by the program.

use glam::{IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};

use crate::context::{GlContext, NativeUniformLocation, UniformData, UniformType};
use crate::error::{Error, Result};

/// A value destined for a uniform or a std140 field
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Int(i32),
    IVec2(IVec2),
    IVec3(IVec3),
    IVec4(IVec4),
    UInt(u32),
    UVec2(UVec2),
    UVec3(UVec3),
    UVec4(UVec4),
    Bool(bool),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    Vec2Array(Vec<Vec2>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    IntArray(Vec<i32>),
    Mat4Array(Vec<Mat4>),
    /// Named fields, flattened to `name.field`
    Struct(Vec<(String, UniformValue)>),
    /// Elements, flattened to `name[index]`
    Array(Vec<UniformValue>),
}

/// Flat scalar components of a leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Components {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U32(Vec<u32>),
}

impl Components {
    pub fn len(&self) -> usize {
        match self {
            Components::F32(v) => v.len(),
            Components::I32(v) => v.len(),
            Components::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Component `i` as raw 32-bit little-endian bytes
    pub fn bytes_of(&self, i: usize) -> [u8; 4] {
        match self {
            Components::F32(v) => v[i].to_le_bytes(),
            Components::I32(v) => v[i].to_le_bytes(),
            Components::U32(v) => v[i].to_le_bytes(),
        }
    }
}

impl UniformValue {
    /// Whether the value must be flattened before reaching a setter
    pub fn is_aggregate(&self) -> bool {
        matches!(self, UniformValue::Struct(_) | UniformValue::Array(_))
    }

    /// Flat components (column-major for matrices). `None` for aggregates.
    pub fn components(&self) -> Option<Components> {
        let components = match self {
            UniformValue::Float(v) => Components::F32(vec![*v]),
            UniformValue::Vec2(v) => Components::F32(v.to_array().to_vec()),
            UniformValue::Vec3(v) => Components::F32(v.to_array().to_vec()),
            UniformValue::Vec4(v) => Components::F32(v.to_array().to_vec()),
            UniformValue::Int(v) => Components::I32(vec![*v]),
            UniformValue::IVec2(v) => Components::I32(v.to_array().to_vec()),
            UniformValue::IVec3(v) => Components::I32(v.to_array().to_vec()),
            UniformValue::IVec4(v) => Components::I32(v.to_array().to_vec()),
            UniformValue::UInt(v) => Components::U32(vec![*v]),
            UniformValue::UVec2(v) => Components::U32(v.to_array().to_vec()),
            UniformValue::UVec3(v) => Components::U32(v.to_array().to_vec()),
            UniformValue::UVec4(v) => Components::U32(v.to_array().to_vec()),
            UniformValue::Bool(v) => Components::I32(vec![*v as i32]),
            UniformValue::Mat2(m) => Components::F32(m.to_cols_array().to_vec()),
            UniformValue::Mat3(m) => Components::F32(m.to_cols_array().to_vec()),
            UniformValue::Mat4(m) => Components::F32(m.to_cols_array().to_vec()),
            UniformValue::FloatArray(v) => Components::F32(v.clone()),
            UniformValue::Vec2Array(v) => Components::F32(v.iter().flat_map(|e| e.to_array()).collect()),
            UniformValue::Vec3Array(v) => Components::F32(v.iter().flat_map(|e| e.to_array()).collect()),
            UniformValue::Vec4Array(v) => Components::F32(v.iter().flat_map(|e| e.to_array()).collect()),
            UniformValue::IntArray(v) => Components::I32(v.clone()),
            UniformValue::Mat4Array(v) => {
                Components::F32(v.iter().flat_map(|m| m.to_cols_array()).collect())
            }
            UniformValue::Struct(_) | UniformValue::Array(_) => return None,
        };
        Some(components)
    }

    /// Build a leaf value of `uniform_type` from raw components
    pub fn from_components(uniform_type: UniformType, components: &Components) -> Option<Self> {
        use UniformType as T;
        let value = match (uniform_type, components) {
            (T::Float, Components::F32(v)) => UniformValue::Float(*v.first()?),
            (T::Vec2, Components::F32(v)) => UniformValue::Vec2(Vec2::from_slice(v.get(..2)?)),
            (T::Vec3, Components::F32(v)) => UniformValue::Vec3(Vec3::from_slice(v.get(..3)?)),
            (T::Vec4, Components::F32(v)) => UniformValue::Vec4(Vec4::from_slice(v.get(..4)?)),
            (T::Mat2, Components::F32(v)) => UniformValue::Mat2(Mat2::from_cols_slice(v.get(..4)?)),
            (T::Mat3, Components::F32(v)) => UniformValue::Mat3(Mat3::from_cols_slice(v.get(..9)?)),
            (T::Mat4, Components::F32(v)) => UniformValue::Mat4(Mat4::from_cols_slice(v.get(..16)?)),
            (T::Int, Components::I32(v)) => UniformValue::Int(*v.first()?),
            (T::IVec2, Components::I32(v)) => UniformValue::IVec2(IVec2::from_slice(v.get(..2)?)),
            (T::IVec3, Components::I32(v)) => UniformValue::IVec3(IVec3::from_slice(v.get(..3)?)),
            (T::IVec4, Components::I32(v)) => UniformValue::IVec4(IVec4::from_slice(v.get(..4)?)),
            (T::UInt, Components::U32(v)) => UniformValue::UInt(*v.first()?),
            (T::UVec2, Components::U32(v)) => UniformValue::UVec2(UVec2::from_slice(v.get(..2)?)),
            (T::UVec3, Components::U32(v)) => UniformValue::UVec3(UVec3::from_slice(v.get(..3)?)),
            (T::UVec4, Components::U32(v)) => UniformValue::UVec4(UVec4::from_slice(v.get(..4)?)),
            (T::Bool, Components::I32(v)) => UniformValue::Bool(*v.first()? != 0),
            (T::Bool, Components::U32(v)) => UniformValue::Bool(*v.first()? != 0),
            _ => return None,
        };
        Some(value)
    }
}

/// Scalar family a uniform type is uploaded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFamily {
    Float,
    Int,
    UInt,
    Matrix(u8),
}

pub fn scalar_family(uniform_type: UniformType) -> ScalarFamily {
    use UniformType as T;
    match uniform_type {
        T::Float | T::Vec2 | T::Vec3 | T::Vec4 => ScalarFamily::Float,
        T::UInt | T::UVec2 | T::UVec3 | T::UVec4 => ScalarFamily::UInt,
        T::Mat2 => ScalarFamily::Matrix(2),
        T::Mat3 => ScalarFamily::Matrix(3),
        T::Mat4 => ScalarFamily::Matrix(4),
        // ints, bools and sampler units
        _ => ScalarFamily::Int,
    }
}

/// Typed upload closure built once per active uniform
pub type SetterFn = Box<dyn Fn(&dyn GlContext, &Components) -> Result<()>>;

/// Build the setter for one active uniform of `size` elements
pub fn make_setter(
    name: &str,
    uniform_type: UniformType,
    size: u32,
    location: NativeUniformLocation,
) -> SetterFn {
    let name = name.to_string();
    let per_element = uniform_type.components() as usize;
    let max = per_element * size.max(1) as usize;
    let family = scalar_family(uniform_type);

    let check = move |given: usize, name: &str| -> Result<()> {
        if given == 0 || given % per_element != 0 || given > max {
            return Err(Error::InvalidUsage(format!(
                "Uniform '{}' expects a multiple of {} components (at most {}), got {}",
                name, per_element, max, given
            )));
        }
        Ok(())
    };

    match family {
        ScalarFamily::Float => {
            let c = per_element as u8;
            Box::new(move |gl, components| {
                check(components.len(), &name)?;
                match components {
                    Components::F32(values) => {
                        gl.uniform(location, UniformData::Float { components: c, values });
                        Ok(())
                    }
                    _ => Err(type_mismatch(&name, "float")),
                }
            })
        }
        ScalarFamily::Matrix(dim) => Box::new(move |gl, components| {
            check(components.len(), &name)?;
            match components {
                Components::F32(values) => {
                    gl.uniform(location, UniformData::Matrix { dim, values });
                    Ok(())
                }
                _ => Err(type_mismatch(&name, "matrix")),
            }
        }),
        ScalarFamily::Int => {
            let c = per_element as u8;
            Box::new(move |gl, components| {
                check(components.len(), &name)?;
                match components {
                    Components::I32(values) => {
                        gl.uniform(location, UniformData::Int { components: c, values });
                        Ok(())
                    }
                    // bool fields read back from std140 storage arrive as u32
                    Components::U32(values) => {
                        let ints: Vec<i32> = values.iter().map(|v| *v as i32).collect();
                        gl.uniform(location, UniformData::Int { components: c, values: &ints });
                        Ok(())
                    }
                    _ => Err(type_mismatch(&name, "int")),
                }
            })
        }
        ScalarFamily::UInt => {
            let c = per_element as u8;
            Box::new(move |gl, components| {
                check(components.len(), &name)?;
                match components {
                    Components::U32(values) => {
                        gl.uniform(location, UniformData::UInt { components: c, values });
                        Ok(())
                    }
                    _ => Err(type_mismatch(&name, "uint")),
                }
            })
        }
    }
}

fn type_mismatch(name: &str, expected: &str) -> Error {
    Error::InvalidUsage(format!("Uniform '{}' expects {} components", name, expected))
}
