//! Typed by-value kernel arguments.
use std::mem::size_of;

use glam::{IVec2, IVec3, IVec4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};
use half::f16;

/// A value that can be passed to a kernel by value. `encode` writes exactly
/// `size_of::<Self>()` little-endian bytes laid out like the C struct the
/// kernel declares.
///
/// Use `#[derive(Immediate)]` on `#[repr(C)]` structs.
pub trait Immediate {
    fn encode(&self, out: &mut [u8]);

    fn to_bytes(&self) -> Vec<u8>
    where
        Self: Sized,
    {
        let mut bytes = vec![0; size_of::<Self>()];
        self.encode(&mut bytes);
        bytes
    }
}

macro_rules! impl_immediate_scalar {
    ($($t:ty),*) => {
        $(impl Immediate for $t {
            #[inline]
            fn encode(&self, out: &mut [u8]) {
                out[..size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
            }
        })*
    };
}
impl_immediate_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64, f16);

impl Immediate for bool {
    #[inline]
    fn encode(&self, out: &mut [u8]) {
        out[0] = *self as u8;
    }
}

impl<T: Immediate, const N: usize> Immediate for [T; N] {
    fn encode(&self, out: &mut [u8]) {
        let stride = size_of::<T>();
        for (i, v) in self.iter().enumerate() {
            v.encode(&mut out[i * stride..(i + 1) * stride]);
        }
    }
}

macro_rules! impl_immediate_vector {
    ($($t:ty),*) => {
        $(impl Immediate for $t {
            #[inline]
            fn encode(&self, out: &mut [u8]) {
                self.to_array().encode(out);
            }
        })*
    };
}
impl_immediate_vector!(Vec2, Vec3, Vec4, UVec2, UVec3, UVec4, IVec2, IVec3, IVec4);
