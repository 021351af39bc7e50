//! SAMPLER_STATE records in the dynamic state heap.
use crate::resource::{SamplerAddressing, FilterMode, Sampler};

pub const SAMPLER_STATE_SIZE: usize = 16;
/// Sampler object ids are the DSH offset plus this bias, keeping them apart
/// from image object ids.
pub const SAMPLER_OBJECT_ID_SHIFT: u32 = 0x40;

const TEXTURE_COORD_WRAP: u32 = 0;
const TEXTURE_COORD_MIRROR: u32 = 1;
const TEXTURE_COORD_CLAMP: u32 = 2;
const TEXTURE_COORD_CLAMP_BORDER: u32 = 4;

const MAP_FILTER_NEAREST: u32 = 0;
const MAP_FILTER_LINEAR: u32 = 1;

const MIP_MODE_NONE: u32 = 0;
const MIP_MODE_NEAREST: u32 = 1;
const MIP_MODE_LINEAR: u32 = 3;

/// Lod values are unsigned 4.8 fixed point.
fn lod_to_fixed(lod: f32) -> u32 {
    (lod.clamp(0.0, 14.0) * 256.0) as u32
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct SamplerState {
    pub min_filter: u32,
    pub mag_filter: u32,
    pub mip_mode: u32,
    pub min_lod: u32,
    pub max_lod: u32,
    pub tcx: u32,
    pub tcy: u32,
    pub tcz: u32,
    pub non_normalized_coords: bool,
}

impl SamplerState {
    pub fn from_sampler(sampler: &Sampler) -> Self {
        let wrap = match sampler.addressing {
            SamplerAddressing::None | SamplerAddressing::ClampToEdge => TEXTURE_COORD_CLAMP,
            SamplerAddressing::Clamp => TEXTURE_COORD_CLAMP_BORDER,
            SamplerAddressing::Repeat => TEXTURE_COORD_WRAP,
            SamplerAddressing::MirroredRepeat => TEXTURE_COORD_MIRROR,
        };
        let map = |f: FilterMode| match f {
            FilterMode::Nearest => MAP_FILTER_NEAREST,
            FilterMode::Linear => MAP_FILTER_LINEAR,
        };
        let mip_mode = match sampler.mip_filter {
            None => MIP_MODE_NONE,
            Some(FilterMode::Nearest) => MIP_MODE_NEAREST,
            Some(FilterMode::Linear) => MIP_MODE_LINEAR,
        };
        Self {
            min_filter: map(sampler.filter),
            mag_filter: map(sampler.filter),
            mip_mode,
            min_lod: lod_to_fixed(sampler.lod_min),
            max_lod: lod_to_fixed(sampler.lod_max),
            tcx: wrap,
            tcy: wrap,
            tcz: wrap,
            non_normalized_coords: !sampler.normalized_coords,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        let dw = [
            (self.mip_mode & 0x3) << 20 | (self.mag_filter & 0x7) << 17 | (self.min_filter & 0x7) << 14,
            (self.min_lod & 0xfff) << 20 | (self.max_lod & 0xfff) << 8,
            0,
            (self.non_normalized_coords as u32) << 10
                | (self.tcx & 0x7) << 6
                | (self.tcy & 0x7) << 3
                | (self.tcz & 0x7),
        ];
        for (chunk, v) in out[..SAMPLER_STATE_SIZE].chunks_exact_mut(4).zip(dw) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let dw: Vec<u32> = bytes[..SAMPLER_STATE_SIZE]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self {
            mip_mode: (dw[0] >> 20) & 0x3,
            mag_filter: (dw[0] >> 17) & 0x7,
            min_filter: (dw[0] >> 14) & 0x7,
            min_lod: (dw[1] >> 20) & 0xfff,
            max_lod: (dw[1] >> 8) & 0xfff,
            non_normalized_coords: (dw[3] >> 10) & 1 != 0,
            tcx: (dw[3] >> 6) & 0x7,
            tcy: (dw[3] >> 3) & 0x7,
            tcz: dw[3] & 0x7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicStateHeap(Vec<u8>);

impl DynamicStateHeap {
    pub fn new(size: usize) -> Self {
        Self(vec![0; size])
    }
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn write(&mut self, offset: usize, state: &SamplerState) {
        state.encode(&mut self.0[offset..offset + SAMPLER_STATE_SIZE]);
    }
    pub fn read(&self, offset: usize) -> SamplerState {
        SamplerState::decode(&self.0[offset..offset + SAMPLER_STATE_SIZE])
    }
}
