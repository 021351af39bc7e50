//! Surface state records and the per-instance surface state heap.
use crate::descriptor::BindingTable;

pub const SURFACE_STATE_SIZE: usize = 64;
pub const MEDIA_SURFACE_STATE_SIZE: usize = 32;
pub const BINDING_TABLE_ENTRY_SIZE: usize = 4;

/// Surface format used for untyped buffer access.
pub const SURFACE_FORMAT_RAW: u32 = 0x1ff;
pub const SURFACE_FORMAT_R32_UINT: u32 = 0x0d7;

pub const MEDIA_FORMAT_PLANAR_420_8: u32 = 4;
pub const MEDIA_FORMAT_Y8_UNORM: u32 = 12;

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum SurfaceType {
    Surface1D,
    Surface2D,
    Surface3D,
    Buffer,
    Null,
}
impl SurfaceType {
    fn bits(self) -> u32 {
        match self {
            SurfaceType::Surface1D => 0,
            SurfaceType::Surface2D => 1,
            SurfaceType::Surface3D => 2,
            SurfaceType::Buffer => 4,
            SurfaceType::Null => 7,
        }
    }
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => SurfaceType::Surface1D,
            1 => SurfaceType::Surface2D,
            2 => SurfaceType::Surface3D,
            4 => SurfaceType::Buffer,
            _ => SurfaceType::Null,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum AuxMode {
    #[default]
    None,
    /// Lossless color compression.
    CcsE,
}
impl AuxMode {
    fn bits(self) -> u32 {
        match self {
            AuxMode::None => 0,
            AuxMode::CcsE => 5,
        }
    }
    fn from_bits(bits: u32) -> Self {
        match bits {
            5 => AuxMode::CcsE,
            _ => AuxMode::None,
        }
    }
}

#[inline]
fn field(value: u32, lo: u32, bits: u32) -> u32 {
    (value & ((1u32 << bits) - 1)) << lo
}
#[inline]
fn extract(dw: u32, lo: u32, bits: u32) -> u32 {
    (dw >> lo) & ((1u32 << bits) - 1)
}

/// A 64 byte RENDER_SURFACE_STATE. Dimension fields hold the hardware
/// encoding, i.e. the value minus one.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SurfaceState {
    pub surface_type: SurfaceType,
    pub format: u32,
    pub is_array: bool,
    pub mocs: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub pitch: u32,
    pub min_array_element: u32,
    pub render_target_view_extent: u32,
    pub multisample_count: u32,
    pub mip_count: u32,
    pub min_lod: u32,
    pub aux_mode: AuxMode,
    pub compression_enabled: bool,
    pub base_address: u64,
    pub aux_base_address: u64,
}

impl SurfaceState {
    pub fn null() -> Self {
        Self {
            surface_type: SurfaceType::Null,
            format: 0,
            is_array: false,
            mocs: 0,
            width: 0,
            height: 0,
            depth: 0,
            pitch: 0,
            min_array_element: 0,
            render_target_view_extent: 0,
            multisample_count: 0,
            mip_count: 0,
            min_lod: 0,
            aux_mode: AuxMode::None,
            compression_enabled: false,
            base_address: 0,
            aux_base_address: 0,
        }
    }

    /// Buffer surface covering `[address, address + size)`. The base is
    /// aligned down to a dword and the length grows by the residual so the
    /// surface still covers the last byte.
    pub fn buffer(address: u64, size: u64, mocs: u32, aux_mode: AuxMode) -> Self {
        let base = address & !3;
        let residual = address - base;
        // the split length fields hold at most 2^32 bytes
        let size = size.saturating_add(residual).min(1 << 32);
        let length = crate::slm::align_up(size, 4).max(1) - 1;
        Self {
            surface_type: SurfaceType::Buffer,
            format: SURFACE_FORMAT_RAW,
            mocs,
            width: (length & 0x7f) as u32,
            height: ((length >> 7) & 0x3fff) as u32,
            depth: ((length >> 21) & 0x7ff) as u32,
            aux_mode,
            compression_enabled: aux_mode != AuxMode::None,
            base_address: base,
            ..Self::null()
        }
    }

    /// Buffer length in bytes reconstructed from the split length fields.
    pub fn buffer_length(&self) -> u64 {
        ((self.depth as u64) << 21 | (self.height as u64) << 7 | self.width as u64) + 1
    }

    pub fn encode(&self, out: &mut [u8]) {
        let mut dw = [0u32; 16];
        dw[0] = field(self.surface_type.bits(), 29, 3)
            | field(self.is_array as u32, 28, 1)
            | field(self.format, 18, 9);
        dw[1] = field(self.mocs, 24, 7);
        dw[2] = field(self.width, 0, 14) | field(self.height, 16, 14);
        dw[3] = field(self.depth, 21, 11) | field(self.pitch, 0, 18);
        dw[4] = field(self.multisample_count, 0, 3)
            | field(self.render_target_view_extent, 7, 11)
            | field(self.min_array_element, 18, 11);
        dw[5] = field(self.mip_count, 0, 4) | field(self.min_lod, 4, 4);
        dw[6] = field(self.aux_mode.bits(), 0, 3);
        dw[7] = field(self.compression_enabled as u32, 30, 1);
        dw[8] = self.base_address as u32;
        dw[9] = (self.base_address >> 32) as u32;
        dw[10] = self.aux_base_address as u32;
        dw[11] = (self.aux_base_address >> 32) as u32;
        for (chunk, v) in out[..SURFACE_STATE_SIZE].chunks_exact_mut(4).zip(dw) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let dw: Vec<u32> = bytes[..SURFACE_STATE_SIZE]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self {
            surface_type: SurfaceType::from_bits(extract(dw[0], 29, 3)),
            is_array: extract(dw[0], 28, 1) != 0,
            format: extract(dw[0], 18, 9),
            mocs: extract(dw[1], 24, 7),
            width: extract(dw[2], 0, 14),
            height: extract(dw[2], 16, 14),
            depth: extract(dw[3], 21, 11),
            pitch: extract(dw[3], 0, 18),
            multisample_count: extract(dw[4], 0, 3),
            render_target_view_extent: extract(dw[4], 7, 11),
            min_array_element: extract(dw[4], 18, 11),
            mip_count: extract(dw[5], 0, 4),
            min_lod: extract(dw[5], 4, 4),
            aux_mode: AuxMode::from_bits(extract(dw[6], 0, 3)),
            compression_enabled: extract(dw[7], 30, 1) != 0,
            base_address: dw[8] as u64 | (dw[9] as u64) << 32,
            aux_base_address: dw[10] as u64 | (dw[11] as u64) << 32,
        }
    }
}

/// The 32 byte MEDIA_SURFACE_STATE used by media (VME) images.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct MediaSurfaceState {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub format: u32,
    pub mocs: u32,
    pub base_address: u64,
}

impl MediaSurfaceState {
    pub fn encode(&self, out: &mut [u8]) {
        let mut dw = [0u32; 8];
        dw[1] = field(self.width, 18, 14) | field(self.height, 4, 14);
        dw[2] = field(self.format, 28, 4) | field(self.pitch, 3, 18);
        dw[5] = field(self.mocs, 0, 7);
        dw[6] = self.base_address as u32;
        dw[7] = (self.base_address >> 32) as u32 & 0xffff;
        for (chunk, v) in out[..MEDIA_SURFACE_STATE_SIZE].chunks_exact_mut(4).zip(dw) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
    }
    pub fn decode(bytes: &[u8]) -> Self {
        let dw: Vec<u32> = bytes[..MEDIA_SURFACE_STATE_SIZE]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self {
            width: extract(dw[1], 18, 14),
            height: extract(dw[1], 4, 14),
            format: extract(dw[2], 28, 4),
            pitch: extract(dw[2], 3, 18),
            mocs: extract(dw[5], 0, 7),
            base_address: dw[6] as u64 | ((dw[7] & 0xffff) as u64) << 32,
        }
    }
}

/// Read-only view of a surface state heap handed to the command encoder.
#[derive(Copy, Clone, Debug)]
pub struct SurfaceHeapView<'a> {
    pub bytes: &'a [u8],
    pub binding_table_entry_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceStateHeap {
    bytes: Vec<u8>,
    binding_table_entry_count: u32,
}

impl SurfaceStateHeap {
    /// Allocates a zeroed heap and fills the binding table so that entry `i`
    /// points at the `i`-th surface state record.
    pub fn new(size: usize, table: &BindingTable) -> Self {
        let mut bytes = vec![0; size];
        for i in 0..table.num_entries as usize {
            let at = table.offset as usize + i * BINDING_TABLE_ENTRY_SIZE;
            let entry = (i * SURFACE_STATE_SIZE) as u32;
            bytes[at..at + BINDING_TABLE_ENTRY_SIZE].copy_from_slice(&entry.to_le_bytes());
        }
        Self {
            bytes,
            binding_table_entry_count: table.num_entries,
        }
    }
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
    pub fn view(&self) -> SurfaceHeapView<'_> {
        SurfaceHeapView {
            bytes: &self.bytes,
            binding_table_entry_count: self.binding_table_entry_count,
        }
    }
    pub fn write(&mut self, offset: usize, state: &SurfaceState) {
        state.encode(&mut self.bytes[offset..offset + SURFACE_STATE_SIZE]);
    }
    pub fn write_media(&mut self, offset: usize, state: &MediaSurfaceState) {
        state.encode(&mut self.bytes[offset..offset + MEDIA_SURFACE_STATE_SIZE]);
    }
    pub fn read(&self, offset: usize) -> SurfaceState {
        SurfaceState::decode(&self.bytes[offset..offset + SURFACE_STATE_SIZE])
    }
    pub fn read_media(&self, offset: usize) -> MediaSurfaceState {
        MediaSurfaceState::decode(&self.bytes[offset..offset + MEDIA_SURFACE_STATE_SIZE])
    }
}
