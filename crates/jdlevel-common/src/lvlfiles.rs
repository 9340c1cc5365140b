// lvlfiles.rs -- compiled level (.lvl) file format constants
//
// All integers are little-endian i32, all floats little-endian IEEE f32.
// Strings live in fixed-width ASCII fields padded with NUL bytes; a string
// exactly as long as its field carries no terminator.
//
//   [16] "JDLEVEL"
//   [16] "MATERIALS"  i32 count, count * [256] name
//   [16] "LIGHTMAP"   i32 width, i32 height, width*height*3 RGB bytes
//   [16] "ENTITY"     i32 count, then per entity:
//        6 * f32 bounds (zero unless the entity carries explicit bounds)
//        i32 numprops, i32 numbrushes
//        numprops * ([128] key, [128] value)
//        numbrushes * brush record (see BRUSH_* below)

// ============================================================
// Section tags
// ============================================================

/// Width of the header magic and of every section tag.
pub const TAG_SIZE: usize = 16;

pub const LEVEL_HEADER: &[u8] = b"JDLEVEL";
pub const TAG_MATERIALS: &[u8] = b"MATERIALS";
pub const TAG_LIGHTMAP: &[u8] = b"LIGHTMAP";
pub const TAG_ENTITY: &[u8] = b"ENTITY";

// ============================================================
// Field widths
// ============================================================

pub const MATERIAL_NAME_SIZE: usize = 256;
pub const KEYVALUE_SIZE: usize = 128;

/// Bytes per lightmap texel (RGB8).
pub const LIGHTMAP_BYTES_PER_PIXEL: usize = 3;

/// Lightmap edge used when the host did not bake one.
pub const DEFAULT_LIGHTMAP_SIZE: u32 = 1024;

/// Entity bounds: mins + maxs.
pub const ENTITY_BOUNDS_FLOATS: usize = 6;

// Brush record:
//   3*f32 mins, 3*f32 maxs
//   i32 numverts, numverts * 3*f32
//   i32 numuvs,   numuvs * 2*f32
//   i32 numfaces, numfaces * face record
// Face record:
//   i32 material index
//   i32 numvertidx, numvertidx * i32
//   i32 numuvidx,   numuvidx * i32
//   i32 numlm,      numlm * 2*f32 (literal lightmap coordinates)
pub const BRUSH_BOUNDS_FLOATS: usize = 6;

// ============================================================
// Field helpers
// ============================================================

/// Copy `s` into a NUL padded field of `width` bytes, truncating if needed.
pub fn fixed_field(s: &[u8], width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    let n = s.len().min(width);
    field[..n].copy_from_slice(&s[..n]);
    field
}

/// Read a NUL padded field back into a string.
pub fn read_fixed_str(data: &[u8], ofs: usize, width: usize) -> String {
    let bytes = &data[ofs..ofs + width];
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(width);
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

pub fn read_i32_le(data: &[u8], ofs: usize) -> i32 {
    i32::from_le_bytes([data[ofs], data[ofs + 1], data[ofs + 2], data[ofs + 3]])
}

pub fn read_f32_le(data: &[u8], ofs: usize) -> f32 {
    f32::from_le_bytes([data[ofs], data[ofs + 1], data[ofs + 2], data[ofs + 3]])
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_fit_in_tag_field() {
        for tag in [LEVEL_HEADER, TAG_MATERIALS, TAG_LIGHTMAP, TAG_ENTITY] {
            assert!(tag.len() < TAG_SIZE);
        }
    }

    #[test]
    fn fixed_field_pads_with_nul() {
        let f = fixed_field(b"abc", 8);
        assert_eq!(f, b"abc\0\0\0\0\0");
    }

    #[test]
    fn fixed_field_truncates() {
        let f = fixed_field(b"abcdefgh", 4);
        assert_eq!(f, b"abcd");
        // no terminator when the string fills the field
        assert_eq!(read_fixed_str(&f, 0, 4), "abcd");
    }

    #[test]
    fn read_fixed_str_stops_at_nul() {
        let mut data = fixed_field(TAG_MATERIALS, TAG_SIZE);
        data.extend_from_slice(&fixed_field(b"x", 4));
        assert_eq!(read_fixed_str(&data, 0, TAG_SIZE), "MATERIALS");
        assert_eq!(read_fixed_str(&data, TAG_SIZE, 4), "x");
    }

    #[test]
    fn byte_readers() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-2i32).to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());
        assert_eq!(read_i32_le(&data, 0), -2);
        assert_eq!(read_f32_le(&data, 4), 1.5);
    }
}
