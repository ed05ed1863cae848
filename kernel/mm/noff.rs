//! NOFF executable format
//!
//! A header made of a magic number and three segment descriptors (code,
//! initialized data, uninitialized data), every field a 32-bit word.
//! Files produced on a host of the other endianness are recognised by the
//! byte-swapped magic and decoded field by field.

use crate::kernel::fs::OpenFile;
use crate::{Error, Result};
use alloc::vec::Vec;

/// Magic number of a NOFF file
pub const NOFF_MAGIC: u32 = 0x00BA_DFAD;

/// Size of the encoded header in bytes
pub const HEADER_SIZE: usize = 40;

/// Location of one segment in the file and in the address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    /// Start of the segment in virtual memory
    pub virtual_addr: u32,
    /// Start of the segment in the file
    pub in_file_addr: u32,
    /// Size in bytes
    pub size: u32,
}

impl Segment {
    /// Virtual address one past the end of the segment
    pub fn virtual_end(&self) -> u32 {
        self.virtual_addr.saturating_add(self.size)
    }

    /// Part of `[start, end)` covered by this segment, if any
    pub fn overlap(&self, start: u32, end: u32) -> Option<(u32, u32)> {
        let lo = start.max(self.virtual_addr);
        let hi = end.min(self.virtual_end());
        (lo < hi).then_some((lo, hi))
    }

    /// File offset holding virtual address `addr` of this segment
    pub fn file_offset(&self, addr: u32) -> Option<u32> {
        addr.checked_sub(self.virtual_addr)?
            .checked_add(self.in_file_addr)
    }

    /// Whether both extents of the segment fit in 32 bits
    pub fn fits(&self) -> bool {
        self.virtual_addr.checked_add(self.size).is_some()
            && self.in_file_addr.checked_add(self.size).is_some()
    }

    fn swapped(self) -> Self {
        Self {
            virtual_addr: self.virtual_addr.swap_bytes(),
            in_file_addr: self.in_file_addr.swap_bytes(),
            size: self.size.swap_bytes(),
        }
    }
}

/// Decoded NOFF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoffHeader {
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl NoffHeader {
    /// Decode a header from its raw bytes
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut words = [0u32; HEADER_SIZE / 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let segment = |i: usize| Segment {
            virtual_addr: words[i],
            in_file_addr: words[i + 1],
            size: words[i + 2],
        };
        let header = Self {
            code: segment(1),
            init_data: segment(4),
            uninit_data: segment(7),
        };

        if words[0] == NOFF_MAGIC {
            Ok(header)
        } else if words[0].swap_bytes() == NOFF_MAGIC {
            log::debug!("NOFF header written with opposite byte order, swapping");
            Ok(header.swapped())
        } else {
            log::error!("bad NOFF magic {:#x}", words[0]);
            Err(Error::InvalidExecutable)
        }
    }

    /// Read and decode the header at the start of `file`
    pub fn read_from(file: &dyn OpenFile) -> Result<Self> {
        let mut bytes = [0u8; HEADER_SIZE];
        if file.read_at(&mut bytes, 0) != HEADER_SIZE {
            log::error!("executable too short for a NOFF header");
            return Err(Error::InvalidExecutable);
        }
        Self::parse(&bytes)
    }

    /// Encode the header, little-endian unless `big_endian`
    pub fn encode(&self, big_endian: bool) -> [u8; HEADER_SIZE] {
        let words = [
            NOFF_MAGIC,
            self.code.virtual_addr,
            self.code.in_file_addr,
            self.code.size,
            self.init_data.virtual_addr,
            self.init_data.in_file_addr,
            self.init_data.size,
            self.uninit_data.virtual_addr,
            self.uninit_data.in_file_addr,
            self.uninit_data.size,
        ];
        let mut bytes = [0u8; HEADER_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            let encoded = if big_endian {
                word.to_be_bytes()
            } else {
                word.to_le_bytes()
            };
            chunk.copy_from_slice(&encoded);
        }
        bytes
    }

    /// Bytes of the image the address space must cover, stack excluded
    pub fn image_size(&self) -> u32 {
        self.code
            .size
            .saturating_add(self.init_data.size)
            .saturating_add(self.uninit_data.size)
    }

    /// The header with every field byte-swapped
    fn swapped(self) -> Self {
        Self {
            code: self.code.swapped(),
            init_data: self.init_data.swapped(),
            uninit_data: self.uninit_data.swapped(),
        }
    }

    /// Highest virtual address touched by a segment
    pub fn highest_address(&self) -> u32 {
        self.code
            .virtual_end()
            .max(self.init_data.virtual_end())
            .max(self.uninit_data.virtual_end())
    }
}

/// Assemble a NOFF image: code at virtual address 0, initialized data
/// right after it, then `uninit_size` bytes of zero-filled data.
pub fn build_image(code: &[u8], data: &[u8], uninit_size: u32) -> Vec<u8> {
    let code_size = code.len() as u32;
    let data_size = data.len() as u32;
    let header = NoffHeader {
        code: Segment {
            virtual_addr: 0,
            in_file_addr: HEADER_SIZE as u32,
            size: code_size,
        },
        init_data: Segment {
            virtual_addr: code_size,
            in_file_addr: HEADER_SIZE as u32 + code_size,
            size: data_size,
        },
        uninit_data: Segment {
            virtual_addr: code_size + data_size,
            in_file_addr: 0,
            size: uninit_size,
        },
    };

    let mut image = Vec::with_capacity(HEADER_SIZE + code.len() + data.len());
    image.extend_from_slice(&header.encode(false));
    image.extend_from_slice(code);
    image.extend_from_slice(data);
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::fs::MemFile;
    use test_case::test_case;

    fn sample() -> NoffHeader {
        NoffHeader {
            code: Segment {
                virtual_addr: 0,
                in_file_addr: 40,
                size: 300,
            },
            init_data: Segment {
                virtual_addr: 300,
                in_file_addr: 340,
                size: 20,
            },
            uninit_data: Segment {
                virtual_addr: 320,
                in_file_addr: 0,
                size: 64,
            },
        }
    }

    #[test_case(false ; "little endian")]
    #[test_case(true ; "byte swapped")]
    fn test_parse_either_byte_order(big_endian: bool) {
        let bytes = sample().encode(big_endian);
        assert_eq!(NoffHeader::parse(&bytes), Ok(sample()));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().encode(false);
        bytes[0] ^= 0xFF;
        assert_eq!(NoffHeader::parse(&bytes), Err(Error::InvalidExecutable));
    }

    #[test]
    fn test_truncated_file() {
        let file = MemFile::from(vec![0xAD, 0xDF, 0xBA, 0x00]);
        assert_eq!(NoffHeader::read_from(&file), Err(Error::InvalidExecutable));
    }

    #[test]
    fn test_build_image_layout() {
        let image = build_image(&[1, 2, 3], &[9, 9], 10);
        assert_eq!(image.len(), HEADER_SIZE + 5);
        assert_eq!(&image[HEADER_SIZE..], &[1, 2, 3, 9, 9]);

        let header = NoffHeader::read_from(&MemFile::from(image)).unwrap();
        assert_eq!(header.code.in_file_addr, 40);
        assert_eq!(header.init_data.virtual_addr, 3);
        assert_eq!(header.init_data.in_file_addr, 43);
        assert_eq!(header.uninit_data.virtual_addr, 5);
        assert_eq!(header.image_size(), 15);
        assert_eq!(header.highest_address(), 15);
    }

    #[test]
    fn test_segment_overlap() {
        let seg = Segment {
            virtual_addr: 100,
            in_file_addr: 0,
            size: 50,
        };
        assert_eq!(seg.overlap(0, 128), Some((100, 128)));
        assert_eq!(seg.overlap(128, 256), Some((128, 150)));
        assert_eq!(seg.overlap(150, 200), None);
        assert_eq!(seg.overlap(0, 100), None);
    }

    #[test]
    fn test_segment_file_offset() {
        let seg = Segment {
            virtual_addr: 100,
            in_file_addr: 40,
            size: 50,
        };
        assert_eq!(seg.file_offset(120), Some(60));
        assert_eq!(seg.file_offset(99), None);
        assert!(seg.fits());

        let seg = Segment {
            virtual_addr: 0,
            in_file_addr: 0xFFFF_FF80,
            size: 200,
        };
        assert!(!seg.fits());
        assert_eq!(seg.file_offset(128), None);
    }

    #[test]
    fn test_swapped_header_round_trip() {
        let bytes = sample().encode(true);
        let header = NoffHeader::parse(&bytes).unwrap();
        assert_eq!(header.code.size, 300);
        assert_eq!(header.swapped().swapped(), header);
    }
}
