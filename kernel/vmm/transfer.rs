//! Copying data between kernel buffers and user virtual memory
//!
//! Every byte goes through the MMU of the current address space. A page
//! fault is resolved once and the access retried; any other exception is
//! returned to the caller.

use super::VmManager;
use crate::emulator::exception::ExceptionKind;
use crate::Result;
use alloc::vec::Vec;

impl VmManager {
    /// Read `size` bytes of user memory at `addr`
    pub fn read_user(&mut self, addr: u32, size: usize) -> Result<u32> {
        match self.read_mem(addr, size) {
            Err(ExceptionKind::PageFault) => {
                self.handle_page_fault(addr)?;
                Ok(self.read_mem(addr, size)?)
            }
            other => Ok(other?),
        }
    }

    /// Write the low `size` bytes of `value` to user memory at `addr`
    pub fn write_user(&mut self, addr: u32, size: usize, value: u32) -> Result<()> {
        match self.write_mem(addr, size, value) {
            Err(ExceptionKind::PageFault) => {
                self.handle_page_fault(addr)?;
                Ok(self.write_mem(addr, size, value)?)
            }
            other => Ok(other?),
        }
    }

    /// Read a NUL-terminated string of at most `max_len` bytes, terminator
    /// included. `None` if no terminator was found within that many bytes.
    pub fn read_string_from_user(
        &mut self,
        addr: u32,
        max_len: usize,
    ) -> Result<Option<Vec<u8>>> {
        let mut bytes = Vec::new();
        for i in 0..max_len {
            let byte = self.read_user(addr.wrapping_add(i as u32), 1)? as u8;
            if byte == 0 {
                return Ok(Some(bytes));
            }
            bytes.push(byte);
        }
        Ok(None)
    }

    /// Read `len` bytes of user memory
    pub fn read_buffer_from_user(&mut self, addr: u32, len: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(len);
        for i in 0..len {
            bytes.push(self.read_user(addr.wrapping_add(i as u32), 1)? as u8);
        }
        Ok(bytes)
    }

    /// Copy `buffer` into user memory
    pub fn write_buffer_to_user(&mut self, addr: u32, buffer: &[u8]) -> Result<()> {
        for (i, byte) in buffer.iter().enumerate() {
            self.write_user(addr.wrapping_add(i as u32), 1, *byte as u32)?;
        }
        Ok(())
    }

    /// Copy `string` into user memory followed by a NUL terminator
    pub fn write_string_to_user(&mut self, addr: u32, string: &str) -> Result<()> {
        self.write_buffer_to_user(addr, string.as_bytes())?;
        self.write_user(addr.wrapping_add(string.len() as u32), 1, 0)
    }
}
