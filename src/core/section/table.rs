//! The ordered section header sequence.

use super::header::{SectionHeader, SIZEOF_SECTION_HEADER};
use crate::buffers::InputBuffer;

#[derive(Debug, Clone, Default)]
pub struct SectionTable {
    headers: Vec<SectionHeader>,
}

impl SectionTable {
    pub fn deserialize(
        buffer: &InputBuffer,
        pos: u64,
        number_of_sections: u16,
        allow_virtual: bool,
    ) -> Result<Self, crate::error::UtilError> {
        let mut headers = Vec::with_capacity(number_of_sections as usize);
        for i in 0..number_of_sections as u64 {
            headers.push(SectionHeader::deserialize(
                buffer,
                pos + i * SIZEOF_SECTION_HEADER as u64,
                allow_virtual,
            )?);
        }
        Ok(SectionTable { headers })
    }

    pub fn headers(&self) -> &[SectionHeader] {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Vec<SectionHeader> {
        &mut self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn serialize(&self, write_virtual_part: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.headers.len() * SIZEOF_SECTION_HEADER);
        for h in &self.headers {
            out.extend_from_slice(&h.serialize(write_virtual_part));
        }
        out
    }
}
