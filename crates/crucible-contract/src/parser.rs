//! Minimal wasm binary parser.
//!
//! Decodes just enough of the module layout to answer the contract
//! questions: the Type, Import, Function, and Export sections. Other
//! sections are skipped whole. Imports are parsed fully per the wasm
//! binary format (limits carry a conditional maximum) so that malformed
//! or unusual non-function imports cannot desynchronize the walk; the
//! only value actually consumed from the Import section is the number of
//! imported functions, which offsets export indices into the Function
//! section.

use std::collections::HashMap;

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

pub(crate) const SECTION_TYPE: u8 = 1;
pub(crate) const SECTION_IMPORT: u8 = 2;
pub(crate) const SECTION_FUNCTION: u8 = 3;
pub(crate) const SECTION_EXPORT: u8 = 7;

pub(crate) const KIND_FUNCTION: u8 = 0;
pub(crate) const KIND_TABLE: u8 = 1;
pub(crate) const KIND_MEMORY: u8 = 2;
pub(crate) const KIND_GLOBAL: u8 = 3;

/// Decode failures. Rendered into the report's `Invalid wasm binary:` error.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("truncated at offset {0}")]
    Truncated(usize),

    #[error("bad magic bytes")]
    BadMagic,

    #[error("ULEB128 value too large at offset {0}")]
    UlebOverflow(usize),

    #[error("invalid function type marker 0x{0:02x}")]
    BadFuncTypeMarker(u8),

    #[error("unknown import kind 0x{0:02x}")]
    BadImportKind(u8),

    #[error("export name is not valid UTF-8")]
    BadName,
}

pub(crate) struct FuncType {
    pub params: Vec<u8>,
    pub results: Vec<u8>,
}

pub(crate) struct Export {
    pub name: String,
    pub kind: u8,
    pub index: u32,
}

/// The slices of the module the contract checks look at.
pub(crate) struct ParsedModule {
    pub types: Vec<FuncType>,
    pub func_imports: u32,
    /// Type indices of locally defined functions, in Function-section order.
    pub functions: Vec<u32>,
    pub exports: Vec<Export>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&mut self) -> Result<u8, ParseError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(ParseError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or(ParseError::Truncated(self.pos))?;
        if end > self.bytes.len() {
            return Err(ParseError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn uleb(&mut self) -> Result<u32, ParseError> {
        let start = self.pos;
        let mut result: u32 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            if shift >= 32 {
                return Err(ParseError::UlebOverflow(start));
            }
            result |= u32::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        let len = self.uleb()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::BadName)
    }

    /// A limits structure: flag byte, minimum, and a maximum iff bit 0 of
    /// the flag is set.
    fn limits(&mut self) -> Result<(), ParseError> {
        let flags = self.byte()?;
        self.uleb()?;
        if flags & 0x01 != 0 {
            self.uleb()?;
        }
        Ok(())
    }
}

pub(crate) fn parse(bytes: &[u8]) -> Result<ParsedModule, ParseError> {
    let mut r = Reader::new(bytes);
    if r.take(4)? != MAGIC {
        return Err(ParseError::BadMagic);
    }
    r.take(4)?; // version

    // Section walk: id, size, payload. Later duplicates overwrite earlier.
    let mut sections: HashMap<u8, &[u8]> = HashMap::new();
    while !r.done() {
        let id = r.byte()?;
        let size = r.uleb()? as usize;
        let payload = r.take(size)?;
        sections.insert(id, payload);
    }

    let mut module = ParsedModule {
        types: Vec::new(),
        func_imports: 0,
        functions: Vec::new(),
        exports: Vec::new(),
    };

    if let Some(payload) = sections.get(&SECTION_TYPE) {
        let mut r = Reader::new(payload);
        let count = r.uleb()?;
        for _ in 0..count {
            let marker = r.byte()?;
            if marker != 0x60 {
                return Err(ParseError::BadFuncTypeMarker(marker));
            }
            let param_count = r.uleb()? as usize;
            let params = r.take(param_count)?.to_vec();
            let result_count = r.uleb()? as usize;
            let results = r.take(result_count)?.to_vec();
            module.types.push(FuncType { params, results });
        }
    }

    if let Some(payload) = sections.get(&SECTION_IMPORT) {
        let mut r = Reader::new(payload);
        let count = r.uleb()?;
        for _ in 0..count {
            r.name()?; // module
            r.name()?; // field
            let kind = r.byte()?;
            match kind {
                KIND_FUNCTION => {
                    r.uleb()?; // type index
                    module.func_imports += 1;
                }
                KIND_TABLE => {
                    r.byte()?; // reftype
                    r.limits()?;
                }
                KIND_MEMORY => {
                    r.limits()?;
                }
                KIND_GLOBAL => {
                    r.byte()?; // valtype
                    r.byte()?; // mutability
                }
                other => return Err(ParseError::BadImportKind(other)),
            }
        }
    }

    if let Some(payload) = sections.get(&SECTION_FUNCTION) {
        let mut r = Reader::new(payload);
        let count = r.uleb()?;
        for _ in 0..count {
            module.functions.push(r.uleb()?);
        }
    }

    if let Some(payload) = sections.get(&SECTION_EXPORT) {
        let mut r = Reader::new(payload);
        let count = r.uleb()?;
        for _ in 0..count {
            let name = r.name()?;
            let kind = r.byte()?;
            let index = r.uleb()?;
            module.exports.push(Export { name, kind, index });
        }
    }

    Ok(module)
}
