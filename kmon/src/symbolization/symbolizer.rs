use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianRcSlice, RunTimeEndian};
use log::{debug, info};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use super::{DebugInfoResolver, EipDebugInfo, UNKNOWN};
use crate::machine::KernelLayout;

/// Symbolizer for resolving kernel return addresses through an ELF image
///
/// Source locations come from the DWARF line tables; function names and entry
/// addresses come from the ELF symbol table, which is what a frame offset has
/// to be measured against. Includes a cache to avoid re-resolving the same
/// addresses, since deep recursion repeats return addresses.
pub struct Symbolizer {
    ctx: Context<EndianRcSlice<RunTimeEndian>>,
    /// Text symbols sorted by address
    functions: Vec<ElfFunction>,
    /// Layout symbols (`_start`, `entry`, `etext`, ...) by name
    layout_symbols: HashMap<String, u64>,
    /// Cache of resolved frames by address
    cache: RefCell<HashMap<u64, ResolvedFrame>>,
}

#[derive(Debug, Clone)]
struct ElfFunction {
    name: String,
    addr: u64,
    size: u64,
}

impl Symbolizer {
    /// Create a new symbolizer for the given kernel image
    ///
    /// # Errors
    /// Returns an error if the image cannot be read or parsed, or if its DWARF
    /// debug info is malformed
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).context("Failed to read kernel image")?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse kernel image")?;

        // Load DWARF debug info
        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        let mut functions = Vec::new();
        let mut layout_symbols = HashMap::new();
        for symbol in obj_file.symbols() {
            let Ok(name) = symbol.name() else { continue };
            if name.is_empty() {
                continue;
            }
            if KernelLayout::SYMBOLS.contains(&name) {
                layout_symbols.insert(name.to_string(), symbol.address());
            }
            if symbol.kind() == SymbolKind::Text && symbol.address() != 0 {
                functions.push(ElfFunction {
                    name: Self::demangle_symbol(name),
                    addr: symbol.address(),
                    size: symbol.size(),
                });
            }
        }
        functions.sort_by_key(|f| f.addr);

        info!(
            "Loaded kernel image with {} function symbols, {} layout symbols",
            functions.len(),
            layout_symbols.len()
        );

        Ok(Self { ctx, functions, layout_symbols, cache: RefCell::new(HashMap::new()) })
    }

    /// Text symbol containing `addr` as `(name, entry address)`
    #[must_use]
    pub fn function_at(&self, addr: u64) -> Option<(&str, u64)> {
        let idx = self.functions.partition_point(|f| f.addr <= addr);
        let function = self.functions.get(idx.checked_sub(1)?)?;
        if function.size != 0 && addr >= function.addr + function.size {
            return None;
        }
        Some((function.name.as_str(), function.addr))
    }

    /// Entry addresses of all text symbols, ascending
    pub fn function_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.functions.iter().map(|f| f.addr)
    }

    /// Layout symbols of the image, if it defines all of them in 32 bits
    #[must_use]
    pub fn kernel_layout(&self) -> Option<KernelLayout> {
        KernelLayout::from_lookup(|name| {
            self.layout_symbols.get(name).and_then(|&addr| u32::try_from(addr).ok())
        })
    }

    /// Resolve an instruction pointer to source location information
    ///
    /// Uses a cache to avoid re-resolving the same address multiple times.
    pub fn resolve_address(&self, addr: u64) -> ResolvedFrame {
        if let Some(cached) = self.cache.borrow().get(&addr) {
            return cached.clone();
        }

        let mut file = None;
        let mut line = None;
        let mut dwarf_function = None;

        if let Ok(mut frame_iter) = self.ctx.find_frames(addr).skip_all_loads() {
            while let Ok(Some(frame)) = frame_iter.next() {
                // Innermost frame with a location wins; the outermost frame is
                // the function that actually owns the code
                if file.is_none() {
                    if let Some(loc) = frame.location {
                        file = loc.file.map(std::string::ToString::to_string);
                        line = loc.line;
                    }
                }
                if let Some(name) =
                    frame.function.and_then(|f| f.demangle().ok().map(|s| s.to_string()))
                {
                    dwarf_function = Some(name);
                }
            }
        }

        let (function, fn_addr) = match self.function_at(addr) {
            Some((name, entry)) => (Some(name.to_string()), Some(entry)),
            None => (dwarf_function, None),
        };

        let resolved = ResolvedFrame { addr, file, line, function, fn_addr };
        debug!("Resolved {addr:#x} -> {resolved:?}");

        self.cache.borrow_mut().insert(addr, resolved.clone());

        resolved
    }

    /// Demangle a Rust symbol name
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}

impl DebugInfoResolver for Symbolizer {
    fn resolve(&self, eip: u32) -> EipDebugInfo {
        let resolved = self.resolve_address(u64::from(eip));
        let fn_name = resolved.function.unwrap_or_else(|| UNKNOWN.to_string());

        EipDebugInfo {
            file: resolved.file.unwrap_or_else(|| UNKNOWN.to_string()),
            line: resolved.line.unwrap_or(0),
            fn_namelen: fn_name.len(),
            fn_name,
            fn_addr: resolved.fn_addr.and_then(|a| u32::try_from(a).ok()).unwrap_or(eip),
        }
    }
}

/// A resolved return address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub addr: u64,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    /// Entry address of `function` when it came from the symbol table
    pub fn_addr: Option<u64>,
}
