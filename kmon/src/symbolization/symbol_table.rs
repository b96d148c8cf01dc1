//! Function table resolver
//!
//! Resolution mirrors how a kernel resolves against its own stab table: find
//! the function whose range contains the address, then the last line entry at
//! or below the address within that function.

use super::{DebugInfoResolver, EipDebugInfo};

/// One function of the inspected kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    /// Symbol name, optionally with a `:type` suffix that is not displayed
    pub name: String,
    /// Entry address
    pub addr: u32,
    /// Size in bytes; without it the function extends to the next symbol
    pub size: Option<u32>,
    /// Source file the function is defined in
    pub file: String,
    /// `(address, line)` pairs, in any order
    pub lines: Vec<(u32, u32)>,
}

impl FunctionSymbol {
    fn contains(&self, eip: u32) -> bool {
        let end = |size: u32| u64::from(self.addr) + u64::from(size);
        eip >= self.addr && self.size.map_or(true, |size| u64::from(eip) < end(size))
    }

    fn line_for(&self, eip: u32) -> u32 {
        let idx = self.lines.partition_point(|&(addr, _)| addr <= eip);
        if idx == 0 {
            0
        } else {
            self.lines[idx - 1].1
        }
    }
}

/// Address-sorted function table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    functions: Vec<FunctionSymbol>,
}

impl SymbolTable {
    #[must_use]
    pub fn new(mut functions: Vec<FunctionSymbol>) -> Self {
        functions.sort_by_key(|f| f.addr);
        for function in &mut functions {
            function.lines.sort_unstable();
        }
        Self { functions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Function containing `eip`, if any
    #[must_use]
    pub fn function_at(&self, eip: u32) -> Option<&FunctionSymbol> {
        let idx = self.functions.partition_point(|f| f.addr <= eip);
        let function = self.functions.get(idx.checked_sub(1)?)?;
        function.contains(eip).then_some(function)
    }
}

impl DebugInfoResolver for SymbolTable {
    fn resolve(&self, eip: u32) -> EipDebugInfo {
        let Some(function) = self.function_at(eip) else {
            return EipDebugInfo::unknown(eip);
        };

        EipDebugInfo {
            file: function.file.clone(),
            line: function.line_for(eip),
            fn_name: function.name.clone(),
            fn_namelen: function.name.find(':').unwrap_or(function.name.len()),
            fn_addr: function.addr,
        }
    }
}
