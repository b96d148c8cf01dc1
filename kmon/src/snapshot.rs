//! Machine snapshot loading
//!
//! A snapshot is a JSON description of a halted kernel. Addresses may be
//! written as JSON numbers or as strings with C-style base prefixes:
//!
//! ```json
//! {
//!   "registers": { "ebp": "0xf0108000" },
//!   "stack": { "bottom": "0xf0108000", "words": [0, "0xf0100a2b", 1] },
//!   "paging": { "phys_size": "0x400000", "pgdir": "0x1000" },
//!   "mappings": [ { "va": "0x1000", "pa": "0x5000", "perm": ["W"] } ],
//!   "symbols": [ { "name": "mon_backtrace", "addr": "0xf0100a00",
//!                  "file": "kern/monitor.c", "lines": [["0xf0100a20", 62]] } ]
//! }
//! ```
//!
//! Mappings are laid out as real page tables in the snapshot's physical
//! memory, so the inspector walks the same structures the kernel would.
//! `raw` entries are written afterwards and can plant arbitrary words, such as
//! entries without the present bit.

use kmon_common::{PushRegs, Trapframe, PGSIZE};
use log::{debug, info};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::domain::{Address, SnapshotError};
use crate::machine::{KernelLayout, Machine, MemoryRegion, PageTableBuilder, PhysMemory, PteFlags};
use crate::symbolization::{FunctionSymbol, SymbolTable, UNKNOWN};

const DEFAULT_PHYS_SIZE: u32 = 0x40_0000;
const DEFAULT_PGDIR: u32 = 0x1000;

/// A loaded snapshot: the machine state plus its symbol table
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub machine: Machine,
    pub symbols: SymbolTable,
}

impl Snapshot {
    /// Read and build a snapshot from a JSON file
    ///
    /// # Errors
    /// I/O and JSON errors, and any [`SnapshotError`] from building the page
    /// tables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        info!("Loading snapshot {}", path.display());
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Build a snapshot from JSON read from `reader`
    ///
    /// # Errors
    /// Same conditions as [`Snapshot::load`], minus opening the file
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SnapshotError> {
        serde_json::from_reader::<_, SnapshotSpec>(reader)?.build()
    }

    /// Build a snapshot from a JSON string
    ///
    /// # Errors
    /// Same conditions as [`Snapshot::from_reader`]
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str::<SnapshotSpec>(json)?.build()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotSpec {
    #[serde(default)]
    registers: RegistersSpec,
    trapframe: Option<TrapframeSpec>,
    stack: StackSpec,
    #[serde(default)]
    paging: PagingSpec,
    #[serde(default)]
    mappings: Vec<MappingSpec>,
    #[serde(default)]
    raw: Vec<RawSpec>,
    #[serde(default)]
    symbols: Vec<SymbolSpec>,
    kernel: Option<LayoutSpec>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RegistersSpec {
    #[serde(default)]
    ebp: Address,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct TrapframeSpec {
    edi: Address,
    esi: Address,
    ebp: Address,
    oesp: Address,
    ebx: Address,
    edx: Address,
    ecx: Address,
    eax: Address,
    es: u16,
    ds: u16,
    trapno: u32,
    err: u32,
    eip: Address,
    cs: u16,
    eflags: Address,
    esp: Address,
    ss: u16,
    cr2: Option<Address>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StackSpec {
    bottom: Address,
    #[serde(default)]
    words: Vec<Address>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct PagingSpec {
    phys_size: Option<Address>,
    pgdir: Option<Address>,
    table_pool: Option<Address>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingSpec {
    va: Address,
    pa: Address,
    #[serde(default)]
    perm: Vec<String>,
    #[serde(default)]
    large: bool,
    size: Option<Address>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpec {
    pa: Address,
    words: Vec<Address>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SymbolSpec {
    name: String,
    addr: Address,
    size: Option<u32>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    lines: Vec<(Address, u32)>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutSpec {
    start: Address,
    entry: Address,
    etext: Address,
    edata: Address,
    end: Address,
}

/// Parse a permission name as written in snapshots
fn parse_perm(name: &str) -> Result<PteFlags, SnapshotError> {
    Ok(match name {
        "P" => PteFlags::PRESENT,
        "W" => PteFlags::WRITABLE,
        "U" => PteFlags::USER,
        "PWT" => PteFlags::WRITE_THROUGH,
        "PCD" => PteFlags::CACHE_DISABLE,
        "A" => PteFlags::ACCESSED,
        "D" => PteFlags::DIRTY,
        "G" => PteFlags::GLOBAL,
        other => return Err(SnapshotError::UnknownPermission(other.to_string())),
    })
}

impl SnapshotSpec {
    fn build(self) -> Result<Snapshot, SnapshotError> {
        let stack = MemoryRegion::new(
            self.stack.bottom.into(),
            self.stack.words.into_iter().map(u32::from).collect(),
        )?;

        let pgdir = self.paging.pgdir.map_or(DEFAULT_PGDIR, u32::from);
        let table_pool = self.paging.table_pool.map_or(pgdir.saturating_add(PGSIZE), u32::from);
        let mut phys =
            PhysMemory::new(u64::from(self.paging.phys_size.map_or(DEFAULT_PHYS_SIZE, u32::from)))?;

        let mut builder = PageTableBuilder::new(&mut phys, pgdir, table_pool)?;
        for mapping in &self.mappings {
            mapping.apply(&mut builder)?;
        }
        for raw in &self.raw {
            let base = u64::from(u32::from(raw.pa));
            for (index, word) in raw.words.iter().enumerate() {
                let pa = u32::try_from(base + index as u64 * 4).map_err(|_| {
                    SnapshotError::OutsidePhysicalMemory { pa: raw.pa.into(), size: phys.size() }
                })?;
                phys.write_u32(pa, word.0)?;
            }
        }
        debug!("Applied {} mappings and {} raw writes", self.mappings.len(), self.raw.len());

        let (trapframe, cr2) = match self.trapframe {
            Some(spec) => {
                let cr2 = spec.cr2.map(u32::from);
                (Some(spec.into_trapframe()), cr2)
            }
            None => (None, None),
        };

        let layout = self.kernel.map(|k| KernelLayout {
            start: k.start.into(),
            entry: k.entry.into(),
            etext: k.etext.into(),
            edata: k.edata.into(),
            end: k.end.into(),
        });

        let symbols = SymbolTable::new(
            self.symbols
                .into_iter()
                .map(|s| FunctionSymbol {
                    name: s.name,
                    addr: s.addr.into(),
                    size: s.size,
                    file: s.file.unwrap_or_else(|| UNKNOWN.to_string()),
                    lines: s.lines.into_iter().map(|(addr, line)| (addr.into(), line)).collect(),
                })
                .collect(),
        );

        info!(
            "Snapshot: {} stack words at {:#010x}, {} symbols",
            stack.len_words(),
            stack.base(),
            symbols.len()
        );

        let machine =
            Machine { stack, phys, pgdir, ebp: self.registers.ebp.into(), trapframe, cr2, layout };
        Ok(Snapshot { machine, symbols })
    }
}

impl MappingSpec {
    fn apply(&self, builder: &mut PageTableBuilder<'_>) -> Result<(), SnapshotError> {
        let perm = self.perm.iter().try_fold(PteFlags::empty(), |acc, name| {
            Ok::<_, SnapshotError>(acc | parse_perm(name)?)
        })?;
        let (va, pa) = (u32::from(self.va), u32::from(self.pa));

        match (self.large, self.size) {
            (true, Some(_)) => Err(SnapshotError::SizedLargePage(va)),
            (true, None) => builder.map_large(va, pa, perm),
            (false, Some(size)) => builder.map_region(va, size.into(), pa, perm),
            (false, None) => builder.map_page(va, pa, perm),
        }
    }
}

impl TrapframeSpec {
    fn into_trapframe(self) -> Trapframe {
        Trapframe {
            tf_regs: PushRegs {
                reg_edi: self.edi.into(),
                reg_esi: self.esi.into(),
                reg_ebp: self.ebp.into(),
                reg_oesp: self.oesp.into(),
                reg_ebx: self.ebx.into(),
                reg_edx: self.edx.into(),
                reg_ecx: self.ecx.into(),
                reg_eax: self.eax.into(),
            },
            tf_es: self.es,
            tf_ds: self.ds,
            tf_trapno: self.trapno,
            tf_err: self.err,
            tf_eip: self.eip.into(),
            tf_cs: self.cs,
            tf_eflags: self.eflags.into(),
            tf_esp: self.esp.into(),
            tf_ss: self.ss,
            ..Trapframe::default()
        }
    }
}
