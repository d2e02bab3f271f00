use crate::{demangle, parse_symbol_listing, Error, Result, Symbol, SymbolTable};
use goblin::elf::Elf;
use log::debug;
use memmap2::Mmap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::process::Command;

/// Where the (address, demangled name) table comes from.
pub trait SymbolSource {
    fn load(&self) -> Result<SymbolTable>;
}

/// An empty dump (e.g. nm over a stripped library) is a malformed dump.
/// `context` is reported as the offending input.
fn require_symbols(symbols: Vec<Symbol>, context: &str) -> Result<SymbolTable> {
    if symbols.is_empty() {
        return Err(Error::parse("Extract error: no '\\n'", context));
    }
    Ok(SymbolTable::new(symbols))
}

/// Runs `nm -a` over the library and demangles the C++ symbols it lists.
pub struct NmSymbolSource {
    pub nm: PathBuf,
    pub library: PathBuf,
}

impl SymbolSource for NmSymbolSource {
    fn load(&self) -> Result<SymbolTable> {
        let output = Command::new(&self.nm)
            .arg("-a")
            .arg(&self.library)
            .output()
            .map_err(|source| Error::ToolSpawn { tool: self.nm.clone(), source })?;
        if !output.status.success() {
            return Err(Error::ToolFailed {
                tool: self.nm.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mangled: String = stdout
            .lines()
            .filter(|line| line.contains("_Z"))
            .flat_map(|line| [line, "\n"])
            .collect();
        let symbols = parse_symbol_listing(&mangled)?
            .into_iter()
            .map(|sym| Symbol { address: sym.address, name: demangle(&sym.name) })
            .collect::<Vec<_>>();
        debug!("nm listed {} C++ symbols in {}", symbols.len(), self.library.display());
        let context = if stdout.trim().is_empty() {
            String::from_utf8_lossy(&output.stderr).trim().to_string()
        } else {
            stdout.trim().to_string()
        };
        require_symbols(symbols, &context)
    }
}

/// Reads the symbol tables straight out of the ELF file, no toolchain needed.
pub struct ElfSymbolSource {
    pub library: PathBuf,
}

impl SymbolSource for ElfSymbolSource {
    fn load(&self) -> Result<SymbolTable> {
        let file = File::open(&self.library).map_err(|e| Error::io(&self.library, e))?;
        let buffer = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(&self.library, e))?;
        let elf = Elf::parse(&buffer)
            .map_err(|source| Error::Elf { path: self.library.clone(), source })?;

        let mut symbols = Vec::new();
        let tables = [(&elf.dynsyms, &elf.dynstrtab), (&elf.syms, &elf.strtab)];
        for (syms, strtab) in tables {
            for sym in syms.iter() {
                // undefined symbols have no address in this library
                if sym.st_shndx == 0 {
                    continue;
                }
                if let Some(name) = strtab.get_at(sym.st_name) {
                    if name.contains("_Z") {
                        symbols.push(Symbol::new(sym.st_value, demangle(name)));
                    }
                }
            }
        }
        debug!("read {} C++ symbols from {}", symbols.len(), self.library.display());
        require_symbols(symbols, &self.library.to_string_lossy())
    }
}

/// A listing produced ahead of time, already demangled.
pub struct ListingSymbolSource {
    pub path: PathBuf,
}

impl SymbolSource for ListingSymbolSource {
    fn load(&self) -> Result<SymbolTable> {
        let listing = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        require_symbols(parse_symbol_listing(&listing)?, &listing)
    }
}
