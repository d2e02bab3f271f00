//! Resolve raw vtable pointers recorded by TaskTracer to demangled C++ names.
//!
//! A [`SymbolTable`] is loaded once from a [`SymbolSource`] (nm, the ELF file
//! itself, or a pre-generated listing); each pointer is then turned into a
//! library-relative offset using the process's memory map and looked up with
//! a floor search.

mod error;
mod maps;
mod source;

pub use error::{Error, Result};
pub use maps::find_library_base;
pub use source::{ElfSymbolSource, ListingSymbolSource, NmSymbolSource, SymbolSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub address: u64,
    pub name: String,
}

impl Symbol {
    pub fn new(address: u64, name: impl Into<String>) -> Self {
        Symbol { address, name: name.into() }
    }
}

/// Symbols sorted by their start address.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new(mut symbols: Vec<Symbol>) -> Self {
        // stable, so symbols aliasing the same address keep the order they were listed in
        symbols.sort_by_key(|sym| sym.address);
        SymbolTable { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Name of the symbol with the largest start address <= `offset`.
    ///
    /// There is no size check: the gap after a symbol is attributed to it.
    /// Offsets below the first symbol resolve to nothing.
    pub fn lookup(&self, offset: u64) -> Option<&str> {
        let idx = match self.symbols.binary_search_by_key(&offset, |sym| sym.address) {
            Ok(exact) => exact,
            Err(insert_pos) => {
                if insert_pos == 0 {
                    return None;
                }
                insert_pos - 1
            }
        };
        Some(self.symbols[idx].name.as_str())
    }

    /// Resolve a process address given the load address of the library.
    pub fn resolve(&self, vptr: u64, library_base: u64) -> Option<&str> {
        let offset = vptr.checked_sub(library_base)?;
        self.lookup(offset)
    }
}

/// Demangle a C++ symbol name, returning it unchanged if it doesn't demangle.
pub fn demangle(name: &str) -> String {
    match cpp_demangle::Symbol::new(name) {
        Ok(sym) => sym.to_string(),
        Err(_) => name.to_string(),
    }
}

/// Parse `<hex address> <type> <name>` lines as printed by nm.
///
/// Undefined symbols have a blank address column and are skipped, as are
/// empty lines. The name is taken verbatim, so demangled names containing
/// spaces survive.
pub fn parse_symbol_listing(listing: &str) -> Result<Vec<Symbol>> {
    let mut symbols = Vec::new();
    for line in listing.lines() {
        if line.is_empty() {
            continue;
        }
        if line.matches(' ').count() < 2 {
            return Err(Error::parse("Extract error: not enough ' '", line));
        }
        let mut tokens = line.splitn(3, ' ');
        let (addr, _kind, name) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(addr), Some(kind), Some(name)) => (addr, kind, name),
            _ => return Err(Error::parse("Extract error: not enough ' '", line)),
        };
        if addr.is_empty() {
            continue;
        }
        let address = u64::from_str_radix(addr, 16)
            .map_err(|_| Error::parse(format!("Extract error: bad address '{}'", addr), line))?;
        symbols.push(Symbol::new(address, name.trim()));
    }
    Ok(symbols)
}
