//! File formats read and written between the compile stages.
//!
//! Text formats (`.p*`, `.b*`, `.hsz`, `.prt`, `.pts`) go through buffered
//! `std::fmt` writers and a whitespace token reader; binary formats (`.bsp`,
//! `.pln`, `.inc`) are little-endian and go through `byteorder`.

pub mod bspfile;
pub mod entities;
pub mod hullsize;
pub mod planefile;
pub mod pointfile;
pub mod polyfile;
pub mod portalfile;
pub mod transfer_cache;

use crate::errors::{CompileError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// `path` with its extension replaced by `ext` (no leading dot).
pub fn with_extension(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}

pub fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| CompileError::io(path, e))
}

pub fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| CompileError::io(path, e))
}

pub fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| CompileError::io(path, e))
}

/// Whitespace-separated token reader over a text file, used by the
/// intermediate text formats.
pub struct Tokens<'a> {
    path: &'a Path,
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    pub fn new(path: &'a Path, text: &'a str) -> Self {
        Tokens {
            path,
            iter: text.split_whitespace(),
        }
    }

    /// Next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<&'a str> {
        self.iter.next()
    }

    /// Next token parsed as `T`; running out of input is a corrupt file.
    pub fn parse<T: FromStr>(&mut self) -> Result<T> {
        let token = self
            .iter
            .next()
            .ok_or_else(|| CompileError::corrupt(self.path, "unexpected end of file"))?;
        self.parse_token(token)
    }

    pub fn parse_token<T: FromStr>(&self, token: &str) -> Result<T> {
        token
            .parse()
            .map_err(|_| CompileError::corrupt(self.path, format!("bad number '{token}'")))
    }

    /// Next token, which must equal `expected`.
    pub fn expect(&mut self, expected: &str) -> Result<()> {
        match self.iter.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(CompileError::corrupt(
                self.path,
                format!("expected '{expected}', found '{t}'"),
            )),
            None => Err(CompileError::corrupt(
                self.path,
                format!("expected '{expected}', found end of file"),
            )),
        }
    }
}
