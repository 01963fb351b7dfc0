//! Lazy candidate generation and fixed-size batching.
//!
//! Search spaces get large quickly (36 characters up to length 4 is already
//! 1.7 million usernames), so nothing here materializes the whole sequence.
use crate::{AttackError, CandidateSource};

use tracing::{debug, warn};

use std::io::BufRead;
use std::path::Path;

pub type Candidates = Box<dyn Iterator<Item = String> + Send>;

/// Build the candidate sequence described by the configuration.
pub fn generate(source: &CandidateSource) -> Result<Candidates, AttackError> {
    let candidates: Candidates = match source {
        CandidateSource::Exhaustive {
            alphabet,
            min_len,
            max_len,
        } => Box::new(ExhaustiveCandidates::new(alphabet, *min_len, *max_len)),
        CandidateSource::Wordlist { path } => Box::new(WordlistCandidates::open(path)?),
        CandidateSource::Extend { prefix, alphabet } => {
            Box::new(PrefixExtension::new(prefix, alphabet))
        }
    };
    Ok(candidates)
}

/// Every string over an alphabet with a length in `[min_len, max_len]`,
/// shortest first and in alphabet order within a length.
#[derive(Debug, Clone)]
pub struct ExhaustiveCandidates {
    alphabet: Vec<char>,
    /// Alphabet index of each character of the next candidate.
    indices: Vec<usize>,
    max_len: usize,
    done: bool,
}

impl ExhaustiveCandidates {
    pub fn new(alphabet: &str, min_len: usize, max_len: usize) -> Self {
        let alphabet: Vec<char> = alphabet.chars().collect();
        let done = alphabet.is_empty() || min_len > max_len;
        Self {
            alphabet,
            indices: vec![0; min_len],
            max_len,
            done,
        }
    }

    /// Number of candidates the full sequence holds, `None` if it overflows.
    pub fn total(alphabet_len: usize, min_len: usize, max_len: usize) -> Option<u128> {
        let base = alphabet_len as u128;
        (min_len..=max_len).try_fold(0u128, |total, len| {
            let count = base.checked_pow(u32::try_from(len).ok()?)?;
            total.checked_add(count)
        })
    }

    fn advance(&mut self) {
        // Odometer increment, rightmost position fastest.
        for idx in self.indices.iter_mut().rev() {
            *idx += 1;
            if *idx < self.alphabet.len() {
                return;
            }
            *idx = 0;
        }
        // Every position wrapped, move on to the next length.
        if self.indices.len() >= self.max_len {
            self.done = true;
        } else {
            self.indices = vec![0; self.indices.len() + 1];
        }
    }
}

impl Iterator for ExhaustiveCandidates {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let candidate: String = self.indices.iter().map(|&i| self.alphabet[i]).collect();
        if self.indices.is_empty() {
            // The zero-length candidate is its own odometer wrap.
            if self.max_len == 0 {
                self.done = true;
            } else {
                self.indices = vec![0; 1];
            }
        } else {
            self.advance();
        }
        Some(candidate)
    }
}

/// Candidates read line by line from a wordlist, in file order.
pub struct WordlistCandidates<R> {
    reader: R,
    line_number: usize,
    buf: Vec<u8>,
}

impl WordlistCandidates<std::io::BufReader<std::fs::File>> {
    pub fn open(path: &Path) -> Result<Self, AttackError> {
        let file = std::fs::File::open(path).map_err(|e| AttackError::read_file(path, e))?;
        Ok(Self::from_reader(std::io::BufReader::new(file)))
    }
}

impl<R: BufRead> WordlistCandidates<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for WordlistCandidates<R> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(line = self.line_number + 1, "wordlist read failed, stopping: {e}");
                    return None;
                }
            }
            self.line_number += 1;

            let line = strip_line_ending(&self.buf);
            if line.is_empty() {
                debug!(line = self.line_number, "skipping empty wordlist entry");
                continue;
            }
            match std::str::from_utf8(line) {
                Ok(candidate) => return Some(candidate.to_string()),
                Err(e) => warn!(line = self.line_number, "skipping wordlist entry: {e}"),
            }
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// One character appended to a known-good prefix, for each character of the
/// alphabet.
#[derive(Debug, Clone)]
pub struct PrefixExtension {
    prefix: String,
    alphabet: std::vec::IntoIter<char>,
}

impl PrefixExtension {
    pub fn new(prefix: &str, alphabet: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            alphabet: alphabet.chars().collect::<Vec<_>>().into_iter(),
        }
    }
}

impl Iterator for PrefixExtension {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let c = self.alphabet.next()?;
        let mut candidate = String::with_capacity(self.prefix.len() + c.len_utf8());
        candidate.push_str(&self.prefix);
        candidate.push(c);
        Some(candidate)
    }
}

/// Split `iter` into consecutive batches of at most `size` items.
pub fn batches<I: IntoIterator>(iter: I, size: usize) -> Batches<I::IntoIter> {
    assert!(size > 0, "batch size must be non-zero");
    Batches {
        iter: iter.into_iter(),
        size,
    }
}

pub struct Batches<I> {
    iter: I,
    size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<_> = self.iter.by_ref().take(self.size).collect();
        (!batch.is_empty()).then_some(batch)
    }
}
