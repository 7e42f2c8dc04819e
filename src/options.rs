//! Knobs for the table readers and writers.

use crate::ProbeChain;

/// Configuration for reading a partition table.
///
/// ```
/// use gptrescue::{ProbeChain, ReadOptions};
///
/// let options = ReadOptions::new().verbose(true).probes(ProbeChain::empty());
/// assert!(options.verbose);
/// ```
#[derive(Debug, Default)]
pub struct ReadOptions {
    /// Report every header field and every probe outcome.
    pub verbose: bool,
    /// Content probes run on data partitions.
    pub probes: ProbeChain,
}

impl ReadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn probes(mut self, probes: ProbeChain) -> Self {
        self.probes = probes;
        self
    }
}

/// Configuration for writing a partition table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// When set, writers succeed without touching the disk.
    pub read_only: bool,
    /// Cylinder alignment request. Writers keep records where they are and only log it.
    pub align: bool,
    pub verbose: bool,
}

impl WriteOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn align(mut self, align: bool) -> Self {
        self.align = align;
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
