//! Keyed archives of sky maps, masks and spectra
//!
//! Entries are keyed by `(name, frequency, resolution, tag)`. Frequency and
//! tag are optional and render as `nan` when absent. For maps the resolution
//! is the HEALPix `Nside` and the data must hold `12 Nside²` pixels; for
//! spectra it is the number of angular modes.
//!
//! Masking convention: pixel value 0 is fully masked, 1 fully unmasked.

use std::collections::BTreeMap;
use std::fmt;

/// Error types for observable archives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    #[error("Entry {key} expects {expected} values, got {actual}")]
    LengthMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
    #[error("Operation requires a {expected:?} archive, got {actual:?}")]
    KindMismatch {
        expected: ArchiveKind,
        actual: ArchiveKind,
    },
}

/// What an archive stores, which fixes the expected data length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// Measured sky maps (HEALPix pixels)
    Measurements,
    /// Mask maps (HEALPix pixels)
    Masks,
    /// Power spectra (one value per angular mode)
    Spectra,
}

impl ArchiveKind {
    /// Expected number of values for an entry at `resolution`
    pub fn expected_len(&self, resolution: usize) -> usize {
        match self {
            ArchiveKind::Measurements | ArchiveKind::Masks => 12 * resolution * resolution,
            ArchiveKind::Spectra => resolution,
        }
    }
}

/// Key of an archived observable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableKey {
    pub name: String,
    /// Frequency label, `None` for frequency-independent data
    pub frequency: Option<String>,
    /// HEALPix Nside for maps, mode count for spectra
    pub resolution: usize,
    /// Customised tag such as `I`, `Q`, `U`
    pub tag: Option<String>,
}

impl ObservableKey {
    pub fn new(
        name: impl Into<String>,
        frequency: Option<&str>,
        resolution: usize,
        tag: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            frequency: frequency.map(str::to_owned),
            resolution,
            tag: tag.map(str::to_owned),
        }
    }
}

impl fmt::Display for ObservableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.name,
            self.frequency.as_deref().unwrap_or("nan"),
            self.resolution,
            self.tag.as_deref().unwrap_or("nan")
        )
    }
}

/// In-memory archive of observables of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct ObservableArchive {
    kind: ArchiveKind,
    archive: BTreeMap<ObservableKey, Vec<f64>>,
}

impl ObservableArchive {
    pub fn new(kind: ArchiveKind) -> Self {
        Self {
            kind,
            archive: BTreeMap::new(),
        }
    }

    pub fn measurements() -> Self {
        Self::new(ArchiveKind::Measurements)
    }

    pub fn masks() -> Self {
        Self::new(ArchiveKind::Masks)
    }

    pub fn spectra() -> Self {
        Self::new(ArchiveKind::Spectra)
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Add or replace an entry after checking its length against the key
    pub fn append(&mut self, key: ObservableKey, data: Vec<f64>) -> Result<(), ArchiveError> {
        let expected = self.kind.expected_len(key.resolution);
        if data.len() != expected {
            return Err(ArchiveError::LengthMismatch {
                key: key.to_string(),
                expected,
                actual: data.len(),
            });
        }
        log::debug!("{:?} archive: append {}", self.kind, key);
        self.archive.insert(key, data);
        Ok(())
    }

    pub fn get(&self, key: &ObservableKey) -> Option<&[f64]> {
        self.archive.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObservableKey> {
        self.archive.keys()
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Multiply every measurement by the mask stored under the same key
    ///
    /// Measurements without a matching mask are left as they are.
    pub fn apply_mask(&mut self, masks: &ObservableArchive) -> Result<(), ArchiveError> {
        if self.kind != ArchiveKind::Measurements {
            return Err(ArchiveError::KindMismatch {
                expected: ArchiveKind::Measurements,
                actual: self.kind,
            });
        }
        if masks.kind != ArchiveKind::Masks {
            return Err(ArchiveError::KindMismatch {
                expected: ArchiveKind::Masks,
                actual: masks.kind,
            });
        }

        for (key, mask) in &masks.archive {
            if let Some(data) = self.archive.get_mut(key) {
                log::debug!("applying mask {}", key);
                data.iter_mut().zip(mask).for_each(|(x, m)| *x *= m);
            }
        }
        Ok(())
    }
}
