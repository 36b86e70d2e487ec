// Stem identities and fixed per-stem storage
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// One isolated part of a separated song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Stem {
    /// Every stem, in the order commands are fanned out
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other];

    /// The stem whose position is treated as the master clock
    pub const MASTER: Stem = Stem::Vocals;

    pub fn index(self) -> usize {
        match self {
            Stem::Vocals => 0,
            Stem::Drums => 1,
            Stem::Bass => 2,
            Stem::Other => 3,
        }
    }

    /// Lower-case name, also used as the media file stem
    pub fn name(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }

    /// Capitalised name for display
    pub fn label(self) -> &'static str {
        match self {
            Stem::Vocals => "Vocals",
            Stem::Drums => "Drums",
            Stem::Bass => "Bass",
            Stem::Other => "Other",
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStem(pub String);

impl fmt::Display for UnknownStem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown stem '{}' (expected vocals, drums, bass or other)", self.0)
    }
}

impl std::error::Error for UnknownStem {}

impl FromStr for Stem {
    type Err = UnknownStem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Stem::ALL
            .into_iter()
            .find(|stem| stem.name() == lower)
            .ok_or_else(|| UnknownStem(s.to_string()))
    }
}

/// Exactly one value per stem, iterated in `Stem::ALL` order
#[derive(Debug, Clone, PartialEq)]
pub struct StemMap<T> {
    values: [T; 4],
}

impl<T> StemMap<T> {
    pub fn from_fn<F: FnMut(Stem) -> T>(mut f: F) -> Self {
        Self {
            values: Stem::ALL.map(&mut f),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stem, &T)> {
        Stem::ALL.into_iter().zip(self.values.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Stem, &mut T)> {
        Stem::ALL.into_iter().zip(self.values.iter_mut())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.values.iter_mut()
    }

    pub fn map<U, F: FnMut(Stem, &T) -> U>(&self, mut f: F) -> StemMap<U> {
        StemMap::from_fn(|stem| f(stem, &self.values[stem.index()]))
    }
}

impl<T: Default> Default for StemMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Stem> for StemMap<T> {
    type Output = T;

    fn index(&self, stem: Stem) -> &T {
        &self.values[stem.index()]
    }
}

impl<T> IndexMut<Stem> for StemMap<T> {
    fn index_mut(&mut self, stem: Stem) -> &mut T {
        &mut self.values[stem.index()]
    }
}
