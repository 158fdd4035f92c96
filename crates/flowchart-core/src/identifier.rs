//! Element identifiers backed by a string interner.
//!
//! Every node and relation carries an [`Id`]. Ids are compared and hashed
//! constantly during graph derivation and layout, so they are interned once
//! and passed around as a `Copy` symbol.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
};

use serde::{Serialize, Serializer};
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Global string interner for identifier storage.
///
/// Interned strings are never removed; only the mapping is shared, so
/// independent engines never observe each other's elements through it.
static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

fn interner() -> &'static Mutex<DefaultStringInterner> {
    INTERNER.get_or_init(|| Mutex::new(DefaultStringInterner::new()))
}

/// Interned element identifier.
///
/// # Examples
///
/// ```
/// use flowchart_core::identifier::Id;
///
/// let start = Id::new("start");
/// assert_eq!(start, "start");
/// assert_eq!(start.to_string(), "start");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(DefaultSymbol);

impl Id {
    /// Creates an `Id` from &str.
    ///
    /// # Arguments
    ///
    /// * `name` - The string representation of the identifier
    pub fn new(name: &str) -> Self {
        let mut interner = interner()
            .lock()
            .expect("Failed to acquire interner lock");
        Self(interner.get_or_intern(name))
    }

    /// Returns true if the textual form of this id contains `ch`.
    pub fn contains(&self, ch: char) -> bool {
        self.to_string().contains(ch)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interner = interner()
            .lock()
            .expect("Failed to acquire interner lock");
        let str_value = interner
            .resolve(self.0)
            .expect("Symbol should exist in interner");
        f.write_str(str_value)
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        let interner = interner()
            .lock()
            .expect("Failed to acquire interner lock");
        interner.resolve(self.0) == Some(*other)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
