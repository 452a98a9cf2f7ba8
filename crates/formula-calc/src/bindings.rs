use crate::error::CalcError;
use ahash::AHashMap;
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Case-insensitive variable map used for one evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings<T> {
    values: AHashMap<String, T>,
}

/// Lower-case `name`, borrowing when it already is.
pub(crate) fn fold_case(name: &str) -> Cow<'_, str> {
    if name.chars().any(char::is_uppercase) {
        Cow::Owned(name.to_lowercase())
    } else {
        Cow::Borrowed(name)
    }
}

impl<T: Copy> Bindings<T> {
    pub fn new() -> Self {
        Self {
            values: AHashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: AHashMap::with_capacity(capacity),
        }
    }

    /// Binds `name` (case-folded). A later insert of the same folded name wins.
    pub fn insert(&mut self, name: &str, value: T) -> Option<T> {
        self.values.insert(fold_case(name).into_owned(), value)
    }

    /// Binds a name that is already lower-case.
    pub(crate) fn insert_folded(&mut self, name: String, value: T) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.values.get(fold_case(name).as_ref()).copied()
    }

    /// Lookup for a name folded at build time.
    #[inline]
    pub(crate) fn get_folded(&self, name: &str) -> Option<T> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(fold_case(name).as_ref())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, T)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// Fails with [`CalcError::DuplicateVariable`] when two keys fold to the same name; which one
/// would win depends on the map's iteration order.
impl<T: Copy> TryFrom<&HashMap<String, T>> for Bindings<T> {
    type Error = CalcError;

    fn try_from(variables: &HashMap<String, T>) -> Result<Self, Self::Error> {
        let mut values = AHashMap::with_capacity(variables.len());
        for (name, value) in variables {
            match values.entry(fold_case(name).into_owned()) {
                Entry::Vacant(slot) => {
                    slot.insert(*value);
                }
                Entry::Occupied(slot) => {
                    return Err(CalcError::DuplicateVariable {
                        name: slot.key().clone(),
                    });
                }
            }
        }
        Ok(Self { values })
    }
}

impl<'a, T: Copy> FromIterator<(&'a str, T)> for Bindings<T> {
    fn from_iter<I: IntoIterator<Item = (&'a str, T)>>(iter: I) -> Self {
        let mut bindings = Self::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}
