//! Attribute snapshots and the name-list helper they share.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DatastoreError, Result};
use crate::namespace;

/// Replay arguments following an option name.
pub type OptionArgs<'a> = &'a mut dyn Iterator<Item = String>;

/// A plain value record holding one entity's typed fields.
///
/// Equality is field by field and `clone` yields an independent value. The
/// replay hooks let an entity be written as `-option value ...` pairs and
/// rebuilt from them.
pub trait Snapshot: Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static {
    /// Returns a copy whose namespace-qualified references all point into
    /// `namespace`.
    fn with_namespace(&self, namespace: &str) -> Result<Self>;

    /// Replay options in emission order, each with its value tokens.
    fn to_options(&self) -> Vec<(&'static str, Vec<String>)>;

    /// Applies one replay option, pulling its value tokens from `args`.
    fn set_option(&mut self, option: &str, args: OptionArgs<'_>) -> Result<()>;
}

/// Pulls the next value token for `option`.
pub fn next_arg(option: &str, args: OptionArgs<'_>) -> Result<String> {
    args.next()
        .ok_or_else(|| DatastoreError::InvalidArgs(format!("{}: value is missing", option)))
}

/// Parses the next value token for `option`.
pub fn parse_arg<T: std::str::FromStr>(option: &str, args: OptionArgs<'_>) -> Result<T> {
    let raw = next_arg(option, args)?;
    raw.parse()
        .map_err(|_| DatastoreError::InvalidArgs(format!("{}: bad value = {}", option, raw)))
}

/// Ordered, duplicate-free list of fully-qualified entity names.
///
/// Two lists are equal when they hold the same names, regardless of order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameList(Vec<String>);

impl NameList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, name: &str) -> Result<()> {
        if self.contains(name) {
            return Err(DatastoreError::AlreadyExists(format!("name = {}", name)));
        }
        self.0.push(name.to_string());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        let pos = self
            .0
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DatastoreError::NotFound(format!("name = {}", name)))?;
        self.0.remove(pos);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy with every name moved into `namespace`.
    pub fn with_namespace(&self, ns: &str) -> Result<Self> {
        self.0
            .iter()
            .map(|name| namespace::replace_namespace(name, ns))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}

impl PartialEq for NameList {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|n| other.contains(n))
    }
}

impl Eq for NameList {}

impl<'a> IntoIterator for &'a NameList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
