//! Token lookup used by the extension opcodes.
//!
//! Extension commands carry token indices instead of raw pointers. An index is first turned
//! into a name through the owning package's token list, and the name is then looked up or
//! called. The owner is always passed in by the interpreter.

use std::collections::BTreeMap;
use std::fmt;

use crate::bytecode::format::SegmentedAddress;
use crate::overrides::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValue {
    Integer(i64),
    Address(SegmentedAddress),
}

impl TokenValue {
    pub fn as_address(self) -> Option<SegmentedAddress> {
        match self {
            TokenValue::Address(address) => Some(address),
            TokenValue::Integer(_) => None,
        }
    }

    pub fn as_integer(self) -> Option<i64> {
        match self {
            TokenValue::Integer(value) => Some(value),
            TokenValue::Address(_) => None,
        }
    }
}

pub trait TokenService {
    /// Name of token `index` in the token list of `owner` (`None` is the base content).
    fn resolve(&self, owner: Option<OwnerId>, index: u32) -> Option<String>;
    fn lookup(&self, owner: Option<OwnerId>, name: &str) -> Option<TokenValue>;
    /// Invokes a named script function; `None` when no such function exists.
    fn call(&mut self, owner: Option<OwnerId>, name: &str, arg: i16, register: i32) -> Option<i32>;
}

pub type TokenFn = Box<dyn FnMut(i16, i32) -> i32>;

#[derive(Default)]
struct OwnerTokens {
    names: Vec<String>,
    values: BTreeMap<String, TokenValue>,
    functions: BTreeMap<String, TokenFn>,
}

/// Default [`TokenService`]: per-owner token lists with fallback to base content values.
#[derive(Default)]
pub struct TokenTable {
    owners: BTreeMap<Option<OwnerId>, OwnerTokens>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `name` to the token list of `owner`, returning its index.
    pub fn add_token(&mut self, owner: Option<OwnerId>, name: impl Into<String>) -> u32 {
        let tokens = self.owners.entry(owner).or_default();
        tokens.names.push(name.into());
        (tokens.names.len() - 1) as u32
    }

    pub fn define_value(
        &mut self,
        owner: Option<OwnerId>,
        name: impl Into<String>,
        value: TokenValue,
    ) {
        self.owners
            .entry(owner)
            .or_default()
            .values
            .insert(name.into(), value);
    }

    pub fn define_function<F>(
        &mut self,
        owner: Option<OwnerId>,
        name: impl Into<String>,
        function: F,
    )
    where
        F: FnMut(i16, i32) -> i32 + 'static,
    {
        self.owners
            .entry(owner)
            .or_default()
            .functions
            .insert(name.into(), Box::new(function));
    }

    /// Drops everything registered for `owner`.
    pub fn remove_owner(&mut self, owner: OwnerId) -> bool {
        self.owners.remove(&Some(owner)).is_some()
    }
}

impl TokenService for TokenTable {
    fn resolve(&self, owner: Option<OwnerId>, index: u32) -> Option<String> {
        self.owners
            .get(&owner)?
            .names
            .get(index as usize)
            .cloned()
    }

    fn lookup(&self, owner: Option<OwnerId>, name: &str) -> Option<TokenValue> {
        self.owners
            .get(&owner)
            .and_then(|tokens| tokens.values.get(name))
            .or_else(|| self.owners.get(&None).and_then(|tokens| tokens.values.get(name)))
            .copied()
    }

    fn call(&mut self, owner: Option<OwnerId>, name: &str, arg: i16, register: i32) -> Option<i32> {
        if self
            .owners
            .get(&owner)
            .is_some_and(|tokens| tokens.functions.contains_key(name))
        {
            let function = self.owners.get_mut(&owner)?.functions.get_mut(name)?;
            return Some(function(arg, register));
        }
        let function = self.owners.get_mut(&None)?.functions.get_mut(name)?;
        Some(function(arg, register))
    }
}

impl fmt::Debug for TokenTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTable")
            .field("owners", &self.owners.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
