//! Conditions that gate spawn entries.
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::EVENT_NONE;

/// A condition declared on a group entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Predicate {
    Event(String),
    Season(String),
    Flag(String),
    /// Holds when any member holds; a listed `season` or `flag` gate.
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    /// Predicates carried by an entry object; `event: "none"` is no predicate.
    pub(crate) fn from_entry(entry: &Map<String, Value>) -> Vec<Self> {
        let mut predicates = Vec::new();
        if let Some(event) = entry.get("event").and_then(Value::as_str)
            && !event.eq_ignore_ascii_case(EVENT_NONE)
        {
            predicates.push(Self::Event(event.to_string()));
        }
        predicates.extend(any_of(entry.get("season"), Self::Season));
        predicates.extend(any_of(entry.get("flag"), Self::Flag));
        predicates
    }

    /// The gated name; an `AnyOf` answers with its first member.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Event(name) | Self::Season(name) | Self::Flag(name) => name,
            Self::AnyOf(members) => members.first().map_or("", Self::name),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(name) => write!(f, "event:{name}"),
            Self::Season(name) => write!(f, "season:{name}"),
            Self::Flag(name) => write!(f, "flag:{name}"),
            Self::AnyOf(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

fn any_of(value: Option<&Value>, leaf: fn(String) -> Predicate) -> Option<Predicate> {
    let mut members: Vec<Predicate> = match value {
        Some(Value::String(single)) => vec![leaf(single.clone())],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|name| leaf(name.to_string()))
            .collect(),
        _ => Vec::new(),
    };
    match members.len() {
        0 => None,
        1 => members.pop(),
        _ => Some(Predicate::AnyOf(members)),
    }
}

type Resolver<'a> = Box<dyn Fn(&Predicate) -> Option<bool> + Send + Sync + 'a>;

/// What the caller knows about the world a spawn is evaluated in.
///
/// Predicates the context cannot answer exclude their entry.
#[derive(Default)]
pub struct SpawnContext<'a> {
    events: BTreeMap<String, bool>,
    flags: BTreeMap<String, bool>,
    season: Option<String>,
    resolver: Option<Resolver<'a>>,
}

impl<'a> SpawnContext<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event(mut self, name: impl Into<String>, active: bool) -> Self {
        self.events.insert(name.into().to_ascii_lowercase(), active);
        self
    }

    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, set: bool) -> Self {
        self.flags.insert(name.into(), set);
        self
    }

    #[must_use]
    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into().to_ascii_lowercase());
        self
    }

    /// Consulted for predicates the explicit settings leave open.
    #[must_use]
    pub fn with_resolver(
        mut self,
        resolver: impl Fn(&Predicate) -> Option<bool> + Send + Sync + 'a,
    ) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// `Some(true)` or `Some(false)` when decided, `None` when nothing answers.
    ///
    /// An `AnyOf` is true when a member is true and false only when every
    /// member is false.
    #[must_use]
    pub fn resolve(&self, predicate: &Predicate) -> Option<bool> {
        let known = match predicate {
            Predicate::AnyOf(members) => {
                let mut decided = true;
                for member in members {
                    match self.resolve(member) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => decided = false,
                    }
                }
                return decided.then_some(false);
            }
            Predicate::Event(name) => self.events.get(&name.to_ascii_lowercase()).copied(),
            Predicate::Season(name) => self
                .season
                .as_deref()
                .map(|season| season.eq_ignore_ascii_case(name)),
            Predicate::Flag(name) => self.flags.get(name).copied(),
        };
        known.or_else(|| self.resolver.as_ref().and_then(|resolve| resolve(predicate)))
    }

    /// True when every predicate resolves to `true`.
    #[must_use]
    pub fn admits(&self, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|predicate| self.resolve(predicate) == Some(true))
    }
}

impl fmt::Debug for SpawnContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnContext")
            .field("events", &self.events)
            .field("flags", &self.flags)
            .field("season", &self.season)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}
