//! Signal list filtering: type toggles, a changed-only switch and a search
//! box. A query starting with `/` is a case-insensitive regex.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::parsers::SignalType;
use crate::signals::{CatalogEntry, SignalCatalog};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SignalFilter {
    pub search: String,
    pub include_boolean: bool,
    pub include_integer: bool,
    pub include_text: bool,
    /// Hide signals whose value never changes
    pub only_changed: bool,
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            include_boolean: true,
            include_integer: true,
            include_text: true,
            only_changed: false,
        }
    }
}

/// Compiled form of a search string
enum Query {
    Any,
    Pattern(Regex),
    Substring(String),
}

impl Query {
    fn parse(search: &str) -> Self {
        let query = search.trim();
        if query.is_empty() {
            return Query::Any;
        }
        if let Some(pattern) = query.strip_prefix('/').filter(|p| !p.is_empty()) {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => return Query::Pattern(regex),
                Err(e) => {
                    tracing::debug!("invalid search pattern, using substring match: {}", e);
                }
            }
        }
        Query::Substring(query.to_lowercase())
    }

    fn matches(&self, entry: &CatalogEntry) -> bool {
        let fields = [entry.name(), entry.device_id(), entry.key()];
        match self {
            Query::Any => true,
            Query::Pattern(regex) => fields.iter().any(|f| regex.is_match(f)),
            Query::Substring(term) => fields.iter().any(|f| f.to_lowercase().contains(term)),
        }
    }
}

impl SignalFilter {
    /// True when the filter hides anything at all
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }

    fn includes_type(&self, signal_type: SignalType) -> bool {
        match signal_type {
            SignalType::Boolean => self.include_boolean,
            SignalType::Integer => self.include_integer,
            SignalType::Text => self.include_text,
        }
    }

    fn passes(&self, query: &Query, entry: &CatalogEntry) -> bool {
        self.includes_type(entry.signal_type())
            && (!self.only_changed || entry.has_changes())
            && query.matches(entry)
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        self.passes(&Query::parse(&self.search), entry)
    }

    /// Entries of `catalog` that pass, in catalog order
    pub fn apply<'a>(&self, catalog: &'a SignalCatalog) -> Vec<&'a CatalogEntry> {
        let query = Query::parse(&self.search);
        catalog
            .entries()
            .iter()
            .filter(|entry| self.passes(&query, entry))
            .collect()
    }
}
