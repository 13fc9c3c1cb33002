//! Provenance tags for harvested records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a record was harvested from.
///
/// Google Scholar and DBLP are the two sources the crawl pipeline knows how
/// to schedule; anything else is carried through verbatim as an open tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
  Google,
  Dblp,
  Other(String),
}

impl Source {
  pub fn as_str(&self) -> &str {
    match self {
      Source::Google => "google",
      Source::Dblp => "dblp",
      Source::Other(s) => s,
    }
  }
}

impl From<&str> for Source {
  fn from(s: &str) -> Self {
    match s {
      "google" => Source::Google,
      "dblp" => Source::Dblp,
      other => Source::Other(other.to_owned()),
    }
  }
}

impl From<String> for Source {
  fn from(s: String) -> Self { Source::from(s.as_str()) }
}

impl From<Source> for String {
  fn from(s: Source) -> Self { s.as_str().to_owned() }
}

impl fmt::Display for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
