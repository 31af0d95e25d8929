//! Request/response types for the reporting API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct AnnotationQuery {
  pub starttime: Option<String>,
  pub endtime: Option<String>,
  /// `HER`, `LER` or `BOTH` (default).
  pub entity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
  pub entity: Option<String>,
}

/// Column-oriented annotation table, one row per incident.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
  /// Epoch milliseconds.
  pub time: Vec<i64>,
  pub title: Vec<String>,
  pub tags: Vec<String>,
  pub text: Vec<String>,
}
