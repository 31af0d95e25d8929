//! Time bound parsing for query parameters.

use chrono::DateTime;

use abort_engine::Timestamp;

/// Parse a query time bound: epoch milliseconds, RFC 3339, or the stored
/// `YYYY-MM-DD HH:MM:SS[.f]` (UTC) form.
pub fn parse_bound(s: &str) -> Option<Timestamp> {
  let s = s.trim();
  if let Ok(ms) = s.parse::<i64>() {
    let nsec = (ms.rem_euclid(1_000) * 1_000_000) as u32;
    return Some(Timestamp::new(ms.div_euclid(1_000), nsec));
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(Timestamp::new(dt.timestamp(), dt.timestamp_subsec_nanos()));
  }
  Timestamp::parse(s).ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_epoch_millis() {
    assert_eq!(parse_bound("1700000000123"), Some(Timestamp::new(1_700_000_000, 123_000_000)));
  }

  #[test]
  fn parses_rfc3339_and_stored_form() {
    let expected = Some(Timestamp::new(1_700_000_000, 500_000_000));
    assert_eq!(parse_bound("2023-11-14T22:13:20.5Z"), expected);
    assert_eq!(parse_bound("2023-11-14 22:13:20.500000000"), expected);
    assert_eq!(parse_bound("2023-11-14 22:13:20"), Some(Timestamp::new(1_700_000_000, 0)));
  }

  #[test]
  fn rejects_garbage() {
    assert_eq!(parse_bound("yesterday"), None);
    assert_eq!(parse_bound(""), None);
  }
}
