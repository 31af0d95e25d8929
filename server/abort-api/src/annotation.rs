//! Signal rows → dashboard annotations.

use abort_engine::store::SignalRow;

use crate::types::Annotations;

/// Group consecutive rows by incident into one annotation each.
///
/// Rows with an empty message are skipped. The first remaining row of an
/// incident supplies time, title and tag; every row adds a
/// `"<abort_ts> <message>"` line to the text, joined with `</br>`.
pub fn to_annotations(rows: &[SignalRow]) -> Annotations {
  let mut out = Annotations::default();
  let mut current = None;
  let mut text = String::new();

  for row in rows.iter().filter(|r| !r.message.is_empty()) {
    if current != Some(row.abort_id) {
      if !text.is_empty() {
        out.text.push(std::mem::take(&mut text));
      }
      current = Some(row.abort_id);
      out.time.push(row.abort_ts.as_millis());
      out.title.push(row.message.clone());
      out.tags.push(row.ring.to_string());
    }
    if !text.is_empty() {
      text.push_str("</br>");
    }
    text.push_str(&format!("{} {}", row.abort_ts, row.message));
  }
  if !text.is_empty() {
    out.text.push(text);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use abort_engine::{IncidentId, Ring, Timestamp};

  fn row(abort_id: i64, sec: i64, channel: &str, message: &str, ring: Ring) -> SignalRow {
    SignalRow {
      abort_id: Some(IncidentId(abort_id)),
      abort_ts: Timestamp::new(sec, 250_000_000),
      channel: channel.into(),
      message: message.into(),
      ring,
      reset_count: 0,
      trigger_count: 0,
      interrupt_count: 0,
    }
  }

  #[test]
  fn one_annotation_per_incident() {
    let rows = vec![
      row(1, 1_700_000_000, "H1", "HER loss", Ring::Her),
      row(1, 1_700_000_001, "L1", "LER loss", Ring::Ler),
      row(2, 1_700_000_100, "L1", "LER loss", Ring::Ler),
    ];
    let ann = to_annotations(&rows);
    assert_eq!(ann.time, vec![1_700_000_000_250, 1_700_000_100_250]);
    assert_eq!(ann.title, vec!["HER loss", "LER loss"]);
    assert_eq!(ann.tags, vec!["HER", "LER"]);
    assert_eq!(
      ann.text,
      vec![
        "2023-11-14 22:13:20.250000000 HER loss</br>2023-11-14 22:13:21.250000000 LER loss".to_string(),
        "2023-11-14 22:15:00.250000000 LER loss".to_string(),
      ]
    );
  }

  #[test]
  fn empty_messages_are_skipped() {
    let rows = vec![
      row(1, 1_700_000_000, "H0", "", Ring::Her),
      row(1, 1_700_000_001, "H1", "HER loss", Ring::Her),
      row(2, 1_700_000_100, "L0", "", Ring::Ler),
    ];
    let ann = to_annotations(&rows);
    assert_eq!(ann.time, vec![1_700_000_001_250]);
    assert_eq!(ann.text, vec!["2023-11-14 22:13:21.250000000 HER loss".to_string()]);
  }

  #[test]
  fn no_rows_no_annotations() {
    assert_eq!(to_annotations(&[]), Annotations::default());
  }
}
