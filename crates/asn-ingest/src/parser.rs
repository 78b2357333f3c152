//! ASN manifest parser
//!
//! Parses the line-oriented advance-shipment-notice format:
//!
//! ```text
//! HDR  TRSP117  6874454I
//! LINE P000001661  9781465121550  12
//! LINE P000001661  9925151267712  2
//! ```
//!
//! `HDR` opens a box (supplier id, box id); each following `LINE` attaches
//! a line item (purchase order, ISBN, quantity) to it. Tokens are separated
//! by runs of ASCII whitespace. Lines that do not match either shape, and
//! `LINE` records with no box open, are dropped without failing the file.
//! The one structural error is an unparseable quantity on an attached
//! `LINE`, which aborts the whole file.

use asn_common::{BoxContent, BoxRecord};
use thiserror::Error;
use tracing::trace;

/// Structural error that aborts ingestion of the whole file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Quantity token of a `LINE` record is not a non-negative integer.
    #[error("line {line}: invalid quantity {token:?}")]
    InvalidQuantity { line: usize, token: String },
}

/// Incremental parser for one manifest stream.
///
/// Feed lines in order. Boxes close when the next `HDR` arrives, so closed
/// boxes accumulate and can be drained at any point with
/// [`drain_closed`](ManifestParser::drain_closed); callers flush batches on
/// those boundaries without ever splitting a box. The box still accepting
/// `LINE` records is only handed out by [`finish`](ManifestParser::finish).
#[derive(Debug, Default)]
pub struct ManifestParser {
    open: Option<BoxRecord>,
    closed: Vec<BoxRecord>,
    line_no: usize,
    dropped_lines: usize,
}

impl ManifestParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line of input.
    pub fn feed_line(&mut self, line: &str) -> Result<(), ParseError> {
        self.line_no += 1;
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();

        match tokens.as_slice() {
            [] => {}
            ["HDR", supplier_id, box_id, ..] => {
                let record = BoxRecord::new(*supplier_id, *box_id);
                if let Some(done) = self.open.replace(record) {
                    self.closed.push(done);
                }
            }
            ["LINE", po_number, isbn, quantity, ..] => {
                // An out-of-context LINE is dropped before its quantity is
                // even looked at, so a garbled orphan does not abort the
                // file.
                let Some(open) = self.open.as_mut() else {
                    self.drop_line(line);
                    return Ok(());
                };
                let quantity: u32 =
                    quantity.parse().map_err(|_| ParseError::InvalidQuantity {
                        line: self.line_no,
                        token: (*quantity).to_string(),
                    })?;
                open.contents.push(BoxContent::new(*po_number, *isbn, quantity));
            }
            _ => self.drop_line(line),
        }

        Ok(())
    }

    fn drop_line(&mut self, line: &str) {
        self.dropped_lines += 1;
        trace!(line_no = self.line_no, content = line, "Dropped unrecognized line");
    }

    /// Number of boxes complete and ready to hand to the store.
    pub fn closed_len(&self) -> usize {
        self.closed.len()
    }

    /// Drain the boxes closed so far, preserving source order.
    pub fn drain_closed(&mut self) -> Vec<BoxRecord> {
        std::mem::take(&mut self.closed)
    }

    /// Finish the stream: closes the box still open (if any) and returns
    /// every remaining box in source order.
    pub fn finish(mut self) -> Vec<BoxRecord> {
        if let Some(open) = self.open.take() {
            self.closed.push(open);
        }
        self.closed
    }

    /// Lines dropped so far as unrecognized or out of context.
    pub fn dropped_lines(&self) -> usize {
        self.dropped_lines
    }
}

/// Parse a complete in-memory manifest.
///
/// Convenience wrapper over [`ManifestParser`] for callers that do not
/// stream their input.
pub fn parse_manifest(content: &str) -> Result<Vec<BoxRecord>, ParseError> {
    let mut parser = ManifestParser::new();
    for line in content.lines() {
        parser.feed_line(line)?;
    }
    Ok(parser.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_box_with_contents() {
        let content = "HDR  TRSP117  6874454I\n\
                       LINE P000001661  9781465121550  12\n\
                       LINE P000001661  9925151267712  2";

        let boxes = parse_manifest(content).unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].supplier_id, "TRSP117");
        assert_eq!(boxes[0].box_id, "6874454I");
        assert_eq!(boxes[0].contents.len(), 2);
        assert_eq!(boxes[0].contents[0].po_number, "P000001661");
        assert_eq!(boxes[0].contents[0].isbn, "9781465121550");
        assert_eq!(boxes[0].contents[0].quantity, 12);
        assert_eq!(boxes[0].contents[1].isbn, "9925151267712");
        assert_eq!(boxes[0].contents[1].quantity, 2);
    }

    #[test]
    fn test_lines_attach_to_most_recent_header() {
        let content = "HDR  TRSP117  6874454I\n\
                       LINE P000001661  9781465121550  12\n\
                       HDR  TRSP118  7895123J\n\
                       LINE P000001663  9925151267712  5";

        let boxes = parse_manifest(content).unwrap();

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].box_id, "6874454I");
        assert_eq!(boxes[0].contents.len(), 1);
        assert_eq!(boxes[1].box_id, "7895123J");
        assert_eq!(boxes[1].contents.len(), 1);
        assert_eq!(boxes[1].contents[0].po_number, "P000001663");
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_manifest("").unwrap().is_empty());
        assert!(parse_manifest("\n\n   \n\t\n").unwrap().is_empty());
    }

    #[test]
    fn test_box_with_no_contents() {
        let boxes = parse_manifest("HDR  TRSP117  6874454I").unwrap();
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].contents.is_empty());
    }

    #[test]
    fn test_malformed_lines_dropped() {
        // Too few tokens and unknown record types are skipped; the box
        // itself still comes through.
        let content = "HDR  TRSP117  6874454I\n\
                       LINE P000001661\n\
                       LINE 9925151267712 2\n\
                       XXX garbage here";

        let mut parser = ManifestParser::new();
        for line in content.lines() {
            parser.feed_line(line).unwrap();
        }
        assert_eq!(parser.dropped_lines(), 3);

        let boxes = parser.finish();
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].contents.is_empty());
    }

    #[test]
    fn test_orphan_line_dropped() {
        let content = "LINE P000001661  9781465121550  12\n\
                       HDR  TRSP117  6874454I";

        let mut parser = ManifestParser::new();
        for line in content.lines() {
            parser.feed_line(line).unwrap();
        }
        assert_eq!(parser.dropped_lines(), 1);

        let boxes = parser.finish();
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].contents.is_empty());
    }

    #[test]
    fn test_orphan_line_with_bad_quantity_is_not_fatal() {
        // No box is open, so the record is dropped before the quantity is
        // parsed.
        let mut parser = ManifestParser::new();
        parser
            .feed_line("LINE P000001661  9781465121550  twelve")
            .unwrap();
        assert_eq!(parser.dropped_lines(), 1);
    }

    #[test]
    fn test_invalid_quantity_aborts_file() {
        let mut parser = ManifestParser::new();
        parser.feed_line("HDR  TRSP117  6874454I").unwrap();

        let err = parser
            .feed_line("LINE P000001661  9781465121550  twelve")
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidQuantity {
                line: 2,
                token: "twelve".to_string(),
            }
        );
    }

    #[test]
    fn test_negative_quantity_aborts_file() {
        let content = "HDR  TRSP117  6874454I\n\
                       LINE P000001661  9781465121550  -3";
        assert!(parse_manifest(content).is_err());
    }

    #[test]
    fn test_short_header_does_not_replace_open_box() {
        // A malformed HDR is dropped like any other bad line, so following
        // LINE records still attach to the previous box.
        let content = "HDR  TRSP117  6874454I\n\
                       HDR  TRSP118\n\
                       LINE P000001661  9781465121550  12";

        let boxes = parse_manifest(content).unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].box_id, "6874454I");
        assert_eq!(boxes[0].contents.len(), 1);
    }

    #[test]
    fn test_extra_tokens_ignored() {
        let content = "HDR  TRSP117  6874454I  EXTRA\n\
                       LINE P000001661  9781465121550  12  trailing note";

        let boxes = parse_manifest(content).unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].box_id, "6874454I");
        assert_eq!(boxes[0].contents[0].quantity, 12);
    }

    #[test]
    fn test_drain_closed_respects_box_boundaries() {
        let mut parser = ManifestParser::new();
        parser.feed_line("HDR  TRSP117  BOX1").unwrap();
        parser.feed_line("LINE P000001661  9781465121550  1").unwrap();
        parser.feed_line("HDR  TRSP117  BOX2").unwrap();
        parser.feed_line("HDR  TRSP117  BOX3").unwrap();

        // BOX3 is still open; only the first two are drainable.
        assert_eq!(parser.closed_len(), 2);
        let drained = parser.drain_closed();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].box_id, "BOX1");
        assert_eq!(drained[0].contents.len(), 1);
        assert_eq!(drained[1].box_id, "BOX2");
        assert_eq!(parser.closed_len(), 0);

        parser.feed_line("LINE P000001662  9925151267712  4").unwrap();
        let rest = parser.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].box_id, "BOX3");
        assert_eq!(rest[0].contents.len(), 1);
    }

    #[test]
    fn test_tabs_and_repeated_spaces_tokenize() {
        let content = "HDR\tTRSP117\t6874454I\nLINE\tP000001661   9781465121550\t 12";
        let boxes = parse_manifest(content).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].contents[0].quantity, 12);
    }
}
