//! Helpers shared by the crate's tests for reading capture files back.

/// One record read back from a capture file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub direction: String,
    pub timestamp: String,
    /// Data rows and the terminator row, verbatim.
    pub rows: Vec<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCapture {
    pub header: String,
    pub records: Vec<ParsedRecord>,
}

/// Splits a capture file into its header line and records.
///
/// Panics on anything that does not follow the record layout, which is
/// what the tests want.
pub fn parse_capture(text: &str) -> ParsedCapture {
    let mut lines = text.lines();
    let header = lines.next().expect("capture has a header").to_owned();
    let mut records = Vec::new();

    while let Some(direction) = lines.next() {
        assert!(direction == "I" || direction == "O", "bad marker {:?}", direction);
        let timestamp = lines.next().expect("record has a timestamp").to_owned();

        let mut rows = Vec::new();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            rows.push(line.to_owned());
        }

        let (terminator, data_rows) = rows.split_last().expect("record has a terminator row");
        let bytes: Vec<u8> = data_rows
            .iter()
            .flat_map(|row| row.split_whitespace().skip(1))
            .map(|hex| u8::from_str_radix(hex, 16).expect("hex byte"))
            .collect();
        assert_eq!(
            terminator.trim_end(),
            format!("{:05x}", bytes.len()),
            "terminator row carries the chunk length"
        );

        records.push(ParsedRecord {
            direction: direction.to_owned(),
            timestamp,
            rows,
            bytes,
        });
    }

    ParsedCapture { header, records }
}
