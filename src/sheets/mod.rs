// src/sheets/mod.rs

mod local;
mod remote;

pub use local::LocalWorkbookSink;
pub use remote::{RemoteSheetSink, create_hub};

use crate::error::Result;
use async_trait::async_trait;

/// A spreadsheet that receives one row per processed invoice.
///
/// Sinks are independent: a row appended to one is never rolled back
/// because another failed.
#[async_trait(?Send)]
pub trait RowSink {
    fn name(&self) -> &str;

    async fn append_row(&mut self, row: &[String]) -> Result<()>;

    /// Called once after the last document.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A1 range addressing the top-left of a named tab, e.g. `'March'!A1`.
/// Quotes inside the name are doubled.
pub fn sheet_range(tab: &str) -> String {
    format!("'{}'!A1", tab.replace('\'', "''"))
}

/// Column index to Excel letter (0→A, 1→B, 25→Z, 26→AA).
pub fn column_letter(index: u32) -> String {
    let mut n = index;
    let mut s = String::new();
    loop {
        s.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_range_quotes_tab() {
        assert_eq!(sheet_range("January"), "'January'!A1");
        assert_eq!(sheet_range("Bob's Sheet"), "'Bob''s Sheet'!A1");
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(16), "Q");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }
}
