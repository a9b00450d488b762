//! Reply text for the chat bot commands

use std::fmt::Write;
use std::sync::Arc;

use super::{CatalogIndex, SearchResults};
use crate::types::ProductRecord;

const NOT_FOUND: &str = "❌ Barang tidak ditemukan. Coba dengan kata lain.";
const TOO_MANY: &str = "⚠️ *Terlalu banyak hasil. Gunakan kata yang lebih spesifik.*";
const UNAVAILABLE: &str = "⚠️ Data sementara tidak tersedia. Silakan coba lagi nanti.";
const NOT_LOADED: &str = "❌ CSV belum dimuat.";

/// Format a price as rupiah with comma thousands separators, e.g. `Rp12,000`
pub fn format_rupiah(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-Rp{}", grouped)
    } else {
        format!("Rp{}", grouped)
    }
}

/// Whole numbers without a fractional part
fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn push_record(out: &mut String, record: &ProductRecord) {
    let _ = write!(
        out,
        "🔹 *{}*\n   📦 Konversi: {}\n   📏 Satuan: {}\n   💰 Harga Pokok: {}\n   🛒 Harga Jual: {}\n\n",
        record.name,
        format_quantity(record.conversion_factor),
        record.unit,
        format_rupiah(record.cost_price),
        format_rupiah(record.sell_price),
    );
}

fn render_results(results: &SearchResults) -> String {
    if results.is_empty() {
        return NOT_FOUND.to_string();
    }
    let mut out = String::from("📦 *Hasil Pencarian:*\n");
    for record in &results.records {
        push_record(&mut out, record);
    }
    if results.truncated {
        out.push_str(TOO_MANY);
    }
    out
}

/// Turns the bot commands into reply strings
#[derive(Clone)]
pub struct CatalogResponder {
    index: Arc<CatalogIndex>,
}

impl CatalogResponder {
    pub fn new(index: Arc<CatalogIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<CatalogIndex> {
        &self.index
    }

    /// `/reload`
    pub fn reload_reply(&self) -> String {
        match self.index.reload() {
            Ok(snapshot) => format!(
                "✅ File CSV dimuat ulang dari:\n`{}`",
                snapshot.source_path.display()
            ),
            Err(e) => {
                tracing::error!("Error reloading CSV: {}", e);
                format!("❌ Gagal memuat ulang CSV: {}", e)
            }
        }
    }

    /// `/version`
    pub fn version_reply(&self) -> String {
        match self.index.version() {
            Some(version) => format!(
                "📦 Versi data saat ini:\n`{}`",
                version.format("%Y-%m-%d %H:%M:%S")
            ),
            None => NOT_LOADED.to_string(),
        }
    }

    /// Free-text product lookup
    pub fn search_reply(&self, query: &str) -> String {
        match self.index.search(query) {
            Ok(results) => render_results(&results),
            Err(e) => {
                tracing::error!("Error handling search '{}': {}", query.trim(), e);
                UNAVAILABLE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_catalog;

    fn responder(rows: &[&str], limit: usize) -> (tempfile::TempDir, CatalogResponder) {
        let dir = tempfile::tempdir().unwrap();
        write_catalog(dir.path(), "01012025-0800.csv", rows, 0);
        let responder = CatalogResponder::new(Arc::new(CatalogIndex::new(dir.path(), limit)));
        (dir, responder)
    }

    #[test]
    fn test_format_rupiah() {
        assert_eq!(format_rupiah(0.0), "Rp0");
        assert_eq!(format_rupiah(950.0), "Rp950");
        assert_eq!(format_rupiah(12000.0), "Rp12,000");
        assert_eq!(format_rupiah(1234567.4), "Rp1,234,567");
        assert_eq!(format_rupiah(999.5), "Rp1,000");
        assert_eq!(format_rupiah(-2500.0), "-Rp2,500");
    }

    #[test]
    fn test_search_reply_lists_matches() {
        let (_dir, responder) = responder(&["BERAS PREMIUM,1,KG,12000,15000"], 10);
        responder.reload_reply();

        let reply = responder.search_reply("  beras ");

        assert!(reply.starts_with("📦 *Hasil Pencarian:*\n"));
        assert!(reply.contains("🔹 *BERAS PREMIUM*"));
        assert!(reply.contains("Konversi: 1\n"));
        assert!(reply.contains("Harga Pokok: Rp12,000"));
        assert!(reply.contains("Harga Jual: Rp15,000"));
        assert!(!reply.contains(TOO_MANY));
    }

    #[test]
    fn test_search_reply_not_found() {
        let (_dir, responder) = responder(&["BERAS PREMIUM,1,KG,12000,15000"], 10);
        responder.reload_reply();
        assert_eq!(responder.search_reply("sabun"), NOT_FOUND);
    }

    #[test]
    fn test_search_reply_truncated_hint() {
        let rows = ["SABUN A,1,PCS,1000,1500", "SABUN B,1,PCS,1000,1500"];
        let (_dir, responder) = responder(&rows, 1);
        responder.reload_reply();

        let reply = responder.search_reply("sabun");
        assert!(reply.contains("SABUN A"));
        assert!(!reply.contains("SABUN B"));
        assert!(reply.ends_with(TOO_MANY));
    }

    #[test]
    fn test_search_reply_before_load_hides_error() {
        let (_dir, responder) = responder(&[], 10);
        assert_eq!(responder.search_reply("beras"), UNAVAILABLE);
    }

    #[test]
    fn test_reload_and_version_replies() {
        let (dir, responder) = responder(&["GULA,1,KG,14000,16500"], 10);
        assert_eq!(responder.version_reply(), NOT_LOADED);

        let reply = responder.reload_reply();
        assert!(reply.starts_with("✅ File CSV dimuat ulang dari:"));
        assert!(reply.contains("01012025-0800.csv"));
        assert!(responder.version_reply().starts_with("📦 Versi data saat ini:\n`"));

        std::fs::remove_file(dir.path().join("01012025-0800.csv")).unwrap();
        assert!(responder.reload_reply().starts_with("❌ Gagal memuat ulang CSV:"));
        // previous data still served
        assert!(responder.search_reply("gula").contains("GULA"));
    }
}
