//! Fixtures shared by unit tests

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Catalog header row
pub const CATALOG_HEADER: &str = "namaitem,konversi,satuan,hargapokok,hargajual";

/// SQL dump with one item sold by KG and by PACK
pub const SEED_DUMP: &str = "
    BEGIN TRANSACTION;
    CREATE TABLE tbl_item (kodeitem TEXT PRIMARY KEY, namaitem TEXT);
    CREATE TABLE tbl_itemsatuanjml (kodeitem TEXT, satuan TEXT, jumlahkonv INTEGER, hargapokok REAL);
    CREATE TABLE tbl_itemhj (kodeitem TEXT, satuan TEXT, hargajual REAL);
    INSERT INTO tbl_item VALUES ('B001', 'BERAS PREMIUM');
    INSERT INTO tbl_itemsatuanjml VALUES ('B001', 'KG', 1, 12000);
    INSERT INTO tbl_itemsatuanjml VALUES ('B001', 'PACK', 5, 2000);
    INSERT INTO tbl_itemhj VALUES ('B001', 'KG', 15000);
    INSERT INTO tbl_itemhj VALUES ('B001', 'PACK', 2500);
    COMMIT;
";

/// Write a file whose modification time is `age_secs` in the past
pub fn write_aged(dir: &Path, name: &str, content: &str, age_secs: u64) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    let modified = SystemTime::now() - Duration::from_secs(age_secs);
    filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(modified)).unwrap();
    path
}

/// Write a catalog file with the given data rows
pub fn write_catalog(dir: &Path, name: &str, rows: &[&str], age_secs: u64) -> PathBuf {
    let mut content = String::from(CATALOG_HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    write_aged(dir, name, &content, age_secs)
}
