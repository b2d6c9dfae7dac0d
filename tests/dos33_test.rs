// Integration test of the DOS 3.3 file system end to end through the crate
// facade. Uses freshly-formatted images rather than captured CiderPress/
// Virtual ][ disk fixtures, which this crate carries none of.

use retrofd::fs::DiskFS;
use retrofd::img::dsk_do::AppleDO;
use retrofd::{create_fs_from_bytestream, fs};

#[test]
fn format_write_list_read_delete_round_trip() {
    let img = AppleDO::create();
    let mut disk = fs::dos33::Disk::format(Box::new(img), 254).unwrap();

    disk.write_file("HELLO", b"HELLO WORLD").unwrap();
    disk.write_file("BIGFILE", &vec![0x42u8; 4000]).unwrap();

    let listing = disk.list("/").unwrap();
    assert_eq!(listing.len(), 2);
    assert!(listing.iter().any(|e| e.name == "HELLO" && e.length == 11));
    assert!(listing.iter().any(|e| e.name == "BIGFILE" && e.length == 4000));

    assert_eq!(disk.read_file("HELLO").unwrap(), b"HELLO WORLD");
    assert_eq!(disk.read_file("BIGFILE").unwrap(), vec![0x42u8; 4000]);

    let report = disk.validate();
    assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);

    disk.delete("HELLO").unwrap();
    assert!(disk.read_file("HELLO").is_err());
    assert_eq!(disk.list("/").unwrap().len(), 1);

    let report = disk.validate();
    assert!(report.is_valid(), "unexpected errors after delete: {:?}", report.errors);
}

#[test]
fn facade_detects_and_mounts_a_serialized_image() {
    let img = AppleDO::create();
    let mut disk = fs::dos33::Disk::format(Box::new(img), 100).unwrap();
    disk.write_file("GREETING", b"HI").unwrap();
    let bytes = disk.get_img().to_bytes().unwrap();

    let mut mounted = create_fs_from_bytestream(&bytes, Some("do")).unwrap();
    assert_eq!(mounted.read_file("GREETING").unwrap(), b"HI");
}
