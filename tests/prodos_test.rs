// Integration test of the ProDOS file system end to end through the crate
// facade, exercising a seedling and a sapling file (storage-type boundary
// at 512 bytes).

use retrofd::fs::DiskFS;
use retrofd::img::dsk_po::ApplePO;
use retrofd::{create_fs_from_bytestream, fs};

#[test]
fn format_write_list_read_delete_round_trip() {
    let img = ApplePO::create();
    let mut disk = fs::prodos::Disk::format(Box::new(img), "TESTDISK").unwrap();

    disk.write_file("SMALL.TXT", b"hello").unwrap();
    let big = vec![0x7eu8; 20_000]; // spans several data blocks behind one index block
    disk.write_file("BIG.BIN", &big).unwrap();

    let listing = disk.list("/").unwrap();
    assert_eq!(listing.len(), 2);
    assert!(listing.iter().any(|e| e.name == "SMALL.TXT" && e.length == 5));
    assert!(listing.iter().any(|e| e.name == "BIG.BIN" && e.length == 20_000));

    assert_eq!(disk.read_file("SMALL.TXT").unwrap(), b"hello");
    assert_eq!(disk.read_file("BIG.BIN").unwrap(), big);

    let report = disk.validate();
    assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);

    disk.delete("BIG.BIN").unwrap();
    assert!(disk.read_file("BIG.BIN").is_err());

    let report = disk.validate();
    assert!(report.is_valid(), "unexpected errors after delete: {:?}", report.errors);
}

#[test]
fn facade_detects_and_mounts_a_serialized_image() {
    let img = ApplePO::create();
    let mut disk = fs::prodos::Disk::format(Box::new(img), "VOL1").unwrap();
    disk.write_file("A", b"1234").unwrap();
    let bytes = disk.get_img().to_bytes().unwrap();

    let mut mounted = create_fs_from_bytestream(&bytes, Some("po")).unwrap();
    assert_eq!(mounted.read_file("A").unwrap(), b"1234");
}
