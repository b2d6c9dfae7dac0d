// Integration test of the FAT12 file system (MSX-DOS media) end to end
// through the crate facade.

use retrofd::bios::bpb::Bpb;
use retrofd::fs::DiskFS;
use retrofd::img::msxdsk::MsxDsk;
use retrofd::{create_fs_from_bytestream, fs};

#[test]
fn format_write_list_read_delete_round_trip() {
    let img = MsxDsk::create(true);
    let mut disk = fs::fat::Disk::format(Box::new(img), Bpb::msx_dos_720k(), "MSXDISK").unwrap();

    disk.write_file("AUTOEXEC.BAT", b"ECHO HELLO").unwrap();
    let big = vec![0x5au8; 10_000]; // spans several clusters
    disk.write_file("DATA.BIN", &big).unwrap();

    let listing = disk.list("/").unwrap();
    assert!(listing.iter().any(|e| e.name == "AUTOEXEC.BAT" && e.length == 10));
    assert!(listing.iter().any(|e| e.name == "DATA.BIN" && e.length == 10_000));

    assert_eq!(disk.read_file("AUTOEXEC.BAT").unwrap(), b"ECHO HELLO");
    assert_eq!(disk.read_file("DATA.BIN").unwrap(), big);

    let report = disk.validate();
    assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);

    disk.delete("DATA.BIN").unwrap();
    assert!(disk.read_file("DATA.BIN").is_err());

    let report = disk.validate();
    assert!(report.is_valid(), "unexpected errors after delete: {:?}", report.errors);
}

#[test]
fn facade_detects_and_mounts_a_serialized_image() {
    let img = MsxDsk::create(true);
    let mut disk = fs::fat::Disk::format(Box::new(img), Bpb::msx_dos_720k(), "MSXDISK").unwrap();
    disk.write_file("FILE.TXT", b"abcd").unwrap();
    let bytes = disk.get_img().to_bytes().unwrap();

    let mut mounted = create_fs_from_bytestream(&bytes, Some("dsk")).unwrap();
    assert_eq!(mounted.read_file("FILE.TXT").unwrap(), b"abcd");
}
