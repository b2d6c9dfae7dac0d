// Integration test of the crate facade's detect+convert path, exercising
// `retrofd::convert_img` the way an external caller would: raw bytes in, raw
// bytes of a different container format out. Uses MSXDSK<->MSXDMK (an
// identity sector copy) rather than AppleDO<->ApplePO, since the DO/PO
// deskew is only meaningful for a genuinely ProDOS-formatted payload and
// detection of either Apple format depends on content that a bare sector
// write doesn't produce (see `img::detect::sniff_apple`).

use retrofd::bios::bpb::Bpb;
use retrofd::fs::DiskFS;
use retrofd::img::msxdsk::MsxDsk;
use retrofd::img::DiskFormat;
use retrofd::{convert_img, create_fs_from_bytestream, fs};

#[test]
fn msxdsk_round_trips_through_dmk_preserving_the_filesystem() {
    let img = MsxDsk::create(true);
    let mut disk = fs::fat::Disk::format(Box::new(img), Bpb::msx_dos_720k(), "ROUNDTRIP").unwrap();
    disk.write_file("FILE.TXT", b"preserved through conversion").unwrap();
    let dsk_bytes = disk.get_img().to_bytes().unwrap();

    let dmk_bytes = convert_img(&dsk_bytes, Some("dsk"), DiskFormat::MSXDMK).unwrap();
    let back_bytes = convert_img(&dmk_bytes, Some("dmk"), DiskFormat::MSXDSK).unwrap();

    let mut mounted = create_fs_from_bytestream(&back_bytes, Some("dsk")).unwrap();
    assert_eq!(mounted.read_file("FILE.TXT").unwrap(), b"preserved through conversion");
}
