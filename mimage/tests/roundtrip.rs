use mimage::{Image, Segment};

#[test]
fn file_round_trip() {
    let dir = std::env::temp_dir();
    let path = dir.join("mimage_test_image.img");

    let image = Image::new(vec![
        Segment::new(0x0000, vec![0x4031, 0x4400, 0x1300]),
        Segment::new(0xFFFE, vec![0x0000]),
    ]);
    image.write_file(&path).unwrap();
    let read_back = Image::read_file(&path).unwrap();
    assert_eq!(read_back, image);

    std::fs::remove_file(&path).ok();
}
