use capture::{FrameDecoder, MjpegDecoder, YuyvDecoder};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Create a JPEG encoded test image with a gradient pattern
fn create_test_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    use image::{ImageEncoder, codecs::jpeg::JpegEncoder};

    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push(((x * 255) / width) as u8);
            pixels.push(((y * 255) / height) as u8);
            pixels.push((((x + y) * 127) / (width + height)) as u8);
        }
    }

    let mut jpeg_data = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg_data, quality)
        .write_image(&pixels, width, height, image::ExtendedColorType::Rgb8)
        .expect("Failed to encode test JPEG");
    jpeg_data
}

const SIZES: [(u32, u32, &str); 3] = [
    (960, 544, "live view"),
    (1280, 720, "still"),
    (1920, 1080, "Full HD"),
];

fn benchmark_mjpeg_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("mjpeg_decoding");
    let mut decoder = MjpegDecoder::new().expect("turbojpeg decompressor");

    for (width, height, label) in SIZES {
        let jpeg_data = create_test_jpeg(width, height, 85);
        group.throughput(Throughput::Elements(u64::from(width * height)));
        group.bench_with_input(BenchmarkId::new("turbojpeg", label), &jpeg_data, |b, jpeg| {
            b.iter(|| {
                decoder
                    .decode(black_box(jpeg), width, height)
                    .map(|d| d.pixels.len())
                    .expect("decode")
            })
        });
    }

    group.finish();
}

fn benchmark_yuyv_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("yuyv_decoding");
    let mut decoder = YuyvDecoder::new();

    for (width, height, label) in SIZES {
        let raw = vec![128u8; (width * height * 2) as usize];
        group.throughput(Throughput::Elements(u64::from(width * height)));
        group.bench_with_input(BenchmarkId::new("bt601", label), &raw, |b, raw| {
            b.iter(|| {
                decoder
                    .decode(black_box(raw), width, height)
                    .map(|d| d.pixels.len())
                    .expect("decode")
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_mjpeg_decoding, benchmark_yuyv_decoding);
criterion_main!(benches);
