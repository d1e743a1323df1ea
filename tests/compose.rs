use std::thread;

use sortlast::{
    BinarySwap, Communicator, Compositor, DirectSend, Image, PixelFormat, PremulRgba8, Region,
    RgbF32Depth, RgbF32DepthPixel, Rgba8Alpha, Rgba8Depth, Rgba8DepthPixel, SortlastError,
};

fn with_ranks<T: Send>(size: usize, body: impl Fn(&mut Communicator) -> T + Send + Sync) -> Vec<T> {
    let comms = Communicator::mesh(size);
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|mut comm| {
                let body = &body;
                s.spawn(move || body(&mut comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn depth_pixel(color: [u8; 4], depth: f32) -> Rgba8DepthPixel {
    Rgba8DepthPixel { color, depth }
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[test]
fn single_rank_is_the_identity() {
    let results = with_ranks(1, |comm| {
        let mut local = Image::<Rgba8Depth>::full(4, 4).unwrap();
        local.set_pixel(5, depth_pixel([255, 0, 0, 255], 0.5));
        let strip = BinarySwap::new().compose(local, comm).unwrap();
        strip.gather(0, comm).unwrap()
    });

    let root = &results[0];
    assert_eq!(root.region(), Region::new(0, 16));
    for index in 0..16 {
        if index == 5 {
            assert_eq!(root.pixel_at(index), depth_pixel([255, 0, 0, 255], 0.5));
        } else {
            assert_eq!(root.pixel_at(index), Rgba8Depth::clear_pixel());
        }
    }
}

#[test]
fn two_rank_depth_compose_keeps_the_closest_fragment() {
    let results = with_ranks(2, |comm| {
        let mut local = Image::<Rgba8Depth>::full(2, 2).unwrap();
        if comm.rank() == 0 {
            local.set_pixel(0, depth_pixel([255, 0, 0, 255], 0.3));
            local.set_pixel(3, depth_pixel([0, 255, 0, 255], 0.8));
        } else {
            local.set_pixel(0, depth_pixel([0, 0, 255, 255], 0.7));
            local.set_pixel(3, depth_pixel([0, 255, 0, 255], 0.2));
        }
        let strip = BinarySwap::new().compose(local, comm).unwrap();
        strip.gather(0, comm).unwrap()
    });

    let root = &results[0];
    assert_eq!(root.pixel_at(0), depth_pixel([255, 0, 0, 255], 0.3));
    assert_eq!(root.pixel_at(3), depth_pixel([0, 255, 0, 255], 0.2));
    assert_eq!(root.pixel_at(1), Rgba8Depth::clear_pixel());
    assert_eq!(root.pixel_at(2), Rgba8Depth::clear_pixel());
    assert!(results[1].region().is_empty());
}

#[test]
fn two_rank_alpha_over_blends_front_over_back() {
    let results = with_ranks(2, |comm| {
        let mut local = Image::<Rgba8Alpha>::full(2, 1).unwrap();
        let fragment = if comm.rank() == 0 {
            // Back: straight red at alpha 128.
            [1.0, 0.0, 0.0, 128.0 / 255.0]
        } else {
            // Front: straight blue at alpha 128.
            [0.0, 0.0, 1.0, 128.0 / 255.0]
        };
        local.set_pixel(0, Rgba8Alpha::pixel_from_fragment(fragment, 0.0));
        let strip = BinarySwap::new().compose(local, comm).unwrap();
        strip.gather(0, comm).unwrap()
    });

    let expected: PremulRgba8 = [64, 0, 128, 192];
    assert_eq!(results[0].pixel_at(0), expected);
    assert_eq!(results[0].pixel_at(1), Rgba8Alpha::clear_pixel());
}

#[test]
fn four_rank_quadrants_land_in_place() {
    const QUAD_COLORS: [[f32; 3]; 4] = [
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 1.0, 0.0],
    ];

    let results = with_ranks(4, |comm| {
        let rank = comm.rank();
        let mut local = Image::<RgbF32Depth>::full(8, 8).unwrap();
        let (row0, col0) = (rank / 2 * 4, rank % 2 * 4);
        for row in row0..row0 + 4 {
            for col in col0..col0 + 4 {
                local.set_pixel(
                    row * 8 + col,
                    RgbF32DepthPixel {
                        color: QUAD_COLORS[rank],
                        depth: 0.5,
                    },
                );
            }
        }
        let strip = BinarySwap::new().compose(local, comm).unwrap();
        assert_eq!(strip.region().len(), 16);
        (strip.region(), strip.gather(0, comm).unwrap())
    });

    let mut regions: Vec<Region> = results.iter().map(|(region, _)| *region).collect();
    regions.sort_by_key(|r| r.begin);
    let mut covered = 0;
    for region in regions {
        assert_eq!(region.begin, covered);
        covered = region.end;
    }
    assert_eq!(covered, 64);

    let root = &results[0].1;
    for row in 0..8 {
        for col in 0..8 {
            let rank = row / 4 * 2 + col / 4;
            let pixel = root.pixel_at(row * 8 + col);
            assert_eq!(pixel.color, QUAD_COLORS[rank], "row {row} col {col}");
            assert_eq!(pixel.depth, 0.5);
        }
    }
}

#[test]
fn repeated_compose_is_bit_identical() {
    let render = || {
        let results = with_ranks(4, |comm| {
            let rank = comm.rank();
            let mut local = Image::<RgbF32Depth>::full(8, 8).unwrap();
            for index in 0..64 {
                let bits = mix64((rank as u64) << 32 | index as u64);
                local.set_pixel(
                    index,
                    RgbF32DepthPixel {
                        color: [rank as f32, index as f32, 0.0],
                        depth: (bits % 1000) as f32 / 1000.0,
                    },
                );
            }
            let strip = BinarySwap::new().compose(local, comm).unwrap();
            strip.gather(0, comm).unwrap()
        });
        results[0].serialize()
    };

    assert_eq!(render(), render());
}

fn random_depth_image(rank: usize, size: usize, total: u32) -> Image<Rgba8Depth> {
    let mut local = Image::<Rgba8Depth>::full(total, 1).unwrap();
    for index in 0..total as usize {
        let bits = mix64((rank as u64) << 40 | (size as u64) << 20 | index as u64);
        local.set_pixel(
            index,
            depth_pixel(
                [bits as u8, (bits >> 8) as u8, (bits >> 16) as u8, 255],
                (bits % 997) as f32 / 997.0,
            ),
        );
    }
    local
}

#[test]
fn compose_equals_pixelwise_fold_for_power_of_two_groups() {
    for size in [1usize, 2, 4, 8, 16] {
        let total = 16u32;
        let results = with_ranks(size, |comm| {
            let local = random_depth_image(comm.rank(), size, total);
            let strip = BinarySwap::new().compose(local, comm).unwrap();
            (strip.region(), strip.gather(0, comm).unwrap())
        });

        // Strips partition the framebuffer.
        let mut regions: Vec<Region> = results.iter().map(|(region, _)| *region).collect();
        regions.sort_by_key(|r| r.begin);
        let mut covered = 0;
        for region in regions.iter().filter(|r| !r.is_empty()) {
            assert_eq!(region.begin, covered, "size {size}");
            covered = region.end;
        }
        assert_eq!(covered, total as usize, "size {size}");

        // The composed pixel is the fold of every rank's contribution, and
        // for depth formats the fold order cannot matter.
        let root = &results[0].1;
        for index in 0..total as usize {
            let mut expected = random_depth_image(0, size, total).pixel_at(index);
            for rank in 1..size {
                let theirs = random_depth_image(rank, size, total).pixel_at(index);
                expected = Rgba8Depth::blend(theirs, expected);
            }
            assert_eq!(root.pixel_at(index), expected, "size {size} pixel {index}");
        }
    }
}

// Each pixel is painted by exactly two ranks; transparent pixels are exact
// blend identities, so the pairwise exchange must reproduce the rank-order
// fold bit for bit.
const ALPHA_PAIRS: [[usize; 2]; 4] = [[0, 1], [0, 2], [1, 3], [2, 3]];

fn translucent_image(rank: usize, width: u32, height: u32) -> Image<Rgba8Alpha> {
    let mut local = Image::<Rgba8Alpha>::full(width, height).unwrap();
    for (index, painters) in ALPHA_PAIRS.iter().enumerate() {
        if !painters.contains(&rank) {
            continue;
        }
        let alpha = 120 + (rank as u8) * 23 + (index as u8) * 11;
        local.set_pixel(index, [alpha / 2, alpha / 3, alpha / 4, alpha]);
    }
    local
}

#[test]
fn alpha_compose_folds_in_rank_order() {
    let (width, height) = (2u32, 2u32);
    let results = with_ranks(4, |comm| {
        let local = translucent_image(comm.rank(), width, height);
        let strip = BinarySwap::new().compose(local, comm).unwrap();
        strip.gather(0, comm).unwrap()
    });

    let root = &results[0];
    for index in 0..4 {
        let mut expected = translucent_image(0, width, height).pixel_at(index);
        for rank in 1..4 {
            let front = translucent_image(rank, width, height).pixel_at(index);
            expected = Rgba8Alpha::blend(front, expected);
        }
        assert_ne!(expected, Rgba8Alpha::clear_pixel());
        assert_eq!(root.pixel_at(index), expected, "pixel {index}");
    }
}

#[test]
fn non_power_of_two_group_falls_back_to_direct_send() {
    let total = 12u32;
    let results = with_ranks(3, |comm| {
        let local = random_depth_image(comm.rank(), 3, total);
        let strip = BinarySwap::new().compose(local, comm).unwrap();
        (strip.region(), strip.gather(0, comm).unwrap())
    });

    let mut covered = 0;
    let mut regions: Vec<Region> = results.iter().map(|(region, _)| *region).collect();
    regions.sort_by_key(|r| r.begin);
    for region in regions {
        assert_eq!(region.begin, covered);
        covered = region.end;
    }
    assert_eq!(covered, total as usize);

    let root = &results[0].1;
    for index in 0..total as usize {
        let mut expected = random_depth_image(0, 3, total).pixel_at(index);
        for rank in 1..3 {
            expected = Rgba8Depth::blend(random_depth_image(rank, 3, total).pixel_at(index), expected);
        }
        assert_eq!(root.pixel_at(index), expected);
    }
}

#[test]
fn without_fallback_rejects_non_power_of_two_groups() {
    let results = with_ranks(3, |comm| {
        let local = Image::<Rgba8Depth>::full(2, 2).unwrap();
        BinarySwap::without_fallback().compose(local, comm)
    });
    for result in results {
        assert!(matches!(result, Err(SortlastError::UnsupportedGroupSize(3))));
    }
}

#[test]
fn direct_send_matches_binary_swap() {
    let total = 16u32;
    let gather_with = |swap: bool| {
        let results = with_ranks(4, move |comm| {
            let local = random_depth_image(comm.rank(), 4, total);
            let strip = if swap {
                BinarySwap::new().compose(local, comm).unwrap()
            } else {
                DirectSend::new().compose(local, comm).unwrap()
            };
            strip.gather(0, comm).unwrap()
        });
        results.into_iter().next().unwrap()
    };

    assert_eq!(gather_with(true), gather_with(false));
}

#[test]
fn tiny_framebuffer_still_partitions() {
    // Fewer pixels than ranks: some strips come out empty.
    let results = with_ranks(4, |comm| {
        let mut local = Image::<Rgba8Depth>::full(2, 1).unwrap();
        local.set_pixel(0, depth_pixel([comm.rank() as u8, 0, 0, 255], comm.rank() as f32));
        let strip = BinarySwap::new().compose(local, comm).unwrap();
        strip.gather(0, comm).unwrap()
    });

    let root = &results[0];
    assert_eq!(root.region(), Region::new(0, 2));
    assert_eq!(root.pixel_at(0), depth_pixel([0, 0, 0, 255], 0.0));
}

#[test]
fn compose_requires_a_full_screen_input() {
    let results = with_ranks(1, |comm| {
        let local = Image::<Rgba8Depth>::new(2, 2, 0, 2).unwrap();
        BinarySwap::new().compose(local, comm)
    });
    assert!(matches!(
        results[0],
        Err(SortlastError::InvalidRegion(_))
    ));
}
