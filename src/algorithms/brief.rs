use image::{GenericImageView, GrayImage};
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Number of point-pair tests available in the sampling pattern.
pub const MAX_DESCRIPTOR_BITS: usize = 512;

pub type BinaryDescriptor<const N: usize> = [u8; N];

/// Compute BRIEF (Binary Robust Independent Elementary Features) on a given grayscale image given the target keypoint.
///
/// The image is expected to be smoothed beforehand, otherwise the descriptor is overly sensitive to pixel noise.
///
/// ### CAUTION
/// const N Generic should be less than `512 / u8::BITS = 64`
pub fn compute_descriptor<const N: usize>(x: u32, y: u32, image: &GrayImage) -> BinaryDescriptor<N> {
    const BITS: usize = u8::BITS as _;

    let (width, height) = (image.width() as i32, image.height() as i32);
    let intensity = |px: i32, py: i32| -> u8 {
        if px >= 0 && px < width && py >= 0 && py < height {
            // UNSAFETY JUSTIFICATION
            //  Correctness
            //      the (x,y) pair has been bounds checked against the image dimensions just above.
            //  Fallback
            //      Out of bounds samples read as 0, these are grayscale images where pixel values are `u8`
            unsafe { image.unsafe_get_pixel(px as u32, py as u32).0[0] }
        } else {
            0
        }
    };

    let mut brief_descriptor = [0; N];
    for (i, byte) in brief_descriptor.iter_mut().enumerate() {
        for j in 0..BITS {
            let [p1x, p1y, p2x, p2y] = BRIEF512_SAMPLES[(i * BITS + j) % MAX_DESCRIPTOR_BITS];

            let first = intensity(x as i32 + p1x as i32, y as i32 + p1y as i32);
            let second = intensity(x as i32 + p2x as i32, y as i32 + p2y as i32);

            if first > second {
                *byte |= 1 << j;
            }
        }
    }

    brief_descriptor
}

/// Precomputed samples taked un to 512 bits for BREIF point samples.
/// The values remain consistent accross frames, because we want to achieve a similar level of entropy
/// to best match our previous encounters with points.
static BRIEF512_SAMPLES: Lazy<[[i16; 4]; MAX_DESCRIPTOR_BITS]> = Lazy::new(|| {
    // use reproducible random numbers so that every run samples the same pattern
    let mut rng = StdRng::seed_from_u64(42);

    // a standard deviation of 2 keeps nearly every sample within (+-) 8 pixels of the keypoint
    let normal_dist = match Normal::<f64>::new(0.0, 2.0) {
        Ok(dist) => dist,
        Err(_) => unreachable!("standard deviation is a positive constant"),
    };

    let mut samples = [[0; 4]; MAX_DESCRIPTOR_BITS];
    for sample in samples.iter_mut() {
        *sample = [
            normal_dist.sample(&mut rng) as _,
            normal_dist.sample(&mut rng) as _,
            normal_dist.sample(&mut rng) as _,
            normal_dist.sample(&mut rng) as _,
        ];
    }

    samples
});

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn descriptor_is_repeatable() {
        let image = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));

        let first: BinaryDescriptor<32> = compute_descriptor(16, 16, &image);
        let second: BinaryDescriptor<32> = compute_descriptor(16, 16, &image);

        assert_eq!(first, second);
    }

    #[test]
    fn flat_image_gives_empty_descriptor() {
        let image = GrayImage::from_pixel(64, 64, Luma([200]));
        let descriptor: BinaryDescriptor<8> = compute_descriptor(32, 32, &image);

        assert!(descriptor.iter().all(|&b| b == 0));
    }
}
