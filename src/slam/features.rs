use std::collections::HashSet;

use bitarray::BitArray;
use image::{imageops, GrayImage, RgbImage};
use imageproc::corners::{corners_fast9, Corner};
use nalgebra::{Vector2, Vector3};
use space::{Knn, KnnFromBatch, LinearKnn, Metric};

use crate::{
    algorithms::brief::{compute_descriptor, BinaryDescriptor},
    slam::{converter::Converter, frame::KeyFrame},
};

/// Descriptor bytes, one bit per BRIEF test
pub const DESCRIPTOR_SIZE: usize = 512 / u8::BITS as usize;
pub type SizedFeature = Feature<BinaryDescriptor<DESCRIPTOR_SIZE>>;

/// Intensity difference a FAST9 arc needs to count as a corner
const FAST_THRESHOLD: u8 = 35;
/// Blur applied before sampling BRIEF pairs
const BRIEF_SMOOTHING_SIGMA: f32 = 2.0;

/// Nearest match must be this much closer than the runner up
const LOWE_RATIO: f32 = 0.75;
/// Hamming distance above which a match is never accepted
const MAX_MATCH_DISTANCE: u32 = DESCRIPTOR_SIZE as _;

/// Keypoint pixel with its descriptor
#[derive(Clone)]
pub struct Feature<Descriptor> {
    pub keypoint: Vector2<u32>,
    pub descriptor: Descriptor,
}

impl<const N: usize> Default for Feature<BinaryDescriptor<N>> {
    fn default() -> Self {
        Self {
            keypoint: Vector2::default(),
            descriptor: [0; N],
        }
    }
}

impl<const N: usize> Feature<BinaryDescriptor<N>> {
    /// FAST9 corners of `image`, described by BRIEF on a smoothed copy.
    pub fn from_fast_and_brief(image: &GrayImage) -> Vec<Self> {
        let smoothed = imageproc::filter::gaussian_blur_f32(image, BRIEF_SMOOTHING_SIGMA);

        corners_fast9(image, FAST_THRESHOLD)
            .into_iter()
            .map(|Corner { x, y, .. }| Feature {
                keypoint: Vector2::new(x, y),
                descriptor: compute_descriptor(x, y, &smoothed),
            })
            .collect()
    }
}

/// Features of a keyframe's color image.
pub fn extract_features(color_image: &RgbImage) -> Vec<SizedFeature> {
    let grayscale_image = imageops::grayscale(color_image);
    Feature::from_fast_and_brief(&grayscale_image)
}

#[derive(Default)]
pub struct FeatureHamming;

impl<'f> Metric<&'f SizedFeature> for FeatureHamming {
    type Unit = u32;
    fn distance(&self, a: &&'f SizedFeature, b: &&'f SizedFeature) -> Self::Unit {
        BitArray::new(a.descriptor).distance(&BitArray::new(b.descriptor))
    }
}

/// Correspondences from `last` onto `current` as index pairs.
///
/// Each feature of `last` takes its nearest neighbour in `current` when it passes
/// Lowe's ratio test against the second nearest. A feature of `current` is used at most once.
pub fn match_features(last: &[SizedFeature], current: &[SizedFeature]) -> Vec<(usize, usize)> {
    // the ratio test needs a second neighbour
    if current.len() < 2 {
        return Vec::new();
    }

    let data = current.iter().map(|f| (f, ())).collect::<Vec<_>>();
    let search: LinearKnn<FeatureHamming, _> = KnnFromBatch::from_batch(data.iter());

    let mut seen_current = HashSet::<usize>::new();

    last.iter()
        .enumerate()
        .filter_map(|(i, feature)| {
            let nearest = search.knn(&feature, 2);
            let (best, second) = match nearest.as_slice() {
                [(best, ..), (second, ..)] => (best, second),
                _ => return None,
            };

            if best.distance < MAX_MATCH_DISTANCE
                && (best.distance as f32) < LOWE_RATIO * second.distance as f32
                && seen_current.insert(best.index)
            {
                Some((i, best.index))
            } else {
                None
            }
        })
        .collect()
}

/// Matched features lifted into 3D through the converter, as `(points_last, points_current)`.
///
/// Matches landing on missing depth in either frame are dropped.
pub fn lift_matches(
    matches: &[(usize, usize)],
    last: (&KeyFrame, &[SizedFeature]),
    current: (&KeyFrame, &[SizedFeature]),
    converter: &dyn Converter,
) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
    let (last_frame, last_features) = last;
    let (current_frame, current_features) = current;

    matches
        .iter()
        .filter_map(|&(i, j)| {
            let kp1 = last_features[i].keypoint.cast::<f32>();
            let kp2 = current_features[j].keypoint.cast::<f32>();
            Some((
                converter.point_at(last_frame, kp1)?,
                converter.point_at(current_frame, kp2)?,
            ))
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise_image(seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(48, 48, |_, _| {
            let v: u8 = rng.gen();
            Rgb([v, v, v])
        })
    }

    #[test]
    fn textured_image_has_features() {
        let features = extract_features(&noise_image(1));
        assert!(features.len() > 10);
    }

    #[test]
    fn identical_images_match_onto_themselves() {
        let features = extract_features(&noise_image(3));
        let matches = match_features(&features, &features);

        assert!(matches.len() > 10);
        for (i, j) in matches {
            assert_eq!(features[i].keypoint, features[j].keypoint);
        }
    }

    #[test]
    fn matching_needs_two_candidates() {
        let features = extract_features(&noise_image(5));
        assert!(match_features(&features, &features[..1]).is_empty());
    }

    /// Feature whose descriptor has every bit of the given bytes set
    fn feature_with_bytes(bytes: &[usize]) -> SizedFeature {
        let mut feature = SizedFeature::default();
        for &b in bytes {
            feature.descriptor[b] = 0xff;
        }
        feature
    }

    #[test]
    fn hamming_distance_counts_bits() {
        let a = SizedFeature::default();
        let mut b = SizedFeature::default();
        b.descriptor[0] = 0b1011;
        assert_eq!(FeatureHamming.distance(&&a, &&b), 3);
    }

    #[test]
    fn distinct_nearest_neighbour_is_kept_once() {
        let last = vec![feature_with_bytes(&[]), feature_with_bytes(&[])];
        let current = vec![feature_with_bytes(&[0, 1, 2, 3, 4]), feature_with_bytes(&[])];

        // the duplicate query loses its match to the first one
        assert_eq!(match_features(&last, &current), vec![(0, 1)]);
    }

    #[test]
    fn ambiguous_neighbours_are_rejected() {
        let last = vec![feature_with_bytes(&[])];
        let current = vec![feature_with_bytes(&[0]), feature_with_bytes(&[1])];

        assert!(match_features(&last, &current).is_empty());
    }
}
